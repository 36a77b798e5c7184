//! Entity store: the single source of truth for donation and request status.
//!
//! Every status mutation is a compare-and-set. Callers name the status they
//! believe the record is in; if it has moved on, the store answers with
//! [`StoreError::Stale`] instead of overwriting. This is what lets the claim
//! arbitrator run without any external locking.
//!
//! Two backends implement [`EntityStore`]:
//!
//! - [`MemoryStore`]: in-process maps behind one `RwLock`
//! - [`PgStore`]: PostgreSQL, one conditional `UPDATE … RETURNING` per CAS

#[cfg(test)]
pub(crate) mod interleave;
mod memory;
mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

use crate::entities::{
    Donation, DonationStatus, DonationType, NewDonation, NewRequest, Request, RequestStatus,
};
use async_trait::async_trait;
use thiserror::Error;
use time::OffsetDateTime;
use uuid::Uuid;

/// What a compare-and-set found instead of the expected state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StaleState {
    Donation {
        donation_id: Uuid,
        expected: DonationStatus,
        actual: DonationStatus,
    },
    /// Status matched but the expiry has already passed.
    DonationExpired { donation_id: Uuid },
    Request {
        request_id: Uuid,
        expected: RequestStatus,
        actual: RequestStatus,
    },
    /// The request already carries a volunteer.
    AlreadyAssigned { request_id: Uuid },
}

impl std::fmt::Display for StaleState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StaleState::Donation {
                donation_id,
                expected,
                actual,
            } => write!(
                f,
                "donation {donation_id}: expected {expected}, found {actual}"
            ),
            StaleState::DonationExpired { donation_id } => {
                write!(f, "donation {donation_id} has expired")
            }
            StaleState::Request {
                request_id,
                expected,
                actual,
            } => write!(f, "request {request_id}: expected {expected}, found {actual}"),
            StaleState::AlreadyAssigned { request_id } => {
                write!(f, "request {request_id} already has a volunteer")
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityKind {
    Donation,
    Request,
}

impl std::fmt::Display for EntityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EntityKind::Donation => f.write_str("donation"),
            EntityKind::Request => f.write_str("request"),
        }
    }
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("{kind} {id} not found")]
    NotFound { kind: EntityKind, id: Uuid },

    /// Conditional update lost against the current state.
    #[error("stale state: {0}")]
    Stale(StaleState),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("store unavailable: {0}")]
    Unavailable(String),
}

impl StoreError {
    /// Infrastructure failures, as opposed to business-state answers.
    pub fn is_unavailable(&self) -> bool {
        matches!(self, StoreError::Database(_) | StoreError::Unavailable(_))
    }
}

/// Donation half of a [`RequestTransition`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DonationMirror {
    pub expected: DonationStatus,
    pub new: DonationStatus,
}

/// A conditional request status change, optionally paired with a conditional
/// change on the linked donation. Both apply or neither does.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequestTransition {
    pub request_id: Uuid,
    pub expected: RequestStatus,
    pub new: RequestStatus,
    /// Volunteer to record; requires the request to have none yet.
    pub assign_volunteer: Option<Uuid>,
    pub donation: Option<DonationMirror>,
    pub now: OffsetDateTime,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TransitionOutcome {
    pub request: Request,
    pub donation: Option<Donation>,
}

/// Durable state for donations and requests.
///
/// Implementations must make every status-mutating method a single atomic
/// conditional write (or one transaction of them).
#[async_trait]
pub trait EntityStore: Send + Sync {
    async fn create_donation(
        &self,
        new: NewDonation,
        now: OffsetDateTime,
    ) -> Result<Donation, StoreError>;

    async fn get_donation(&self, donation_id: Uuid) -> Result<Option<Donation>, StoreError>;

    /// `Available` donations of `donation_type` expiring after `now`, soonest first.
    async fn list_available(
        &self,
        donation_type: DonationType,
        now: OffsetDateTime,
    ) -> Result<Vec<Donation>, StoreError>;

    async fn list_donations_by_donor(&self, donor_id: Uuid) -> Result<Vec<Donation>, StoreError>;

    /// Atomic claim: donation `Available` → `Requested` (only while unexpired)
    /// together with the insertion of a `Pending` request.
    async fn create_request(
        &self,
        new: NewRequest,
        now: OffsetDateTime,
    ) -> Result<(Donation, Request), StoreError>;

    async fn get_request(&self, request_id: Uuid) -> Result<Option<Request>, StoreError>;

    async fn requests_by_requester(&self, requester_id: Uuid) -> Result<Vec<Request>, StoreError>;

    async fn requests_by_volunteer(&self, volunteer_id: Uuid) -> Result<Vec<Request>, StoreError>;

    async fn requests_by_donation(&self, donation_id: Uuid) -> Result<Vec<Request>, StoreError>;

    /// `Pending` requests, oldest first.
    async fn list_open_requests(&self) -> Result<Vec<Request>, StoreError>;

    async fn update_donation_status(
        &self,
        donation_id: Uuid,
        expected: DonationStatus,
        new: DonationStatus,
        now: OffsetDateTime,
    ) -> Result<Donation, StoreError>;

    async fn update_request_status(
        &self,
        transition: RequestTransition,
    ) -> Result<TransitionOutcome, StoreError>;

    /// `Available` or `Requested` donations whose expiry is at or before `now`.
    async fn list_sweep_candidates(&self, now: OffsetDateTime)
    -> Result<Vec<Donation>, StoreError>;

    /// Donations in `Requested` or `Assigned`.
    async fn list_claimed_donations(&self) -> Result<Vec<Donation>, StoreError>;

    /// Requests in `Pending` or `Accepted`.
    async fn list_live_requests(&self) -> Result<Vec<Request>, StoreError>;
}
