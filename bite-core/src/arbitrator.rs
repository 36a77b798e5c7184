//! Claim arbitrator.
//!
//! Owns every request-driven status transition. Each one is a single
//! conditional write against the [`EntityStore`]; the arbitrator's job is to
//! pick the right expected state, and to turn a lost compare-and-set into an
//! answer the caller can act on. Nothing here retries: the loser of a race
//! simply fails.

use crate::clock::Clock;
use crate::directory::{DirectoryError, UserDirectory};
use crate::entities::{
    Donation, DonationStatus, DonationType, NewRequest, Request, RequestStatus, RequesterType,
};
use crate::events::{EngineEvent, EngineEventSender, emit};
use crate::store::{
    DonationMirror, EntityKind, EntityStore, RequestTransition, StaleState, StoreError,
    TransitionOutcome,
};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum ArbitrationError {
    #[error("{kind} {id} not found")]
    NotFound { kind: EntityKind, id: Uuid },

    #[error("donation already claimed")]
    AlreadyClaimed,

    #[error("request already has a volunteer")]
    AlreadyAssigned,

    #[error("cannot move request from {from} to {to}")]
    InvalidTransition {
        from: RequestStatus,
        to: RequestStatus,
    },

    #[error("cannot move donation from {from} to {to}")]
    InvalidDonationTransition {
        from: DonationStatus,
        to: DonationStatus,
    },

    #[error("actor {0} is not approved")]
    ActorNotEligible(Uuid),

    #[error("donation is expired or withdrawn")]
    DonationUnavailable,

    #[error(transparent)]
    Store(StoreError),

    #[error(transparent)]
    Directory(#[from] DirectoryError),
}

impl ArbitrationError {
    /// Infrastructure failure; the caller may try again later.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ArbitrationError::Store(_) | ArbitrationError::Directory(_)
        )
    }
}

impl From<StoreError> for ArbitrationError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound { kind, id } => ArbitrationError::NotFound { kind, id },
            // Callers that can lose a race translate stale state themselves;
            // anything reaching here is an unexpected record state.
            StoreError::Stale(stale) => {
                warn!(%stale, "Unexpected stale state");
                stale_to_error(stale)
            }
            other => ArbitrationError::Store(other),
        }
    }
}

fn stale_to_error(stale: StaleState) -> ArbitrationError {
    match stale {
        StaleState::Donation {
            expected, actual, ..
        } => ArbitrationError::InvalidDonationTransition {
            from: actual,
            to: expected,
        },
        StaleState::DonationExpired { .. } => ArbitrationError::DonationUnavailable,
        StaleState::Request {
            expected, actual, ..
        } => ArbitrationError::InvalidTransition {
            from: actual,
            to: expected,
        },
        StaleState::AlreadyAssigned { .. } => ArbitrationError::AlreadyAssigned,
    }
}

/// Statuses a volunteer (or actor on their behalf) can report after acceptance.
fn is_completion(status: RequestStatus) -> bool {
    matches!(status, RequestStatus::Delivered | RequestStatus::Composted)
}

/// Composting is only a valid outcome for compost flows.
fn allows_compost(request: &Request, donation: &Donation) -> bool {
    request.requester_type == RequesterType::CompostAgency
        || donation.donation_type == DonationType::Compost
}

pub struct ClaimArbitrator {
    store: Arc<dyn EntityStore>,
    directory: Arc<dyn UserDirectory>,
    clock: Arc<dyn Clock>,
    events: EngineEventSender,
}

impl ClaimArbitrator {
    pub fn new(
        store: Arc<dyn EntityStore>,
        directory: Arc<dyn UserDirectory>,
        clock: Arc<dyn Clock>,
        events: EngineEventSender,
    ) -> Self {
        Self {
            store,
            directory,
            clock,
            events,
        }
    }

    async fn ensure_approved(&self, user_id: Uuid) -> Result<(), ArbitrationError> {
        let standing = self.directory.standing(user_id).await?;
        if !standing.is_approved() {
            debug!(%user_id, ?standing, "Actor not eligible");
            return Err(ArbitrationError::ActorNotEligible(user_id));
        }
        Ok(())
    }

    fn announce(&self, outcome: &TransitionOutcome) {
        emit(
            &self.events,
            EngineEvent::RequestStatusChanged {
                request_id: outcome.request.request_id,
                donation_id: outcome.request.donation_id,
                status: outcome.request.status,
            },
        );
        if let Some(donation) = &outcome.donation {
            emit(
                &self.events,
                EngineEvent::DonationStatusChanged {
                    donation_id: donation.donation_id,
                    status: donation.status,
                },
            );
        }
    }

    async fn require_request(&self, request_id: Uuid) -> Result<Request, ArbitrationError> {
        self.store
            .get_request(request_id)
            .await?
            .ok_or(ArbitrationError::NotFound {
                kind: EntityKind::Request,
                id: request_id,
            })
    }

    /// Claim a donation for `requester_id`.
    ///
    /// Exactly one of any number of concurrent callers wins; the rest get
    /// [`ArbitrationError::AlreadyClaimed`].
    #[tracing::instrument(skip(self, delivery_address), err(level = "debug"))]
    pub async fn claim_donation(
        &self,
        donation_id: Uuid,
        requester_id: Uuid,
        requester_type: RequesterType,
        delivery_address: Option<String>,
    ) -> Result<(Donation, Request), ArbitrationError> {
        self.ensure_approved(requester_id).await?;

        let new = NewRequest {
            donation_id,
            requester_id,
            requester_type,
            delivery_address,
        };
        let (donation, request) = match self.store.create_request(new, self.clock.now()).await {
            Ok(claimed) => claimed,
            Err(StoreError::Stale(StaleState::Donation { actual, .. })) => {
                return Err(match actual {
                    DonationStatus::Expired | DonationStatus::Rejected => {
                        ArbitrationError::DonationUnavailable
                    }
                    _ => {
                        debug!(%donation_id, %actual, "Lost claim race");
                        ArbitrationError::AlreadyClaimed
                    }
                });
            }
            Err(StoreError::Stale(StaleState::DonationExpired { .. })) => {
                return Err(ArbitrationError::DonationUnavailable);
            }
            Err(e) => return Err(e.into()),
        };

        info!(
            %donation_id,
            request_id = %request.request_id,
            "Donation claimed"
        );
        emit(
            &self.events,
            EngineEvent::DonationStatusChanged {
                donation_id,
                status: donation.status,
            },
        );
        emit(
            &self.events,
            EngineEvent::RequestStatusChanged {
                request_id: request.request_id,
                donation_id,
                status: request.status,
            },
        );
        Ok((donation, request))
    }

    /// Assign `volunteer_id` to a pending request.
    ///
    /// Role checks (volunteer, or a self-fulfilling requester) belong to the
    /// caller; this only enforces approval and exclusivity.
    #[tracing::instrument(skip(self), err(level = "debug"))]
    pub async fn accept_request(
        &self,
        request_id: Uuid,
        volunteer_id: Uuid,
    ) -> Result<Request, ArbitrationError> {
        self.ensure_approved(volunteer_id).await?;

        let transition = RequestTransition {
            request_id,
            expected: RequestStatus::Pending,
            new: RequestStatus::Accepted,
            assign_volunteer: Some(volunteer_id),
            donation: Some(DonationMirror {
                expected: DonationStatus::Requested,
                new: DonationStatus::Assigned,
            }),
            now: self.clock.now(),
        };
        let outcome = match self.store.update_request_status(transition).await {
            Ok(outcome) => outcome,
            Err(StoreError::Stale(StaleState::AlreadyAssigned { .. })) => {
                debug!(%request_id, "Lost accept race");
                return Err(ArbitrationError::AlreadyAssigned);
            }
            Err(StoreError::Stale(StaleState::Request { actual, .. })) => {
                return Err(if actual.requires_volunteer() {
                    debug!(%request_id, %actual, "Lost accept race");
                    ArbitrationError::AlreadyAssigned
                } else {
                    ArbitrationError::InvalidTransition {
                        from: actual,
                        to: RequestStatus::Accepted,
                    }
                });
            }
            Err(e) => return Err(e.into()),
        };

        info!(%request_id, %volunteer_id, "Request accepted");
        self.announce(&outcome);
        Ok(outcome.request)
    }

    /// Move an accepted request to `target` (`Delivered` or `Composted`),
    /// mirroring the donation.
    ///
    /// Repeating the status a request already reached is a successful no-op.
    #[tracing::instrument(skip(self), err(level = "debug"))]
    pub async fn advance_status(
        &self,
        request_id: Uuid,
        target: RequestStatus,
        actor: Uuid,
    ) -> Result<Request, ArbitrationError> {
        let request = self.require_request(request_id).await?;

        if request.status == target && target.is_terminal() {
            debug!(%request_id, %target, "Status already reached");
            return Ok(request);
        }
        if !is_completion(target) || request.status != RequestStatus::Accepted {
            debug!(%request_id, from = %request.status, to = %target, "Invalid transition");
            return Err(ArbitrationError::InvalidTransition {
                from: request.status,
                to: target,
            });
        }
        if target == RequestStatus::Composted {
            let donation = self.store.get_donation(request.donation_id).await?.ok_or(
                ArbitrationError::NotFound {
                    kind: EntityKind::Donation,
                    id: request.donation_id,
                },
            )?;
            if !allows_compost(&request, &donation) {
                debug!(%request_id, "Compost outcome on a non-compost flow");
                return Err(ArbitrationError::InvalidTransition {
                    from: request.status,
                    to: target,
                });
            }
        }

        let transition = RequestTransition {
            request_id,
            expected: RequestStatus::Accepted,
            new: target,
            assign_volunteer: None,
            donation: Some(DonationMirror {
                expected: DonationStatus::Assigned,
                new: target.mirrored_donation_status(),
            }),
            now: self.clock.now(),
        };
        let outcome = match self.store.update_request_status(transition).await {
            Ok(outcome) => outcome,
            // A concurrent duplicate got there first.
            Err(StoreError::Stale(StaleState::Request { actual, .. })) if actual == target => {
                return self.require_request(request_id).await;
            }
            Err(StoreError::Stale(StaleState::Request { actual, .. })) => {
                return Err(ArbitrationError::InvalidTransition {
                    from: actual,
                    to: target,
                });
            }
            Err(e) => return Err(e.into()),
        };

        info!(%request_id, %target, "Request completed");
        self.announce(&outcome);
        Ok(outcome.request)
    }

    /// Give a pending claim back: request `Rejected`, donation `Available`.
    #[tracing::instrument(skip(self), err(level = "debug"))]
    pub async fn release_claim(
        &self,
        request_id: Uuid,
        actor: Uuid,
    ) -> Result<Request, ArbitrationError> {
        let transition = RequestTransition {
            request_id,
            expected: RequestStatus::Pending,
            new: RequestStatus::Rejected,
            assign_volunteer: None,
            donation: Some(DonationMirror {
                expected: DonationStatus::Requested,
                new: DonationStatus::Available,
            }),
            now: self.clock.now(),
        };
        let outcome = match self.store.update_request_status(transition).await {
            Ok(outcome) => outcome,
            Err(StoreError::Stale(StaleState::Request {
                actual: RequestStatus::Rejected,
                ..
            })) => return self.require_request(request_id).await,
            Err(StoreError::Stale(StaleState::Request { actual, .. })) => {
                return Err(ArbitrationError::InvalidTransition {
                    from: actual,
                    to: RequestStatus::Rejected,
                });
            }
            Err(e) => return Err(e.into()),
        };

        info!(%request_id, "Claim released");
        self.announce(&outcome);
        Ok(outcome.request)
    }

    /// Take an unclaimed donation off the market.
    #[tracing::instrument(skip(self), err(level = "debug"))]
    pub async fn withdraw_donation(
        &self,
        donation_id: Uuid,
        actor: Uuid,
    ) -> Result<Donation, ArbitrationError> {
        let result = self
            .store
            .update_donation_status(
                donation_id,
                DonationStatus::Available,
                DonationStatus::Rejected,
                self.clock.now(),
            )
            .await;
        let donation = match result {
            Ok(donation) => donation,
            Err(StoreError::Stale(StaleState::Donation {
                actual: DonationStatus::Rejected,
                ..
            })) => {
                return self.store.get_donation(donation_id).await?.ok_or(
                    ArbitrationError::NotFound {
                        kind: EntityKind::Donation,
                        id: donation_id,
                    },
                );
            }
            Err(StoreError::Stale(StaleState::Donation { actual, .. })) => {
                return Err(ArbitrationError::InvalidDonationTransition {
                    from: actual,
                    to: DonationStatus::Rejected,
                });
            }
            Err(e) => return Err(e.into()),
        };

        info!(%donation_id, "Donation withdrawn");
        emit(
            &self.events,
            EngineEvent::DonationStatusChanged {
                donation_id,
                status: donation.status,
            },
        );
        Ok(donation)
    }
}
