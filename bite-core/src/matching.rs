//! Matching API.
//!
//! The transport-independent surface used by donors, requesters, volunteers
//! and observers. Each operation checks the caller's role and ownership,
//! then delegates to the [`ClaimArbitrator`], the [`EntityStore`] or the
//! [`TrackingHub`]. Errors leave here already translated into
//! [`MatchingError`]; store-level stale states never escape.

use crate::arbitrator::{ArbitrationError, ClaimArbitrator};
use crate::clock::Clock;
use crate::directory::UserDirectory;
use crate::entities::{
    Donation, DonationType, NewDonation, Request, RequestStatus, RequesterType, TrackingSample,
};
use crate::events::EngineEventSender;
use crate::store::{EntityKind, EntityStore, StoreError};
use crate::tracking::{TrackingHub, TrackingSubscription};
use bite_sdk::objects::{
    ClaimDonation, CreateDonation, DonationType as SdkDonationType, PublishSample,
    RequestStatus as SdkRequestStatus, Role,
};
use bite_sdk::signature::Identity;
use std::sync::Arc;
use thiserror::Error;
use time::OffsetDateTime;
use tracing::{debug, error, info};
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum MatchingError {
    #[error("forbidden: {0}")]
    Forbidden(&'static str),

    #[error("actor is not approved for this operation")]
    ActorNotEligible,

    #[error("{0} not found")]
    NotFound(EntityKind),

    #[error("donation already claimed, try another item")]
    AlreadyClaimed,

    #[error("request already accepted by another volunteer")]
    AlreadyAssigned,

    #[error("invalid transition: {0}")]
    InvalidTransition(String),

    #[error("donation is no longer available")]
    DonationUnavailable,

    #[error("validation failed: {0}")]
    Validation(String),

    #[error("tracking has ended for this request")]
    TrackingClosed,

    #[error("service temporarily unavailable")]
    Unavailable(String),
}

impl MatchingError {
    /// Stable machine-readable code for the wire.
    pub fn code(&self) -> &'static str {
        match self {
            MatchingError::Forbidden(_) => "FORBIDDEN",
            MatchingError::ActorNotEligible => "ACTOR_NOT_ELIGIBLE",
            MatchingError::NotFound(_) => "NOT_FOUND",
            MatchingError::AlreadyClaimed => "ALREADY_CLAIMED",
            MatchingError::AlreadyAssigned => "ALREADY_ASSIGNED",
            MatchingError::InvalidTransition(_) => "INVALID_TRANSITION",
            MatchingError::DonationUnavailable => "DONATION_UNAVAILABLE",
            MatchingError::Validation(_) => "VALIDATION",
            MatchingError::TrackingClosed => "TRACKING_CLOSED",
            MatchingError::Unavailable(_) => "UNAVAILABLE",
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, MatchingError::Unavailable(_))
    }
}

impl From<ArbitrationError> for MatchingError {
    fn from(err: ArbitrationError) -> Self {
        match err {
            ArbitrationError::NotFound { kind, .. } => MatchingError::NotFound(kind),
            ArbitrationError::AlreadyClaimed => MatchingError::AlreadyClaimed,
            ArbitrationError::AlreadyAssigned => MatchingError::AlreadyAssigned,
            e @ (ArbitrationError::InvalidTransition { .. }
            | ArbitrationError::InvalidDonationTransition { .. }) => {
                MatchingError::InvalidTransition(e.to_string())
            }
            ArbitrationError::ActorNotEligible(_) => MatchingError::ActorNotEligible,
            ArbitrationError::DonationUnavailable => MatchingError::DonationUnavailable,
            e @ (ArbitrationError::Store(_) | ArbitrationError::Directory(_)) => {
                error!(error = %e, "Arbitration failed");
                MatchingError::Unavailable(e.to_string())
            }
        }
    }
}

impl From<StoreError> for MatchingError {
    fn from(err: StoreError) -> Self {
        ArbitrationError::from(err).into()
    }
}

/// Requester type a role claims as, if it may claim at all.
fn requester_type(role: Role) -> Option<RequesterType> {
    match role {
        Role::Ngo => Some(RequesterType::Ngo),
        Role::Needy => Some(RequesterType::Needy),
        Role::Volunteer => Some(RequesterType::Volunteer),
        Role::CompostAgency => Some(RequesterType::CompostAgency),
        Role::Donor | Role::Admin => None,
    }
}

/// Requester, assigned volunteer, donor of the donation, or admin.
fn is_party(actor: &Identity, request: &Request, donation: &Donation) -> bool {
    match actor.role {
        Role::Admin => true,
        Role::Donor => donation.donor_id == actor.user_id,
        Role::Ngo | Role::Needy | Role::Volunteer | Role::CompostAgency => {
            request.requester_id == actor.user_id
                || request.assigned_volunteer == Some(actor.user_id)
        }
    }
}

fn validate_coordinates(latitude: f64, longitude: f64) -> Result<(), MatchingError> {
    if !latitude.is_finite() || !(-90.0..=90.0).contains(&latitude) {
        return Err(MatchingError::Validation(format!(
            "latitude {latitude} out of range"
        )));
    }
    if !longitude.is_finite() || !(-180.0..=180.0).contains(&longitude) {
        return Err(MatchingError::Validation(format!(
            "longitude {longitude} out of range"
        )));
    }
    Ok(())
}

fn validate_donation(
    donor_id: Uuid,
    body: CreateDonation,
    now: OffsetDateTime,
) -> Result<NewDonation, MatchingError> {
    let food_name = body.food_name.trim();
    if food_name.is_empty() {
        return Err(MatchingError::Validation("food_name is empty".into()));
    }
    if body.quantity <= 0 {
        return Err(MatchingError::Validation(format!(
            "quantity must be positive, got {}",
            body.quantity
        )));
    }
    if body.pickup.address.trim().is_empty() {
        return Err(MatchingError::Validation("pickup address is empty".into()));
    }
    match (body.pickup.latitude, body.pickup.longitude) {
        (Some(lat), Some(lon)) => validate_coordinates(lat, lon)?,
        (None, None) => {}
        _ => {
            return Err(MatchingError::Validation(
                "pickup latitude and longitude go together".into(),
            ));
        }
    }
    let expires_at = OffsetDateTime::from_unix_timestamp(body.expires_at)
        .map_err(|_| MatchingError::Validation("expires_at out of range".into()))?;
    if expires_at <= now {
        return Err(MatchingError::Validation(
            "expires_at must be in the future".into(),
        ));
    }

    Ok(NewDonation {
        donor_id,
        food_name: food_name.into(),
        description: body.description,
        quantity: body.quantity,
        donation_type: body.donation_type.into(),
        expires_at,
        pickup_address: body.pickup.address,
        pickup_latitude: body.pickup.latitude,
        pickup_longitude: body.pickup.longitude,
        photo_url: body.photo_url,
    })
}

pub struct MatchingApi {
    store: Arc<dyn EntityStore>,
    arbitrator: ClaimArbitrator,
    hub: Arc<TrackingHub>,
    clock: Arc<dyn Clock>,
}

impl MatchingApi {
    pub fn new(
        store: Arc<dyn EntityStore>,
        directory: Arc<dyn UserDirectory>,
        hub: Arc<TrackingHub>,
        clock: Arc<dyn Clock>,
        events: EngineEventSender,
    ) -> Self {
        let arbitrator =
            ClaimArbitrator::new(store.clone(), directory, clock.clone(), events);
        Self {
            store,
            arbitrator,
            hub,
            clock,
        }
    }

    pub fn hub(&self) -> &Arc<TrackingHub> {
        &self.hub
    }

    async fn load_donation(&self, donation_id: Uuid) -> Result<Donation, MatchingError> {
        self.store
            .get_donation(donation_id)
            .await?
            .ok_or(MatchingError::NotFound(EntityKind::Donation))
    }

    async fn load_request(&self, request_id: Uuid) -> Result<Request, MatchingError> {
        self.store
            .get_request(request_id)
            .await?
            .ok_or(MatchingError::NotFound(EntityKind::Request))
    }

    /// Load a request and its donation, requiring `actor` to be a party to it.
    async fn load_as_party(
        &self,
        actor: &Identity,
        request_id: Uuid,
    ) -> Result<(Request, Donation), MatchingError> {
        let request = self.load_request(request_id).await?;
        let donation = self.load_donation(request.donation_id).await?;
        if !is_party(actor, &request, &donation) {
            return Err(MatchingError::Forbidden("not a party to this request"));
        }
        Ok((request, donation))
    }

    // -- Donations ----------------------------------------------------------

    pub async fn create_donation(
        &self,
        actor: &Identity,
        body: CreateDonation,
    ) -> Result<Donation, MatchingError> {
        match actor.role {
            Role::Donor => {}
            Role::Ngo | Role::Needy | Role::Volunteer | Role::CompostAgency | Role::Admin => {
                return Err(MatchingError::Forbidden("only donors create donations"));
            }
        }
        let new = validate_donation(actor.user_id, body, self.clock.now())?;
        let donation = self.store.create_donation(new, self.clock.now()).await?;
        info!(
            donation_id = %donation.donation_id,
            donor_id = %donation.donor_id,
            "Donation created"
        );
        Ok(donation)
    }

    pub async fn list_available(
        &self,
        actor: &Identity,
        donation_type: SdkDonationType,
    ) -> Result<Vec<Donation>, MatchingError> {
        match actor.role {
            Role::Ngo | Role::Needy | Role::Volunteer | Role::CompostAgency | Role::Admin => {}
            Role::Donor => {
                return Err(MatchingError::Forbidden("donors cannot browse donations"));
            }
        }
        Ok(self
            .store
            .list_available(DonationType::from(donation_type), self.clock.now())
            .await?)
    }

    pub async fn my_donations(&self, actor: &Identity) -> Result<Vec<Donation>, MatchingError> {
        match actor.role {
            Role::Donor => Ok(self.store.list_donations_by_donor(actor.user_id).await?),
            Role::Ngo | Role::Needy | Role::Volunteer | Role::CompostAgency | Role::Admin => {
                Err(MatchingError::Forbidden("only donors own donations"))
            }
        }
    }

    pub async fn get_donation(
        &self,
        _actor: &Identity,
        donation_id: Uuid,
    ) -> Result<Donation, MatchingError> {
        self.load_donation(donation_id).await
    }

    /// Requests ever made on a donation. Donor of the donation or admin.
    pub async fn donation_requests(
        &self,
        actor: &Identity,
        donation_id: Uuid,
    ) -> Result<Vec<Request>, MatchingError> {
        let donation = self.load_donation(donation_id).await?;
        let allowed = match actor.role {
            Role::Admin => true,
            Role::Donor => donation.donor_id == actor.user_id,
            Role::Ngo | Role::Needy | Role::Volunteer | Role::CompostAgency => false,
        };
        if !allowed {
            return Err(MatchingError::Forbidden("not the donor of this donation"));
        }
        Ok(self.store.requests_by_donation(donation_id).await?)
    }

    pub async fn claim_donation(
        &self,
        actor: &Identity,
        donation_id: Uuid,
        body: ClaimDonation,
    ) -> Result<Request, MatchingError> {
        let requester_type = requester_type(actor.role)
            .ok_or(MatchingError::Forbidden("role cannot claim donations"))?;
        let (_, request) = self
            .arbitrator
            .claim_donation(
                donation_id,
                actor.user_id,
                requester_type,
                body.delivery_address,
            )
            .await?;
        Ok(request)
    }

    pub async fn withdraw_donation(
        &self,
        actor: &Identity,
        donation_id: Uuid,
    ) -> Result<Donation, MatchingError> {
        let donation = self.load_donation(donation_id).await?;
        let allowed = match actor.role {
            Role::Admin => true,
            Role::Donor => donation.donor_id == actor.user_id,
            Role::Ngo | Role::Needy | Role::Volunteer | Role::CompostAgency => false,
        };
        if !allowed {
            return Err(MatchingError::Forbidden("not the donor of this donation"));
        }
        Ok(self
            .arbitrator
            .withdraw_donation(donation_id, actor.user_id)
            .await?)
    }

    // -- Requests -----------------------------------------------------------

    /// Pending requests waiting for a volunteer.
    pub async fn open_requests(&self, actor: &Identity) -> Result<Vec<Request>, MatchingError> {
        match actor.role {
            Role::Volunteer | Role::Admin => Ok(self.store.list_open_requests().await?),
            // Self-fulfilling requesters only see their own.
            Role::Ngo | Role::CompostAgency => Ok(self
                .store
                .requests_by_requester(actor.user_id)
                .await?
                .into_iter()
                .filter(|r| r.status == RequestStatus::Pending)
                .collect()),
            Role::Donor | Role::Needy => {
                Err(MatchingError::Forbidden("role cannot accept requests"))
            }
        }
    }

    pub async fn my_requests(&self, actor: &Identity) -> Result<Vec<Request>, MatchingError> {
        Ok(self.store.requests_by_requester(actor.user_id).await?)
    }

    pub async fn assigned_requests(
        &self,
        actor: &Identity,
    ) -> Result<Vec<Request>, MatchingError> {
        Ok(self.store.requests_by_volunteer(actor.user_id).await?)
    }

    pub async fn get_request(
        &self,
        actor: &Identity,
        request_id: Uuid,
    ) -> Result<Request, MatchingError> {
        let request = self.load_request(request_id).await?;
        // Volunteers need to see open work before taking it.
        if actor.role == Role::Volunteer && request.status == RequestStatus::Pending {
            return Ok(request);
        }
        let (request, _) = self.load_as_party(actor, request_id).await?;
        Ok(request)
    }

    /// Volunteer acceptance, or self-fulfilment by an NGO or compost agency
    /// on its own request. Either way the actor becomes the assigned volunteer.
    pub async fn accept_request(
        &self,
        actor: &Identity,
        request_id: Uuid,
    ) -> Result<Request, MatchingError> {
        match actor.role {
            Role::Volunteer => {}
            Role::Ngo | Role::CompostAgency => {
                let request = self.load_request(request_id).await?;
                if request.requester_id != actor.user_id {
                    return Err(MatchingError::Forbidden(
                        "only the requester may self-fulfil",
                    ));
                }
                debug!(%request_id, role = %actor.role, "Self-fulfilment");
            }
            Role::Donor | Role::Needy | Role::Admin => {
                return Err(MatchingError::Forbidden("role cannot accept requests"));
            }
        }
        Ok(self
            .arbitrator
            .accept_request(request_id, actor.user_id)
            .await?)
    }

    /// Report delivery (or composting). Assigned volunteer, donor, or admin.
    ///
    /// Reaching a terminal status tears the tracking topic down.
    pub async fn advance_status(
        &self,
        actor: &Identity,
        request_id: Uuid,
        target: SdkRequestStatus,
    ) -> Result<Request, MatchingError> {
        let (request, donation) = self.load_as_party(actor, request_id).await?;
        let allowed = match actor.role {
            Role::Admin => true,
            Role::Donor => donation.donor_id == actor.user_id,
            Role::Ngo | Role::Needy | Role::Volunteer | Role::CompostAgency => {
                request.assigned_volunteer == Some(actor.user_id)
            }
        };
        if !allowed {
            return Err(MatchingError::Forbidden(
                "only the assigned volunteer, donor or admin",
            ));
        }

        let request = self
            .arbitrator
            .advance_status(request_id, target.into(), actor.user_id)
            .await?;
        if request.status.is_terminal() {
            self.hub.close(request_id);
        }
        Ok(request)
    }

    /// Cancel (requester) or reject (donor, admin) a pending claim.
    pub async fn release_claim(
        &self,
        actor: &Identity,
        request_id: Uuid,
    ) -> Result<Request, MatchingError> {
        let (request, donation) = self.load_as_party(actor, request_id).await?;
        let allowed = match actor.role {
            Role::Admin => true,
            Role::Donor => donation.donor_id == actor.user_id,
            Role::Ngo | Role::Needy | Role::Volunteer | Role::CompostAgency => {
                request.requester_id == actor.user_id
            }
        };
        if !allowed {
            return Err(MatchingError::Forbidden(
                "only the requester, donor or admin",
            ));
        }
        let request = self
            .arbitrator
            .release_claim(request_id, actor.user_id)
            .await?;
        self.hub.close(request_id);
        Ok(request)
    }

    // -- Tracking -----------------------------------------------------------

    /// Push the assigned volunteer's position to every observer.
    pub async fn publish_sample(
        &self,
        actor: &Identity,
        request_id: Uuid,
        body: PublishSample,
    ) -> Result<TrackingSample, MatchingError> {
        validate_coordinates(body.latitude, body.longitude)?;
        let request = self.load_request(request_id).await?;
        if request.assigned_volunteer != Some(actor.user_id) {
            return Err(MatchingError::Forbidden("not the assigned volunteer"));
        }
        if request.status != RequestStatus::Accepted {
            return Err(MatchingError::TrackingClosed);
        }

        let sample = TrackingSample {
            request_id,
            volunteer_id: actor.user_id,
            latitude: body.latitude,
            longitude: body.longitude,
            recorded_at: self.clock.now(),
        };
        let delivered = self.hub.publish(sample);
        // A terminal transition that closed the topic after our read would
        // otherwise leave this sample in a topic nobody closes again.
        if self.load_request(request_id).await?.status.is_terminal() {
            self.hub.close(request_id);
            return Err(MatchingError::TrackingClosed);
        }
        debug!(%request_id, delivered, "Tracking sample published");
        Ok(sample)
    }

    /// Volunteer stops sharing their position early.
    pub async fn end_tracking(
        &self,
        actor: &Identity,
        request_id: Uuid,
    ) -> Result<(), MatchingError> {
        let request = self.load_request(request_id).await?;
        let allowed = match actor.role {
            Role::Admin => true,
            Role::Donor | Role::Ngo | Role::Needy | Role::Volunteer | Role::CompostAgency => {
                request.assigned_volunteer == Some(actor.user_id)
            }
        };
        if !allowed {
            return Err(MatchingError::Forbidden("not the assigned volunteer"));
        }
        self.hub.close(request_id);
        Ok(())
    }

    /// Observe a request's live position. The first item is the latest
    /// known sample, if any.
    pub async fn subscribe_tracking(
        &self,
        actor: &Identity,
        request_id: Uuid,
    ) -> Result<TrackingSubscription, MatchingError> {
        let (request, _) = self.load_as_party(actor, request_id).await?;
        if request.status.is_terminal() {
            return Err(MatchingError::TrackingClosed);
        }

        let subscription = self.hub.subscribe(request_id);
        // The request may have finished between the read and the subscribe,
        // in which case the topic we joined will never be closed again.
        if self.load_request(request_id).await?.status.is_terminal() {
            self.hub.close(request_id);
            return Err(MatchingError::TrackingClosed);
        }
        Ok(subscription)
    }

    pub async fn latest_sample(
        &self,
        actor: &Identity,
        request_id: Uuid,
    ) -> Result<Option<TrackingSample>, MatchingError> {
        self.load_as_party(actor, request_id).await?;
        Ok(self.hub.latest(request_id))
    }

    pub async fn tracking_history(
        &self,
        actor: &Identity,
        request_id: Uuid,
    ) -> Result<Vec<TrackingSample>, MatchingError> {
        self.load_as_party(actor, request_id).await?;
        Ok(self.hub.history(request_id))
    }
}
