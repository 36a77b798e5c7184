pub mod donation;
pub mod request;
pub mod tracking;
pub mod ws;

pub use donation::{CreateDonation, DonationResponse, DonationStatus, DonationType, PickupLocation};
pub use request::{
    AdvanceRequestStatus, ClaimDonation, RequestResponse, RequestStatus, RequesterType,
};
pub use tracking::{PublishSample, TrackingSampleResponse};
pub use ws::{AuditReason, EventWsMessage, TrackingWsMessage};

use serde::{Deserialize, Serialize};

/// Caller role asserted by the authentication gateway.
///
/// The set is closed; every role-gated operation matches on it exhaustively.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Role {
    Donor,
    Ngo,
    Needy,
    Volunteer,
    CompostAgency,
    Admin,
}

impl Role {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Role::Donor => "DONOR",
            Role::Ngo => "NGO",
            Role::Needy => "NEEDY",
            Role::Volunteer => "VOLUNTEER",
            Role::CompostAgency => "COMPOST_AGENCY",
            Role::Admin => "ADMIN",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown role: {0}")]
pub struct UnknownRole(pub String);

impl std::str::FromStr for Role {
    type Err = UnknownRole;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "DONOR" => Ok(Role::Donor),
            "NGO" => Ok(Role::Ngo),
            "NEEDY" => Ok(Role::Needy),
            "VOLUNTEER" => Ok(Role::Volunteer),
            "COMPOST_AGENCY" => Ok(Role::CompostAgency),
            "ADMIN" => Ok(Role::Admin),
            other => Err(UnknownRole(other.to_owned())),
        }
    }
}

/// Error body returned by every non-2xx API response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Stable machine-readable code, e.g. `ALREADY_CLAIMED`.
    pub code: String,
    pub message: String,
    /// `true` when the caller may retry the same call later.
    #[serde(default)]
    pub retryable: bool,
}
