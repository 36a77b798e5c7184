//! Request (claim) bodies.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RequesterType {
    Ngo,
    Volunteer,
    Needy,
    CompostAgency,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RequestStatus {
    Pending,
    Accepted,
    Delivered,
    Composted,
    Rejected,
}

/// Body of `POST /api/v1/donations/{donation_id}/claim`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClaimDonation {
    #[serde(default)]
    pub delivery_address: Option<String>,
}

/// Body of `POST /api/v1/requests/{request_id}/status`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdvanceRequestStatus {
    pub status: RequestStatus,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestResponse {
    pub request_id: Uuid,
    pub donation_id: Uuid,
    pub requester_id: Uuid,
    pub requester_type: RequesterType,
    pub assigned_volunteer: Option<Uuid>,
    pub status: RequestStatus,
    pub pickup_address: Option<String>,
    pub delivery_address: Option<String>,
    pub created_at: i64,
}
