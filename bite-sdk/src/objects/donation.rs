//! Donation request and response bodies.

use compact_str::CompactString;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
/// Who the food is fit for.
pub enum DonationType {
    Human,
    Dog,
    Compost,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DonationStatus {
    Available,
    Requested,
    Assigned,
    Delivered,
    Composted,
    Expired,
    Rejected,
}

/// Where the volunteer picks the food up.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PickupLocation {
    pub address: String,
    #[serde(default)]
    pub latitude: Option<f64>,
    #[serde(default)]
    pub longitude: Option<f64>,
}

/// Body of `POST /api/v1/donations`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreateDonation {
    pub food_name: CompactString,
    #[serde(default)]
    pub description: String,
    /// Meals, or kg-equivalent for bulk food.
    pub quantity: i32,
    pub donation_type: DonationType,
    /// Unix timestamp (seconds).
    pub expires_at: i64,
    pub pickup: PickupLocation,
    /// Reference produced by the upload service, if a photo was attached.
    #[serde(default)]
    pub photo_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DonationResponse {
    pub donation_id: Uuid,
    pub donor_id: Uuid,
    pub food_name: CompactString,
    pub description: String,
    pub quantity: i32,
    pub donation_type: DonationType,
    pub status: DonationStatus,
    pub expires_at: i64,
    pub pickup: PickupLocation,
    pub photo_url: Option<String>,
    pub created_at: i64,
}
