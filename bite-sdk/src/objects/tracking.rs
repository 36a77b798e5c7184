use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Body of `POST /api/v1/requests/{request_id}/tracking`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PublishSample {
    pub latitude: f64,
    pub longitude: f64,
}

/// One volunteer position reading.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TrackingSampleResponse {
    pub request_id: Uuid,
    pub volunteer_id: Uuid,
    pub latitude: f64,
    pub longitude: f64,
    /// Unix timestamp in milliseconds.
    pub recorded_at: i64,
}
