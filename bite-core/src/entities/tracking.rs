use bite_sdk::objects::TrackingSampleResponse;
use time::OffsetDateTime;
use uuid::Uuid;

/// One volunteer position reading. Never persisted.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrackingSample {
    pub request_id: Uuid,
    pub volunteer_id: Uuid,
    pub latitude: f64,
    pub longitude: f64,
    pub recorded_at: OffsetDateTime,
}

impl TrackingSample {
    /// Latitude within ±90° and longitude within ±180°, both finite.
    pub fn has_valid_coordinates(&self) -> bool {
        self.latitude.is_finite()
            && self.longitude.is_finite()
            && (-90.0..=90.0).contains(&self.latitude)
            && (-180.0..=180.0).contains(&self.longitude)
    }
}

impl From<&TrackingSample> for TrackingSampleResponse {
    fn from(sample: &TrackingSample) -> Self {
        TrackingSampleResponse {
            request_id: sample.request_id,
            volunteer_id: sample.volunteer_id,
            latitude: sample.latitude,
            longitude: sample.longitude,
            recorded_at: (sample.recorded_at.unix_timestamp_nanos() / 1_000_000) as i64,
        }
    }
}
