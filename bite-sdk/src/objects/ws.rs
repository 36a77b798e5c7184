//! WebSocket message types.
//!
//! # Tracking stream (`GET /requests/{request_id}/tracking/ws`)
//!
//! 1. If the volunteer has already published, the first frame is a
//!    [`TrackingWsMessage::Sample`] carrying the latest position only.
//! 2. Every sample published afterwards follows, in publish order.
//!    Samples may be skipped when the client falls behind.
//! 3. When the request reaches a terminal status or the volunteer ends
//!    tracking, the server sends [`TrackingWsMessage::Closed`] followed by
//!    a normal close frame.
//!
//! # Engine event stream (`GET /admin/events/ws`)
//!
//! One [`EventWsMessage`] per status change or audit candidate.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::donation::DonationStatus;
use super::request::RequestStatus;
use super::tracking::TrackingSampleResponse;

/// Server-to-client frame on the tracking stream.
///
/// ```json
/// {"type":"sample","sample":{ ... }}
/// {"type":"closed"}
/// {"type":"error","code":4004,"reason":"request not found"}
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TrackingWsMessage {
    Sample { sample: TrackingSampleResponse },
    /// The topic was torn down; no more samples will follow.
    Closed,
    Error { code: u16, reason: String },
}

/// Why the lifecycle sweeper flagged a record for audit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditReason {
    /// Claimed donation whose expiry passed before delivery.
    ExpiredWhileRequested,
    /// Donation marked as claimed without a live request behind it.
    OrphanedClaim,
    /// Live request whose donation does not mirror its status.
    StatusMismatch,
}

/// Server-to-client frame on the admin event stream.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventWsMessage {
    DonationStatusChanged {
        donation_id: Uuid,
        status: DonationStatus,
    },
    RequestStatusChanged {
        request_id: Uuid,
        donation_id: Uuid,
        status: RequestStatus,
    },
    AuditCandidate {
        donation_id: Uuid,
        request_id: Option<Uuid>,
        reason: AuditReason,
    },
    /// The server dropped `skipped` events because the client fell behind.
    Lagged { skipped: u64 },
}

/// Well-known WebSocket close codes.
///
/// Codes in the 4000–4999 range are reserved for application use by
/// [RFC 6455 §7.4.2](https://www.rfc-editor.org/rfc/rfc6455#section-7.4.2).
pub struct WsCloseCode;

impl WsCloseCode {
    /// Normal closure after the topic was torn down.
    pub const NORMAL: u16 = 1000;

    pub const INTERNAL_ERROR: u16 = 1011;

    /// The caller may not observe this request.
    pub const FORBIDDEN: u16 = 4003;

    pub const REQUEST_NOT_FOUND: u16 = 4004;

    /// The request is already terminal; there is nothing to track.
    pub const TRACKING_CLOSED: u16 = 4010;
}
