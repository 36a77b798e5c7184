//! Events published by the engine after a committed status change.
//!
//! Events carry identifiers and the new status only. They are best-effort:
//! nothing downstream depends on receiving every one.

use crate::entities::{DonationStatus, RequestStatus};
use bite_sdk::objects::{AuditReason, EventWsMessage};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineEvent {
    DonationStatusChanged {
        donation_id: Uuid,
        status: DonationStatus,
    },
    RequestStatusChanged {
        request_id: Uuid,
        donation_id: Uuid,
        status: RequestStatus,
    },
    /// The sweeper found a record it is not allowed to fix on its own.
    AuditCandidate {
        donation_id: Uuid,
        request_id: Option<Uuid>,
        reason: AuditReason,
    },
}

impl From<EngineEvent> for EventWsMessage {
    fn from(event: EngineEvent) -> Self {
        match event {
            EngineEvent::DonationStatusChanged {
                donation_id,
                status,
            } => EventWsMessage::DonationStatusChanged {
                donation_id,
                status: status.into(),
            },
            EngineEvent::RequestStatusChanged {
                request_id,
                donation_id,
                status,
            } => EventWsMessage::RequestStatusChanged {
                request_id,
                donation_id,
                status: status.into(),
            },
            EngineEvent::AuditCandidate {
                donation_id,
                request_id,
                reason,
            } => EventWsMessage::AuditCandidate {
                donation_id,
                request_id,
                reason,
            },
        }
    }
}
