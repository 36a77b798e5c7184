use super::types::EngineEvent;
use tokio::sync::broadcast;

/// Buffer for the engine event channel. Slow listeners see `Lagged`.
pub const DEFAULT_EVENT_BUFFER: usize = 256;

pub type EngineEventSender = broadcast::Sender<EngineEvent>;
pub type EngineEventReceiver = broadcast::Receiver<EngineEvent>;

/// Create the engine event channel.
///
/// The initial receiver may be dropped; late listeners call
/// `sender.subscribe()`.
pub fn engine_event_channel() -> (EngineEventSender, EngineEventReceiver) {
    broadcast::channel(DEFAULT_EVENT_BUFFER)
}

/// Publish without caring whether anyone listens.
pub fn emit(sender: &EngineEventSender, event: EngineEvent) {
    if sender.send(event).is_err() {
        tracing::trace!(?event, "No engine event listeners");
    }
}
