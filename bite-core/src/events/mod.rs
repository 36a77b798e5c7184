pub mod channels;
pub mod types;

pub use channels::{
    DEFAULT_EVENT_BUFFER, EngineEventReceiver, EngineEventSender, emit, engine_event_channel,
};
pub use types::EngineEvent;
