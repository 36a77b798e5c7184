mod hub;

pub use hub::{TrackingHub, TrackingSubscription};
