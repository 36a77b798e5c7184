//! Background processors.
//!
//! - `LifecycleSweeper`: expires stale donations and reports inconsistent
//!   records as audit candidates

pub mod lifecycle_sweeper;

pub use lifecycle_sweeper::{AuditFinding, LifecycleSweeper, SweepReport};
