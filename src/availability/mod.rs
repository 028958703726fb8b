pub mod engine;
pub mod interval;

pub use engine::{AvailabilityEngine, Slot};
pub use interval::Interval;
