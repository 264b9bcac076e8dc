//! Background processing queue: decouples slow AI classification from the
//! capture flow and makes it resumable.

pub mod status;
pub mod worker;

pub use status::{PackageStatus, StatusEvent};
pub use worker::BackgroundQueue;
