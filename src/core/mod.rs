pub mod context;
pub mod notifier;
pub mod orchestrator;
pub mod prober;
pub mod queue;
pub mod reservation;

pub use crate::domain::model::{BookingConfirmation, Candidate, Location, ProbeReport};
pub use crate::domain::ports::{CandidateHandler, LocationProbe, NotificationBackend, Transport};
pub use crate::utils::error::Result;
