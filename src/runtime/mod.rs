pub mod fetch;
pub mod flow;
pub mod stepper;

pub use fetch::{FetchRegistry, FetchTicket, SessionId};
pub use flow::{Flow, StepStatus};
pub use stepper::{Phase, Stepper};
