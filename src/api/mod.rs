pub mod client;
pub mod session;

pub use client::{ApiError, QueryState, ResourceClient};
pub use session::SessionContext;
