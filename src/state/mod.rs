pub mod context;
pub mod store;
pub mod validation;

pub use context::{AuxData, FetchStatus, FormContext, ResolveScope};
pub use store::FormState;
pub use validation::{ErrorVisibility, FieldIssue, ValidationState};
