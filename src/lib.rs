pub mod api;
pub mod config;
pub mod core;
pub mod error;
pub mod runtime;
pub mod schema;
pub mod state;
pub mod step;

pub use api::{ApiError, ResourceClient, SessionContext};
pub use config::WizardConfig;
pub use core::StepId;
pub use core::value::Value;
pub use core::value_path::{FieldRef, ValuePath};
pub use error::{CastError, ComposeError, ConfigError, WizardError};
pub use runtime::{FetchTicket, Phase, Stepper};
pub use schema::{Condition, FieldDescriptor, FieldKind, ObjectSchema, compose};
pub use state::{AuxData, FormContext, FormState, ValidationState};
pub use step::{ActiveSteps, Form, FormLifecycle, StepDefinition, Steps};
