pub mod definition;
pub mod form;
pub mod lifecycle;
pub mod sequencer;
pub mod transform;

pub use definition::{
    DocumentBinding, Resolver, StepBuilder, StepDefinition, StepProps, StepView,
};
pub use form::Form;
pub use lifecycle::{ActiveSteps, FormLifecycle};
pub use sequencer::{StepSource, Steps};
pub use transform::TransformHooks;
