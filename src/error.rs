use crate::api::ApiError;
use crate::core::StepId;
use crate::core::value_path::ValuePathParseError;
use crate::state::validation::FieldIssue;
use thiserror::Error;

/// Errors raised while assembling fields and steps into schemas.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ComposeError {
    #[error("Step id '{0}' is used by more than one step")]
    DuplicateStep(StepId),

    #[error("Field '{field}' depends on '{dependency}', which is not declared in the same step")]
    UnknownDependency { field: String, dependency: String },

    #[error("Dependency cycle between fields: {}", .path.join(" -> "))]
    DependencyCycle { path: Vec<String> },

    #[error("Field '{outer}' and field '{inner}' overlap; a field cannot contain another field")]
    PathConflict { outer: String, inner: String },

    #[error("Field '{field}' has an invalid pattern: {message}")]
    InvalidPattern { field: String, message: String },

    #[error("Step list dependency '{0}' must name the step it belongs to")]
    UnscopedDependency(String),

    #[error("Invalid path: {0}")]
    InvalidPath(#[from] ValuePathParseError),
}

/// Raised when an external document cannot be coerced into a schema.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("Cannot read '{}': {}", self.location(), .message)]
pub struct CastError {
    pub step: Option<StepId>,
    pub path: String,
    pub message: String,
}

impl CastError {
    pub fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            step: None,
            path: path.into(),
            message: message.into(),
        }
    }

    pub fn in_step(mut self, step: &StepId) -> Self {
        self.step = Some(step.clone());
        self
    }

    /// Offending location as a selector (`step::path`).
    pub fn location(&self) -> String {
        match (&self.step, self.path.is_empty()) {
            (Some(step), true) => step.to_string(),
            (Some(step), false) => format!("{}::{}", step, self.path),
            (None, true) => "<root>".to_string(),
            (None, false) => self.path.clone(),
        }
    }
}

/// Refusals and failures of the wizard lifecycle. A refused transition never
/// changes the wizard phase or form state.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum WizardError {
    #[error("Step '{step}' has {} invalid field(s)", .issues.len())]
    StepInvalid { step: StepId, issues: Vec<FieldIssue> },

    #[error("Form has {} invalid field(s)", .issues.len())]
    FormInvalid { issues: Vec<FieldIssue> },

    #[error("Waiting for data required by step '{0}'")]
    Loading(StepId),

    #[error("Wizard is not on an active step")]
    NotActive,

    #[error("Already on the first step")]
    AtFirstStep,

    #[error("Already on the last step")]
    AtLastStep,

    #[error("Submit is only available on the last step")]
    NotOnLastStep,

    #[error("Unknown step '{0}'")]
    UnknownStep(StepId),

    #[error(transparent)]
    Cast(#[from] CastError),

    #[error(transparent)]
    Compose(#[from] ComposeError),

    #[error("Submission rejected: {0}")]
    Submission(ApiError),

    #[error("Transform failed: {0}")]
    Transform(String),
}

/// Errors raised while loading declarative wizard files.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read wizard file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse wizard YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Failed to parse wizard JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Compose(#[from] ComposeError),

    #[error("A form declares exactly one step, found {0}")]
    NotAForm(usize),
}
