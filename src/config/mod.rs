pub mod wizard;

pub use wizard::{StepConfig, WizardConfig, WizardKind};
