use crate::core::StepId;
use crate::core::value_path::{FieldRef, ValuePath};
use crate::error::ConfigError;
use crate::schema::compose::UnknownKeys;
use crate::schema::condition::Condition;
use crate::schema::field::FieldDescriptor;
use crate::step::definition::StepDefinition;
use crate::step::form::Form;
use crate::step::lifecycle::FormLifecycle;
use crate::step::sequencer::Steps;
use schemars::JsonSchema;
use schemars::schema::RootSchema;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum WizardKind {
    #[default]
    Wizard,
    Form,
}

/// A wizard declared in a YAML or JSON file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct WizardConfig {
    pub id: String,
    #[serde(default)]
    pub kind: WizardKind,
    /// Applies to every step; a step can still opt in on its own.
    #[serde(default)]
    pub unknown_keys: UnknownKeys,
    pub steps: Vec<StepConfig>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct StepConfig {
    pub id: StepId,
    #[serde(default)]
    pub label: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Sub-document the step reads and writes, e.g. `TEMPLATE`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub binding: Option<ValuePath>,
    /// Local references resolve against this step's own values.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub visible_when: Option<Condition>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub fetch: Vec<String>,
    #[serde(default)]
    pub preserve_unknown: bool,
    #[serde(default)]
    pub fields: Vec<FieldDescriptor>,
}

impl StepConfig {
    fn to_definition(&self, unknown_keys: UnknownKeys) -> Result<StepDefinition, ConfigError> {
        let label = if self.label.is_empty() {
            self.id.as_str()
        } else {
            self.label.as_str()
        };
        let mut builder = StepDefinition::builder(self.id.clone(), label)
            .fields(self.fields.iter().cloned());
        if let Some(description) = &self.description {
            builder = builder.description(description.as_str());
        }
        if let Some(binding) = &self.binding {
            builder = builder.at(binding);
        }
        for key in &self.fetch {
            builder = builder.fetch(key.as_str());
        }
        if self.preserve_unknown || unknown_keys == UnknownKeys::Preserve {
            builder = builder.preserve_unknown();
        }
        Ok(builder.build()?)
    }

    /// References of the step condition, qualified with this step.
    fn condition_reads(&self) -> Vec<FieldRef> {
        self.visible_when
            .as_ref()
            .map(|condition| {
                condition
                    .reads()
                    .into_iter()
                    .map(|field| field.scoped(&self.id))
                    .collect()
            })
            .unwrap_or_default()
    }
}

impl WizardConfig {
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)?;
        let is_json = path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));
        let config = if is_json {
            Self::from_json_str(raw.as_str())?
        } else {
            Self::from_yaml_str(raw.as_str())?
        };
        debug!(
            path = %path.display(),
            wizard = %config.id,
            steps = config.steps.len(),
            "loaded wizard file"
        );
        Ok(config)
    }

    pub fn from_yaml_str(raw: &str) -> Result<Self, ConfigError> {
        Ok(serde_yaml::from_str(raw)?)
    }

    pub fn from_json_str(raw: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(raw)?)
    }

    /// JSON Schema of the file format.
    pub fn json_schema() -> RootSchema {
        schemars::schema_for!(WizardConfig)
    }

    /// Compiles the steps into a sequencer. Any step with `visible_when`
    /// makes the list dynamic; a condition that cannot be decided yet hides
    /// its step.
    pub fn into_steps(self) -> Result<Steps, ConfigError> {
        let mut depends_on = Vec::new();
        let mut entries = Vec::with_capacity(self.steps.len());
        for step in &self.steps {
            for field in step.condition_reads() {
                if !depends_on.contains(&field) {
                    depends_on.push(field);
                }
            }
            entries.push((
                step.visible_when.clone(),
                step.to_definition(self.unknown_keys)?,
            ));
        }

        if entries.iter().all(|(condition, _)| condition.is_none()) {
            return Ok(Steps::fixed(
                entries.into_iter().map(|(_, definition)| definition),
            ));
        }

        let steps = Steps::dynamic(depends_on, move |ctx| {
            entries
                .iter()
                .filter(|(condition, definition)| {
                    condition
                        .as_ref()
                        .is_none_or(|condition| condition.evaluate(&ctx.scope(&definition.id)) == Some(true))
                })
                .map(|(_, definition)| definition.clone())
                .collect()
        })?;
        Ok(steps)
    }

    /// A form declares exactly one step; its id is the state namespace.
    pub fn into_form(self) -> Result<Form, ConfigError> {
        let [step] = self.steps.as_slice() else {
            return Err(ConfigError::NotAForm(self.steps.len()));
        };
        let definition = step.to_definition(self.unknown_keys)?;
        Ok(Form::from_step(definition))
    }

    pub fn into_lifecycle(self) -> Result<Box<dyn FormLifecycle + Send + Sync>, ConfigError> {
        Ok(match self.kind {
            WizardKind::Wizard => Box::new(self.into_steps()?),
            WizardKind::Form => Box::new(self.into_form()?),
        })
    }
}
