use crate::core::StepId;
use crate::core::value::Value;
use crate::core::value_path::FieldRef;
use crate::error::{ComposeError, WizardError};
use crate::schema::compose::{CombinedSchema, ObjectSchema};
use crate::state::context::FormContext;
use crate::state::store::FormState;
use crate::step::definition::StepDefinition;
use std::collections::HashSet;
use tracing::debug;

/// Step list of one recomputation pass with the schema each step resolved
/// to in that pass.
#[derive(Debug, Clone, Default)]
pub struct ActiveSteps {
    steps: Vec<StepDefinition>,
    schema: CombinedSchema,
}

impl ActiveSteps {
    /// Resolves every step's schema. Step ids must be unique; a field
    /// reading a step outside the list stays unresolved at runtime.
    pub fn resolve(
        steps: Vec<StepDefinition>,
        ctx: &FormContext<'_>,
    ) -> Result<Self, ComposeError> {
        let mut seen = HashSet::<&StepId>::with_capacity(steps.len());
        for step in &steps {
            if !seen.insert(&step.id) {
                return Err(ComposeError::DuplicateStep(step.id.clone()));
            }
        }

        let mut schema = CombinedSchema::new();
        for step in &steps {
            let step_schema = step.schema(ctx)?;
            for field in step_schema.descriptors() {
                for dependency in field.dependencies() {
                    let Some(target) = dependency.step.as_ref() else {
                        continue;
                    };
                    if !seen.contains(target) {
                        debug!(
                            step = %step.id,
                            field = %field.name,
                            dependency = %dependency,
                            "dependency names an inactive step"
                        );
                    }
                }
            }
            schema.insert(&step.id, step_schema);
        }

        Ok(Self { steps, schema })
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn steps(&self) -> &[StepDefinition] {
        self.steps.as_slice()
    }

    pub fn schema(&self) -> &CombinedSchema {
        &self.schema
    }

    pub fn ids(&self) -> Vec<StepId> {
        self.steps.iter().map(|step| step.id.clone()).collect()
    }

    pub fn position(&self, id: &str) -> Option<usize> {
        self.steps.iter().position(|step| step.id.as_str() == id)
    }

    pub fn get(&self, index: usize) -> Option<(&StepDefinition, &ObjectSchema)> {
        let step = self.steps.get(index)?;
        let schema = self.schema.step(step.id.as_str())?;
        Some((step, schema))
    }

    pub fn iter(&self) -> impl Iterator<Item = (&StepDefinition, &ObjectSchema)> {
        self.steps
            .iter()
            .filter_map(|step| Some((step, self.schema.step(step.id.as_str())?)))
    }

    pub fn into_steps(self) -> Vec<StepDefinition> {
        self.steps
    }

    pub fn into_schema(self) -> CombinedSchema {
        self.schema
    }
}

/// Shared contract of wizards and single page forms, so callers and the
/// stepper drive both the same way.
pub trait FormLifecycle {
    /// Active steps and their schemas for the given context.
    fn resolve(&self, ctx: &FormContext<'_>) -> Result<ActiveSteps, ComposeError>;

    /// Fields whose change recomputes the active step list.
    fn depends_on(&self) -> &[FieldRef];

    /// External document into per-step form state. Pure: the same document
    /// always gives the same state.
    fn transform_initial_value(
        &self,
        document: &Value,
        ctx: &FormContext<'_>,
    ) -> Result<FormState, WizardError>;

    /// Form state back into the external document. `original` is the
    /// document being edited, if any.
    fn transform_before_submit(
        &self,
        state: &FormState,
        original: Option<&Value>,
        ctx: &FormContext<'_>,
    ) -> Result<Value, WizardError>;

    fn active_steps(&self, ctx: &FormContext<'_>) -> Result<Vec<StepDefinition>, ComposeError> {
        Ok(self.resolve(ctx)?.into_steps())
    }

    fn schema(&self, ctx: &FormContext<'_>) -> Result<CombinedSchema, ComposeError> {
        Ok(self.resolve(ctx)?.into_schema())
    }
}

impl<T: FormLifecycle + ?Sized> FormLifecycle for Box<T> {
    fn resolve(&self, ctx: &FormContext<'_>) -> Result<ActiveSteps, ComposeError> {
        (**self).resolve(ctx)
    }

    fn depends_on(&self) -> &[FieldRef] {
        (**self).depends_on()
    }

    fn transform_initial_value(
        &self,
        document: &Value,
        ctx: &FormContext<'_>,
    ) -> Result<FormState, WizardError> {
        (**self).transform_initial_value(document, ctx)
    }

    fn transform_before_submit(
        &self,
        state: &FormState,
        original: Option<&Value>,
        ctx: &FormContext<'_>,
    ) -> Result<Value, WizardError> {
        (**self).transform_before_submit(state, original, ctx)
    }
}
