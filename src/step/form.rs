use crate::core::StepId;
use crate::core::value::Value;
use crate::core::value_path::FieldRef;
use crate::error::{ComposeError, WizardError};
use crate::schema::compose::ObjectSchema;
use crate::schema::field::FieldDescriptor;
use crate::state::context::FormContext;
use crate::state::store::FormState;
use crate::step::definition::StepDefinition;
use crate::step::lifecycle::{ActiveSteps, FormLifecycle};
use crate::step::transform::TransformHooks;

/// Single page form: a wizard of exactly one step whose namespace is the
/// form id.
#[derive(Debug, Clone)]
pub struct Form {
    step: StepDefinition,
    hooks: TransformHooks,
}

impl Form {
    pub fn new(
        id: impl Into<StepId>,
        fields: impl IntoIterator<Item = FieldDescriptor>,
    ) -> Result<Self, ComposeError> {
        let id = id.into();
        let step = StepDefinition::builder(id.clone(), id.as_str())
            .fields(fields)
            .build()?;
        Ok(Self::from_step(step))
    }

    pub fn from_step(step: StepDefinition) -> Self {
        Self {
            step,
            hooks: TransformHooks::default(),
        }
    }

    pub fn with_initial_transform(
        mut self,
        hook: impl Fn(&Value, &ActiveSteps, &FormContext<'_>) -> Result<FormState, WizardError>
        + Send
        + Sync
        + 'static,
    ) -> Self {
        self.hooks.set_initial(hook);
        self
    }

    pub fn with_submit_transform(
        mut self,
        hook: impl Fn(&FormState, Option<&Value>, &ActiveSteps, &FormContext<'_>) -> Result<Value, WizardError>
        + Send
        + Sync
        + 'static,
    ) -> Self {
        self.hooks.set_submit(hook);
        self
    }

    pub fn id(&self) -> &StepId {
        &self.step.id
    }

    pub fn step(&self) -> &StepDefinition {
        &self.step
    }

    pub fn object_schema(&self, ctx: &FormContext<'_>) -> Result<ObjectSchema, ComposeError> {
        self.step.schema(ctx)
    }
}

impl FormLifecycle for Form {
    fn resolve(&self, ctx: &FormContext<'_>) -> Result<ActiveSteps, ComposeError> {
        ActiveSteps::resolve(vec![self.step.clone()], ctx)
    }

    fn depends_on(&self) -> &[FieldRef] {
        &[]
    }

    fn transform_initial_value(
        &self,
        document: &Value,
        ctx: &FormContext<'_>,
    ) -> Result<FormState, WizardError> {
        self.hooks.seed(|probe| self.resolve(probe), document, ctx)
    }

    fn transform_before_submit(
        &self,
        state: &FormState,
        original: Option<&Value>,
        ctx: &FormContext<'_>,
    ) -> Result<Value, WizardError> {
        self.hooks
            .finish(|probe| self.resolve(probe), state, original, ctx)
    }
}
