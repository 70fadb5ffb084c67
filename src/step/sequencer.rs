use crate::core::value::Value;
use crate::core::value_path::FieldRef;
use crate::error::{ComposeError, WizardError};
use crate::schema::compose::CombinedSchema;
use crate::state::context::FormContext;
use crate::state::store::FormState;
use crate::step::definition::StepDefinition;
use crate::step::lifecycle::{ActiveSteps, FormLifecycle};
use crate::step::transform::TransformHooks;
use std::fmt;
use std::sync::Arc;

pub type StepsFn = dyn Fn(&FormContext<'_>) -> Vec<StepDefinition> + Send + Sync;

#[derive(Clone)]
pub enum StepSource {
    Static(Vec<StepDefinition>),
    /// Step list computed from the context. `depends_on` names every field
    /// `build` reads, each qualified with its step.
    Dynamic {
        depends_on: Vec<FieldRef>,
        build: Arc<StepsFn>,
    },
}

impl fmt::Debug for StepSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Static(steps) => f.debug_tuple("Static").field(steps).finish(),
            Self::Dynamic { depends_on, .. } => f
                .debug_struct("Dynamic")
                .field("depends_on", depends_on)
                .finish_non_exhaustive(),
        }
    }
}

/// Ordered or computed step list behind one wizard.
#[derive(Debug, Clone)]
pub struct Steps {
    source: StepSource,
    hooks: TransformHooks,
}

impl Steps {
    pub fn new(source: StepSource) -> Result<Self, ComposeError> {
        if let StepSource::Dynamic { depends_on, .. } = &source
            && let Some(unscoped) = depends_on.iter().find(|field| field.step.is_none())
        {
            return Err(ComposeError::UnscopedDependency(unscoped.to_string()));
        }
        Ok(Self {
            source,
            hooks: TransformHooks::default(),
        })
    }

    pub fn fixed(steps: impl IntoIterator<Item = StepDefinition>) -> Self {
        Self {
            source: StepSource::Static(steps.into_iter().collect()),
            hooks: TransformHooks::default(),
        }
    }

    pub fn dynamic(
        depends_on: impl IntoIterator<Item = FieldRef>,
        build: impl Fn(&FormContext<'_>) -> Vec<StepDefinition> + Send + Sync + 'static,
    ) -> Result<Self, ComposeError> {
        Self::new(StepSource::Dynamic {
            depends_on: depends_on.into_iter().collect(),
            build: Arc::new(build),
        })
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

    pub fn source(&self) -> &StepSource {
        &self.source
    }

    /// Recomputes the step list. Synchronous on every call.
    pub fn active(&self, ctx: &FormContext<'_>) -> Result<Vec<StepDefinition>, ComposeError> {
        self.active_steps(ctx)
    }

    pub fn combined_schema(&self, ctx: &FormContext<'_>) -> Result<CombinedSchema, ComposeError> {
        self.schema(ctx)
    }
}

impl FormLifecycle for Steps {
    fn resolve(&self, ctx: &FormContext<'_>) -> Result<ActiveSteps, ComposeError> {
        let steps = match &self.source {
            StepSource::Static(steps) => steps.clone(),
            StepSource::Dynamic { build, .. } => build(ctx),
        };
        ActiveSteps::resolve(steps, ctx)
    }

    fn depends_on(&self) -> &[FieldRef] {
        match &self.source {
            StepSource::Static(_) => &[],
            StepSource::Dynamic { depends_on, .. } => depends_on.as_slice(),
        }
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
