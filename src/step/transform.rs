//! Default transform hooks between external documents and form state.

use crate::core::value::Value;
use crate::error::{CastError, ComposeError, WizardError};
use crate::state::context::FormContext;
use crate::state::store::FormState;
use crate::step::lifecycle::ActiveSteps;
use std::sync::Arc;
use tracing::{debug, warn};

pub type InitialTransformFn =
    dyn Fn(&Value, &ActiveSteps, &FormContext<'_>) -> Result<FormState, WizardError> + Send + Sync;
pub type SubmitTransformFn = dyn Fn(&FormState, Option<&Value>, &ActiveSteps, &FormContext<'_>) -> Result<Value, WizardError>
    + Send
    + Sync;

/// Seeding re-resolves the step list with the state it produced until the
/// list settles. Step lists that depend on step values need one extra pass
/// per level of dependency.
const MAX_SEED_PASSES: usize = 8;

/// Casts each active step's bound slice of `document`.
pub fn read_document(active: &ActiveSteps, document: &Value) -> Result<FormState, CastError> {
    let mut state = FormState::new();
    for (step, schema) in active.iter() {
        state.insert(&step.id, step.read_document(schema, document)?);
    }
    Ok(state)
}

/// Starts from a copy of `original` and writes every active step at its
/// binding. Steps without a namespace in `state` write their defaults.
pub fn write_document(active: &ActiveSteps, state: &FormState, original: Option<&Value>) -> Value {
    let mut document = original.cloned().unwrap_or_else(Value::object);
    for (step, schema) in active.iter() {
        let values = state
            .namespace(step.id.as_str())
            .cloned()
            .unwrap_or_else(|| schema.default_value());
        step.write_document(schema, &mut document, &values);
    }
    document
}

/// Optional replacements for the default transforms, shared by `Steps` and
/// `Form`.
#[derive(Clone, Default)]
pub struct TransformHooks {
    initial: Option<Arc<InitialTransformFn>>,
    submit: Option<Arc<SubmitTransformFn>>,
}

impl TransformHooks {
    pub fn set_initial(
        &mut self,
        hook: impl Fn(&Value, &ActiveSteps, &FormContext<'_>) -> Result<FormState, WizardError>
        + Send
        + Sync
        + 'static,
    ) {
        self.initial = Some(Arc::new(hook));
    }

    pub fn set_submit(
        &mut self,
        hook: impl Fn(&FormState, Option<&Value>, &ActiveSteps, &FormContext<'_>) -> Result<Value, WizardError>
        + Send
        + Sync
        + 'static,
    ) {
        self.submit = Some(Arc::new(hook));
    }

    pub fn initial(
        &self,
        document: &Value,
        active: &ActiveSteps,
        ctx: &FormContext<'_>,
    ) -> Result<FormState, WizardError> {
        match &self.initial {
            Some(hook) => hook(document, active, ctx),
            None => Ok(read_document(active, document)?),
        }
    }

    pub fn submit(
        &self,
        state: &FormState,
        original: Option<&Value>,
        active: &ActiveSteps,
        ctx: &FormContext<'_>,
    ) -> Result<Value, WizardError> {
        match &self.submit {
            Some(hook) => hook(state, original, active, ctx),
            None => Ok(write_document(active, state, original)),
        }
    }

    /// Seeds form state from `document`, starting from an empty state so
    /// the result depends on the document alone.
    pub fn seed(
        &self,
        resolve: impl Fn(&FormContext<'_>) -> Result<ActiveSteps, ComposeError>,
        document: &Value,
        ctx: &FormContext<'_>,
    ) -> Result<FormState, WizardError> {
        let mut state = FormState::new();
        let mut ids = None;
        for pass in 0..MAX_SEED_PASSES {
            let (next_ids, next) = {
                let probe = FormContext {
                    state: &state,
                    initial: Some(document),
                    ..*ctx
                };
                let active = resolve(&probe)?;
                (active.ids(), self.initial(document, &active, &probe)?)
            };
            let settled = ids.as_ref() == Some(&next_ids) && next == state;
            state = next;
            ids = Some(next_ids);
            if settled {
                debug!(passes = pass + 1, "initial value settled");
                return Ok(state);
            }
        }
        warn!(
            passes = MAX_SEED_PASSES,
            "step list did not settle while seeding; using the last pass"
        );
        Ok(state)
    }

    pub fn finish(
        &self,
        resolve: impl Fn(&FormContext<'_>) -> Result<ActiveSteps, ComposeError>,
        state: &FormState,
        original: Option<&Value>,
        ctx: &FormContext<'_>,
    ) -> Result<Value, WizardError> {
        let probe = FormContext { state, ..*ctx };
        let active = resolve(&probe)?;
        self.submit(state, original, &active, &probe)
    }
}

impl std::fmt::Debug for TransformHooks {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransformHooks")
            .field("initial", &self.initial.is_some())
            .field("submit", &self.submit.is_some())
            .finish()
    }
}
