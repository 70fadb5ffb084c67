use crate::api::SessionContext;
use crate::core::StepId;
use crate::core::value::Value;
use crate::core::value_path::{FieldRef, ValuePath};
use crate::state::store::FormState;
use indexmap::IndexMap;

#[derive(Debug, Clone, PartialEq)]
pub enum FetchStatus {
    Pending,
    Ready(Value),
    Failed(String),
}

/// Results of auxiliary requests (option lists, provider lookups) keyed by
/// the fetch key a step declares.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AuxData {
    entries: IndexMap<String, FetchStatus>,
}

impl AuxData {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<&FetchStatus> {
        self.entries.get(key)
    }

    pub fn ready(&self, key: &str) -> Option<&Value> {
        match self.entries.get(key) {
            Some(FetchStatus::Ready(value)) => Some(value),
            _ => None,
        }
    }

    pub fn is_pending(&self, key: &str) -> bool {
        matches!(self.entries.get(key), Some(FetchStatus::Pending))
    }

    pub fn set(&mut self, key: impl Into<String>, status: FetchStatus) {
        self.entries.insert(key.into(), status);
    }

    pub fn with(mut self, key: impl Into<String>, status: FetchStatus) -> Self {
        self.set(key, status);
        self
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &FetchStatus)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }
}

/// Everything a step list, schema resolver or condition may read. Passed
/// explicitly instead of living in shared module state.
#[derive(Debug, Clone, Copy)]
pub struct FormContext<'a> {
    pub state: &'a FormState,
    pub session: &'a SessionContext,
    pub aux: &'a AuxData,
    pub initial: Option<&'a Value>,
}

impl<'a> FormContext<'a> {
    pub fn new(state: &'a FormState, session: &'a SessionContext, aux: &'a AuxData) -> Self {
        Self {
            state,
            session,
            aux,
            initial: None,
        }
    }

    pub fn with_initial(mut self, initial: Option<&'a Value>) -> Self {
        self.initial = initial;
        self
    }

    pub fn with_state(mut self, state: &'a FormState) -> Self {
        self.state = state;
        self
    }

    /// Value of a fully scoped reference; local references have no owner
    /// here and resolve to `None`.
    pub fn value(&self, field: &FieldRef) -> Option<&'a Value> {
        let step = field.step.as_ref()?;
        self.state.get(step.as_str(), &field.path)
    }

    pub fn scope(&self, step: &'a StepId) -> ResolveScope<'a> {
        ResolveScope { ctx: *self, step }
    }
}

/// A form context seen from inside one step.
#[derive(Debug, Clone, Copy)]
pub struct ResolveScope<'a> {
    pub ctx: FormContext<'a>,
    pub step: &'a StepId,
}

impl<'a> ResolveScope<'a> {
    pub fn value(&self, field: &FieldRef) -> Option<&'a Value> {
        self.ctx.state.lookup(field, self.step)
    }

    pub fn own(&self, path: &ValuePath) -> Option<&'a Value> {
        self.ctx.state.get(self.step.as_str(), path)
    }

    pub fn session(&self) -> &'a SessionContext {
        self.ctx.session
    }

    pub fn aux(&self) -> &'a AuxData {
        self.ctx.aux
    }
}
