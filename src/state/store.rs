use crate::core::StepId;
use crate::core::value::Value;
use crate::core::value_path::{FieldRef, ValuePath};
use crate::error::CastError;
use indexmap::IndexMap;
use serde::{Serialize, Serializer};

/// Values of every step, keyed by step id. Owned by the stepper for the
/// lifetime of one wizard session.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct FormState {
    namespaces: IndexMap<StepId, Value>,
}

impl FormState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn namespace(&self, step: &str) -> Option<&Value> {
        self.namespaces.get(step)
    }

    pub fn namespace_mut(&mut self, step: &str) -> Option<&mut Value> {
        self.namespaces.get_mut(step)
    }

    pub fn insert(&mut self, step: impl Into<StepId>, values: Value) {
        self.namespaces.insert(step.into(), values);
    }

    pub fn remove(&mut self, step: &str) -> Option<Value> {
        self.namespaces.shift_remove(step)
    }

    pub fn contains(&self, step: &str) -> bool {
        self.namespaces.contains_key(step)
    }

    pub fn len(&self) -> usize {
        self.namespaces.len()
    }

    pub fn is_empty(&self) -> bool {
        self.namespaces.is_empty()
    }

    pub fn step_ids(&self) -> impl Iterator<Item = &StepId> {
        self.namespaces.keys()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&StepId, &Value)> {
        self.namespaces.iter()
    }

    pub fn get(&self, step: &str, path: &ValuePath) -> Option<&Value> {
        self.namespace(step)?.get_path(path)
    }

    /// Looks up `field`; local references resolve against `own`.
    pub fn lookup(&self, field: &FieldRef, own: &StepId) -> Option<&Value> {
        let step = field.step.as_ref().unwrap_or(own);
        self.get(step.as_str(), &field.path)
    }

    pub fn set(&mut self, step: impl Into<StepId>, path: &ValuePath, value: Value) {
        let namespace = self.namespaces.entry(step.into()).or_insert_with(Value::object);
        if path.is_empty() {
            *namespace = value;
        } else {
            namespace.set_path(path, value);
        }
    }

    pub fn to_value(&self) -> Value {
        Value::Object(
            self.namespaces
                .iter()
                .map(|(id, values)| (id.to_string(), values.clone()))
                .collect(),
        )
    }

    /// Rebuilds state from its `to_value` form: an object of step objects.
    pub fn from_value(value: &Value) -> Result<Self, CastError> {
        let map = match value {
            Value::None => return Ok(Self::default()),
            Value::Object(map) => map,
            other => {
                return Err(CastError::new(
                    "",
                    format!("expected an object of steps, found {}", other.type_name()),
                ));
            }
        };

        let mut state = Self::default();
        for (id, values) in map {
            if !matches!(values, Value::Object(_)) {
                return Err(CastError::new(
                    id.as_str(),
                    format!("expected step values object, found {}", values.type_name()),
                ));
            }
            state.insert(id.as_str(), values.clone());
        }
        Ok(state)
    }
}

impl Serialize for FormState {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_value().serialize(serializer)
    }
}

#[cfg(test)]
mod tests {
    use super::FormState;
    use crate::core::StepId;
    use crate::core::value::Value;
    use crate::core::value_path::{FieldRef, ValuePath};
    use serde_json::json;

    #[test]
    fn set_creates_namespace_and_nested_value() {
        let mut state = FormState::new();
        state.set("general", &ValuePath::from("CONTEXT.NETWORK"), Value::Bool(true));
        assert_eq!(
            serde_json::Value::from(state.to_value()),
            json!({"general": {"CONTEXT": {"NETWORK": true}}})
        );
    }

    #[test]
    fn lookup_resolves_local_refs_against_own_step() {
        let mut state = FormState::new();
        state.set("general", &ValuePath::from("NAME"), Value::text("vm"));
        state.set("extra", &ValuePath::from("NAME"), Value::text("other"));

        let own = StepId::from("extra");
        assert_eq!(
            state.lookup(&FieldRef::local("NAME"), &own),
            Some(&Value::text("other"))
        );
        assert_eq!(
            state.lookup(&FieldRef::in_step("general", "NAME"), &own),
            Some(&Value::text("vm"))
        );
    }

    #[test]
    fn from_value_rejects_scalar_namespaces() {
        let bad = Value::from(json!({"general": 3}));
        let err = FormState::from_value(&bad).expect_err("scalar namespace");
        assert_eq!(err.path, "general");

        let good = Value::from(json!({"general": {"NAME": "vm"}}));
        let state = FormState::from_value(&good).expect("state");
        assert_eq!(state.to_value(), good);
    }
}
