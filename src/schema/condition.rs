use crate::core::value::Value;
use crate::core::value_path::FieldRef;
use crate::state::context::ResolveScope;
use schemars::JsonSchema;
use schemars::r#gen::SchemaGenerator;
use schemars::schema::Schema;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

pub type PredicateFn = dyn Fn(&ResolveScope<'_>) -> Option<bool> + Send + Sync;

/// Code-only condition. `reads` must list every field the closure looks at,
/// otherwise changes to them will not trigger re-resolution.
#[derive(Clone)]
pub struct Predicate {
    reads: Vec<FieldRef>,
    check: Arc<PredicateFn>,
}

impl Predicate {
    pub fn new(
        reads: impl IntoIterator<Item = FieldRef>,
        check: impl Fn(&ResolveScope<'_>) -> Option<bool> + Send + Sync + 'static,
    ) -> Self {
        Self {
            reads: reads.into_iter().collect(),
            check: Arc::new(check),
        }
    }

    pub fn reads(&self) -> &[FieldRef] {
        self.reads.as_slice()
    }
}

impl fmt::Debug for Predicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Predicate")
            .field("reads", &self.reads)
            .finish_non_exhaustive()
    }
}

impl PartialEq for Predicate {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.check, &other.check) && self.reads == other.reads
    }
}

impl JsonSchema for Predicate {
    fn schema_name() -> String {
        "Predicate".to_string()
    }

    fn json_schema(_: &mut SchemaGenerator) -> Schema {
        Schema::Bool(false)
    }
}

/// Visibility/requiredness rule over other fields' values and the session.
///
/// Evaluation yields `None` when a referenced field has no value yet; callers
/// pick the safe reading for their attribute (hidden, not required).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "when", rename_all = "snake_case")]
pub enum Condition {
    Always,
    Equals { field: FieldRef, value: Value },
    NotEquals { field: FieldRef, value: Value },
    OneOf { field: FieldRef, values: Vec<Value> },
    Truthy { field: FieldRef },
    Empty { field: FieldRef },
    All { conditions: Vec<Condition> },
    Any { conditions: Vec<Condition> },
    Not { condition: Box<Condition> },
    Admin,
    InGroup { group: String },
    View { view: String },
    #[serde(skip)]
    Custom(Predicate),
}

impl Condition {
    pub fn equals(field: impl Into<FieldRef>, value: impl Into<Value>) -> Self {
        Self::Equals {
            field: field.into(),
            value: value.into(),
        }
    }

    pub fn not_equals(field: impl Into<FieldRef>, value: impl Into<Value>) -> Self {
        Self::NotEquals {
            field: field.into(),
            value: value.into(),
        }
    }

    pub fn one_of(field: impl Into<FieldRef>, values: impl IntoIterator<Item = Value>) -> Self {
        Self::OneOf {
            field: field.into(),
            values: values.into_iter().collect(),
        }
    }

    pub fn truthy(field: impl Into<FieldRef>) -> Self {
        Self::Truthy {
            field: field.into(),
        }
    }

    pub fn empty(field: impl Into<FieldRef>) -> Self {
        Self::Empty {
            field: field.into(),
        }
    }

    pub fn all(conditions: impl IntoIterator<Item = Condition>) -> Self {
        Self::All {
            conditions: conditions.into_iter().collect(),
        }
    }

    pub fn any(conditions: impl IntoIterator<Item = Condition>) -> Self {
        Self::Any {
            conditions: conditions.into_iter().collect(),
        }
    }

    pub fn negate(condition: Condition) -> Self {
        Self::Not {
            condition: Box::new(condition),
        }
    }

    pub fn custom(predicate: Predicate) -> Self {
        Self::Custom(predicate)
    }

    pub fn evaluate(&self, scope: &ResolveScope<'_>) -> Option<bool> {
        match self {
            Self::Always => Some(true),
            Self::Equals { field, value } => scope.value(field).map(|v| v.loosely_eq(value)),
            Self::NotEquals { field, value } => scope.value(field).map(|v| !v.loosely_eq(value)),
            Self::OneOf { field, values } => scope
                .value(field)
                .map(|v| values.iter().any(|candidate| v.loosely_eq(candidate))),
            Self::Truthy { field } => scope.value(field).map(Value::truthy),
            Self::Empty { field } => scope.value(field).map(Value::is_empty),
            Self::All { conditions } => {
                let mut unresolved = false;
                for condition in conditions {
                    match condition.evaluate(scope) {
                        Some(false) => return Some(false),
                        None => unresolved = true,
                        Some(true) => {}
                    }
                }
                (!unresolved).then_some(true)
            }
            Self::Any { conditions } => {
                let mut unresolved = false;
                for condition in conditions {
                    match condition.evaluate(scope) {
                        Some(true) => return Some(true),
                        None => unresolved = true,
                        Some(false) => {}
                    }
                }
                (!unresolved).then_some(false)
            }
            Self::Not { condition } => condition.evaluate(scope).map(|v| !v),
            Self::Admin => Some(scope.session().admin),
            Self::InGroup { group } => Some(scope.session().in_group(group)),
            Self::View { view } => Some(scope.session().in_view(view)),
            Self::Custom(predicate) => (predicate.check)(scope),
        }
    }

    /// Fields this condition reads.
    pub fn reads(&self) -> Vec<&FieldRef> {
        let mut out = Vec::new();
        self.collect_reads(&mut out);
        out
    }

    fn collect_reads<'a>(&'a self, out: &mut Vec<&'a FieldRef>) {
        match self {
            Self::Equals { field, .. }
            | Self::NotEquals { field, .. }
            | Self::OneOf { field, .. }
            | Self::Truthy { field }
            | Self::Empty { field } => out.push(field),
            Self::All { conditions } | Self::Any { conditions } => {
                for condition in conditions {
                    condition.collect_reads(out);
                }
            }
            Self::Not { condition } => condition.collect_reads(out),
            Self::Custom(predicate) => out.extend(predicate.reads.iter()),
            Self::Always | Self::Admin | Self::InGroup { .. } | Self::View { .. } => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{Condition, Predicate};
    use crate::api::SessionContext;
    use crate::core::StepId;
    use crate::core::value::Value;
    use crate::core::value_path::{FieldRef, ValuePath};
    use crate::state::{AuxData, FormContext, FormState};

    fn state() -> FormState {
        let mut state = FormState::new();
        state.set("general", &ValuePath::from("HYPERVISOR"), Value::text("kvm"));
        state.set("general", &ValuePath::from("BACKUP"), Value::text("NO"));
        state
    }

    #[test]
    fn equals_reads_other_steps_and_own_namespace() {
        let state = state();
        let session = SessionContext::default();
        let aux = AuxData::default();
        let own = StepId::from("general");
        let other = StepId::from("storage");
        let ctx = FormContext::new(&state, &session, &aux);

        let local = Condition::equals("HYPERVISOR", "kvm");
        assert_eq!(local.evaluate(&ctx.scope(&own)), Some(true));
        assert_eq!(local.evaluate(&ctx.scope(&other)), None);

        let scoped = Condition::equals("general::HYPERVISOR", "kvm");
        assert_eq!(scoped.evaluate(&ctx.scope(&other)), Some(true));
    }

    #[test]
    fn unresolved_dependencies_propagate_through_combinators() {
        let state = state();
        let session = SessionContext::default();
        let aux = AuxData::default();
        let own = StepId::from("general");
        let scope = FormContext::new(&state, &session, &aux).scope(&own);

        let missing = Condition::truthy("MISSING");
        assert_eq!(missing.evaluate(&scope), None);
        assert_eq!(
            Condition::all([Condition::truthy("BACKUP"), missing.clone()]).evaluate(&scope),
            Some(false)
        );
        assert_eq!(
            Condition::any([Condition::equals("HYPERVISOR", "kvm"), missing.clone()])
                .evaluate(&scope),
            Some(true)
        );
        assert_eq!(Condition::negate(missing).evaluate(&scope), None);
    }

    #[test]
    fn session_conditions_read_the_ambient_context() {
        let state = FormState::new();
        let session = SessionContext::new().with_group("oneadmin").as_admin();
        let aux = AuxData::default();
        let own = StepId::from("general");
        let scope = FormContext::new(&state, &session, &aux).scope(&own);

        assert_eq!(Condition::Admin.evaluate(&scope), Some(true));
        assert_eq!(
            Condition::InGroup { group: "users".into() }.evaluate(&scope),
            Some(false)
        );
    }

    #[test]
    fn custom_predicates_report_their_reads() {
        let reads = vec![FieldRef::local("MEMORY")];
        let condition = Condition::custom(Predicate::new(reads.clone(), |scope| {
            scope
                .value(&FieldRef::local("MEMORY"))
                .and_then(Value::as_f64)
                .map(|memory| memory > 1024.0)
        }));
        assert_eq!(condition.reads(), reads.iter().collect::<Vec<_>>());
    }

    #[test]
    fn deserializes_from_yaml() {
        let yaml = "when: all\nconditions:\n  - when: equals\n    field: general::HYPERVISOR\n    value: kvm\n  - when: admin\n";
        let condition: Condition = serde_yaml::from_str(yaml).expect("condition");
        assert_eq!(
            condition,
            Condition::all([
                Condition::equals("general::HYPERVISOR", "kvm"),
                Condition::Admin
            ])
        );
    }
}
