//! Field descriptors merged into one object schema per step.

use crate::core::StepId;
use crate::core::value::Value;
use crate::core::value_path::{PathSegment, ValuePath, ValuePathParseError};
use crate::error::{CastError, ComposeError};
use crate::schema::field::{FieldDescriptor, ResolvedField};
use crate::schema::graph::DependencyGraph;
use crate::schema::rule::FieldKind;
use crate::state::context::{FormContext, ResolveScope};
use crate::state::store::FormState;
use crate::state::validation::FieldIssue;
use indexmap::IndexMap;
use regex::Regex;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// What `cast` does with keys the schema does not declare.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum UnknownKeys {
    #[default]
    Strip,
    /// Free-form attributes are carried through untouched.
    Preserve,
}

#[derive(Debug, Clone)]
struct CompiledField {
    descriptor: FieldDescriptor,
    pattern: Option<Regex>,
}

impl PartialEq for CompiledField {
    fn eq(&self, other: &Self) -> bool {
        self.descriptor == other.descriptor
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct ObjectSchema {
    fields: Vec<CompiledField>,
    graph: DependencyGraph,
    unknown_keys: UnknownKeys,
}

/// Merges descriptors into a schema keyed by field path. A path declared
/// twice keeps its first position and the later descriptor.
pub fn compose(
    fields: impl IntoIterator<Item = FieldDescriptor>,
) -> Result<ObjectSchema, ComposeError> {
    let mut merged = IndexMap::<ValuePath, FieldDescriptor>::new();
    for field in fields {
        if field.name.is_empty() {
            return Err(ValuePathParseError::new("field name is empty").into());
        }
        merged.insert(field.name.clone(), field);
    }
    let descriptors = merged.into_values().collect::<Vec<_>>();

    check_overlaps(&descriptors)?;
    let graph = DependencyGraph::build(&descriptors)?;
    let fields = descriptors
        .into_iter()
        .map(compile)
        .collect::<Result<Vec<_>, _>>()?;

    Ok(ObjectSchema {
        fields,
        graph,
        unknown_keys: UnknownKeys::default(),
    })
}

fn check_overlaps(descriptors: &[FieldDescriptor]) -> Result<(), ComposeError> {
    for (idx, outer) in descriptors.iter().enumerate() {
        for inner in &descriptors[idx + 1..] {
            if outer.name.overlaps(&inner.name) {
                let (outer, inner) = if inner.name.starts_with(&outer.name) {
                    (outer, inner)
                } else {
                    (inner, outer)
                };
                return Err(ComposeError::PathConflict {
                    outer: outer.name.to_string(),
                    inner: inner.name.to_string(),
                });
            }
        }
    }
    Ok(())
}

fn compile(descriptor: FieldDescriptor) -> Result<CompiledField, ComposeError> {
    let pattern = match &descriptor.kind {
        FieldKind::Text(rule) => rule
            .pattern
            .as_deref()
            .map(Regex::new)
            .transpose()
            .map_err(|err| ComposeError::InvalidPattern {
                field: descriptor.name.to_string(),
                message: err.to_string(),
            })?,
        _ => None,
    };
    Ok(CompiledField {
        descriptor,
        pattern,
    })
}

impl ObjectSchema {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn with_unknown_keys(mut self, unknown_keys: UnknownKeys) -> Self {
        self.unknown_keys = unknown_keys;
        self
    }

    pub fn preserve_unknown(self) -> Self {
        self.with_unknown_keys(UnknownKeys::Preserve)
    }

    pub fn unknown_keys(&self) -> UnknownKeys {
        self.unknown_keys
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Declared field paths in declaration order.
    pub fn keys(&self) -> Vec<&ValuePath> {
        self.fields.iter().map(|field| &field.descriptor.name).collect()
    }

    pub fn descriptors(&self) -> impl Iterator<Item = &FieldDescriptor> {
        self.fields.iter().map(|field| &field.descriptor)
    }

    pub fn field(&self, path: &ValuePath) -> Option<&FieldDescriptor> {
        let idx = self.graph.index_of(path)?;
        self.fields.get(idx).map(|field| &field.descriptor)
    }

    pub fn graph(&self) -> &DependencyGraph {
        &self.graph
    }

    /// Fields in resolution order.
    pub fn resolution_order(&self) -> impl Iterator<Item = &FieldDescriptor> {
        self.graph
            .order()
            .iter()
            .map(|idx| &self.fields[*idx].descriptor)
    }

    /// Fields that must be re-resolved after `path` changes.
    pub fn affected_by(&self, path: &ValuePath) -> Vec<&ValuePath> {
        self.graph
            .dependents_of(path)
            .into_iter()
            .map(|idx| &self.fields[idx].descriptor.name)
            .collect()
    }

    pub fn default_value(&self) -> Value {
        let mut out = Value::object();
        for field in &self.fields {
            out.set_path(&field.descriptor.name, field.descriptor.kind.default_value());
        }
        out
    }

    /// Coerces `input` into the schema shape. Missing fields get their
    /// defaults; the first structural mismatch fails the whole cast.
    pub fn cast(&self, input: &Value) -> Result<Value, CastError> {
        let source = match input {
            Value::None => None,
            Value::Object(_) => Some(input),
            other => {
                return Err(CastError::new(
                    "",
                    format!("expected an object, found {}", other.type_name()),
                ));
            }
        };

        let mut output = match (self.unknown_keys, source) {
            (UnknownKeys::Preserve, Some(source)) => source.clone(),
            _ => Value::object(),
        };

        for field in &self.fields {
            let name = &field.descriptor.name;
            let raw = match source {
                Some(source) => lookup(source, name)?,
                None => None,
            };
            output.set_path(name, field.descriptor.kind.cast(raw, name)?);
        }
        Ok(output)
    }

    /// Every field resolved against the current state, in resolution order.
    pub fn resolve_all(&self, scope: &ResolveScope<'_>) -> Vec<ResolvedField> {
        self.graph
            .order()
            .iter()
            .map(|idx| {
                let field = &self.fields[*idx];
                field.descriptor.resolve(scope, field.pattern.as_ref())
            })
            .collect()
    }

    pub fn resolve_field(&self, path: &ValuePath, scope: &ResolveScope<'_>) -> Option<ResolvedField> {
        let field = self.fields.get(self.graph.index_of(path)?)?;
        Some(field.descriptor.resolve(scope, field.pattern.as_ref()))
    }

    /// Issues of visible, enabled fields. Hidden fields never block.
    pub fn validate(&self, scope: &ResolveScope<'_>) -> Vec<FieldIssue> {
        self.resolve_all(scope)
            .into_iter()
            .filter_map(|resolved| {
                let message = resolved.error?;
                Some(FieldIssue::new(scope.step, resolved.name, message))
            })
            .collect()
    }

    /// Maps internal values to the document encoding. Fields without a
    /// value are left out.
    pub fn encode(&self, values: &Value) -> Value {
        let mut out = values.clone();
        for field in &self.fields {
            let name = &field.descriptor.name;
            match values.get_path(name) {
                Some(value) if !value.is_none() => {
                    out.set_path(name, field.descriptor.kind.encode(value));
                }
                _ => {
                    out.remove_path(name);
                }
            }
        }
        out
    }

    /// Writes encoded `values` over `target`. Keys of `target` the schema
    /// does not declare are kept; an empty value is not written over a key
    /// the target never had. A declared key whose current content casts to
    /// the same value is left as written (`"yes"`, `""`, `"0, 3"`).
    /// Preserved extras only fill keys `target` lacks, so they never
    /// overwrite what another step wrote.
    pub fn write_into(&self, target: &mut Value, values: &Value) {
        let encoded = self.encode(values);
        if !matches!(target, Value::Object(_)) {
            *target = Value::object();
        }

        if self.unknown_keys == UnknownKeys::Preserve {
            let mut extras = encoded.clone();
            for field in &self.fields {
                extras.remove_path(&field.descriptor.name);
            }
            prune_empty_objects(&mut extras);
            fill_missing(target, &extras);
        }

        for field in &self.fields {
            let name = &field.descriptor.name;
            if let Some(existing) = target.get_path(name) {
                let current = values.get_path(name).unwrap_or(&Value::None);
                let kind = &field.descriptor.kind;
                if kind.cast(Some(existing), name).is_ok_and(|cast| &cast == current) {
                    continue;
                }
            }
            match encoded.get_path(name) {
                None => {
                    target.remove_path(name);
                }
                Some(value) if value.is_empty() && target.get_path(name).is_none() => {}
                Some(value) => target.set_path(name, value.clone()),
            }
        }
    }

    /// Schema holding the fields of both; `other` wins on shared paths.
    pub fn merge(&self, other: &ObjectSchema) -> Result<ObjectSchema, ComposeError> {
        let unknown_keys = if self.unknown_keys == UnknownKeys::Preserve
            || other.unknown_keys == UnknownKeys::Preserve
        {
            UnknownKeys::Preserve
        } else {
            UnknownKeys::Strip
        };
        let merged = compose(self.descriptors().chain(other.descriptors()).cloned())?;
        Ok(merged.with_unknown_keys(unknown_keys))
    }
}

/// Reads `path` from `root`. A missing key is `None`; a scalar where a
/// container is expected is a cast error naming the walked prefix.
pub(crate) fn lookup<'v>(root: &'v Value, path: &ValuePath) -> Result<Option<&'v Value>, CastError> {
    let mut current = root;
    let mut walked = Vec::with_capacity(path.segments().len());
    for segment in path.segments() {
        current = match (segment, current) {
            (_, Value::None) => return Ok(None),
            (PathSegment::Key(key), Value::Object(map)) => match map.get(key) {
                Some(next) => next,
                None => return Ok(None),
            },
            (PathSegment::Index(index), Value::List(items)) => match items.get(*index) {
                Some(next) => next,
                None => return Ok(None),
            },
            (segment, other) => {
                let expected = match segment {
                    PathSegment::Key(_) => "an object",
                    PathSegment::Index(_) => "a list",
                };
                return Err(CastError::new(
                    ValuePath::new(walked).to_string(),
                    format!("expected {expected}, found {}", other.type_name()),
                ));
            }
        };
        walked.push(segment.clone());
    }
    Ok(Some(current))
}

fn fill_missing(target: &mut Value, extras: &Value) {
    let (Value::Object(target), Value::Object(extras)) = (target, extras) else {
        return;
    };
    for (key, value) in extras {
        match target.get_mut(key) {
            Some(existing) => fill_missing(existing, value),
            None => {
                target.insert(key.clone(), value.clone());
            }
        }
    }
}

fn prune_empty_objects(value: &mut Value) {
    if let Value::Object(map) = value {
        for child in map.values_mut() {
            prune_empty_objects(child);
        }
        map.retain(|_, child| !matches!(child, Value::Object(inner) if inner.is_empty()));
    }
}

// ---------------------------------------------------------------------------
// Combined schema
// ---------------------------------------------------------------------------

/// Step schemas keyed by step id, in step order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CombinedSchema {
    steps: IndexMap<StepId, ObjectSchema>,
}

impl CombinedSchema {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, step: impl Into<StepId>, schema: ObjectSchema) {
        self.steps.insert(step.into(), schema);
    }

    pub fn with_step(mut self, step: impl Into<StepId>, schema: ObjectSchema) -> Self {
        self.insert(step, schema);
        self
    }

    pub fn step(&self, step: &str) -> Option<&ObjectSchema> {
        self.steps.get(step)
    }

    pub fn contains(&self, step: &str) -> bool {
        self.steps.contains_key(step)
    }

    pub fn step_ids(&self) -> impl Iterator<Item = &StepId> {
        self.steps.keys()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&StepId, &ObjectSchema)> {
        self.steps.iter()
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn default_value(&self) -> FormState {
        let mut state = FormState::new();
        for (id, schema) in &self.steps {
            state.insert(id, schema.default_value());
        }
        state
    }

    /// Casts an object of step namespaces. Namespaces of steps the schema
    /// does not know are dropped.
    pub fn cast(&self, input: &Value) -> Result<FormState, CastError> {
        let source = match input {
            Value::None => None,
            Value::Object(map) => Some(map),
            other => {
                return Err(CastError::new(
                    "",
                    format!("expected an object of steps, found {}", other.type_name()),
                ));
            }
        };

        let mut state = FormState::new();
        for (id, schema) in &self.steps {
            let raw = source
                .and_then(|map| map.get(id.as_str()))
                .unwrap_or(&Value::None);
            let values = schema.cast(raw).map_err(|err| err.in_step(id))?;
            state.insert(id, values);
        }
        Ok(state)
    }

    /// Issues of every step, each step validated against its own namespace.
    pub fn validate(&self, ctx: &FormContext<'_>) -> Vec<FieldIssue> {
        self.steps
            .iter()
            .flat_map(|(id, schema)| schema.validate(&ctx.scope(id)))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::{CombinedSchema, UnknownKeys, compose};
    use crate::api::SessionContext;
    use crate::core::StepId;
    use crate::core::value::Value;
    use crate::core::value_path::ValuePath;
    use crate::error::ComposeError;
    use crate::schema::condition::Condition;
    use crate::schema::field::FieldDescriptor;
    use crate::schema::rule::{FieldKind, NumberRule, SwitchRule, TextRule};
    use crate::state::{AuxData, FormContext, FormState};
    use serde_json::json;

    fn template_fields() -> Vec<FieldDescriptor> {
        vec![
            FieldDescriptor::text("NAME", "Name").required(),
            FieldDescriptor::number("MEMORY", "Memory")
                .with_kind(FieldKind::Number(NumberRule::default().encoded_as_text())),
            FieldDescriptor::switch("CONTEXT.NETWORK", "Network")
                .with_kind(FieldKind::Switch(SwitchRule::default().yes_no())),
        ]
    }

    #[test]
    fn later_duplicate_wins_and_keeps_position() {
        let schema = compose([
            FieldDescriptor::text("NAME", "First"),
            FieldDescriptor::text("DESCRIPTION", "Description"),
            FieldDescriptor::number("NAME", "Second"),
        ])
        .expect("schema");
        let keys = schema.keys().into_iter().map(ToString::to_string).collect::<Vec<_>>();
        assert_eq!(keys, vec!["NAME", "DESCRIPTION"]);
        let name = schema.field(&ValuePath::from("NAME")).expect("field");
        assert_eq!(name.label, "Second");
    }

    #[test]
    fn nested_and_prefix_paths_conflict() {
        let err = compose([
            FieldDescriptor::text("CONTEXT", "Context"),
            FieldDescriptor::text("CONTEXT.NETWORK", "Network"),
        ])
        .expect_err("conflict");
        assert_eq!(
            err,
            ComposeError::PathConflict {
                outer: "CONTEXT".into(),
                inner: "CONTEXT.NETWORK".into(),
            }
        );
    }

    #[test]
    fn invalid_pattern_fails_composition() {
        let field = FieldDescriptor::text("NAME", "Name")
            .with_kind(FieldKind::Text(TextRule::default().pattern("([a-z")));
        assert!(matches!(
            compose([field]),
            Err(ComposeError::InvalidPattern { .. })
        ));
    }

    #[test]
    fn cast_seeds_defaults_and_strips_unknown_keys() {
        let schema = compose(template_fields()).expect("schema");
        let input = Value::from(json!({"MEMORY": "512", "FOO": "bar", "CONTEXT": {"NETWORK": "YES"}}));
        let cast = schema.cast(&input).expect("cast");
        assert_eq!(
            serde_json::Value::from(cast),
            json!({"NAME": "", "MEMORY": 512, "CONTEXT": {"NETWORK": true}})
        );
    }

    #[test]
    fn cast_preserves_unknown_keys_when_asked() {
        let schema = compose(template_fields())
            .expect("schema")
            .with_unknown_keys(UnknownKeys::Preserve);
        let input = Value::from(json!({"FOO": "bar", "CONTEXT": {"SSH": "key"}}));
        let cast = schema.cast(&input).expect("cast");
        assert_eq!(cast.get_path(&ValuePath::from("FOO")), Some(&Value::text("bar")));
        assert_eq!(
            cast.get_path(&ValuePath::from("CONTEXT.SSH")),
            Some(&Value::text("key"))
        );
        assert_eq!(
            cast.get_path(&ValuePath::from("CONTEXT.NETWORK")),
            Some(&Value::Bool(false))
        );
    }

    #[test]
    fn cast_error_names_the_offending_path() {
        let schema = compose(template_fields()).expect("schema");
        let err = schema
            .cast(&Value::from(json!({"CONTEXT": "flat"})))
            .expect_err("scalar where object expected");
        assert_eq!(err.path, "CONTEXT");

        let err = schema
            .cast(&Value::from(json!({"MEMORY": "lots"})))
            .expect_err("not a number");
        assert_eq!(err.path, "MEMORY");
    }

    #[test]
    fn write_into_keeps_free_form_attributes() {
        let schema = compose(template_fields()).expect("schema");
        let mut target = Value::from(json!({"NAME": "old", "FOO": "bar", "CONTEXT": {"SSH": "key"}}));
        let values = Value::from(json!({"NAME": "vm", "MEMORY": 1024, "CONTEXT": {"NETWORK": true}}));
        schema.write_into(&mut target, &values);
        assert_eq!(
            serde_json::Value::from(target),
            json!({
                "NAME": "vm",
                "FOO": "bar",
                "CONTEXT": {"SSH": "key", "NETWORK": "YES"},
                "MEMORY": "1024"
            })
        );
    }

    #[test]
    fn unchanged_fields_keep_their_document_spelling() {
        let schema = compose(template_fields()).expect("schema");
        let document = Value::from(json!({"NAME": "vm", "MEMORY": "", "CONTEXT": {"NETWORK": "yes"}}));
        let values = schema.cast(&document).expect("cast");
        assert_eq!(values.get_path(&ValuePath::from("MEMORY")), Some(&Value::None));

        let mut target = document.clone();
        schema.write_into(&mut target, &values);
        assert_eq!(target, document);

        let mut edited = values.clone();
        edited.set_path(&ValuePath::from("MEMORY"), Value::int(2048));
        edited.set_path(&ValuePath::from("CONTEXT.NETWORK"), Value::Bool(false));
        let mut target = document.clone();
        schema.write_into(&mut target, &edited);
        assert_eq!(
            serde_json::Value::from(target),
            json!({"NAME": "vm", "MEMORY": "2048", "CONTEXT": {"NETWORK": "NO"}})
        );
    }

    #[test]
    fn cleared_number_is_removed_from_the_document() {
        let schema = compose(template_fields()).expect("schema");
        let document = Value::from(json!({"NAME": "vm", "MEMORY": "512"}));
        let mut values = schema.cast(&document).expect("cast");
        values.set_path(&ValuePath::from("MEMORY"), Value::None);

        let mut target = document.clone();
        schema.write_into(&mut target, &values);
        assert_eq!(target.get_path(&ValuePath::from("MEMORY")), None);
        assert_eq!(target.get_path(&ValuePath::from("NAME")), Some(&Value::text("vm")));
    }

    #[test]
    fn validate_skips_hidden_fields() {
        let schema = compose([
            FieldDescriptor::switch("ADVANCED", "Advanced"),
            FieldDescriptor::text("KERNEL", "Kernel")
                .required()
                .visible_when(Condition::truthy("ADVANCED")),
        ])
        .expect("schema");
        let session = SessionContext::default();
        let aux = AuxData::default();
        let step = StepId::from("os");

        let mut state = FormState::new();
        state.insert("os", schema.default_value());
        let issues = schema.validate(&FormContext::new(&state, &session, &aux).scope(&step));
        assert!(issues.is_empty());

        state.set("os", &ValuePath::from("ADVANCED"), Value::Bool(true));
        let issues = schema.validate(&FormContext::new(&state, &session, &aux).scope(&step));
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].path.to_string(), "KERNEL");
    }

    #[test]
    fn preserved_extras_only_fill_gaps() {
        let schema = compose([FieldDescriptor::text("DESCRIPTION", "Description")])
            .expect("schema")
            .preserve_unknown();
        let mut target = Value::from(json!({"NAME": "renamed"}));
        let values = Value::from(json!({"NAME": "seeded", "FOO": "bar", "DESCRIPTION": "db"}));
        schema.write_into(&mut target, &values);
        assert_eq!(
            serde_json::Value::from(target),
            json!({"NAME": "renamed", "FOO": "bar", "DESCRIPTION": "db"})
        );
    }

    #[test]
    fn merge_is_last_write_wins() {
        let base = compose([FieldDescriptor::text("NAME", "Name")]).expect("base");
        let extra = compose([
            FieldDescriptor::text("NAME", "Override").required(),
            FieldDescriptor::text("DESCRIPTION", "Description"),
        ])
        .expect("extra")
        .preserve_unknown();
        let merged = base.merge(&extra).expect("merged");
        assert_eq!(merged.len(), 2);
        assert_eq!(merged.unknown_keys(), UnknownKeys::Preserve);
        assert!(merged.field(&ValuePath::from("NAME")).expect("name").kind.is_required());
    }

    #[test]
    fn combined_cast_reports_the_step() {
        let combined = CombinedSchema::new()
            .with_step("general", compose(template_fields()).expect("schema"));
        let err = combined
            .cast(&Value::from(json!({"general": {"MEMORY": []}})))
            .expect_err("list for number");
        assert_eq!(err.location(), "general::MEMORY");

        let state = combined.cast(&Value::None).expect("defaults");
        assert_eq!(state, combined.default_value());
    }
}
