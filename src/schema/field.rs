use crate::core::value::Value;
use crate::core::value_path::{FieldRef, ValuePath};
use crate::schema::condition::Condition;
use crate::schema::rule::{
    FieldKind, NumberRule, OptionSource, SelectOption, SelectRule, SwitchRule, TableRule, TextRule,
};
use crate::state::context::{FetchStatus, ResolveScope};
use regex::Regex;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct GridHint {
    pub xs: Option<u8>,
    pub md: Option<u8>,
}

/// Declarative description of one input.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct FieldDescriptor {
    pub name: ValuePath,
    #[serde(default)]
    pub label: String,
    #[serde(flatten)]
    pub kind: FieldKind,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub depends_on: Vec<FieldRef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub visible_when: Option<Condition>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub required_when: Option<Condition>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub disabled_when: Option<Condition>,
    #[serde(default)]
    pub grid: GridHint,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tooltip: Option<String>,
}

impl FieldDescriptor {
    pub fn new(name: impl Into<ValuePath>, label: impl Into<String>, kind: FieldKind) -> Self {
        Self {
            name: name.into(),
            label: label.into(),
            kind,
            depends_on: Vec::new(),
            visible_when: None,
            required_when: None,
            disabled_when: None,
            grid: GridHint::default(),
            tooltip: None,
        }
    }

    pub fn text(name: impl Into<ValuePath>, label: impl Into<String>) -> Self {
        Self::new(name, label, FieldKind::Text(TextRule::default()))
    }

    pub fn number(name: impl Into<ValuePath>, label: impl Into<String>) -> Self {
        Self::new(name, label, FieldKind::Number(NumberRule::default()))
    }

    pub fn select(
        name: impl Into<ValuePath>,
        label: impl Into<String>,
        options: OptionSource,
    ) -> Self {
        Self::new(name, label, FieldKind::Select(SelectRule::new(options)))
    }

    pub fn table(
        name: impl Into<ValuePath>,
        label: impl Into<String>,
        options: OptionSource,
    ) -> Self {
        Self::new(name, label, FieldKind::Table(TableRule::new(options)))
    }

    pub fn switch(name: impl Into<ValuePath>, label: impl Into<String>) -> Self {
        Self::new(name, label, FieldKind::Switch(SwitchRule::default()))
    }

    pub fn with_kind(mut self, kind: FieldKind) -> Self {
        self.kind = kind;
        self
    }

    pub fn required(mut self) -> Self {
        self.kind.set_required(true);
        self
    }

    pub fn depends_on(mut self, field: impl Into<FieldRef>) -> Self {
        self.depends_on.push(field.into());
        self
    }

    pub fn visible_when(mut self, condition: Condition) -> Self {
        self.visible_when = Some(condition);
        self
    }

    pub fn required_when(mut self, condition: Condition) -> Self {
        self.required_when = Some(condition);
        self
    }

    pub fn disabled_when(mut self, condition: Condition) -> Self {
        self.disabled_when = Some(condition);
        self
    }

    pub fn grid(mut self, xs: u8, md: u8) -> Self {
        self.grid = GridHint {
            xs: Some(xs),
            md: Some(md),
        };
        self
    }

    pub fn tooltip(mut self, tooltip: impl Into<String>) -> Self {
        self.tooltip = Some(tooltip.into());
        self
    }

    /// Every field this descriptor reads: explicit `depends_on`, fields
    /// used by its conditions and a field-backed option list.
    pub fn dependencies(&self) -> Vec<FieldRef> {
        let mut out = self.depends_on.clone();
        for condition in [&self.visible_when, &self.required_when, &self.disabled_when]
            .into_iter()
            .flatten()
        {
            out.extend(condition.reads().into_iter().cloned());
        }
        if let Some(OptionSource::Field { field }) = self.kind.options() {
            out.push(field.clone());
        }
        let mut seen = Vec::with_capacity(out.len());
        out.retain(|field| {
            if seen.contains(field) {
                false
            } else {
                seen.push(field.clone());
                true
            }
        });
        out
    }

    pub fn resolve_options(&self, scope: &ResolveScope<'_>) -> OptionsState {
        let Some(source) = self.kind.options() else {
            return OptionsState::Free;
        };
        match source {
            OptionSource::Free => OptionsState::Free,
            OptionSource::Static { values } => OptionsState::Ready(values.clone()),
            OptionSource::Context { key } => match scope.aux().get(key) {
                Some(FetchStatus::Ready(value)) => OptionsState::Ready(options_from(value)),
                Some(FetchStatus::Failed(message)) => OptionsState::Failed(message.clone()),
                Some(FetchStatus::Pending) | None => OptionsState::Pending,
            },
            OptionSource::Field { field } => match scope.value(field) {
                Some(value) => OptionsState::Ready(options_from(value)),
                None => OptionsState::Pending,
            },
        }
    }

    /// Resolves the descriptor against current state. Unresolved
    /// dependencies fall back to hidden/disabled instead of failing.
    pub fn resolve(&self, scope: &ResolveScope<'_>, pattern: Option<&Regex>) -> ResolvedField {
        let visible = self
            .visible_when
            .as_ref()
            .map_or(Some(true), |condition| condition.evaluate(scope))
            .unwrap_or(false);
        let required = self.kind.is_required()
            || self
                .required_when
                .as_ref()
                .and_then(|condition| condition.evaluate(scope))
                .unwrap_or(false);
        let options = self.resolve_options(scope);
        let locked = self
            .disabled_when
            .as_ref()
            .and_then(|condition| condition.evaluate(scope))
            .unwrap_or(false);
        let disabled = locked || !options.is_usable();
        let value = scope
            .own(&self.name)
            .cloned()
            .unwrap_or_else(|| self.kind.default_value());

        // A required field cannot be checked without its options, so it
        // blocks until they load.
        let error = match &options {
            _ if !visible || locked => None,
            OptionsState::Pending if required => Some("Options are not loaded yet".to_string()),
            OptionsState::Failed(message) if required => {
                Some(format!("Options could not be loaded: {message}"))
            }
            OptionsState::Pending | OptionsState::Failed(_) => None,
            _ => self
                .kind
                .validate(&value, required, options.values(), pattern)
                .err(),
        };

        ResolvedField {
            name: self.name.clone(),
            label: self.label.clone(),
            kind: self.kind.tag(),
            visible,
            required,
            disabled,
            value,
            options,
            error,
            grid: self.grid,
            tooltip: self.tooltip.clone(),
        }
    }
}

fn options_from(value: &Value) -> Vec<SelectOption> {
    match value {
        Value::List(items) => items.iter().map(SelectOption::from_value).collect(),
        Value::None => Vec::new(),
        single => vec![SelectOption::from_value(single)],
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum OptionsState {
    Free,
    Ready(Vec<SelectOption>),
    Pending,
    Failed(String),
}

impl OptionsState {
    pub fn is_usable(&self) -> bool {
        matches!(self, Self::Free | Self::Ready(_))
    }

    pub fn values(&self) -> Option<&[SelectOption]> {
        match self {
            Self::Ready(values) => Some(values.as_slice()),
            _ => None,
        }
    }
}

/// A descriptor evaluated against the current form state.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedField {
    pub name: ValuePath,
    pub label: String,
    pub kind: &'static str,
    pub visible: bool,
    pub required: bool,
    pub disabled: bool,
    pub value: Value,
    pub options: OptionsState,
    pub error: Option<String>,
    pub grid: GridHint,
    pub tooltip: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::{FieldDescriptor, OptionsState};
    use crate::api::SessionContext;
    use crate::core::StepId;
    use crate::core::value::Value;
    use crate::core::value_path::{FieldRef, ValuePath};
    use crate::schema::condition::Condition;
    use crate::schema::rule::OptionSource;
    use crate::state::{AuxData, FetchStatus, FormContext, FormState};

    #[test]
    fn visibility_follows_dependency_value() {
        let field = FieldDescriptor::text("VCENTER_HOST", "vCenter host")
            .required()
            .visible_when(Condition::equals("HYPERVISOR", "vcenter"));
        let session = SessionContext::default();
        let aux = AuxData::default();
        let step = StepId::from("general");

        let mut state = FormState::new();
        state.set("general", &ValuePath::from("HYPERVISOR"), Value::text("kvm"));
        let hidden = field.resolve(&FormContext::new(&state, &session, &aux).scope(&step), None);
        assert!(!hidden.visible);
        assert_eq!(hidden.error, None);

        state.set("general", &ValuePath::from("HYPERVISOR"), Value::text("vcenter"));
        let shown = field.resolve(&FormContext::new(&state, &session, &aux).scope(&step), None);
        assert!(shown.visible);
        assert_eq!(shown.error.as_deref(), Some("Is required"));
    }

    #[test]
    fn unresolved_visibility_dependency_hides_the_field() {
        let field = FieldDescriptor::text("PORT", "Port")
            .visible_when(Condition::truthy("inputs::ENABLED"));
        let state = FormState::new();
        let session = SessionContext::default();
        let aux = AuxData::default();
        let step = StepId::from("general");
        let resolved = field.resolve(&FormContext::new(&state, &session, &aux).scope(&step), None);
        assert!(!resolved.visible);
    }

    #[test]
    fn unloaded_options_disable_and_block_required_fields() {
        let field = FieldDescriptor::select(
            "NETWORK",
            "Network",
            OptionSource::Context {
                key: "networks".into(),
            },
        )
        .required();
        let state = FormState::new();
        let session = SessionContext::default();
        let step = StepId::from("network");

        let aux = AuxData::default().with("networks", FetchStatus::Pending);
        let pending = field.resolve(&FormContext::new(&state, &session, &aux).scope(&step), None);
        assert!(pending.disabled);
        assert_eq!(pending.options, OptionsState::Pending);
        assert_eq!(pending.error.as_deref(), Some("Options are not loaded yet"));

        let never_requested = AuxData::default();
        let missing =
            field.resolve(&FormContext::new(&state, &session, &never_requested).scope(&step), None);
        assert_eq!(missing.error.as_deref(), Some("Options are not loaded yet"));

        let aux = AuxData::default().with("networks", FetchStatus::Failed("timeout".into()));
        let failed = field.resolve(&FormContext::new(&state, &session, &aux).scope(&step), None);
        assert!(failed.disabled);
        assert_eq!(failed.error.as_deref(), Some("Options could not be loaded: timeout"));

        let aux = AuxData::default().with(
            "networks",
            FetchStatus::Ready(Value::List(vec![Value::text("public")])),
        );
        let ready = field.resolve(&FormContext::new(&state, &session, &aux).scope(&step), None);
        assert!(!ready.disabled);
        assert_eq!(ready.error.as_deref(), Some("Is required"));
    }

    #[test]
    fn optional_field_with_unloaded_options_does_not_block() {
        let field = FieldDescriptor::select(
            "NETWORK",
            "Network",
            OptionSource::Context {
                key: "networks".into(),
            },
        );
        let state = FormState::new();
        let session = SessionContext::default();
        let step = StepId::from("network");
        let aux = AuxData::default().with("networks", FetchStatus::Failed("timeout".into()));
        let resolved = field.resolve(&FormContext::new(&state, &session, &aux).scope(&step), None);
        assert!(resolved.disabled);
        assert_eq!(resolved.error, None);
    }

    #[test]
    fn dependencies_include_condition_reads_without_duplicates() {
        let field = FieldDescriptor::number("PORT", "Port")
            .depends_on("ENABLED")
            .visible_when(Condition::truthy("ENABLED"))
            .required_when(Condition::Admin);
        assert_eq!(field.dependencies(), vec![FieldRef::local("ENABLED")]);
    }

    #[test]
    fn deserializes_flattened_kind() {
        let yaml = "name: CONTEXT.SSH_PUBLIC_KEY\nlabel: SSH key\nkind: text\nrequired: true\nmin_len: 10\n";
        let field: FieldDescriptor = serde_yaml::from_str(yaml).expect("field");
        assert_eq!(field.name.to_string(), "CONTEXT.SSH_PUBLIC_KEY");
        assert!(field.kind.is_required());
        assert_eq!(field.kind.tag(), "text");
    }
}
