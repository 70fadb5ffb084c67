use crate::core::value::Value;
use crate::core::value_path::{FieldRef, ValuePath};
use crate::error::CastError;
use regex::Regex;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Option lists
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct SelectOption {
    pub value: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
}

impl SelectOption {
    pub fn new(value: impl Into<Value>) -> Self {
        Self {
            value: value.into(),
            label: None,
        }
    }

    pub fn labeled(value: impl Into<Value>, label: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            label: Some(label.into()),
        }
    }

    /// Accepts either a bare scalar or a `{ value, label }` object, the two
    /// shapes option lists come back in from the API.
    pub fn from_value(raw: &Value) -> Self {
        match raw {
            Value::Object(map) if map.contains_key("value") => Self {
                value: map.get("value").cloned().unwrap_or_default(),
                label: map
                    .get("label")
                    .map(Value::to_display_string)
                    .filter(|label| !label.is_empty()),
            },
            other => Self::new(other.clone()),
        }
    }
}

/// Where a select/table field gets its allowed values from.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "from", rename_all = "snake_case")]
pub enum OptionSource {
    /// Any value is accepted.
    #[default]
    Free,
    Static {
        values: Vec<SelectOption>,
    },
    /// Loaded asynchronously under an aux fetch key.
    Context {
        key: String,
    },
    /// List value of another field.
    Field {
        field: FieldRef,
    },
}

impl OptionSource {
    pub fn values(values: impl IntoIterator<Item = impl Into<Value>>) -> Self {
        Self::Static {
            values: values.into_iter().map(SelectOption::new).collect(),
        }
    }
}

// ---------------------------------------------------------------------------
// Per-kind rules
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct TextRule {
    pub required: bool,
    pub min_len: Option<usize>,
    pub max_len: Option<usize>,
    pub pattern: Option<String>,
    pub trim: bool,
    pub multiline: bool,
    pub default: Option<String>,
}

impl TextRule {
    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn min_len(mut self, min_len: usize) -> Self {
        self.min_len = Some(min_len);
        self
    }

    pub fn max_len(mut self, max_len: usize) -> Self {
        self.max_len = Some(max_len);
        self
    }

    pub fn pattern(mut self, pattern: impl Into<String>) -> Self {
        self.pattern = Some(pattern.into());
        self
    }

    pub fn trimmed(mut self) -> Self {
        self.trim = true;
        self
    }

    pub fn multiline(mut self) -> Self {
        self.multiline = true;
        self
    }

    pub fn with_default(mut self, default: impl Into<String>) -> Self {
        self.default = Some(default.into());
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum NumberEncoding {
    #[default]
    Number,
    /// Documents carry the number as a string (`MEMORY = "512"`).
    Text,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct NumberRule {
    pub required: bool,
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub integer: bool,
    pub encoding: NumberEncoding,
    pub default: Option<f64>,
}

impl NumberRule {
    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn min(mut self, min: f64) -> Self {
        self.min = Some(min);
        self
    }

    pub fn max(mut self, max: f64) -> Self {
        self.max = Some(max);
        self
    }

    pub fn integer(mut self) -> Self {
        self.integer = true;
        self
    }

    pub fn encoded_as_text(mut self) -> Self {
        self.encoding = NumberEncoding::Text;
        self
    }

    pub fn with_default(mut self, default: f64) -> Self {
        self.default = Some(default);
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum ListEncoding {
    #[default]
    List,
    /// One string of comma separated ids (`DISKS = "0,3"`).
    Comma,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct SelectRule {
    pub required: bool,
    pub options: OptionSource,
    pub multiple: bool,
    /// Document shape of a multiple selection.
    pub encoding: ListEncoding,
    pub default: Option<Value>,
}

impl SelectRule {
    pub fn new(options: OptionSource) -> Self {
        Self {
            options,
            ..Self::default()
        }
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn multiple(mut self) -> Self {
        self.multiple = true;
        self
    }

    pub fn comma_separated(mut self) -> Self {
        self.encoding = ListEncoding::Comma;
        self
    }

    pub fn with_default(mut self, default: impl Into<Value>) -> Self {
        self.default = Some(default.into());
        self
    }
}

/// Row selection out of a list: the value is the list of selected row ids.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct TableRule {
    pub required: bool,
    pub min_rows: Option<usize>,
    pub max_rows: Option<usize>,
    pub options: OptionSource,
    pub encoding: ListEncoding,
    pub default: Vec<Value>,
}

impl TableRule {
    pub fn new(options: OptionSource) -> Self {
        Self {
            options,
            ..Self::default()
        }
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn rows(mut self, min_rows: Option<usize>, max_rows: Option<usize>) -> Self {
        self.min_rows = min_rows;
        self.max_rows = max_rows;
        self
    }

    pub fn comma_separated(mut self) -> Self {
        self.encoding = ListEncoding::Comma;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum SwitchEncoding {
    #[default]
    Bool,
    /// `"YES"` / `"NO"` strings, as resource templates spell booleans.
    YesNo,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct SwitchRule {
    pub encoding: SwitchEncoding,
    pub default: bool,
}

impl SwitchRule {
    pub fn yes_no(mut self) -> Self {
        self.encoding = SwitchEncoding::YesNo;
        self
    }

    pub fn with_default(mut self, default: bool) -> Self {
        self.default = default;
        self
    }
}

// ---------------------------------------------------------------------------
// Field kinds
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FieldKind {
    Text(TextRule),
    Number(NumberRule),
    Select(SelectRule),
    Table(TableRule),
    Switch(SwitchRule),
}

impl FieldKind {
    pub fn tag(&self) -> &'static str {
        match self {
            Self::Text(_) => "text",
            Self::Number(_) => "number",
            Self::Select(_) => "select",
            Self::Table(_) => "table",
            Self::Switch(_) => "switch",
        }
    }

    pub fn is_required(&self) -> bool {
        match self {
            Self::Text(rule) => rule.required,
            Self::Number(rule) => rule.required,
            Self::Select(rule) => rule.required,
            Self::Table(rule) => rule.required,
            Self::Switch(_) => false,
        }
    }

    pub fn set_required(&mut self, required: bool) {
        match self {
            Self::Text(rule) => rule.required = required,
            Self::Number(rule) => rule.required = required,
            Self::Select(rule) => rule.required = required,
            Self::Table(rule) => rule.required = required,
            Self::Switch(_) => {}
        }
    }

    /// Document shape of list values; `None` for kinds holding one value.
    pub fn list_encoding(&self) -> Option<ListEncoding> {
        match self {
            Self::Select(rule) if rule.multiple => Some(rule.encoding),
            Self::Table(rule) => Some(rule.encoding),
            _ => None,
        }
    }

    pub fn options(&self) -> Option<&OptionSource> {
        match self {
            Self::Select(rule) => Some(&rule.options),
            Self::Table(rule) => Some(&rule.options),
            _ => None,
        }
    }

    /// Value a field holds before any input. Always defined.
    pub fn default_value(&self) -> Value {
        match self {
            Self::Text(rule) => Value::Text(rule.default.clone().unwrap_or_default()),
            Self::Number(rule) => rule.default.map_or(Value::None, Value::float),
            Self::Select(rule) => match (&rule.default, rule.multiple) {
                (Some(default), _) => default.clone(),
                (None, true) => Value::List(Vec::new()),
                (None, false) => Value::Text(String::new()),
            },
            Self::Table(rule) => Value::List(rule.default.clone()),
            Self::Switch(rule) => Value::Bool(rule.default),
        }
    }

    /// Coerces a document value into the internal representation.
    pub fn cast(&self, raw: Option<&Value>, path: &ValuePath) -> Result<Value, CastError> {
        let Some(raw) = raw.filter(|raw| !raw.is_none()) else {
            return Ok(self.default_value());
        };
        match self {
            Self::Text(rule) => match raw {
                Value::Text(text) if rule.trim => Ok(Value::text(text.trim())),
                Value::Text(_) => Ok(raw.clone()),
                Value::Number(_) | Value::Bool(_) => Ok(Value::Text(raw.to_display_string())),
                other => Err(mismatch(path, "text", other)),
            },
            Self::Number(rule) => cast_number(rule, raw, path),
            Self::Select(rule) if rule.multiple => cast_list(raw, path),
            Self::Select(_) => match raw {
                Value::List(_) | Value::Object(_) => Err(mismatch(path, "a single option", raw)),
                _ => Ok(raw.clone()),
            },
            Self::Table(_) => cast_list(raw, path),
            Self::Switch(_) => cast_switch(raw, path),
        }
    }

    /// Maps an internal value back to the document encoding.
    pub fn encode(&self, value: &Value) -> Value {
        match (self, value) {
            (Self::Switch(rule), Value::Bool(flag)) if rule.encoding == SwitchEncoding::YesNo => {
                Value::text(if *flag { "YES" } else { "NO" })
            }
            (Self::Number(rule), Value::Number(number))
                if rule.encoding == NumberEncoding::Text =>
            {
                Value::Text(number.to_string())
            }
            (_, Value::List(items)) if self.list_encoding() == Some(ListEncoding::Comma) => {
                let ids = items.iter().map(Value::to_display_string).collect::<Vec<_>>();
                Value::Text(ids.join(","))
            }
            _ => value.clone(),
        }
    }

    /// Checks a cast value. `options` is the resolved option list, `None`
    /// when the field accepts any value or the list is not available.
    pub fn validate(
        &self,
        value: &Value,
        required: bool,
        options: Option<&[SelectOption]>,
        pattern: Option<&Regex>,
    ) -> Result<(), String> {
        if required && value.is_empty() {
            return Err("Is required".to_string());
        }
        if value.is_empty() {
            return Ok(());
        }
        match self {
            Self::Text(rule) => validate_text(rule, value, pattern),
            Self::Number(rule) => validate_number(rule, value),
            Self::Select(rule) => {
                let selected = match value {
                    Value::List(items) if rule.multiple => items.as_slice(),
                    single => std::slice::from_ref(single),
                };
                validate_membership(selected, options)
            }
            Self::Table(rule) => {
                let rows = value.as_list().unwrap_or_default();
                if let Some(min) = rule.min_rows.filter(|min| rows.len() < *min) {
                    return Err(format!("Select at least {min} row(s)"));
                }
                if let Some(max) = rule.max_rows.filter(|max| rows.len() > *max) {
                    return Err(format!("Select at most {max} row(s)"));
                }
                validate_membership(rows, options)
            }
            Self::Switch(_) => match value {
                Value::Bool(_) => Ok(()),
                other => Err(format!("Must be a boolean, found {}", other.type_name())),
            },
        }
    }
}

fn mismatch(path: &ValuePath, expected: &str, found: &Value) -> CastError {
    CastError::new(
        path.to_string(),
        format!("expected {expected}, found {}", found.type_name()),
    )
}

fn cast_number(rule: &NumberRule, raw: &Value, path: &ValuePath) -> Result<Value, CastError> {
    match raw {
        Value::Number(_) => Ok(raw.clone()),
        Value::Text(text) if text.trim().is_empty() => Ok(rule.default.map_or(Value::None, Value::float)),
        Value::Text(text) => {
            let trimmed = text.trim();
            if let Ok(int) = trimmed.parse::<i64>() {
                return Ok(Value::int(int));
            }
            trimmed
                .parse::<f64>()
                .ok()
                .filter(|parsed| parsed.is_finite())
                .map(Value::float)
                .ok_or_else(|| {
                    CastError::new(path.to_string(), format!("'{trimmed}' is not a number"))
                })
        }
        other => Err(mismatch(path, "number", other)),
    }
}

fn cast_list(raw: &Value, path: &ValuePath) -> Result<Value, CastError> {
    match raw {
        Value::List(items) => {
            if let Some(idx) = items
                .iter()
                .position(|item| matches!(item, Value::List(_)))
            {
                return Err(mismatch(&path_index(path, idx), "a row id", &items[idx]));
            }
            Ok(raw.clone())
        }
        Value::Text(text) if text.trim().is_empty() => Ok(Value::List(Vec::new())),
        // Comma separated ids, as templates store multi-selections.
        Value::Text(text) => Ok(Value::List(
            text.split(',')
                .map(str::trim)
                .filter(|part| !part.is_empty())
                .map(Value::text)
                .collect(),
        )),
        Value::Number(_) => Ok(Value::List(vec![raw.clone()])),
        other => Err(mismatch(path, "list", other)),
    }
}

fn path_index(path: &ValuePath, idx: usize) -> ValuePath {
    let mut segments = path.segments().to_vec();
    segments.push(crate::core::value_path::PathSegment::Index(idx));
    ValuePath::new(segments)
}

fn cast_switch(raw: &Value, path: &ValuePath) -> Result<Value, CastError> {
    match raw {
        Value::Bool(_) => Ok(raw.clone()),
        Value::Number(number) => Ok(Value::Bool(number.as_f64().is_some_and(|n| n != 0.0))),
        Value::Text(text) => match text.trim().to_ascii_lowercase().as_str() {
            "yes" | "true" | "on" | "1" => Ok(Value::Bool(true)),
            "no" | "false" | "off" | "0" | "" => Ok(Value::Bool(false)),
            _ => Err(CastError::new(
                path.to_string(),
                format!("'{text}' is not a yes/no value"),
            )),
        },
        other => Err(mismatch(path, "boolean", other)),
    }
}

fn validate_text(rule: &TextRule, value: &Value, pattern: Option<&Regex>) -> Result<(), String> {
    let Some(text) = value.as_text() else {
        return Err(format!("Must be text, found {}", value.type_name()));
    };
    let len = text.chars().count();
    if let Some(min) = rule.min_len.filter(|min| len < *min) {
        return Err(format!("Must be at least {min} characters"));
    }
    if let Some(max) = rule.max_len.filter(|max| len > *max) {
        return Err(format!("Must be at most {max} characters"));
    }
    if let Some(pattern) = pattern.filter(|pattern| !pattern.is_match(text)) {
        return Err(format!("Must match {}", pattern.as_str()));
    }
    Ok(())
}

fn validate_number(rule: &NumberRule, value: &Value) -> Result<(), String> {
    let Some(number) = value.as_f64() else {
        return Err(format!("Must be a number, found {}", value.type_name()));
    };
    if rule.integer && number.fract() != 0.0 {
        return Err("Must be an integer".to_string());
    }
    if let Some(min) = rule.min.filter(|min| number < *min) {
        return Err(format!("Must be greater than or equal to {min}"));
    }
    if let Some(max) = rule.max.filter(|max| number > *max) {
        return Err(format!("Must be less than or equal to {max}"));
    }
    Ok(())
}

fn validate_membership(selected: &[Value], options: Option<&[SelectOption]>) -> Result<(), String> {
    let Some(options) = options else {
        return Ok(());
    };
    match selected
        .iter()
        .find(|value| !options.iter().any(|option| option.value.loosely_eq(value)))
    {
        Some(unknown) => Err(format!(
            "'{}' is not one of the available options",
            unknown.to_display_string()
        )),
        None => Ok(()),
    }
}
