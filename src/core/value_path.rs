use crate::core::StepId;
use crate::core::value::Value;
use schemars::JsonSchema;
use schemars::r#gen::SchemaGenerator;
use schemars::schema::Schema;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::iter::Peekable;
use std::str::CharIndices;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PathSegment {
    Key(String),
    Index(usize),
}

/// Location of a value inside a nested document, e.g. `CONTEXT.START_SCRIPT`
/// or `DISK[0].IMAGE`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct ValuePath {
    segments: Vec<PathSegment>,
}

impl ValuePath {
    pub fn new(segments: Vec<PathSegment>) -> Self {
        Self { segments }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn key(key: impl Into<String>) -> Self {
        Self::new(vec![PathSegment::Key(key.into())])
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    pub fn segments(&self) -> &[PathSegment] {
        self.segments.as_slice()
    }

    pub fn parse(input: &str) -> Result<Self, ValuePathParseError> {
        parse_path(input, false)
    }

    pub fn parse_relative(input: &str) -> Result<Self, ValuePathParseError> {
        parse_path(input, true)
    }

    pub fn join(&self, other: &ValuePath) -> Self {
        let mut segments = self.segments.clone();
        segments.extend(other.segments.iter().cloned());
        Self { segments }
    }

    pub fn child(&self, key: impl Into<String>) -> Self {
        let mut segments = self.segments.clone();
        segments.push(PathSegment::Key(key.into()));
        Self { segments }
    }

    pub fn parent(&self) -> Option<Self> {
        let (_, head) = self.segments.split_last()?;
        Some(Self::new(head.to_vec()))
    }

    pub fn last(&self) -> Option<&PathSegment> {
        self.segments.last()
    }

    pub fn starts_with(&self, prefix: &ValuePath) -> bool {
        self.segments.starts_with(prefix.segments())
    }

    /// True when one path is a prefix of the other (including equality).
    pub fn overlaps(&self, other: &ValuePath) -> bool {
        self.starts_with(other) || other.starts_with(self)
    }
}

/// Lenient conversion used by builders: a string that does not parse as a
/// path becomes a single literal key.
impl From<&str> for ValuePath {
    fn from(value: &str) -> Self {
        Self::parse(value).unwrap_or_else(|_| Self::key(value))
    }
}

impl From<String> for ValuePath {
    fn from(value: String) -> Self {
        Self::from(value.as_str())
    }
}

impl From<&ValuePath> for ValuePath {
    fn from(value: &ValuePath) -> Self {
        value.clone()
    }
}

impl fmt::Display for ValuePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (idx, segment) in self.segments.iter().enumerate() {
            match segment {
                PathSegment::Index(index) => write!(f, "[{index}]")?,
                PathSegment::Key(key) if is_identifier(key) => {
                    if idx > 0 {
                        f.write_str(".")?;
                    }
                    f.write_str(key)?;
                }
                PathSegment::Key(key) => {
                    let escaped = key.replace('\\', "\\\\").replace('"', "\\\"");
                    write!(f, "[\"{escaped}\"]")?;
                }
            }
        }
        Ok(())
    }
}

impl Serialize for ValuePath {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for ValuePath {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        ValuePath::parse(raw.as_str()).map_err(serde::de::Error::custom)
    }
}

impl JsonSchema for ValuePath {
    fn schema_name() -> String {
        "ValuePath".to_string()
    }

    fn json_schema(generator: &mut SchemaGenerator) -> Schema {
        String::json_schema(generator)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct ValuePathParseError {
    message: String,
}

impl ValuePathParseError {
    pub(crate) fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Reference to a field, optionally in another step's namespace.
///
/// Selector format:
/// - `field.sub[0]` -> field in the referencing step
/// - `step::field.sub[0]` -> field in the named step
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FieldRef {
    pub step: Option<StepId>,
    pub path: ValuePath,
}

impl FieldRef {
    pub fn local(path: impl Into<ValuePath>) -> Self {
        Self {
            step: None,
            path: path.into(),
        }
    }

    pub fn in_step(step: impl Into<StepId>, path: impl Into<ValuePath>) -> Self {
        Self {
            step: Some(step.into()),
            path: path.into(),
        }
    }

    pub fn parse_selector(selector: &str) -> Result<Self, ValuePathParseError> {
        let trimmed = selector.trim();
        if trimmed.is_empty() {
            return Err(ValuePathParseError::new("empty selector"));
        }
        let Some((root, raw_path)) = trimmed.split_once("::") else {
            return Ok(Self::local(ValuePath::parse(trimmed)?));
        };
        let root = root.trim();
        if root.is_empty() {
            return Err(ValuePathParseError::new("selector step is empty"));
        }
        let path = ValuePath::parse_relative(raw_path.trim())?;
        if path.is_empty() {
            return Err(ValuePathParseError::new("selector path is empty"));
        }
        Ok(Self::in_step(root, path))
    }

    /// Same reference with the step filled in for local selectors.
    pub fn scoped(&self, own: &StepId) -> Self {
        Self {
            step: Some(self.step.clone().unwrap_or_else(|| own.clone())),
            path: self.path.clone(),
        }
    }

    pub fn to_selector(&self) -> String {
        match &self.step {
            None => self.path.to_string(),
            Some(step) => format!("{}::{}", step, self.path),
        }
    }
}

impl From<&str> for FieldRef {
    fn from(value: &str) -> Self {
        Self::parse_selector(value).unwrap_or_else(|_| Self::local(ValuePath::key(value)))
    }
}

impl fmt::Display for FieldRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.to_selector().as_str())
    }
}

impl Serialize for FieldRef {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for FieldRef {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        FieldRef::parse_selector(raw.as_str()).map_err(serde::de::Error::custom)
    }
}

impl JsonSchema for FieldRef {
    fn schema_name() -> String {
        "FieldRef".to_string()
    }

    fn json_schema(generator: &mut SchemaGenerator) -> Schema {
        String::json_schema(generator)
    }
}

fn parse_path(input: &str, relative: bool) -> Result<ValuePath, ValuePathParseError> {
    let mut cursor = Cursor::new(input.trim());
    let mut segments = Vec::new();

    while let Some(&(at, ch)) = cursor.chars.peek() {
        match ch {
            '.' => {
                if segments.is_empty() && !relative {
                    return Err(ValuePathParseError::new("path cannot start with '.'"));
                }
                cursor.chars.next();
                segments.push(PathSegment::Key(cursor.bare_key()?));
            }
            '[' => {
                cursor.chars.next();
                segments.push(cursor.bracket()?);
            }
            _ if segments.is_empty() => segments.push(PathSegment::Key(cursor.bare_key()?)),
            _ => {
                return Err(ValuePathParseError::new(format!(
                    "unexpected character '{ch}' at position {at}"
                )));
            }
        }
    }

    Ok(ValuePath::new(segments))
}

struct Cursor<'s> {
    input: &'s str,
    chars: Peekable<CharIndices<'s>>,
}

impl<'s> Cursor<'s> {
    fn new(input: &'s str) -> Self {
        Self {
            input,
            chars: input.char_indices().peekable(),
        }
    }

    fn offset(&mut self) -> usize {
        self.chars.peek().map_or(self.input.len(), |&(at, _)| at)
    }

    fn bare_key(&mut self) -> Result<String, ValuePathParseError> {
        let start = self.offset();
        while self
            .chars
            .next_if(|&(_, ch)| !matches!(ch, '.' | '[' | ']'))
            .is_some()
        {}
        let end = self.offset();
        if start == end {
            return Err(ValuePathParseError::new(format!(
                "expected key at position {start}"
            )));
        }
        Ok(self.input[start..end].to_string())
    }

    /// Segment after an opening `[`: a quoted key, an index or a bare key.
    fn bracket(&mut self) -> Result<PathSegment, ValuePathParseError> {
        let segment = match self.chars.peek().map(|&(_, ch)| ch) {
            None => return Err(ValuePathParseError::new("unterminated '[' segment")),
            Some(quote @ ('"' | '\'')) => {
                self.chars.next();
                PathSegment::Key(self.quoted(quote)?)
            }
            Some(_) => {
                let start = self.offset();
                while self.chars.next_if(|&(_, ch)| ch != ']').is_some() {}
                let end = self.offset();
                let raw = self.input[start..end].trim();
                if raw.is_empty() {
                    return Err(ValuePathParseError::new("empty bracket segment"));
                }
                raw.parse::<usize>()
                    .map_or_else(|_| PathSegment::Key(raw.to_string()), PathSegment::Index)
            }
        };
        if self.chars.next_if(|&(_, ch)| ch == ']').is_none() {
            return Err(ValuePathParseError::new("expected closing ']'"));
        }
        Ok(segment)
    }

    fn quoted(&mut self, quote: char) -> Result<String, ValuePathParseError> {
        let mut key = String::new();
        loop {
            match self.chars.next() {
                Some((_, '\\')) => match self.chars.next() {
                    Some((_, escaped)) => key.push(escaped),
                    None => {
                        return Err(ValuePathParseError::new(
                            "unterminated escape in quoted key",
                        ));
                    }
                },
                Some((_, ch)) if ch == quote => return Ok(key),
                Some((_, ch)) => key.push(ch),
                None => return Err(ValuePathParseError::new("unterminated quoted key")),
            }
        }
    }
}

fn is_identifier(input: &str) -> bool {
    let mut chars = input.chars();
    chars
        .next()
        .is_some_and(|first| first.is_ascii_alphabetic() || first == '_')
        && chars.all(|ch| ch.is_ascii_alphanumeric() || matches!(ch, '_' | '-'))
}

/// Slot at `segments` below `current`, turning whatever sits in the way into
/// the container the next segment needs.
fn slot_mut<'a>(current: &'a mut Value, segments: &[PathSegment]) -> Option<&'a mut Value> {
    let Some((first, rest)) = segments.split_first() else {
        return Some(current);
    };
    let child = match first {
        PathSegment::Key(key) => {
            if !matches!(current, Value::Object(_)) {
                *current = Value::object();
            }
            current.as_object_mut()?.entry(key.clone()).or_default()
        }
        PathSegment::Index(index) => {
            if !matches!(current, Value::List(_)) {
                *current = Value::List(Vec::new());
            }
            let Value::List(list) = current else {
                return None;
            };
            if list.len() <= *index {
                list.resize_with(index + 1, Value::default);
            }
            &mut list[*index]
        }
    };
    slot_mut(child, rest)
}

impl Value {
    pub fn get_path(&self, path: &ValuePath) -> Option<&Value> {
        let mut current = self;
        for segment in path.segments() {
            current = match (segment, current) {
                (PathSegment::Key(key), Value::Object(map)) => map.get(key.as_str())?,
                (PathSegment::Index(index), Value::List(list)) => list.get(*index)?,
                _ => return None,
            };
        }
        Some(current)
    }

    /// Writes `value` at `path`, creating intermediate containers.
    pub fn set_path(&mut self, path: &ValuePath, value: Value) {
        if let Some(slot) = slot_mut(self, path.segments()) {
            *slot = value;
        }
    }

    /// Removes the value at `path`. Object keys are shifted out so sibling
    /// order stays intact; list slots are reset to `None`.
    pub fn remove_path(&mut self, path: &ValuePath) -> Option<Value> {
        let (last, head) = path.segments().split_last()?;
        let mut current = self;
        for segment in head {
            current = match (segment, current) {
                (PathSegment::Key(key), Value::Object(map)) => map.get_mut(key.as_str())?,
                (PathSegment::Index(index), Value::List(list)) => list.get_mut(*index)?,
                _ => return None,
            };
        }
        match (last, current) {
            (PathSegment::Key(key), Value::Object(map)) => map.shift_remove(key.as_str()),
            (PathSegment::Index(index), Value::List(list)) => {
                list.get_mut(*index).map(std::mem::take)
            }
            _ => None,
        }
    }
}
