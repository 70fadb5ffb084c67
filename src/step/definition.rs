use crate::core::StepId;
use crate::core::value::Value;
use crate::core::value_path::{FieldRef, ValuePath};
use crate::error::{CastError, ComposeError};
use crate::schema::compose::{ObjectSchema, UnknownKeys, compose, lookup};
use crate::schema::field::{FieldDescriptor, ResolvedField};
use crate::state::context::{FetchStatus, FormContext, ResolveScope};
use crate::state::validation::{FieldIssue, ValidationState};
use std::fmt;
use std::sync::Arc;

pub type SchemaFn = dyn Fn(&FormContext<'_>) -> Result<ObjectSchema, ComposeError> + Send + Sync;
pub type ContentFn = dyn Fn(&StepProps<'_>) -> StepView + Send + Sync;
pub type ReadFn = dyn Fn(&Value) -> Result<Value, CastError> + Send + Sync;
pub type WriteFn = dyn Fn(&mut Value, &Value) + Send + Sync;

// ---------------------------------------------------------------------------
// Schema resolvers
// ---------------------------------------------------------------------------

#[derive(Clone)]
pub enum Resolver {
    Fixed(ObjectSchema),
    /// Context-sensitive schema, merged over the statically declared fields.
    Dynamic {
        base: ObjectSchema,
        resolve: Arc<SchemaFn>,
    },
}

impl Resolver {
    pub fn resolve(&self, ctx: &FormContext<'_>) -> Result<ObjectSchema, ComposeError> {
        match self {
            Self::Fixed(schema) => Ok(schema.clone()),
            Self::Dynamic { base, resolve } => {
                let extra = resolve(ctx)?;
                if base.is_empty() {
                    let unknown_keys = merged_keys(base, &extra);
                    Ok(extra.with_unknown_keys(unknown_keys))
                } else {
                    base.merge(&extra)
                }
            }
        }
    }

    pub fn is_dynamic(&self) -> bool {
        matches!(self, Self::Dynamic { .. })
    }
}

fn merged_keys(base: &ObjectSchema, extra: &ObjectSchema) -> UnknownKeys {
    if base.unknown_keys() == UnknownKeys::Preserve {
        UnknownKeys::Preserve
    } else {
        extra.unknown_keys()
    }
}

impl fmt::Debug for Resolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Fixed(schema) => f.debug_tuple("Fixed").field(&schema.keys()).finish(),
            Self::Dynamic { base, .. } => f
                .debug_struct("Dynamic")
                .field("base", &base.keys())
                .finish_non_exhaustive(),
        }
    }
}

// ---------------------------------------------------------------------------
// Document binding
// ---------------------------------------------------------------------------

/// Where a step's namespace lives in the external resource document.
#[derive(Clone, Default)]
pub enum DocumentBinding {
    #[default]
    Root,
    At(ValuePath),
    Custom {
        read: Arc<ReadFn>,
        write: Arc<WriteFn>,
    },
}

impl DocumentBinding {
    pub fn at(path: impl Into<ValuePath>) -> Self {
        Self::At(path.into())
    }

    /// `write` receives the payload being built and the step's encoded
    /// values.
    pub fn custom(
        read: impl Fn(&Value) -> Result<Value, CastError> + Send + Sync + 'static,
        write: impl Fn(&mut Value, &Value) + Send + Sync + 'static,
    ) -> Self {
        Self::Custom {
            read: Arc::new(read),
            write: Arc::new(write),
        }
    }

    pub fn read(&self, document: &Value) -> Result<Value, CastError> {
        match self {
            Self::Root => Ok(document.clone()),
            Self::At(path) => Ok(lookup(document, path)?.cloned().unwrap_or_default()),
            Self::Custom { read, .. } => read(document),
        }
    }

    pub fn write(&self, schema: &ObjectSchema, document: &mut Value, values: &Value) {
        match self {
            Self::Root => schema.write_into(document, values),
            Self::At(path) => {
                let mut target = document
                    .get_path(path)
                    .cloned()
                    .unwrap_or_else(Value::object);
                schema.write_into(&mut target, values);
                document.set_path(path, target);
            }
            Self::Custom { write, .. } => write(document, &schema.encode(values)),
        }
    }
}

impl fmt::Debug for DocumentBinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Root => f.write_str("Root"),
            Self::At(path) => write!(f, "At({path})"),
            Self::Custom { .. } => f.write_str("Custom"),
        }
    }
}

// ---------------------------------------------------------------------------
// Views
// ---------------------------------------------------------------------------

/// Everything the content function of a step can read.
pub struct StepProps<'a> {
    pub step: &'a StepDefinition,
    pub schema: &'a ObjectSchema,
    pub scope: ResolveScope<'a>,
    pub validation: &'a ValidationState,
    pub position: usize,
    pub total: usize,
    pub loading: bool,
}

/// Plain description of a step, ready for a UI layer to draw.
#[derive(Debug, Clone, PartialEq)]
pub struct StepView {
    pub id: StepId,
    pub label: String,
    pub description: Option<String>,
    pub position: usize,
    pub total: usize,
    pub loading: bool,
    pub fields: Vec<ResolvedField>,
    /// Revealed issues only; issues found while typing stay hidden.
    pub issues: Vec<FieldIssue>,
    pub step_errors: Vec<String>,
    pub fetches: Vec<(String, FetchStatus)>,
}

impl StepView {
    pub fn from_props(props: &StepProps<'_>) -> Self {
        let step_id = props.scope.step;
        let fields = props.schema.resolve_all(&props.scope);
        let issues = fields
            .iter()
            .filter_map(|field| {
                let field_ref = FieldRef::in_step(step_id, &field.name);
                props
                    .validation
                    .visible_error(&field_ref)
                    .map(|message| FieldIssue::new(step_id, &field.name, message))
            })
            .collect();
        let fetches = props
            .step
            .fetches()
            .iter()
            .map(|key| {
                let status = props
                    .scope
                    .aux()
                    .get(key)
                    .cloned()
                    .unwrap_or(FetchStatus::Pending);
                (key.clone(), status)
            })
            .collect();

        Self {
            id: step_id.clone(),
            label: props.step.label.clone(),
            description: props.step.description.clone(),
            position: props.position,
            total: props.total,
            loading: props.loading,
            fields,
            issues,
            step_errors: props.validation.step_errors(step_id.as_str()).to_vec(),
            fetches,
        }
    }

    pub fn visible_fields(&self) -> impl Iterator<Item = &ResolvedField> {
        self.fields.iter().filter(|field| field.visible)
    }

    pub fn field(&self, name: &str) -> Option<&ResolvedField> {
        let path = ValuePath::from(name);
        self.fields.iter().find(|field| field.name == path)
    }
}

// ---------------------------------------------------------------------------
// Step definition
// ---------------------------------------------------------------------------

#[derive(Clone)]
pub struct StepDefinition {
    pub id: StepId,
    pub label: String,
    pub description: Option<String>,
    fields: Vec<FieldDescriptor>,
    resolver: Resolver,
    content: Option<Arc<ContentFn>>,
    binding: DocumentBinding,
    fetches: Vec<String>,
}

impl StepDefinition {
    pub fn builder(id: impl Into<StepId>, label: impl Into<String>) -> StepBuilder {
        StepBuilder::new(id, label)
    }

    /// Statically declared fields; a dynamic resolver may add more.
    pub fn fields(&self) -> &[FieldDescriptor] {
        self.fields.as_slice()
    }

    pub fn resolver(&self) -> &Resolver {
        &self.resolver
    }

    pub fn binding(&self) -> &DocumentBinding {
        &self.binding
    }

    /// Aux fetch keys the step needs before it can be used.
    pub fn fetches(&self) -> &[String] {
        self.fetches.as_slice()
    }

    pub fn schema(&self, ctx: &FormContext<'_>) -> Result<ObjectSchema, ComposeError> {
        self.resolver.resolve(ctx)
    }

    pub fn render(&self, props: &StepProps<'_>) -> StepView {
        match &self.content {
            Some(content) => content(props),
            None => StepView::from_props(props),
        }
    }

    /// Reads and casts this step's slice of an external document.
    pub fn read_document(
        &self,
        schema: &ObjectSchema,
        document: &Value,
    ) -> Result<Value, CastError> {
        let raw = self
            .binding
            .read(document)
            .map_err(|err| err.in_step(&self.id))?;
        schema.cast(&raw).map_err(|err| err.in_step(&self.id))
    }

    pub fn write_document(&self, schema: &ObjectSchema, document: &mut Value, values: &Value) {
        self.binding.write(schema, document, values);
    }
}

impl fmt::Debug for StepDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StepDefinition")
            .field("id", &self.id)
            .field("label", &self.label)
            .field("resolver", &self.resolver)
            .field("binding", &self.binding)
            .field("fetches", &self.fetches)
            .finish_non_exhaustive()
    }
}

pub struct StepBuilder {
    id: StepId,
    label: String,
    description: Option<String>,
    fields: Vec<FieldDescriptor>,
    resolve: Option<Arc<SchemaFn>>,
    content: Option<Arc<ContentFn>>,
    binding: DocumentBinding,
    fetches: Vec<String>,
    unknown_keys: UnknownKeys,
}

impl StepBuilder {
    pub fn new(id: impl Into<StepId>, label: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            label: label.into(),
            description: None,
            fields: Vec::new(),
            resolve: None,
            content: None,
            binding: DocumentBinding::default(),
            fetches: Vec::new(),
            unknown_keys: UnknownKeys::default(),
        }
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn field(mut self, field: FieldDescriptor) -> Self {
        self.fields.push(field);
        self
    }

    pub fn fields(mut self, fields: impl IntoIterator<Item = FieldDescriptor>) -> Self {
        self.fields.extend(fields);
        self
    }

    pub fn resolver(
        mut self,
        resolve: impl Fn(&FormContext<'_>) -> Result<ObjectSchema, ComposeError>
        + Send
        + Sync
        + 'static,
    ) -> Self {
        self.resolve = Some(Arc::new(resolve));
        self
    }

    pub fn content(mut self, content: impl Fn(&StepProps<'_>) -> StepView + Send + Sync + 'static) -> Self {
        self.content = Some(Arc::new(content));
        self
    }

    pub fn binding(mut self, binding: DocumentBinding) -> Self {
        self.binding = binding;
        self
    }

    pub fn at(self, path: impl Into<ValuePath>) -> Self {
        self.binding(DocumentBinding::at(path))
    }

    pub fn fetch(mut self, key: impl Into<String>) -> Self {
        self.fetches.push(key.into());
        self
    }

    pub fn preserve_unknown(mut self) -> Self {
        self.unknown_keys = UnknownKeys::Preserve;
        self
    }

    pub fn build(self) -> Result<StepDefinition, ComposeError> {
        let base = compose(self.fields.iter().cloned())?.with_unknown_keys(self.unknown_keys);
        let resolver = match self.resolve {
            Some(resolve) => Resolver::Dynamic { base, resolve },
            None => Resolver::Fixed(base),
        };
        Ok(StepDefinition {
            id: self.id,
            label: self.label,
            description: self.description,
            fields: self.fields,
            resolver,
            content: self.content,
            binding: self.binding,
            fetches: self.fetches,
        })
    }
}
