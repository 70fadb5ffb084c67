#![allow(dead_code)]

use serde_json::json;
use stepform::api::{ApiError, ResourceClient, SessionContext};
use stepform::core::value_path::FieldRef;
use stepform::runtime::Stepper;
use stepform::schema::{FieldKind, NumberRule, OptionSource, SwitchRule};
use stepform::{FieldDescriptor, StepDefinition, Steps, Value};

pub const GENERAL: &str = "general";
pub const INPUTS: &str = "inputs";
pub const REVIEW: &str = "review";
pub const IMAGES: &str = "images";

pub fn general_step() -> StepDefinition {
    StepDefinition::builder(GENERAL, "General")
        .field(FieldDescriptor::text("NAME", "Name").required())
        .field(
            FieldDescriptor::switch("USE_TEMPLATE", "Use template")
                .with_kind(FieldKind::Switch(SwitchRule::default().yes_no())),
        )
        .field(
            FieldDescriptor::number("MEMORY", "Memory")
                .with_kind(FieldKind::Number(NumberRule::default().encoded_as_text())),
        )
        .preserve_unknown()
        .build()
        .expect("general step")
}

pub fn inputs_step() -> StepDefinition {
    StepDefinition::builder(INPUTS, "Inputs")
        .at("USER_INPUTS")
        .fetch(IMAGES)
        .field(
            FieldDescriptor::select(
                "IMAGE",
                "Image",
                OptionSource::Context {
                    key: IMAGES.to_string(),
                },
            )
            .required(),
        )
        .field(
            FieldDescriptor::number("DISK_SIZE", "Disk size").with_kind(FieldKind::Number(
                NumberRule::default().integer().encoded_as_text(),
            )),
        )
        .build()
        .expect("inputs step")
}

pub fn review_step() -> StepDefinition {
    StepDefinition::builder(REVIEW, "Review")
        .field(FieldDescriptor::text("DESCRIPTION", "Description"))
        .build()
        .expect("review step")
}

/// General -> Inputs -> Review, where Inputs only exists while
/// `general::USE_TEMPLATE` is on.
pub fn vm_wizard() -> Steps {
    let use_template = FieldRef::in_step(GENERAL, "USE_TEMPLATE");
    Steps::dynamic([use_template.clone()], move |ctx| {
        let mut steps = vec![general_step()];
        if ctx.value(&use_template).is_some_and(Value::truthy) {
            steps.push(inputs_step());
        }
        steps.push(review_step());
        steps
    })
    .expect("vm wizard")
}

pub fn mount(document: Option<serde_json::Value>) -> Stepper<Steps> {
    Stepper::mount(
        vm_wizard(),
        SessionContext::default(),
        document.map(Value::from),
    )
    .expect("mount")
}

pub fn images() -> Value {
    Value::from(json!([
        {"value": "ubuntu", "label": "Ubuntu 24.04"},
        {"value": "alma", "label": "AlmaLinux 9"}
    ]))
}

/// Client that records every payload and answers with a fixed result.
pub struct RecordingClient {
    pub calls: Vec<Value>,
    pub response: Result<Value, ApiError>,
}

impl RecordingClient {
    pub fn accepting() -> Self {
        Self {
            calls: Vec::new(),
            response: Ok(Value::from(json!({"ID": 42}))),
        }
    }

    pub fn rejecting(message: &str) -> Self {
        Self {
            calls: Vec::new(),
            response: Err(ApiError::rejected(message)),
        }
    }
}

impl ResourceClient for RecordingClient {
    fn submit(&mut self, payload: &Value) -> Result<Value, ApiError> {
        self.calls.push(payload.clone());
        self.response.clone()
    }
}
