mod common;

use common::{GENERAL, IMAGES, INPUTS, REVIEW, RecordingClient, images, mount};
use serde_json::json;
use stepform::api::ApiError;
use stepform::runtime::{Phase, StepStatus};
use stepform::schema::OptionsState;
use stepform::state::FetchStatus;
use stepform::{Value, ValuePath, WizardError};

fn ids(stepper: &stepform::Stepper<stepform::Steps>) -> Vec<String> {
    stepper.step_ids().iter().map(ToString::to_string).collect()
}

fn name(stepper: &stepform::Stepper<stepform::Steps>) -> Option<&Value> {
    stepper.snapshot().get(GENERAL, &ValuePath::from("NAME"))
}

#[test]
fn template_switch_adds_and_removes_the_inputs_step() {
    let mut stepper = mount(None);
    stepper.start().expect("start");
    assert_eq!(ids(&stepper), vec![GENERAL, REVIEW]);

    stepper
        .set_value(GENERAL, "USE_TEMPLATE", true)
        .expect("enable template");
    assert_eq!(ids(&stepper), vec![GENERAL, INPUTS, REVIEW]);

    stepper
        .set_value(GENERAL, "USE_TEMPLATE", false)
        .expect("disable template");
    assert_eq!(ids(&stepper), vec![GENERAL, REVIEW]);
    assert_eq!(stepper.phase(), Phase::StepActive(0));
}

#[test]
fn invalid_step_cannot_advance() {
    let mut stepper = mount(None);
    stepper.start().expect("start");
    let before = stepper.snapshot().clone();

    let err = stepper.next().expect_err("NAME is required");
    let WizardError::StepInvalid { step, issues } = err else {
        panic!("unexpected error: {err:?}");
    };
    assert_eq!(step.as_str(), GENERAL);
    assert_eq!(issues[0].path.to_string(), "NAME");
    assert_eq!(stepper.phase(), Phase::StepActive(0));
    assert_eq!(stepper.snapshot(), &before);

    stepper.set_value(GENERAL, "NAME", "web-1").expect("name");
    stepper.next().expect("next");
    assert_eq!(stepper.current_step().map(|step| step.id.as_str()), Some(REVIEW));
    assert_eq!(stepper.step_status(0), StepStatus::Done);
}

#[test]
fn going_back_never_validates() {
    let mut stepper = mount(None);
    stepper.start().expect("start");
    stepper.set_value(GENERAL, "NAME", "web-1").expect("name");
    stepper.next().expect("next");
    stepper.set_value(REVIEW, "DESCRIPTION", "x").expect("description");
    stepper.set_value(GENERAL, "NAME", "").expect("clear name");

    stepper.back().expect("back");
    assert_eq!(stepper.phase(), Phase::StepActive(0));
    assert_eq!(stepper.back(), Err(WizardError::AtFirstStep));
}

#[test]
fn removed_inputs_step_does_not_block_submission() {
    let mut stepper = mount(None);
    stepper.start().expect("start");
    stepper.set_value(GENERAL, "NAME", "web-1").expect("name");
    stepper.set_value(GENERAL, "USE_TEMPLATE", true).expect("template on");
    stepper.set_value(GENERAL, "USE_TEMPLATE", false).expect("template off");
    stepper.next().expect("next");

    let mut client = RecordingClient::accepting();
    let response = stepper.submit(&mut client).expect("submit");
    assert_eq!(response, Value::from(json!({"ID": 42})));
    assert_eq!(stepper.phase(), Phase::Submitted);
    assert_eq!(
        serde_json::Value::from(client.calls[0].clone()),
        json!({"NAME": "web-1", "USE_TEMPLATE": "NO"})
    );
    assert!(stepper.snapshot().is_empty());
}

#[test]
fn invalid_form_never_reaches_the_client() {
    let mut stepper = mount(None);
    stepper.start().expect("start");
    stepper.set_value(GENERAL, "NAME", "web-1").expect("name");
    stepper.next().expect("next");
    stepper.set_value(GENERAL, "NAME", "").expect("clear name");

    let mut client = RecordingClient::accepting();
    let err = stepper.submit(&mut client).expect_err("invalid form");
    assert!(matches!(err, WizardError::FormInvalid { ref issues } if issues.len() == 1));
    assert!(client.calls.is_empty());
    assert_eq!(stepper.phase(), Phase::StepActive(1));
    assert!(
        stepper
            .validation()
            .visible_error(&stepform::FieldRef::in_step(GENERAL, "NAME"))
            .is_some()
    );
}

#[test]
fn rejected_submission_keeps_the_form_state() {
    let mut stepper = mount(None);
    stepper.start().expect("start");
    stepper.set_value(GENERAL, "NAME", "web-1").expect("name");
    stepper.next().expect("next");

    let mut rejecting = RecordingClient::rejecting("[one.vm.allocate] NAME is already taken");
    let err = stepper.submit(&mut rejecting).expect_err("rejected");
    assert_eq!(
        err,
        WizardError::Submission(ApiError::rejected("[one.vm.allocate] NAME is already taken"))
    );
    assert_eq!(stepper.phase(), Phase::StepActive(1));
    assert_eq!(name(&stepper), Some(&Value::text("web-1")));
    assert_eq!(
        stepper.last_submit_error().map(ApiError::message),
        Some("[one.vm.allocate] NAME is already taken")
    );

    stepper.set_value(GENERAL, "NAME", "web-2").expect("rename");
    let mut accepting = RecordingClient::accepting();
    stepper.submit(&mut accepting).expect("resubmit");
    assert_eq!(stepper.phase(), Phase::Submitted);
    assert!(stepper.last_submit_error().is_none());
}

#[test]
fn cancel_discards_everything() {
    let mut stepper = mount(Some(json!({"NAME": "web-1"})));
    stepper.start().expect("start");
    assert_eq!(name(&stepper), Some(&Value::text("web-1")));

    stepper.cancel();
    assert_eq!(stepper.phase(), Phase::Cancelled);
    assert!(stepper.snapshot().is_empty());
    assert_eq!(stepper.begin_submit(), Err(WizardError::NotActive));
    assert!(stepper.view().is_none());
}

#[test]
fn pending_fetch_holds_the_step() {
    let mut stepper = mount(Some(json!({"NAME": "web-1", "USE_TEMPLATE": "YES"})));
    stepper.start().expect("start");
    assert_eq!(ids(&stepper), vec![GENERAL, INPUTS, REVIEW]);
    stepper.next().expect("to inputs");

    let tickets = stepper.take_pending_fetches();
    assert_eq!(tickets.len(), 1);
    assert_eq!(tickets[0].key, IMAGES);
    assert!(stepper.is_loading());
    assert_eq!(
        stepper.next(),
        Err(WizardError::Loading(stepform::StepId::from(INPUTS)))
    );

    assert!(stepper.complete_fetch(&tickets[0], Ok(images())));
    assert!(!stepper.is_loading());
    let view = stepper.view().expect("view");
    let image = view.field("IMAGE").expect("image field");
    assert!(matches!(&image.options, OptionsState::Ready(options) if options.len() == 2));

    assert!(matches!(
        stepper.next(),
        Err(WizardError::StepInvalid { .. })
    ));
    stepper.set_value(INPUTS, "IMAGE", "ubuntu").expect("image");
    stepper.next().expect("to review");
    assert_eq!(stepper.current_step().map(|step| step.id.as_str()), Some(REVIEW));
}

#[test]
fn stale_fetch_results_are_dropped() {
    let mut stepper = mount(Some(json!({"NAME": "web-1", "USE_TEMPLATE": "YES"})));
    stepper.start().expect("start");
    stepper.next().expect("to inputs");
    let first = stepper.take_pending_fetches().remove(0);

    let retried = stepper.retry_fetch(IMAGES).expect("retry");
    assert!(!stepper.complete_fetch(&first, Ok(Value::from(json!(["stale"])))));
    assert_eq!(stepper.aux().get(IMAGES), Some(&FetchStatus::Pending));

    let mut other = mount(None);
    other.start().expect("start");
    assert!(!other.complete_fetch(&retried, Ok(images())));

    assert!(stepper.complete_fetch(&retried, Ok(images())));
    assert_eq!(stepper.aux().ready(IMAGES), Some(&images()));
}

#[test]
fn failed_fetch_can_be_retried() {
    let mut stepper = mount(Some(json!({"NAME": "web-1", "USE_TEMPLATE": "YES"})));
    stepper.start().expect("start");
    stepper.next().expect("to inputs");
    let ticket = stepper.take_pending_fetches().remove(0);

    assert!(stepper.complete_fetch(&ticket, Err(ApiError::Transport("timeout".to_string()))));
    let view = stepper.view().expect("view");
    assert_eq!(
        view.fetches,
        vec![(IMAGES.to_string(), FetchStatus::Failed("timeout".to_string()))]
    );
    assert!(view.field("IMAGE").is_some_and(|field| field.disabled));

    let retry = stepper.retry_fetch(IMAGES).expect("retry");
    assert!(stepper.is_loading());
    assert!(stepper.complete_fetch(&retry, Ok(images())));
    assert!(!stepper.is_loading());
}

#[test]
fn forward_jump_validates_skipped_steps() {
    let mut stepper = mount(None);
    stepper.start().expect("start");
    assert!(matches!(
        stepper.go_to(REVIEW),
        Err(WizardError::StepInvalid { .. })
    ));
    assert_eq!(
        stepper.go_to("nowhere"),
        Err(WizardError::UnknownStep(stepform::StepId::from("nowhere")))
    );
    stepper.set_value(GENERAL, "NAME", "web-1").expect("name");
    stepper.go_to(REVIEW).expect("jump");
    assert_eq!(stepper.phase(), Phase::StepActive(1));
}

#[test]
fn jumping_over_an_unopened_step_waits_for_its_data_and_checks_it() {
    let mut stepper = mount(None);
    stepper.start().expect("start");
    stepper.set_value(GENERAL, "NAME", "web-1").expect("name");
    stepper.set_value(GENERAL, "USE_TEMPLATE", true).expect("template on");
    assert_eq!(ids(&stepper), vec![GENERAL, INPUTS, REVIEW]);

    let tickets = stepper.take_pending_fetches();
    assert_eq!(tickets.len(), 1);
    assert_eq!(tickets[0].key, IMAGES);
    assert!(!stepper.is_loading());

    assert_eq!(
        stepper.go_to(REVIEW),
        Err(WizardError::Loading(stepform::StepId::from(INPUTS)))
    );
    assert_eq!(stepper.phase(), Phase::StepActive(0));

    assert!(stepper.complete_fetch(&tickets[0], Ok(images())));
    let Err(WizardError::StepInvalid { step, issues }) = stepper.go_to(REVIEW) else {
        panic!("inputs::IMAGE is required");
    };
    assert_eq!(step.as_str(), INPUTS);
    assert_eq!(issues[0].path.to_string(), "IMAGE");
    assert_eq!(stepper.phase(), Phase::StepActive(0));

    stepper.set_value(INPUTS, "IMAGE", "ubuntu").expect("image");
    stepper.go_to(REVIEW).expect("jump");
    let mut client = RecordingClient::accepting();
    stepper.submit(&mut client).expect("submit");
    let sent = serde_json::Value::from(client.calls[0].clone());
    assert_eq!(sent["USER_INPUTS"]["IMAGE"], "ubuntu");
}

#[test]
fn failed_option_list_blocks_submission() {
    let mut stepper = mount(Some(json!({"NAME": "web-1", "USE_TEMPLATE": "YES"})));
    stepper.start().expect("start");
    let ticket = stepper.take_pending_fetches().remove(0);
    assert!(stepper.complete_fetch(&ticket, Ok(images())));
    stepper.next().expect("to inputs");
    stepper.set_value(INPUTS, "IMAGE", "ubuntu").expect("image");
    stepper.next().expect("to review");

    let retry = stepper.retry_fetch(IMAGES).expect("retry");
    let mut client = RecordingClient::accepting();
    assert_eq!(
        stepper.submit(&mut client),
        Err(WizardError::Loading(stepform::StepId::from(INPUTS)))
    );

    assert!(stepper.complete_fetch(&retry, Err(ApiError::Transport("timeout".to_string()))));
    let Err(WizardError::FormInvalid { issues }) = stepper.submit(&mut client) else {
        panic!("image options are unavailable");
    };
    assert_eq!(issues.len(), 1);
    assert_eq!(issues[0].step.as_str(), INPUTS);
    assert_eq!(issues[0].message, "Options could not be loaded: timeout");
    assert!(client.calls.is_empty());
    assert_eq!(stepper.phase(), Phase::StepActive(2));
}

#[test]
fn misspelled_step_is_rejected() {
    let mut stepper = mount(None);
    stepper.start().expect("start");
    let before = stepper.snapshot().clone();
    assert_eq!(
        stepper.set_value("genral", "NAME", "web-1"),
        Err(WizardError::UnknownStep(stepform::StepId::from("genral")))
    );
    assert_eq!(stepper.snapshot(), &before);
    assert!(stepper.snapshot().namespace("genral").is_none());
}
