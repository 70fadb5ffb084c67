use crate::core::StepId;
use crate::core::value_path::{FieldRef, ValuePath};
use indexmap::IndexMap;
use std::collections::HashMap;
use std::fmt;

/// One field rule that rejected its current value.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldIssue {
    pub step: StepId,
    pub path: ValuePath,
    pub message: String,
}

impl FieldIssue {
    pub fn new(step: impl Into<StepId>, path: impl Into<ValuePath>, message: impl Into<String>) -> Self {
        Self {
            step: step.into(),
            path: path.into(),
            message: message.into(),
        }
    }

    pub fn field_ref(&self) -> FieldRef {
        FieldRef::in_step(self.step.clone(), self.path.clone())
    }
}

impl fmt::Display for FieldIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}::{}: {}", self.step, self.path, self.message)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorVisibility {
    Hidden,
    Inline,
}

#[derive(Debug, Clone)]
pub struct ValidationEntry {
    pub error: String,
    pub visibility: ErrorVisibility,
}

/// Field errors stay attached to their field; step errors are messages that
/// belong to no single field.
#[derive(Debug, Default, Clone)]
pub struct ValidationState {
    entries: HashMap<FieldRef, ValidationEntry>,
    step_errors: IndexMap<StepId, Vec<String>>,
}

impl ValidationState {
    pub fn set_error(
        &mut self,
        field: FieldRef,
        error: impl Into<String>,
        visibility: ErrorVisibility,
    ) {
        self.entries.insert(
            field,
            ValidationEntry {
                error: error.into(),
                visibility,
            },
        );
    }

    pub fn clear_error(&mut self, field: &FieldRef) {
        self.entries.remove(field);
    }

    /// Replaces every field error of `step` with `issues`.
    pub fn apply_issues(&mut self, step: &StepId, issues: &[FieldIssue], reveal: bool) {
        self.clear_step(step);
        let visibility = if reveal {
            ErrorVisibility::Inline
        } else {
            ErrorVisibility::Hidden
        };
        for issue in issues.iter().filter(|issue| &issue.step == step) {
            self.set_error(issue.field_ref(), issue.message.clone(), visibility);
        }
    }

    pub fn clear_step(&mut self, step: &StepId) {
        self.entries
            .retain(|field, _| field.step.as_ref() != Some(step));
        self.step_errors.shift_remove(step);
    }

    pub fn set_step_errors(&mut self, step: &StepId, errors: Vec<String>) {
        if errors.is_empty() {
            self.step_errors.shift_remove(step);
        } else {
            self.step_errors.insert(step.clone(), errors);
        }
    }

    pub fn step_errors(&self, step: &str) -> &[String] {
        self.step_errors
            .get(step)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    pub fn visible_error(&self, field: &FieldRef) -> Option<&str> {
        self.entries.get(field).and_then(|entry| {
            matches!(entry.visibility, ErrorVisibility::Inline).then_some(entry.error.as_str())
        })
    }

    pub fn is_hidden_invalid(&self, field: &FieldRef) -> bool {
        self.entries
            .get(field)
            .is_some_and(|entry| matches!(entry.visibility, ErrorVisibility::Hidden))
    }

    pub fn has_errors(&self, step: &StepId) -> bool {
        self.entries
            .keys()
            .any(|field| field.step.as_ref() == Some(step))
            || !self.step_errors(step.as_str()).is_empty()
    }

    pub fn visible_entries(&self) -> impl Iterator<Item = (&FieldRef, &str)> {
        self.entries.iter().filter_map(|(field, entry)| {
            matches!(entry.visibility, ErrorVisibility::Inline)
                .then_some((field, entry.error.as_str()))
        })
    }

    /// Drops errors of steps that are no longer part of the wizard.
    pub fn retain_steps(&mut self, active: &[StepId]) {
        self.entries.retain(|field, _| {
            field
                .step
                .as_ref()
                .is_some_and(|step| active.contains(step))
        });
        self.step_errors.retain(|step, _| active.contains(step));
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.step_errors.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::{FieldIssue, ValidationState};
    use crate::core::StepId;
    use crate::core::value_path::FieldRef;

    #[test]
    fn apply_issues_replaces_only_that_step() {
        let general = StepId::from("general");
        let extra = StepId::from("extra");
        let mut state = ValidationState::default();
        state.apply_issues(&extra, &[FieldIssue::new("extra", "DISK", "Is required")], true);
        state.apply_issues(&general, &[FieldIssue::new("general", "NAME", "Is required")], true);
        state.apply_issues(&general, &[], true);

        assert!(!state.has_errors(&general));
        assert_eq!(
            state.visible_error(&FieldRef::in_step("extra", "DISK")),
            Some("Is required")
        );
    }

    #[test]
    fn hidden_errors_are_not_visible() {
        let step = StepId::from("general");
        let mut state = ValidationState::default();
        state.apply_issues(&step, &[FieldIssue::new("general", "NAME", "Is required")], false);

        let field = FieldRef::in_step("general", "NAME");
        assert_eq!(state.visible_error(&field), None);
        assert!(state.is_hidden_invalid(&field));
    }

    #[test]
    fn retain_steps_prunes_inactive_steps() {
        let mut state = ValidationState::default();
        state.apply_issues(
            &StepId::from("inputs"),
            &[FieldIssue::new("inputs", "PORT", "Is required")],
            true,
        );
        state.retain_steps(&[StepId::from("general")]);
        assert_eq!(state.visible_entries().count(), 0);
    }
}
