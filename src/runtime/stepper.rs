use crate::api::{ApiError, QueryState, ResourceClient, SessionContext};
use crate::core::StepId;
use crate::core::value::Value;
use crate::core::value_path::{FieldRef, ValuePath};
use crate::error::WizardError;
use crate::runtime::fetch::{FetchRegistry, FetchTicket, SessionId};
use crate::runtime::flow::{Flow, StepStatus};
use crate::state::context::{AuxData, FetchStatus, FormContext};
use crate::state::store::FormState;
use crate::state::validation::{FieldIssue, ValidationState};
use crate::step::definition::{StepDefinition, StepProps, StepView};
use crate::step::lifecycle::{ActiveSteps, FormLifecycle};
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    StepActive(usize),
    Submitting,
    Submitted,
    Cancelled,
}

impl Phase {
    pub fn is_finished(self) -> bool {
        matches!(self, Self::Submitted | Self::Cancelled)
    }
}

/// Drives one mounted wizard: owns its form state, walks the active steps
/// and hands out fetch tickets.
pub struct Stepper<L: FormLifecycle> {
    lifecycle: L,
    session: SessionContext,
    initial: Option<Value>,
    state: FormState,
    aux: AuxData,
    active: ActiveSteps,
    flow: Flow,
    phase: Phase,
    validation: ValidationState,
    fetches: FetchRegistry,
    last_submit_error: Option<ApiError>,
}

impl<L: FormLifecycle> Stepper<L> {
    /// Seeds the form state from `initial`. A document that cannot be cast
    /// fails the mount; there is no partially seeded wizard.
    pub fn mount(
        lifecycle: L,
        session: SessionContext,
        initial: Option<Value>,
    ) -> Result<Self, WizardError> {
        let session_id = SessionId::next();
        let aux = AuxData::new();
        let empty = FormState::new();

        let state = {
            let ctx = FormContext::new(&empty, &session, &aux).with_initial(initial.as_ref());
            let document = initial.as_ref().unwrap_or(&Value::None);
            lifecycle
                .transform_initial_value(document, &ctx)
                .inspect_err(|err| warn!(session = %session_id, error = %err, "mount failed"))?
        };
        let active = {
            let ctx = FormContext::new(&state, &session, &aux).with_initial(initial.as_ref());
            lifecycle.resolve(&ctx)?
        };

        info!(session = %session_id, steps = active.len(), "wizard mounted");
        Ok(Self {
            flow: Flow::new(active.ids()),
            lifecycle,
            session,
            initial,
            state,
            aux,
            active,
            phase: Phase::Idle,
            validation: ValidationState::default(),
            fetches: FetchRegistry::new(session_id),
            last_submit_error: None,
        })
    }

    // -----------------------------------------------------------------------
    // Accessors
    // -----------------------------------------------------------------------

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn session_id(&self) -> SessionId {
        self.fetches.session()
    }

    pub fn lifecycle(&self) -> &L {
        &self.lifecycle
    }

    /// Current form state. Empty once the wizard is submitted or cancelled.
    pub fn snapshot(&self) -> &FormState {
        &self.state
    }

    pub fn aux(&self) -> &AuxData {
        &self.aux
    }

    pub fn validation(&self) -> &ValidationState {
        &self.validation
    }

    pub fn active_steps(&self) -> &ActiveSteps {
        &self.active
    }

    pub fn step_ids(&self) -> &[StepId] {
        self.flow.steps()
    }

    pub fn step_status(&self, index: usize) -> StepStatus {
        self.flow.status_at(index)
    }

    pub fn current_step(&self) -> Option<&StepDefinition> {
        match self.phase {
            Phase::StepActive(index) => self.active.steps().get(index),
            _ => None,
        }
    }

    pub fn last_submit_error(&self) -> Option<&ApiError> {
        self.last_submit_error.as_ref()
    }

    /// True while a fetch the current step needs is outstanding.
    pub fn is_loading(&self) -> bool {
        self.current_step()
            .is_some_and(|step| self.step_loading(step))
    }

    /// A key never requested counts as loading; only a settled result
    /// (ready or failed) lets the step through.
    fn step_loading(&self, step: &StepDefinition) -> bool {
        step.fetches().iter().any(|key| {
            !matches!(
                self.aux.get(key),
                Some(FetchStatus::Ready(_) | FetchStatus::Failed(_))
            )
        })
    }

    fn context(&self) -> FormContext<'_> {
        FormContext::new(&self.state, &self.session, &self.aux).with_initial(self.initial.as_ref())
    }

    fn active_index(&self) -> Result<usize, WizardError> {
        match self.phase {
            Phase::StepActive(index) => Ok(index),
            _ => Err(WizardError::NotActive),
        }
    }

    // -----------------------------------------------------------------------
    // Navigation
    // -----------------------------------------------------------------------

    pub fn start(&mut self) -> Result<(), WizardError> {
        if self.phase != Phase::Idle || self.flow.is_empty() {
            return Err(WizardError::NotActive);
        }
        self.flow = Flow::new(self.active.ids());
        self.phase = Phase::StepActive(0);
        debug!(session = %self.session_id(), step = ?self.flow.current_id(), "wizard started");
        self.request_fetches();
        Ok(())
    }

    /// Advances when the current step's own fields validate.
    pub fn next(&mut self) -> Result<(), WizardError> {
        let index = self.active_index()?;
        let step_id = self.flow.current_id().cloned().ok_or(WizardError::NotActive)?;
        if self.is_loading() {
            return Err(WizardError::Loading(step_id));
        }
        self.check_step(index)?;
        if !self.flow.has_next() {
            return Err(WizardError::AtLastStep);
        }

        self.flow.advance();
        self.phase = Phase::StepActive(self.flow.current_index());
        debug!(
            session = %self.session_id(),
            from = %step_id,
            to = ?self.flow.current_id(),
            "step advanced"
        );
        Ok(())
    }

    /// Goes one step back without validating anything.
    pub fn back(&mut self) -> Result<(), WizardError> {
        self.active_index()?;
        if !self.flow.retreat() {
            return Err(WizardError::AtFirstStep);
        }
        self.phase = Phase::StepActive(self.flow.current_index());
        debug!(session = %self.session_id(), to = ?self.flow.current_id(), "step back");
        Ok(())
    }

    /// Jumps to `step`. Jumping forward validates every step it skips and
    /// waits for their fetches.
    pub fn go_to(&mut self, step: &str) -> Result<(), WizardError> {
        let index = self.active_index()?;
        let target = self
            .active
            .position(step)
            .ok_or_else(|| WizardError::UnknownStep(StepId::from(step)))?;
        if target == index {
            return Ok(());
        }
        for skipped in index..target {
            if let Some((definition, _)) = self.active.get(skipped)
                && self.step_loading(definition)
            {
                return Err(WizardError::Loading(definition.id.clone()));
            }
            self.check_step(skipped)?;
        }

        self.flow.jump_to(target);
        self.phase = Phase::StepActive(target);
        debug!(session = %self.session_id(), to = step, "step jump");
        Ok(())
    }

    fn check_step(&mut self, index: usize) -> Result<(), WizardError> {
        let Some((step, _)) = self.active.get(index) else {
            return Ok(());
        };
        let step_id = step.id.clone();
        let issues = self.step_issues(index);
        self.validation.apply_issues(&step_id, &issues, true);
        if issues.is_empty() {
            return Ok(());
        }
        debug!(step = %step_id, issues = issues.len(), "step invalid");
        Err(WizardError::StepInvalid {
            step: step_id,
            issues,
        })
    }

    fn step_issues(&self, index: usize) -> Vec<FieldIssue> {
        let Some((step, schema)) = self.active.get(index) else {
            return Vec::new();
        };
        schema.validate(&self.context().scope(&step.id))
    }

    // -----------------------------------------------------------------------
    // Values
    // -----------------------------------------------------------------------

    /// Writes one value. A change to a field the step list depends on
    /// recomputes the list before returning. `step` must be active or
    /// already hold a namespace.
    pub fn set_value(
        &mut self,
        step: &str,
        path: impl Into<ValuePath>,
        value: impl Into<Value>,
    ) -> Result<(), WizardError> {
        self.active_index()?;
        if self.active.position(step).is_none() && !self.state.contains(step) {
            return Err(WizardError::UnknownStep(StepId::from(step)));
        }
        let path = path.into();
        let mut state = self.state.clone();
        state.set(step, &path, value.into());

        let recompute = self.needs_recompute(step, &path);
        let active = if recompute {
            let ctx = FormContext::new(&state, &self.session, &self.aux)
                .with_initial(self.initial.as_ref());
            Some(self.lifecycle.resolve(&ctx)?)
        } else {
            None
        };

        self.state = state;
        let step_id = StepId::from(step);
        self.validation.clear_error(&FieldRef::in_step(step, &path));
        if let Some(schema) = self.active.schema().step(step) {
            for affected in schema.affected_by(&path) {
                self.validation
                    .clear_error(&FieldRef::in_step(&step_id, affected));
            }
        }
        self.validation.set_step_errors(&step_id, Vec::new());

        if let Some(active) = active {
            self.apply_active(active);
        }
        Ok(())
    }

    fn needs_recompute(&self, step: &str, path: &ValuePath) -> bool {
        let declared = self.lifecycle.depends_on().iter().any(|field| {
            field.step.as_ref().is_some_and(|owner| owner.as_str() == step)
                && field.path.overlaps(path)
        });
        declared
            || self
                .active
                .steps()
                .iter()
                .any(|step| step.resolver().is_dynamic())
    }

    fn apply_active(&mut self, active: ActiveSteps) {
        let ids = active.ids();
        let before = self.flow.steps().to_vec();
        self.active = active;
        let moved = self.flow.replace(ids.clone());
        self.validation.retain_steps(&ids);

        if before != ids {
            debug!(session = %self.session_id(), steps = ?ids, "active steps recomputed");
        }
        if let Phase::StepActive(_) = self.phase {
            if self.flow.is_empty() {
                self.phase = Phase::Idle;
                return;
            }
            self.phase = Phase::StepActive(self.flow.current_index());
            if moved {
                debug!(session = %self.session_id(), step = ?self.flow.current_id(), "current step moved");
            }
            self.request_fetches();
        }
    }

    /// Re-resolves the step list after aux data changed, for steps whose
    /// schema reads it.
    fn refresh_active(&mut self) {
        if !self.active.steps().iter().any(|step| step.resolver().is_dynamic()) {
            return;
        }
        match self.lifecycle.resolve(&self.context()) {
            Ok(active) => self.apply_active(active),
            Err(err) => warn!(session = %self.session_id(), error = %err, "step list refresh failed"),
        }
    }

    // -----------------------------------------------------------------------
    // Auxiliary fetches
    // -----------------------------------------------------------------------

    /// Requests every fetch of the active steps that was never issued, so
    /// steps ahead of the current one load before they are reached.
    fn request_fetches(&mut self) {
        let keys = self
            .active
            .steps()
            .iter()
            .flat_map(|step| step.fetches())
            .cloned()
            .collect::<Vec<_>>();
        for key in keys {
            if self.aux.get(key.as_str()).is_some() {
                continue;
            }
            self.aux.set(key.as_str(), FetchStatus::Pending);
            let ticket = self.fetches.issue(key.as_str());
            debug!(session = %ticket.session, key = %ticket.key, seq = ticket.seq, "fetch requested");
        }
    }

    /// Requests the caller still has to perform.
    pub fn pending_fetches(&self) -> &[FetchTicket] {
        self.fetches.queued()
    }

    pub fn take_pending_fetches(&mut self) -> Vec<FetchTicket> {
        self.fetches.take_queued()
    }

    /// Applies a fetch result. Results for another mount, for a superseded
    /// ticket or after the wizard finished are dropped.
    pub fn complete_fetch(&mut self, ticket: &FetchTicket, result: Result<Value, ApiError>) -> bool {
        if self.phase.is_finished() || !self.fetches.accept(ticket) {
            warn!(
                session = %self.session_id(),
                ticket_session = %ticket.session,
                key = %ticket.key,
                seq = ticket.seq,
                "dropping stale fetch result"
            );
            return false;
        }

        let status = match result {
            Ok(value) => FetchStatus::Ready(value),
            Err(err) => {
                warn!(key = %ticket.key, error = %err, "fetch failed");
                FetchStatus::Failed(err.message().to_string())
            }
        };
        self.aux.set(ticket.key.as_str(), status);
        self.refresh_active();
        true
    }

    /// Same as [`Stepper::complete_fetch`] for callers holding a query
    /// result. A query still in flight leaves the ticket outstanding.
    pub fn complete_query(&mut self, ticket: &FetchTicket, query: QueryState<Value>) -> bool {
        match query.into_result() {
            Some(result) => self.complete_fetch(ticket, result),
            None => false,
        }
    }

    /// Issues a fresh ticket for `key`, typically after a failure.
    pub fn retry_fetch(&mut self, key: &str) -> Result<FetchTicket, WizardError> {
        if self.phase.is_finished() {
            return Err(WizardError::NotActive);
        }
        self.aux.set(key, FetchStatus::Pending);
        let ticket = self.fetches.issue(key);
        debug!(session = %ticket.session, key, seq = ticket.seq, "fetch retried");
        Ok(ticket)
    }

    // -----------------------------------------------------------------------
    // Submission
    // -----------------------------------------------------------------------

    /// Validates every active step and moves to `Submitting`, returning the
    /// payload to send. Nothing changes on refusal.
    pub fn begin_submit(&mut self) -> Result<Value, WizardError> {
        let index = self.active_index()?;
        if !self.flow.is_last() {
            return Err(WizardError::NotOnLastStep);
        }
        if let Some(loading) = self
            .active
            .steps()
            .iter()
            .find(|step| self.step_loading(step))
        {
            return Err(WizardError::Loading(loading.id.clone()));
        }

        let mut issues = Vec::new();
        for position in 0..self.active.len() {
            let step_issues = self.step_issues(position);
            if let Some((step, _)) = self.active.get(position) {
                self.validation.apply_issues(&step.id, &step_issues, true);
            }
            issues.extend(step_issues);
        }
        if !issues.is_empty() {
            info!(session = %self.session_id(), issues = issues.len(), "submit refused");
            return Err(WizardError::FormInvalid { issues });
        }

        let payload =
            self.lifecycle
                .transform_before_submit(&self.state, self.initial.as_ref(), &self.context())?;
        self.phase = Phase::Submitting;
        info!(session = %self.session_id(), step = index, "submitting");
        Ok(payload)
    }

    /// Records the API outcome. Success discards the form state; a
    /// rejection keeps it and returns to the last step.
    pub fn finish_submit(&mut self, result: Result<Value, ApiError>) -> Result<Value, WizardError> {
        if self.phase != Phase::Submitting {
            return Err(WizardError::NotActive);
        }
        match result {
            Ok(response) => {
                info!(session = %self.session_id(), "submitted");
                self.phase = Phase::Submitted;
                self.last_submit_error = None;
                self.discard();
                Ok(response)
            }
            Err(err) => {
                warn!(session = %self.session_id(), error = %err, "submission rejected");
                self.phase = Phase::StepActive(self.flow.current_index());
                self.last_submit_error = Some(err.clone());
                Err(WizardError::Submission(err))
            }
        }
    }

    pub fn submit(&mut self, client: &mut impl ResourceClient) -> Result<Value, WizardError> {
        let payload = self.begin_submit()?;
        let result = client.submit(&payload);
        self.finish_submit(result)
    }

    /// Abandons the wizard. Nothing is sent anywhere.
    pub fn cancel(&mut self) {
        info!(session = %self.session_id(), phase = ?self.phase, "wizard cancelled");
        self.phase = Phase::Cancelled;
        self.discard();
    }

    fn discard(&mut self) {
        self.state = FormState::new();
        self.aux.clear();
        self.fetches.clear();
        self.validation.clear();
    }

    // -----------------------------------------------------------------------
    // View
    // -----------------------------------------------------------------------

    pub fn view(&self) -> Option<StepView> {
        let Phase::StepActive(index) = self.phase else {
            return None;
        };
        let (step, schema) = self.active.get(index)?;
        let ctx = self.context();
        let props = StepProps {
            step,
            schema,
            scope: ctx.scope(&step.id),
            validation: &self.validation,
            position: index,
            total: self.active.len(),
            loading: self.step_loading(step),
        };
        Some(step.render(&props))
    }
}
