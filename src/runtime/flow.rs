use crate::core::StepId;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepStatus {
    Pending,
    Active,
    Done,
}

/// Position within the active step list. The list itself is recomputed by
/// the lifecycle; the flow only tracks ids.
#[derive(Debug, Clone, Default)]
pub struct Flow {
    steps: Vec<StepId>,
    current: usize,
    statuses: Vec<StepStatus>,
}

impl Flow {
    pub fn new(steps: Vec<StepId>) -> Self {
        let mut statuses = vec![StepStatus::Pending; steps.len()];
        if !statuses.is_empty() {
            statuses[0] = StepStatus::Active;
        }
        Self {
            steps,
            current: 0,
            statuses,
        }
    }

    pub fn current_index(&self) -> usize {
        self.current
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn steps(&self) -> &[StepId] {
        &self.steps
    }

    pub fn current_id(&self) -> Option<&StepId> {
        self.steps.get(self.current)
    }

    pub fn status_at(&self, index: usize) -> StepStatus {
        self.statuses
            .get(index)
            .copied()
            .unwrap_or(StepStatus::Pending)
    }

    pub fn has_next(&self) -> bool {
        self.current + 1 < self.steps.len()
    }

    pub fn is_last(&self) -> bool {
        !self.steps.is_empty() && self.current + 1 == self.steps.len()
    }

    pub fn advance(&mut self) -> bool {
        if !self.has_next() {
            return false;
        }
        self.jump_to(self.current + 1);
        true
    }

    pub fn retreat(&mut self) -> bool {
        if self.current == 0 {
            return false;
        }
        self.jump_to(self.current - 1);
        true
    }

    /// Moves to `index`. Steps left behind going forward count as done.
    pub fn jump_to(&mut self, index: usize) {
        if index >= self.steps.len() {
            return;
        }
        if index > self.current {
            for status in &mut self.statuses[self.current..index] {
                *status = StepStatus::Done;
            }
        } else if let Some(status) = self.statuses.get_mut(self.current) {
            *status = StepStatus::Pending;
        }
        self.current = index;
        self.statuses[index] = StepStatus::Active;
    }

    /// Swaps in a recomputed step list. The current step is found again by
    /// id; when it is gone the flow lands on the nearest earlier step that
    /// is still there. Returns whether the current step changed.
    pub fn replace(&mut self, steps: Vec<StepId>) -> bool {
        let previous = self.current_id().cloned();
        let current = match &previous {
            Some(id) => steps
                .iter()
                .position(|step| step == id)
                .or_else(|| {
                    self.steps[..self.current]
                        .iter()
                        .rev()
                        .find_map(|earlier| steps.iter().position(|step| step == earlier))
                })
                .unwrap_or(0),
            None => 0,
        };

        let statuses = steps
            .iter()
            .enumerate()
            .map(|(idx, id)| {
                if idx == current {
                    return StepStatus::Active;
                }
                match self.steps.iter().position(|old| old == id) {
                    Some(old) if self.statuses[old] != StepStatus::Active => self.statuses[old],
                    _ if idx < current => StepStatus::Done,
                    _ => StepStatus::Pending,
                }
            })
            .collect();

        self.steps = steps;
        self.statuses = statuses;
        self.current = current;
        self.current_id() != previous.as_ref()
    }
}
