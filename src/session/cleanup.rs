// ABOUTME: Per-step record of a session teardown.
// ABOUTME: Failed steps are logged as they are recorded and never abort the teardown.

use std::fmt;

use crate::types::SessionId;

/// Teardown steps, in the order they run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TeardownStep {
    ProxyRoute,
    Container,
    Image,
    Branch,
    Record,
}

impl fmt::Display for TeardownStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TeardownStep::ProxyRoute => "proxy route",
            TeardownStep::Container => "container",
            TeardownStep::Image => "image",
            TeardownStep::Branch => "branch",
            TeardownStep::Record => "record",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TeardownOutcome {
    Done,
    /// Nothing to do: the resource never existed, is already gone, or must survive.
    Skipped,
    Failed(String),
}

/// What `cleanup_session` did for each resource.
#[derive(Debug, Clone)]
pub struct CleanupReport {
    session_id: SessionId,
    steps: Vec<(TeardownStep, TeardownOutcome)>,
}

impl CleanupReport {
    pub fn new(session_id: SessionId) -> Self {
        Self {
            session_id,
            steps: Vec::with_capacity(5),
        }
    }

    pub fn session_id(&self) -> SessionId {
        self.session_id
    }

    /// Record a step's outcome, logging failures as warnings.
    pub fn record(&mut self, step: TeardownStep, outcome: TeardownOutcome) {
        if let TeardownOutcome::Failed(message) = &outcome {
            tracing::warn!(session = %self.session_id, %step, error = %message, "teardown step failed");
        }
        self.steps.push((step, outcome));
    }

    pub fn steps(&self) -> &[(TeardownStep, TeardownOutcome)] {
        &self.steps
    }

    pub fn outcome(&self, step: TeardownStep) -> Option<&TeardownOutcome> {
        self.steps
            .iter()
            .find(|(s, _)| *s == step)
            .map(|(_, outcome)| outcome)
    }

    /// Whether no step failed.
    pub fn is_clean(&self) -> bool {
        self.failures().next().is_none()
    }

    pub fn failures(&self) -> impl Iterator<Item = (TeardownStep, &str)> {
        self.steps.iter().filter_map(|(step, outcome)| match outcome {
            TeardownOutcome::Failed(message) => Some((*step, message.as_str())),
            _ => None,
        })
    }
}
