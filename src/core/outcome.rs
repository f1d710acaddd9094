use super::diagnostics::Diagnostic;
use super::events::{Event, Phase};

/// Result wrapper returned by high-level operations.
pub type OperationResult<T> = crate::error::Result<OperationOutput<T>>;

/// Envelope for successful operation outcomes.
#[derive(Debug)]
pub struct OperationOutput<T> {
    /// Operation-specific result.
    pub value: T,
    /// Diagnostics collected while performing the operation.
    pub diagnostics: Vec<Diagnostic>,
    /// Structured events captured during the run.
    pub events: Vec<Event>,
}

impl<T> OperationOutput<T> {
    /// Wrap `value` with no diagnostics or events.
    pub fn new(value: T) -> Self {
        Self {
            value,
            diagnostics: Vec::new(),
            events: Vec::new(),
        }
    }

    pub fn with_diagnostics(mut self, diagnostics: Vec<Diagnostic>) -> Self {
        self.diagnostics = diagnostics;
        self
    }

    pub fn with_events(mut self, events: Vec<Event>) -> Self {
        self.events = events;
        self
    }
}

/// Outcome of one primitive phase over an app.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PhaseOutcome {
    /// Name of the app the phase ran for.
    pub app: String,
    /// Phase that ran.
    pub phase: Phase,
    /// Per-component results in completion order.
    pub components: Vec<ComponentOutcome>,
}

impl PhaseOutcome {
    /// Outcome of the component called `name`.
    pub fn component(&self, name: &str) -> Option<&ComponentOutcome> {
        self.components.iter().find(|outcome| outcome.name == name)
    }

    /// Number of components the phase actually acted on.
    pub fn changed(&self) -> usize {
        self.components.iter().filter(|outcome| outcome.changed).count()
    }
}

/// Result of one component within a phase.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComponentOutcome {
    /// Component name.
    pub name: String,
    /// Container the phase acted on, when there was one.
    pub container_id: Option<String>,
    /// `false` when the component had no container to act on.
    pub changed: bool,
}

/// Outcome of `restart`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RestartOutcome {
    pub stop: PhaseOutcome,
    pub start: PhaseOutcome,
}

/// Outcome of `rebuild`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RebuildOutcome {
    pub stop: PhaseOutcome,
    pub uninstall: PhaseOutcome,
    pub install: PhaseOutcome,
}
