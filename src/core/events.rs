use std::fmt;
use std::path::PathBuf;

use super::diagnostics::Severity;

/// Primitive lifecycle phase. Restart and rebuild are compositions of these.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    Install,
    Start,
    Stop,
    Uninstall,
}

impl Phase {
    /// Lowercase name used in hook identifiers and messages.
    pub fn as_str(self) -> &'static str {
        match self {
            Phase::Install => "install",
            Phase::Start => "start",
            Phase::Stop => "stop",
            Phase::Uninstall => "uninstall",
        }
    }

    /// Whether per-component failures are collected (`true`) or reduced to the first one.
    pub fn aggregates_failures(self) -> bool {
        matches!(self, Phase::Start | Phase::Stop)
    }

    /// App-level hook fired before any component is touched.
    pub fn pre(self) -> String {
        format!("pre-{}", self.as_str())
    }

    /// App-level hook fired after every component succeeded.
    pub fn post(self) -> String {
        format!("post-{}", self.as_str())
    }

    /// Per-component hook fired before the engine call.
    pub fn pre_component(self) -> String {
        format!("pre-{}-component", self.as_str())
    }

    /// Per-component hook fired after the engine call succeeded.
    pub fn post_component(self) -> String {
        format!("post-{}-component", self.as_str())
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Structured event emitted while a lifecycle operation runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    /// A textual progress update with a severity level.
    Message { severity: Severity, text: String },
    /// A phase began for an app, after the readiness check passed.
    PhaseStarted { app: String, phase: Phase },
    /// A hook event was dispatched to its subscribers.
    HookDispatched {
        event: String,
        /// Component the hook fired for; `None` for app-level hooks.
        component: Option<String>,
        subscribers: usize,
    },
    /// The app directory was recorded with discovery during install.
    AppRegistered { app: String, dir: PathBuf },
    ImageBuilt { component: String, image: String },
    ContainerCreated {
        component: String,
        container_id: String,
    },
    /// The container identifier was persisted for later recovery.
    IdentityRecorded { component: String, path: PathBuf },
    ContainerStarted {
        component: String,
        container_id: String,
    },
    ContainerStopped {
        component: String,
        container_id: String,
    },
    ContainerRemoved {
        component: String,
        container_id: String,
    },
    /// The identity record was deleted; `existed` is false when there was nothing on disk.
    IdentityCleared {
        component: String,
        path: PathBuf,
        existed: bool,
    },
    /// A stop or uninstall skipped a component that never had a container.
    ComponentSkipped { component: String, phase: Phase },
    /// The phase finished; `failures` counts the components that did not complete.
    PhaseCompleted {
        app: String,
        phase: Phase,
        failures: usize,
    },
}
