use crate::error::{Error, Result};

use super::engine::DockerEngine;

/// Confirms the background services a transition depends on are reachable.
pub trait ServiceReadiness: Send + Sync {
    /// `Err(ServicesUnavailable)` when a dependency cannot be reached.
    fn verify(&self) -> Result<()>;
}

/// Readiness backed by the engine's ping endpoint.
#[derive(Debug, Clone)]
pub struct EngineReadiness {
    engine: DockerEngine,
}

impl EngineReadiness {
    /// Readiness that pings `engine`.
    pub fn new(engine: DockerEngine) -> Self {
        Self { engine }
    }
}

impl ServiceReadiness for EngineReadiness {
    fn verify(&self) -> Result<()> {
        self.engine.ping().map_err(|err| Error::ServicesUnavailable {
            message: err.to_string(),
        })
    }
}

/// Readiness that always passes, for callers that manage services themselves.
#[derive(Debug, Clone, Copy, Default)]
pub struct AlwaysReady;

impl ServiceReadiness for AlwaysReady {
    fn verify(&self) -> Result<()> {
        Ok(())
    }
}
