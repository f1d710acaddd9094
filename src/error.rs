use std::path::PathBuf;

use thiserror::Error;

use crate::core::Phase;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Failed to create directory {path}: {source}")]
    CreateDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to read configuration file at {path}: {source}")]
    ReadConfig {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Configuration at {path} could not be parsed: {source}")]
    ParseConfig {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("Configuration at {path} is invalid:\n{message}")]
    InvalidConfig { path: PathBuf, message: String },
    #[error("Configuration file {path} does not exist.")]
    ExplicitConfigMissing { path: PathBuf },
    #[error(
        "No kbox.toml found while searching upward from {search_root}. \
         Run from inside an app directory or pass --app NAME."
    )]
    ConfigDiscoveryFailed { search_root: PathBuf },
    #[error("Failed to determine the current working directory: {source}")]
    WorkingDirectoryUnavailable {
        #[source]
        source: std::io::Error,
    },
    #[error("Unable to determine a home directory; set KBOX_HOME or HOME.")]
    HomeUnavailable,
    #[error("Component `{component}` collides with the container name of `{other}` in app `{app}`.")]
    NameCollision {
        app: String,
        component: String,
        other: String,
    },
    #[error("Container services are not ready: {message}")]
    ServicesUnavailable { message: String },
    #[error("Hook `{event}` vetoed the operation: {message}")]
    HookVeto { event: String, message: String },
    #[error("Engine failed to {action} for `{target}`: {message}")]
    Engine {
        action: &'static str,
        target: String,
        message: String,
    },
    #[error("Container engine at {endpoint} is unreachable: {message}")]
    EngineUnavailable { endpoint: String, message: String },
    #[error("App `{app}` has no component named `{component}`.")]
    UnknownComponent { app: String, component: String },
    #[error("Container {container_id} no longer exists in the engine.")]
    ContainerNotFound { container_id: String },
    #[error("Component `{component}` has no recorded container; run `kbox install` first.")]
    ComponentNotInstalled { component: String },
    #[error("Failed to read container identity at {path}: {source}")]
    IdentityRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to record container identity at {path}: {source}")]
    IdentityWrite {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("{phase} failed for component `{component}`: {source}")]
    ComponentFailed {
        phase: Phase,
        component: String,
        #[source]
        source: Box<Error>,
    },
    #[error(
        "{phase} failed for {} component(s):\n{}",
        .failures.len(),
        format_failures(.failures)
    )]
    ComponentFailures { phase: Phase, failures: Vec<Error> },
    #[error("Failed to read app registry at {path}: {message}")]
    RegistryRead { path: PathBuf, message: String },
    #[error("Failed to write app registry at {path}: {message}")]
    RegistryWrite { path: PathBuf, message: String },
    #[error("No registered app directory for `{name}`.")]
    UnknownAppDir { name: String },
    #[error(
        "App name `{name}` is declared by more than one directory: {}",
        format_dirs(.dirs)
    )]
    DuplicateApp { name: String, dirs: Vec<PathBuf> },
    #[error("No app named `{name}` is registered.")]
    AppNotFound { name: String },
    #[error("Plugin `{plugin}` is not available.")]
    UnknownPlugin { plugin: String },
    #[error("Plugin `{plugin}` failed to load: {message}")]
    PluginLoad { plugin: String, message: String },
}

impl Error {
    /// Name of the component a failure is attributed to, when it has one.
    pub fn component(&self) -> Option<&str> {
        match self {
            Error::ComponentFailed { component, .. } => Some(component),
            Error::ComponentNotInstalled { component } => Some(component),
            _ => None,
        }
    }
}

fn format_failures(failures: &[Error]) -> String {
    failures
        .iter()
        .map(|failure| format!("  • {failure}"))
        .collect::<Vec<_>>()
        .join("\n")
}

fn format_dirs(dirs: &[PathBuf]) -> String {
    dirs.iter()
        .map(|dir| dir.display().to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn aggregate_failure_lists_every_component() {
        let err = Error::ComponentFailures {
            phase: Phase::Start,
            failures: vec![
                Error::ComponentNotInstalled {
                    component: "web".into(),
                },
                Error::ComponentNotInstalled {
                    component: "db".into(),
                },
            ],
        };
        let text = err.to_string();
        assert!(text.starts_with("start failed for 2 component(s)"));
        assert!(text.contains("`web`"));
        assert!(text.contains("`db`"));
    }

    #[test]
    fn component_attribution_is_exposed() {
        let err = Error::ComponentFailed {
            phase: Phase::Install,
            component: "web".into(),
            source: Box::new(Error::ServicesUnavailable {
                message: "down".into(),
            }),
        };
        assert_eq!(err.component(), Some("web"));
        assert_eq!(Error::HomeUnavailable.component(), None);
    }
}
