use std::path::PathBuf;

use crate::config::OptionMap;

/// Where an operation finds the app it acts on.
#[derive(Debug, Clone)]
pub enum AppSelector {
    /// Search upward from the working directory (or `search_root`) for `kbox.toml`.
    Discover { search_root: Option<PathBuf> },
    /// Look the app up by name through the registry.
    Named(String),
}

/// Options for `install`.
#[derive(Debug, Clone, Default)]
pub struct InstallOptions {
    /// Components to act on; empty means every component.
    pub components: Vec<String>,
    /// Create options merged last, winning over computed and declared values.
    pub overrides: OptionMap,
}

/// Options for `start` and `restart`.
#[derive(Debug, Clone, Default)]
pub struct StartOptions {
    /// Components to act on; empty means every component.
    pub components: Vec<String>,
    /// Start options merged last, winning over computed and declared values.
    pub overrides: OptionMap,
}

/// Options for `stop`.
#[derive(Debug, Clone, Default)]
pub struct StopOptions {
    /// Components to act on; empty means every component.
    pub components: Vec<String>,
}

/// Options for `uninstall`.
#[derive(Debug, Clone, Default)]
pub struct UninstallOptions {
    /// Components to act on; empty means every component, the data component included.
    pub components: Vec<String>,
}

impl From<&InstallOptions> for StopOptions {
    fn from(options: &InstallOptions) -> Self {
        Self {
            components: options.components.clone(),
        }
    }
}

impl From<&InstallOptions> for UninstallOptions {
    fn from(options: &InstallOptions) -> Self {
        Self {
            components: options.components.clone(),
        }
    }
}

impl From<&StartOptions> for StopOptions {
    fn from(options: &StartOptions) -> Self {
        Self {
            components: options.components.clone(),
        }
    }
}
