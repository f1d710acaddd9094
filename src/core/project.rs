use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use crate::config::{APP_CONFIG_FILE, AppConfig, GlobalConfig, load_app_config};
use crate::error::{Error, Result};

use super::assembly::{App, assemble};
use super::diagnostics::{Diagnostic, Severity};
use super::discovery::Discovery;
use super::options::AppSelector;
use super::registry::AppRegistry;

/// Supplies the resolved configuration of an app living in `dir`.
pub trait ConfigLoader: Send + Sync {
    /// Load the config of the app registered as `app` at `dir`.
    fn app_config(&self, app: &str, dir: &Path) -> Result<AppConfig>;
}

/// Reads `<dir>/kbox.toml` on top of the machine-wide settings.
#[derive(Debug, Clone)]
pub struct TomlConfigLoader {
    global: GlobalConfig,
}

impl TomlConfigLoader {
    /// Loader layering app files over `global`.
    pub fn new(global: GlobalConfig) -> Self {
        Self { global }
    }

    /// Machine-wide settings in use.
    pub fn global(&self) -> &GlobalConfig {
        &self.global
    }

    /// Load the app config at `path`.
    pub fn load_file(&self, path: &Path) -> Result<AppConfig> {
        load_app_config(path, &self.global)
    }
}

impl ConfigLoader for TomlConfigLoader {
    fn app_config(&self, _app: &str, dir: &Path) -> Result<AppConfig> {
        self.load_file(&dir.join(APP_CONFIG_FILE))
    }
}

/// An assembled app plus the configuration warnings met on the way.
#[derive(Debug)]
pub struct AppLoad {
    /// The assembled app.
    pub app: App,
    /// Warnings from the app's configuration file.
    pub diagnostics: Vec<Diagnostic>,
}

/// Assemble the app `selector` points at.
pub fn load_app(
    selector: &AppSelector,
    explicit_config: Option<&Path>,
    loader: &TomlConfigLoader,
    discovery: &dyn Discovery,
) -> Result<AppLoad> {
    let config = match selector {
        AppSelector::Named(name) => {
            let registry = AppRegistry::new(discovery, loader);
            let app = registry.get(name)?;
            return Ok(AppLoad {
                diagnostics: config_diagnostics(&app.config),
                app,
            });
        }
        AppSelector::Discover { search_root } => {
            let path = resolve_config_path(explicit_config, search_root.as_deref())?;
            loader.load_file(&path)?
        }
    };

    let diagnostics = config_diagnostics(&config);
    Ok(AppLoad {
        app: assemble(config)?,
        diagnostics,
    })
}

/// Config warnings as diagnostics pointing at the file.
pub fn config_diagnostics(config: &AppConfig) -> Vec<Diagnostic> {
    config
        .warnings
        .iter()
        .map(|warning| {
            Diagnostic::new(Severity::Warning, warning).with_path(config.file_path.clone())
        })
        .collect()
}

/// Use `explicit` if given, else search upward from `search_root` (or the working directory)
/// for `kbox.toml`.
pub fn resolve_config_path(explicit: Option<&Path>, search_root: Option<&Path>) -> Result<PathBuf> {
    if let Some(path) = explicit {
        return if path.is_file() {
            Ok(path.to_path_buf())
        } else {
            Err(Error::ExplicitConfigMissing {
                path: path.to_path_buf(),
            })
        };
    }

    let cwd = match search_root {
        Some(root) => root.to_path_buf(),
        None => current_dir()?,
    };
    discover_config(&cwd).ok_or(Error::ConfigDiscoveryFailed { search_root: cwd })
}

fn current_dir() -> Result<PathBuf> {
    std::env::current_dir().map_err(|source| Error::WorkingDirectoryUnavailable { source })
}

fn discover_config(start: &Path) -> Option<PathBuf> {
    let mut cursor = Some(start.to_path_buf());
    while let Some(dir) = cursor {
        let candidate = dir.join(APP_CONFIG_FILE);
        if candidate.is_file() {
            return Some(candidate);
        }
        cursor = dir.parent().map(Path::to_path_buf);
    }
    None
}

/// Multi-line summary of the warnings in `warnings`, or `None` when there are none.
pub fn format_config_warnings(warnings: &[Diagnostic]) -> Option<String> {
    let relevant: Vec<&Diagnostic> = warnings
        .iter()
        .filter(|diag| matches!(diag.severity, Severity::Warning))
        .collect();
    if relevant.is_empty() {
        return None;
    }

    let count = relevant.len();
    let suffix = if count == 1 { "" } else { "s" };
    let mut buf = String::new();
    let _ = writeln!(
        buf,
        "Found {count} warning{suffix} while parsing configuration:"
    );
    for warning in &relevant {
        let _ = writeln!(buf, "  • {}", warning.message);
    }
    buf.push('\n');
    Some(buf)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn discovers_config_in_parent_directories() {
        let root = tempdir().unwrap();
        fs::write(root.path().join(APP_CONFIG_FILE), "").unwrap();
        let nested = root.path().join("code").join("modules");
        fs::create_dir_all(&nested).unwrap();

        let found = resolve_config_path(None, Some(&nested)).unwrap();
        assert_eq!(found, root.path().join(APP_CONFIG_FILE));
    }

    #[test]
    fn missing_config_reports_search_root() {
        let root = tempdir().unwrap();
        match resolve_config_path(None, Some(root.path())) {
            Err(Error::ConfigDiscoveryFailed { search_root }) => {
                assert_eq!(search_root, root.path());
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn explicit_path_must_exist() {
        let root = tempdir().unwrap();
        let path = root.path().join("elsewhere.toml");
        assert!(matches!(
            resolve_config_path(Some(&path), None),
            Err(Error::ExplicitConfigMissing { .. })
        ));
    }

    #[test]
    fn warnings_are_summarised() {
        let diagnostics = vec![
            Diagnostic::warning("Unknown field `x` at root; this value will be ignored."),
            Diagnostic::new(Severity::Info, "ignored"),
        ];
        let text = format_config_warnings(&diagnostics).unwrap();
        assert!(text.starts_with("Found 1 warning while parsing configuration:"));
        assert!(format_config_warnings(&[]).is_none());
    }
}
