use std::path::{Path, PathBuf};

use crate::config::{GlobalConfig, OptionMap, resolve_home};
use crate::core::diagnostics::{Diagnostic, Severity};
use crate::core::discovery::FileDiscovery;
use crate::core::engine::DockerEngine;
use crate::core::hooks::HookBus;
use crate::core::operations::LifecycleContext;
use crate::core::options::AppSelector;
use crate::core::plugins::{PluginRegistry, load_plugins};
use crate::core::project::{AppLoad, TomlConfigLoader, format_config_warnings, load_app};
use crate::core::services::EngineReadiness;
use crate::Result;

/// Which app a command targets, from the global `--config`/`--app` flags.
#[derive(Debug, Clone, Default)]
pub struct Target {
    pub config: Option<PathBuf>,
    pub app: Option<String>,
}

impl Target {
    pub fn selector(&self) -> AppSelector {
        match &self.app {
            Some(name) => AppSelector::Named(name.clone()),
            None => AppSelector::Discover { search_root: None },
        }
    }
}

/// Process-wide collaborators, built once per invocation.
pub struct Session {
    pub global: GlobalConfig,
    pub loader: TomlConfigLoader,
    pub discovery: FileDiscovery,
    pub engine: DockerEngine,
    pub readiness: EngineReadiness,
    pub hooks: HookBus,
}

impl Session {
    pub fn open() -> Result<Self> {
        let home = resolve_home()?;
        let global = GlobalConfig::load(&home)?;
        let engine = DockerEngine::from_config(&global);
        Ok(Self {
            loader: TomlConfigLoader::new(global.clone()),
            discovery: FileDiscovery::in_home(&home),
            readiness: EngineReadiness::new(engine.clone()),
            engine,
            hooks: HookBus::new(),
            global,
        })
    }

    /// Load the targeted app and let its plugins subscribe before anything runs.
    pub fn load(&mut self, target: &Target) -> Result<AppLoad> {
        let load = load_app(
            &target.selector(),
            target.config.as_deref(),
            &self.loader,
            &self.discovery,
        )?;
        load_plugins(
            &PluginRegistry::with_builtins(),
            &load.app.config.plugins,
            &mut self.hooks,
        )?;
        Ok(load)
    }

    pub fn context(&self) -> LifecycleContext<'_> {
        LifecycleContext::new(&self.engine, &self.readiness, &self.discovery, &self.hooks)
    }

    pub fn global_diagnostics(&self) -> Vec<Diagnostic> {
        let path = crate::config::kbox_root(&self.global.home).join("config.toml");
        self.global
            .warnings
            .iter()
            .map(|warning| Diagnostic::new(Severity::Warning, warning).with_path(path.clone()))
            .collect()
    }
}

pub fn overrides(pairs: &[(String, serde_json::Value)]) -> OptionMap {
    pairs.iter().cloned().collect()
}

pub fn split_config_warnings(diagnostics: &[Diagnostic]) -> (Vec<Diagnostic>, Vec<Diagnostic>) {
    let mut config = Vec::new();
    let mut rest = Vec::new();
    for diagnostic in diagnostics {
        let from_config = diagnostic
            .path
            .as_deref()
            .and_then(Path::extension)
            .is_some_and(|ext| ext == "toml");
        if matches!(diagnostic.severity, Severity::Warning) && from_config {
            config.push(diagnostic.clone());
        } else {
            rest.push(diagnostic.clone());
        }
    }
    (config, rest)
}

/// Print configuration warnings as one block, then everything else line by line.
pub fn report_diagnostics(diagnostics: &[Diagnostic]) {
    let (config_warnings, other) = split_config_warnings(diagnostics);
    if let Some(message) = format_config_warnings(&config_warnings) {
        eprint!("{message}");
    }
    emit_diagnostics(&other);
}

pub fn emit_diagnostics(diagnostics: &[Diagnostic]) {
    for diagnostic in diagnostics {
        match diagnostic.severity {
            Severity::Warning => {
                eprintln!("Warning: {}", diagnostic.message);
                if let Some(help) = &diagnostic.help {
                    eprintln!("         {help}");
                }
            }
            Severity::Info => {
                println!("{}", diagnostic.message);
                if let Some(help) = &diagnostic.help {
                    println!("{help}");
                }
            }
            Severity::Error => {
                eprintln!("Error: {}", diagnostic.message);
                if let Some(help) = &diagnostic.help {
                    eprintln!("       {help}");
                }
            }
        }
    }
}
