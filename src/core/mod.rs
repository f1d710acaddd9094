//! Core kbox library API surface.

pub mod diagnostics;
pub mod events;
pub mod options;
pub mod outcome;
pub mod reporter;

pub mod assembly;
pub mod batch;
pub mod component;
pub mod discovery;
pub mod engine;
pub mod hooks;
pub mod identity;
pub mod operations;
pub mod plugins;
pub mod project;
pub mod registry;
pub mod services;

pub use assembly::{App, AppComponent, assemble};
pub use component::Component;
pub use diagnostics::{Diagnostic, Severity};
pub use discovery::{Discovery, FileDiscovery};
pub use engine::{BuildRequest, ContainerHandle, DockerEngine, Engine};
pub use events::{Event, Phase};
pub use hooks::{Hook, HookBus, HookPayload, HookResult};
pub use operations::{LifecycleContext, install, rebuild, restart, start, stop, uninstall};
pub use options::{AppSelector, InstallOptions, StartOptions, StopOptions, UninstallOptions};
pub use outcome::{
    ComponentOutcome, OperationOutput, OperationResult, PhaseOutcome, RebuildOutcome,
    RestartOutcome,
};
pub use plugins::{PluginLoader, PluginRegistry, load_plugins};
pub use project::{AppLoad, ConfigLoader, TomlConfigLoader, load_app};
pub use registry::AppRegistry;
pub use reporter::Reporter;
pub use services::{AlwaysReady, EngineReadiness, ServiceReadiness};
