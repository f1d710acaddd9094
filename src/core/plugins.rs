use std::collections::BTreeMap;

use serde_json::Value;
use tracing::info;

use crate::error::{Error, Result};

use super::events::Phase;
use super::hooks::{HookBus, HookPayload, HookResult};

/// Resolves a plugin identifier and lets it subscribe to the bus.
pub trait PluginLoader {
    /// Initialize `plugin` against `bus`; unknown identifiers are an error.
    fn require(&self, plugin: &str, bus: &mut HookBus) -> Result<()>;
}

type PluginInit = Box<dyn Fn(&mut HookBus) -> std::result::Result<(), String> + Send + Sync>;

/// Plugins known to this process, keyed by identifier.
pub struct PluginRegistry {
    plugins: BTreeMap<String, PluginInit>,
}

/// Identifier of the built-in labelling plugin.
pub const LABELS_PLUGIN: &str = "kbox-labels";
/// Container label carrying the app name.
pub const APP_LABEL: &str = "io.kbox.app";
/// Container label carrying the component name.
pub const COMPONENT_LABEL: &str = "io.kbox.component";

impl PluginRegistry {
    /// Registry with no plugins at all.
    pub fn empty() -> Self {
        Self {
            plugins: BTreeMap::new(),
        }
    }

    /// Registry preloaded with the plugins shipped in this crate.
    pub fn with_builtins() -> Self {
        let mut registry = Self::empty();
        registry.register(LABELS_PLUGIN, |bus: &mut HookBus| {
            bus.subscribe(Phase::Install.pre_component(), label_container);
            Ok(())
        });
        registry
    }

    /// Register `init` under `plugin`, replacing any earlier registration of that identifier.
    /// `init` runs when the plugin is required and may subscribe to any event.
    pub fn register<F>(&mut self, plugin: impl Into<String>, init: F)
    where
        F: Fn(&mut HookBus) -> std::result::Result<(), String> + Send + Sync + 'static,
    {
        self.plugins.insert(plugin.into(), Box::new(init));
    }

    /// Registered identifiers, sorted.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.plugins.keys().map(String::as_str)
    }
}

impl PluginLoader for PluginRegistry {
    fn require(&self, plugin: &str, bus: &mut HookBus) -> Result<()> {
        let init = self.plugins.get(plugin).ok_or_else(|| Error::UnknownPlugin {
            plugin: plugin.to_string(),
        })?;
        init(bus).map_err(|message| Error::PluginLoad {
            plugin: plugin.to_string(),
            message,
        })
    }
}

impl std::fmt::Debug for PluginRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.plugins.keys()).finish()
    }
}

/// Load `plugins` strictly in order; the first failure aborts the rest.
pub fn load_plugins(loader: &dyn PluginLoader, plugins: &[String], bus: &mut HookBus) -> Result<()> {
    for plugin in plugins {
        loader.require(plugin, bus)?;
        info!("loaded plugin {plugin}");
    }
    Ok(())
}

fn label_container(payload: &mut HookPayload<'_>) -> HookResult {
    let HookPayload::Component {
        app,
        component,
        options,
        ..
    } = payload
    else {
        return Ok(());
    };

    let labels = options
        .entry("Labels")
        .or_insert_with(|| Value::Object(Default::default()));
    let Value::Object(labels) = labels else {
        return Err(format!(
            "`Labels` for `{}` must be a table of strings",
            component.name
        ));
    };
    labels.insert(APP_LABEL.to_string(), Value::String(app.name.clone()));
    labels.insert(
        COMPONENT_LABEL.to_string(),
        Value::String(component.name.clone()),
    );
    Ok(())
}
