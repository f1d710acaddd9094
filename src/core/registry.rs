//! Every app known to discovery, rebuilt from disk on each call.

use std::collections::BTreeMap;

use tracing::debug;

use crate::error::{Error, Result};

use super::assembly::{App, assemble};
use super::batch;
use super::discovery::Discovery;
use super::project::ConfigLoader;

/// Registered apps resolved through discovery and a config loader.
pub struct AppRegistry<'a> {
    discovery: &'a dyn Discovery,
    configs: &'a dyn ConfigLoader,
}

impl<'a> AppRegistry<'a> {
    /// Registry over `discovery`, loading each app through `configs`.
    pub fn new(discovery: &'a dyn Discovery, configs: &'a dyn ConfigLoader) -> Self {
        Self { discovery, configs }
    }

    /// Assemble every registered app, sorted by name.
    ///
    /// Fails as a whole when two directories resolve to the same app name.
    pub fn list(&self) -> Result<Vec<App>> {
        let keys = self.discovery.list()?;
        debug!("assembling {} registered app(s)", keys.len());

        let report = batch::for_each_component(&keys, &mut (), |key, _| {
            let dir = self.discovery.app_dir(key)?;
            let config = self.configs.app_config(key, &dir)?;
            assemble(config)
        });
        if let Some(err) = report.failures.into_iter().next() {
            return Err(err);
        }

        let mut by_name: BTreeMap<String, Vec<App>> = BTreeMap::new();
        for app in report.completed {
            by_name.entry(app.name.clone()).or_default().push(app);
        }

        let mut apps = Vec::with_capacity(by_name.len());
        for (name, mut group) in by_name {
            if group.len() > 1 {
                let mut dirs: Vec<_> = group.into_iter().map(|app| app.app_root).collect();
                dirs.sort();
                return Err(Error::DuplicateApp { name, dirs });
            }
            apps.append(&mut group);
        }
        Ok(apps)
    }

    /// The app called `name`; fails with `AppNotFound` when none matches.
    pub fn get(&self, name: &str) -> Result<App> {
        self.list()?
            .into_iter()
            .find(|app| app.name == name)
            .ok_or_else(|| Error::AppNotFound {
                name: name.to_string(),
            })
    }
}
