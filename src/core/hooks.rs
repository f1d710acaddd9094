//! Named interception points around every lifecycle phase.
//!
//! A [`HookBus`] is built once at process start, filled by plugins, and then passed by
//! reference into every orchestration call. Dispatch is synchronous: subscribers run in
//! registration order and the first failure vetoes the phase it wraps.

use std::collections::HashMap;

use tracing::debug;

use crate::config::OptionMap;
use crate::error::{Error, Result};

use super::assembly::App;
use super::component::Component;

/// Data handed to subscribers. Component hooks may edit `options` in place; the orchestrator
/// forwards the edited map to the engine.
#[derive(Debug)]
pub enum HookPayload<'a> {
    App(&'a App),
    Component {
        app: &'a App,
        component: &'a Component,
        options: &'a mut OptionMap,
        /// Set once the engine has produced a container.
        container_id: Option<&'a str>,
    },
}

impl HookPayload<'_> {
    /// App the hook fires for.
    pub fn app(&self) -> &App {
        match self {
            HookPayload::App(app) => app,
            HookPayload::Component { app, .. } => app,
        }
    }

    /// Component being operated on; `None` for app-level hooks.
    pub fn component(&self) -> Option<&Component> {
        match self {
            HookPayload::App(_) => None,
            HookPayload::Component { component, .. } => Some(component),
        }
    }

    /// Engine options the phase is about to send, when it sends any.
    pub fn options_mut(&mut self) -> Option<&mut OptionMap> {
        match self {
            HookPayload::App(_) => None,
            HookPayload::Component { options, .. } => Some(options),
        }
    }
}

/// What a subscriber returns; the `Err` message becomes the veto reason.
pub type HookResult = std::result::Result<(), String>;

/// A subscriber. Returning `Err` vetoes the enclosing phase with the given message.
pub trait Hook: Send + Sync {
    fn call(&self, payload: &mut HookPayload<'_>) -> HookResult;
}

impl<F> Hook for F
where
    F: Fn(&mut HookPayload<'_>) -> HookResult + Send + Sync,
{
    fn call(&self, payload: &mut HookPayload<'_>) -> HookResult {
        self(payload)
    }
}

/// Named lifecycle events and their ordered subscribers.
///
/// One bus is built per process, filled by plugin loading, and then lent to every operation
/// through [`LifecycleContext`](super::operations::LifecycleContext).
#[derive(Default)]
pub struct HookBus {
    subscribers: HashMap<String, Vec<Box<dyn Hook>>>,
}

impl HookBus {
    /// An empty bus with no subscribers.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `hook` to the subscribers of `event`.
    pub fn subscribe<H>(&mut self, event: impl Into<String>, hook: H)
    where
        H: Hook + 'static,
    {
        self.subscribers
            .entry(event.into())
            .or_default()
            .push(Box::new(hook));
    }

    /// Number of subscribers registered for `event`.
    pub fn subscriber_count(&self, event: &str) -> usize {
        self.subscribers.get(event).map_or(0, Vec::len)
    }

    /// Run every subscriber of `event` in order, stopping at the first failure.
    pub fn emit(&self, event: &str, payload: &mut HookPayload<'_>) -> Result<()> {
        let Some(hooks) = self.subscribers.get(event) else {
            return Ok(());
        };
        debug!("dispatching `{event}` to {} subscriber(s)", hooks.len());
        for hook in hooks {
            hook.call(payload).map_err(|message| Error::HookVeto {
                event: event.to_string(),
                message,
            })?;
        }
        Ok(())
    }
}

impl std::fmt::Debug for HookBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut counts: Vec<(&String, usize)> = self
            .subscribers
            .iter()
            .map(|(event, hooks)| (event, hooks.len()))
            .collect();
        counts.sort();
        f.debug_struct("HookBus").field("subscribers", &counts).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{AppConfig, GlobalConfig, default_cids_root};
    use crate::core::assembly::assemble;
    use std::collections::BTreeMap;
    use std::sync::{Arc, Mutex};
    use tempfile::tempdir;

    fn empty_app(home: &std::path::Path) -> App {
        let global = GlobalConfig::defaults(home);
        assemble(AppConfig {
            file_path: home.join("kbox.toml"),
            name: "blog".into(),
            domain: global.domain,
            home: home.to_path_buf(),
            app_root: home.to_path_buf(),
            components: BTreeMap::new(),
            plugins: Vec::new(),
            cids_root: default_cids_root(home, "blog"),
            src_root: global.src_root,
            dns: global.dns,
            code_root: None,
            warnings: Vec::new(),
        })
        .unwrap()
    }

    #[test]
    fn subscribers_run_in_registration_order() {
        let home = tempdir().unwrap();
        let app = empty_app(home.path());
        let seen = Arc::new(Mutex::new(Vec::new()));

        let mut bus = HookBus::new();
        for tag in ["first", "second"] {
            let seen = Arc::clone(&seen);
            bus.subscribe("pre-start", move |_: &mut HookPayload<'_>| -> HookResult {
                seen.lock().unwrap().push(tag);
                Ok(())
            });
        }

        bus.emit("pre-start", &mut HookPayload::App(&app)).unwrap();
        assert_eq!(*seen.lock().unwrap(), vec!["first", "second"]);
    }

    #[test]
    fn first_failure_stops_dispatch() {
        let home = tempdir().unwrap();
        let app = empty_app(home.path());
        let calls = Arc::new(Mutex::new(0));

        let mut bus = HookBus::new();
        bus.subscribe("pre-install", |_: &mut HookPayload<'_>| -> HookResult {
            Err("not today".to_string())
        });
        let counter = Arc::clone(&calls);
        bus.subscribe("pre-install", move |_: &mut HookPayload<'_>| -> HookResult {
            *counter.lock().unwrap() += 1;
            Ok(())
        });

        let err = bus
            .emit("pre-install", &mut HookPayload::App(&app))
            .unwrap_err();
        match err {
            Error::HookVeto { event, message } => {
                assert_eq!(event, "pre-install");
                assert_eq!(message, "not today");
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(*calls.lock().unwrap(), 0);
    }

    #[test]
    fn events_without_subscribers_succeed() {
        let home = tempdir().unwrap();
        let app = empty_app(home.path());
        let bus = HookBus::new();
        assert_eq!(bus.subscriber_count("post-stop"), 0);
        bus.emit("post-stop", &mut HookPayload::App(&app)).unwrap();
    }
}
