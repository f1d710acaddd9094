use std::borrow::Cow;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::config::{AppConfig, ComponentSpec, DATA_COMPONENT};
use crate::error::{Error, Result};

use super::component::{Component, container_name};

/// In-container path the app root is bound to on start.
pub const CODE_MOUNT: &str = "/src";

/// An app as assembled from its configuration and the identity records on disk.
#[derive(Debug, Clone)]
pub struct App {
    /// App name from `[app] name`.
    pub name: String,
    /// `<name>.<suffix>`
    pub domain: String,
    /// `http://<domain>`
    pub url: String,
    /// Directory holding `kbox.toml`.
    pub app_root: PathBuf,
    /// App root in the form the execution environment mounts it.
    pub root_bind: String,
    /// Container name of the `data` component, whether or not the app declares one.
    pub data_component_name: String,
    /// Directory of the per-component identity records.
    pub cids_root: PathBuf,
    /// Shared source root searched after the app root for build descriptors.
    pub src_root: PathBuf,
    /// Configuration the app was assembled from, `code_root` included.
    pub config: AppConfig,
    /// Components keyed by name.
    pub components: BTreeMap<String, AppComponent>,
}

/// Entry of [`App::components`].
///
/// The reserved `data` key is kept as its declared spec rather than resolved at assembly
/// time; [`AppComponent::descriptor`] derives its full form on demand.
#[derive(Debug, Clone, PartialEq)]
pub enum AppComponent {
    /// A fully derived component.
    Resolved(Component),
    /// The `data` component, still in its declared form.
    Placeholder { name: String, spec: ComponentSpec },
}

impl AppComponent {
    /// Component name, resolved or not.
    pub fn name(&self) -> &str {
        match self {
            AppComponent::Resolved(component) => &component.name,
            AppComponent::Placeholder { name, .. } => name,
        }
    }

    /// True for the unresolved `data` entry.
    pub fn is_placeholder(&self) -> bool {
        matches!(self, AppComponent::Placeholder { .. })
    }

    /// The assembled descriptor; `None` for the placeholder.
    pub fn resolved(&self) -> Option<&Component> {
        match self {
            AppComponent::Resolved(component) => Some(component),
            AppComponent::Placeholder { .. } => None,
        }
    }

    /// Full descriptor, building it from the spec for placeholders.
    pub fn descriptor(&self, app: &App) -> Cow<'_, Component> {
        match self {
            AppComponent::Resolved(component) => Cow::Borrowed(component),
            AppComponent::Placeholder { name, spec } => {
                Cow::Owned(Component::build(app, name, spec))
            }
        }
    }
}

impl App {
    /// Whether the app declares a `data` component.
    pub fn has_data_component(&self) -> bool {
        self.components.contains_key(DATA_COMPONENT)
    }

    /// Every component, with the data component moved to the front.
    pub fn components_ordered(&self) -> Vec<&AppComponent> {
        let mut ordered: Vec<&AppComponent> = Vec::with_capacity(self.components.len());
        if let Some(data) = self.components.get(DATA_COMPONENT) {
            ordered.push(data);
        }
        ordered.extend(
            self.components
                .iter()
                .filter(|(name, _)| name.as_str() != DATA_COMPONENT)
                .map(|(_, component)| component),
        );
        ordered
    }

    /// Look up a component by name.
    pub fn component(&self, name: &str) -> Option<&AppComponent> {
        self.components.get(name)
    }

    /// Roots searched, in order, for a component's build descriptor.
    pub(crate) fn build_search_roots(&self) -> [&Path; 2] {
        [self.app_root.as_path(), self.src_root.as_path()]
    }
}

/// Build the [`App`] for `config`, creating its identity directory if needed.
pub fn assemble(mut config: AppConfig) -> Result<App> {
    let name = config.name.clone();
    let domain = format!("{name}.{}", config.domain);
    config.code_root = Some(config.app_root.join("code"));

    fs::create_dir_all(&config.cids_root).map_err(|source| Error::CreateDir {
        path: config.cids_root.clone(),
        source,
    })?;

    let specs = config.components.clone();
    let mut app = App {
        url: format!("http://{domain}"),
        domain,
        app_root: config.app_root.clone(),
        root_bind: bind_path(&config.app_root),
        data_component_name: container_name(&name, DATA_COMPONENT),
        cids_root: config.cids_root.clone(),
        src_root: config.src_root.clone(),
        name,
        config,
        components: BTreeMap::new(),
    };

    let components = specs
        .into_iter()
        .map(|(key, spec)| {
            let entry = if key == DATA_COMPONENT {
                AppComponent::Placeholder {
                    name: key.clone(),
                    spec,
                }
            } else {
                AppComponent::Resolved(Component::build(&app, &key, &spec))
            };
            (key, entry)
        })
        .collect::<BTreeMap<_, _>>();

    check_name_collisions(&app.name, &components)?;
    app.components = components;

    debug!(
        "assembled app `{}` with {} component(s)",
        app.name,
        app.components.len()
    );
    Ok(app)
}

fn check_name_collisions(app: &str, components: &BTreeMap<String, AppComponent>) -> Result<()> {
    for name in components.keys() {
        for other in components.keys().filter(|other| *other != name) {
            if *name == container_name(app, other) {
                return Err(Error::NameCollision {
                    app: app.to_string(),
                    component: name.clone(),
                    other: other.clone(),
                });
            }
        }
    }
    Ok(())
}

/// Express a host path the way the container engine expects bind sources.
///
/// Drive-letter paths (`C:\Users\me`) become `/c/Users/me`; everything else is left as is.
pub fn bind_path(path: &Path) -> String {
    let text = path.display().to_string();
    let mut chars = text.chars();
    match (chars.next(), chars.next()) {
        (Some(drive), Some(':')) if drive.is_ascii_alphabetic() => {
            let rest: String = chars.collect::<String>().replace('\\', "/");
            let rest = rest.trim_start_matches('/');
            format!("/{}/{rest}", drive.to_ascii_lowercase())
        }
        _ => text,
    }
}
