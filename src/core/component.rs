use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::config::{ComponentSpec, ImageSpec};

use super::assembly::App;
use super::identity;

/// File that marks a directory as a buildable image source.
pub const BUILD_DESCRIPTOR: &str = "Dockerfile";

/// A component with every derived field filled in.
///
/// Values are rebuilt on each app assembly; the identity record on disk is the only state
/// that outlives them.
#[derive(Debug, Clone, PartialEq)]
pub struct Component {
    /// Key in the app's `[components]` table.
    pub name: String,
    /// `<name>.<app domain>`
    pub hostname: String,
    /// `http://<hostname>`
    pub url: String,
    /// Engine-level container name, unique per app and component.
    pub container_name: String,
    /// Container name of the owning app's data component.
    pub data_container_name: String,
    /// Identity record backing `container_id`.
    pub identity_path: PathBuf,
    /// Identifier recovered from the identity record, if one was written.
    pub container_id: Option<String>,
    /// Image the container runs, after build resolution.
    pub image: ResolvedImage,
    /// The declared spec the component was built from.
    pub spec: ComponentSpec,
}

/// Image source after the build descriptor search.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedImage {
    /// Image tag; the build output when `build` is set.
    pub name: String,
    /// Cleared when no build descriptor exists in any source root.
    pub build: bool,
    /// Declared build source, relative to each search root.
    pub src: Option<PathBuf>,
    /// Directory holding the build descriptor that won the search.
    pub context: Option<PathBuf>,
}

impl Component {
    /// Derive the full descriptor for `name` within `app`.
    ///
    /// Never fails: an unresolvable build source demotes the image to a pre-built one, and an
    /// unreadable identity record is treated as absent.
    pub fn build(app: &App, name: &str, spec: &ComponentSpec) -> Self {
        let hostname = format!("{name}.{}", app.domain);
        let identity_path = identity::identity_path(&app.cids_root, name);
        let container_id = match identity::read(&identity_path) {
            Ok(id) => id,
            Err(err) => {
                warn!("ignoring identity record for `{name}`: {err}");
                None
            }
        };

        let image = resolve_image(name, &spec.image, &app.build_search_roots());

        Self {
            name: name.to_string(),
            url: format!("http://{hostname}"),
            hostname,
            container_name: container_name(&app.name, name),
            data_container_name: app.data_component_name.clone(),
            identity_path,
            container_id,
            image,
            spec: spec.clone(),
        }
    }

    /// Whether this is the app's shared data component.
    pub fn is_data(&self) -> bool {
        self.container_name == self.data_container_name
    }
}

/// Engine-level container name for a component.
pub fn container_name(app: &str, component: &str) -> String {
    format!("kb_{app}_{component}")
}

fn resolve_image(component: &str, spec: &ImageSpec, roots: &[&Path]) -> ResolvedImage {
    let mut image = ResolvedImage {
        name: spec.name.clone(),
        build: spec.build,
        src: spec.src.clone(),
        context: None,
    };
    if !spec.build {
        return image;
    }

    let src = spec.src.as_deref().unwrap_or_else(|| Path::new(component));
    image.context = roots
        .iter()
        .map(|root| root.join(src))
        .find(|dir| dir.join(BUILD_DESCRIPTOR).is_file());

    match &image.context {
        Some(context) => debug!("`{component}` builds from {}", context.display()),
        None => {
            debug!(
                "no {BUILD_DESCRIPTOR} for `{component}` under {}; using pre-built image {}",
                src.display(),
                spec.name
            );
            image.build = false;
        }
    }
    image
}
