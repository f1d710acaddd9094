use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::{Error, Result};

/// File name of the per-app configuration.
pub const APP_CONFIG_FILE: &str = "kbox.toml";
/// Reserved key of the component that owns an app's shared volumes.
pub const DATA_COMPONENT: &str = "data";
/// Domain suffix used when `config.toml` sets none.
pub const DEFAULT_DOMAIN: &str = "kbox";
/// Docker remote API endpoint used when `config.toml` sets none.
pub const DEFAULT_ENGINE_URL: &str = "http://127.0.0.1:2375";
pub const DEFAULT_DOCKER_BINARY: &str = "docker";
pub const DEFAULT_DNS: [&str; 2] = ["8.8.8.8", "8.8.4.4"];

/// Key/value options handed to the container engine untouched.
pub type OptionMap = serde_json::Map<String, serde_json::Value>;

/// Machine-wide settings shared by every app.
#[derive(Debug, Clone)]
pub struct GlobalConfig {
    /// Home directory the settings were resolved against.
    pub home: PathBuf,
    pub domain: String,
    /// Shared source root for build descriptors.
    pub src_root: PathBuf,
    /// Resolvers handed to every container.
    pub dns: Vec<String>,
    /// Docker remote API endpoint.
    pub engine_url: String,
    /// CLI used for image builds.
    pub docker_binary: String,
    /// Unknown keys met while reading `config.toml`.
    pub warnings: Vec<String>,
}

impl GlobalConfig {
    /// Defaults rooted at `home`, used when no `config.toml` exists.
    pub fn defaults(home: &Path) -> Self {
        Self {
            home: home.to_path_buf(),
            domain: DEFAULT_DOMAIN.to_string(),
            src_root: kbox_root(home).join("src"),
            dns: DEFAULT_DNS.iter().map(ToString::to_string).collect(),
            engine_url: DEFAULT_ENGINE_URL.to_string(),
            docker_binary: DEFAULT_DOCKER_BINARY.to_string(),
            warnings: Vec::new(),
        }
    }

    /// Load `<home>/.kbox/config.toml`, falling back to defaults when absent.
    pub fn load(home: &Path) -> Result<Self> {
        let path = kbox_root(home).join("config.toml");
        if !path.is_file() {
            return Ok(Self::defaults(home));
        }

        let contents = fs::read_to_string(&path).map_err(|source| Error::ReadConfig {
            path: path.clone(),
            source,
        })?;
        let value: toml::Value = toml::from_str(&contents).map_err(|source| Error::ParseConfig {
            path: path.clone(),
            source,
        })?;

        let mut warnings = Vec::new();
        if let toml::Value::Table(table) = &value {
            warn_table(table, &["kbox"], "root", &mut warnings);
            if let Some(toml::Value::Table(kbox)) = table.get("kbox") {
                warn_table(
                    kbox,
                    &["domain", "src_root", "dns", "engine_url", "docker"],
                    "[kbox]",
                    &mut warnings,
                );
            }
        }

        let raw = RawGlobal::deserialize(value).map_err(|source| Error::ParseConfig {
            path: path.clone(),
            source,
        })?;
        let kbox = raw.kbox.unwrap_or_default();

        let mut config = Self::defaults(home);
        if let Some(domain) = kbox.domain {
            if domain.trim().is_empty() {
                return Err(invalid_config(&path, "`kbox.domain` must not be empty."));
            }
            config.domain = domain;
        }
        if let Some(src_root) = kbox.src_root {
            config.src_root = resolve_path(home, src_root);
        }
        if let Some(dns) = kbox.dns {
            config.dns = dns;
        }
        if let Some(url) = kbox.engine_url {
            config.engine_url = url.trim_end_matches('/').to_string();
        }
        if let Some(docker) = kbox.docker {
            config.docker_binary = docker;
        }
        config.warnings = warnings;
        Ok(config)
    }
}

/// Image a component runs from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageSpec {
    pub name: String,
    /// Whether the image should be built locally before the container is created.
    pub build: bool,
    /// Directory, relative to a source root, holding the image's Dockerfile.
    pub src: Option<PathBuf>,
}

/// Declared shape of one component, as written in `kbox.toml`.
#[derive(Debug, Clone, PartialEq)]
pub struct ComponentSpec {
    pub image: ImageSpec,
    /// Engine create options merged over the computed defaults.
    pub install: OptionMap,
    /// Engine start options merged over the computed defaults.
    pub start: OptionMap,
}

impl ComponentSpec {
    /// A pre-built image component with no option overrides.
    pub fn from_image(name: impl Into<String>) -> Self {
        Self {
            image: ImageSpec {
                name: name.into(),
                build: false,
                src: None,
            },
            install: OptionMap::new(),
            start: OptionMap::new(),
        }
    }
}

/// Resolved configuration of a single app.
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// The `kbox.toml` this config was read from.
    pub file_path: PathBuf,
    pub name: String,
    /// Domain suffix apps are published under.
    pub domain: String,
    pub home: PathBuf,
    pub app_root: PathBuf,
    /// Declared components keyed by name.
    pub components: BTreeMap<String, ComponentSpec>,
    /// Plugin identifiers, loaded in order.
    pub plugins: Vec<String>,
    pub cids_root: PathBuf,
    pub src_root: PathBuf,
    pub dns: Vec<String>,
    /// Filled in during app assembly.
    pub code_root: Option<PathBuf>,
    pub warnings: Vec<String>,
}

/// `<home>/.kbox`, the root of all machine-local state.
pub fn kbox_root(home: &Path) -> PathBuf {
    home.join(".kbox")
}

/// Default directory holding an app's container identity records.
pub fn default_cids_root(home: &Path, app_name: &str) -> PathBuf {
    kbox_root(home).join("apps").join(app_name).join("cids")
}

pub(crate) fn user_home_dir() -> Option<PathBuf> {
    for key in ["KBOX_HOME", "HOME"] {
        if let Some(home) = std::env::var_os(key) {
            if !home.is_empty() {
                return Some(PathBuf::from(home));
            }
        }
    }

    #[cfg(windows)]
    {
        if let Some(profile) = std::env::var_os("USERPROFILE") {
            if !profile.is_empty() {
                return Some(PathBuf::from(profile));
            }
        }
    }

    None
}

/// Resolve the home directory or fail with a hint about the environment.
pub fn resolve_home() -> Result<PathBuf> {
    user_home_dir().ok_or(Error::HomeUnavailable)
}

/// Read and validate the app config at `path`, layered over `global`.
pub fn load_app_config(path: &Path, global: &GlobalConfig) -> Result<AppConfig> {
    let contents = fs::read_to_string(path).map_err(|source| Error::ReadConfig {
        path: path.to_path_buf(),
        source,
    })?;

    let value: toml::Value = toml::from_str(&contents).map_err(|source| Error::ParseConfig {
        path: path.to_path_buf(),
        source,
    })?;

    let mut warnings = detect_unknown_fields(&value);

    let raw = RawConfig::deserialize(value).map_err(|source| Error::ParseConfig {
        path: path.to_path_buf(),
        source,
    })?;

    raw.into_validated(path, global, &mut warnings)
}

fn invalid_config(path: &Path, message: impl Into<String>) -> Error {
    Error::InvalidConfig {
        path: path.to_path_buf(),
        message: message.into(),
    }
}

fn detect_unknown_fields(value: &toml::Value) -> Vec<String> {
    let mut warnings = Vec::new();

    if let toml::Value::Table(table) = value {
        warn_table(table, &["app", "components"], "root", &mut warnings);

        if let Some(app) = table.get("app") {
            if let toml::Value::Table(app_table) = app {
                warn_table(app_table, &["name", "plugins"], "[app]", &mut warnings);
            } else {
                warnings.push("Expected [app] to be a table.".to_string());
            }
        }

        if let Some(toml::Value::Table(components)) = table.get("components") {
            for (name, entry) in components {
                let context = format!("[components.{name}]");
                match entry {
                    toml::Value::Table(component) => {
                        warn_table(
                            component,
                            &["image", "install", "start"],
                            &context,
                            &mut warnings,
                        );
                        if let Some(toml::Value::Table(image)) = component.get("image") {
                            warn_table(
                                image,
                                &["name", "build", "src"],
                                &format!("{context}.image"),
                                &mut warnings,
                            );
                        }
                    }
                    _ => warnings.push(format!("{context} must be a table.")),
                }
            }
        }
    }

    warnings
}

fn warn_table(
    table: &toml::map::Map<String, toml::Value>,
    allowed: &[&str],
    context: &str,
    warnings: &mut Vec<String>,
) {
    for key in table.keys() {
        if !allowed.contains(&key.as_str()) {
            warnings.push(format!(
                "Unknown field `{key}` at {context}; this value will be ignored."
            ));
        }
    }
}

#[derive(Debug, Deserialize)]
struct RawGlobal {
    kbox: Option<RawKbox>,
}

#[derive(Debug, Deserialize, Default)]
struct RawKbox {
    domain: Option<String>,
    src_root: Option<PathBuf>,
    dns: Option<Vec<String>>,
    engine_url: Option<String>,
    docker: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawConfig {
    app: Option<RawApp>,
    #[serde(default)]
    components: BTreeMap<String, RawComponent>,
}

#[derive(Debug, Deserialize)]
struct RawApp {
    name: Option<String>,
    #[serde(default)]
    plugins: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct RawComponent {
    image: Option<RawImage>,
    #[serde(default)]
    install: Option<toml::Table>,
    #[serde(default)]
    start: Option<toml::Table>,
}

#[derive(Debug, Deserialize)]
struct RawImage {
    name: Option<String>,
    #[serde(default)]
    build: bool,
    #[serde(default)]
    src: Option<PathBuf>,
}

impl RawConfig {
    fn into_validated(
        self,
        path: &Path,
        global: &GlobalConfig,
        warnings: &mut Vec<String>,
    ) -> Result<AppConfig> {
        let app = self.app.ok_or_else(|| {
            invalid_config(
                path,
                "Missing required table `[app]`. Example:\n\
                 [app]\n\
                 name = \"drupal\"",
            )
        })?;

        let name = app.name.ok_or_else(|| {
            invalid_config(
                path,
                "Missing required field `app.name`. Example: `name = \"drupal\"`.",
            )
        })?;
        if !is_valid_name(&name) {
            return Err(invalid_config(
                path,
                format!(
                    "App name `{name}` must be non-empty and use only lowercase letters, digits, `-` or `_`."
                ),
            ));
        }

        if self.components.is_empty() {
            return Err(invalid_config(
                path,
                "Declare at least one component. Example:\n\
                 [components.web]\n\
                 image = { name = \"nginx:1.25\" }",
            ));
        }

        let mut components = BTreeMap::new();
        for (component_name, raw) in self.components {
            if !is_valid_name(&component_name) {
                return Err(invalid_config(
                    path,
                    format!(
                        "Component name `{component_name}` must use only lowercase letters, digits, `-` or `_`."
                    ),
                ));
            }

            let image = raw.image.ok_or_else(|| {
                invalid_config(
                    path,
                    format!("Component `{component_name}` is missing `image`."),
                )
            })?;
            let image_name = image.name.filter(|n| !n.trim().is_empty()).ok_or_else(|| {
                invalid_config(
                    path,
                    format!("Component `{component_name}` is missing `image.name`."),
                )
            })?;
            if image.src.is_some() && !image.build {
                warnings.push(format!(
                    "Component `{component_name}` sets `image.src` without `image.build = true`; the source will be ignored."
                ));
            }
            let src = match (image.build, image.src) {
                (true, None) => Some(PathBuf::from(&component_name)),
                (_, src) => src,
            };

            let install = table_to_options(path, &component_name, "install", raw.install)?;
            let start = table_to_options(path, &component_name, "start", raw.start)?;

            components.insert(
                component_name,
                ComponentSpec {
                    image: ImageSpec {
                        name: image_name,
                        build: image.build,
                        src,
                    },
                    install,
                    start,
                },
            );
        }

        let app_root = path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));

        warnings.extend(global.warnings.iter().cloned());

        Ok(AppConfig {
            file_path: path.to_path_buf(),
            cids_root: default_cids_root(&global.home, &name),
            name,
            domain: global.domain.clone(),
            home: global.home.clone(),
            app_root,
            components,
            plugins: app.plugins,
            src_root: global.src_root.clone(),
            dns: global.dns.clone(),
            code_root: None,
            warnings: std::mem::take(warnings),
        })
    }
}

fn table_to_options(
    path: &Path,
    component: &str,
    field: &str,
    table: Option<toml::Table>,
) -> Result<OptionMap> {
    let Some(table) = table else {
        return Ok(OptionMap::new());
    };
    match serde_json::to_value(table) {
        Ok(serde_json::Value::Object(map)) => Ok(map),
        Ok(_) => Err(invalid_config(
            path,
            format!("`components.{component}.{field}` must be a table."),
        )),
        Err(err) => Err(invalid_config(
            path,
            format!("`components.{component}.{field}` cannot be passed to the engine: {err}"),
        )),
    }
}

fn is_valid_name(name: &str) -> bool {
    !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-' || c == '_')
}

fn resolve_path(base: &Path, input: PathBuf) -> PathBuf {
    if input.is_absolute() {
        input
    } else {
        base.join(input)
    }
}
