use std::ffi::OsStr;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use time::{OffsetDateTime, format_description::well_known::Rfc3339};
use tracing::debug;

use crate::error::{Error, Result};

/// Maps registered app keys to their root directories.
pub trait Discovery: Send + Sync {
    /// Keys of every registered app.
    fn list(&self) -> Result<Vec<String>>;
    /// Root directory registered under `key`.
    fn app_dir(&self, key: &str) -> Result<PathBuf>;
    /// Record `dir`; registering the same directory twice is a no-op.
    fn register_app_dir(&self, dir: &Path) -> Result<()>;
}

const REGISTRY_VERSION: u32 = 1;

/// Discovery persisted as a JSON document, normally `<home>/.kbox/appdirs.json`.
#[derive(Debug, Clone)]
pub struct FileDiscovery {
    path: PathBuf,
}

/// On-disk shape of `appdirs.json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppDirRegistry {
    pub version: u32,
    #[serde(default)]
    pub apps: Vec<AppDirEntry>,
}

/// One registered directory.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppDirEntry {
    /// Directory basename, suffixed when another entry already uses it.
    pub key: String,
    pub dir: PathBuf,
    /// RFC 3339 timestamp of the registration.
    pub registered_at: String,
}

impl Default for AppDirRegistry {
    fn default() -> Self {
        Self {
            version: REGISTRY_VERSION,
            apps: Vec::new(),
        }
    }
}

impl FileDiscovery {
    /// Discovery backed by the JSON file at `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Discovery at the default location under `home`.
    pub fn in_home(home: &Path) -> Self {
        Self::new(crate::config::kbox_root(home).join("appdirs.json"))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the registry; a missing file is an empty registry.
    pub fn load(&self) -> Result<AppDirRegistry> {
        let contents = match fs::read_to_string(&self.path) {
            Ok(contents) => contents,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(AppDirRegistry::default()),
            Err(err) => {
                return Err(Error::RegistryRead {
                    path: self.path.clone(),
                    message: err.to_string(),
                });
            }
        };
        serde_json::from_str(&contents).map_err(|err| Error::RegistryRead {
            path: self.path.clone(),
            message: err.to_string(),
        })
    }

    fn save(&self, registry: &AppDirRegistry) -> Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|source| Error::CreateDir {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        let json = serde_json::to_string_pretty(registry).map_err(|err| Error::RegistryWrite {
            path: self.path.clone(),
            message: err.to_string(),
        })?;
        fs::write(&self.path, json).map_err(|err| Error::RegistryWrite {
            path: self.path.clone(),
            message: err.to_string(),
        })
    }
}

impl Discovery for FileDiscovery {
    fn list(&self) -> Result<Vec<String>> {
        Ok(self.load()?.apps.into_iter().map(|entry| entry.key).collect())
    }

    fn app_dir(&self, key: &str) -> Result<PathBuf> {
        self.load()?
            .apps
            .into_iter()
            .find(|entry| entry.key == key)
            .map(|entry| entry.dir)
            .ok_or_else(|| Error::UnknownAppDir {
                name: key.to_string(),
            })
    }

    fn register_app_dir(&self, dir: &Path) -> Result<()> {
        let dir = fs::canonicalize(dir).unwrap_or_else(|_| dir.to_path_buf());
        let mut registry = self.load()?;
        if registry.apps.iter().any(|entry| entry.dir == dir) {
            debug!("{} is already registered", dir.display());
            return Ok(());
        }

        let key = unique_key(&registry, &dir);
        debug!("registering {} as `{key}`", dir.display());
        registry.apps.push(AppDirEntry {
            key,
            dir,
            registered_at: now_rfc3339(),
        });
        self.save(&registry)
    }
}

fn unique_key(registry: &AppDirRegistry, dir: &Path) -> String {
    let base = dir
        .file_name()
        .and_then(OsStr::to_str)
        .filter(|name| !name.is_empty())
        .unwrap_or("app")
        .to_string();
    let taken = |candidate: &str| registry.apps.iter().any(|entry| entry.key == candidate);
    if !taken(&base) {
        return base;
    }
    (2..)
        .map(|n| format!("{base}-{n}"))
        .find(|candidate| !taken(candidate))
        .unwrap_or(base)
}

fn now_rfc3339() -> String {
    OffsetDateTime::now_utc()
        .format(&Rfc3339)
        .unwrap_or_else(|_| "unknown".to_string())
}
