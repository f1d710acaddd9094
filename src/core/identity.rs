//! Durable container identity records.
//!
//! Each component owns one file under the app's cids root whose entire content is the
//! identifier of the container created for it. The presence of that file is the only
//! thing distinguishing an installed component from a fresh one.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

/// Location of the identity record for `component`.
pub fn identity_path(cids_root: &Path, component: &str) -> PathBuf {
    cids_root.join(component)
}

/// Read a recorded container identifier. A missing or blank file means "never installed".
pub fn read(path: &Path) -> Result<Option<String>> {
    match fs::read_to_string(path) {
        Ok(contents) => {
            let id = contents.trim();
            if id.is_empty() {
                Ok(None)
            } else {
                Ok(Some(id.to_string()))
            }
        }
        Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
        Err(source) => Err(Error::IdentityRead {
            path: path.to_path_buf(),
            source,
        }),
    }
}

/// Persist `container_id`, replacing any previous record.
pub fn write(path: &Path, container_id: &str) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|source| Error::CreateDir {
            path: parent.to_path_buf(),
            source,
        })?;
    }
    fs::write(path, container_id).map_err(|source| Error::IdentityWrite {
        path: path.to_path_buf(),
        source,
    })
}

/// Delete the record. Returns whether a file was present.
pub fn clear(path: &Path) -> Result<bool> {
    match fs::remove_file(path) {
        Ok(()) => Ok(true),
        Err(err) if err.kind() == ErrorKind::NotFound => Ok(false),
        Err(source) => Err(Error::IdentityWrite {
            path: path.to_path_buf(),
            source,
        }),
    }
}
