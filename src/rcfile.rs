// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Persisted CLI state in the user's home directory (`~/.meshctlrc`).

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::constants::RCFILE_NAME;
use crate::error::{MeshctlError, Result};

/// Persistent CLI state, stored wholesale as YAML.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RcFile {
    /// Mesh control-plane server endpoint, e.g. "127.0.0.1:2381"
    pub server: String,
}

impl RcFile {
    /// Path of the rc file inside the user's home directory
    pub fn path() -> Result<PathBuf> {
        let home = dirs::home_dir()
            .ok_or_else(|| MeshctlError::RcFile("could not determine home directory".to_string()))?;
        Ok(home.join(RCFILE_NAME))
    }

    /// Load the rc file. A missing file is not an error and yields `None`.
    pub fn load() -> Result<Option<RcFile>> {
        Self::load_from(&Self::path()?)
    }

    /// Write the rc file back to the home directory.
    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::path()?)
    }

    pub(crate) fn load_from(path: &Path) -> Result<Option<RcFile>> {
        if !path.exists() {
            return Ok(None);
        }
        let data = fs::read_to_string(path)
            .map_err(|e| MeshctlError::RcFile(format!("failed to read {}: {}", path.display(), e)))?;
        let rc = serde_yaml::from_str(&data)
            .map_err(|e| MeshctlError::RcFile(format!("failed to parse {}: {}", path.display(), e)))?;
        Ok(Some(rc))
    }

    pub(crate) fn save_to(&self, path: &Path) -> Result<()> {
        let data = serde_yaml::to_string(self)
            .map_err(|e| MeshctlError::RcFile(format!("failed to serialize rc file: {}", e)))?;
        fs::write(path, data)
            .map_err(|e| MeshctlError::RcFile(format!("failed to write {}: {}", path.display(), e)))
    }
}
