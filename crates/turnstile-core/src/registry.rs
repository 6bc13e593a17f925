//! Identity registry: the set of people the service can identify.
//!
//! A flat JSON file maps identity IDs to a reference photo and position
//! metadata. Loaded once at startup and held read-only in memory.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum RegistryError {
    #[error("failed to read registry {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("registry {path} is invalid: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// One enrolled identity.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct IdentityRecord {
    /// Path to the reference photo on disk.
    pub photo: PathBuf,
    /// Position title, e.g. "CEO".
    pub position: String,
    pub position_id: String,
}

/// In-memory identity registry keyed by identity ID.
#[derive(Debug, Clone, Default)]
pub struct Registry {
    entries: HashMap<String, IdentityRecord>,
}

impl Registry {
    /// Load the registry from a JSON file:
    /// `{ "<id>": { "photo": ..., "position": ..., "position_id": ... }, ... }`.
    pub fn load(path: &Path) -> Result<Self, RegistryError> {
        let raw = std::fs::read(path).map_err(|source| RegistryError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let entries: HashMap<String, IdentityRecord> =
            serde_json::from_slice(&raw).map_err(|source| RegistryError::Parse {
                path: path.to_path_buf(),
                source,
            })?;
        tracing::info!(path = %path.display(), identities = entries.len(), "registry loaded");
        Ok(Self { entries })
    }

    /// Build a registry from in-memory entries.
    pub fn from_entries(entries: HashMap<String, IdentityRecord>) -> Self {
        Self { entries }
    }

    pub fn get(&self, id: &str) -> Option<&IdentityRecord> {
        self.entries.get(id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
