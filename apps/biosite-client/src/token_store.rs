//! # Token Stores
//!
//! Where the client keeps the bearer token between calls. The in-memory
//! store lives as long as the client; the file store survives restarts.

use crate::error::ClientError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::RwLock;

/// Holds at most one bearer token.
pub trait TokenStore: Send + Sync {
    fn get(&self) -> Option<String>;
    fn set(&self, token: &str) -> Result<(), ClientError>;
    fn clear(&self) -> Result<(), ClientError>;
}

// =============================================================================
// MEMORY
// =============================================================================

#[derive(Debug, Default)]
pub struct MemoryTokenStore {
    token: RwLock<Option<String>>,
}

impl MemoryTokenStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl TokenStore for MemoryTokenStore {
    fn get(&self) -> Option<String> {
        self.token
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    fn set(&self, token: &str) -> Result<(), ClientError> {
        *self.token.write().unwrap_or_else(|e| e.into_inner()) = Some(token.to_string());
        Ok(())
    }

    fn clear(&self) -> Result<(), ClientError> {
        *self.token.write().unwrap_or_else(|e| e.into_inner()) = None;
        Ok(())
    }
}

// =============================================================================
// FILE
// =============================================================================

#[derive(Debug, Serialize, Deserialize)]
struct TokenFile {
    token: String,
}

/// Persists the token as `{"token": "..."}` in a JSON file.
///
/// The file is read once on construction and cached; a missing or
/// unreadable file simply means no token.
#[derive(Debug)]
pub struct FileTokenStore {
    path: PathBuf,
    cached: RwLock<Option<String>>,
}

impl FileTokenStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let cached = Self::load(&path);
        Self {
            path,
            cached: RwLock::new(cached),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn load(path: &Path) -> Option<String> {
        let text = std::fs::read_to_string(path).ok()?;
        match serde_json::from_str::<TokenFile>(&text) {
            Ok(file) if !file.token.is_empty() => Some(file.token),
            Ok(_) => None,
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "Ignoring unreadable token file");
                None
            }
        }
    }
}

impl TokenStore for FileTokenStore {
    fn get(&self) -> Option<String> {
        self.cached
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    fn set(&self, token: &str) -> Result<(), ClientError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .map_err(|e| ClientError::TokenStore(format!("{}: {e}", parent.display())))?;
        }
        let data = serde_json::to_vec(&TokenFile {
            token: token.to_string(),
        })
        .map_err(|e| ClientError::TokenStore(e.to_string()))?;
        write_private(&self.path, &data)
            .map_err(|e| ClientError::TokenStore(format!("{}: {e}", self.path.display())))?;
        *self.cached.write().unwrap_or_else(|e| e.into_inner()) = Some(token.to_string());
        Ok(())
    }

    fn clear(&self) -> Result<(), ClientError> {
        *self.cached.write().unwrap_or_else(|e| e.into_inner()) = None;
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(ClientError::TokenStore(format!(
                "{}: {e}",
                self.path.display()
            ))),
        }
    }
}

/// Write `data` readable by the owner only.
#[cfg(unix)]
fn write_private(path: &Path, data: &[u8]) -> std::io::Result<()> {
    use std::io::Write;
    use std::os::unix::fs::{OpenOptionsExt, PermissionsExt};

    let mut file = std::fs::OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .mode(0o600)
        .open(path)?;
    // `mode` only applies on creation
    file.set_permissions(std::fs::Permissions::from_mode(0o600))?;
    file.write_all(data)?;
    file.sync_all()
}

#[cfg(not(unix))]
fn write_private(path: &Path, data: &[u8]) -> std::io::Result<()> {
    std::fs::write(path, data)
}
