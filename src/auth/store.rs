// Token persistence
// File-backed and in-memory implementations of the same load/save contract

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use super::types::TokenRecord;

/// Storage for the connector's single token record.
///
/// A missing store is not an error: `load` returns `Ok(None)` until the
/// first successful authorization has been saved.
pub trait TokenStore: Send + Sync {
    /// Read the current record, if any
    fn load(&self) -> Result<Option<TokenRecord>>;

    /// Replace the current record
    fn save(&self, record: &TokenRecord) -> Result<()>;

    /// Human-readable location for logs
    fn describe(&self) -> String;
}

/// Token record kept as a flat JSON file
#[derive(Debug, Clone)]
pub struct FileTokenStore {
    path: PathBuf,
}

impl FileTokenStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl TokenStore for FileTokenStore {
    fn load(&self) -> Result<Option<TokenRecord>> {
        let content = match std::fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!("No token file at {}", self.path.display());
                return Ok(None);
            }
            Err(e) => {
                return Err(e).with_context(|| {
                    format!("Failed to read token file: {}", self.path.display())
                })
            }
        };

        // An empty file or `{}` means "not logged in yet"
        let value: serde_json::Value = match content.trim() {
            "" => return Ok(None),
            trimmed => serde_json::from_str(trimmed).with_context(|| {
                format!("Failed to parse token file: {}", self.path.display())
            })?,
        };
        if value.as_object().is_some_and(|obj| obj.is_empty()) {
            return Ok(None);
        }

        let record: TokenRecord = serde_json::from_value(value).with_context(|| {
            format!("Token file has an unexpected shape: {}", self.path.display())
        })?;

        Ok(Some(record))
    }

    fn save(&self, record: &TokenRecord) -> Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create token directory: {}", parent.display())
            })?;
        }

        let content =
            serde_json::to_string_pretty(record).context("Failed to serialize token record")?;

        // Write to a sibling temp file, then rename over the target
        let temp_path = self.path.with_extension("json.tmp");
        std::fs::write(&temp_path, content)
            .with_context(|| format!("Failed to write token file: {}", temp_path.display()))?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&temp_path, std::fs::Permissions::from_mode(0o600))
                .with_context(|| format!("Failed to restrict permissions: {}", temp_path.display()))?;
        }

        std::fs::rename(&temp_path, &self.path)
            .with_context(|| format!("Failed to replace token file: {}", self.path.display()))?;

        tracing::debug!("Saved token record to {}", self.path.display());
        Ok(())
    }

    fn describe(&self) -> String {
        format!("file {}", self.path.display())
    }
}

/// Token record held only for the lifetime of the process
#[derive(Debug, Default)]
pub struct MemoryTokenStore {
    record: RwLock<Option<TokenRecord>>,
}

impl MemoryTokenStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store that already holds `record`
    pub fn with_record(record: TokenRecord) -> Self {
        Self {
            record: RwLock::new(Some(record)),
        }
    }
}

impl TokenStore for MemoryTokenStore {
    fn load(&self) -> Result<Option<TokenRecord>> {
        let guard = self
            .record
            .read()
            .map_err(|_| anyhow::anyhow!("Token store lock poisoned"))?;
        Ok(guard.clone())
    }

    fn save(&self, record: &TokenRecord) -> Result<()> {
        let mut guard = self
            .record
            .write()
            .map_err(|_| anyhow::anyhow!("Token store lock poisoned"))?;
        *guard = Some(record.clone());
        Ok(())
    }

    fn describe(&self) -> String {
        "memory".to_string()
    }
}
