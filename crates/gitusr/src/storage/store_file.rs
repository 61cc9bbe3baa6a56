//! Store file format, one encrypted envelope per identity.
//!
//! File format (JSON):
//! ```json
//! {
//!     "identities": {
//!         "<id>": { "salt": "..", "iv": "..", "encryptedData": "..:.." }
//!     },
//!     "activeId": "<id>" | null,
//!     "timestamp": "2026-01-01T12:00:00.000Z"
//! }
//! ```
//!
//! Each entry under `identities` is kept as raw JSON until it is opened, so
//! one malformed envelope is skipped on its own instead of failing the whole
//! file.
//!
//! The file is written with mode `0600` via a sibling temporary file and a
//! rename, so a crash mid-write leaves either the old or the new version.
//! There is no cross-process lock: two concurrent invocations that both
//! read, modify and write can lose one writer's changes.

use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::crypto::Envelope;
use crate::error::{GitusrError, Result};
use crate::identity::IdentityId;

/// Top-level structure written to disk.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreFile {
    /// Raw envelope per id. Decode with [`StoreFile::envelope`].
    #[serde(default)]
    pub identities: BTreeMap<IdentityId, Value>,
    #[serde(default)]
    pub active_id: Option<IdentityId>,
    /// RFC 3339 time of the last write.
    #[serde(default)]
    pub timestamp: Option<String>,
}

impl StoreFile {
    /// Decode the envelope stored under `id`, if there is one.
    pub fn envelope(&self, id: &str) -> Option<Result<Envelope>> {
        self.identities.get(id).map(decode_envelope)
    }

    pub fn insert_envelope(&mut self, id: IdentityId, envelope: &Envelope) -> Result<()> {
        self.identities.insert(id, encode_envelope(envelope)?);
        Ok(())
    }
}

/// Decode one raw entry.
///
/// # Errors
///
/// Returns [`GitusrError::CorruptedData`] when a field is missing or has the
/// wrong type.
pub fn decode_envelope(value: &Value) -> Result<Envelope> {
    Envelope::deserialize(value)
        .map_err(|e| GitusrError::CorruptedData(format!("malformed envelope: {e}")))
}

pub fn encode_envelope(envelope: &Envelope) -> Result<Value> {
    serde_json::to_value(envelope).map_err(|e| GitusrError::SerializationError(e.to_string()))
}

/// Create the config directory with mode `0700` if it does not exist.
pub fn ensure_config_dir(dir: &Path) -> Result<()> {
    if dir.exists() {
        return Ok(());
    }
    let mut builder = std::fs::DirBuilder::new();
    builder.recursive(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::DirBuilderExt;
        builder.mode(0o700);
    }
    builder.create(dir)?;
    log::debug!("created config directory {}", dir.display());
    Ok(())
}

/// Read and parse the store file. `Ok(None)` when it does not exist.
///
/// # Errors
///
/// Returns [`GitusrError::Io`] if the file exists but cannot be read, or
/// [`GitusrError::SerializationError`] if it is not a valid store file.
pub fn read_store_file(path: &Path) -> Result<Option<StoreFile>> {
    let bytes = match std::fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };
    serde_json::from_slice(&bytes)
        .map(Some)
        .map_err(|e| GitusrError::SerializationError(format!("invalid store file: {e}")))
}

/// Serialize `file` and atomically replace `path` with it.
pub fn write_store_file(path: &Path, file: &StoreFile) -> Result<()> {
    let json = serde_json::to_string_pretty(file)
        .map_err(|e| GitusrError::SerializationError(e.to_string()))?;
    write_atomic(path, json.as_bytes())
}

fn temp_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

/// Write `data` to `path` through an owner-only sibling temp file and rename.
fn write_atomic(path: &Path, data: &[u8]) -> Result<()> {
    let tmp_path = temp_path(path);

    let written = write_private(&tmp_path, data).and_then(|()| {
        std::fs::rename(&tmp_path, path)?;
        Ok(())
    });
    if written.is_err() {
        let _ = std::fs::remove_file(&tmp_path);
    }
    written
}

fn write_private(path: &Path, data: &[u8]) -> Result<()> {
    let mut options = std::fs::OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }
    let mut file = options.open(path)?;

    // `mode` only applies on creation; a stale temp file keeps its old bits.
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        file.set_permissions(std::fs::Permissions::from_mode(0o600))?;
    }

    file.write_all(data)?;
    file.sync_all()?;
    Ok(())
}
