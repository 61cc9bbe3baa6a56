//! Error types for gitusr.
//!
//! All errors are strongly typed and propagated without panicking.
//! Key material and decrypted records are never included in error messages.

use std::path::PathBuf;

/// Error type covering every store, crypto, key-file and adapter operation.
#[derive(Debug, thiserror::Error)]
pub enum GitusrError {
    #[error("Invalid input: {0}")]
    Validation(String),

    #[error("Identity not found: {0}")]
    NotFound(String),

    #[error("{count} identities match {selector}; use --id or --nickname to pick one")]
    AmbiguousMatch { selector: String, count: usize },

    #[error("An identity with this email, nickname and SSH key already exists")]
    DuplicateIdentity,

    #[error("SSH key file not found: {}", .0.display())]
    KeyFileNotFound(PathBuf),

    #[error("File does not look like a private SSH key: {}", .0.display())]
    InvalidKeyFormat(PathBuf),

    #[error("Corrupted encrypted data: {0}")]
    CorruptedData(String),

    #[error("Key derivation failed: {0}")]
    DerivationFailed(String),

    #[error("Encryption failed: {0}")]
    EncryptionFailed(String),

    #[error("{tool} failed: {message}")]
    ExternalTool { tool: String, message: String },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl GitusrError {
    /// Build an [`GitusrError::ExternalTool`] for the named program.
    pub fn external(tool: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ExternalTool {
            tool: tool.into(),
            message: message.into(),
        }
    }

    /// True for errors caused by a missing, unreadable or malformed key file.
    pub fn is_key_file_error(&self) -> bool {
        matches!(self, Self::KeyFileNotFound(_) | Self::InvalidKeyFormat(_))
    }
}

/// Convenience Result alias.
pub type Result<T> = std::result::Result<T, GitusrError>;
