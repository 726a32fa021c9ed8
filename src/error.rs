use std::path::PathBuf;

use thiserror::Error;

/// Taxonomy from the error handling design: transient I/O is handled at the
/// call site (skip and let the next detector cycle re-observe), the rest
/// propagate to the caller as a single failed operation.
#[derive(Debug, Error)]
pub enum DistriboxError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("toml decode error: {0}")]
    TomlDecode(#[from] toml::de::Error),

    #[error("toml encode error: {0}")]
    TomlEncode(#[from] toml::ser::Error),

    #[error("zip error: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("integrity violation: {message}")]
    Integrity { message: String },

    #[error("protocol violation: {message}")]
    Protocol { message: String },

    #[error("invariant violation: {message}")]
    Logic { message: String },
}

impl DistriboxError {
    pub fn integrity(message: impl Into<String>) -> Self {
        Self::Integrity {
            message: message.into(),
        }
    }

    pub fn protocol(message: impl Into<String>) -> Self {
        Self::Protocol {
            message: message.into(),
        }
    }

    pub fn logic(message: impl Into<String>) -> Self {
        Self::Logic {
            message: message.into(),
        }
    }

    pub fn blob_missing(digest: &str) -> Self {
        Self::integrity(format!("blob pool is missing referenced digest {digest}"))
    }

    pub fn digest_mismatch(path: &PathBuf, expected: &str, actual: &str) -> Self {
        Self::integrity(format!(
            "extracted blob {} hashes to {actual}, expected {expected}",
            path.display()
        ))
    }
}

pub type Result<T> = std::result::Result<T, DistriboxError>;
