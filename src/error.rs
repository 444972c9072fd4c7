//! Error taxonomy for the render core
//!
//! User-input errors abort the build that produced them; numerical edge cases
//! never surface here (they zero the offending sample and bump a warning
//! counter instead).

use std::path::PathBuf;

/// Result alias used across the crate
pub type RenderResult<T> = Result<T, RenderError>;

/// Render core errors
#[derive(Debug, thiserror::Error)]
pub enum RenderError {
    #[error("invalid geometry: {0}")]
    InvalidGeometry(String),

    #[error("invalid motion system: {0}")]
    InvalidMotion(String),

    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("persistent cache version mismatch: expected {expected}, found {found}")]
    PersistentCacheVersionMismatch { expected: u32, found: u32 },

    #[error("persistent cache corrupt: {0}")]
    PersistentCacheCorrupt(String),

    #[error("i/o error on {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl RenderError {
    /// Attach a path to a raw i/o error
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        RenderError::Io {
            path: path.into(),
            source,
        }
    }

    pub fn invalid_geometry(msg: impl Into<String>) -> Self {
        RenderError::InvalidGeometry(msg.into())
    }

    pub fn invalid_motion(msg: impl Into<String>) -> Self {
        RenderError::InvalidMotion(msg.into())
    }

    pub fn invalid_parameter(msg: impl Into<String>) -> Self {
        RenderError::InvalidParameter(msg.into())
    }

    pub fn corrupt(msg: impl Into<String>) -> Self {
        RenderError::PersistentCacheCorrupt(msg.into())
    }
}
