//! Error and warning types surfaced by the engine.

use std::io;
use std::path::PathBuf;

/// Invalid or internally inconsistent configuration.
///
/// Raised while a configuration is validated; a pipeline never starts a scan
/// from a configuration that produced one of these.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(String),

    #[error("content requires at least one glob pattern")]
    EmptyContent,

    #[error("unrecognized darkMode strategy '{0}' (expected false, \"media\" or \"class\")")]
    InvalidDarkMode(String),

    #[error("unrecognized mode '{0}' (expected \"jit\" or \"aot\")")]
    InvalidMode(String),

    #[error("unknown {section} category '{name}'")]
    UnknownCategory { section: &'static str, name: String },

    #[error("invalid {category} token '{token}': '{value}' is not a valid {expected}")]
    InvalidToken {
        category: &'static str,
        token: String,
        value: String,
        expected: &'static str,
    },

    #[error("variants.{category} enables unknown modifier '{name}'")]
    UnknownVariant { category: &'static str, name: String },
}

/// Non-fatal, per-file problem encountered during a scan.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ScanWarning {
    #[error("glob '{0}' matched no files")]
    EmptyGlob(String),

    #[error("invalid glob pattern '{pattern}': {reason}")]
    InvalidGlob { pattern: String, reason: String },

    #[error("failed to read {}: {reason}", path.display())]
    Unreadable { path: PathBuf, reason: String },
}

/// A scan pass was superseded before it finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("scan pass cancelled")]
pub struct Cancelled;

/// Failure of a whole build pass.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Cancelled(#[from] Cancelled),
}

impl EngineError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled(_))
    }
}
