//! CLI error types with miette diagnostics.
//!
//! Maps `CoreError` and `ConfigError` variants into user-facing errors
//! with actionable help text.

use miette::Diagnostic;
use thiserror::Error;

use patchbay_config::ConfigError;
use patchbay_core::CoreError;

/// Process exit codes.
pub mod exit_code {
    pub const GENERAL: i32 = 1;
    pub const USAGE: i32 = 2;
    pub const NOT_FOUND: i32 = 4;
    pub const CONFLICT: i32 = 6;
    pub const ENGINE: i32 = 7;
}

#[derive(Debug, Error, Diagnostic)]
pub enum CliError {
    // ── Scenario ─────────────────────────────────────────────────────
    #[error("Could not read scenario '{path}'")]
    #[diagnostic(
        code(patchbay::scenario),
        help("A scenario is a TOML file with [[devices]] and [[steps]] tables.")
    )]
    Scenario {
        path: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("{resource_type} '{identifier}' not found")]
    #[diagnostic(
        code(patchbay::not_found),
        help("Scenario steps can only refer to devices declared under [[devices]].")
    )]
    NotFound {
        resource_type: String,
        identifier: String,
    },

    #[error("{resource_type} '{identifier}' already exists")]
    #[diagnostic(code(patchbay::conflict))]
    Conflict {
        resource_type: String,
        identifier: String,
    },

    // ── Monitor ──────────────────────────────────────────────────────
    #[error("Monitor session is no longer valid")]
    #[diagnostic(code(patchbay::session))]
    SessionClosed,

    #[error("Session engine failure: {message}")]
    #[diagnostic(code(patchbay::engine))]
    Engine { message: String },

    // ── Validation ───────────────────────────────────────────────────
    #[error("Invalid value for {field}: {reason}")]
    #[diagnostic(code(patchbay::validation))]
    Validation { field: String, reason: String },

    // ── Configuration ────────────────────────────────────────────────
    #[error("Configuration file already exists at {path}")]
    #[diagnostic(
        code(patchbay::config_exists),
        help("Use --force to overwrite it, or edit it in place.")
    )]
    ConfigExists { path: String },

    #[error(transparent)]
    #[diagnostic(
        code(patchbay::config),
        help("Check the config file, or run: patchbay config show")
    )]
    Config(#[from] ConfigError),

    // ── IO ───────────────────────────────────────────────────────────
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl CliError {
    /// Map this error to an exit code for process termination.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::NotFound { .. } => exit_code::NOT_FOUND,
            Self::Conflict { .. } | Self::ConfigExists { .. } => exit_code::CONFLICT,
            Self::Engine { .. } | Self::SessionClosed => exit_code::ENGINE,
            Self::Validation { .. } | Self::Scenario { .. } | Self::Config(_) => exit_code::USAGE,
            Self::Io(_) => exit_code::GENERAL,
        }
    }

    pub fn validation(field: &str, reason: impl Into<String>) -> Self {
        Self::Validation {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

// ── CoreError → CliError mapping ─────────────────────────────────────

impl From<CoreError> for CliError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::InvalidSession => CliError::SessionClosed,
            CoreError::InvalidIdentity { identity, reason } => CliError::Validation {
                field: format!("identity '{identity}'"),
                reason,
            },
            CoreError::ValidationFailed { message } => CliError::Validation {
                field: "input".into(),
                reason: message,
            },
            CoreError::Engine { message } => CliError::Engine { message },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn core_errors_keep_their_exit_class() {
        assert_eq!(
            CliError::from(CoreError::InvalidSession).exit_code(),
            exit_code::ENGINE
        );
        let bad = CliError::from(CoreError::InvalidIdentity {
            identity: "x/".into(),
            reason: "empty signal name".into(),
        });
        assert_eq!(bad.exit_code(), exit_code::USAGE);
        assert!(bad.to_string().contains("x/"));
    }
}
