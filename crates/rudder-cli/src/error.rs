//! CLI error types with exit code handling
//!
//! Library errors are converted into [`CliError`] so every failure renders as
//! a miette diagnostic and maps to a stable exit code.

use miette::Diagnostic;
use rudder_core::CoreError;
use rudder_kube::KubeError;
use thiserror::Error;

use crate::exit_codes;

/// CLI-specific error type that includes exit code information
#[derive(Error, Debug, Diagnostic, Clone)]
pub enum CliError {
    /// Release or version does not exist
    #[error("{message}")]
    #[diagnostic(code(rudder::cli::not_found))]
    NotFound {
        message: String,
        #[help]
        help: Option<String>,
    },

    /// The release is not in a state that allows the operation
    #[error("{message}")]
    #[diagnostic(code(rudder::cli::state))]
    InvalidState {
        message: String,
        #[help]
        help: Option<String>,
    },

    /// Template rendering or manifest parsing failed
    #[error("Template error: {message}")]
    #[diagnostic(code(rudder::cli::template))]
    Template {
        message: String,
        #[help]
        help: Option<String>,
    },

    /// Chart structure or loading error
    #[error("Chart error: {message}")]
    #[diagnostic(code(rudder::cli::chart))]
    Chart {
        message: String,
        #[help]
        help: Option<String>,
    },

    /// A transition started and failed
    #[error("{message}")]
    #[diagnostic(code(rudder::cli::operation))]
    Operation {
        message: String,
        #[help]
        help: Option<String>,
    },

    /// Invalid configuration or arguments
    #[error("Configuration error: {message}")]
    #[diagnostic(code(rudder::cli::config))]
    Config { message: String },

    /// IO error (file not found, permissions, etc.)
    #[error("IO error: {message}")]
    #[diagnostic(code(rudder::cli::io))]
    Io { message: String },

    /// Anything else, with its message preserved
    #[error("{message}")]
    #[diagnostic(code(rudder::cli::error))]
    Other { message: String },
}

impl CliError {
    /// Get the exit code for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            CliError::NotFound { .. } => exit_codes::NOT_FOUND,
            CliError::InvalidState { .. } => exit_codes::STATE_ERROR,
            CliError::Template { .. } => exit_codes::TEMPLATE_ERROR,
            CliError::Chart { .. } => exit_codes::CHART_ERROR,
            CliError::Operation { .. } => exit_codes::OPERATION_FAILED,
            CliError::Config { .. } => exit_codes::USAGE_ERROR,
            CliError::Io { .. } => exit_codes::IO_ERROR,
            CliError::Other { .. } => exit_codes::ERROR,
        }
    }

    /// Create a configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }
}

fn operation_help(cause: &KubeError, release: &str) -> Option<String> {
    match cause {
        KubeError::HookFailure { .. } => Some(format!(
            "Inspect the hook resource, or retry with --no-hooks. `rudder status {}` shows the recorded hook runs",
            release
        )),
        KubeError::ApplyFailure { .. } | KubeError::NotReady { .. } | KubeError::Timeout(_) => {
            Some(format!(
                "Fix the failing resources and upgrade again, or run `rudder rollback {}`",
                release
            ))
        }
        _ => None,
    }
}

impl From<KubeError> for CliError {
    fn from(err: KubeError) -> Self {
        match err {
            KubeError::Transition { release, source } => CliError::Operation {
                message: format!(
                    "{} (release '{}' version {} is now {})",
                    source,
                    release.name,
                    release.version,
                    release.status()
                ),
                help: operation_help(source.root(), &release.name),
            },
            KubeError::NotFound { .. } => CliError::NotFound {
                message: err.to_string(),
                help: Some("Run `rudder list` to see installed releases".to_string()),
            },
            KubeError::InvalidState { .. }
            | KubeError::OperationInProgress { .. }
            | KubeError::MultipleDeployed { .. }
            | KubeError::StoreConflict { .. } => CliError::InvalidState {
                message: err.to_string(),
                help: None,
            },
            KubeError::Render(message) | KubeError::InvalidManifest(message) => {
                CliError::Template {
                    message,
                    help: None,
                }
            }
            KubeError::HookFailure { .. }
            | KubeError::ApplyFailure { .. }
            | KubeError::NotReady { .. }
            | KubeError::Timeout(_) => CliError::Operation {
                message: err.to_string(),
                help: None,
            },
            KubeError::InvalidConfig(message) => CliError::Config { message },
            KubeError::Io(e) => CliError::Io {
                message: e.to_string(),
            },
            other => CliError::Other {
                message: other.to_string(),
            },
        }
    }
}

impl From<CoreError> for CliError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::ChartNotFound { .. } => CliError::Chart {
                message: err.to_string(),
                help: Some("Pass the path to a chart directory containing Chart.yaml".to_string()),
            },
            CoreError::InvalidChart { .. }
            | CoreError::InvalidVersion(_)
            | CoreError::YamlParse(_)
            | CoreError::JsonParse(_) => CliError::Chart {
                message: err.to_string(),
                help: None,
            },
            CoreError::ValuesMerge { message } => CliError::Config { message },
            CoreError::Io(e) => CliError::Io {
                message: e.to_string(),
            },
        }
    }
}

impl From<std::io::Error> for CliError {
    fn from(err: std::io::Error) -> Self {
        CliError::Io {
            message: err.to_string(),
        }
    }
}

impl From<serde_json::Error> for CliError {
    fn from(err: serde_json::Error) -> Self {
        CliError::Other {
            message: format!("JSON output failed: {}", err),
        }
    }
}

/// Result type for CLI operations
pub type Result<T> = std::result::Result<T, CliError>;
