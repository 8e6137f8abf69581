//! CLI error types.

use std::fmt;
use std::io;
use std::path::PathBuf;

#[derive(Debug)]
pub enum CliError {
    /// The configuration file could not be read
    ReadConfig { path: PathBuf, source: io::Error },
    /// The configuration was read but rejected
    InvalidConfig(String),
    /// The configuration has no `[[surfaces]]` to run
    NoSurfaces,
    /// The log dispatcher could not be installed
    Logging(String),
    /// The async runtime or the signal handler failed
    Runtime(io::Error),
    /// A surface could not be attached to the campaign service
    Attach { surface: String, reason: String },
    /// The merged configuration could not be rendered
    Output(String),
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CliError::ReadConfig { path, source } => {
                write!(f, "Cannot read {}: {}", path.display(), source)
            }
            CliError::InvalidConfig(msg) => write!(f, "Invalid configuration: {}", msg),
            CliError::NoSurfaces => write!(f, "No [[surfaces]] configured, nothing to run"),
            CliError::Logging(msg) => write!(f, "Cannot initialize logging: {}", msg),
            CliError::Runtime(err) => write!(f, "Runtime error: {}", err),
            CliError::Attach { surface, reason } => {
                write!(f, "Cannot attach surface {}: {}", surface, reason)
            }
            CliError::Output(msg) => write!(f, "Cannot render configuration: {}", msg),
        }
    }
}

impl std::error::Error for CliError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CliError::ReadConfig { source, .. } => Some(source),
            CliError::Runtime(err) => Some(err),
            _ => None,
        }
    }
}

impl From<toml::de::Error> for CliError {
    fn from(err: toml::de::Error) -> Self {
        CliError::Output(err.to_string())
    }
}

impl From<serde_json::Error> for CliError {
    fn from(err: serde_json::Error) -> Self {
        CliError::Output(err.to_string())
    }
}
