//! Error types for edgeprov

use std::time::Duration;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum EdgeError {
    #[error("Container '{name}' already exists")]
    Conflict { name: String },

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Container {container} did not become active within {}s", .waited.as_secs())]
    ProvisioningTimeout { container: String, waited: Duration },

    #[error("Container {container} failed to start: {reason}")]
    ProvisioningFailed { container: String, reason: String },

    #[error("No floating IP available in the address pool")]
    AddressPoolExhausted,

    #[error("Transfer error: {0}")]
    Transfer(String),

    #[error("Container {0} is not active yet; wait for it before running commands or uploading files")]
    NotActive(String),

    #[error("SSH is not ready: {0}")]
    SshNotReady(String),

    #[error("Command `{command}` exited with status {exit_status}: {output}")]
    CommandFailed {
        command: String,
        exit_status: i32,
        output: String,
    },

    #[error("Could not read inference output: {0}")]
    InferenceOutput(String),

    #[error("Container Service returned {status}: {message}")]
    Api { status: u16, message: String },

    #[error("Connection failed: {0}")]
    Connection(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Teardown incomplete: {}", .0.join("; "))]
    Teardown(Vec<String>),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),
}

impl EdgeError {
    /// Human-readable hint telling the user how to get unstuck
    pub fn remediation(&self) -> Option<String> {
        match self {
            EdgeError::Conflict { name } => Some(format!(
                "A container named '{}' is left over from an earlier run. \
                 Remove it with `edgeprov destroy {}` and try again.",
                name, name
            )),
            EdgeError::ProvisioningTimeout { container, .. } => Some(format!(
                "Check the lease is still valid, then remove the container with `edgeprov destroy {}`.",
                container
            )),
            EdgeError::AddressPoolExhausted => Some(
                "Release an unused floating IP with `edgeprov release-ip <id>` and retry.".to_string(),
            ),
            EdgeError::Teardown(_) => Some(
                "Some resources may still exist; remove them with `edgeprov destroy` and `edgeprov release-ip`."
                    .to_string(),
            ),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, EdgeError>;
