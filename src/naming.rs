//! Resource naming
//!
//! Testbed resources are named `<user>-<experiment>`. The service rejects
//! underscores in names, so every `_` becomes `-`.

use crate::error::{EdgeError, Result};

/// Experiment name used when none is given
pub const DEFAULT_EXPERIMENT: &str = "edge-cpu";

/// Environment variable holding the invoking user's name
pub const USER_ENV: &str = "USER";

/// Build a resource name from a username and an experiment name
pub fn resource_name(username: &str, experiment: &str) -> String {
    normalize(&format!("{}-{}", username, experiment))
}

/// Make a user-supplied name acceptable to the service
pub fn normalize(name: &str) -> String {
    name.replace('_', "-")
}

/// Read the username from the environment
pub fn username_from_env() -> Result<String> {
    match std::env::var(USER_ENV) {
        Ok(user) if !user.trim().is_empty() => Ok(user.trim().to_string()),
        _ => Err(EdgeError::Config(format!(
            "${} is not set; pass --name explicitly",
            USER_ENV
        ))),
    }
}

/// Default resource name for the current user
pub fn default_resource_name(experiment: &str) -> Result<String> {
    Ok(resource_name(&username_from_env()?, experiment))
}
