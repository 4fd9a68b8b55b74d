//! SSH access to a provisioned container
//!
//! The stock image ships without an SSH server. Access is set up by running
//! these commands, in order, through the Container Service.

use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{EdgeError, Result};
use crate::shell;

pub const INSTALL_COMMAND: &str = "apt-get update && apt-get install -y openssh-server";
pub const PREPARE_DIR_COMMAND: &str = "mkdir -p /root/.ssh && chmod 700 /root/.ssh";
pub const START_COMMAND: &str = "service ssh start";
pub const STATUS_COMMAND: &str = "service ssh status";

/// Login user inside the container
pub const SSH_USER: &str = "root";

/// `~/.ssh/id_rsa.pub`, if a home directory is known
pub fn default_public_key_path() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(".ssh").join("id_rsa.pub"))
}

/// Read an OpenSSH public key file
pub fn read_public_key(path: &Path) -> Result<String> {
    let key = fs::read_to_string(path)
        .map_err(|e| EdgeError::Config(format!("cannot read public key {}: {}", path.display(), e)))?;
    let key = key.trim();
    if key.is_empty() {
        return Err(EdgeError::Config(format!("public key {} is empty", path.display())));
    }
    Ok(key.to_string())
}

/// Commands that install the key and start sshd, in execution order.
/// The last one is the status check.
pub fn setup_commands(public_key: &str) -> Vec<String> {
    vec![
        INSTALL_COMMAND.to_string(),
        PREPARE_DIR_COMMAND.to_string(),
        format!(
            "echo {} >> /root/.ssh/authorized_keys && chmod 600 /root/.ssh/authorized_keys",
            shell::quote(public_key)
        ),
        START_COMMAND.to_string(),
        STATUS_COMMAND.to_string(),
    ]
}

/// Whether `service ssh status` output reports a running daemon
pub fn is_running(status_output: &str) -> bool {
    status_output.contains("is running") && !status_output.contains("not running")
}

/// `ssh root@<address>`
pub fn login_command(address: &str) -> String {
    format!("ssh {}@{}", SSH_USER, address)
}
