//! Container data model
//!
//! A Container represents one sandboxed environment running on a leased
//! edge device. It is created from a [`ContainerSpec`] and moves through
//! `requested -> active -> destroyed`.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{EdgeError, Result};

/// Reservation (lease) identifier granted by the testbed
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ReservationId(String);

impl ReservationId {
    pub fn new(id: impl Into<String>) -> Result<Self> {
        let id = id.into();
        if id.trim().is_empty() {
            return Err(EdgeError::Config("reservation id must not be empty".to_string()));
        }
        Ok(Self(id))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ReservationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Lifecycle state reported by the Container Service
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContainerState {
    Requested,
    Active,
    Error,
    Destroyed,
}

impl fmt::Display for ContainerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ContainerState::Requested => "requested",
            ContainerState::Active => "active",
            ContainerState::Error => "error",
            ContainerState::Destroyed => "destroyed",
        };
        f.write_str(s)
    }
}

/// Request to create a container
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContainerSpec {
    pub name: String,
    pub image: String,
    pub reservation_id: ReservationId,
    pub exposed_ports: Vec<u16>,
    pub interactive: bool,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub environment: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub platform_version: Option<u8>,
}

impl ContainerSpec {
    pub fn new(name: impl Into<String>, image: impl Into<String>, reservation_id: ReservationId) -> Self {
        Self {
            name: name.into(),
            image: image.into(),
            reservation_id,
            exposed_ports: Vec::new(),
            interactive: false,
            environment: BTreeMap::new(),
            platform_version: None,
        }
    }

    pub fn expose(mut self, port: u16) -> Self {
        if !self.exposed_ports.contains(&port) {
            self.exposed_ports.push(port);
        }
        self
    }

    pub fn interactive(mut self, interactive: bool) -> Self {
        self.interactive = interactive;
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.environment.insert(key.into(), value.into());
        self
    }

    pub fn platform_version(mut self, version: u8) -> Self {
        self.platform_version = Some(version);
        self
    }
}

/// A container as reported by the Container Service
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Container {
    pub id: String,
    pub name: String,
    pub image: String,
    pub reservation_id: ReservationId,
    #[serde(default)]
    pub exposed_ports: Vec<u16>,
    pub state: ContainerState,
    /// Service-supplied reason when `state` is `error`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status_reason: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Container {
    pub fn is_active(&self) -> bool {
        self.state == ContainerState::Active
    }
}

/// A public address associated with a container
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FloatingIp {
    pub id: String,
    pub address: String,
    pub container_id: String,
}

/// Result of a remote command
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandOutput {
    pub output: String,
    pub exit_status: i32,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.exit_status == 0
    }

    /// Turn a non-zero exit status into an error
    pub fn require_success(self, command: &str) -> Result<Self> {
        if self.success() {
            Ok(self)
        } else {
            Err(EdgeError::CommandFailed {
                command: command.to_string(),
                exit_status: self.exit_status,
                output: self.output.trim().to_string(),
            })
        }
    }
}

/// What an upload moved
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadSummary {
    pub files: usize,
    pub bytes: u64,
}
