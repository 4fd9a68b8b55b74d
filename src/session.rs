//! Provisioning session
//!
//! A [`ProvisioningSession`] owns the container and floating IP it creates
//! and enforces the order in which the testbed may be used:
//!
//! - commands and uploads only reach the service once the container is active
//! - a floating IP is only attached to an active container
//! - SSH access is only claimed after the key is installed and sshd runs
//! - teardown destroys the container before releasing its address
//!
//! Lifecycle: `new` → `create_container` → `wait_until_active` → use →
//! `teardown`.

use std::path::Path;

use tracing::{info, instrument, warn};

use crate::container::{CommandOutput, Container, ContainerSpec, FloatingIp, UploadSummary};
use crate::error::{EdgeError, Result};
use crate::service::ContainerService;
use crate::ssh;
use crate::transfer;
use crate::wait::{self, Backoff};

pub struct ProvisioningSession<S> {
    service: S,
    backoff: Backoff,
    container: Option<Container>,
    address: Option<FloatingIp>,
    ssh_ready: bool,
}

impl<S: ContainerService> ProvisioningSession<S> {
    pub fn new(service: S, backoff: Backoff) -> Self {
        Self {
            service,
            backoff,
            container: None,
            address: None,
            ssh_ready: false,
        }
    }

    /// Adopt a container created by an earlier run
    pub async fn resume(service: S, backoff: Backoff, container_id: &str) -> Result<Self> {
        let container = service.get_container(container_id).await?;
        let mut session = Self::new(service, backoff);
        session.container = Some(container);
        Ok(session)
    }

    pub fn service(&self) -> &S {
        &self.service
    }

    pub fn container(&self) -> Option<&Container> {
        self.container.as_ref()
    }

    pub fn address(&self) -> Option<&FloatingIp> {
        self.address.as_ref()
    }

    pub fn ssh_ready(&self) -> bool {
        self.ssh_ready
    }

    fn container_id(&self) -> Result<&str> {
        self.container
            .as_ref()
            .map(|c| c.id.as_str())
            .ok_or_else(|| EdgeError::NotFound("no container in this session".to_string()))
    }

    fn active_container_id(&self) -> Result<&str> {
        match self.container {
            Some(ref c) if c.is_active() => Ok(&c.id),
            Some(ref c) => Err(EdgeError::NotActive(c.id.clone())),
            None => Err(EdgeError::NotFound("no container in this session".to_string())),
        }
    }

    /// Request a new container.
    ///
    /// # Errors
    ///
    /// [`EdgeError::Conflict`] if the name is taken; see
    /// [`EdgeError::remediation`] for the hint to show the user.
    #[instrument(skip(self, spec), fields(name = %spec.name))]
    pub async fn create_container(&mut self, spec: &ContainerSpec) -> Result<&Container> {
        if let Some(ref existing) = self.container {
            return Err(EdgeError::Config(format!(
                "session already owns container {}",
                existing.id
            )));
        }
        let container = self.service.create_container(spec).await?;
        info!(id = %container.id, "Container requested");
        Ok(&*self.container.insert(container))
    }

    /// Block until the container is active, within the session's backoff deadline
    pub async fn wait_until_active(&mut self) -> Result<&Container> {
        let id = self.container_id()?.to_string();
        let container = wait::wait_until_active(&self.service, &id, &self.backoff).await?;
        Ok(&*self.container.insert(container))
    }

    /// Associate a floating IP with the active container
    #[instrument(skip(self))]
    pub async fn attach_address(&mut self) -> Result<&FloatingIp> {
        if let Some(ref address) = self.address {
            return Err(EdgeError::Config(format!(
                "session already holds floating ip {}",
                address.address
            )));
        }
        let id = self.active_container_id()?.to_string();
        let address = self.service.associate_floating_ip(&id).await?;
        info!(address = %address.address, "Floating IP attached");
        Ok(&*self.address.insert(address))
    }

    /// Run a shell command. A non-zero exit status is returned, not raised.
    pub async fn run_command(&self, command: &str) -> Result<CommandOutput> {
        let id = self.active_container_id()?;
        self.service.execute(id, command).await
    }

    /// Copy a local directory into the container
    pub async fn upload_directory(&self, local: &Path, remote: &str) -> Result<UploadSummary> {
        let id = self.active_container_id()?;
        transfer::upload_directory(&self.service, id, local, remote).await
    }

    /// Install `public_key` for root and start sshd
    #[instrument(skip(self, public_key))]
    pub async fn setup_ssh(&mut self, public_key: &str) -> Result<()> {
        let mut last = None;
        for command in ssh::setup_commands(public_key) {
            let output = self.run_command(&command).await?;
            last = Some(output.require_success(&command)?);
        }
        let status = last.map(|o| o.output).unwrap_or_default();
        if !ssh::is_running(&status) {
            return Err(EdgeError::SshNotReady(format!(
                "`{}` did not report a running daemon: {}",
                ssh::STATUS_COMMAND,
                status.trim()
            )));
        }
        self.ssh_ready = true;
        info!("SSH daemon running");
        Ok(())
    }

    /// `ssh root@<floating ip>`, once both SSH and the address are in place
    pub fn ssh_endpoint(&self) -> Result<String> {
        if !self.ssh_ready {
            return Err(EdgeError::SshNotReady("key not installed or sshd not started".to_string()));
        }
        let address = self
            .address
            .as_ref()
            .ok_or_else(|| EdgeError::SshNotReady("no floating ip attached".to_string()))?;
        Ok(ssh::login_command(&address.address))
    }

    /// Destroy the session's container.
    ///
    /// # Errors
    ///
    /// A second call fails with [`EdgeError::NotFound`].
    #[instrument(skip(self))]
    pub async fn destroy_container(&mut self) -> Result<()> {
        let id = self.container_id()?.to_string();
        let result = self.service.destroy_container(&id).await;
        if result.is_ok() || matches!(result, Err(EdgeError::NotFound(_))) {
            self.container = None;
            self.ssh_ready = false;
        }
        result
    }

    /// Return the session's floating IP to the pool
    #[instrument(skip(self))]
    pub async fn release_address(&mut self) -> Result<()> {
        let id = self
            .address
            .as_ref()
            .map(|a| a.id.clone())
            .ok_or_else(|| EdgeError::NotFound("no floating ip in this session".to_string()))?;
        let result = self.service.release_floating_ip(&id).await;
        if result.is_ok() || matches!(result, Err(EdgeError::NotFound(_))) {
            self.address = None;
        }
        result
    }

    /// Destroy the container, then release the address. The address is only
    /// released once the container is gone, or was already gone.
    pub async fn teardown(&mut self) -> Result<()> {
        let mut failures = Vec::new();

        if self.container.is_some() {
            if let Err(e) = self.destroy_container().await {
                warn!("Destroying container failed: {}", e);
                failures.push(e.to_string());
            }
        }
        // the address may only go back to the pool once the container is gone
        let kept = match (&self.container, &self.address) {
            (Some(container), Some(address)) => Some(format!(
                "floating ip {} ({}) kept because container {} was not destroyed",
                address.id, address.address, container.id
            )),
            _ => None,
        };
        if let Some(kept) = kept {
            warn!("{}", kept);
            failures.push(kept);
        } else if self.address.is_some() {
            if let Err(e) = self.release_address().await {
                warn!("Releasing floating IP failed: {}", e);
                failures.push(e.to_string());
            }
        }

        if failures.is_empty() {
            info!("Teardown complete");
            Ok(())
        } else {
            Err(EdgeError::Teardown(failures))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::container::ReservationId;
    use crate::service::SimulatedTestbed;

    fn spec() -> ContainerSpec {
        ContainerSpec::new("alice-edge-cpu", "python:3.9-slim", ReservationId::new("lease").unwrap()).expose(22)
    }

    #[tokio::test]
    async fn test_commands_rejected_before_active() {
        let mut session = ProvisioningSession::new(SimulatedTestbed::new(), Backoff::default());
        session.create_container(&spec()).await.unwrap();

        assert!(matches!(session.run_command("true").await, Err(EdgeError::NotActive(_))));
        assert!(matches!(session.attach_address().await, Err(EdgeError::NotActive(_))));
        assert!(session.service().trace().iter().all(|c| !matches!(
            c,
            crate::service::ServiceCall::Execute { .. } | crate::service::ServiceCall::AttachIp { .. }
        )));
    }

    #[tokio::test]
    async fn test_no_container_yet() {
        let session = ProvisioningSession::new(SimulatedTestbed::new(), Backoff::default());
        assert!(matches!(session.run_command("true").await, Err(EdgeError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_second_create_refused() {
        let mut session = ProvisioningSession::new(SimulatedTestbed::new(), Backoff::default());
        session.create_container(&spec()).await.unwrap();
        assert!(matches!(
            session.create_container(&spec()).await,
            Err(EdgeError::Config(_))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_endpoint_needs_ssh_and_address() {
        let mut session = ProvisioningSession::new(SimulatedTestbed::new(), Backoff::default());
        session.create_container(&spec()).await.unwrap();
        session.wait_until_active().await.unwrap();

        assert!(matches!(session.ssh_endpoint(), Err(EdgeError::SshNotReady(_))));
        session.attach_address().await.unwrap();
        assert!(matches!(session.ssh_endpoint(), Err(EdgeError::SshNotReady(_))));

        session.setup_ssh("ssh-ed25519 AAAA alice@laptop").await.unwrap();
        assert_eq!(session.ssh_endpoint().unwrap(), "ssh root@192.5.87.10");
    }

    #[tokio::test(start_paused = true)]
    async fn test_ssh_setup_failure_is_fatal() {
        let testbed = SimulatedTestbed::builder().fail_command("apt-get", 100).build();
        let mut session = ProvisioningSession::new(testbed, Backoff::default());
        session.create_container(&spec()).await.unwrap();
        session.wait_until_active().await.unwrap();

        let err = session.setup_ssh("ssh-rsa AAAA").await.unwrap_err();
        assert!(matches!(err, EdgeError::CommandFailed { exit_status: 100, .. }));
        assert!(!session.ssh_ready());
    }

    #[tokio::test(start_paused = true)]
    async fn test_teardown_empties_session() {
        let mut session = ProvisioningSession::new(SimulatedTestbed::new(), Backoff::default());
        session.create_container(&spec()).await.unwrap();
        session.wait_until_active().await.unwrap();
        session.attach_address().await.unwrap();

        session.teardown().await.unwrap();
        assert!(session.container().is_none());
        assert!(session.address().is_none());
        assert_eq!(session.service().live_containers(), 0);
        assert_eq!(session.service().allocated_addresses(), 0);

        // nothing left to do
        session.teardown().await.unwrap();
    }
}
