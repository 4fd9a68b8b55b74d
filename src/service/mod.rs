//! Container Service boundary
//!
//! Everything that touches the testbed goes through [`ContainerService`].
//! Lease validation, scheduling, the address pool and the SSH daemon all
//! live on the other side of this trait.
//!
//! Two implementations ship with the crate:
//!
//! - [`HttpContainerService`] talks to the testbed REST API
//! - [`SimulatedTestbed`] keeps everything in process, for tests and dry runs

mod http;
mod simulated;

use std::sync::Arc;

use async_trait::async_trait;

use crate::container::{CommandOutput, Container, ContainerSpec, FloatingIp};
use crate::error::Result;

pub use http::{HttpContainerService, HttpContainerServiceBuilder, HttpServiceConfig};
pub use simulated::{ServiceCall, SimulatedTestbed, SimulatedTestbedBuilder};

/// Operations offered by the external Container Service.
///
/// Every call blocks until the service answers. Implementations do not
/// retry; the only polling happens in [`crate::wait`].
#[async_trait]
pub trait ContainerService: Send + Sync {
    /// Create a container.
    ///
    /// # Errors
    ///
    /// Returns [`crate::EdgeError::Conflict`] if the name is already taken.
    async fn create_container(&self, spec: &ContainerSpec) -> Result<Container>;

    /// Fetch the current view of a container.
    async fn get_container(&self, id: &str) -> Result<Container>;

    /// Look a container up by name.
    async fn find_container(&self, name: &str) -> Result<Option<Container>>;

    /// Destroy a container.
    ///
    /// # Errors
    ///
    /// Returns [`crate::EdgeError::NotFound`] if it is already gone.
    async fn destroy_container(&self, id: &str) -> Result<()>;

    /// Run a shell command inside the container. A non-zero exit status is
    /// reported in the output, not as an error.
    async fn execute(&self, id: &str, command: &str) -> Result<CommandOutput>;

    /// Write one file into the container.
    async fn upload_file(&self, id: &str, remote_path: &str, content: &[u8], mode: u32) -> Result<()>;

    /// Allocate a floating IP and associate it with the container.
    ///
    /// # Errors
    ///
    /// Returns [`crate::EdgeError::AddressPoolExhausted`] when the pool is empty.
    async fn associate_floating_ip(&self, container_id: &str) -> Result<FloatingIp>;

    /// Return a floating IP to the pool.
    async fn release_floating_ip(&self, id: &str) -> Result<()>;
}

#[async_trait]
impl ContainerService for Box<dyn ContainerService> {
    async fn create_container(&self, spec: &ContainerSpec) -> Result<Container> {
        (**self).create_container(spec).await
    }

    async fn get_container(&self, id: &str) -> Result<Container> {
        (**self).get_container(id).await
    }

    async fn find_container(&self, name: &str) -> Result<Option<Container>> {
        (**self).find_container(name).await
    }

    async fn destroy_container(&self, id: &str) -> Result<()> {
        (**self).destroy_container(id).await
    }

    async fn execute(&self, id: &str, command: &str) -> Result<CommandOutput> {
        (**self).execute(id, command).await
    }

    async fn upload_file(&self, id: &str, remote_path: &str, content: &[u8], mode: u32) -> Result<()> {
        (**self).upload_file(id, remote_path, content, mode).await
    }

    async fn associate_floating_ip(&self, container_id: &str) -> Result<FloatingIp> {
        (**self).associate_floating_ip(container_id).await
    }

    async fn release_floating_ip(&self, id: &str) -> Result<()> {
        (**self).release_floating_ip(id).await
    }
}

/// Lets a test keep a handle on a service it lends to a session.
#[async_trait]
impl<T: ContainerService + ?Sized> ContainerService for Arc<T> {
    async fn create_container(&self, spec: &ContainerSpec) -> Result<Container> {
        (**self).create_container(spec).await
    }

    async fn get_container(&self, id: &str) -> Result<Container> {
        (**self).get_container(id).await
    }

    async fn find_container(&self, name: &str) -> Result<Option<Container>> {
        (**self).find_container(name).await
    }

    async fn destroy_container(&self, id: &str) -> Result<()> {
        (**self).destroy_container(id).await
    }

    async fn execute(&self, id: &str, command: &str) -> Result<CommandOutput> {
        (**self).execute(id, command).await
    }

    async fn upload_file(&self, id: &str, remote_path: &str, content: &[u8], mode: u32) -> Result<()> {
        (**self).upload_file(id, remote_path, content, mode).await
    }

    async fn associate_floating_ip(&self, container_id: &str) -> Result<FloatingIp> {
        (**self).associate_floating_ip(container_id).await
    }

    async fn release_floating_ip(&self, id: &str) -> Result<()> {
        (**self).release_floating_ip(id).await
    }
}
