//! Container registry
//!
//! Book-keeping for containers and floating IPs held by an in-process
//! Container Service. Names are unique among live containers; destroyed
//! containers are forgotten, so a second destroy reports `NotFound`.

use std::collections::HashMap;

use chrono::Utc;

use super::types::{Container, ContainerSpec, ContainerState, FloatingIp};
use crate::error::{EdgeError, Result};

/// Live containers and address allocations, keyed by id
#[derive(Debug)]
pub struct ContainerRegistry {
    containers: HashMap<String, Container>,
    addresses: HashMap<String, FloatingIp>,
    /// Addresses not yet handed out
    pool: Vec<String>,
    next_id: u64,
}

impl ContainerRegistry {
    /// Create a registry with the given address pool
    pub fn new(pool: Vec<String>) -> Self {
        Self {
            containers: HashMap::new(),
            addresses: HashMap::new(),
            // handed out from the back, so reverse to keep the caller's order
            pool: pool.into_iter().rev().collect(),
            next_id: 1,
        }
    }

    fn allocate_id(&mut self, prefix: &str) -> String {
        let id = format!("{}-{:04}", prefix, self.next_id);
        self.next_id += 1;
        id
    }

    /// Register a new container in the `requested` state
    pub fn create(&mut self, spec: &ContainerSpec) -> Result<Container> {
        if self.find_by_name(&spec.name).is_some() {
            return Err(EdgeError::Conflict {
                name: spec.name.clone(),
            });
        }

        let container = Container {
            id: self.allocate_id("ctr"),
            name: spec.name.clone(),
            image: spec.image.clone(),
            reservation_id: spec.reservation_id.clone(),
            exposed_ports: spec.exposed_ports.clone(),
            state: ContainerState::Requested,
            status_reason: None,
            created_at: Utc::now(),
        };
        self.containers.insert(container.id.clone(), container.clone());
        Ok(container)
    }

    pub fn get(&self, id: &str) -> Result<&Container> {
        self.containers
            .get(id)
            .ok_or_else(|| EdgeError::NotFound(format!("container {}", id)))
    }

    pub fn get_mut(&mut self, id: &str) -> Result<&mut Container> {
        self.containers
            .get_mut(id)
            .ok_or_else(|| EdgeError::NotFound(format!("container {}", id)))
    }

    pub fn find_by_name(&self, name: &str) -> Option<&Container> {
        self.containers.values().find(|c| c.name == name)
    }

    /// Remove a container. Addresses still pointing at it stay allocated
    /// until released.
    pub fn destroy(&mut self, id: &str) -> Result<Container> {
        let mut container = self
            .containers
            .remove(id)
            .ok_or_else(|| EdgeError::NotFound(format!("container {}", id)))?;
        container.state = ContainerState::Destroyed;
        Ok(container)
    }

    /// Hand out an address from the pool
    pub fn allocate_address(&mut self, container_id: &str) -> Result<FloatingIp> {
        self.get(container_id)?;
        let address = self.pool.pop().ok_or(EdgeError::AddressPoolExhausted)?;
        let ip = FloatingIp {
            id: self.allocate_id("fip"),
            address,
            container_id: container_id.to_string(),
        };
        self.addresses.insert(ip.id.clone(), ip.clone());
        Ok(ip)
    }

    /// Return an address to the pool
    pub fn release_address(&mut self, id: &str) -> Result<FloatingIp> {
        let ip = self
            .addresses
            .remove(id)
            .ok_or_else(|| EdgeError::NotFound(format!("floating ip {}", id)))?;
        self.pool.push(ip.address.clone());
        Ok(ip)
    }

    /// Number of live containers
    pub fn count(&self) -> usize {
        self.containers.len()
    }

    /// Number of addresses currently handed out
    pub fn allocated_addresses(&self) -> usize {
        self.addresses.len()
    }
}

impl Default for ContainerRegistry {
    fn default() -> Self {
        Self::new(vec!["192.5.87.10".to_string()])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::container::ReservationId;

    fn spec(name: &str) -> ContainerSpec {
        ContainerSpec::new(name, "python:3.9-slim", ReservationId::new("lease").unwrap())
    }

    #[test]
    fn test_registry_create() {
        let mut registry = ContainerRegistry::default();
        let c = registry.create(&spec("test")).unwrap();
        assert_eq!(c.state, ContainerState::Requested);
        assert_eq!(registry.count(), 1);
        assert!(registry.find_by_name("test").is_some());
    }

    #[test]
    fn test_registry_create_duplicate() {
        let mut registry = ContainerRegistry::default();
        registry.create(&spec("test")).unwrap();
        let result = registry.create(&spec("test"));
        assert!(matches!(result, Err(EdgeError::Conflict { .. })));
    }

    #[test]
    fn test_registry_destroy_twice() {
        let mut registry = ContainerRegistry::default();
        let c = registry.create(&spec("test")).unwrap();
        let gone = registry.destroy(&c.id).unwrap();
        assert_eq!(gone.state, ContainerState::Destroyed);
        assert!(matches!(registry.destroy(&c.id), Err(EdgeError::NotFound(_))));
        // the name is free again
        assert!(registry.create(&spec("test")).is_ok());
    }

    #[test]
    fn test_registry_pool() {
        let mut registry = ContainerRegistry::new(vec!["10.0.0.1".into(), "10.0.0.2".into()]);
        let c = registry.create(&spec("test")).unwrap();
        let a = registry.allocate_address(&c.id).unwrap();
        let b = registry.allocate_address(&c.id).unwrap();
        assert_eq!(a.address, "10.0.0.1");
        assert_eq!(b.address, "10.0.0.2");
        assert!(matches!(
            registry.allocate_address(&c.id),
            Err(EdgeError::AddressPoolExhausted)
        ));

        registry.release_address(&a.id).unwrap();
        assert_eq!(registry.allocated_addresses(), 1);
        assert!(registry.allocate_address(&c.id).is_ok());
    }

    #[test]
    fn test_registry_release_unknown() {
        let mut registry = ContainerRegistry::default();
        assert!(matches!(registry.release_address("fip-9"), Err(EdgeError::NotFound(_))));
    }
}
