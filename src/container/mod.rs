//! Container module: the data exchanged with the Container Service
//!
//! - [`Container`], [`ContainerSpec`] and [`ContainerState`] describe a
//!   sandboxed environment on a leased edge device
//! - [`FloatingIp`] is the public address attached to it
//! - [`ContainerRegistry`] tracks both for an in-process service

mod registry;
mod types;

pub use registry::ContainerRegistry;
pub use types::{
    CommandOutput, Container, ContainerSpec, ContainerState, FloatingIp, ReservationId, UploadSummary,
};
