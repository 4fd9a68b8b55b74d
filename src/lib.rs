//! edgeprov - provision an edge testbed container and run inference on it
//!
//! The crate walks through one experiment on an edge-computing testbed:
//! create a container on a leased device, wait for it to come up, attach a
//! floating IP, install SSH access, upload an image-classification bundle,
//! run the model remotely, and tear everything down.
//!
//! The testbed itself sits behind [`ContainerService`]. Use
//! [`HttpContainerService`] against a real deployment or
//! [`SimulatedTestbed`] to try the flow locally.
//!
//! # Example
//!
//! ```no_run
//! use edgeprov::{ReservationId, RunOptions, Sequencer, SimulatedTestbed};
//!
//! # async fn demo() -> edgeprov::Result<()> {
//! let options = RunOptions::new(
//!     "alice-edge-cpu",
//!     ReservationId::new("4f0c2d8e-lease")?,
//!     "ssh-ed25519 AAAA... alice@laptop",
//!     "./image_model",
//! );
//! let report = Sequencer::new(SimulatedTestbed::new(), options).run().await?;
//! println!("{:?}", report.inference);
//! # Ok(())
//! # }
//! ```

pub mod cli;
pub mod config;
pub mod container;
pub mod error;
pub mod inference;
pub mod naming;
pub mod output;
pub mod sequencer;
pub mod service;
pub mod session;
pub mod shell;
pub mod ssh;
pub mod transfer;
pub mod wait;

pub use config::Config;
pub use container::{CommandOutput, Container, ContainerSpec, ContainerState, FloatingIp, ReservationId, UploadSummary};
pub use error::{EdgeError, Result};
pub use inference::{InferenceJob, InferenceReport};
pub use output::{format_output, OutputFormat, Report};
pub use sequencer::{RunOptions, RunReport, Sequencer, Step, StepReport};
pub use service::{ContainerService, HttpContainerService, SimulatedTestbed};
pub use session::ProvisioningSession;
pub use wait::Backoff;
