//! Waiting for a container to become active
//!
//! The Container Service only offers a point-in-time view, so readiness is
//! polled. Delays grow exponentially up to a cap and the whole wait is
//! bounded by a deadline; running past it is a `ProvisioningTimeout`.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tracing::{debug, info, instrument};

use crate::container::{Container, ContainerState};
use crate::error::{EdgeError, Result};
use crate::service::ContainerService;

/// Polling schedule for [`wait_until_active`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Backoff {
    /// Delay after the first unsuccessful poll
    pub initial: Duration,
    /// Growth factor between consecutive delays
    pub multiplier: u32,
    /// Upper bound on a single delay
    pub max_interval: Duration,
    /// Upper bound on the whole wait
    pub deadline: Duration,
}

impl Default for Backoff {
    fn default() -> Self {
        Self {
            initial: Duration::from_secs(1),
            multiplier: 2,
            max_interval: Duration::from_secs(15),
            deadline: Duration::from_secs(300),
        }
    }
}

impl Backoff {
    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = deadline;
        self
    }

    /// Delay to use after `delay`
    fn next(&self, delay: Duration) -> Duration {
        delay.saturating_mul(self.multiplier.max(1)).min(self.max_interval)
    }
}

/// Poll until the container is active.
///
/// # Errors
///
/// - [`EdgeError::ProvisioningFailed`] if the service reports `error` or the
///   container disappears after the first successful poll
/// - [`EdgeError::NotFound`] if the first poll does not find the container
/// - [`EdgeError::ProvisioningTimeout`] once `backoff.deadline` has passed
#[instrument(skip(service, backoff), fields(deadline = ?backoff.deadline))]
pub async fn wait_until_active<S>(service: &S, container_id: &str, backoff: &Backoff) -> Result<Container>
where
    S: ContainerService + ?Sized,
{
    let started = Instant::now();
    let mut delay = backoff.initial;
    let mut polls = 0u32;

    loop {
        polls += 1;
        let container = match service.get_container(container_id).await {
            Ok(container) => container,
            // NotFound on the first poll is passed through as is
            Err(EdgeError::NotFound(_)) if polls > 1 => {
                return Err(EdgeError::ProvisioningFailed {
                    container: container_id.to_string(),
                    reason: "disappeared while waiting".to_string(),
                })
            }
            Err(e) => return Err(e),
        };

        match container.state {
            ContainerState::Active => {
                info!(polls, waited = ?started.elapsed(), "Container is active");
                return Ok(container);
            }
            ContainerState::Error => {
                return Err(EdgeError::ProvisioningFailed {
                    container: container_id.to_string(),
                    reason: container
                        .status_reason
                        .unwrap_or_else(|| "service reported an error".to_string()),
                });
            }
            ContainerState::Destroyed => {
                return Err(EdgeError::ProvisioningFailed {
                    container: container_id.to_string(),
                    reason: "destroyed while waiting".to_string(),
                });
            }
            ContainerState::Requested => {}
        }

        let elapsed = started.elapsed();
        if elapsed >= backoff.deadline {
            return Err(EdgeError::ProvisioningTimeout {
                container: container_id.to_string(),
                waited: elapsed,
            });
        }

        let sleep_for = delay.min(backoff.deadline - elapsed);
        debug!(polls, ?sleep_for, "Container not active yet");
        tokio::time::sleep(sleep_for).await;
        delay = backoff.next(delay);
    }
}
