//! Resource State Verifier: bounded polling until a cluster object reaches a
//! target state.

use idp_core::{ResourceRef, ResourceState};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::clock::Clock;
use crate::collaborators::ClusterClient;

/// Deadline and cadence for one wait.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    pub timeout: Duration,
    pub interval: Duration,
}

impl PollPolicy {
    pub fn new(timeout: Duration, interval: Duration) -> Self {
        Self { timeout, interval }
    }

    /// `retries` polls spaced `interval` apart.
    pub fn from_retries(retries: u32, interval: Duration) -> Self {
        Self {
            timeout: interval * retries,
            interval,
        }
    }
}

pub struct StateVerifier {
    cluster: Arc<dyn ClusterClient>,
    clock: Arc<dyn Clock>,
}

impl StateVerifier {
    pub fn new(cluster: Arc<dyn ClusterClient>, clock: Arc<dyn Clock>) -> Self {
        Self { cluster, clock }
    }

    /// Poll `resource` until it is observed in `target`.
    ///
    /// Returns `target` on success or [`ResourceState::Stuck`] once the
    /// deadline passes. Query failures are logged and retried, never raised.
    pub async fn wait_for(
        &self,
        resource: &ResourceRef,
        target: ResourceState,
        policy: PollPolicy,
    ) -> ResourceState {
        let deadline = self.clock.now() + policy.timeout;
        let mut last = None;

        loop {
            match self.cluster.get_resource(resource).await {
                Ok(lookup) => {
                    let observed = lookup.state();
                    if observed == target {
                        info!(resource = %resource, state = %observed, "Target state reached");
                        return target;
                    }
                    if last != Some(observed) {
                        debug!(resource = %resource, state = %observed, target = %target, "Waiting");
                        last = Some(observed);
                    }
                }
                Err(e) => {
                    warn!(resource = %resource, error = %e, "Status query failed, retrying");
                }
            }

            let now = self.clock.now();
            if now >= deadline {
                break;
            }
            self.clock
                .sleep(policy.interval.min(deadline - now))
                .await;
        }

        warn!(
            resource = %resource,
            target = %target,
            last = last.map(|s| s.as_str()).unwrap_or("unknown"),
            timeout_secs = policy.timeout.as_secs(),
            "Resource did not reach target state before deadline"
        );
        ResourceState::Stuck
    }
}
