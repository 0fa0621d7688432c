//! Eviction of selected victims.
//!
//! The evaluator hands each victim of the winning candidate to an
//! [`EvictionHandler`]. Evictions are best effort: a failure is recorded in
//! the [`EvictionResult`] and never undoes evictions already issued.

use std::collections::BTreeSet;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::config::PreemptionConfig;
use crate::error::{PreemptionError, Result};
use crate::types::{Resources, Workload, WorkloadRef};

/// Handler for issuing workload evictions.
///
/// Implement this trait to integrate with your eviction API.
pub trait EvictionHandler: Send + Sync {
    /// Requests graceful eviction of a workload.
    ///
    /// # Errors
    ///
    /// Returns error if the eviction request cannot be issued.
    fn evict(&self, workload: &Workload, grace_period: Duration) -> Result<()>;
}

/// An eviction handler that records requests without acting on them.
#[derive(Debug, Default)]
pub struct NoOpEvictionHandler {
    evicted: RwLock<Vec<WorkloadRef>>,
    failing: RwLock<BTreeSet<WorkloadRef>>,
}

impl NoOpEvictionHandler {
    /// Creates a new no-op handler.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes evictions of the given workload fail (for testing).
    pub fn fail_on(&self, key: WorkloadRef) {
        self.failing.write().insert(key);
    }

    /// Workloads evicted so far, in request order.
    #[must_use]
    pub fn evicted(&self) -> Vec<WorkloadRef> {
        self.evicted.read().clone()
    }
}

impl EvictionHandler for NoOpEvictionHandler {
    fn evict(&self, workload: &Workload, _grace_period: Duration) -> Result<()> {
        if self.failing.read().contains(&workload.key) {
            return Err(PreemptionError::EvictionFailed {
                workload: workload.key.to_string(),
                reason: "eviction rejected".into(),
            });
        }
        debug!(workload = %workload.key, "NoOp eviction recorded");
        self.evicted.write().push(workload.key.clone());
        Ok(())
    }
}

/// Result of evicting a candidate's victims.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvictionResult {
    /// Workloads whose eviction was issued.
    pub evicted_workloads: Vec<WorkloadRef>,
    /// Resources the issued evictions will free.
    pub freed_resources: Resources,
    /// When the evictions were started.
    pub initiated_at: DateTime<Utc>,
    /// When the last eviction request returned.
    pub completed_at: Option<DateTime<Utc>>,
    /// Evictions that could not be issued.
    pub failures: Vec<EvictionFailure>,
}

impl EvictionResult {
    /// Creates an empty eviction result.
    #[must_use]
    pub fn new() -> Self {
        Self {
            evicted_workloads: Vec::new(),
            freed_resources: Resources::new(),
            initiated_at: Utc::now(),
            completed_at: None,
            failures: Vec::new(),
        }
    }

    /// Records an issued eviction.
    pub fn add_evicted(&mut self, workload: &Workload) {
        self.evicted_workloads.push(workload.key.clone());
        self.freed_resources = self.freed_resources.add(&workload.requests());
    }

    /// Records a failed eviction.
    pub fn add_failure(&mut self, failure: EvictionFailure) {
        self.failures.push(failure);
    }

    /// Marks the eviction as completed.
    pub fn complete(&mut self) {
        self.completed_at = Some(Utc::now());
    }

    /// Returns true if every eviction was issued.
    #[must_use]
    pub fn is_successful(&self) -> bool {
        self.failures.is_empty()
    }

    /// Returns the number of issued evictions.
    #[must_use]
    pub fn evicted_count(&self) -> usize {
        self.evicted_workloads.len()
    }
}

impl Default for EvictionResult {
    fn default() -> Self {
        Self::new()
    }
}

/// A victim whose eviction could not be issued.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvictionFailure {
    /// Workload that failed to evict.
    pub workload: WorkloadRef,
    /// Reason for the failure.
    pub reason: String,
    /// When the failure occurred.
    pub failed_at: DateTime<Utc>,
}

impl EvictionFailure {
    /// Creates a new eviction failure.
    #[must_use]
    pub fn new(workload: WorkloadRef, reason: impl Into<String>) -> Self {
        Self {
            workload,
            reason: reason.into(),
            failed_at: Utc::now(),
        }
    }
}

/// Issues evictions for every victim, continuing past failures.
pub fn evict_victims<H: EvictionHandler + ?Sized>(
    handler: &H,
    config: &PreemptionConfig,
    node_name: &str,
    victims: &[Workload],
) -> EvictionResult {
    let mut result = EvictionResult::new();

    for victim in victims {
        let grace_period = config.grace_period_for(victim.termination_grace_period);

        info!(
            workload = %victim.key,
            node = node_name,
            priority = victim.priority,
            grace_period_secs = grace_period.as_secs(),
            "evicting preemption victim"
        );

        match handler.evict(victim, grace_period) {
            Ok(()) => result.add_evicted(victim),
            Err(e) => {
                warn!(
                    workload = %victim.key,
                    node = node_name,
                    error = %e,
                    "failed to evict preemption victim"
                );
                result.add_failure(EvictionFailure::new(victim.key.clone(), e.to_string()));
            }
        }
    }

    result.complete();
    result
}
