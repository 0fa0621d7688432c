//! Evaluator configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{PreemptionError, Result};
use crate::status::ReasonTable;

/// Configuration for preemption evaluation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PreemptionConfig {
    /// Whether preemption is enabled at all.
    pub enabled: bool,
    /// Share of potential nodes to dry-run, in percent (0-100).
    pub min_candidate_nodes_percentage: u32,
    /// Lower bound on nodes to dry-run, regardless of the percentage.
    pub min_candidate_nodes_absolute: u32,
    /// Maximum number of concurrent node simulations.
    pub parallelism: usize,
    /// Whether ranking prefers candidates with fewer graceful-eviction victims.
    pub rank_by_graceful_eviction: bool,
    /// Grace period for victims that do not request one.
    pub default_grace_period: Duration,
    /// Upper bound on any victim's grace period.
    pub max_grace_period: Duration,
    /// Failure reason classification.
    pub reason_table: ReasonTable,
}

impl Default for PreemptionConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            min_candidate_nodes_percentage: 10,
            min_candidate_nodes_absolute: 100,
            parallelism: 16,
            rank_by_graceful_eviction: true,
            default_grace_period: Duration::from_secs(30),
            max_grace_period: Duration::from_secs(300),
            reason_table: ReasonTable::default(),
        }
    }
}

impl PreemptionConfig {
    /// Creates a new config with defaults.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses a JSON document and validates the result. Missing fields take
    /// their default values.
    ///
    /// # Errors
    ///
    /// Returns error if the document is malformed or the values are invalid.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self =
            serde_json::from_str(json).map_err(|e| PreemptionError::InvalidConfig {
                reason: e.to_string(),
            })?;
        config.validate()?;
        Ok(config)
    }

    /// Checks the configuration for inconsistent values.
    ///
    /// # Errors
    ///
    /// Returns error describing the first invalid setting found.
    pub fn validate(&self) -> Result<()> {
        if self.min_candidate_nodes_percentage > 100 {
            return Err(PreemptionError::InvalidConfig {
                reason: format!(
                    "min_candidate_nodes_percentage {} is not in range 0-100",
                    self.min_candidate_nodes_percentage
                ),
            });
        }
        if self.min_candidate_nodes_percentage == 0 && self.min_candidate_nodes_absolute == 0 {
            return Err(PreemptionError::InvalidConfig {
                reason: "min_candidate_nodes_percentage and min_candidate_nodes_absolute cannot both be zero".into(),
            });
        }
        if self.parallelism == 0 {
            return Err(PreemptionError::InvalidConfig {
                reason: "parallelism must be positive".into(),
            });
        }
        if self.default_grace_period > self.max_grace_period {
            return Err(PreemptionError::InvalidConfig {
                reason: "default_grace_period exceeds max_grace_period".into(),
            });
        }
        Ok(())
    }

    /// Enables or disables preemption.
    #[must_use]
    pub const fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// Sets the candidate node percentage.
    #[must_use]
    pub const fn with_min_candidate_nodes_percentage(mut self, percentage: u32) -> Self {
        self.min_candidate_nodes_percentage = percentage;
        self
    }

    /// Sets the absolute candidate node minimum.
    #[must_use]
    pub const fn with_min_candidate_nodes_absolute(mut self, absolute: u32) -> Self {
        self.min_candidate_nodes_absolute = absolute;
        self
    }

    /// Sets the dry-run parallelism.
    #[must_use]
    pub const fn with_parallelism(mut self, parallelism: usize) -> Self {
        self.parallelism = parallelism;
        self
    }

    /// Sets whether graceful-eviction markers take part in ranking.
    #[must_use]
    pub const fn with_rank_by_graceful_eviction(mut self, enabled: bool) -> Self {
        self.rank_by_graceful_eviction = enabled;
        self
    }

    /// Sets the default grace period.
    #[must_use]
    pub const fn with_default_grace_period(mut self, duration: Duration) -> Self {
        self.default_grace_period = duration;
        self
    }

    /// Sets the maximum grace period.
    #[must_use]
    pub const fn with_max_grace_period(mut self, duration: Duration) -> Self {
        self.max_grace_period = duration;
        self
    }

    /// Replaces the reason table.
    #[must_use]
    pub fn with_reason_table(mut self, table: ReasonTable) -> Self {
        self.reason_table = table;
        self
    }

    /// Grace period to give a victim, capped at the maximum.
    #[must_use]
    pub fn grace_period_for(&self, requested: Option<Duration>) -> Duration {
        requested
            .unwrap_or(self.default_grace_period)
            .min(self.max_grace_period)
    }
}
