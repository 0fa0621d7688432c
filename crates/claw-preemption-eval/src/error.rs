//! Error types for the preemption evaluator.

use thiserror::Error;

/// Result type for preemption operations.
pub type Result<T> = std::result::Result<T, PreemptionError>;

/// Errors that can occur while evaluating preemption.
///
/// Per-node problems during the dry run are not surfaced through this type
/// directly; they are captured as node statuses so sibling nodes keep going.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PreemptionError {
    /// The cluster snapshot contained no nodes.
    #[error("no nodes available to schedule workloads")]
    NoNodesAvailable,

    /// The feasibility filter failed to evaluate a node.
    #[error("filter failed on node {node}: {reason}")]
    FilterFailed {
        /// Node the filter was running against.
        node: String,
        /// Description of the failure.
        reason: String,
    },

    /// A dry-run simulation on a node failed.
    #[error("preemption simulation failed on node {node}: {reason}")]
    SimulationFailed {
        /// Node the simulation was running on.
        node: String,
        /// Description of the failure.
        reason: String,
    },

    /// Issuing an eviction for a victim failed.
    #[error("eviction of {workload} failed: {reason}")]
    EvictionFailed {
        /// Workload that could not be evicted.
        workload: String,
        /// Description of why the eviction failed.
        reason: String,
    },

    /// Invalid evaluator configuration.
    #[error("invalid preemption config: {reason}")]
    InvalidConfig {
        /// Description of why the configuration is invalid.
        reason: String,
    },
}
