//! Filter verdicts and failure-reason classification.
//!
//! A [`Status`] is what the feasibility filter reports for a workload on a
//! node. The [`ReasonTable`] decides whether a failing status could be fixed
//! by evicting workloads from that node.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

/// Well-known failure reasons reported by admission filters.
pub mod reasons {
    /// Node selector or required node affinity does not match.
    pub const NODE_AFFINITY_NOT_MATCH: &str = "NodeAffinityNotMatch";
    /// Workload is pinned to a different node name.
    pub const NODE_NAME_NOT_MATCH: &str = "NodeNameNotMatch";
    /// Workload does not tolerate a taint on the node.
    pub const TAINT_TOLERATION_NOT_MATCH: &str = "TaintTolerationNotMatch";
    /// Required inter-workload affinity is not satisfied.
    pub const AFFINITY_RULES_NOT_MATCH: &str = "AffinityRulesNotMatch";
    /// Inter-workload anti-affinity is violated by an existing occupant.
    pub const ANTI_AFFINITY_RULES_NOT_MATCH: &str = "AntiAffinityRulesNotMatch";
    /// A volume is already mounted in a conflicting way.
    pub const DISK_CONFLICT: &str = "DiskConflict";
    /// Volume zone does not match the node's zone.
    pub const VOLUME_ZONE_CONFLICT: &str = "VolumeZoneConflict";
    /// Volume node affinity does not match the node.
    pub const VOLUME_NODE_CONFLICT: &str = "VolumeNodeAffinityConflict";
    /// Volume cannot be bound on the node.
    pub const VOLUME_BIND_CONFLICT: &str = "VolumeBindConflict";
    /// Node is not ready.
    pub const NODE_NOT_READY: &str = "NodeNotReady";
    /// Node reports an unknown condition.
    pub const NODE_UNKNOWN_CONDITION: &str = "NodeUnknownCondition";
    /// Node lacks a label required by a topology spread constraint.
    pub const NODE_LABEL_NOT_MATCH: &str = "NodeLabelNotMatch";
    /// Node is cordoned.
    pub const NODE_UNSCHEDULABLE: &str = "NodeUnschedulable";
    /// Topology spread skew would be exceeded.
    pub const TOPOLOGY_SPREAD_NOT_MATCH: &str = "TopologySpreadConstraintsNotMatch";
    /// Node lacks free capacity.
    pub const INSUFFICIENT_RESOURCES: &str = "InsufficientResources";
    /// A requested host port is in use.
    pub const HOST_PORT_CONFLICT: &str = "HostPortConflict";
    /// Recorded for nodes the evaluator skipped as unresolvable.
    pub const PREEMPTION_NOT_HELPFUL: &str = "Preemption is not helpful for scheduling";
    /// Recorded for nodes where evicting every eligible occupant is not enough.
    pub const NO_VICTIMS_FOUND: &str = "No preemption victims found for incoming workload";
}

/// Outcome class of a filter run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum StatusCode {
    /// The workload fits.
    #[default]
    Success,
    /// The workload does not fit; removing workloads might help.
    Unschedulable,
    /// The workload does not fit and removing workloads will not help.
    UnschedulableAndUnresolvable,
    /// The filter itself failed.
    Error,
}

/// A filter verdict: a code plus the reasons behind it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Status {
    /// Outcome class.
    pub code: StatusCode,
    /// Human readable reasons, most specific first.
    pub reasons: Vec<String>,
}

impl Status {
    /// A successful verdict.
    #[must_use]
    pub fn success() -> Self {
        Self::default()
    }

    /// Creates a verdict with a single reason.
    #[must_use]
    pub fn new(code: StatusCode, reason: impl Into<String>) -> Self {
        Self {
            code,
            reasons: vec![reason.into()],
        }
    }

    /// An `Unschedulable` verdict.
    #[must_use]
    pub fn unschedulable(reason: impl Into<String>) -> Self {
        Self::new(StatusCode::Unschedulable, reason)
    }

    /// An `UnschedulableAndUnresolvable` verdict.
    #[must_use]
    pub fn unresolvable(reason: impl Into<String>) -> Self {
        Self::new(StatusCode::UnschedulableAndUnresolvable, reason)
    }

    /// An `Error` verdict.
    #[must_use]
    pub fn error(reason: impl Into<String>) -> Self {
        Self::new(StatusCode::Error, reason)
    }

    /// Adds another reason.
    #[must_use]
    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reasons.push(reason.into());
        self
    }

    /// Returns true for `Success`.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.code == StatusCode::Success
    }

    /// The primary reason, or an empty string.
    #[must_use]
    pub fn reason(&self) -> &str {
        self.reasons.first().map_or("", String::as_str)
    }
}

/// Classification of failure reasons.
///
/// Reasons not listed are treated as resolvable, so new filter plugins do
/// not silently disable preemption.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReasonTable {
    /// Reasons eviction cannot fix.
    pub unresolvable: BTreeSet<String>,
    /// Reasons eviction can fix even under `UnschedulableAndUnresolvable`.
    pub always_resolvable: BTreeSet<String>,
}

impl Default for ReasonTable {
    fn default() -> Self {
        let unresolvable = [
            reasons::NODE_AFFINITY_NOT_MATCH,
            reasons::NODE_NAME_NOT_MATCH,
            reasons::TAINT_TOLERATION_NOT_MATCH,
            reasons::AFFINITY_RULES_NOT_MATCH,
            reasons::DISK_CONFLICT,
            reasons::VOLUME_ZONE_CONFLICT,
            reasons::VOLUME_NODE_CONFLICT,
            reasons::VOLUME_BIND_CONFLICT,
            reasons::NODE_NOT_READY,
            reasons::NODE_UNKNOWN_CONDITION,
            reasons::NODE_LABEL_NOT_MATCH,
            reasons::NODE_UNSCHEDULABLE,
        ];
        Self {
            unresolvable: unresolvable.iter().map(ToString::to_string).collect(),
            always_resolvable: std::iter::once(reasons::ANTI_AFFINITY_RULES_NOT_MATCH.to_string())
                .collect(),
        }
    }
}

impl ReasonTable {
    /// An empty table: every reason is resolvable.
    #[must_use]
    pub fn empty() -> Self {
        Self {
            unresolvable: BTreeSet::new(),
            always_resolvable: BTreeSet::new(),
        }
    }

    /// Marks an additional reason as unresolvable.
    #[must_use]
    pub fn with_unresolvable(mut self, reason: impl Into<String>) -> Self {
        self.unresolvable.insert(reason.into());
        self
    }

    /// Returns true if evicting workloads could turn `status` into a success.
    ///
    /// Every reason counts: one unresolvable reason rules the node out, and
    /// an `UnschedulableAndUnresolvable` status is only overridden when all
    /// of its reasons are always resolvable.
    #[must_use]
    pub fn might_help(&self, status: &Status) -> bool {
        match status.code {
            StatusCode::UnschedulableAndUnresolvable => {
                !status.reasons.is_empty()
                    && status
                        .reasons
                        .iter()
                        .all(|r| self.always_resolvable.contains(r))
            }
            _ => !status.reasons.iter().any(|r| self.unresolvable.contains(r)),
        }
    }
}
