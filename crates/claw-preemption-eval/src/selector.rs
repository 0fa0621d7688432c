//! Candidate node selection.
//!
//! Before any dry run, nodes whose admission failure cannot be fixed by
//! evicting workloads are set aside.

use std::collections::{BTreeMap, HashMap};

use tracing::debug;

use crate::status::{reasons, ReasonTable, Status};
use crate::types::NodeInfo;

/// Result of candidate node selection.
#[derive(Debug, Clone, Default)]
pub struct NodeSelection<'a> {
    /// Nodes worth a dry run, in input order.
    pub potential: Vec<&'a NodeInfo>,
    /// Nodes set aside, with the status to report for them.
    pub not_helpful: BTreeMap<String, Status>,
}

/// Splits `nodes` into those where preemption might help and the rest.
///
/// A node without a recorded failure is kept. A node with a failure is
/// kept when `table` says eviction could resolve it.
#[must_use]
pub fn nodes_where_preemption_might_help<'a>(
    nodes: &'a [NodeInfo],
    failures: &HashMap<String, Status>,
    table: &ReasonTable,
) -> NodeSelection<'a> {
    let mut selection = NodeSelection::default();

    for node in nodes {
        match failures.get(&node.name) {
            Some(status) if !table.might_help(status) => {
                debug!(
                    node = %node.name,
                    code = ?status.code,
                    reasons = ?status.reasons,
                    "preemption cannot resolve node failure"
                );
                selection.not_helpful.insert(
                    node.name.clone(),
                    Status::unresolvable(reasons::PREEMPTION_NOT_HELPFUL),
                );
            }
            _ => selection.potential.push(node),
        }
    }

    selection
}
