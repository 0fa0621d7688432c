//! Feasibility filter seam.
//!
//! The evaluator does not know how admission works; it asks a
//! [`NodeFilter`] whether a workload fits a node after each simulated
//! removal. [`ResourceFitFilter`] is a capacity and host-port check that
//! covers the common case.

use crate::error::Result;
use crate::status::{reasons, Status};
use crate::types::{NodeInfo, Workload};

/// Decides whether a workload can be admitted to a node as it currently is.
pub trait NodeFilter: Send + Sync {
    /// Runs admission for `workload` against `node`.
    ///
    /// # Errors
    ///
    /// Returns error if the filter cannot reach a verdict.
    fn filter(&self, workload: &Workload, node: &NodeInfo) -> Result<Status>;
}

impl<F> NodeFilter for F
where
    F: Fn(&Workload, &NodeInfo) -> Result<Status> + Send + Sync,
{
    fn filter(&self, workload: &Workload, node: &NodeInfo) -> Result<Status> {
        self(workload, node)
    }
}

/// Admits a workload when the node has room for its requests and none of
/// its host ports are taken.
#[derive(Debug, Clone, Copy, Default)]
pub struct ResourceFitFilter;

impl ResourceFitFilter {
    /// Creates the filter.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl NodeFilter for ResourceFitFilter {
    fn filter(&self, workload: &Workload, node: &NodeInfo) -> Result<Status> {
        let used = node.used_host_ports();
        if workload.host_ports().any(|p| used.contains(&p)) {
            return Ok(Status::unschedulable(reasons::HOST_PORT_CONFLICT));
        }
        if !workload.requests().fits_within(&node.free()) {
            return Ok(Status::unschedulable(reasons::INSUFFICIENT_RESOURCES));
        }
        Ok(Status::success())
    }
}
