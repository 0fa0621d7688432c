//! Core types for the preemption evaluator.
//!
//! This module provides the data model the evaluator works on:
//! - [`Workload`]: A schedulable unit with a priority and resource requests
//! - [`NodeInfo`]: A node with its capacity and currently bound workloads
//! - [`Resources`]: Resource quantities for requests and capacity
//! - [`Candidate`]: The outcome of a successful dry run on one node

use std::collections::{BTreeMap, BTreeSet};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Namespaced identity of a workload.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct WorkloadRef {
    /// Namespace the workload lives in.
    pub namespace: String,
    /// Name of the workload, unique within its namespace.
    pub name: String,
}

impl WorkloadRef {
    /// Creates a new workload reference.
    #[must_use]
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }
}

impl std::fmt::Display for WorkloadRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

/// Policy controlling whether a pending workload may preempt others.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum PreemptionPolicy {
    /// The workload never triggers preemption.
    Never,
    /// The workload may preempt workloads of strictly lower priority.
    #[default]
    PreemptLowerPriority,
}

impl PreemptionPolicy {
    /// Returns true if this policy allows preempting lower priority workloads.
    #[must_use]
    pub const fn allows_preemption(&self) -> bool {
        matches!(self, Self::PreemptLowerPriority)
    }
}

/// Resource quantities, used both for requests and for node capacity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Resources {
    /// CPU in millicores (1000 = 1 core).
    pub cpu_millicores: u64,
    /// Memory in bytes.
    pub memory_bytes: u64,
    /// Number of GPUs.
    pub gpus: u32,
    /// Extended resources keyed by name.
    pub custom: BTreeMap<String, u64>,
}

impl Resources {
    /// Creates an empty set of resources.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the CPU quantity in millicores.
    #[must_use]
    pub const fn with_cpu(mut self, millicores: u64) -> Self {
        self.cpu_millicores = millicores;
        self
    }

    /// Sets the memory quantity in bytes.
    #[must_use]
    pub const fn with_memory(mut self, bytes: u64) -> Self {
        self.memory_bytes = bytes;
        self
    }

    /// Sets the memory quantity in gigabytes.
    #[must_use]
    pub const fn with_memory_gb(mut self, gb: u64) -> Self {
        self.memory_bytes = gb * 1024 * 1024 * 1024;
        self
    }

    /// Sets the GPU count.
    #[must_use]
    pub const fn with_gpus(mut self, count: u32) -> Self {
        self.gpus = count;
        self
    }

    /// Adds an extended resource quantity.
    #[must_use]
    pub fn with_custom(mut self, name: impl Into<String>, value: u64) -> Self {
        self.custom.insert(name.into(), value);
        self
    }

    /// Returns true if `self` fits inside `available`.
    #[must_use]
    pub fn fits_within(&self, available: &Self) -> bool {
        if self.cpu_millicores > available.cpu_millicores
            || self.memory_bytes > available.memory_bytes
            || self.gpus > available.gpus
        {
            return false;
        }
        self.custom
            .iter()
            .all(|(name, needed)| *needed <= available.custom.get(name).copied().unwrap_or(0))
    }

    /// Returns the sum of these resources and another.
    #[must_use]
    pub fn add(&self, other: &Self) -> Self {
        let mut result = self.clone();
        result.cpu_millicores = result.cpu_millicores.saturating_add(other.cpu_millicores);
        result.memory_bytes = result.memory_bytes.saturating_add(other.memory_bytes);
        result.gpus = result.gpus.saturating_add(other.gpus);
        for (name, value) in &other.custom {
            let entry = result.custom.entry(name.clone()).or_insert(0);
            *entry = entry.saturating_add(*value);
        }
        result
    }

    /// Returns `self - other`, flooring every quantity at zero.
    #[must_use]
    pub fn saturating_sub(&self, other: &Self) -> Self {
        let mut result = self.clone();
        result.cpu_millicores = result.cpu_millicores.saturating_sub(other.cpu_millicores);
        result.memory_bytes = result.memory_bytes.saturating_sub(other.memory_bytes);
        result.gpus = result.gpus.saturating_sub(other.gpus);
        for (name, value) in &other.custom {
            if let Some(entry) = result.custom.get_mut(name) {
                *entry = entry.saturating_sub(*value);
            }
        }
        result
    }

    /// Returns true if all quantities are zero.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.cpu_millicores == 0
            && self.memory_bytes == 0
            && self.gpus == 0
            && self.custom.values().all(|v| *v == 0)
    }
}

/// A container inside a workload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Container {
    /// Container name.
    pub name: String,
    /// Requested resources.
    pub resources: Resources,
    /// Host ports the container binds.
    pub host_ports: Vec<u16>,
}

impl Container {
    /// Creates a container with the given resource requests.
    #[must_use]
    pub fn new(name: impl Into<String>, resources: Resources) -> Self {
        Self {
            name: name.into(),
            resources,
            host_ports: Vec::new(),
        }
    }

    /// Adds a host port binding.
    #[must_use]
    pub fn with_host_port(mut self, port: u16) -> Self {
        self.host_ports.push(port);
        self
    }
}

/// A schedulable workload.
///
/// Workloads are treated as immutable during one evaluation pass. Higher
/// `priority` values are more important.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Workload {
    /// Namespaced identity.
    pub key: WorkloadRef,
    /// Unique id of this incarnation of the workload.
    pub uid: Uuid,
    /// Scheduling priority. Higher is more important.
    pub priority: i32,
    /// Whether this workload may preempt others while pending.
    pub preemption_policy: PreemptionPolicy,
    /// Containers in declaration order.
    pub containers: Vec<Container>,
    /// Labels used by disruption budget selectors.
    pub labels: BTreeMap<String, String>,
    /// Node nominated for this workload by an earlier preemption.
    pub nominated_node: Option<String>,
    /// Whether the workload is already shutting down.
    pub terminating: bool,
    /// When the workload started running.
    pub start_time: Option<DateTime<Utc>>,
    /// Grace period requested for shutdown. Falls back to the configured default.
    pub termination_grace_period: Option<Duration>,
    /// Marker requesting graceful eviction.
    pub graceful_eviction: bool,
}

impl Workload {
    /// Creates a workload with no containers.
    #[must_use]
    pub fn new(namespace: impl Into<String>, name: impl Into<String>, priority: i32) -> Self {
        Self {
            key: WorkloadRef::new(namespace, name),
            uid: Uuid::new_v4(),
            priority,
            preemption_policy: PreemptionPolicy::default(),
            containers: Vec::new(),
            labels: BTreeMap::new(),
            nominated_node: None,
            terminating: false,
            start_time: None,
            termination_grace_period: None,
            graceful_eviction: false,
        }
    }

    /// Adds a container.
    #[must_use]
    pub fn with_container(mut self, container: Container) -> Self {
        self.containers.push(container);
        self
    }

    /// Adds a single container named after the workload with the given requests.
    #[must_use]
    pub fn with_requests(self, resources: Resources) -> Self {
        let name = self.key.name.clone();
        self.with_container(Container::new(name, resources))
    }

    /// Adds a label.
    #[must_use]
    pub fn with_label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.labels.insert(key.into(), value.into());
        self
    }

    /// Sets the preemption policy.
    #[must_use]
    pub const fn with_preemption_policy(mut self, policy: PreemptionPolicy) -> Self {
        self.preemption_policy = policy;
        self
    }

    /// Sets the nominated node.
    #[must_use]
    pub fn with_nominated_node(mut self, node: impl Into<String>) -> Self {
        self.nominated_node = Some(node.into());
        self
    }

    /// Marks the workload as terminating.
    #[must_use]
    pub const fn with_terminating(mut self, terminating: bool) -> Self {
        self.terminating = terminating;
        self
    }

    /// Sets the start time.
    #[must_use]
    pub const fn with_start_time(mut self, start_time: DateTime<Utc>) -> Self {
        self.start_time = Some(start_time);
        self
    }

    /// Sets the termination grace period.
    #[must_use]
    pub const fn with_grace_period(mut self, grace_period: Duration) -> Self {
        self.termination_grace_period = Some(grace_period);
        self
    }

    /// Sets the graceful eviction marker.
    #[must_use]
    pub const fn with_graceful_eviction(mut self, graceful: bool) -> Self {
        self.graceful_eviction = graceful;
        self
    }

    /// Total resource requests across all containers.
    #[must_use]
    pub fn requests(&self) -> Resources {
        self.containers
            .iter()
            .fold(Resources::new(), |acc, c| acc.add(&c.resources))
    }

    /// Host ports bound by any container.
    pub fn host_ports(&self) -> impl Iterator<Item = u16> + '_ {
        self.containers.iter().flat_map(|c| c.host_ports.iter().copied())
    }

    /// Number of containers.
    #[must_use]
    pub fn container_count(&self) -> usize {
        self.containers.len()
    }

    /// Returns true if `self` should outlive `other` when one must go.
    ///
    /// Higher priority wins; at equal priority the longer-running workload
    /// wins. A workload without a start time counts as just started.
    #[must_use]
    pub fn is_more_important_than(&self, other: &Self) -> bool {
        if self.priority != other.priority {
            return self.priority > other.priority;
        }
        match (self.start_time, other.start_time) {
            (Some(a), Some(b)) => a < b,
            (Some(_), None) => true,
            _ => false,
        }
    }
}

/// A node together with the workloads bound to it.
///
/// The evaluator never mutates a caller's `NodeInfo`; simulations operate
/// on a clone.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeInfo {
    /// Node name.
    pub name: String,
    /// Node labels.
    pub labels: BTreeMap<String, String>,
    /// Capacity available to workloads.
    pub allocatable: Resources,
    workloads: Vec<Workload>,
    requested: Resources,
}

impl NodeInfo {
    /// Creates an empty node.
    #[must_use]
    pub fn new(name: impl Into<String>, allocatable: Resources) -> Self {
        Self {
            name: name.into(),
            labels: BTreeMap::new(),
            allocatable,
            workloads: Vec::new(),
            requested: Resources::new(),
        }
    }

    /// Adds a label.
    #[must_use]
    pub fn with_label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.labels.insert(key.into(), value.into());
        self
    }

    /// Binds a workload to the node.
    #[must_use]
    pub fn with_workload(mut self, workload: Workload) -> Self {
        self.add_workload(workload);
        self
    }

    /// Workloads currently bound to the node.
    #[must_use]
    pub fn workloads(&self) -> &[Workload] {
        &self.workloads
    }

    /// Aggregate requests of bound workloads.
    #[must_use]
    pub fn requested(&self) -> &Resources {
        &self.requested
    }

    /// Capacity not yet requested by bound workloads.
    #[must_use]
    pub fn free(&self) -> Resources {
        self.allocatable.saturating_sub(&self.requested)
    }

    /// Host ports already in use on the node.
    #[must_use]
    pub fn used_host_ports(&self) -> BTreeSet<u16> {
        self.workloads.iter().flat_map(Workload::host_ports).collect()
    }

    /// Binds a workload to the node.
    pub fn add_workload(&mut self, workload: Workload) {
        self.requested = self.requested.add(&workload.requests());
        self.workloads.push(workload);
    }

    /// Unbinds a workload, returning it if it was present.
    pub fn remove_workload(&mut self, key: &WorkloadRef) -> Option<Workload> {
        let idx = self.workloads.iter().position(|w| &w.key == key)?;
        let workload = self.workloads.remove(idx);
        self.requested = self.requested.saturating_sub(&workload.requests());
        Some(workload)
    }
}

/// Workloads to evict on one node.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Victims {
    /// Victims, most important first.
    pub workloads: Vec<Workload>,
    /// How many victims break a disruption budget.
    pub num_pdb_violations: usize,
}

impl Victims {
    /// Highest victim priority, if any.
    #[must_use]
    pub fn highest_priority(&self) -> Option<i32> {
        self.workloads.iter().map(|w| w.priority).max()
    }

    /// Sum of victim priorities.
    #[must_use]
    pub fn priority_sum(&self) -> i64 {
        self.workloads.iter().map(|w| i64::from(w.priority)).sum()
    }

    /// Total number of containers across all victims.
    #[must_use]
    pub fn container_count(&self) -> usize {
        self.workloads.iter().map(Workload::container_count).sum()
    }

    /// Number of victims requesting graceful eviction.
    #[must_use]
    pub fn graceful_count(&self) -> usize {
        self.workloads.iter().filter(|w| w.graceful_eviction).count()
    }
}

/// A node on which preemption would let the pending workload fit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Candidate {
    /// Node name.
    pub node_name: String,
    /// Workloads to evict on that node.
    pub victims: Victims,
}

impl Candidate {
    /// Creates a candidate.
    #[must_use]
    pub fn new(node_name: impl Into<String>, victims: Victims) -> Self {
        Self {
            node_name: node_name.into(),
            victims,
        }
    }
}
