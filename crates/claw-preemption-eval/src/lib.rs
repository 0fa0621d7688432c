//! Preemption evaluation for Clawbernetes.
//!
//! `claw-preemption-eval` decides, when a workload cannot be placed on any
//! node, whether evicting lower-priority workloads would make room, on
//! which node, and which workloads to evict.
//!
//! # Features
//!
//! - **Candidate Node Selection**: Skips nodes whose admission failure eviction cannot fix
//! - **Dry-Run Victim Search**: Simulates eviction on copies of nodes, in parallel
//! - **Disruption Budgets**: Counts budget violations for every victim set
//! - **Candidate Ranking**: Deterministic comparator chain with pluggable scores
//! - **Graceful Eviction**: Configurable grace periods for evicted workloads
//!
//! # Example
//!
//! ```rust
//! use std::collections::HashMap;
//! use std::sync::Arc;
//!
//! use claw_preemption_eval::{
//!     DefaultPreemption, Evaluator, NoOpEvictionHandler, NodeInfo, PreemptionConfig,
//!     Resources, ResourceFitFilter, Status, Workload,
//! };
//! use tokio_util::sync::CancellationToken;
//!
//! let config = PreemptionConfig::default();
//! let plugin = DefaultPreemption::new(Arc::new(ResourceFitFilter::new()), &config);
//! let evaluator = Evaluator::new(config, plugin, NoOpEvictionHandler::new())?;
//!
//! let batch = Workload::new("jobs", "batch", 10).with_requests(Resources::new().with_gpus(4));
//! let nodes = vec![NodeInfo::new("gpu-1", Resources::new().with_gpus(4)).with_workload(batch)];
//!
//! let mut failures = HashMap::new();
//! failures.insert("gpu-1".to_string(), Status::unschedulable("InsufficientResources"));
//!
//! let training = Workload::new("ml", "training", 500).with_requests(Resources::new().with_gpus(4));
//! let outcome = evaluator.preempt(&training, &nodes, &failures, &[], &CancellationToken::new())?;
//!
//! assert_eq!(outcome.nominated_node_name, "gpu-1");
//! # Ok::<(), claw_preemption_eval::PreemptionError>(())
//! ```
//!
//! # Custom Ranking Scores
//!
//! Scores run after budget violations and before victim counts:
//!
//! ```rust
//! use std::sync::Arc;
//!
//! use claw_preemption_eval::{
//!     fewer_containers_scorer, DefaultPreemption, PreemptionConfig, ResourceFitFilter,
//! };
//!
//! let plugin = DefaultPreemption::new(Arc::new(ResourceFitFilter::new()), &PreemptionConfig::default())
//!     .with_scorer(fewer_containers_scorer());
//! ```
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │               Evaluator                 │
//! │  ┌─────────────┐   ┌─────────────────┐  │
//! │  │  Candidate  │──▶│  Dry Run (x N   │  │
//! │  │  Selector   │   │  parallel)      │  │
//! │  └─────────────┘   └────────┬────────┘  │
//! │                             ▼           │
//! │  ┌─────────────────────────────────────┐│
//! │  │  Candidate Ranker (comparator chain)││
//! │  └─────────────────────────────────────┘│
//! │  ┌─────────────────────────────────────┐│
//! │  │  PreemptionPlugin / NodeFilter      ││
//! │  │  EvictionHandler                    ││
//! │  └─────────────────────────────────────┘│
//! └─────────────────────────────────────────┘
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]
#![deny(clippy::todo)]
#![deny(clippy::unimplemented)]

pub mod budget;
pub mod config;
pub mod error;
pub mod evaluator;
pub mod eviction;
pub mod filter;
pub mod parallel;
pub mod plugin;
pub mod ranking;
pub mod selector;
pub mod status;
pub mod types;

// Re-export main types
pub use budget::{split_by_violation, DisruptionBudget, LabelSelector};
pub use config::PreemptionConfig;
pub use error::{PreemptionError, Result};
pub use evaluator::{Diagnosis, DryRunOutcome, Evaluator, PreemptionOutcome};
pub use eviction::{
    evict_victims, EvictionFailure, EvictionHandler, EvictionResult, NoOpEvictionHandler,
};
pub use filter::{NodeFilter, ResourceFitFilter};
pub use parallel::Parallelizer;
pub use plugin::{
    fewer_containers_scorer, DefaultPreemption, Eligibility, PreemptionPlugin, ScoreFn,
    VictimScorer,
};
pub use ranking::{CandidateRanker, Comparator};
pub use selector::{nodes_where_preemption_might_help, NodeSelection};
pub use status::{reasons, ReasonTable, Status, StatusCode};
pub use types::{
    Candidate, Container, NodeInfo, PreemptionPolicy, Resources, Victims, Workload, WorkloadRef,
};

/// Prelude for convenient imports.
pub mod prelude {
    pub use crate::budget::{DisruptionBudget, LabelSelector};
    pub use crate::config::PreemptionConfig;
    pub use crate::error::{PreemptionError, Result};
    pub use crate::evaluator::{Diagnosis, Evaluator, PreemptionOutcome};
    pub use crate::eviction::{EvictionHandler, EvictionResult, NoOpEvictionHandler};
    pub use crate::filter::{NodeFilter, ResourceFitFilter};
    pub use crate::plugin::{DefaultPreemption, PreemptionPlugin};
    pub use crate::status::{ReasonTable, Status, StatusCode};
    pub use crate::types::{Candidate, NodeInfo, Resources, Victims, Workload, WorkloadRef};
}
