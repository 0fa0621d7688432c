//! Preemption evaluator.
//!
//! The [`Evaluator`] is responsible for:
//! - Setting aside nodes where eviction cannot help
//! - Dry-running victim selection on a bounded window of the remaining nodes
//! - Ranking the resulting candidates and picking one
//! - Issuing evictions for the winner's victims and nominating its node

use std::any::Any;
use std::collections::{BTreeMap, HashMap};
use std::panic::{self, AssertUnwindSafe};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::budget::DisruptionBudget;
use crate::config::PreemptionConfig;
use crate::error::{PreemptionError, Result};
use crate::eviction::{evict_victims, EvictionHandler, EvictionResult};
use crate::parallel::Parallelizer;
use crate::plugin::{Eligibility, PreemptionPlugin};
use crate::ranking::CandidateRanker;
use crate::selector::{nodes_where_preemption_might_help, NodeSelection};
use crate::status::{reasons, Status};
use crate::types::{Candidate, NodeInfo, Victims, Workload};

/// Outcome of a dry run over a window of nodes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DryRunOutcome {
    /// One candidate per node where preemption works, sorted by node name.
    pub candidates: Vec<Candidate>,
    /// Statuses for nodes that produced no candidate.
    pub node_statuses: BTreeMap<String, Status>,
    /// Nodes where evicting every eligible occupant is not enough.
    pub unschedulable_nodes: usize,
    /// Nodes whose simulation failed.
    pub failed_nodes: usize,
    /// Nodes actually simulated.
    pub nodes_considered: usize,
}

/// Why preemption did or did not find room, per node.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnosis {
    /// Nodes in the snapshot.
    pub total_nodes: usize,
    /// Nodes that were dry-run.
    pub nodes_considered: usize,
    /// Status of every node that yielded no candidate.
    pub node_statuses: BTreeMap<String, Status>,
}

impl Diagnosis {
    /// Summarises the node statuses as a single line.
    #[must_use]
    pub fn message(&self) -> String {
        let mut histogram: BTreeMap<&str, usize> = BTreeMap::new();
        for status in self.node_statuses.values() {
            *histogram.entry(status.reason()).or_default() += 1;
        }
        let reasons: Vec<String> = histogram
            .into_iter()
            .map(|(reason, count)| format!("{count} {reason}"))
            .collect();
        format!(
            "preemption: 0/{} nodes are available: {}.",
            self.total_nodes,
            reasons.join(", ")
        )
    }
}

/// Result of one preemption attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PreemptionOutcome {
    /// The winning candidate, if any.
    pub candidate: Option<Candidate>,
    /// Node to nominate for the pending workload; empty when none.
    pub nominated_node_name: String,
    /// Per-node explanation.
    pub diagnosis: Diagnosis,
    /// Evictions issued for the winner.
    pub eviction: Option<EvictionResult>,
    /// Why the attempt was skipped before looking at nodes.
    pub skipped: Option<String>,
}

impl PreemptionOutcome {
    fn skipped(total_nodes: usize, reason: impl Into<String>) -> Self {
        Self {
            candidate: None,
            nominated_node_name: String::new(),
            diagnosis: Diagnosis {
                total_nodes,
                ..Diagnosis::default()
            },
            eviction: None,
            skipped: Some(reason.into()),
        }
    }

    fn no_candidate(diagnosis: Diagnosis) -> Self {
        Self {
            candidate: None,
            nominated_node_name: String::new(),
            diagnosis,
            eviction: None,
            skipped: None,
        }
    }

    /// Returns true if a node was nominated.
    #[must_use]
    pub fn is_nominated(&self) -> bool {
        !self.nominated_node_name.is_empty()
    }
}

/// Evaluates whether, where, and whom to preempt for a pending workload.
pub struct Evaluator<P: PreemptionPlugin, H: EvictionHandler> {
    config: PreemptionConfig,
    plugin: P,
    handler: H,
    parallelizer: Parallelizer,
}

impl<P: PreemptionPlugin, H: EvictionHandler> Evaluator<P, H> {
    /// Creates an evaluator.
    ///
    /// # Errors
    ///
    /// Returns error if the configuration is invalid.
    pub fn new(config: PreemptionConfig, plugin: P, handler: H) -> Result<Self> {
        config.validate()?;
        let parallelizer = Parallelizer::new(config.parallelism);
        Ok(Self {
            config,
            plugin,
            handler,
            parallelizer,
        })
    }

    /// Returns the configuration.
    #[must_use]
    pub fn config(&self) -> &PreemptionConfig {
        &self.config
    }

    /// Returns the plugin.
    #[must_use]
    pub fn plugin(&self) -> &P {
        &self.plugin
    }

    /// Returns the eviction handler.
    #[must_use]
    pub fn handler(&self) -> &H {
        &self.handler
    }

    /// Nodes where evicting workloads might let a workload fit.
    #[must_use]
    pub fn select_candidate_nodes<'a>(
        &self,
        nodes: &'a [NodeInfo],
        failures: &HashMap<String, Status>,
    ) -> NodeSelection<'a> {
        nodes_where_preemption_might_help(nodes, failures, &self.config.reason_table)
    }

    /// Simulates preemption on up to `num_candidates` nodes of `nodes`,
    /// starting at `offset` and wrapping around.
    ///
    /// Each simulation runs on its own copy of the node. A failing node is
    /// recorded and skipped; cancellation stops nodes that have not started.
    pub fn dry_run_preemption(
        &self,
        pending: &Workload,
        nodes: &[&NodeInfo],
        budgets: &[DisruptionBudget],
        offset: usize,
        num_candidates: usize,
        cancel: &CancellationToken,
    ) -> DryRunOutcome {
        let total = nodes.len();
        let pieces = num_candidates.min(total);
        if pieces == 0 {
            return DryRunOutcome::default();
        }

        let outcome = Mutex::new(DryRunOutcome::default());
        let ran = self.parallelizer.until(cancel, pieces, |i| {
            let node = nodes[(offset % total + i) % total];
            let result = self.simulate(pending, node, budgets);

            let mut outcome = outcome.lock();
            match result {
                Ok(Some(victims)) if !victims.workloads.is_empty() => {
                    outcome.candidates.push(Candidate::new(node.name.clone(), victims));
                }
                Ok(Some(_)) => {
                    let err = PreemptionError::SimulationFailed {
                        node: node.name.clone(),
                        reason: "expected at least one victim".into(),
                    };
                    warn!(node = %node.name, workload = %pending.key, error = %err, "dry run failed");
                    outcome.failed_nodes += 1;
                    outcome.node_statuses.insert(node.name.clone(), Status::error(err.to_string()));
                }
                Ok(None) => {
                    outcome.unschedulable_nodes += 1;
                    outcome
                        .node_statuses
                        .insert(node.name.clone(), Status::unschedulable(reasons::NO_VICTIMS_FOUND));
                }
                Err(err) => {
                    warn!(node = %node.name, workload = %pending.key, error = %err, "dry run failed");
                    outcome.failed_nodes += 1;
                    outcome.node_statuses.insert(node.name.clone(), Status::error(err.to_string()));
                }
            }
        });

        let mut outcome = outcome.into_inner();
        outcome.nodes_considered = ran;
        outcome
            .candidates
            .sort_by(|a, b| a.node_name.cmp(&b.node_name));

        debug!(
            workload = %pending.key,
            offset,
            num_candidates,
            considered = ran,
            candidates = outcome.candidates.len(),
            unschedulable = outcome.unschedulable_nodes,
            failed = outcome.failed_nodes,
            "dry run complete"
        );
        outcome
    }

    /// Runs victim search on a private copy of `node`. A panicking plugin
    /// or filter becomes a simulation error for that node alone.
    fn simulate(
        &self,
        pending: &Workload,
        node: &NodeInfo,
        budgets: &[DisruptionBudget],
    ) -> Result<Option<Victims>> {
        let mut copy = node.clone();
        panic::catch_unwind(AssertUnwindSafe(|| {
            self.plugin.select_victims_on_node(pending, &mut copy, budgets)
        }))
        .unwrap_or_else(|payload| {
            Err(PreemptionError::SimulationFailed {
                node: node.name.clone(),
                reason: format!("plugin panicked: {}", panic_message(payload.as_ref())),
            })
        })
    }

    /// Picks the best candidate, or `None` if there are none.
    #[must_use]
    pub fn select_candidate(&self, candidates: &[Candidate]) -> Option<Candidate> {
        match candidates {
            [] => None,
            [only] => Some(only.clone()),
            _ => {
                let victims = self.plugin.candidates_to_victims_map(candidates);
                let score_funcs = self.plugin.ordered_score_funcs(&victims);
                let ranker = CandidateRanker::new(score_funcs, self.config.rank_by_graceful_eviction);
                ranker.select(candidates).cloned()
            }
        }
    }

    /// Runs a full preemption attempt for `pending`.
    ///
    /// `failures` holds the admission verdict of every node the workload
    /// was rejected by. On success the winner's victims are evicted and its
    /// node is returned as the nominated node; finding no candidate is not
    /// an error.
    ///
    /// # Errors
    ///
    /// Returns error if the snapshot has no nodes.
    pub fn preempt(
        &self,
        pending: &Workload,
        nodes: &[NodeInfo],
        failures: &HashMap<String, Status>,
        budgets: &[DisruptionBudget],
        cancel: &CancellationToken,
    ) -> Result<PreemptionOutcome> {
        if !self.config.enabled {
            debug!(workload = %pending.key, "preemption disabled");
            return Ok(PreemptionOutcome::skipped(nodes.len(), "preemption is disabled"));
        }
        if nodes.is_empty() {
            return Err(PreemptionError::NoNodesAvailable);
        }

        let nominated_status = pending
            .nominated_node
            .as_ref()
            .and_then(|name| failures.get(name));
        if let Eligibility::Ineligible(reason) =
            self.plugin
                .pod_eligible_to_preempt_others(pending, nodes, nominated_status)
        {
            debug!(workload = %pending.key, reason = %reason, "workload not eligible to preempt");
            return Ok(PreemptionOutcome::skipped(nodes.len(), reason));
        }

        let selection = self.select_candidate_nodes(nodes, failures);
        let mut diagnosis = Diagnosis {
            total_nodes: nodes.len(),
            nodes_considered: 0,
            node_statuses: selection.not_helpful,
        };
        if selection.potential.is_empty() {
            info!(
                workload = %pending.key,
                nodes = nodes.len(),
                "preemption will not help on any node"
            );
            return Ok(PreemptionOutcome::no_candidate(diagnosis));
        }

        let (offset, num_candidates) = self
            .plugin
            .get_offset_and_num_candidates(selection.potential.len());
        let dry_run = self.dry_run_preemption(
            pending,
            &selection.potential,
            budgets,
            offset,
            num_candidates,
            cancel,
        );
        diagnosis.nodes_considered = dry_run.nodes_considered;
        diagnosis.node_statuses.extend(dry_run.node_statuses);

        let Some(best) = self.select_candidate(&dry_run.candidates) else {
            info!(
                workload = %pending.key,
                considered = dry_run.nodes_considered,
                message = %diagnosis.message(),
                "no preemption candidate found"
            );
            return Ok(PreemptionOutcome::no_candidate(diagnosis));
        };

        info!(
            workload = %pending.key,
            node = %best.node_name,
            victims = best.victims.workloads.len(),
            num_pdb_violations = best.victims.num_pdb_violations,
            candidates = dry_run.candidates.len(),
            "selected preemption candidate"
        );

        let eviction = evict_victims(
            &self.handler,
            &self.config,
            &best.node_name,
            &best.victims.workloads,
        );
        if !eviction.is_successful() {
            warn!(
                workload = %pending.key,
                node = %best.node_name,
                failed = eviction.failures.len(),
                "some preemption victims could not be evicted"
            );
        }

        Ok(PreemptionOutcome {
            nominated_node_name: best.node_name.clone(),
            candidate: Some(best),
            diagnosis,
            eviction: Some(eviction),
            skipped: None,
        })
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        msg
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.as_str()
    } else {
        "unknown panic"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use crate::budget::LabelSelector;
    use crate::eviction::NoOpEvictionHandler;
    use crate::filter::{NodeFilter, ResourceFitFilter};
    use crate::plugin::{fewer_containers_scorer, DefaultPreemption};
    use crate::status::StatusCode;
    use crate::types::{Container, PreemptionPolicy, Resources, Victims, WorkloadRef};

    const LOW: i32 = 10;
    const MID: i32 = 100;
    const HIGH: i32 = 1000;

    fn workload(name: &str, priority: i32, cpu: u64) -> Workload {
        Workload::new("default", name, priority).with_requests(Resources::new().with_cpu(cpu))
    }

    fn node(name: &str, occupants: Vec<Workload>) -> NodeInfo {
        occupants
            .into_iter()
            .fold(NodeInfo::new(name, Resources::new().with_cpu(1000)), NodeInfo::with_workload)
    }

    fn config() -> PreemptionConfig {
        PreemptionConfig::new().with_parallelism(4)
    }

    fn evaluator() -> Evaluator<DefaultPreemption, NoOpEvictionHandler> {
        let plugin =
            DefaultPreemption::new(Arc::new(ResourceFitFilter::new()), &config()).with_fixed_offset(0);
        evaluator_with(plugin)
    }

    fn evaluator_with<P: PreemptionPlugin>(plugin: P) -> Evaluator<P, NoOpEvictionHandler> {
        match Evaluator::new(config(), plugin, NoOpEvictionHandler::new()) {
            Ok(e) => e,
            Err(e) => unreachable!("default test config is valid: {e}"),
        }
    }

    fn refs(nodes: &[NodeInfo]) -> Vec<&NodeInfo> {
        nodes.iter().collect()
    }

    fn victim_names(candidate: &Candidate) -> Vec<&str> {
        candidate
            .victims
            .workloads
            .iter()
            .map(|w| w.key.name.as_str())
            .collect()
    }

    /// Wraps the default plugin and reports one budget violation per candidate.
    struct OneViolation(DefaultPreemption);

    impl PreemptionPlugin for OneViolation {
        fn select_victims_on_node(
            &self,
            pending: &Workload,
            node: &mut NodeInfo,
            budgets: &[DisruptionBudget],
        ) -> Result<Option<Victims>> {
            let victims = self.0.select_victims_on_node(pending, node, budgets)?;
            Ok(victims.map(|v| Victims {
                num_pdb_violations: 1,
                ..v
            }))
        }

        fn get_offset_and_num_candidates(&self, num_nodes: usize) -> (usize, usize) {
            self.0.get_offset_and_num_candidates(num_nodes)
        }

        fn pod_eligible_to_preempt_others(
            &self,
            pending: &Workload,
            nodes: &[NodeInfo],
            nominated_status: Option<&Status>,
        ) -> Eligibility {
            self.0.pod_eligible_to_preempt_others(pending, nodes, nominated_status)
        }
    }

    mod dry_run_tests {
        use super::*;

        #[test]
        fn one_candidate_per_node() {
            let nodes = vec![
                node("node1", vec![workload("p1", MID, 600)]),
                node("node2", vec![workload("p2", MID, 600)]),
            ];
            let pending = workload("pending", HIGH, 600);

            let outcome = evaluator().dry_run_preemption(
                &pending,
                &refs(&nodes),
                &[],
                0,
                2,
                &CancellationToken::new(),
            );

            assert_eq!(outcome.candidates.len(), 2);
            assert_eq!(outcome.candidates[0].node_name, "node1");
            assert_eq!(victim_names(&outcome.candidates[0]), vec!["p1"]);
            assert_eq!(outcome.candidates[0].victims.num_pdb_violations, 0);
            assert_eq!(outcome.candidates[1].node_name, "node2");
            assert_eq!(victim_names(&outcome.candidates[1]), vec!["p2"]);
            assert_eq!(outcome.candidates[1].victims.num_pdb_violations, 0);
            assert_eq!(outcome.unschedulable_nodes, 0);
        }

        #[test]
        fn plugin_reported_violations_carried() {
            let plugin = OneViolation(
                DefaultPreemption::new(Arc::new(ResourceFitFilter::new()), &config())
                    .with_fixed_offset(0),
            );
            let evaluator = evaluator_with(plugin);
            let nodes = vec![
                node("node1", vec![workload("p1", MID, 600)]),
                node("node2", vec![workload("p2", MID, 600)]),
            ];
            let pending = workload("pending", HIGH, 600);

            let outcome = evaluator.dry_run_preemption(
                &pending,
                &refs(&nodes),
                &[],
                0,
                2,
                &CancellationToken::new(),
            );

            assert_eq!(outcome.candidates.len(), 2);
            assert!(outcome
                .candidates
                .iter()
                .all(|c| c.victims.num_pdb_violations == 1));
            let best = evaluator.select_candidate(&outcome.candidates);
            assert_eq!(best.map(|c| c.node_name), Some("node1".to_string()));
        }

        #[test]
        fn budget_violations_counted() {
            let nodes = vec![node(
                "node1",
                vec![workload("web", MID, 600).with_label("app", "web")],
            )];
            let budgets = vec![DisruptionBudget::new(
                "default",
                "web",
                LabelSelector::new().with_label("app", "web"),
                1,
                1,
            )];
            let pending = workload("pending", HIGH, 600);

            let outcome = evaluator().dry_run_preemption(
                &pending,
                &refs(&nodes),
                &budgets,
                0,
                1,
                &CancellationToken::new(),
            );
            assert_eq!(outcome.candidates[0].victims.num_pdb_violations, 1);
        }

        #[test]
        fn infeasible_nodes_counted() {
            let nodes = vec![
                node("node1", vec![workload("boss", HIGH, 900)]),
                node("node2", vec![workload("p2", LOW, 600)]),
            ];
            let pending = workload("pending", MID, 600);

            let outcome = evaluator().dry_run_preemption(
                &pending,
                &refs(&nodes),
                &[],
                0,
                2,
                &CancellationToken::new(),
            );

            assert_eq!(outcome.candidates.len(), 1);
            assert_eq!(outcome.unschedulable_nodes, 1);
            assert_eq!(
                outcome.node_statuses.get("node1").map(Status::reason),
                Some(reasons::NO_VICTIMS_FOUND)
            );
        }

        #[test]
        fn failing_node_does_not_abort_siblings() {
            let filter = |w: &Workload, n: &NodeInfo| -> Result<Status> {
                if n.name == "broken" {
                    return Err(PreemptionError::FilterFailed {
                        node: n.name.clone(),
                        reason: "plugin crashed".into(),
                    });
                }
                ResourceFitFilter::new().filter(w, n)
            };
            let plugin = DefaultPreemption::new(Arc::new(filter), &config()).with_fixed_offset(0);
            let evaluator = evaluator_with(plugin);
            let nodes = vec![
                node("broken", vec![workload("p1", LOW, 600)]),
                node("healthy", vec![workload("p2", LOW, 600)]),
            ];
            let pending = workload("pending", HIGH, 600);

            let outcome = evaluator.dry_run_preemption(
                &pending,
                &refs(&nodes),
                &[],
                0,
                2,
                &CancellationToken::new(),
            );

            assert_eq!(outcome.failed_nodes, 1);
            assert_eq!(outcome.candidates.len(), 1);
            assert_eq!(outcome.candidates[0].node_name, "healthy");
            assert_eq!(
                outcome.node_statuses.get("broken").map(|s| s.code),
                Some(StatusCode::Error)
            );
        }

        #[test]
        fn window_starts_at_offset_and_wraps() {
            let nodes: Vec<NodeInfo> = (0..5)
                .map(|i| node(&format!("node{i}"), vec![workload(&format!("p{i}"), LOW, 600)]))
                .collect();
            let pending = workload("pending", HIGH, 600);

            let outcome = evaluator().dry_run_preemption(
                &pending,
                &refs(&nodes),
                &[],
                3,
                3,
                &CancellationToken::new(),
            );

            let visited: Vec<&str> = outcome.candidates.iter().map(|c| c.node_name.as_str()).collect();
            assert_eq!(visited, vec!["node0", "node3", "node4"]);
            assert_eq!(outcome.nodes_considered, 3);
        }

        #[test]
        fn huge_offset_wraps_without_overflow() {
            let nodes: Vec<NodeInfo> = (0..4)
                .map(|i| node(&format!("node{i}"), vec![workload(&format!("p{i}"), LOW, 600)]))
                .collect();
            let pending = workload("pending", HIGH, 600);

            // usize::MAX % 4 == 3, so the window is node3, node0, node1.
            let outcome = evaluator().dry_run_preemption(
                &pending,
                &refs(&nodes),
                &[],
                usize::MAX,
                3,
                &CancellationToken::new(),
            );

            let visited: Vec<&str> = outcome.candidates.iter().map(|c| c.node_name.as_str()).collect();
            assert_eq!(visited, vec!["node0", "node1", "node3"]);
            assert_eq!(outcome.nodes_considered, 3);
        }

        #[test]
        fn panicking_filter_is_isolated_to_its_node() {
            let filter = |w: &Workload, n: &NodeInfo| -> Result<Status> {
                assert!(n.name != "crashing", "filter crashed on {}", n.name);
                ResourceFitFilter::new().filter(w, n)
            };
            let plugin = DefaultPreemption::new(Arc::new(filter), &config()).with_fixed_offset(0);
            let evaluator = evaluator_with(plugin);
            let nodes = vec![
                node("crashing", vec![workload("p1", LOW, 600)]),
                node("healthy", vec![workload("p2", LOW, 600)]),
            ];

            let outcome = evaluator.dry_run_preemption(
                &workload("pending", HIGH, 600),
                &refs(&nodes),
                &[],
                0,
                2,
                &CancellationToken::new(),
            );

            assert_eq!(outcome.failed_nodes, 1);
            assert_eq!(outcome.candidates.len(), 1);
            assert_eq!(outcome.candidates[0].node_name, "healthy");
            let status = outcome.node_statuses.get("crashing").cloned().unwrap_or_default();
            assert_eq!(status.code, StatusCode::Error);
            assert!(status.reason().contains("filter crashed on crashing"));
        }

        #[test]
        fn cancelled_dry_run_returns_partial_results() {
            let cancel = CancellationToken::new();
            cancel.cancel();
            let nodes = vec![node("node1", vec![workload("p1", LOW, 600)])];

            let outcome = evaluator().dry_run_preemption(
                &workload("pending", HIGH, 600),
                &refs(&nodes),
                &[],
                0,
                1,
                &cancel,
            );

            assert!(outcome.candidates.is_empty());
            assert_eq!(outcome.nodes_considered, 0);
        }

        #[test]
        fn snapshot_is_not_mutated() {
            let nodes = vec![node("node1", vec![workload("p1", LOW, 600)])];
            let before = nodes.clone();

            let _ = evaluator().dry_run_preemption(
                &workload("pending", HIGH, 600),
                &refs(&nodes),
                &[],
                0,
                1,
                &CancellationToken::new(),
            );

            assert_eq!(nodes, before);
        }

        #[test]
        fn node_that_already_fits_is_an_error() {
            let nodes = vec![node("node1", vec![workload("p1", LOW, 100)])];

            let outcome = evaluator().dry_run_preemption(
                &workload("pending", HIGH, 100),
                &refs(&nodes),
                &[],
                0,
                1,
                &CancellationToken::new(),
            );

            assert!(outcome.candidates.is_empty());
            assert_eq!(outcome.failed_nodes, 1);
        }
    }

    mod select_candidate_tests {
        use super::*;

        #[test]
        fn plugin_score_prefers_fewer_containers() {
            let plugin = DefaultPreemption::new(Arc::new(ResourceFitFilter::new()), &config())
                .with_fixed_offset(0)
                .with_scorer(fewer_containers_scorer());
            let evaluator = evaluator_with(plugin);

            let containers = |name: &str, count: usize| {
                (0..count).fold(Workload::new("default", name, MID), |w, i| {
                    w.with_container(Container::new(
                        format!("c{i}"),
                        Resources::new().with_cpu(900 / count as u64),
                    ))
                })
            };
            let nodes = vec![
                node("node1", vec![containers("two", 2)]),
                node("node2", vec![containers("one", 1)]),
                node("node3", vec![containers("three", 3)]),
            ];
            let pending = workload("pending", HIGH, 900);

            let outcome = evaluator.dry_run_preemption(
                &pending,
                &refs(&nodes),
                &[],
                0,
                3,
                &CancellationToken::new(),
            );
            assert_eq!(outcome.candidates.len(), 3);

            let best = evaluator.select_candidate(&outcome.candidates);
            assert_eq!(best.map(|c| c.node_name), Some("node2".to_string()));
        }

        #[test]
        fn empty_and_single_fast_paths() {
            let evaluator = evaluator();
            assert!(evaluator.select_candidate(&[]).is_none());

            let only = Candidate::new("n1", Victims::default());
            assert_eq!(evaluator.select_candidate(std::slice::from_ref(&only)), Some(only));
        }
    }

    mod preempt_tests {
        use super::*;

        fn failures(entries: &[(&str, Status)]) -> HashMap<String, Status> {
            entries
                .iter()
                .map(|(n, s)| ((*n).to_string(), s.clone()))
                .collect()
        }

        #[test]
        fn nominates_and_evicts() {
            let evaluator = evaluator();
            let nodes = vec![
                node("node1", vec![workload("mid", MID, 600)]),
                node("node2", vec![workload("low", LOW, 600)]),
            ];
            let failures = failures(&[
                ("node1", Status::unschedulable(reasons::INSUFFICIENT_RESOURCES)),
                ("node2", Status::unschedulable(reasons::INSUFFICIENT_RESOURCES)),
            ]);
            let pending = workload("pending", HIGH, 600);

            let outcome = evaluator.preempt(&pending, &nodes, &failures, &[], &CancellationToken::new());
            let Ok(outcome) = outcome else {
                unreachable!("preempt failed: {outcome:?}");
            };

            assert_eq!(outcome.nominated_node_name, "node2");
            assert!(outcome.is_nominated());
            assert_eq!(
                evaluator.handler().evicted(),
                vec![WorkloadRef::new("default", "low")]
            );
            assert!(outcome.eviction.is_some_and(|e| e.is_successful()));
        }

        #[test]
        fn unresolvable_everywhere_is_not_an_error() {
            let evaluator = evaluator();
            let nodes = vec![
                node("node1", vec![workload("low", LOW, 600)]),
                node("node2", vec![workload("low2", LOW, 600)]),
            ];
            let failures = failures(&[
                ("node1", Status::unresolvable(reasons::NODE_AFFINITY_NOT_MATCH)),
                ("node2", Status::unresolvable(reasons::TAINT_TOLERATION_NOT_MATCH)),
            ]);

            let outcome = evaluator.preempt(
                &workload("pending", HIGH, 600),
                &nodes,
                &failures,
                &[],
                &CancellationToken::new(),
            );
            let Ok(outcome) = outcome else {
                unreachable!("preempt failed: {outcome:?}");
            };

            assert!(outcome.candidate.is_none());
            assert!(!outcome.is_nominated());
            assert_eq!(
                outcome.diagnosis.message(),
                "preemption: 0/2 nodes are available: 2 Preemption is not helpful for scheduling."
            );
            assert!(evaluator.handler().evicted().is_empty());
        }

        #[test]
        fn no_feasible_node_reports_diagnosis() {
            let evaluator = evaluator();
            let nodes = vec![
                node("node1", vec![workload("boss", HIGH, 900)]),
                node("node2", vec![workload("other", LOW, 100)]),
            ];
            let failures = failures(&[
                ("node1", Status::unschedulable(reasons::INSUFFICIENT_RESOURCES)),
                ("node2", Status::unresolvable(reasons::NODE_NAME_NOT_MATCH)),
            ]);

            let outcome = evaluator.preempt(
                &workload("pending", MID, 600),
                &nodes,
                &failures,
                &[],
                &CancellationToken::new(),
            );
            let Ok(outcome) = outcome else {
                unreachable!("preempt failed: {outcome:?}");
            };

            assert!(outcome.candidate.is_none());
            assert_eq!(outcome.diagnosis.nodes_considered, 1);
            assert_eq!(
                outcome.diagnosis.message(),
                "preemption: 0/2 nodes are available: 1 No preemption victims found for incoming workload, 1 Preemption is not helpful for scheduling."
            );
        }

        #[test]
        fn empty_snapshot_is_an_error() {
            let result = evaluator().preempt(
                &workload("pending", HIGH, 1),
                &[],
                &HashMap::new(),
                &[],
                &CancellationToken::new(),
            );
            assert_eq!(result, Err(PreemptionError::NoNodesAvailable));
        }

        #[test]
        fn never_policy_skips() {
            let evaluator = evaluator();
            let nodes = vec![node("node1", vec![workload("low", LOW, 600)])];
            let pending =
                workload("pending", HIGH, 600).with_preemption_policy(PreemptionPolicy::Never);

            let outcome = evaluator.preempt(&pending, &nodes, &HashMap::new(), &[], &CancellationToken::new());
            let Ok(outcome) = outcome else {
                unreachable!("preempt failed: {outcome:?}");
            };

            assert!(outcome.skipped.is_some());
            assert!(evaluator.handler().evicted().is_empty());
        }

        #[test]
        fn disabled_config_skips() {
            let plugin =
                DefaultPreemption::new(Arc::new(ResourceFitFilter::new()), &config()).with_fixed_offset(0);
            let evaluator = Evaluator::new(
                config().with_enabled(false),
                plugin,
                NoOpEvictionHandler::new(),
            );
            let Ok(evaluator) = evaluator else {
                unreachable!("config is valid");
            };
            let nodes = vec![node("node1", vec![workload("low", LOW, 600)])];

            let outcome = evaluator.preempt(
                &workload("pending", HIGH, 600),
                &nodes,
                &HashMap::new(),
                &[],
                &CancellationToken::new(),
            );
            assert_eq!(
                outcome.ok().and_then(|o| o.skipped),
                Some("preemption is disabled".to_string())
            );
        }

        #[test]
        fn eviction_failures_keep_the_decision() {
            let evaluator = evaluator();
            evaluator
                .handler()
                .fail_on(WorkloadRef::new("default", "a"));
            let nodes = vec![node(
                "node1",
                vec![workload("a", LOW, 500), workload("b", LOW, 500)],
            )];
            let pending = workload("pending", HIGH, 1000);

            let outcome = evaluator.preempt(&pending, &nodes, &HashMap::new(), &[], &CancellationToken::new());
            let Ok(outcome) = outcome else {
                unreachable!("preempt failed: {outcome:?}");
            };

            assert_eq!(outcome.nominated_node_name, "node1");
            let eviction = outcome.eviction.unwrap_or_default();
            assert_eq!(eviction.failures.len(), 1);
            assert_eq!(eviction.evicted_workloads, vec![WorkloadRef::new("default", "b")]);
        }

        #[test]
        fn invalid_config_rejected() {
            let plugin = DefaultPreemption::new(Arc::new(ResourceFitFilter::new()), &config());
            let result = Evaluator::new(
                config().with_parallelism(0),
                plugin,
                NoOpEvictionHandler::new(),
            );
            assert!(result.is_err());
        }
    }

    mod proptest_tests {
        use super::*;
        use proptest::prelude::*;

        fn fits(pending: &Workload, node: &NodeInfo) -> bool {
            ResourceFitFilter::new()
                .filter(pending, node)
                .is_ok_and(|s| s.is_success())
        }

        proptest! {
            #[test]
            fn candidates_are_minimal_and_lower_priority(
                occupants in prop::collection::vec((0i32..200, 1u64..400), 1..8),
                pending_priority in 1i32..200,
                pending_cpu in 1u64..1000,
            ) {
                let workloads: Vec<Workload> = occupants
                    .iter()
                    .enumerate()
                    .map(|(i, (p, cpu))| workload(&format!("w{i}"), *p, *cpu))
                    .collect();
                let original = NodeInfo::new("node", Resources::new().with_cpu(1500));
                let original = workloads.into_iter().fold(original, NodeInfo::with_workload);
                let pending = workload("pending", pending_priority, pending_cpu);
                let nodes = vec![original.clone()];

                let outcome = evaluator().dry_run_preemption(
                    &pending,
                    &refs(&nodes),
                    &[],
                    0,
                    1,
                    &CancellationToken::new(),
                );

                for candidate in &outcome.candidates {
                    let victims = &candidate.victims.workloads;
                    prop_assert!(!victims.is_empty());
                    for v in victims {
                        prop_assert!(v.priority < pending.priority);
                    }

                    let mut reduced = original.clone();
                    for v in victims {
                        reduced.remove_workload(&v.key);
                    }
                    prop_assert!(fits(&pending, &reduced));

                    for v in victims {
                        let mut readmitted = reduced.clone();
                        readmitted.add_workload(v.clone());
                        prop_assert!(!fits(&pending, &readmitted));
                    }
                }
            }
        }
    }
}
