//! The preemption plugin seam and its default implementation.
//!
//! [`PreemptionPlugin`] is the capability bundle the [`Evaluator`] drives:
//! per-node victim search, dry-run sizing, eligibility, and extra ranking
//! scores. [`DefaultPreemption`] implements it on top of any [`NodeFilter`].
//!
//! [`Evaluator`]: crate::evaluator::Evaluator

use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::Arc;

use rand::Rng;
use tracing::debug;

use crate::budget::{split_by_violation, DisruptionBudget};
use crate::config::PreemptionConfig;
use crate::error::{PreemptionError, Result};
use crate::filter::NodeFilter;
use crate::status::{Status, StatusCode};
use crate::types::{Candidate, NodeInfo, Victims, Workload};

/// Ranking score for a node; higher is better.
pub type ScoreFn<'a> = Box<dyn Fn(&str) -> i64 + Send + Sync + 'a>;

/// Scores a node given every candidate's victims; higher is better.
pub type VictimScorer = Arc<dyn Fn(&str, &HashMap<String, Victims>) -> i64 + Send + Sync>;

/// Whether a pending workload may trigger preemption.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Eligibility {
    /// Preemption may proceed.
    Eligible,
    /// Preemption must not proceed, with the reason.
    Ineligible(String),
}

impl Eligibility {
    /// Returns true for [`Eligibility::Eligible`].
    #[must_use]
    pub const fn is_eligible(&self) -> bool {
        matches!(self, Self::Eligible)
    }
}

/// Capabilities the evaluator needs from a preemption implementation.
pub trait PreemptionPlugin: Send + Sync {
    /// Finds the workloads to evict from `node` so `pending` fits.
    ///
    /// `node` is a private copy that may be modified freely. Returns
    /// `Ok(None)` when no amount of eviction makes the workload fit.
    ///
    /// # Errors
    ///
    /// Returns error if the feasibility filter fails.
    fn select_victims_on_node(
        &self,
        pending: &Workload,
        node: &mut NodeInfo,
        budgets: &[DisruptionBudget],
    ) -> Result<Option<Victims>>;

    /// Returns `(offset, num_candidates)` for a dry run over `num_nodes` nodes.
    fn get_offset_and_num_candidates(&self, num_nodes: usize) -> (usize, usize);

    /// Indexes candidate victims by node name.
    fn candidates_to_victims_map(&self, candidates: &[Candidate]) -> HashMap<String, Victims> {
        candidates
            .iter()
            .map(|c| (c.node_name.clone(), c.victims.clone()))
            .collect()
    }

    /// Decides whether `pending` may preempt at all.
    ///
    /// `nominated_status` is the filter verdict recorded for the workload's
    /// nominated node, if it has one.
    fn pod_eligible_to_preempt_others(
        &self,
        pending: &Workload,
        nodes: &[NodeInfo],
        nominated_status: Option<&Status>,
    ) -> Eligibility;

    /// Extra ranking scores, consulted in order after budget violations.
    fn ordered_score_funcs<'a>(
        &'a self,
        _victims: &'a HashMap<String, Victims>,
    ) -> Vec<ScoreFn<'a>> {
        Vec::new()
    }
}

/// Scorer preferring nodes whose victims have fewer containers in total.
#[must_use]
pub fn fewer_containers_scorer() -> VictimScorer {
    Arc::new(|node, victims| {
        victims
            .get(node)
            .map_or(i64::MIN, |v| -(v.container_count() as i64))
    })
}

/// Orders workloads least important first.
fn least_important_first(a: &Workload, b: &Workload) -> Ordering {
    if b.is_more_important_than(a) {
        Ordering::Less
    } else if a.is_more_important_than(b) {
        Ordering::Greater
    } else {
        a.key.cmp(&b.key)
    }
}

/// Default preemption: greedy removal of lower-priority occupants followed
/// by a reprieve pass.
pub struct DefaultPreemption {
    filter: Arc<dyn NodeFilter>,
    min_candidate_nodes_percentage: u32,
    min_candidate_nodes_absolute: u32,
    fixed_offset: Option<usize>,
    scorers: Vec<VictimScorer>,
}

impl DefaultPreemption {
    /// Creates the plugin with sizing taken from `config`.
    #[must_use]
    pub fn new(filter: Arc<dyn NodeFilter>, config: &PreemptionConfig) -> Self {
        Self {
            filter,
            min_candidate_nodes_percentage: config.min_candidate_nodes_percentage,
            min_candidate_nodes_absolute: config.min_candidate_nodes_absolute,
            fixed_offset: None,
            scorers: Vec::new(),
        }
    }

    /// Uses a fixed dry-run offset instead of a random one.
    #[must_use]
    pub const fn with_fixed_offset(mut self, offset: usize) -> Self {
        self.fixed_offset = Some(offset);
        self
    }

    /// Appends a ranking scorer.
    #[must_use]
    pub fn with_scorer(mut self, scorer: VictimScorer) -> Self {
        self.scorers.push(scorer);
        self
    }

    fn fits(&self, pending: &Workload, node: &NodeInfo) -> Result<bool> {
        let status = self.filter.filter(pending, node)?;
        match status.code {
            StatusCode::Success => Ok(true),
            StatusCode::Unschedulable | StatusCode::UnschedulableAndUnresolvable => Ok(false),
            StatusCode::Error => Err(PreemptionError::FilterFailed {
                node: node.name.clone(),
                reason: status.reason().to_string(),
            }),
        }
    }
}

impl std::fmt::Debug for DefaultPreemption {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DefaultPreemption")
            .field("min_candidate_nodes_percentage", &self.min_candidate_nodes_percentage)
            .field("min_candidate_nodes_absolute", &self.min_candidate_nodes_absolute)
            .field("fixed_offset", &self.fixed_offset)
            .field("scorers", &self.scorers.len())
            .finish_non_exhaustive()
    }
}

impl PreemptionPlugin for DefaultPreemption {
    fn select_victims_on_node(
        &self,
        pending: &Workload,
        node: &mut NodeInfo,
        budgets: &[DisruptionBudget],
    ) -> Result<Option<Victims>> {
        let mut eligible: Vec<Workload> = node
            .workloads()
            .iter()
            .filter(|w| w.priority < pending.priority)
            .cloned()
            .collect();
        eligible.sort_by(least_important_first);

        let mut removed = Vec::with_capacity(eligible.len());
        let mut feasible = self.fits(pending, node)?;
        for workload in eligible {
            if feasible {
                break;
            }
            if let Some(w) = node.remove_workload(&workload.key) {
                removed.push(w);
            }
            feasible = self.fits(pending, node)?;
        }

        if !feasible {
            debug!(
                node = %node.name,
                workload = %pending.key,
                removed = removed.len(),
                "workload does not fit even after evicting all lower priority occupants"
            );
            return Ok(None);
        }

        // Reprieve in reverse removal order: most important first.
        let mut victims = Vec::new();
        for workload in removed.into_iter().rev() {
            let key = workload.key.clone();
            node.add_workload(workload);
            if !self.fits(pending, node)? {
                if let Some(w) = node.remove_workload(&key) {
                    victims.push(w);
                }
            }
        }

        let (violating, _) = split_by_violation(&victims, budgets);
        let num_pdb_violations = violating.len();

        debug!(
            node = %node.name,
            workload = %pending.key,
            victims = victims.len(),
            num_pdb_violations,
            "selected victims on node"
        );

        Ok(Some(Victims {
            workloads: victims,
            num_pdb_violations,
        }))
    }

    fn get_offset_and_num_candidates(&self, num_nodes: usize) -> (usize, usize) {
        if num_nodes == 0 {
            return (0, 0);
        }
        let by_percentage = num_nodes * self.min_candidate_nodes_percentage as usize / 100;
        let num_candidates = by_percentage
            .max(self.min_candidate_nodes_absolute as usize)
            .min(num_nodes);
        let offset = self
            .fixed_offset
            .map_or_else(|| rand::thread_rng().gen_range(0..num_nodes), |o| o % num_nodes);
        (offset, num_candidates)
    }

    fn pod_eligible_to_preempt_others(
        &self,
        pending: &Workload,
        nodes: &[NodeInfo],
        nominated_status: Option<&Status>,
    ) -> Eligibility {
        if !pending.preemption_policy.allows_preemption() {
            return Eligibility::Ineligible("preemption policy is Never".into());
        }

        let Some(nominated) = pending.nominated_node.as_deref() else {
            return Eligibility::Eligible;
        };

        // A nomination whose node can never fit is stale; preempt again.
        if nominated_status.is_some_and(|s| s.code == StatusCode::UnschedulableAndUnresolvable) {
            return Eligibility::Eligible;
        }

        let terminating = nodes
            .iter()
            .find(|n| n.name == nominated)
            .is_some_and(|node| {
                node.workloads()
                    .iter()
                    .any(|w| w.terminating && w.priority < pending.priority)
            });
        if terminating {
            return Eligibility::Ineligible(format!(
                "a lower priority workload is already terminating on nominated node {nominated}"
            ));
        }

        Eligibility::Eligible
    }

    fn ordered_score_funcs<'a>(
        &'a self,
        victims: &'a HashMap<String, Victims>,
    ) -> Vec<ScoreFn<'a>> {
        self.scorers
            .iter()
            .map(|scorer| -> ScoreFn<'a> { Box::new(move |node: &str| (**scorer)(node, victims)) })
            .collect()
    }
}
