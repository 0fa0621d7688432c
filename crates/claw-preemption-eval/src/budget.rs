//! Disruption budgets and violation accounting.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::types::Workload;

/// Equality-based label selector.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct LabelSelector {
    /// Labels that must all be present with these values.
    pub match_labels: BTreeMap<String, String>,
}

impl LabelSelector {
    /// Creates an empty selector.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Requires a label.
    #[must_use]
    pub fn with_label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.match_labels.insert(key.into(), value.into());
        self
    }

    /// Returns true if the selector has no requirements.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.match_labels.is_empty()
    }

    /// Returns true if every requirement is present in `labels`.
    #[must_use]
    pub fn matches(&self, labels: &BTreeMap<String, String>) -> bool {
        self.match_labels
            .iter()
            .all(|(k, v)| labels.get(k).is_some_and(|actual| actual == v))
    }
}

/// Guarantees a minimum number of available workloads among those selected.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DisruptionBudget {
    /// Namespace the budget applies to.
    pub namespace: String,
    /// Budget name.
    pub name: String,
    /// Selects the covered workloads. An empty selector covers nothing.
    pub selector: LabelSelector,
    /// Minimum number of covered workloads that must stay available.
    pub min_available: u32,
    /// Covered workloads currently healthy.
    pub current_healthy: u32,
    /// Names of covered workloads already being disrupted.
    pub disrupted: BTreeSet<String>,
}

impl DisruptionBudget {
    /// Creates a budget.
    #[must_use]
    pub fn new(
        namespace: impl Into<String>,
        name: impl Into<String>,
        selector: LabelSelector,
        min_available: u32,
        current_healthy: u32,
    ) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
            selector,
            min_available,
            current_healthy,
            disrupted: BTreeSet::new(),
        }
    }

    /// Records a workload as already disrupted.
    #[must_use]
    pub fn with_disrupted(mut self, workload_name: impl Into<String>) -> Self {
        self.disrupted.insert(workload_name.into());
        self
    }

    /// How many more covered workloads may be disrupted.
    #[must_use]
    pub fn disruptions_allowed(&self) -> i64 {
        (i64::from(self.current_healthy) - i64::from(self.min_available)).max(0)
    }

    /// Returns true if this budget counts the workload against its allowance.
    #[must_use]
    pub fn covers(&self, workload: &Workload) -> bool {
        workload.key.namespace == self.namespace
            && !self.selector.is_empty()
            && self.selector.matches(&workload.labels)
            && !self.disrupted.contains(&workload.key.name)
    }
}

/// Splits `workloads` into budget-violating and non-violating groups.
///
/// Workloads are charged against matching budgets in the given order; a
/// workload violates when any budget it is charged to goes negative. Both
/// groups preserve input order.
#[must_use]
pub fn split_by_violation<'a>(
    workloads: &'a [Workload],
    budgets: &[DisruptionBudget],
) -> (Vec<&'a Workload>, Vec<&'a Workload>) {
    let mut allowed: Vec<i64> = budgets.iter().map(DisruptionBudget::disruptions_allowed).collect();
    let mut violating = Vec::new();
    let mut non_violating = Vec::new();

    for workload in workloads {
        let mut violates = false;
        for (budget, remaining) in budgets.iter().zip(allowed.iter_mut()) {
            if !budget.covers(workload) {
                continue;
            }
            *remaining -= 1;
            if *remaining < 0 {
                violates = true;
            }
        }
        if violates {
            violating.push(workload);
        } else {
            non_violating.push(workload);
        }
    }

    (violating, non_violating)
}
