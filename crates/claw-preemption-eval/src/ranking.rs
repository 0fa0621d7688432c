//! Candidate ranking.
//!
//! Candidates are compared by an ordered chain of comparators. Each returns
//! `Less` when the first candidate is preferred; the first non-`Equal`
//! answer decides. The chain always ends with the node name, so the order
//! is total for distinct nodes and the winner does not depend on input
//! order.

use std::cmp::Ordering;

use crate::plugin::ScoreFn;
use crate::types::Candidate;

/// Compares two candidates; `Less` prefers the first.
pub type Comparator<'a> = Box<dyn Fn(&Candidate, &Candidate) -> Ordering + Send + Sync + 'a>;

/// Prefers fewer disruption budget violations.
#[must_use]
pub fn fewer_pdb_violations(a: &Candidate, b: &Candidate) -> Ordering {
    a.victims.num_pdb_violations.cmp(&b.victims.num_pdb_violations)
}

/// Prefers fewer victims.
#[must_use]
pub fn fewer_victims(a: &Candidate, b: &Candidate) -> Ordering {
    a.victims.workloads.len().cmp(&b.victims.workloads.len())
}

/// Prefers the candidate whose most important victim is less important.
#[must_use]
pub fn lower_highest_priority(a: &Candidate, b: &Candidate) -> Ordering {
    a.victims.highest_priority().cmp(&b.victims.highest_priority())
}

/// Prefers a lower sum of victim priorities.
#[must_use]
pub fn lower_priority_sum(a: &Candidate, b: &Candidate) -> Ordering {
    a.victims.priority_sum().cmp(&b.victims.priority_sum())
}

/// Prefers fewer victims that asked for graceful eviction.
#[must_use]
pub fn fewer_graceful_victims(a: &Candidate, b: &Candidate) -> Ordering {
    a.victims.graceful_count().cmp(&b.victims.graceful_count())
}

/// Prefers the lexicographically smaller node name.
#[must_use]
pub fn smaller_node_name(a: &Candidate, b: &Candidate) -> Ordering {
    a.node_name.cmp(&b.node_name)
}

/// Turns a score function into a comparator that prefers the higher score.
fn higher_score(score: ScoreFn<'_>) -> Comparator<'_> {
    Box::new(move |a: &Candidate, b: &Candidate| score(&b.node_name).cmp(&score(&a.node_name)))
}

/// An ordered comparator chain.
pub struct CandidateRanker<'a> {
    comparators: Vec<Comparator<'a>>,
}

impl<'a> CandidateRanker<'a> {
    /// Builds the standard chain.
    ///
    /// Order: budget violations, `score_funcs` in order, victim count,
    /// highest victim priority, priority sum, graceful-eviction victims
    /// (when `rank_by_graceful_eviction`), node name.
    #[must_use]
    pub fn new(score_funcs: Vec<ScoreFn<'a>>, rank_by_graceful_eviction: bool) -> Self {
        let mut comparators: Vec<Comparator<'a>> = vec![Box::new(fewer_pdb_violations)];
        comparators.extend(score_funcs.into_iter().map(higher_score));
        comparators.push(Box::new(fewer_victims));
        comparators.push(Box::new(lower_highest_priority));
        comparators.push(Box::new(lower_priority_sum));
        if rank_by_graceful_eviction {
            comparators.push(Box::new(fewer_graceful_victims));
        }
        comparators.push(Box::new(smaller_node_name));
        Self { comparators }
    }

    /// Number of comparators in the chain.
    #[must_use]
    pub fn len(&self) -> usize {
        self.comparators.len()
    }

    /// Returns true if the chain is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.comparators.is_empty()
    }

    /// Compares two candidates with the first comparator that is not a tie.
    #[must_use]
    pub fn compare(&self, a: &Candidate, b: &Candidate) -> Ordering {
        self.comparators
            .iter()
            .map(|cmp| cmp(a, b))
            .find(|o| o.is_ne())
            .unwrap_or(Ordering::Equal)
    }

    /// Picks the preferred candidate.
    #[must_use]
    pub fn select<'c>(&self, candidates: &'c [Candidate]) -> Option<&'c Candidate> {
        match candidates {
            [] => None,
            [only] => Some(only),
            _ => candidates
                .iter()
                .reduce(|best, c| if self.compare(c, best).is_lt() { c } else { best }),
        }
    }
}
