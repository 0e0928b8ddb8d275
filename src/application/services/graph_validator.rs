//! Graph validator service ("rain check")
//!
//! Generalizes the teacher's `DependencyAnalyzer`
//! (`application/services/dependency_analyzer.rs`, keyed by job name over a
//! `petgraph::DiGraph<String, String>`) from Control-M job-name edges to
//! identity-keyed job edges, and replaces its `petgraph::algo::toposort`
//! call with an iterative topological-peeling algorithm: this lets
//! `last_cycle()` report every job left in the unresolved remainder, not
//! just the one node `toposort` points at.
//!
//! Read-only: never mutates a job's runtime state.

use std::collections::{HashMap, HashSet};

use petgraph::graph::{DiGraph, NodeIndex};

use crate::domain::entities::{Job, JobId};
use crate::error::GraphError;

/// Validates the `required` graph over a job set before orchestration.
#[derive(Default)]
pub struct GraphValidator {
    last_cycle: Vec<JobId>,
}

impl GraphValidator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Runs two checks:
    /// - every prerequisite must resolve to a member of `jobs` (an
    ///   ill-typed, dangling prerequisite otherwise);
    /// - the `required` graph over `jobs` must be acyclic.
    ///
    /// Forever jobs are included in the peel so a cycle touching one is
    /// still caught (a stricter superset of "acyclic over non-forever
    /// jobs", see DESIGN.md).
    pub fn validate(&mut self, jobs: &[Job]) -> Result<(), GraphError> {
        self.last_cycle.clear();
        let ids: HashSet<JobId> = jobs.iter().map(Job::id).collect();

        let mut unresolved: HashMap<JobId, HashSet<JobId>> = HashMap::with_capacity(jobs.len());
        for job in jobs {
            let required = job.required();
            for prereq in &required {
                if !ids.contains(prereq) {
                    return Err(GraphError::UnknownPrerequisite);
                }
            }
            unresolved.insert(job.id(), required);
        }

        loop {
            if unresolved.is_empty() {
                return Ok(());
            }
            let resolvable: Vec<JobId> = unresolved
                .iter()
                .filter(|(_, reqs)| reqs.iter().all(|r| !unresolved.contains_key(r)))
                .map(|(id, _)| *id)
                .collect();
            if resolvable.is_empty() {
                self.last_cycle = unresolved.keys().copied().collect();
                return Err(GraphError::Cycle(unresolved.len()));
            }
            for id in resolvable {
                unresolved.remove(&id);
            }
        }
    }

    /// The jobs left un-peeled by the most recent failed `validate` call, so
    /// the introspection surface can render the offending subgraph.
    pub fn last_cycle(&self) -> &[JobId] {
        &self.last_cycle
    }

    /// Renders the current job set as a `petgraph` digraph, for callers
    /// (e.g. the introspection surface) that want to run their own
    /// graph queries over the same edges the validator saw.
    pub fn to_petgraph(jobs: &[Job]) -> DiGraph<JobId, ()> {
        let mut graph = DiGraph::new();
        let mut index: HashMap<JobId, NodeIndex> = HashMap::with_capacity(jobs.len());
        for job in jobs {
            index.insert(job.id(), graph.add_node(job.id()));
        }
        for job in jobs {
            for prereq in job.required() {
                if let (Some(&from), Some(&to)) = (index.get(&prereq), index.get(&job.id())) {
                    graph.add_edge(from, to, ());
                }
            }
        }
        graph
    }
}
