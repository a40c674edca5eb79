//! Step registry and graph validation.

use std::collections::{HashMap, HashSet, VecDeque};
use std::future::Future;

use super::{runner, RunReport, Step};
use crate::error::{Error, Result};

/// A set of steps and their prerequisite edges.
#[derive(Debug, Default)]
pub struct TaskGraph {
    steps: Vec<Step>,
}

impl TaskGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a step.
    ///
    /// Problems with the graph (duplicate ids, unknown prerequisites, cycles)
    /// are reported by [`TaskGraph::validate`] and [`TaskGraph::run`].
    pub fn add(&mut self, step: Step) -> &mut Self {
        self.steps.push(step);
        self
    }

    /// Shorthand for `add(Step::new(..))`.
    pub fn step<F, Fut>(&mut self, id: &str, prerequisites: &[&str], action: F) -> &mut Self
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        self.add(Step::new(id, prerequisites, action))
    }

    /// Number of declared steps.
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Step ids in declaration order.
    pub fn ids(&self) -> Vec<String> {
        self.steps.iter().map(|s| s.id.clone()).collect()
    }

    /// Prerequisites of `id`, if such a step exists.
    pub fn prerequisites(&self, id: &str) -> Option<&[String]> {
        self.steps
            .iter()
            .find(|s| s.id == id)
            .map(|s| s.prerequisites.as_slice())
    }

    /// Check the graph and return a topological order of step ids.
    ///
    /// Kahn's algorithm; steps that become ready together keep their
    /// declaration order, so the result is deterministic.
    ///
    /// # Errors
    /// [`Error::DuplicateStep`], [`Error::UnknownPrerequisite`] or
    /// [`Error::CyclicDependency`] (listing every step left unordered).
    pub fn validate(&self) -> Result<Vec<String>> {
        let mut index: HashMap<&str, usize> = HashMap::with_capacity(self.steps.len());
        for (i, step) in self.steps.iter().enumerate() {
            if index.insert(step.id.as_str(), i).is_some() {
                return Err(Error::DuplicateStep {
                    step: step.id.clone(),
                });
            }
        }

        let mut in_degree = vec![0usize; self.steps.len()];
        let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); self.steps.len()];
        for (i, step) in self.steps.iter().enumerate() {
            let mut seen = HashSet::new();
            for prerequisite in &step.prerequisites {
                let &p = index.get(prerequisite.as_str()).ok_or_else(|| {
                    Error::UnknownPrerequisite {
                        step: step.id.clone(),
                        prerequisite: prerequisite.clone(),
                    }
                })?;
                if seen.insert(p) {
                    in_degree[i] += 1;
                    dependents[p].push(i);
                }
            }
        }

        let mut queue: VecDeque<usize> = (0..self.steps.len())
            .filter(|&i| in_degree[i] == 0)
            .collect();
        let mut order = Vec::with_capacity(self.steps.len());

        while let Some(i) = queue.pop_front() {
            order.push(self.steps[i].id.clone());
            let mut ready = Vec::new();
            for &d in &dependents[i] {
                in_degree[d] -= 1;
                if in_degree[d] == 0 {
                    ready.push(d);
                }
            }
            ready.sort_unstable();
            queue.extend(ready);
        }

        if order.len() != self.steps.len() {
            let cycle = self
                .steps
                .iter()
                .enumerate()
                .filter(|&(i, _)| in_degree[i] > 0)
                .map(|(_, s)| s.id.clone())
                .collect();
            return Err(Error::CyclicDependency { cycle });
        }

        Ok(order)
    }

    /// Validate the graph, then execute every step.
    ///
    /// Ready steps run concurrently. On the first failure no further steps
    /// are started; steps already running are awaited and their results
    /// discarded.
    ///
    /// # Errors
    /// A graph error before any action runs, or [`Error::StepFailed`] for
    /// the first step that failed.
    pub async fn run(self) -> Result<RunReport> {
        self.validate()?;
        runner::run(self.steps).await
    }
}
