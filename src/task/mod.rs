//! Step graph: declarative provisioning steps with explicit prerequisites.
//!
//! Steps are declared once as DATA (id, prerequisites, action) and the
//! runner interprets the graph:
//!
//! ```text
//! TaskGraph (DATA)                          Runner (LOGIC)
//! ─────────────────────────────────         ──────────────────────────────
//! step("write-mirrorlist", [], ..)          validate: ids, prerequisites, DAG
//! step("install-initial-packages",          loop {
//!      ["write-mirrorlist", ..], ..)          spawn every Ready step
//! step("add-user",                            wait for one to finish
//!      ["install-initial-packages"], ..)      promote dependents to Ready
//!                                           }
//! ```
//!
//! Ordering between two steps exists only where a prerequisite edge says
//! so; everything else runs concurrently.

mod graph;
mod runner;

pub use graph::TaskGraph;

use std::fmt;
use std::future::Future;
use std::time::Duration;

use futures_util::future::BoxFuture;
use futures_util::FutureExt;

use crate::timing;

/// Future returned by a step action.
pub type StepFuture = BoxFuture<'static, anyhow::Result<()>>;

type Action = Box<dyn FnOnce() -> StepFuture + Send>;

/// A named unit of provisioning work.
pub struct Step {
    id: String,
    prerequisites: Vec<String>,
    action: Action,
}

impl Step {
    /// Declare a step that runs `action` once all `prerequisites` succeeded.
    pub fn new<F, Fut>(id: impl Into<String>, prerequisites: &[&str], action: F) -> Self
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        Self {
            id: id.into(),
            prerequisites: prerequisites.iter().map(|p| p.to_string()).collect(),
            action: Box::new(move || action().boxed()),
        }
    }

    /// Add more prerequisites, skipping ones already listed.
    pub fn after<I, S>(mut self, more: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for prerequisite in more {
            let prerequisite = prerequisite.into();
            if !self.prerequisites.contains(&prerequisite) {
                self.prerequisites.push(prerequisite);
            }
        }
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn prerequisites(&self) -> &[String] {
        &self.prerequisites
    }
}

impl fmt::Debug for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Step")
            .field("id", &self.id)
            .field("prerequisites", &self.prerequisites)
            .finish_non_exhaustive()
    }
}

/// Lifecycle of a step within one run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepState {
    Pending,
    Ready,
    Running,
    Succeeded,
    Failed,
}

/// How a step's action ended.
#[derive(Debug)]
pub enum Outcome {
    Succeeded,
    Failed(anyhow::Error),
}

/// Result of a single step, produced when its action completes.
#[derive(Debug)]
pub struct StepResult {
    pub id: String,
    pub outcome: Outcome,
    /// Wall-clock time spent in the action.
    pub duration: Duration,
}

/// Summary of a fully successful run.
#[derive(Debug)]
pub struct RunReport {
    /// Step results in completion order.
    pub results: Vec<StepResult>,
    pub elapsed: Duration,
}

impl RunReport {
    /// Ids of the steps in the order they finished.
    pub fn completion_order(&self) -> Vec<&str> {
        self.results.iter().map(|r| r.id.as_str()).collect()
    }

    /// Print per-step timings, slowest first.
    pub fn print(&self) {
        let mut results: Vec<&StepResult> = self.results.iter().collect();
        results.sort_by(|a, b| b.duration.cmp(&a.duration));

        println!("=== Step timings ===\n");
        for result in results {
            println!("  [{}] {}", timing::format_duration(result.duration), result.id);
        }
        println!(
            "\n{} step(s) succeeded in {}",
            self.results.len(),
            timing::format_duration(self.elapsed)
        );
    }
}
