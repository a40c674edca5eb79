//! Concurrent execution of a validated step graph.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::time::Instant;

use futures_util::FutureExt;
use tokio::task::JoinSet;
use tracing::Instrument;

use super::{Action, Outcome, RunReport, Step, StepResult, StepState};
use crate::error::{Error, Result};
use crate::timing;

/// Run `steps`, which must already have passed validation.
pub(super) async fn run(steps: Vec<Step>) -> Result<RunReport> {
    let started = Instant::now();
    let count = steps.len();

    let position = |id: &str| steps.iter().position(|s| s.id == id);
    let mut waiting = vec![0usize; count];
    let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); count];
    for (i, step) in steps.iter().enumerate() {
        let mut prerequisites: Vec<usize> = step
            .prerequisites
            .iter()
            .filter_map(|p| position(p))
            .collect();
        prerequisites.sort_unstable();
        prerequisites.dedup();
        waiting[i] = prerequisites.len();
        for p in prerequisites {
            dependents[p].push(i);
        }
    }

    let mut ids = Vec::with_capacity(count);
    let mut actions: Vec<Option<Action>> = Vec::with_capacity(count);
    for step in steps {
        ids.push(step.id);
        actions.push(Some(step.action));
    }

    let mut state: Vec<StepState> = waiting
        .iter()
        .map(|&w| if w == 0 { StepState::Ready } else { StepState::Pending })
        .collect();

    tracing::info!(steps = count, "running step graph");

    let mut running = JoinSet::new();
    let mut results = Vec::with_capacity(count);
    let mut failure: Option<(String, anyhow::Error)> = None;

    loop {
        if failure.is_none() {
            for i in 0..count {
                if state[i] != StepState::Ready {
                    continue;
                }
                if let Some(action) = actions[i].take() {
                    state[i] = StepState::Running;
                    running.spawn(run_step(i, ids[i].clone(), action));
                }
            }
        }

        let Some(joined) = running.join_next().await else {
            break;
        };
        let (i, result) = match joined {
            Ok(done) => done,
            // Steps catch their own panics; this is a cancelled task.
            Err(e) => {
                if failure.is_none() {
                    failure = Some(("<unknown>".to_string(), anyhow::anyhow!(e)));
                }
                continue;
            }
        };

        match result.outcome {
            Outcome::Succeeded => {
                state[i] = StepState::Succeeded;
                for &d in &dependents[i] {
                    waiting[d] -= 1;
                    if waiting[d] == 0 && state[d] == StepState::Pending {
                        state[d] = StepState::Ready;
                    }
                }
                results.push(result);
            }
            Outcome::Failed(cause) => {
                state[i] = StepState::Failed;
                if failure.is_none() {
                    if !running.is_empty() {
                        tracing::warn!(
                            in_flight = running.len(),
                            "step '{}' failed; waiting for running steps to finish",
                            result.id
                        );
                    }
                    failure = Some((result.id, cause));
                } else {
                    tracing::warn!(step = %result.id, "discarding later failure: {:#}", cause);
                }
            }
        }
    }

    if let Some((step, cause)) = failure {
        let skipped = state
            .iter()
            .filter(|s| matches!(s, StepState::Pending | StepState::Ready))
            .count();
        tracing::error!(skipped, "provisioning aborted");
        return Err(Error::StepFailed { step, cause });
    }

    tracing::info!(
        elapsed = %timing::format_duration(started.elapsed()),
        "all steps succeeded"
    );
    Ok(RunReport {
        results,
        elapsed: started.elapsed(),
    })
}

async fn run_step(index: usize, id: String, action: Action) -> (usize, StepResult) {
    let span = tracing::info_span!("step", step = %id);
    let started = Instant::now();

    let outcome = async {
        tracing::info!("start");
        let outcome = match AssertUnwindSafe(async move { action().await })
            .catch_unwind()
            .await
        {
            Ok(Ok(())) => Outcome::Succeeded,
            Ok(Err(e)) => Outcome::Failed(e),
            Err(panic) => Outcome::Failed(anyhow::anyhow!("step panicked: {}", panic_message(&*panic))),
        };
        let elapsed = timing::format_duration(started.elapsed());
        match &outcome {
            Outcome::Succeeded => tracing::info!(%elapsed, "success"),
            Outcome::Failed(e) => tracing::error!(%elapsed, "failed: {:#}", e),
        }
        outcome
    }
    .instrument(span)
    .await;

    (
        index,
        StepResult {
            id,
            outcome,
            duration: started.elapsed(),
        },
    )
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
