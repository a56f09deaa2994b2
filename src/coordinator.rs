//! Resumable batch coordination.
//!
//! A run is a sequence of passes. Each pass probes every unit, stops if
//! nothing is pending or if the satisfied count did not grow since the
//! previous pass, and otherwise dispatches every pending unit to the worker
//! pool and waits for all of them before probing again.

use std::collections::{HashMap, HashSet};

use rayon::ThreadPoolBuilder;
use rayon::prelude::*;
use serde::Serialize;
use tracing::{info, warn};

use crate::app::{ProgressEvent, ProgressSink};
use crate::channel::ReportSource;
use crate::domain::{ReportLevel, UnitOfWork};
use crate::error::HarvestError;
use crate::executor::{FetchExecutor, UnitOutcome};
use crate::store::ArtifactPath;

#[derive(Debug, Clone)]
pub struct CoordinatorOptions {
    pub workers: usize,
    pub max_passes: u32,
    pub force: bool,
    pub dry_run: bool,
}

impl Default for CoordinatorOptions {
    fn default() -> Self {
        Self {
            workers: 8,
            max_passes: 10,
            force: false,
            dry_run: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    /// Every resolvable unit is on disk.
    Complete,
    /// A pass made no progress; the remaining units are unresolved.
    Stalled,
    /// The pass limit was reached while still making progress.
    PassLimit,
    /// Nothing was dispatched.
    DryRun,
}

#[derive(Debug, Clone, Serialize)]
pub struct UnresolvedUnit {
    pub unit: UnitOfWork,
    pub path: ArtifactPath,
    pub reason: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct CompletionReport {
    pub level: ReportLevel,
    pub status: RunStatus,
    pub total: usize,
    pub satisfied: usize,
    pub passes: u32,
    /// Units dispatched in each pass that dispatched anything.
    pub dispatches: Vec<usize>,
    pub unresolved: Vec<UnresolvedUnit>,
    /// Parents in scope with no known children, so none of their units exist.
    pub unscheduled: Vec<String>,
}

impl CompletionReport {
    pub fn is_complete(&self) -> bool {
        self.unresolved.is_empty() && self.unscheduled.is_empty() && self.satisfied == self.total
    }

    pub fn dispatched(&self) -> usize {
        self.dispatches.iter().sum()
    }
}

pub struct Coordinator<'a, S: ReportSource> {
    executor: &'a FetchExecutor<S>,
    options: CoordinatorOptions,
}

impl<'a, S: ReportSource> Coordinator<'a, S> {
    pub fn new(executor: &'a FetchExecutor<S>, options: CoordinatorOptions) -> Self {
        Self { executor, options }
    }

    pub fn run(
        &self,
        level: ReportLevel,
        units: Vec<UnitOfWork>,
        sink: &dyn ProgressSink,
    ) -> Result<CompletionReport, HarvestError> {
        let store = self.executor.store();
        let units = dedup(units);
        let total = units.len();
        check_distinct_paths(&units, |unit| store.artifact_path(unit))?;

        let (resolvable, unresolvable): (Vec<UnitOfWork>, Vec<UnitOfWork>) = units
            .into_iter()
            .partition(|unit| !store.artifact_path(unit).is_unresolvable());

        let mut unresolved = unresolvable
            .into_iter()
            .map(|unit| {
                let path = store.artifact_path(&unit);
                let reason = format!(
                    "unresolvable label: {}",
                    unit.child.as_deref().unwrap_or_default()
                );
                warn!(unit = %unit, "office label does not match `<name> - <code>(...)`");
                UnresolvedUnit { unit, path, reason }
            })
            .collect::<Vec<_>>();

        if self.options.force && !self.options.dry_run {
            let mut cleared = 0usize;
            for unit in &resolvable {
                if store.clear_unit(unit)? {
                    cleared += 1;
                }
            }
            sink.event(ProgressEvent::message(format!(
                "phase=Prepare; cleared {cleared} existing report directories"
            )));
        }

        let pool = ThreadPoolBuilder::new()
            .num_threads(self.options.workers.max(1))
            .thread_name(|index| format!("harvest-worker-{index}"))
            .build()
            .map_err(|err| HarvestError::WorkerPool(err.to_string()))?;

        let mut outcomes: HashMap<UnitOfWork, UnitOutcome> = HashMap::new();
        let mut dispatches = Vec::new();
        let mut previous_satisfied: Option<usize> = None;
        let mut passes = 0u32;

        let (status, satisfied, pending) = loop {
            passes += 1;
            let (satisfied, pending): (Vec<&UnitOfWork>, Vec<&UnitOfWork>) =
                resolvable.iter().partition(|unit| store.probe(unit));
            sink.event(ProgressEvent::message(format!(
                "phase=Check; pass {passes}: {}/{} satisfied, {} pending",
                satisfied.len(),
                resolvable.len(),
                pending.len()
            )));

            if pending.is_empty() {
                break (RunStatus::Complete, satisfied.len(), pending);
            }
            if self.options.dry_run {
                break (RunStatus::DryRun, satisfied.len(), pending);
            }
            if previous_satisfied.is_some_and(|previous| satisfied.len() <= previous) {
                warn!(
                    pass = passes,
                    satisfied = satisfied.len(),
                    pending = pending.len(),
                    "no progress since previous pass; stopping"
                );
                break (RunStatus::Stalled, satisfied.len(), pending);
            }
            if dispatches.len() as u32 >= self.options.max_passes {
                warn!(pass = passes, "pass limit reached; stopping");
                break (RunStatus::PassLimit, satisfied.len(), pending);
            }

            sink.event(ProgressEvent::message(format!(
                "phase=Fetch; dispatching {} units to {} workers",
                pending.len(),
                self.options.workers.max(1)
            )));
            let results = pool.install(|| {
                pending
                    .par_iter()
                    .map(|unit| ((*unit).clone(), self.executor.execute(unit)))
                    .collect::<Vec<_>>()
            });
            let fetched = results.iter().filter(|(_, outcome)| outcome.is_fetched()).count();
            info!(
                pass = passes,
                dispatched = results.len(),
                fetched,
                "pass finished"
            );
            dispatches.push(results.len());
            outcomes.extend(results);
            previous_satisfied = Some(satisfied.len());
        };

        for unit in pending {
            let reason = match (status, outcomes.get(unit)) {
                (RunStatus::DryRun, _) => "pending".to_string(),
                (_, Some(outcome)) => outcome.reason(),
                (_, None) => "not attempted".to_string(),
            };
            unresolved.push(UnresolvedUnit {
                unit: unit.clone(),
                path: store.artifact_path(unit),
                reason,
            });
        }

        info!(
            level = %level,
            status = ?status,
            satisfied,
            total,
            passes,
            unresolved = unresolved.len(),
            "run finished"
        );

        Ok(CompletionReport {
            level,
            status,
            total,
            satisfied,
            passes,
            dispatches,
            unresolved,
            unscheduled: Vec::new(),
        })
    }
}

/// Fails if two distinct units resolve to the same artifact path.
pub fn check_distinct_paths<F>(units: &[UnitOfWork], path_of: F) -> Result<(), HarvestError>
where
    F: Fn(&UnitOfWork) -> ArtifactPath,
{
    let mut seen: HashMap<ArtifactPath, &UnitOfWork> = HashMap::new();
    for unit in units {
        let path = path_of(unit);
        if path.is_unresolvable() {
            continue;
        }
        if let Some(other) = seen.get(&path).filter(|other| **other != unit) {
            return Err(HarvestError::NamingCollision(format!("{other} and {unit}")));
        }
        seen.insert(path, unit);
    }
    Ok(())
}

fn dedup(units: Vec<UnitOfWork>) -> Vec<UnitOfWork> {
    let mut seen = HashSet::new();
    units
        .into_iter()
        .filter(|unit| seen.insert(unit.clone()))
        .collect()
}
