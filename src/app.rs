use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use camino::Utf8PathBuf;
use rayon::ThreadPoolBuilder;
use rayon::prelude::*;
use serde::Serialize;
use tracing::{info, warn};

use crate::channel::ReportSource;
use crate::config::ResolvedConfig;
use crate::coordinator::{CompletionReport, Coordinator, CoordinatorOptions};
use crate::domain::{Period, ReportLevel};
use crate::error::HarvestError;
use crate::executor::{Attempted, FetchExecutor};
use crate::manifest::{self, GLOBAL_PARENT, Manifest, ManifestRefresh};
use crate::scope::RunScope;
use crate::store::ArtifactStore;

#[derive(Debug, Clone, Default)]
pub struct HarvestOptions {
    pub force: bool,
    pub dry_run: bool,
    /// Use the stored manifest as-is instead of fetching a fresh one.
    pub skip_manifest_refresh: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct HarvestResult {
    pub manifest: Option<ManifestRefresh>,
    pub report: CompletionReport,
}

#[derive(Debug, Clone, Serialize)]
pub struct StatusResult {
    pub reports_on_disk: BTreeMap<String, usize>,
    pub report: CompletionReport,
}

#[derive(Debug, Clone, Serialize)]
pub struct ManifestResult {
    pub level: ReportLevel,
    pub path: Option<String>,
    pub parents: usize,
    pub children: usize,
    pub refresh: Option<ManifestRefresh>,
    pub entries: Manifest,
}

#[derive(Debug, Clone)]
pub struct ProgressEvent {
    pub message: String,
    pub elapsed: Option<Duration>,
}

impl ProgressEvent {
    pub fn message(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            elapsed: None,
        }
    }
}

pub trait ProgressSink {
    fn event(&self, event: ProgressEvent);
}

pub struct App<S: ReportSource> {
    config: ResolvedConfig,
    executor: FetchExecutor<S>,
}

impl<S: ReportSource> App<S> {
    pub fn new(config: ResolvedConfig, source: S) -> Self {
        let store = ArtifactStore::new(config.artifact_root.clone());
        let executor = FetchExecutor::new(source, store, config.retry);
        Self { config, executor }
    }

    pub fn config(&self) -> &ResolvedConfig {
        &self.config
    }

    pub fn store(&self) -> &ArtifactStore {
        self.executor.store()
    }

    pub fn harvest(
        &self,
        level: ReportLevel,
        periods: Vec<Period>,
        options: HarvestOptions,
        sink: &dyn ProgressSink,
    ) -> Result<HarvestResult, HarvestError> {
        sink.event(ProgressEvent::message(format!(
            "phase=Resolve; {level} reports for {} months",
            periods.len()
        )));

        let (manifest, refresh) = if !level.has_children() {
            (None, None)
        } else if options.skip_manifest_refresh || options.dry_run {
            (Some(self.load_manifest(level)?), None)
        } else {
            let refresh = self.refresh_manifest(level, sink)?;
            (Some(refresh.manifest.clone()), Some(refresh))
        };

        let scope = RunScope::new(level, self.config.states.clone(), periods);
        let units = scope.units(manifest.as_ref())?;
        let unscheduled = scope.unscheduled(manifest.as_ref());
        sink.event(ProgressEvent::message(format!(
            "phase=Resolve; {} units in scope",
            units.len()
        )));

        let start = Instant::now();
        let coordinator = Coordinator::new(
            &self.executor,
            CoordinatorOptions {
                workers: self.config.workers,
                max_passes: self.config.max_passes,
                force: options.force,
                dry_run: options.dry_run,
            },
        );
        let mut report = coordinator.run(level, units, sink)?;
        report.unscheduled = unscheduled;
        sink.event(ProgressEvent {
            message: format!(
                "phase=Done; {}/{} satisfied after {} passes",
                report.satisfied, report.total, report.passes
            ),
            elapsed: Some(start.elapsed()),
        });

        Ok(HarvestResult {
            manifest: refresh,
            report,
        })
    }

    /// Probes the scope without fetching anything.
    pub fn status(
        &self,
        level: ReportLevel,
        periods: Vec<Period>,
        sink: &dyn ProgressSink,
    ) -> Result<StatusResult, HarvestError> {
        let result = self.harvest(
            level,
            periods,
            HarvestOptions {
                force: false,
                dry_run: true,
                skip_manifest_refresh: true,
            },
            sink,
        )?;
        let reports_on_disk = self
            .store()
            .count_reports()?
            .into_iter()
            .map(|(level, count)| (level.to_string(), count))
            .collect();
        Ok(StatusResult {
            reports_on_disk,
            report: result.report,
        })
    }

    pub fn show_manifest(&self, level: ReportLevel) -> Result<ManifestResult, HarvestError> {
        let path = manifest::manifest_path(&self.config.manifest_dir, level);
        let entries = self.load_manifest(level)?;
        Ok(ManifestResult {
            level,
            path: path.map(|path| path.to_string()),
            parents: entries.len(),
            children: entries.total_children(),
            refresh: None,
            entries,
        })
    }

    pub fn update_manifest(
        &self,
        level: ReportLevel,
        sink: &dyn ProgressSink,
    ) -> Result<ManifestResult, HarvestError> {
        let path = manifest::manifest_path(&self.config.manifest_dir, level);
        let refresh = self.refresh_manifest(level, sink)?;
        Ok(ManifestResult {
            level,
            path: path.map(|path| path.to_string()),
            parents: refresh.manifest.len(),
            children: refresh.manifest.total_children(),
            entries: refresh.manifest.clone(),
            refresh: Some(refresh),
        })
    }

    pub fn load_manifest(&self, level: ReportLevel) -> Result<Manifest, HarvestError> {
        match manifest::manifest_path(&self.config.manifest_dir, level) {
            Some(path) => Manifest::load(&path),
            None => Ok(Manifest::new()),
        }
    }

    fn expected_parents(&self, level: ReportLevel) -> Vec<String> {
        match level {
            ReportLevel::State => Vec::new(),
            ReportLevel::Oem => vec![GLOBAL_PARENT.to_string()],
            ReportLevel::Rto => self.config.states.clone(),
        }
    }

    /// Fetches child lists for every expected parent and merges them with the
    /// stored manifest.
    pub fn refresh_manifest(
        &self,
        level: ReportLevel,
        sink: &dyn ProgressSink,
    ) -> Result<ManifestRefresh, HarvestError> {
        let Some(path) = manifest::manifest_path(&self.config.manifest_dir, level) else {
            return Ok(manifest::merge(&Manifest::new(), &Manifest::new(), &[]));
        };
        let expected = self.expected_parents(level);
        sink.event(ProgressEvent::message(format!(
            "phase=Manifest; listing {} children for {} parents",
            level.child_name().unwrap_or("child"),
            expected.len()
        )));

        let fresh = self.fetch_children(level, &expected)?;
        let refresh = manifest::refresh(&path, &fresh, &expected)?;
        sink.event(ProgressEvent::message(format!(
            "phase=Manifest; fetched {}, fell back {}, missing {}, saved={}",
            refresh.fetched.len(),
            refresh.fell_back.len(),
            refresh.missing.len(),
            refresh.persisted
        )));
        Ok(refresh)
    }

    fn fetch_children(
        &self,
        level: ReportLevel,
        parents: &[String],
    ) -> Result<Manifest, HarvestError> {
        let pool = ThreadPoolBuilder::new()
            .num_threads(self.config.workers.min(parents.len()).max(1))
            .thread_name(|index| format!("manifest-worker-{index}"))
            .build()
            .map_err(|err| HarvestError::WorkerPool(err.to_string()))?;
        let source = self.executor.source();
        let budget = self.executor.budget();

        let results = pool.install(|| {
            parents
                .par_iter()
                .map(|parent| {
                    let label = format!("{level}:{parent}");
                    let attempted =
                        budget.run(&label, |_| source.list_children(level, parent));
                    (parent.clone(), attempted)
                })
                .collect::<Vec<_>>()
        });

        let mut fresh = Manifest::new();
        for (parent, attempted) in results {
            match attempted {
                Attempted::Succeeded { value, .. } => {
                    info!(parent = %parent, children = value.len(), "listed children");
                    fresh.insert(parent, value);
                }
                Attempted::Exhausted { last_error, .. } => {
                    warn!(parent = %parent, error = %last_error, "could not list children");
                }
                Attempted::Failed { error, .. } => {
                    warn!(parent = %parent, error = %error, "could not list children");
                }
            }
        }
        Ok(fresh)
    }

    pub fn manifest_path(&self, level: ReportLevel) -> Option<Utf8PathBuf> {
        manifest::manifest_path(&self.config.manifest_dir, level)
    }
}
