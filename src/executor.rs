use std::fmt;
use std::thread;
use std::time::Duration;

use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::channel::{ReportSession, ReportSource};
use crate::domain::UnitOfWork;
use crate::error::{ChannelError, HarvestError};
use crate::store::ArtifactStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Backoff {
    Fixed,
    Linear,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryBudget {
    pub max_attempts: u32,
    pub delay: Duration,
    pub backoff: Backoff,
}

impl RetryBudget {
    pub fn new(max_attempts: u32, delay: Duration, backoff: Backoff) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            delay,
            backoff,
        }
    }

    /// Sleep after the `attempt`-th failure (1-based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        match self.backoff {
            Backoff::Fixed => self.delay,
            Backoff::Linear => self.delay.saturating_mul(attempt),
        }
    }

    /// Runs `op` until it succeeds, fails permanently, or the budget is spent.
    pub fn run<T, F>(&self, label: &dyn fmt::Display, mut op: F) -> Attempted<T>
    where
        F: FnMut(u32) -> Result<T, ChannelError>,
    {
        let mut attempt = 0;
        loop {
            attempt += 1;
            match op(attempt) {
                Ok(value) => {
                    return Attempted::Succeeded {
                        value,
                        attempts: attempt,
                    };
                }
                Err(error) if !error.is_transient() => {
                    warn!(
                        unit = %label,
                        attempt,
                        error = %error,
                        "permanent failure; not retrying"
                    );
                    return Attempted::Failed {
                        attempts: attempt,
                        error,
                    };
                }
                Err(error) if attempt >= self.max_attempts => {
                    warn!(unit = %label, attempt, error = %error, "retry budget exhausted");
                    return Attempted::Exhausted {
                        attempts: attempt,
                        last_error: error,
                    };
                }
                Err(error) => {
                    let delay = self.delay_for(attempt);
                    warn!(
                        unit = %label,
                        attempt,
                        kind = %error.kind,
                        error = %error.message,
                        delay_ms = delay.as_millis() as u64,
                        "transient failure; retrying"
                    );
                    thread::sleep(delay);
                }
            }
        }
    }
}

#[derive(Debug)]
pub enum Attempted<T> {
    Succeeded { value: T, attempts: u32 },
    Exhausted { attempts: u32, last_error: ChannelError },
    Failed { attempts: u32, error: ChannelError },
}

/// Result of one executor call for one unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum UnitOutcome {
    Fetched { attempts: u32 },
    Exhausted { attempts: u32, last_error: String },
    Failed { attempts: u32, error: String },
    Unresolvable { label: String },
}

impl UnitOutcome {
    pub fn is_fetched(&self) -> bool {
        matches!(self, UnitOutcome::Fetched { .. })
    }

    pub fn reason(&self) -> String {
        match self {
            UnitOutcome::Fetched { .. } => "fetched".to_string(),
            UnitOutcome::Exhausted {
                attempts,
                last_error,
            } => format!("retry budget exhausted after {attempts} attempts: {last_error}"),
            UnitOutcome::Failed { error, .. } => format!("failed: {error}"),
            UnitOutcome::Unresolvable { label } => format!("unresolvable label: {label}"),
        }
    }
}

/// Produces one unit's report through a [`ReportSource`], with retries.
pub struct FetchExecutor<S: ReportSource> {
    source: S,
    store: ArtifactStore,
    budget: RetryBudget,
}

impl<S: ReportSource> FetchExecutor<S> {
    pub fn new(source: S, store: ArtifactStore, budget: RetryBudget) -> Self {
        Self {
            source,
            store,
            budget,
        }
    }

    pub fn store(&self) -> &ArtifactStore {
        &self.store
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    pub fn budget(&self) -> RetryBudget {
        self.budget
    }

    pub fn execute(&self, unit: &UnitOfWork) -> UnitOutcome {
        let dir = match self.store.ensure_unit_dir(unit) {
            Ok(dir) => dir,
            Err(HarvestError::UnresolvableLabel(label)) => {
                return UnitOutcome::Unresolvable { label };
            }
            Err(err) => {
                return UnitOutcome::Failed {
                    attempts: 0,
                    error: err.to_string(),
                };
            }
        };

        let attempted = self.budget.run(unit, |_| {
            let mut session = self.source.open(&dir)?;
            let performed = session.perform(unit);
            session.close();
            performed?;
            match ArtifactStore::settle_download(&dir) {
                Ok(Some(_)) => Ok(()),
                Ok(None) => Err(ChannelError::timeout(format!("no report downloaded into {dir}"))),
                Err(err) => Err(ChannelError::fatal(err.to_string())),
            }
        });

        match attempted {
            Attempted::Succeeded { attempts, .. } => {
                info!(unit = %unit, attempts, "report downloaded");
                UnitOutcome::Fetched { attempts }
            }
            Attempted::Exhausted {
                attempts,
                last_error,
            } => UnitOutcome::Exhausted {
                attempts,
                last_error: last_error.to_string(),
            },
            Attempted::Failed { attempts, error } => UnitOutcome::Failed {
                attempts,
                error: error.to_string(),
            },
        }
    }
}
