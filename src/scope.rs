use chrono::NaiveDate;
use serde::Serialize;
use tracing::warn;

use crate::domain::{Month, Period, ReportLevel, UnitOfWork, Year};
use crate::error::HarvestError;
use crate::manifest::{GLOBAL_PARENT, Manifest};

/// The dimensions one run covers.
#[derive(Debug, Clone, Serialize)]
pub struct RunScope {
    pub level: ReportLevel,
    pub states: Vec<String>,
    pub periods: Vec<Period>,
}

impl RunScope {
    pub fn new(level: ReportLevel, states: Vec<String>, periods: Vec<Period>) -> Self {
        Self {
            level,
            states,
            periods,
        }
    }

    /// Expands the scope against `manifest` into the full unit list.
    ///
    /// States without known children are skipped with a warning; levels that
    /// need a manifest fail if none of their parents has children.
    pub fn units(&self, manifest: Option<&Manifest>) -> Result<Vec<UnitOfWork>, HarvestError> {
        let mut units = Vec::new();
        match self.level {
            ReportLevel::State => {
                for period in &self.periods {
                    for state in &self.states {
                        units.push(UnitOfWork::state(state, *period));
                    }
                }
            }
            ReportLevel::Oem => {
                let categories = manifest
                    .and_then(|manifest| manifest.children(GLOBAL_PARENT))
                    .ok_or_else(|| HarvestError::EmptyManifest("vehicle categories".to_string()))?;
                for period in &self.periods {
                    for state in &self.states {
                        for category in categories {
                            units.push(UnitOfWork::oem(state, category, *period));
                        }
                    }
                }
            }
            ReportLevel::Rto => {
                let manifest = manifest
                    .filter(|manifest| !manifest.is_empty())
                    .ok_or_else(|| HarvestError::EmptyManifest("RTO offices".to_string()))?;
                for state in &self.states {
                    if manifest.children(state).is_none() {
                        warn!(state = %state, "no RTO offices known; skipping state");
                    }
                }
                for period in &self.periods {
                    for state in &self.states {
                        let Some(offices) = manifest.children(state) else {
                            continue;
                        };
                        for office in offices {
                            units.push(UnitOfWork::rto(state, office, *period));
                        }
                    }
                }
            }
        }
        Ok(units)
    }

    /// States in scope that yield no units because the manifest lists no
    /// children for them.
    pub fn unscheduled(&self, manifest: Option<&Manifest>) -> Vec<String> {
        if self.level != ReportLevel::Rto {
            return Vec::new();
        }
        self.states
            .iter()
            .filter(|state| manifest.and_then(|manifest| manifest.children(state)).is_none())
            .cloned()
            .collect()
    }
}

/// Which months a run covers, as given on the command line.
#[derive(Debug, Clone, Default)]
pub struct PeriodSelection {
    pub month: Option<Month>,
    pub year: Option<Year>,
    pub from_year: Option<Year>,
    pub to_year: Option<Year>,
    pub months: Vec<Month>,
}

impl PeriodSelection {
    /// A single month, a historical year range, or the month before `today`.
    pub fn periods(&self, today: NaiveDate) -> Result<Vec<Period>, HarvestError> {
        if self.from_year.is_some() || self.to_year.is_some() {
            if self.month.is_some() || self.year.is_some() {
                return Err(HarvestError::InvalidPeriod(
                    "--month/--year cannot be combined with a year range".to_string(),
                ));
            }
            let current = Period::previous_month(today)?.year;
            let from = self.from_year.or(self.to_year).unwrap_or(current);
            let to = self.to_year.unwrap_or(current);
            if from > to {
                return Err(HarvestError::InvalidPeriod(format!(
                    "year range {from}..{to} is empty"
                )));
            }
            let years = (from.value()..=to.value())
                .map(Year::new)
                .collect::<Result<Vec<_>, _>>()?;
            let months = if self.months.is_empty() {
                Month::ALL.to_vec()
            } else {
                self.months.clone()
            };
            return Ok(Period::grid(&years, &months));
        }

        match (self.month, self.year) {
            (Some(month), Some(year)) => Ok(vec![Period::new(year, month)]),
            (None, None) => Ok(vec![Period::previous_month(today)?]),
            _ => Err(HarvestError::InvalidPeriod(
                "--month and --year must be given together".to_string(),
            )),
        }
    }
}
