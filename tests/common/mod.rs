#![allow(dead_code)]

use std::collections::HashMap;
use std::fs;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use camino::{Utf8Path, Utf8PathBuf};

use vahan_harvest::channel::{ReportSession, ReportSource};
use vahan_harvest::domain::{ReportLevel, UnitOfWork};
use vahan_harvest::error::ChannelError;
use vahan_harvest::executor::{Backoff, RetryBudget};
use vahan_harvest::store::{ArtifactStore, REPORT_FILE_NAME};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Behavior {
    Succeed,
    /// Times out on the first `n` attempts of each unit, then succeeds.
    FailFirst(u32),
    AlwaysTransient,
    AlwaysFatal,
    /// Fails permanently for units of one state, succeeds otherwise.
    FailState(&'static str),
}

#[derive(Default)]
struct Calls {
    opens: usize,
    closes: usize,
    performed: Vec<UnitOfWork>,
    listed: Vec<String>,
}

pub struct MockSource {
    behavior: Behavior,
    children: HashMap<String, Vec<String>>,
    calls: Arc<Mutex<Calls>>,
}

impl MockSource {
    pub fn new(behavior: Behavior) -> Self {
        Self {
            behavior,
            children: HashMap::new(),
            calls: Arc::new(Mutex::new(Calls::default())),
        }
    }

    /// Parents not given here fail to list with a timeout.
    pub fn with_children(mut self, parent: &str, children: &[&str]) -> Self {
        self.children.insert(
            parent.to_string(),
            children.iter().map(|child| child.to_string()).collect(),
        );
        self
    }

    pub fn performed(&self) -> Vec<UnitOfWork> {
        self.calls.lock().unwrap().performed.clone()
    }

    pub fn perform_count(&self) -> usize {
        self.calls.lock().unwrap().performed.len()
    }

    pub fn opens(&self) -> usize {
        self.calls.lock().unwrap().opens
    }

    pub fn closes(&self) -> usize {
        self.calls.lock().unwrap().closes
    }

    pub fn listed(&self) -> Vec<String> {
        self.calls.lock().unwrap().listed.clone()
    }
}

pub struct MockSession {
    behavior: Behavior,
    dir: Utf8PathBuf,
    calls: Arc<Mutex<Calls>>,
}

impl ReportSource for MockSource {
    type Session = MockSession;

    fn open(&self, download_dir: &Utf8Path) -> Result<MockSession, ChannelError> {
        self.calls.lock().unwrap().opens += 1;
        Ok(MockSession {
            behavior: self.behavior,
            dir: download_dir.to_owned(),
            calls: Arc::clone(&self.calls),
        })
    }

    fn list_children(
        &self,
        _level: ReportLevel,
        parent: &str,
    ) -> Result<Vec<String>, ChannelError> {
        self.calls.lock().unwrap().listed.push(parent.to_string());
        self.children
            .get(parent)
            .cloned()
            .ok_or_else(|| ChannelError::timeout(format!("listing {parent} timed out")))
    }
}

impl ReportSession for MockSession {
    fn perform(&mut self, unit: &UnitOfWork) -> Result<(), ChannelError> {
        let attempt = {
            let mut calls = self.calls.lock().unwrap();
            calls.performed.push(unit.clone());
            calls.performed.iter().filter(|done| *done == unit).count() as u32
        };
        match self.behavior {
            Behavior::AlwaysTransient => Err(ChannelError::stale("element went stale")),
            Behavior::AlwaysFatal => Err(ChannelError::fatal("report table missing")),
            Behavior::FailState(state) if unit.state == state => {
                Err(ChannelError::fatal("state not selectable"))
            }
            Behavior::FailFirst(n) if attempt <= n => {
                Err(ChannelError::timeout("download button not clickable"))
            }
            _ => {
                fs::write(self.dir.join("reportTable (1).xlsx").as_std_path(), b"xlsx")
                    .map_err(|err| ChannelError::fatal(err.to_string()))?;
                Ok(())
            }
        }
    }

    fn close(self) {
        self.calls.lock().unwrap().closes += 1;
    }
}

pub fn temp_root(temp: &tempfile::TempDir) -> Utf8PathBuf {
    Utf8PathBuf::from_path_buf(temp.path().to_path_buf()).unwrap()
}

pub fn no_delay(max_attempts: u32) -> RetryBudget {
    RetryBudget::new(max_attempts, Duration::ZERO, Backoff::Fixed)
}

/// Writes a finished report for `unit` as if an earlier run had fetched it.
pub fn seed_report(store: &ArtifactStore, unit: &UnitOfWork) {
    let dir = store.ensure_unit_dir(unit).unwrap();
    fs::write(dir.join(REPORT_FILE_NAME).as_std_path(), b"xlsx").unwrap();
}
