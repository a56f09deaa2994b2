use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::Path;

use camino::{Utf8Path, Utf8PathBuf};
use serde::Serialize;
use tempfile::Builder;

use crate::domain::{ReportLevel, UnitOfWork, sanitize_category, sanitize_state};
use crate::error::HarvestError;

/// File name every downloaded report is stored under.
pub const REPORT_FILE_NAME: &str = "reportTable.xlsx";

/// Extensions the dashboard's export button produces.
const REPORT_EXTENSIONS: [&str; 2] = ["xlsx", "xls"];

/// Where a unit's artifact lives, or why it cannot live anywhere.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ArtifactPath {
    Resolved { path: Utf8PathBuf },
    Unresolvable { label: String },
}

impl ArtifactPath {
    pub fn resolved(&self) -> Option<&Utf8Path> {
        match self {
            ArtifactPath::Resolved { path } => Some(path),
            ArtifactPath::Unresolvable { .. } => None,
        }
    }

    pub fn is_unresolvable(&self) -> bool {
        matches!(self, ArtifactPath::Unresolvable { .. })
    }
}

/// Directory tree of downloaded reports, keyed `level/state[/child]/year/month`.
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    root: Utf8PathBuf,
}

impl ArtifactStore {
    pub fn new(root: Utf8PathBuf) -> Self {
        Self { root }
    }

    pub fn root(&self) -> &Utf8Path {
        &self.root
    }

    pub fn level_root(&self, level: ReportLevel) -> Utf8PathBuf {
        self.root.join(level.dir_name())
    }

    /// Directory the report for `unit` is downloaded into.
    ///
    /// This is the only naming function: writers and the prober both go
    /// through it.
    pub fn unit_dir(&self, unit: &UnitOfWork) -> Result<Utf8PathBuf, HarvestError> {
        let mut dir = self
            .level_root(unit.level)
            .join(sanitize_state(&unit.state));
        match unit.level {
            ReportLevel::State => {}
            ReportLevel::Oem => {
                let category = unit.child.as_deref().unwrap_or_default();
                dir.push(sanitize_category(category));
            }
            ReportLevel::Rto => {
                let label = unit.child.as_deref().unwrap_or_default();
                let office = unit
                    .office()
                    .ok_or_else(|| HarvestError::UnresolvableLabel(label.to_string()))?;
                dir.push(office.folder_name());
            }
        }
        dir.push(unit.period.year.to_string());
        dir.push(unit.period.month.label());
        Ok(dir)
    }

    pub fn artifact_path(&self, unit: &UnitOfWork) -> ArtifactPath {
        match self.unit_dir(unit) {
            Ok(dir) => ArtifactPath::Resolved {
                path: dir.join(REPORT_FILE_NAME),
            },
            Err(_) => ArtifactPath::Unresolvable {
                label: unit.child.clone().unwrap_or_default(),
            },
        }
    }

    /// True iff the unit's report exists as a non-empty regular file.
    pub fn probe(&self, unit: &UnitOfWork) -> bool {
        match self.artifact_path(unit) {
            ArtifactPath::Resolved { path } => is_non_empty_file(path.as_std_path()),
            ArtifactPath::Unresolvable { .. } => false,
        }
    }

    pub fn ensure_unit_dir(&self, unit: &UnitOfWork) -> Result<Utf8PathBuf, HarvestError> {
        let dir = self.unit_dir(unit)?;
        fs::create_dir_all(dir.as_std_path())
            .map_err(|err| HarvestError::Filesystem(format!("create {dir}: {err}")))?;
        Ok(dir)
    }

    /// Removes the unit's month directory so the next pass re-fetches it.
    pub fn clear_unit(&self, unit: &UnitOfWork) -> Result<bool, HarvestError> {
        let dir = self.unit_dir(unit)?;
        if !dir.as_std_path().exists() {
            return Ok(false);
        }
        fs::remove_dir_all(dir.as_std_path())
            .map_err(|err| HarvestError::Filesystem(format!("remove {dir}: {err}")))?;
        Ok(true)
    }

    /// Moves the newest completed spreadsheet in `dir` to the fixed report name.
    ///
    /// Returns the final path, or `None` if nothing usable was downloaded.
    pub fn settle_download(dir: &Utf8Path) -> Result<Option<Utf8PathBuf>, HarvestError> {
        let target = dir.join(REPORT_FILE_NAME);
        if is_non_empty_file(target.as_std_path()) {
            return Ok(Some(target));
        }
        let Some(candidate) = newest_completed_file(dir)? else {
            return Ok(None);
        };
        persist_atomic(&candidate, &target)?;
        Ok(Some(target))
    }

    /// Counts completed reports per level below the root.
    pub fn count_reports(&self) -> Result<HashMap<ReportLevel, usize>, HarvestError> {
        let mut counts = HashMap::new();
        for level in ReportLevel::ALL {
            let level_root = self.level_root(level);
            if !level_root.as_std_path().exists() {
                continue;
            }
            let count = walk_files(level_root.as_std_path())?
                .iter()
                .filter(|path| {
                    path.file_name().map(|name| name == REPORT_FILE_NAME).unwrap_or(false)
                        && is_non_empty_file(path)
                })
                .count();
            counts.insert(level, count);
        }
        Ok(counts)
    }
}

pub fn is_non_empty_file(path: &Path) -> bool {
    fs::metadata(path)
        .map(|meta| meta.is_file() && meta.len() > 0)
        .unwrap_or(false)
}

/// Spreadsheet exports only; in-flight downloads (`.crdownload`, `.part`)
/// and saved error pages are skipped.
fn is_spreadsheet(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| REPORT_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}

fn newest_completed_file(dir: &Utf8Path) -> Result<Option<Utf8PathBuf>, HarvestError> {
    let entries = match fs::read_dir(dir.as_std_path()) {
        Ok(entries) => entries,
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(err) => return Err(HarvestError::Filesystem(format!("read {dir}: {err}"))),
    };
    let mut newest = None;
    for entry in entries {
        let entry = entry.map_err(|err| HarvestError::Filesystem(err.to_string()))?;
        let path = entry.path();
        if !is_spreadsheet(&path) || !is_non_empty_file(&path) {
            continue;
        }
        let modified = entry
            .metadata()
            .and_then(|meta| meta.modified())
            .map_err(|err| HarvestError::Filesystem(err.to_string()))?;
        let path = Utf8PathBuf::from_path_buf(path)
            .map_err(|_| HarvestError::Filesystem("non-utf8 file path in download".to_string()))?;
        match &newest {
            Some((time, _)) if *time >= modified => {}
            _ => newest = Some((modified, path)),
        }
    }
    Ok(newest.map(|(_, path)| path))
}

fn persist_atomic(source: &Utf8Path, dest: &Utf8Path) -> Result<(), HarvestError> {
    let parent = dest
        .parent()
        .ok_or_else(|| HarvestError::Filesystem("invalid destination path".to_string()))?;
    let temp = Builder::new()
        .prefix("vahan-harvest-file")
        .tempfile_in(parent.as_std_path())
        .map_err(|err| HarvestError::Filesystem(err.to_string()))?;
    fs::copy(source.as_std_path(), temp.path())
        .map_err(|err| HarvestError::Filesystem(err.to_string()))?;
    temp.persist(dest.as_std_path())
        .map_err(|err| HarvestError::Filesystem(err.to_string()))?;
    fs::remove_file(source.as_std_path())
        .map_err(|err| HarvestError::Filesystem(err.to_string()))?;
    Ok(())
}

fn walk_files(root: &Path) -> Result<Vec<std::path::PathBuf>, HarvestError> {
    let mut items = Vec::new();
    let mut stack = vec![root.to_path_buf()];
    while let Some(path) = stack.pop() {
        let entries =
            fs::read_dir(&path).map_err(|err| HarvestError::Filesystem(err.to_string()))?;
        for entry in entries {
            let entry = entry.map_err(|err| HarvestError::Filesystem(err.to_string()))?;
            let path = entry.path();
            if path.is_dir() {
                stack.push(path);
            } else {
                items.push(path);
            }
        }
    }
    Ok(items)
}
