//! Acquisition manifest: the known children (RTO offices, vehicle categories)
//! of each parent key, fetched from the dashboard and cached on disk.
//!
//! A refresh only replaces the stored file when the fresh fetch covers every
//! expected parent key. Anything less is merged in memory with the previous
//! file for the current run and never written back.

use std::collections::BTreeMap;
use std::fs;
use std::io;

use camino::{Utf8Path, Utf8PathBuf};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::domain::ReportLevel;
use crate::error::HarvestError;

/// Parent key used when the child list is not per state (OEM vehicle categories).
pub const GLOBAL_PARENT: &str = "*";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Manifest {
    entries: BTreeMap<String, Vec<String>>,
}

impl Manifest {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, parent: impl Into<String>, children: Vec<String>) {
        self.entries.insert(parent.into(), children);
    }

    pub fn get(&self, parent: &str) -> Option<&[String]> {
        self.entries.get(parent).map(Vec::as_slice)
    }

    /// Children of `parent`, only if at least one is known.
    pub fn children(&self, parent: &str) -> Option<&[String]> {
        self.get(parent).filter(|children| !children.is_empty())
    }

    pub fn parents(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn total_children(&self) -> usize {
        self.entries.values().map(Vec::len).sum()
    }

    /// Whether every expected parent has a non-empty child list.
    pub fn covers(&self, expected: &[String]) -> bool {
        expected.iter().all(|parent| self.children(parent).is_some())
    }

    /// Reads a manifest file. A missing file is an empty manifest; so is a
    /// corrupt one, after a warning.
    pub fn load(path: &Utf8Path) -> Result<Self, HarvestError> {
        let content = match fs::read_to_string(path.as_std_path()) {
            Ok(content) => content,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(Self::new()),
            Err(err) => {
                return Err(HarvestError::Filesystem(format!("read manifest {path}: {err}")));
            }
        };
        match serde_json::from_str(&content) {
            Ok(manifest) => Ok(manifest),
            Err(err) => {
                warn!(%path, error = %err, "manifest file is corrupted; starting fresh");
                Ok(Self::new())
            }
        }
    }

    pub fn save(&self, path: &Utf8Path) -> Result<(), HarvestError> {
        let parent = path
            .parent()
            .ok_or_else(|| HarvestError::Filesystem("invalid manifest path".to_string()))?;
        fs::create_dir_all(parent.as_std_path())
            .map_err(|err| HarvestError::Filesystem(err.to_string()))?;
        let content = serde_json::to_vec_pretty(self)
            .map_err(|err| HarvestError::Filesystem(err.to_string()))?;
        let temp = tempfile::Builder::new()
            .prefix("vahan-harvest-manifest")
            .tempfile_in(parent.as_std_path())
            .map_err(|err| HarvestError::Filesystem(err.to_string()))?;
        fs::write(temp.path(), &content).map_err(|err| HarvestError::Filesystem(err.to_string()))?;
        temp.persist(path.as_std_path())
            .map_err(|err| HarvestError::Filesystem(err.to_string()))?;
        Ok(())
    }
}

/// Location of the manifest file for a level, if the level has one.
pub fn manifest_path(dir: &Utf8Path, level: ReportLevel) -> Option<Utf8PathBuf> {
    level
        .has_children()
        .then(|| dir.join(format!("{}_manifest.json", level.dir_name())))
}

#[derive(Debug, Clone, Serialize)]
pub struct ManifestRefresh {
    /// Mapping to use for this run.
    #[serde(skip)]
    pub manifest: Manifest,
    /// Parents whose children came from the fresh fetch.
    pub fetched: Vec<String>,
    /// Parents whose children came from the previous file.
    pub fell_back: Vec<String>,
    /// Parents with no children from either source.
    pub missing: Vec<String>,
    /// Whether the manifest file was rewritten.
    pub persisted: bool,
}

/// Combines a fresh fetch with the previous manifest for the expected parents.
pub fn merge(previous: &Manifest, fresh: &Manifest, expected: &[String]) -> ManifestRefresh {
    let mut manifest = Manifest::new();
    let mut fetched = Vec::new();
    let mut fell_back = Vec::new();
    let mut missing = Vec::new();

    for parent in expected {
        if let Some(children) = fresh.children(parent) {
            manifest.insert(parent.clone(), children.to_vec());
            fetched.push(parent.clone());
        } else if let Some(children) = previous.children(parent) {
            manifest.insert(parent.clone(), children.to_vec());
            fell_back.push(parent.clone());
        } else {
            missing.push(parent.clone());
        }
    }

    ManifestRefresh {
        manifest,
        fetched,
        fell_back,
        missing,
        persisted: false,
    }
}

/// Merges `fresh` into the manifest stored at `path` and rewrites the file
/// only if `fresh` alone covers every expected parent.
///
/// The rewritten file keeps stored parents outside `expected`; only the
/// freshly fetched parents replace their stored entries.
pub fn refresh(
    path: &Utf8Path,
    fresh: &Manifest,
    expected: &[String],
) -> Result<ManifestRefresh, HarvestError> {
    let previous = Manifest::load(path)?;
    let mut outcome = merge(&previous, fresh, expected);

    if fresh.covers(expected) {
        let mut stored = previous;
        for parent in &outcome.fetched {
            if let Some(children) = fresh.children(parent) {
                stored.insert(parent.clone(), children.to_vec());
            }
        }
        stored.save(path)?;
        outcome.persisted = true;
        info!(
            %path,
            fetched = outcome.fetched.len(),
            parents = stored.len(),
            "manifest fetch complete; saved"
        );
    } else {
        warn!(
            %path,
            fetched = outcome.fetched.len(),
            expected = expected.len(),
            fell_back = outcome.fell_back.len(),
            missing = outcome.missing.len(),
            "manifest fetch incomplete; keeping stored file"
        );
    }

    Ok(outcome)
}
