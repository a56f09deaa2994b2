use std::fmt;
use std::path::PathBuf;

use miette::Diagnostic;
use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
pub enum HarvestError {
    #[error("invalid report level: {0}")]
    InvalidLevel(String),

    #[error("invalid month label: {0} (expected JAN..DEC)")]
    InvalidMonth(String),

    #[error("invalid year: {0}")]
    InvalidYear(String),

    #[error("invalid period: {0}")]
    InvalidPeriod(String),

    #[error("unresolvable office label: {0}")]
    UnresolvableLabel(String),

    #[error("two units map to the same artifact path: {0}")]
    NamingCollision(String),

    #[error("failed to read config file at {0}")]
    ConfigRead(PathBuf),

    #[error("failed to parse JSON config: {0}")]
    ConfigParse(String),

    #[error("invalid config: {0}")]
    InvalidConfig(String),

    #[error("filesystem error: {0}")]
    Filesystem(String),

    #[error("manifest has no entries for {0}")]
    EmptyManifest(String),

    #[error("failed to start worker pool: {0}")]
    WorkerPool(String),

    #[error(transparent)]
    Channel(#[from] ChannelError),
}

/// Failure classes exposed by a report channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelErrorKind {
    Timeout,
    StaleElement,
    Channel,
    Fatal,
}

impl ChannelErrorKind {
    pub fn is_transient(self) -> bool {
        !matches!(self, ChannelErrorKind::Fatal)
    }
}

impl fmt::Display for ChannelErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChannelErrorKind::Timeout => write!(f, "timeout"),
            ChannelErrorKind::StaleElement => write!(f, "stale element"),
            ChannelErrorKind::Channel => write!(f, "channel error"),
            ChannelErrorKind::Fatal => write!(f, "fatal"),
        }
    }
}

#[derive(Debug, Clone, Error)]
#[error("{kind}: {message}")]
pub struct ChannelError {
    pub kind: ChannelErrorKind,
    pub message: String,
}

impl ChannelError {
    pub fn new(kind: ChannelErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(ChannelErrorKind::Timeout, message)
    }

    pub fn stale(message: impl Into<String>) -> Self {
        Self::new(ChannelErrorKind::StaleElement, message)
    }

    pub fn channel(message: impl Into<String>) -> Self {
        Self::new(ChannelErrorKind::Channel, message)
    }

    pub fn fatal(message: impl Into<String>) -> Self {
        Self::new(ChannelErrorKind::Fatal, message)
    }

    pub fn is_transient(&self) -> bool {
        self.kind.is_transient()
    }
}
