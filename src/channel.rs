use camino::Utf8Path;

use crate::domain::{ReportLevel, UnitOfWork};
use crate::error::ChannelError;

/// An external source of reports reached through single-tenant sessions.
pub trait ReportSource: Send + Sync {
    type Session: ReportSession;

    /// Opens a fresh session whose downloads land in `download_dir`.
    fn open(&self, download_dir: &Utf8Path) -> Result<Self::Session, ChannelError>;

    /// Lists the child identifiers (categories or office labels) under `parent`.
    fn list_children(&self, level: ReportLevel, parent: &str)
    -> Result<Vec<String>, ChannelError>;
}

pub trait ReportSession {
    /// Runs the interaction sequence for `unit`; on success a spreadsheet has
    /// been deposited in the session's download directory.
    fn perform(&mut self, unit: &UnitOfWork) -> Result<(), ChannelError>;

    fn close(self);
}
