use std::io::{self, Write};

use serde::Serialize;

use crate::app::{HarvestResult, ManifestResult, ProgressEvent, ProgressSink, StatusResult};
use crate::coordinator::{CompletionReport, RunStatus};

#[derive(Debug, Clone, Copy)]
pub enum OutputMode {
    Interactive,
    NonInteractive,
}

pub struct JsonOutput;

impl JsonOutput {
    pub fn print_harvest(result: &HarvestResult) -> io::Result<()> {
        Self::print_json(result)
    }

    pub fn print_status(result: &StatusResult) -> io::Result<()> {
        Self::print_json(result)
    }

    pub fn print_manifest(result: &ManifestResult) -> io::Result<()> {
        Self::print_json(result)
    }

    fn print_json<T: Serialize>(value: &T) -> io::Result<()> {
        let json = serde_json::to_string_pretty(value).map_err(io::Error::other)?;
        let mut stdout = io::stdout();
        stdout.write_all(json.as_bytes())?;
        stdout.write_all(b"\n")?;
        Ok(())
    }
}

impl ProgressSink for JsonOutput {
    fn event(&self, _event: ProgressEvent) {}
}

/// Progress lines on stderr for interactive use.
pub struct ConsoleOutput;

impl ProgressSink for ConsoleOutput {
    fn event(&self, event: ProgressEvent) {
        match event.elapsed {
            Some(elapsed) => eprintln!("{} ({:.1}s)", event.message, elapsed.as_secs_f64()),
            None => eprintln!("{}", event.message),
        }
    }
}

impl ConsoleOutput {
    pub fn print_report(report: &CompletionReport) {
        let green = "\x1b[32m";
        let yellow = "\x1b[33m";
        let cyan = "\x1b[36m";
        let red = "\x1b[31m";
        let reset = "\x1b[0m";

        let status = match report.status {
            RunStatus::Complete => format!("{green}complete{reset}"),
            RunStatus::Stalled => format!("{red}stalled{reset}"),
            RunStatus::PassLimit => format!("{yellow}pass limit reached{reset}"),
            RunStatus::DryRun => format!("{cyan}dry run{reset}"),
        };
        println!("{cyan}vahan-harvest {} summary{reset}", report.level);
        println!("status: {status}");
        println!(
            "satisfied: {}/{} in {} passes ({} dispatched)",
            report.satisfied,
            report.total,
            report.passes,
            report.dispatched()
        );
        if !report.unscheduled.is_empty() {
            println!(
                "{yellow}no known children for: {}{reset}",
                report.unscheduled.join(", ")
            );
        }
        if report.unresolved.is_empty() {
            return;
        }
        println!("{yellow}unresolved: {}{reset}", report.unresolved.len());
        for item in &report.unresolved {
            println!("{red}  {}{reset}", item.unit);
            println!("    {}", item.reason);
        }
    }

    pub fn print_status(result: &StatusResult) {
        for (level, count) in &result.reports_on_disk {
            println!("{level}: {count} reports on disk");
        }
        Self::print_report(&result.report);
    }

    pub fn print_manifest(result: &ManifestResult) {
        match &result.path {
            Some(path) => println!("{} manifest: {path}", result.level),
            None => {
                println!("{} reports have no manifest", result.level);
                return;
            }
        }
        println!(
            "{} parents, {} children",
            result.parents, result.children
        );
        if let Some(refresh) = &result.refresh {
            println!(
                "fetched {}, fell back {}, missing {}, saved: {}",
                refresh.fetched.len(),
                refresh.fell_back.len(),
                refresh.missing.len(),
                refresh.persisted
            );
            for parent in &refresh.missing {
                println!("  missing: {parent}");
            }
        }
    }
}
