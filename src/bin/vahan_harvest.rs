use std::process::ExitCode;

use camino::Utf8Path;
use clap::{Args, Parser, Subcommand};
use miette::IntoDiagnostic;
use tracing_subscriber::EnvFilter;

use vahan_harvest::app::{App, HarvestOptions, ProgressSink};
use vahan_harvest::channel::{ReportSession, ReportSource};
use vahan_harvest::config::{ConfigLoader, ResolvedConfig};
use vahan_harvest::coordinator::{CompletionReport, RunStatus};
use vahan_harvest::domain::{Month, Period, ReportLevel, UnitOfWork, Year};
use vahan_harvest::error::{ChannelError, HarvestError};
use vahan_harvest::output::{ConsoleOutput, JsonOutput, OutputMode};
use vahan_harvest::scope::PeriodSelection;
use vahan_harvest::webdriver::WebDriverSource;

#[derive(Parser)]
#[command(name = "vahan-harvest")]
#[command(about = "Resumable bulk download of Vahan dashboard registration reports")]
#[command(version, author)]
struct Cli {
    #[arg(long, global = true)]
    non_interactive: bool,

    /// Path to a vahan-harvest.json config file
    #[arg(long, global = true)]
    config: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    #[command(
        about = "Download every missing report in scope, resuming where a previous run stopped"
    )]
    Harvest(HarvestArgs),
    #[command(about = "Probe the artifact store without downloading anything")]
    Status(StatusArgs),
    #[command(about = "Inspect or refresh the stored child manifests")]
    Manifest(ManifestArgs),
}

#[derive(Args, Clone)]
struct PeriodArgs {
    #[arg(long)]
    month: Option<Month>,

    #[arg(long)]
    year: Option<Year>,

    /// First year of a historical range (all months unless --months is given)
    #[arg(long)]
    from_year: Option<Year>,

    #[arg(long)]
    to_year: Option<Year>,

    #[arg(long, value_delimiter = ',')]
    months: Vec<Month>,
}

#[derive(Args, Clone)]
struct HarvestArgs {
    level: ReportLevel,

    #[command(flatten)]
    period: PeriodArgs,

    /// Delete existing reports in scope and download them again
    #[arg(long)]
    force: bool,

    #[arg(long)]
    dry_run: bool,

    #[arg(long)]
    skip_manifest_refresh: bool,
}

#[derive(Args, Clone)]
struct StatusArgs {
    level: ReportLevel,

    #[command(flatten)]
    period: PeriodArgs,
}

#[derive(Args)]
struct ManifestArgs {
    #[command(subcommand)]
    command: ManifestCommand,
}

#[derive(Subcommand)]
enum ManifestCommand {
    #[command(about = "Print the stored manifest")]
    Show { level: ReportLevel },
    #[command(about = "List children on the dashboard and merge them into the manifest")]
    Refresh { level: ReportLevel },
}

fn main() -> ExitCode {
    match run() {
        Ok(code) => code,
        Err(report) => {
            eprintln!("{report:?}");
            if let Some(error) = report.downcast_ref::<HarvestError>() {
                return ExitCode::from(map_exit_code(error));
            }
            ExitCode::from(1)
        }
    }
}

fn map_exit_code(error: &HarvestError) -> u8 {
    match error {
        HarvestError::InvalidLevel(_)
        | HarvestError::InvalidMonth(_)
        | HarvestError::InvalidYear(_)
        | HarvestError::InvalidPeriod(_)
        | HarvestError::ConfigRead(_)
        | HarvestError::ConfigParse(_)
        | HarvestError::InvalidConfig(_)
        | HarvestError::EmptyManifest(_)
        | HarvestError::NamingCollision(_) => 2,
        HarvestError::Channel(_) => 3,
        _ => 1,
    }
}

fn report_exit_code(report: &CompletionReport) -> ExitCode {
    if report.status != RunStatus::DryRun
        && (!report.unresolved.is_empty() || !report.unscheduled.is_empty())
    {
        return ExitCode::from(4);
    }
    ExitCode::SUCCESS
}

fn run() -> miette::Result<ExitCode> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let output_mode = if cli.non_interactive {
        OutputMode::NonInteractive
    } else {
        OutputMode::Interactive
    };
    let config = ConfigLoader::resolve(cli.config.as_deref())?;

    match cli.command {
        Commands::Harvest(args) => {
            let source = WebDriverSource::new(config.webdriver.clone())?;
            run_harvest(args, App::new(config, source), output_mode)
        }
        Commands::Status(args) => run_status(args, App::new(config, NopSource), output_mode),
        Commands::Manifest(args) => run_manifest(args, config, output_mode),
    }
}

fn resolve_periods(args: &PeriodArgs) -> Result<Vec<Period>, HarvestError> {
    let selection = PeriodSelection {
        month: args.month,
        year: args.year,
        from_year: args.from_year,
        to_year: args.to_year,
        months: args.months.clone(),
    };
    selection.periods(chrono::Local::now().date_naive())
}

fn sink_for(output_mode: OutputMode) -> Box<dyn ProgressSink> {
    match output_mode {
        OutputMode::Interactive => Box::new(ConsoleOutput),
        OutputMode::NonInteractive => Box::new(JsonOutput),
    }
}

fn run_harvest<S: ReportSource>(
    args: HarvestArgs,
    app: App<S>,
    output_mode: OutputMode,
) -> miette::Result<ExitCode> {
    let periods = resolve_periods(&args.period)?;
    let options = HarvestOptions {
        force: args.force,
        dry_run: args.dry_run,
        skip_manifest_refresh: args.skip_manifest_refresh,
    };
    let sink = sink_for(output_mode);
    let result = app.harvest(args.level, periods, options, sink.as_ref())?;
    match output_mode {
        OutputMode::Interactive => ConsoleOutput::print_report(&result.report),
        OutputMode::NonInteractive => JsonOutput::print_harvest(&result).into_diagnostic()?,
    }
    Ok(report_exit_code(&result.report))
}

fn run_status<S: ReportSource>(
    args: StatusArgs,
    app: App<S>,
    output_mode: OutputMode,
) -> miette::Result<ExitCode> {
    let periods = resolve_periods(&args.period)?;
    let sink = sink_for(output_mode);
    let result = app.status(args.level, periods, sink.as_ref())?;
    match output_mode {
        OutputMode::Interactive => ConsoleOutput::print_status(&result),
        OutputMode::NonInteractive => JsonOutput::print_status(&result).into_diagnostic()?,
    }
    Ok(ExitCode::SUCCESS)
}

fn run_manifest(
    args: ManifestArgs,
    config: ResolvedConfig,
    output_mode: OutputMode,
) -> miette::Result<ExitCode> {
    let result = match args.command {
        ManifestCommand::Show { level } => App::new(config, NopSource).show_manifest(level)?,
        ManifestCommand::Refresh { level } => {
            let source = WebDriverSource::new(config.webdriver.clone())?;
            let sink = sink_for(output_mode);
            App::new(config, source).update_manifest(level, sink.as_ref())?
        }
    };
    match output_mode {
        OutputMode::Interactive => ConsoleOutput::print_manifest(&result),
        OutputMode::NonInteractive => JsonOutput::print_manifest(&result).into_diagnostic()?,
    }
    Ok(ExitCode::SUCCESS)
}

/// Source for commands that only read local state.
struct NopSource;
struct NopSession;

impl ReportSource for NopSource {
    type Session = NopSession;

    fn open(&self, _download_dir: &Utf8Path) -> Result<NopSession, ChannelError> {
        Err(ChannelError::fatal("no report channel configured"))
    }

    fn list_children(
        &self,
        _level: ReportLevel,
        _parent: &str,
    ) -> Result<Vec<String>, ChannelError> {
        Err(ChannelError::fatal("no report channel configured"))
    }
}

impl ReportSession for NopSession {
    fn perform(&mut self, _unit: &UnitOfWork) -> Result<(), ChannelError> {
        Err(ChannelError::fatal("no report channel configured"))
    }

    fn close(self) {}
}
