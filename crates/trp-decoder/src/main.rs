use anyhow::{Context, Result, bail};
use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use trp_decoder::{
    config::Config,
    decoder::import_archive,
    kpi::chosen_names,
    models::{DecodeResult, ImportReport},
    runner::{ImportRunner, JobOutcome},
    store::{RunId, RunStore, SeriesPoint},
};

#[derive(Parser)]
#[command(name = "trp-decoder")]
#[command(version)]
#[command(about = "Decode TRP drive-test archives into KPI samples, events and tracks")]
#[command(long_about = None)]
struct Cli {
    /// Configuration file path (defaults to $CONFIG_FILE, then trp-decoder.toml)
    #[arg(short, long)]
    config: Option<String>,

    /// Log level
    #[arg(short = 'v', long, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Decode one or more archives
    Decode(DecodeArgs),
}

#[derive(Args)]
struct DecodeArgs {
    /// Directory to write `<stem>.json` results into
    #[arg(short, long, value_name = "DIR")]
    output: Option<PathBuf>,

    /// Per-archive timeout, e.g. `90s` or `10m` (overrides config)
    #[arg(short, long, value_name = "DURATION", value_parser = humantime::parse_duration)]
    timeout: Option<Duration>,

    /// Directory for extraction scratch space (overrides config)
    #[arg(long, value_name = "DIR")]
    work_dir: Option<PathBuf>,

    /// Also write downsampled series of the chosen KPIs as `<stem>.series.json`
    #[arg(long)]
    kpi_series: bool,

    /// Also write navigation groups, LTE neighbours and default metrics as `<stem>.sidebar.json`
    #[arg(long)]
    sidebar: bool,

    /// TRP archives to decode
    #[arg(required = true)]
    archives: Vec<PathBuf>,
}

/// Optional files written next to `<stem>.json`
#[derive(Debug, Clone, Copy)]
struct Extras {
    kpi_series: bool,
    sidebar: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
enum ImportStatus {
    Ok,
    Unprocessable,
    Failed,
    TimedOut,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ImportOutcome {
    archive: String,
    status: ImportStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    run_id: Option<RunId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    report: Option<ImportReport>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    chosen_kpis: BTreeMap<String, String>,
}

impl ImportOutcome {
    fn failed(archive: &Path, status: ImportStatus, error: String) -> Self {
        Self {
            archive: archive.display().to_string(),
            status,
            run_id: None,
            error: Some(error),
            report: None,
            chosen_kpis: BTreeMap::new(),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_filter = format!("trp_decoder={},sandboxed_archive={}", cli.log_level, cli.log_level);
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| log_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    info!("Starting TRP decoder v{}", env!("CARGO_PKG_VERSION"));

    let config = match &cli.config {
        Some(path) => Config::load_from_file(path)?,
        None => Config::load()?,
    };

    match cli.command {
        Command::Decode(args) => run_decode(config, args).await,
    }
}

/// Leave without waiting for timed-out decodes; dropping the runtime would block on them.
fn exit_abandoning(runner: &ImportRunner, code: i32) -> ! {
    warn!(
        "Exiting with {} timed-out imports still running",
        runner.abandoned_jobs()
    );
    let _ = std::io::stdout().flush();
    std::process::exit(code)
}

async fn run_decode(mut config: Config, args: DecodeArgs) -> Result<()> {
    if let Some(timeout) = args.timeout {
        config.runtime.import_timeout = timeout;
    }
    if let Some(work_dir) = args.work_dir.clone() {
        config.runtime.work_dir = Some(work_dir);
    }
    config.validate()?;

    if let Some(output) = &args.output {
        tokio::fs::create_dir_all(output)
            .await
            .with_context(|| format!("creating output directory {}", output.display()))?;
    }

    info!(
        "Decoding {} archives (concurrency {}, timeout {})",
        args.archives.len(),
        config.runtime.max_concurrent_imports,
        humantime::format_duration(config.runtime.import_timeout)
    );

    let config = Arc::new(config);
    let store = RunStore::new();
    let runner = ImportRunner::new(
        config.runtime.max_concurrent_imports,
        config.runtime.import_timeout,
    );
    let output = args.output.clone().map(Arc::new);

    let mut handles = Vec::with_capacity(args.archives.len());
    for archive in args.archives {
        let config = Arc::clone(&config);
        let store = store.clone();
        let runner = runner.clone();
        let output = output.clone();
        let extras = Extras {
            kpi_series: args.kpi_series,
            sidebar: args.sidebar,
        };
        handles.push(tokio::spawn(async move {
            let outcome = import_one(&archive, &config, &store, &runner).await;
            if let (Some(dir), Some(run_id)) = (output.as_deref(), outcome.run_id)
                && let Err(e) = write_outputs(dir, &archive, &store, run_id, &config, extras).await
            {
                warn!("Failed to write results for {}: {:#}", archive.display(), e);
            }
            outcome
        }));
    }

    let mut failures = 0usize;
    let total = handles.len();
    for handle in handles {
        let outcome = handle.await.context("import task panicked")?;
        if matches!(outcome.status, ImportStatus::Failed | ImportStatus::TimedOut) {
            failures += 1;
        }
        println!("{}", serde_json::to_string(&outcome)?);
    }

    if runner.abandoned_jobs() > 0 {
        error!("{failures} of {total} imports failed");
        exit_abandoning(&runner, 1);
    }
    if failures > 0 {
        bail!("{failures} of {total} imports failed");
    }
    Ok(())
}

async fn import_one(
    archive: &Path,
    config: &Arc<Config>,
    store: &RunStore,
    runner: &ImportRunner,
) -> ImportOutcome {
    let timeout = config.runtime.import_timeout;
    let job = {
        let archive = archive.to_path_buf();
        let config = Arc::clone(config);
        move || import_archive(&archive, None, &config)
    };

    let result: DecodeResult = match runner.run(job).await {
        JobOutcome::TimedOut => {
            error!("Import of {} timed out after {:?}", archive.display(), timeout);
            return ImportOutcome::failed(
                archive,
                ImportStatus::TimedOut,
                format!("timed out after {}", humantime::format_duration(timeout)),
            );
        }
        JobOutcome::Aborted(reason) => {
            return ImportOutcome::failed(archive, ImportStatus::Failed, reason);
        }
        JobOutcome::Finished(Err(e)) => {
            error!("Import of {} failed: {}", archive.display(), e);
            return ImportOutcome::failed(archive, ImportStatus::Failed, e.to_string());
        }
        JobOutcome::Finished(Ok(result)) => result,
    };

    let status = if result.is_soft_failure() {
        warn!("{}: nothing decoded, marking unprocessable", archive.display());
        ImportStatus::Unprocessable
    } else {
        ImportStatus::Ok
    };
    let report = result.import_report.clone();
    let chosen_kpis = chosen_names(&result.kpi_selection);
    let filename = archive
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| archive.display().to_string());
    let run_id = store.insert(filename, result).await;

    ImportOutcome {
        archive: archive.display().to_string(),
        status,
        run_id: Some(run_id),
        error: None,
        report: Some(report),
        chosen_kpis,
    }
}

async fn write_outputs(
    dir: &Path,
    archive: &Path,
    store: &RunStore,
    run_id: RunId,
    config: &Config,
    extras: Extras,
) -> Result<()> {
    let stem = archive
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| run_id.to_string());
    let result = store
        .get(run_id)
        .await
        .with_context(|| format!("run {run_id} missing from store"))?;

    let path = dir.join(format!("{stem}.json"));
    let json = serde_json::to_vec_pretty(result.as_ref())?;
    tokio::fs::write(&path, json)
        .await
        .with_context(|| format!("writing {}", path.display()))?;
    info!("Wrote {}", path.display());

    if extras.kpi_series {
        let mut series: BTreeMap<String, Vec<SeriesPoint>> = BTreeMap::new();
        for (kpi, name) in chosen_names(&result.kpi_selection) {
            if let Some(points) = store.series(run_id, &name, config.runtime.series_max_points).await {
                series.insert(kpi, points);
            }
        }
        let path = dir.join(format!("{stem}.series.json"));
        tokio::fs::write(&path, serde_json::to_vec_pretty(&series)?)
            .await
            .with_context(|| format!("writing {}", path.display()))?;
        info!("Wrote {}", path.display());
    }

    if extras.sidebar
        && let Some(sidebar) = store.sidebar(run_id).await
    {
        let path = dir.join(format!("{stem}.sidebar.json"));
        tokio::fs::write(&path, serde_json::to_vec_pretty(&sidebar)?)
            .await
            .with_context(|| format!("writing {}", path.display()))?;
        info!("Wrote {}", path.display());
    }

    Ok(())
}
