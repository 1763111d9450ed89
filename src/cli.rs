use crate::{
    artifact::{OutputArtifactLocator, resolve_output_dir},
    config::{Config, Profile},
    drop::{DropResolver, StaticPayload},
    error::{FailureCategory, RunnerError},
    launch::Invocation,
    report::JobReport,
    runner::ConversionRunner,
    tool::ToolLocator,
    types::{ConversionResult, Event},
    util::{RealFs, ensure_dir},
};
use anyhow::{Context, Result, anyhow, bail};
use clap::{Parser, Subcommand, ValueEnum};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{EnvFilter, Layer, layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "dropconv")]
#[command(about = "Convert a dropped script or app bundle with an external packaging tool")]
pub struct Args {
    #[command(subcommand)]
    pub cmd: Command,

    /// Path to config TOML. If omitted, uses ./dropconv.toml if present.
    #[arg(long, conflicts_with = "profile")]
    pub config: Option<PathBuf>,

    /// Built-in tool setup to use instead of a config file.
    #[arg(long, value_enum)]
    pub profile: Option<Profile>,

    /// Override log level (trace/debug/info/warn/error).
    #[arg(long)]
    pub log_level: Option<String>,
}

#[derive(clap::Args, Debug, Clone)]
pub struct DropArgs {
    /// Dropped item as a file:// URL, another URL, or a path. Repeat to
    /// offer several representations of the same item.
    #[arg(long = "drop")]
    pub drops: Vec<String>,

    /// File whose bytes are offered as the raw data representation.
    #[arg(long)]
    pub drop_data: Option<PathBuf>,
}

impl DropArgs {
    fn payload(&self) -> Result<StaticPayload> {
        let data = match &self.drop_data {
            Some(path) => Some(
                std::fs::read(path)
                    .with_context(|| format!("reading drop data: {}", path.display()))?,
            ),
            None => None,
        };
        let payload = StaticPayload::from_args(&self.drops, data);
        if payload.is_empty() {
            bail!("nothing dropped: pass --drop or --drop-data");
        }
        Ok(payload)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum EventFormat {
    Text,
    Json,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Print where the conversion tool was found.
    Locate {},
    /// Resolve a drop to a validated input path.
    Resolve {
        #[command(flatten)]
        dropped: DropArgs,
    },
    /// Show the command that would be run, without running it.
    Plan {
        #[command(flatten)]
        dropped: DropArgs,
        #[arg(long)]
        out_dir: Option<PathBuf>,
    },
    /// Run one conversion and report its progress and outcome.
    Convert {
        #[command(flatten)]
        dropped: DropArgs,
        #[arg(long)]
        out_dir: Option<PathBuf>,
        /// Write a JSON job report to this path.
        #[arg(long)]
        report: Option<PathBuf>,
        #[arg(long, value_enum, default_value = "text")]
        events: EventFormat,
    },
}

/// Runs the command and returns the process exit code.
pub fn dispatch(args: Args) -> Result<i32> {
    let mut cfg = load_config(&args)?;
    let log_path = resolve_log_path(&cfg);
    let _guard = init_logging(&args, &cfg, log_path.as_deref())?;

    match &args.cmd {
        Command::Locate {} => locate(&cfg),
        Command::Resolve { dropped } => runtime()?.block_on(resolve(&cfg, dropped)),
        Command::Plan { dropped, out_dir } => {
            apply_out_dir(&mut cfg, out_dir.as_deref());
            runtime()?.block_on(plan(&cfg, dropped))
        }
        Command::Convert {
            dropped,
            out_dir,
            report,
            events,
        } => {
            apply_out_dir(&mut cfg, out_dir.as_deref());
            runtime()?.block_on(convert(&cfg, dropped, report.as_deref(), *events))
        }
    }
}

fn load_config(args: &Args) -> Result<Config> {
    if let Some(path) = &args.config {
        return Config::load(path);
    }
    if let Some(profile) = args.profile {
        return Ok(Config::preset(profile));
    }
    let default = PathBuf::from("dropconv.toml");
    if default.exists() {
        Config::load(&default)
    } else {
        Ok(Config::default())
    }
}

fn apply_out_dir(cfg: &mut Config, out_dir: Option<&Path>) {
    if let Some(dir) = out_dir {
        cfg.paths.output_dir = dir.display().to_string();
    }
}

fn runtime() -> Result<tokio::runtime::Runtime> {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .with_context(|| "building tokio runtime")
}

fn init_logging(args: &Args, cfg: &Config, file_path: Option<&Path>) -> Result<Option<WorkerGuard>> {
    let level = args
        .log_level
        .as_deref()
        .unwrap_or(cfg.logging.level.as_str());

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    // stdout carries the event stream, so logs go to stderr.
    let stderr_layer = if cfg.logging.json {
        tracing_subscriber::fmt::layer()
            .json()
            .with_writer(std::io::stderr)
            .with_target(true)
            .boxed()
    } else {
        tracing_subscriber::fmt::layer()
            .with_writer(std::io::stderr)
            .with_target(true)
            .boxed()
    };

    let (file_layer, guard) = if let Some(path) = file_path {
        let parent = path.parent().unwrap_or_else(|| Path::new("."));
        ensure_dir(parent)?;
        let file = std::fs::File::create(path)
            .with_context(|| format!("create log file: {}", path.display()))?;
        let (non_blocking, guard) = tracing_appender::non_blocking(file);
        let layer = tracing_subscriber::fmt::layer()
            .with_writer(non_blocking)
            .with_ansi(false)
            .with_target(true)
            .boxed();
        (Some(layer), Some(guard))
    } else {
        (None, None)
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(stderr_layer)
        .with(file_layer)
        .try_init()
        .map_err(|e| anyhow!("failed to init logging: {e}"))?;

    Ok(guard)
}

fn resolve_log_path(cfg: &Config) -> Option<PathBuf> {
    if !cfg.logging.write_to_file {
        return None;
    }
    if !cfg.logging.file_path.is_empty() {
        return Some(PathBuf::from(&cfg.logging.file_path));
    }
    Some(PathBuf::from("logs").join("dropconv.log"))
}

fn locate(cfg: &Config) -> Result<i32> {
    let path = ToolLocator::from_config(cfg).locate(&RealFs)?;
    println!("{}", path.display());
    Ok(0)
}

async fn resolve(cfg: &Config, dropped: &DropArgs) -> Result<i32> {
    let payload = dropped.payload()?;
    let path = DropResolver::new(&cfg.input.extension, Arc::new(RealFs))
        .resolve(&payload)
        .await?;
    println!("{}", path.display());
    Ok(0)
}

async fn plan(cfg: &Config, dropped: &DropArgs) -> Result<i32> {
    let payload = dropped.payload()?;
    let source = DropResolver::new(&cfg.input.extension, Arc::new(RealFs))
        .resolve(&payload)
        .await?;
    let tool_path = ToolLocator::from_config(cfg).locate(&RealFs)?;
    let output_dir = resolve_output_dir(&cfg.paths.output_dir, &source);
    let expected = OutputArtifactLocator::from_config(cfg).expected_path(&source, &output_dir);
    let invocation = Invocation::for_job(cfg, &tool_path, &source, &output_dir);
    println!(
        "{}",
        serde_json::to_string_pretty(&serde_json::json!({
            "source": source,
            "output_dir": output_dir,
            "expected_output": expected,
            "invocation": invocation,
        }))?
    );
    Ok(0)
}

async fn convert(
    cfg: &Config,
    dropped: &DropArgs,
    report: Option<&Path>,
    format: EventFormat,
) -> Result<i32> {
    let payload = dropped.payload()?;
    let (tx, mut rx) = mpsc::unbounded_channel();
    let mut runner = ConversionRunner::new(cfg, tx);

    let presenter_cfg = cfg.clone();
    let presenter = tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            render(&presenter_cfg, &event, format);
        }
    });

    let outcome = runner.handle_drop(&payload).await;

    let mut report_path = report.map(Path::to_path_buf);
    if let (Some(job), Some(result)) = (runner.job(), runner.result()) {
        if report_path.is_none() && !cfg.paths.report_dir.is_empty() {
            let name = format!("{}.json", job.id);
            report_path = Some(PathBuf::from(&cfg.paths.report_dir).join(name));
        }
        if let Some(path) = &report_path {
            JobReport::new(&cfg.tool.name, job, result, cfg.classifier.excerpt_chars).write(path)?;
            info!("report written to {}", path.display());
        }
    }
    let job_id = runner.job().map(|j| j.id.clone());

    // Closing the event channel lets the presenter drain and finish.
    drop(runner);
    presenter
        .await
        .map_err(|e| anyhow!("event presenter failed: {e}"))?;

    let code = match &outcome {
        Ok(result) => exit_code(result),
        Err(RunnerError::Rejected(_)) | Err(RunnerError::Busy { .. }) => 1,
        Err(err) => {
            warn!("{err}");
            1
        }
    };

    if cfg.global.print_summary {
        let status = match &outcome {
            Ok(result) => serde_json::to_value(result.resolution())?,
            Err(_) => serde_json::json!("rejected"),
        };
        println!(
            "{}",
            serde_json::to_string(&serde_json::json!({
                "job_id": job_id,
                "status": status,
                "report": report_path,
            }))?
        );
    }

    Ok(code)
}

fn exit_code(result: &ConversionResult) -> i32 {
    match result {
        ConversionResult::Succeeded { .. } => 0,
        ConversionResult::PartialSuccess { .. } => 2,
        ConversionResult::Failed { .. } => 1,
    }
}

fn render(cfg: &Config, event: &Event, format: EventFormat) {
    if format == EventFormat::Json {
        match serde_json::to_string(event) {
            Ok(line) => println!("{line}"),
            Err(err) => warn!("could not encode event: {err}"),
        }
        return;
    }

    match event {
        Event::JobStarted { source_name, .. } => println!("Converting {source_name}..."),
        Event::Progress { percent, label } => println!("[{percent:>3}%] {label}"),
        Event::Rejected { reason } => println!("Rejected: {reason}"),
        Event::Resolved { result } => {
            println!("{}", cfg.headline(result));
            match result {
                ConversionResult::Succeeded { output_path } => {
                    println!("Output: {}", output_path.display())
                }
                ConversionResult::PartialSuccess { reason, .. } => println!("{reason}"),
                ConversionResult::Failed { category, excerpt } => {
                    println!("{}", cfg.failure_hint(*category));
                    if *category == FailureCategory::Unclassified && !excerpt.is_empty() {
                        println!("{excerpt}");
                    }
                }
            }
        }
    }
}
