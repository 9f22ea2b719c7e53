use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{ArgAction, Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing::warn;
use tracing_subscriber::EnvFilter;

use policykit_config::{
  ConfigError, FileConfig, OutputFormat, Overrides, Settings, SummaryFormat, parse_duration,
};
use policykit_report::{BatchReport, Describe, rank, render_batch, render_summary, summary_document};
use policykit_toolkit::{
  BenchOptions, FormatOptions, Operation, Progress, TestOptions, Toolkit, statistics,
};

/// Exit code when at least one unit failed.
const EXIT_FAILED: u8 = 1;

/// Exit code for invalid configuration. No work was started.
const EXIT_CONFIG: u8 = 2;

/// Policykit - concurrent lint, format, test and bench for Rego policies
#[derive(Parser)]
#[command(name = "policykit")]
#[command(version, about, long_about = None)]
struct Cli {
  /// Maximum number of tool invocations running at once
  #[arg(long, short = 'j', global = true)]
  workers: Option<usize>,

  /// Per-item timeout (15s, 500ms, 2m, or bare seconds)
  #[arg(long, global = true, value_parser = parse_duration)]
  timeout: Option<Duration>,

  /// Report format: text, json, markdown or github
  #[arg(long, global = true)]
  format: Option<OutputFormat>,

  /// Path to the opa binary
  #[arg(long, global = true)]
  opa: Option<PathBuf>,

  /// Path to the regal binary
  #[arg(long, global = true)]
  regal: Option<PathBuf>,

  /// Config file (default: ./policykit.json, then the user config dir)
  #[arg(long, global = true)]
  config: Option<PathBuf>,

  /// Print one line per finished item to stderr
  #[arg(long, global = true)]
  progress: bool,

  /// Increase log verbosity (-v info, -vv debug)
  #[arg(short, long, global = true, action = ArgAction::Count)]
  verbose: u8,

  #[command(subcommand)]
  command: Commands,
}

#[derive(Subcommand)]
enum Commands {
  /// Lint every .rego file under the given paths
  Lint {
    #[arg(default_value = ".")]
    paths: Vec<PathBuf>,
  },

  /// Format every .rego file under the given paths
  Fmt {
    #[arg(default_value = ".")]
    paths: Vec<PathBuf>,

    /// Write formatted files back in place
    #[arg(long, short)]
    write: bool,

    /// Fail on files that are not formatted, without writing
    #[arg(long, conflicts_with = "write")]
    check: bool,
  },

  /// Run tests with coverage in every directory that has tests
  Test {
    #[arg(default_value = ".")]
    paths: Vec<PathBuf>,

    /// Data document passed to every test run
    #[arg(long)]
    input: Option<PathBuf>,

    /// Extra flag passed through to `opa test` (repeatable)
    #[arg(long = "flag", allow_hyphen_values = true)]
    flags: Vec<String>,
  },

  /// Benchmark queries and rank them
  Bench {
    /// Query to benchmark (repeatable)
    #[arg(long = "query", short, required = true)]
    queries: Vec<String>,

    /// Policy or data path loaded for every query (repeatable)
    #[arg(long, short)]
    data: Vec<PathBuf>,

    /// Input document
    #[arg(long, short)]
    input: Option<PathBuf>,

    /// Summary format: text, markdown or json (default follows --format)
    #[arg(long)]
    summary: Option<SummaryFormat>,

    /// Extra flag passed through to `opa bench` (repeatable)
    #[arg(long = "flag", allow_hyphen_values = true)]
    flags: Vec<String>,
  },
}

fn main() -> ExitCode {
  let cli = Cli::parse();
  init_tracing(cli.verbose);

  match run(cli) {
    Ok(true) => ExitCode::SUCCESS,
    Ok(false) => ExitCode::from(EXIT_FAILED),
    Err(e) => {
      eprintln!("error: {:#}", e);
      if e.downcast_ref::<ConfigError>().is_some() {
        ExitCode::from(EXIT_CONFIG)
      } else {
        ExitCode::from(EXIT_FAILED)
      }
    }
  }
}

/// Logs go to stderr so reports on stdout stay machine-readable.
fn init_tracing(verbose: u8) {
  let default = match verbose {
    0 => "warn",
    1 => "info",
    _ => "debug",
  };
  let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

  tracing_subscriber::fmt()
    .with_env_filter(filter)
    .with_writer(std::io::stderr)
    .with_target(false)
    .init();
}

/// Returns whether every unit succeeded.
fn run(cli: Cli) -> Result<bool> {
  let working_dir = std::env::current_dir().context("failed to determine working directory")?;
  let file = match &cli.config {
    Some(path) => FileConfig::load(path)?,
    None => FileConfig::discover(&working_dir)?,
  };

  let input = match &cli.command {
    Commands::Test { input, .. } | Commands::Bench { input, .. } => input.clone(),
    Commands::Lint { .. } | Commands::Fmt { .. } => None,
  };
  let overrides = Overrides {
    workers: cli.workers,
    timeout: cli.timeout,
    opa_path: cli.opa.clone(),
    regal_path: cli.regal.clone(),
    format: cli.format,
    input,
  };
  let settings = Settings::resolve(file, overrides)?;

  let rt = tokio::runtime::Runtime::new()?;
  rt.block_on(run_async(cli, settings))
}

async fn run_async(cli: Cli, settings: Settings) -> Result<bool> {
  let cancel = CancellationToken::new();
  let interrupt = cancel.clone();
  tokio::spawn(async move {
    if tokio::signal::ctrl_c().await.is_ok() {
      warn!("interrupt_received");
      interrupt.cancel();
    }
  });

  let mut toolkit = Toolkit::new(settings.dispatch, settings.tools.clone())?;
  if cli.progress {
    toolkit = toolkit.with_progress(print_progress);
  }

  let format = settings.format;
  match cli.command {
    Commands::Lint { paths } => {
      let operation = toolkit.lint(&paths, &cancel).await?;
      Ok(emit("lint", &operation, format))
    }

    Commands::Fmt {
      paths,
      write,
      check,
    } => {
      let options = FormatOptions { write, check };
      let operation = toolkit.format(&paths, options, &cancel).await?;
      Ok(emit("fmt", &operation, format))
    }

    Commands::Test { paths, flags, .. } => {
      let options = TestOptions {
        input: settings.input,
        flags: settings.test_flags.into_iter().chain(flags).collect(),
      };
      let operation = toolkit.test(&paths, options, &cancel).await?;
      Ok(emit("test", &operation, format))
    }

    Commands::Bench {
      queries,
      data,
      summary,
      flags,
      ..
    } => {
      let options = BenchOptions {
        input: settings.input,
        data,
        flags,
      };
      let operation = toolkit.bench(queries, options, &cancel).await?;
      let report = BatchReport::from_operation("bench", &operation);
      let stats = statistics(&operation.aggregate);

      let summary_format = summary.unwrap_or_else(|| format.into());
      if format == OutputFormat::Json && summary_format == SummaryFormat::Json {
        let document = serde_json::json!({
          "batch": report,
          "summary": summary_document(&rank(&stats)),
        });
        println!("{}", serde_json::to_string_pretty(&document)?);
      } else {
        print!("{}", render_batch(&report, format));
        println!();
        print!("{}", render_summary(&stats, summary_format));
      }

      Ok(!operation.failed())
    }
  }
}

fn emit<D: Describe>(name: &str, operation: &Operation<D>, format: OutputFormat) -> bool {
  let report = BatchReport::from_operation(name, operation);
  print!("{}", render_batch(&report, format));
  report.succeeded()
}

fn print_progress(progress: &Progress) {
  eprintln!(
    "[{}] {:?} {} ({} ms)",
    progress.operation,
    progress.state,
    progress.identity,
    progress.elapsed.as_millis()
  );
}
