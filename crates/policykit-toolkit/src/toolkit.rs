use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use policykit_config::{ConfigError, DispatchConfig, ToolPaths};
use policykit_dispatch::{
  AggregateResult, Dispatcher, ExecutionOutcome, UnitScope, UnitState, WorkItem,
};
use policykit_metrics::{BenchmarkStatistics, CoverageSummary, Violation};
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument};

use crate::bench::{BenchOptions, bench_query};
use crate::discovery::{Discovery, find_policy_files, find_test_dirs};
use crate::error::{DiscoveryError, FormatFailure};
use crate::format::{FormatChange, FormatOptions, Formatter, OpaFormatter, format_file};
use crate::lint::{Linter, RegalLinter};
use crate::tester::{TestOptions, test_dir};

/// Progress notification for one finished unit, independent of the
/// operation's detail type.
#[derive(Debug, Clone)]
pub struct Progress {
  pub operation: &'static str,
  pub identity: String,
  pub state: UnitState,
  pub elapsed: Duration,
}

pub type ProgressCallback = Arc<dyn Fn(&Progress) + Send + Sync>;

/// Result of one toolkit operation.
#[derive(Debug)]
pub struct Operation<D> {
  pub aggregate: AggregateResult<D>,
  /// Roots that could not be walked. Empty for bench.
  pub discovery_errors: Vec<DiscoveryError>,
}

impl<D> Operation<D> {
  /// True if any unit failed or any root could not be walked.
  pub fn failed(&self) -> bool {
    !self.aggregate.succeeded() || !self.discovery_errors.is_empty()
  }
}

/// Lint, format, test and bench operations over the shared dispatcher.
pub struct Toolkit {
  config: DispatchConfig,
  tools: ToolPaths,
  linter: Arc<dyn Linter>,
  formatter: Arc<dyn Formatter>,
  progress: Option<ProgressCallback>,
}

impl Toolkit {
  /// Create a toolkit using `regal` and `opa` from `tools`.
  pub fn new(config: DispatchConfig, tools: ToolPaths) -> Result<Self, ConfigError> {
    config.validate()?;
    Ok(Self {
      config,
      linter: Arc::new(RegalLinter::new(&tools.regal)),
      formatter: Arc::new(OpaFormatter::new(&tools.opa)),
      tools,
      progress: None,
    })
  }

  pub fn with_linter(mut self, linter: Arc<dyn Linter>) -> Self {
    self.linter = linter;
    self
  }

  pub fn with_formatter(mut self, formatter: Arc<dyn Formatter>) -> Self {
    self.formatter = formatter;
    self
  }

  pub fn with_progress(mut self, callback: impl Fn(&Progress) + Send + Sync + 'static) -> Self {
    self.progress = Some(Arc::new(callback));
    self
  }

  fn dispatcher<D>(&self, operation: &'static str) -> Result<Dispatcher<D>, ConfigError>
  where
    D: Clone + Send + 'static,
  {
    let dispatcher = Dispatcher::new(self.config)?;
    let Some(progress) = self.progress.clone() else {
      return Ok(dispatcher);
    };

    Ok(dispatcher.on_complete(move |outcome: &ExecutionOutcome<D>| {
      progress(&Progress {
        operation,
        identity: outcome.identity.clone(),
        state: outcome.state(),
        elapsed: outcome.elapsed,
      })
    }))
  }

  /// Lint every policy file under `roots`.
  #[instrument(name = "toolkit_lint", skip(self, roots, cancel), fields(roots = roots.len()))]
  pub async fn lint(
    &self,
    roots: &[PathBuf],
    cancel: &CancellationToken,
  ) -> Result<Operation<Vec<Violation>>, ConfigError> {
    let Discovery { paths, errors } = find_policy_files(roots).await;
    info!(files = paths.len(), "lint_discovered");

    let linter = self.linter.clone();
    let aggregate = self
      .dispatcher("lint")?
      .dispatch(
        paths,
        move |path: PathBuf, scope: UnitScope| {
          let linter = linter.clone();
          async move { linter.lint(&path, &scope).await }
        },
        cancel,
      )
      .await;

    Ok(Operation {
      aggregate,
      discovery_errors: errors,
    })
  }

  /// Format every policy file under `roots`.
  #[instrument(name = "toolkit_format", skip(self, roots, cancel), fields(roots = roots.len()))]
  pub async fn format(
    &self,
    roots: &[PathBuf],
    options: FormatOptions,
    cancel: &CancellationToken,
  ) -> Result<Operation<FormatChange>, ConfigError> {
    let Discovery { paths, errors } = find_policy_files(roots).await;
    info!(files = paths.len(), write = options.write, check = options.check, "format_discovered");

    let formatter = self.formatter.clone();
    let aggregate = self
      .dispatcher("format")?
      .dispatch(
        paths,
        move |path: PathBuf, scope: UnitScope| {
          let formatter = formatter.clone();
          async move { format_file(formatter.as_ref(), &path, options, &scope).await }
        },
        cancel,
      )
      .await;

    Ok(Operation {
      aggregate,
      discovery_errors: errors,
    })
  }

  /// Format one in-memory source under the configured timeout.
  pub async fn format_source(
    &self,
    source: &[u8],
    cancel: &CancellationToken,
  ) -> Result<Vec<u8>, FormatFailure> {
    let scope = UnitScope::new(cancel.child_token(), self.config.timeout);
    self.formatter.format(source, &scope).await
  }

  /// Run tests with coverage in every test directory under `roots`.
  #[instrument(
    name = "toolkit_test",
    skip(self, roots, options, cancel),
    fields(roots = roots.len())
  )]
  pub async fn test(
    &self,
    roots: &[PathBuf],
    options: TestOptions,
    cancel: &CancellationToken,
  ) -> Result<Operation<CoverageSummary>, ConfigError> {
    let Discovery { paths, errors } = find_test_dirs(roots).await;
    info!(dirs = paths.len(), "test_discovered");

    let items: Vec<WorkItem> = paths.into_iter().map(|dir| options.item(dir)).collect();
    let opa = self.tools.opa.clone();
    let aggregate = self
      .dispatcher("test")?
      .dispatch(
        items,
        move |item: WorkItem, scope: UnitScope| {
          let opa = opa.clone();
          async move { test_dir(&opa, &item, &scope).await }
        },
        cancel,
      )
      .await;

    Ok(Operation {
      aggregate,
      discovery_errors: errors,
    })
  }

  /// Benchmark each query.
  #[instrument(
    name = "toolkit_bench",
    skip(self, queries, options, cancel),
    fields(queries = queries.len())
  )]
  pub async fn bench(
    &self,
    queries: Vec<String>,
    options: BenchOptions,
    cancel: &CancellationToken,
  ) -> Result<Operation<BenchmarkStatistics>, ConfigError> {
    let items: Vec<WorkItem> = queries.into_iter().map(|query| options.item(query)).collect();
    let opa = self.tools.opa.clone();
    let aggregate = self
      .dispatcher("bench")?
      .dispatch(
        items,
        move |item: WorkItem, scope: UnitScope| {
          let opa = opa.clone();
          async move { bench_query(&opa, &item, &scope).await }
        },
        cancel,
      )
      .await;

    Ok(Operation {
      aggregate,
      discovery_errors: Vec::new(),
    })
  }
}
