//! Testfleet - Multi-repository test campaign CLI
//!
//! The `testfleet` command plans and runs unit-test campaigns across a set
//! of module-bearing repositories.
//!
//! ## Commands
//!
//! - `run`: Execute the campaign and aggregate the result files
//! - `plan`: Print the modules a run would schedule
//! - `modules`: List discovered modules and their capabilities
//! - `report`: Summarize the result files in a run directory

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use tracing::{warn, Level};

use testfleet_core::{
    Campaign, CoverageFormat, FleetConfig, KindFilter, RunOptions, RunScope, TestSuite,
};

/// Exit code signalled to CI when any aggregated case fails.
const ERROR_CODE: i32 = 2;

#[derive(Parser)]
#[command(name = "testfleet")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Multi-repository test campaign runner", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON-formatted output where supported
    #[arg(long, global = true)]
    json: bool,

    /// Campaign configuration file
    #[arg(short, long, global = true, default_value = "testfleet.json")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct ScopeArgs {
    /// Repositories to test, comma separated (default: all)
    #[arg(long = "rep", value_delimiter = ',')]
    rep: Vec<String>,

    /// Test exactly the named repositories, without dependent expansion
    #[arg(long, requires = "rep")]
    only: bool,

    /// Explicit entry modules, comma separated
    #[arg(long, value_delimiter = ',', conflicts_with_all = ["rep", "only"])]
    entry: Vec<String>,

    /// Test every discovered module (the default when no scope is given)
    #[arg(long, conflicts_with_all = ["rep", "only", "entry"])]
    all: bool,
}

impl ScopeArgs {
    fn to_scope(&self) -> RunScope {
        if self.all {
            RunScope::All
        } else if !self.entry.is_empty() {
            RunScope::EntryModules(self.entry.clone())
        } else if self.only {
            RunScope::Only(self.rep.clone())
        } else if !self.rep.is_empty() {
            RunScope::Repositories(self.rep.clone())
        } else {
            RunScope::All
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum CoverageArg {
    Html,
    Json,
}

impl From<CoverageArg> for CoverageFormat {
    fn from(value: CoverageArg) -> Self {
        match value {
            CoverageArg::Html => CoverageFormat::Html,
            CoverageArg::Json => CoverageFormat::Json,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Execute the test campaign
    Run {
        #[command(flatten)]
        scope: ScopeArgs,

        /// Skip modules untouched since each repository's baseline
        #[arg(long)]
        diff: bool,

        /// Spawn only headless harnesses
        #[arg(long, conflicts_with = "browser_only")]
        headless_only: bool,

        /// Spawn only browser-hosted harnesses
        #[arg(long)]
        browser_only: bool,

        /// Host browser suites interactively instead of reporting
        #[arg(long)]
        server: bool,

        /// Collect coverage in the given format
        #[arg(long, value_enum)]
        coverage: Option<CoverageArg>,

        /// Concurrent task ceiling
        #[arg(long)]
        parallel: Option<usize>,

        /// Headless wall-clock deadline, in seconds
        #[arg(long)]
        timeout: Option<u64>,

        /// Total attempts for a flaky browser task
        #[arg(long)]
        max_attempts: Option<u32>,

        /// Preferred ports for browser harnesses, comma separated
        #[arg(long, value_delimiter = ',')]
        ports: Vec<u16>,

        /// Record newly seen harness errors into the allowed-errors baseline
        #[arg(long)]
        update_error_baseline: bool,
    },

    /// Print the modules a run would schedule
    Plan {
        #[command(flatten)]
        scope: ScopeArgs,
    },

    /// List discovered modules and their capabilities
    Modules {
        /// Restrict the listing to one repository
        #[arg(long)]
        rep: Option<String>,
    },

    /// Summarize the result files in a run directory
    Report {
        /// Per-run report directory
        #[arg(long)]
        dir: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup logging
    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    testfleet_core::init_tracing(cli.json, level);

    match cli.command {
        Commands::Run {
            scope,
            diff,
            headless_only,
            browser_only,
            server,
            coverage,
            parallel,
            timeout,
            max_attempts,
            ports,
            update_error_baseline,
        } => {
            let config = load_config(&cli.config)?;
            let defaults = config.defaults.clone();
            let options = RunOptions {
                scope: scope.to_scope(),
                diff_mode: diff,
                kinds: if headless_only {
                    KindFilter::HeadlessOnly
                } else if browser_only {
                    KindFilter::BrowserOnly
                } else {
                    KindFilter::Both
                },
                server_mode: server,
                coverage: coverage.map(Into::into),
                concurrency: parallel.unwrap_or(defaults.concurrency),
                headless_timeout_secs: timeout.unwrap_or(defaults.headless_timeout_secs),
                max_attempts: max_attempts.unwrap_or(defaults.max_attempts),
                preferred_ports: if ports.is_empty() {
                    defaults.preferred_ports
                } else {
                    ports
                },
                update_error_baseline,
            };
            cmd_run(config, options).await
        }
        Commands::Plan { scope } => cmd_plan(load_config(&cli.config)?, scope.to_scope(), cli.json),
        Commands::Modules { rep } => cmd_modules(load_config(&cli.config)?, rep.as_deref()),
        Commands::Report { dir } => cmd_report(&dir),
    }
}

fn load_config(path: &Path) -> Result<FleetConfig> {
    FleetConfig::load(path)
        .with_context(|| format!("failed to load campaign config from {}", path.display()))
}

async fn cmd_run(config: FleetConfig, options: RunOptions) -> Result<()> {
    let campaign = Campaign::new(config, options);
    let report = campaign.run().await?;

    println!("suites:  {}", report.entries.len());
    println!(
        "cases:   {} total, {} failing",
        report.total_cases, report.failing_cases
    );
    println!("skipped: {} tasks", report.skipped_tasks);

    for entry in report.entries.iter().filter(|e| e.suite.has_failing_cases()) {
        println!("FAIL     {} ({})", entry.key, entry.kind);
    }

    if report.success() {
        println!("result:  PASS");
        Ok(())
    } else {
        println!("result:  FAIL");
        std::process::exit(ERROR_CODE);
    }
}

fn cmd_plan(config: FleetConfig, scope: RunScope, json: bool) -> Result<()> {
    let campaign = Campaign::new(config, RunOptions {
        scope,
        ..RunOptions::default()
    });
    let plan = campaign.plan()?;

    if json {
        println!("{}", serde_json::to_string_pretty(&plan)?);
        return Ok(());
    }
    if plan.is_empty() {
        println!("Nothing to schedule");
        return Ok(());
    }
    for module in &plan {
        println!("{module}");
    }
    println!("{} modules planned", plan.len());
    Ok(())
}

fn cmd_modules(config: FleetConfig, rep: Option<&str>) -> Result<()> {
    let campaign = Campaign::new(config, RunOptions::default());
    let graph = campaign.build_graph()?;

    for warning in graph.warnings() {
        warn!("{warning}");
    }

    let mut listed = 0usize;
    for name in graph.module_names() {
        let Some(module) = graph.get(name) else {
            continue;
        };
        if let Some(rep) = rep {
            if module.repository != rep {
                continue;
            }
        }
        let mut flags = Vec::new();
        if module.has_unit_test {
            flags.push("tests");
        }
        if module.browser_capable {
            flags.push("browser");
        }
        if module.is_cdn_asset {
            flags.push("cdn");
        }
        println!(
            "{}  {}  [{}]",
            module.name,
            module.repository,
            flags.join(", ")
        );
        listed += 1;
    }
    println!("{listed} modules");
    Ok(())
}

fn cmd_report(dir: &Path) -> Result<()> {
    let mut paths: Vec<PathBuf> = std::fs::read_dir(dir)
        .with_context(|| format!("cannot read report directory {}", dir.display()))?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| path.extension().map(|e| e == "xml").unwrap_or(false))
        .collect();
    paths.sort();

    let mut total_cases = 0u64;
    let mut failing_cases = 0u64;
    for path in &paths {
        let suite = match TestSuite::load(path) {
            Ok(suite) => suite,
            Err(e) => {
                warn!("skipping unreadable result file: {e}");
                continue;
            }
        };
        let failing = suite.failing_case_count();
        total_cases += suite.cases.len() as u64;
        failing_cases += failing;
        println!(
            "{}  {} cases, {} failing",
            path.file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| path.display().to_string()),
            suite.cases.len(),
            failing,
        );
    }

    println!(
        "{} files, {} cases, {} failing",
        paths.len(),
        total_cases,
        failing_cases
    );
    if failing_cases > 0 {
        std::process::exit(ERROR_CODE);
    }
    Ok(())
}
