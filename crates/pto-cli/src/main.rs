//! PTO - runtime build orchestration and golden validation CLI
//!
//! ## Commands
//!
//! - `run`: build the runtime for one example, compile its kernels, execute
//!   every golden case and compare against the reference
//! - `run-all`: discover every example under the examples root and run each
//!   one in its own child process

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use tracing::info;

use pto_core::{
    default_project_root, DiscoveryReport, ExampleRegistry, Platform, RuntimeBuilder, ToolchainCompiler,
    ToolchainConfig, Verbosity,
};
use pto_harness::{
    ExampleOutcome, ExampleSweep, GoldenHarness, LaunchSettings, LauncherExecutor,
    SubprocessLauncher, DEFAULT_EXAMPLE_TIMEOUT_SECS,
};

const RULE_WIDTH: usize = 60;

/// Examples root under the project root when `--examples-dir` is not given.
const DEFAULT_EXAMPLES_DIR: &str = "demos";

#[derive(Parser, Debug)]
#[command(name = "pto")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "PTO runtime builds and golden validation", long_about = None)]
struct Cli {
    /// Project root containing src/runtime and examples
    #[arg(long, global = true, env = "PTO_PROJECT_ROOT")]
    root: Option<PathBuf>,

    /// Emit JSON-formatted log lines
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Validate one example against its golden reference
    Run(RunArgs),

    /// Validate every discovered example, one child process each
    RunAll(RunAllArgs),
}

#[derive(Args, Debug)]
struct RunArgs {
    /// Kernels directory containing kernel_config.toml
    #[arg(short, long)]
    kernels: PathBuf,

    /// Path to golden.toml
    #[arg(short, long)]
    golden: PathBuf,

    /// Device id
    #[arg(short, long, env = "PTO_DEVICE_ID", default_value_t = 0)]
    device: u32,

    /// Runtime to build (default: kernel config, else host_build_graph)
    #[arg(short, long)]
    runtime: Option<String>,

    /// Target platform: a2a3 or a2a3sim
    #[arg(short, long, default_value = "a2a3")]
    platform: Platform,

    /// Verbosity: 0 silent, 1 normal, 2 verbose
    #[arg(short, long, default_value_t = 1, value_parser = clap::value_parser!(u8).range(0..=2))]
    verbose: u8,

    /// Deadline for each pipeline launch in seconds (0 = none)
    #[arg(long, default_value_t = DEFAULT_EXAMPLE_TIMEOUT_SECS)]
    timeout_secs: u64,

    /// Run only the golden case with this label
    #[arg(long)]
    case: Option<String>,

    /// Write the case-by-case outcome as JSON to this file
    #[arg(long)]
    report: Option<PathBuf>,
}

#[derive(Args, Debug)]
struct RunAllArgs {
    /// Target platform: a2a3 or a2a3sim
    #[arg(short, long, default_value = "a2a3")]
    platform: Platform,

    /// Device id forwarded to every example
    #[arg(short, long)]
    device: Option<u32>,

    /// Verbosity: 0 silent, 1 normal, 2 verbose
    #[arg(short, long, default_value_t = 1, value_parser = clap::value_parser!(u8).range(0..=2))]
    verbose: u8,

    /// Examples root (default: <root>/demos)
    #[arg(long)]
    examples_dir: Option<PathBuf>,

    /// Only run examples of this runtime
    #[arg(long)]
    runtime: Option<String>,

    /// Per-example deadline in seconds (0 = none)
    #[arg(long, default_value_t = DEFAULT_EXAMPLE_TIMEOUT_SECS)]
    timeout_secs: u64,

    /// Write the sweep report as JSON to this file
    #[arg(long)]
    report: Option<PathBuf>,
}

fn verbosity(level: u8) -> Result<Verbosity> {
    Verbosity::try_from(level).map_err(anyhow::Error::msg)
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    let root = cli.root.clone().unwrap_or_else(default_project_root);

    let passed = match cli.command {
        Commands::Run(args) => {
            let verbosity = verbosity(args.verbose)?;
            pto_core::init_tracing(cli.json, verbosity.tracing_level());
            cmd_run(&root, &args, verbosity).await?
        }
        Commands::RunAll(args) => {
            let verbosity = verbosity(args.verbose)?;
            pto_core::init_tracing(cli.json, verbosity.tracing_level());
            cmd_run_all(&root, cli.json, &args, verbosity).await?
        }
    };

    Ok(if passed {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

/// Validate one example. Returns whether it passed.
async fn cmd_run(root: &Path, args: &RunArgs, verbosity: Verbosity) -> Result<bool> {
    let rule = "=".repeat(RULE_WIDTH);
    match validate_example(root, args, verbosity).await {
        Ok(outcome) => {
            print_cases(&outcome);
            if let Some(path) = &args.report {
                write_json(path, &outcome)?;
            }
            if outcome.passed() {
                println!();
                println!("{}", rule);
                println!("TEST PASSED");
                println!("{}", rule);
                Ok(true)
            } else {
                let reason = outcome
                    .failure_reason()
                    .unwrap_or_else(|| "no cases ran".to_string());
                println!();
                println!("TEST FAILED: {}", reason);
                Ok(false)
            }
        }
        Err(e) => {
            println!();
            println!("TEST FAILED: {:#}", e);
            Ok(false)
        }
    }
}

async fn validate_example(
    root: &Path,
    args: &RunArgs,
    verbosity: Verbosity,
) -> Result<ExampleOutcome> {
    let toolchain = ToolchainConfig::from_env();
    let compiler = Arc::new(ToolchainCompiler::new(
        args.platform,
        verbosity,
        toolchain.clone(),
    ));
    let builder = RuntimeBuilder::new(args.platform, Some(root.to_path_buf()), verbosity, compiler)
        .context("Failed to scan runtime implementations")?;
    let executor = Arc::new(LauncherExecutor::new(
        toolchain.launcher,
        args.timeout_secs,
        verbosity,
    ));

    let harness = GoldenHarness::new(builder, executor)
        .with_device_id(args.device)
        .with_runtime(args.runtime.clone())
        .with_case(args.case.clone());

    info!(
        kernels = %args.kernels.display(),
        golden = %args.golden.display(),
        platform = %args.platform,
        device = args.device,
        "Validating example"
    );
    let outcome = harness.run(&args.kernels, &args.golden).await?;
    Ok(outcome)
}

fn print_cases(outcome: &ExampleOutcome) {
    println!(
        "Reference: {}  Runtime: {}",
        outcome.reference, outcome.runtime_name
    );
    for case in &outcome.cases {
        let mark = if case.outcome.passed() { "✓" } else { "✗" };
        println!(
            "  {} {} (seed {}, {}ms)",
            mark, case.label, case.seed, case.duration_ms
        );
    }
}

/// Validate every discovered example. Returns whether all of them passed.
async fn cmd_run_all(
    root: &Path,
    json_logs: bool,
    args: &RunAllArgs,
    verbosity: Verbosity,
) -> Result<bool> {
    let examples_dir = examples_root(root, args);
    let Some(discovery) = discover_examples(&examples_dir, args, &mut std::io::stdout())? else {
        return Ok(false);
    };

    let settings = LaunchSettings {
        platform: args.platform,
        device_id: args.device,
        verbosity,
        timeout_secs: args.timeout_secs,
    };
    let exe = std::env::current_exe().context("Failed to locate the pto executable")?;
    let launcher = SubprocessLauncher::new(child_program(&exe, root, json_logs), settings);

    let platform = args.platform;
    let sweep = ExampleSweep::new(Arc::new(launcher)).on_start(move |record| {
        println!();
        println!("Running: {} (platform: {})", record.display_name(), platform);
    });
    let report = sweep.run(&discovery.records).await;

    println!();
    println!("{}", report.render());
    if let Some(path) = &args.report {
        write_json(path, &report)?;
    }
    Ok(report.success())
}

fn examples_root(root: &Path, args: &RunAllArgs) -> PathBuf {
    args.examples_dir
        .clone()
        .unwrap_or_else(|| root.join(DEFAULT_EXAMPLES_DIR))
}

/// Scan the examples root and write the discovery summary to `out`.
/// Returns `None` after reporting when nothing runnable was found.
fn discover_examples(
    examples_dir: &Path,
    args: &RunAllArgs,
    out: &mut impl Write,
) -> Result<Option<DiscoveryReport>> {
    writeln!(out, "Scanning for examples in: {}", examples_dir.display())?;
    writeln!(out, "Platform: {}", args.platform)?;
    if let Some(runtime) = &args.runtime {
        writeln!(out, "Runtime filter: {}", runtime)?;
    }

    let discovery = ExampleRegistry::scan(examples_dir, args.runtime.as_deref())
        .context("Failed to scan examples")?;
    for warning in &discovery.warnings {
        writeln!(out, "Warning: {}", warning)?;
    }
    for skipped in &discovery.skipped {
        writeln!(out, "{}", skipped)?;
    }

    if discovery.records.is_empty() {
        writeln!(out, "No valid examples found.")?;
        return Ok(None);
    }
    writeln!(out, "Found {} example(s)", discovery.records.len())?;
    Ok(Some(discovery))
}

/// Command prefix for child runs; global flags go before the subcommand.
fn child_program(exe: &Path, root: &Path, json_logs: bool) -> Vec<String> {
    let mut program = vec![
        exe.display().to_string(),
        "--root".to_string(),
        root.display().to_string(),
    ];
    if json_logs {
        program.push("--json".to_string());
    }
    program
}

fn write_json<T: serde::Serialize>(path: &Path, value: &T) -> Result<()> {
    let body = serde_json::to_string_pretty(value)?;
    std::fs::write(path, body).context(format!("Failed to write report: {:?}", path))?;
    Ok(())
}
