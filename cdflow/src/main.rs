use anyhow::{Context, Result};
use cdflow::cancellation::CancellationToken;
use cdflow::config::{CdflowConfig, DEFAULT_CONFIG_FILE};
use cdflow::events::LoggingEventSink;
use cdflow::observability::{init_logging, LogFormat};
use cdflow::pipeline::{Pipeline, PipelineResult, PipelineRunner};
use cdflow::process::ShellCommandRunner;
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{error, info, warn};

/// Exit code for configuration errors.
const EXIT_CONFIG: u8 = 3;

#[derive(Parser)]
#[command(name = "cdflow")]
#[command(version)]
#[command(about = "Run a sequential CI/CD pipeline of external build, scan and deploy tools")]
struct Cli {
    /// Log output format
    #[arg(long, value_enum, global = true, default_value_t = LogFormat::Pretty)]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct ConfigArgs {
    /// Path to the pipeline configuration
    #[arg(short, long, default_value = DEFAULT_CONFIG_FILE)]
    config: PathBuf,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the pipeline
    Run {
        #[command(flatten)]
        config: ConfigArgs,
        /// Write the run result as JSON to this file
        #[arg(long)]
        report: Option<PathBuf>,
    },
    /// Print the stages that would run, without running them
    Plan {
        #[command(flatten)]
        config: ConfigArgs,
    },
    /// Check that required tools and credentials are available
    Check {
        #[command(flatten)]
        config: ConfigArgs,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    if let Err(e) = init_logging(cli.log_format) {
        eprintln!("cdflow: logging unavailable: {e}");
    }

    match dispatch(cli.command).await {
        Ok(code) => code,
        Err(err) => {
            error!(error = %format!("{err:#}"), "cdflow failed");
            eprintln!("Error: {err:#}");
            ExitCode::from(EXIT_CONFIG)
        }
    }
}

async fn dispatch(command: Commands) -> Result<ExitCode> {
    match command {
        Commands::Run { config, report } => run(&config, report).await,
        Commands::Plan { config } => plan(&config),
        Commands::Check { config } => check(&config),
    }
}

fn load(args: &ConfigArgs) -> Result<(CdflowConfig, Pipeline)> {
    let config = CdflowConfig::load(&args.config)
        .with_context(|| format!("loading {}", args.config.display()))?;
    let gate = config.quality_gate().context("building quality gate")?;
    let pipeline = config.pipeline(gate).context("building pipeline")?;
    Ok((config, pipeline))
}

async fn run(args: &ConfigArgs, report: Option<PathBuf>) -> Result<ExitCode> {
    let (config, pipeline) = load(args)?;
    let runner_config = config.runner_config(&pipeline);

    std::fs::create_dir_all(&runner_config.workspace).with_context(|| {
        format!("creating workspace {}", runner_config.workspace.display())
    })?;

    let cancel = Arc::new(CancellationToken::new());
    let runner = PipelineRunner::new(runner_config, Arc::new(ShellCommandRunner::default()))
        .with_events(Arc::new(LoggingEventSink::debug()))
        .with_cancellation(Arc::clone(&cancel));

    let interrupt = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            cancel.cancel("interrupted by operator");
        }
    });

    info!(pipeline = %pipeline.name(), stages = pipeline.stage_count(), "Starting run");
    let result = runner.run(&pipeline).await;
    interrupt.abort();

    print_result(&result);

    if let Some(path) = report {
        match result.write_json(&path) {
            Ok(()) => info!(path = %path.display(), "Wrote run report"),
            Err(e) => warn!(path = %path.display(), error = %e, "Could not write run report"),
        }
    }

    Ok(exit_code(result.status.exit_code()))
}

fn plan(args: &ConfigArgs) -> Result<ExitCode> {
    let (config, pipeline) = load(args)?;
    let runner_config = config.runner_config(&pipeline);

    println!("Pipeline '{}' ({} stages)", pipeline.name(), pipeline.stage_count());
    println!("Workspace: {}", runner_config.workspace.display());
    for (index, spec) in pipeline.stages().iter().enumerate() {
        let policy = if spec.policy.is_tolerant() {
            " [continue on failure]"
        } else {
            ""
        };
        println!("{:>3}. {} ({}){policy}", index + 1, spec.name, spec.kind());
        for line in spec.runner.describe() {
            println!("       {line}");
        }
    }
    if !runner_config.required_tools.is_empty() {
        println!("Required tools: {}", runner_config.required_tools.join(", "));
    }
    if !runner_config.credentials.is_empty() {
        let names: Vec<&str> = runner_config.credentials.iter().map(|c| c.name.as_str()).collect();
        println!("Credentials: {}", names.join(", "));
    }

    Ok(ExitCode::SUCCESS)
}

fn check(args: &ConfigArgs) -> Result<ExitCode> {
    let (config, pipeline) = load(args)?;
    let runner = PipelineRunner::new(
        config.runner_config(&pipeline),
        Arc::new(ShellCommandRunner::default()),
    );

    let problems = runner.environment_problems();
    if problems.is_empty() {
        println!("Environment ready for '{}'", pipeline.name());
        return Ok(ExitCode::SUCCESS);
    }

    for problem in &problems {
        println!("  - {problem}");
    }
    println!("{} problem(s) found", problems.len());
    Ok(exit_code(cdflow::core::RunStatus::Aborted.exit_code()))
}

fn print_result(result: &PipelineResult) {
    for stage in &result.stages {
        let marker = if stage.tolerated { " (tolerated)" } else { "" };
        println!(
            "{:>3}. {:<24} {:<10} {:>9.1}s{marker}",
            stage.index + 1,
            stage.name,
            stage.status.to_string(),
            stage.duration_ms / 1000.0
        );
    }
    println!("{}", result.summary());
}

fn exit_code(code: i32) -> ExitCode {
    u8::try_from(code).map_or(ExitCode::FAILURE, ExitCode::from)
}
