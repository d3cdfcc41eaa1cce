//! Groundplan CLI entrypoint.
//!
//! This is the main entrypoint for the groundplan command-line tool.

use std::io::Write;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use groundplan::cli::{Cli, Commands, OutputFormatter, StateCommands};
use groundplan::config::{ConfigParser, ConfigValidator, StateBackend, find_config_file};
use groundplan::error::{ExecError, Result};
use groundplan::exec::{CancelToken, PlanExecutor, PriorState, SimulatedProvider};
use groundplan::graph::GraphBuilder;
use groundplan::planner::ProvisioningPlan;
use groundplan::state::{LocalStateStore, RunState, StateStore};

use clap::Parser;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

/// Main entrypoint.
fn main() -> ExitCode {
    let cli = Cli::parse();

    // Initialize logging
    init_logging(cli.verbose);

    // Run async runtime
    let runtime = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("Failed to create async runtime: {e}");
            return ExitCode::FAILURE;
        }
    };

    match runtime.block_on(run(cli)) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}

/// Initializes the logging system.
fn init_logging(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

/// Main async entry point.
async fn run(cli: Cli) -> Result<()> {
    let formatter = OutputFormatter::new(cli.output);

    match cli.command {
        Commands::Init { path, force } => cmd_init(&path, force),
        Commands::Validate { warnings } => cmd_validate(cli.config.as_ref(), warnings),
        Commands::Plan { detailed } => cmd_plan(cli.config.as_ref(), detailed, &formatter).await,
        Commands::Apply {
            yes,
            continue_on_error,
            parallelism,
        } => cmd_apply(cli.config.as_ref(), yes, continue_on_error, parallelism, &formatter).await,
        Commands::Outputs { unit } => cmd_outputs(cli.config.as_ref(), unit, &formatter).await,
        Commands::State { command } => cmd_state(cli.config.as_ref(), command, &formatter).await,
    }
}

/// Initialize a new project.
fn cmd_init(path: &PathBuf, force: bool) -> Result<()> {
    info!("Initializing new Groundplan project in: {}", path.display());

    let config_path = path.join("groundplan.yaml");
    let gitignore_path = path.join(".gitignore");

    // Check if files exist
    if !force && config_path.exists() {
        eprintln!("Configuration file already exists: {}", config_path.display());
        eprintln!("Use --force to overwrite.");
        return Ok(());
    }

    // Create directory if needed
    if !path.exists() {
        std::fs::create_dir_all(path)?;
    }

    // Write config template
    let config_template = include_str!("../templates/groundplan.yaml");
    std::fs::write(&config_path, config_template)?;
    eprintln!("Created: {}", config_path.display());

    // Write/update .gitignore
    if gitignore_path.exists() {
        let existing = std::fs::read_to_string(&gitignore_path)?;
        if !existing.contains(".groundplan") {
            let mut file = std::fs::OpenOptions::new()
                .append(true)
                .open(&gitignore_path)?;
            writeln!(file, "\n# Groundplan")?;
            writeln!(file, ".groundplan/")?;
            eprintln!("Updated: {}", gitignore_path.display());
        }
    } else {
        std::fs::write(&gitignore_path, ".groundplan/\n")?;
        eprintln!("Created: {}", gitignore_path.display());
    }

    eprintln!("\nProject initialized successfully!");
    eprintln!("Next steps:");
    eprintln!("  1. Edit groundplan.yaml with your resources and references");
    eprintln!("  2. Run 'groundplan validate' to check the declaration");
    eprintln!("  3. Run 'groundplan plan' to see the provisioning order");
    eprintln!("  4. Run 'groundplan apply' to provision");

    Ok(())
}

/// Validate configuration and dependency graph.
fn cmd_validate(config_path: Option<&PathBuf>, show_warnings: bool) -> Result<()> {
    let config_file = resolve_config_path(config_path)?;
    info!("Validating configuration: {}", config_file.display());

    // Load .env
    let parser = ConfigParser::new().with_base_path(
        config_file
            .parent()
            .unwrap_or_else(|| std::path::Path::new(".")),
    );
    parser.load_dotenv()?;

    // Parse config
    let config = parser.load_file(&config_file)?;

    // Validate fields
    let validator = ConfigValidator::new();
    let result = validator.validate(&config)?;

    // Build the graph so reference and cycle errors surface here, not
    // at apply time
    let graph = GraphBuilder::new().build(&config)?;

    eprintln!("Configuration is valid!");
    if show_warnings && !result.warnings.is_empty() {
        eprintln!("\nWarnings:");
        for warning in &result.warnings {
            eprintln!("  - {warning}");
        }
    }

    // Show summary
    eprintln!("\nConfiguration summary:");
    eprintln!("  Project: {}", config.project.name);
    eprintln!("  Environment: {}", config.project.environment);
    eprintln!("  Units: {}", config.units.len());
    eprintln!("  Resources: {}", config.resource_count());
    eprintln!("  References: {}", graph.edges().len());

    Ok(())
}

/// Show provisioning plan.
async fn cmd_plan(
    config_path: Option<&PathBuf>,
    detailed: bool,
    formatter: &OutputFormatter,
) -> Result<()> {
    let (config, state_store) = load_config_and_state(config_path)?;
    let graph = GraphBuilder::new().build(&config)?;
    let plan = ProvisioningPlan::from_graph(&graph);

    // Load prior state for the create/update/unchanged split
    let prior = state_store
        .load()
        .await?
        .map_or_else(PriorState::new, |state| state.prior_state());

    let output = formatter.format_plan(&plan, &graph, &prior);
    eprintln!("{output}");

    if detailed {
        eprintln!("\nDependencies:");
        for node in graph.nodes() {
            let deps = graph.dependencies_of(&node.id);
            if deps.is_empty() {
                eprintln!("  {} (no dependencies)", node.id);
            } else {
                let list: Vec<String> = deps.iter().map(ToString::to_string).collect();
                eprintln!("  {} -> {}", node.id, list.join(", "));
            }
        }
    }

    Ok(())
}

/// Apply the provisioning plan.
async fn cmd_apply(
    config_path: Option<&PathBuf>,
    auto_approve: bool,
    continue_on_error: bool,
    parallelism: Option<usize>,
    formatter: &OutputFormatter,
) -> Result<()> {
    let (config, state_store) = load_config_and_state(config_path)?;
    let mut graph = GraphBuilder::new().build(&config)?;
    let plan = ProvisioningPlan::from_graph(&graph);

    if plan.is_empty() {
        eprintln!("Nothing to provision.");
        return Ok(());
    }

    // Load state
    let mut state = state_store
        .load()
        .await?
        .unwrap_or_else(|| RunState::new(&config.project.name, &config.project.environment));
    let prior = state.prior_state();

    // Show plan
    let output = formatter.format_plan(&plan, &graph, &prior);
    eprintln!("{output}");

    // Confirm
    if !auto_approve {
        eprint!("Do you want to apply this plan? [y/N]: ");
        std::io::stderr().flush()?;

        let mut input = String::new();
        std::io::stdin().read_line(&mut input)?;

        if !input.trim().eq_ignore_ascii_case("y") {
            eprintln!("Apply cancelled.");
            return Ok(());
        }
    }

    // Hold the state lock across execution
    let lock = state_store.acquire_lock("").await?;

    // Cancel on Ctrl-C; in-flight provisioning finishes first
    let cancel = CancelToken::new();
    let signal_cancel = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, finishing in-flight work");
            signal_cancel.cancel();
        }
    });

    let on_failure = if continue_on_error {
        groundplan::config::FailurePolicy::Continue
    } else {
        config.run.on_failure
    };

    let executor = PlanExecutor::new(Arc::new(SimulatedProvider::new()))
        .with_parallelism(parallelism.unwrap_or(config.run.parallelism))
        .with_failure_policy(on_failure)
        .with_cancel_token(cancel);

    let report = executor.execute(&plan, &mut graph, &prior).await;

    // Save state even after a failed run; whatever provisioned is real
    let release = async {
        state_store.release_lock(&lock.lock_id).await
    };
    let report = match report {
        Ok(report) => {
            state.record_run(&report, &graph);
            state_store.save(&state).await?;
            release.await?;
            report
        }
        Err(e) => {
            release.await?;
            return Err(e);
        }
    };

    // Show result
    let output = formatter.format_report(&report);
    eprintln!("{output}");

    if report.success {
        Ok(())
    } else {
        Err(ExecError::Aborted {
            reason: format!("{} resource(s) failed to provision", report.failed_count()),
        }
        .into())
    }
}

/// Show recorded outputs and unit exports.
async fn cmd_outputs(
    config_path: Option<&PathBuf>,
    unit: Option<String>,
    formatter: &OutputFormatter,
) -> Result<()> {
    let (_config, state_store) = load_config_and_state(config_path)?;

    let Some(state) = state_store.load().await? else {
        eprintln!("No state found. Run 'groundplan apply' first.");
        return Ok(());
    };

    let exports = match unit {
        Some(name) => state
            .exports
            .iter()
            .filter(|(unit_name, _)| **unit_name == name)
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect(),
        None => state.exports.clone(),
    };

    let output = formatter.format_outputs(&exports);
    eprintln!("{output}");

    Ok(())
}

/// State management commands.
async fn cmd_state(
    config_path: Option<&PathBuf>,
    command: StateCommands,
    formatter: &OutputFormatter,
) -> Result<()> {
    let (_config, state_store) = load_config_and_state(config_path)?;

    match command {
        StateCommands::Show => {
            if let Some(state) = state_store.load().await? {
                let output = formatter.format_state(&state);
                eprintln!("{output}");
            } else {
                eprintln!("No state found.");
            }
        }
        StateCommands::Lock { holder } => {
            let holder_str = holder.as_deref().unwrap_or("");
            let lock = state_store.acquire_lock(holder_str).await?;
            eprintln!("State locked: {}", lock.lock_id);
        }
        StateCommands::Unlock { lock_id, force } => {
            if force {
                // Force unlock by releasing whatever lock exists
                if let Some(lock_info) = state_store.get_lock_info().await? {
                    state_store.release_lock(&lock_info.lock_id).await?;
                    eprintln!("State forcefully unlocked.");
                }
            } else if let Some(id) = lock_id {
                state_store.release_lock(&id).await?;
                eprintln!("State unlocked.");
            } else {
                eprintln!("Please provide --lock-id or use --force");
            }
        }
    }

    Ok(())
}

// ============================================================================
// Helper Functions
// ============================================================================

/// Resolves the configuration file path.
fn resolve_config_path(config_path: Option<&PathBuf>) -> Result<PathBuf> {
    config_path.map_or_else(|| find_config_file("."), |path| Ok(path.clone()))
}

/// Loads configuration and creates the appropriate state store.
fn load_config_and_state(
    config_path: Option<&PathBuf>,
) -> Result<(groundplan::config::DeployConfig, Box<dyn StateStore>)> {
    let config_file = resolve_config_path(config_path)?;
    debug!("Loading configuration from: {}", config_file.display());

    let parser = ConfigParser::new().with_base_path(
        config_file
            .parent()
            .unwrap_or_else(|| std::path::Path::new(".")),
    );
    parser.load_dotenv()?;

    let config = parser.load_with_env(&config_file)?;

    // Validate
    let validator = ConfigValidator::new();
    validator.validate(&config)?;

    // Create state store based on config
    let state_store: Box<dyn StateStore> = match config.state.backend {
        StateBackend::Local => {
            let path = config.state.path.as_ref().map_or_else(
                || {
                    config_file
                        .parent()
                        .unwrap_or_else(|| std::path::Path::new("."))
                        .join(".groundplan")
                },
                PathBuf::from,
            );
            Box::new(LocalStateStore::with_base_dir(path))
        }
    };

    Ok((config, state_store))
}
