//! Subnet Miner CLI - budget-aware task decision pipeline

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, anyhow};
use chrono::Utc;
use clap::{Parser, Subcommand};
use miner_core::budget::{BudgetAccount, BudgetLedger};
use miner_core::config::Config;
use miner_core::config::policy::DEFAULT_SUBNET;
use miner_core::inference::backend_from_config;
use miner_core::network::{JsonlTaskSource, MockNetwork};
use miner_core::performance::{PerformanceTracker, TaskResult};
use miner_core::pipeline::{TaskOutcome, TaskPipeline};
use miner_core::routing::AdmissionGate;
use miner_core::strategy::{PromptStrategy, StrategyCatalog};
use miner_core::task::Task;
use tracing::{info, warn};

#[derive(Parser)]
#[command(name = "subnet-miner")]
#[command(author, version, about = "Budget-aware task decision pipeline", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Output format (text or json)
    #[arg(long, global = true, default_value = "text")]
    format: OutputFormat,

    /// Quiet mode (minimal output)
    #[arg(short, long, global = true)]
    quiet: bool,
}

#[derive(Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
enum OutputFormat {
    #[default]
    Text,
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Process every task in a JSONL file
    Run {
        /// JSONL file with one task per line
        #[arg(short, long)]
        tasks: PathBuf,
        /// Stop after this many tasks
        #[arg(short, long)]
        limit: Option<usize>,
        /// Seed for participation sampling
        #[arg(long)]
        seed: Option<u64>,
    },

    /// Process a single task
    Process {
        /// Task content
        content: String,
        /// Subnet the task belongs to
        #[arg(short, long, default_value_t = DEFAULT_SUBNET)]
        subnet: u16,
        /// Task ID (generated when omitted)
        #[arg(long)]
        id: Option<String>,
        /// Seed for participation sampling
        #[arg(long)]
        seed: Option<u64>,
    },

    /// Token budget management
    Budget {
        #[command(subcommand)]
        action: BudgetAction,
    },

    /// Record a task result by hand
    Record {
        /// Task ID
        #[arg(long)]
        task_id: Option<String>,
        /// Validator score (0.0 to 1.0)
        #[arg(long)]
        score: f64,
        /// Tokens spent on the task
        #[arg(long)]
        tokens: u64,
        /// Model that produced the response
        #[arg(long)]
        llm: String,
        /// Prompt strategy used
        #[arg(long, default_value = "structured_reasoning")]
        strategy: PromptStrategy,
        /// Subnet the task belonged to
        #[arg(long, default_value_t = DEFAULT_SUBNET)]
        subnet: u16,
    },

    /// Show a performance report
    Report {
        /// Window length in days
        #[arg(short, long, default_value_t = 7)]
        days: u32,
        /// Save the snapshot to the metrics file
        #[arg(long)]
        save: bool,
    },

    /// Move old results out of the active log
    Archive {
        /// Archive results at least this many days old
        #[arg(short, long, default_value_t = 30)]
        days: u32,
    },

    /// List prompt strategies and their templates
    Strategies {
        /// Print each strategy's effective template
        #[arg(long)]
        templates: bool,
    },

    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum BudgetAction {
    /// Show per-provider usage
    Status,
    /// Provision or replace a provider account
    Set {
        /// Provider name (openai, anthropic, google)
        provider: String,
        /// Monthly token allowance
        #[arg(long)]
        allowance: u64,
        /// Informational daily limit
        #[arg(long, default_value_t = 0)]
        daily_limit: u64,
    },
    /// Zero usage for every provider
    Reset,
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Get a config value
    Get { key: String },
    /// Set a config value
    Set { key: String, value: String },
    /// List all config values
    List,
    /// Reset to defaults
    Reset,
    /// Show config file path
    Path,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.quiet { "warn" } else { "info" };
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(format!("subnet_miner={}", default_level).parse()?)
                .add_directive(format!("miner_core={}", default_level).parse()?),
        )
        .init();

    match cli.command {
        Commands::Run { tasks, limit, seed } => {
            cmd_run(&tasks, limit, seed, cli.format, cli.quiet).await
        }

        Commands::Process {
            content,
            subnet,
            id,
            seed,
        } => cmd_process(content, subnet, id, seed, cli.format, cli.quiet).await,

        Commands::Budget { action } => cmd_budget(action, cli.format, cli.quiet),

        Commands::Record {
            task_id,
            score,
            tokens,
            llm,
            strategy,
            subnet,
        } => {
            let task_id = task_id.unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
            let result = TaskResult::new(task_id, score, tokens, llm, strategy.as_str(), subnet);
            cmd_record(result, cli.quiet)
        }

        Commands::Report { days, save } => cmd_report(days, save, cli.format),

        Commands::Archive { days } => cmd_archive(days, cli.quiet),

        Commands::Strategies { templates } => cmd_strategies(templates, cli.format),

        Commands::Config { action } => cmd_config(action, cli.quiet),
    }
}

/// Load configuration, anchoring a relative state directory at the config directory
fn load_config() -> anyhow::Result<Config> {
    let mut config = Config::load()?;
    if config.paths.state_dir.is_relative() {
        config.paths.state_dir = Config::config_dir()?.join(&config.paths.state_dir);
    }
    Ok(config)
}

fn build_pipeline(config: &Config, seed: Option<u64>) -> anyhow::Result<TaskPipeline> {
    let backend = backend_from_config(&config.inference)?;
    let network = Arc::new(MockNetwork::new());
    let gate = match seed {
        Some(seed) => AdmissionGate::with_seed(seed),
        None => AdmissionGate::new(),
    };

    let pipeline = TaskPipeline::builder()
        .config(config)
        .gate(gate)
        .backend(Arc::from(backend))
        .submission_sink(network.clone())
        .validator_feedback(network)
        .build()?;

    if pipeline.ledger().accounts().next().is_none() {
        warn!("No budget accounts configured; every task will be rejected. Use `budget set`.");
    }
    Ok(pipeline)
}

async fn cmd_run(
    tasks: &Path,
    limit: Option<usize>,
    seed: Option<u64>,
    format: OutputFormat,
    quiet: bool,
) -> anyhow::Result<()> {
    let config = load_config()?;
    let source = JsonlTaskSource::open(tasks)
        .with_context(|| format!("Failed to read tasks from {}", tasks.display()))?;
    let mut pipeline = build_pipeline(&config, seed)?;

    info!(tasks = %tasks.display(), "Starting run");
    let stats = pipeline.run(&source, limit).await;

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&stats)?),
        OutputFormat::Text if !quiet => {
            println!("Run complete:");
            println!("  Processed: {}", stats.processed);
            println!("  Recorded:  {}", stats.recorded);
            println!("  Rejected:  {}", stats.rejected);
            println!("  Failed:    {}", stats.failed);
        }
        OutputFormat::Text => {}
    }
    Ok(())
}

async fn cmd_process(
    content: String,
    subnet: u16,
    id: Option<String>,
    seed: Option<u64>,
    format: OutputFormat,
    quiet: bool,
) -> anyhow::Result<()> {
    let config = load_config()?;
    let mut pipeline = build_pipeline(&config, seed)?;

    let mut task = Task::new(content, subnet);
    if let Some(id) = id {
        task = task.with_id(id);
    }

    let outcome = pipeline.process(task).await;

    if format == OutputFormat::Json {
        println!("{}", serde_json::to_string_pretty(&outcome)?);
        return Ok(());
    }

    match &outcome {
        TaskOutcome::Recorded(processed) => {
            if !quiet {
                println!("Task {} recorded", processed.task_id);
                println!(
                    "  Model: {} ({})",
                    processed.decision.model, processed.decision.provider
                );
                println!("  Strategy: {}", processed.decision.strategy);
                println!("  Tokens spent: {}", processed.tokens_spent);
                if let Some(result) = &processed.result {
                    println!("  Validator score: {:.2}", result.validator_score);
                }
                println!();
            }
            println!("{}", processed.response);
        }
        TaskOutcome::Rejected { task_id, reason } => {
            println!("Task {} rejected: {}", task_id, reason);
        }
        TaskOutcome::Failed { task_id, error } => {
            return Err(anyhow!("Task {} failed: {}", task_id, error));
        }
    }
    Ok(())
}

fn cmd_budget(action: BudgetAction, format: OutputFormat, quiet: bool) -> anyhow::Result<()> {
    let config = load_config()?;
    let mut ledger = BudgetLedger::open(config.paths.ledger_path());

    match action {
        BudgetAction::Status => {
            if format == OutputFormat::Json {
                let accounts: std::collections::BTreeMap<_, _> = ledger.accounts().collect();
                println!("{}", serde_json::to_string_pretty(&accounts)?);
                return Ok(());
            }

            if ledger.accounts().next().is_none() {
                println!("No budget accounts configured.");
                return Ok(());
            }

            println!("Token Budgets:");
            if let Some(period) = ledger.billing_period() {
                println!("  Billing period: {}", period);
            }
            println!();
            for (provider, account) in ledger.accounts() {
                println!(
                    "  {}: {} / {} used ({:.1}%), {} remaining",
                    provider,
                    account.used_this_month,
                    account.monthly_allowance,
                    account.utilization_percent(),
                    account.remaining()
                );
                if account.daily_limit > 0 {
                    println!("    Daily limit: {}", account.daily_limit);
                }
            }
            println!();
            println!(
                "  Aggregate utilization: {:.1}% (ceiling {:.0}%)",
                ledger.aggregate_utilization_percent(),
                config.budget.utilization_ceiling_percent
            );
        }
        BudgetAction::Set {
            provider,
            allowance,
            daily_limit,
        } => {
            let mut account = BudgetAccount::new(allowance, daily_limit);
            if let Some(existing) = ledger.account(&provider) {
                account.used_this_month = existing.used_this_month;
            }
            ledger.set_account(provider.clone(), account);
            if !quiet {
                println!("Set {} allowance to {} tokens", provider, allowance);
            }
        }
        BudgetAction::Reset => {
            ledger.reset_period();
            if !quiet {
                println!("Budget usage reset.");
            }
        }
    }
    Ok(())
}

fn cmd_record(result: TaskResult, quiet: bool) -> anyhow::Result<()> {
    let config = load_config()?;
    let tracker = PerformanceTracker::new(config.paths.result_log_path());
    let stored = tracker.record(result)?;
    if !quiet {
        println!(
            "Recorded {} (score {:.2})",
            stored.task_id, stored.validator_score
        );
    }
    Ok(())
}

fn cmd_report(days: u32, save: bool, format: OutputFormat) -> anyhow::Result<()> {
    let config = load_config()?;
    let mut tracker = PerformanceTracker::new(config.paths.result_log_path())
        .with_metrics_path(config.paths.metrics_path());
    let snapshot = tracker.analyze(days);

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&snapshot)?),
        OutputFormat::Text => println!("{}", PerformanceTracker::render_report(days, &snapshot)),
    }

    if save {
        tracker.save_snapshot(&snapshot)?;
    }
    Ok(())
}

fn cmd_archive(days: u32, quiet: bool) -> anyhow::Result<()> {
    let config = load_config()?;
    let tracker = PerformanceTracker::new(config.paths.result_log_path());
    let summary = tracker.archive_older_than(days, Utc::now())?;

    if !quiet {
        match &summary.archive_path {
            Some(path) => println!(
                "Archived {} results to {} ({} retained)",
                summary.archived,
                path.display(),
                summary.retained
            ),
            None => println!("Nothing to archive ({} results retained)", summary.retained),
        }
    }
    Ok(())
}

fn cmd_strategies(show_templates: bool, format: OutputFormat) -> anyhow::Result<()> {
    let config = load_config()?;
    let catalog = StrategyCatalog::from_templates(&config.strategies.templates);

    if format == OutputFormat::Json {
        let entries: Vec<_> = PromptStrategy::ALL
            .iter()
            .map(|strategy| {
                serde_json::json!({
                    "name": strategy.as_str(),
                    "description": strategy.description(),
                    "token_multiplier": strategy.token_multiplier(),
                    "best_for": strategy.best_for(),
                    "customized": catalog.is_customized(*strategy),
                    "template": catalog.template(*strategy),
                })
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&entries)?);
        return Ok(());
    }

    for strategy in PromptStrategy::ALL {
        let marker = if catalog.is_customized(strategy) {
            " (custom template)"
        } else {
            ""
        };
        println!("{}{}", strategy, marker);
        println!("  {}", strategy.description());
        println!("  Token multiplier: {}", strategy.token_multiplier());
        println!("  Best for: {}", strategy.best_for().join(", "));
        if show_templates {
            for line in catalog.template(strategy).lines() {
                println!("    {}", line);
            }
        }
    }
    Ok(())
}

fn cmd_config(action: ConfigAction, quiet: bool) -> anyhow::Result<()> {
    match action {
        ConfigAction::Get { key } => {
            let config = Config::load()?;
            let value = config.get(&key)?;
            println!("{}", value);
        }
        ConfigAction::Set { key, value } => {
            let mut config = Config::load()?;
            config.set(&key, &value)?;
            config.save()?;
            if !quiet {
                println!("Set {} = {}", key, value);
            }
        }
        ConfigAction::List => {
            let config = Config::load()?;
            let items = config.list()?;
            for (key, value) in items {
                println!("{} = {}", key, value);
            }
        }
        ConfigAction::Reset => {
            Config::reset()?;
            if !quiet {
                println!("Configuration reset to defaults.");
            }
        }
        ConfigAction::Path => {
            let path = Config::config_path()?;
            println!("{}", path.display());
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_record_parses_strategy() {
        let cli = Cli::try_parse_from([
            "subnet-miner",
            "record",
            "--score",
            "0.8",
            "--tokens",
            "120",
            "--llm",
            "claude-sonnet",
            "--strategy",
            "concise_generation",
        ])
        .unwrap();
        let Commands::Record { strategy, subnet, .. } = cli.command else {
            panic!("expected record command");
        };
        assert_eq!(strategy, PromptStrategy::ConciseGeneration);
        assert_eq!(subnet, 1);
    }

    #[test]
    fn test_unknown_strategy_is_rejected() {
        let result = Cli::try_parse_from([
            "subnet-miner",
            "record",
            "--score",
            "0.8",
            "--tokens",
            "1",
            "--llm",
            "x",
            "--strategy",
            "telepathy",
        ]);
        assert!(result.is_err());
    }
}
