use clap::Parser;
use colored::*;
use eyre::{Context, Result, eyre};
use futures::StreamExt;
use log::info;
use std::fs;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;

mod cli;

use cli::Cli;
use cli::commands::Commands;
use opsgate::config::Config;
use opsgate::executor::{ExecutorConfig, RemoteExecutor, SshConfig, SshTransport};
use opsgate::format::{LlmFormatter, PlainFormatter, Replies, ResponseFormatter};
use opsgate::id::ConversationId;
use opsgate::llm::{LlmClient, OllamaClient, OllamaConfig};
use opsgate::memory::MemoryManager;
use opsgate::orchestrator::{TurnChunk, TurnOrchestrator};
use opsgate::policy::{PolicyEngine, PolicyVerdict};
use opsgate::router::IntentRouter;
use opsgate::storage::{EntryRole, JsonlMessageStore, MessageStore};
use opsgate::tools::{RiskTier, ToolCatalog};

fn setup_logging() -> Result<()> {
    // Create log directory
    let log_dir = dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("opsgate")
        .join("logs");

    fs::create_dir_all(&log_dir).context("Failed to create log directory")?;

    let log_file = log_dir.join("opsgate.log");

    // Setup env_logger with file output
    let target = Box::new(
        fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&log_file)
            .context("Failed to open log file")?,
    );

    env_logger::Builder::from_default_env()
        .target(env_logger::Target::Pipe(target))
        .init();

    info!("Logging initialized, writing to: {}", log_file.display());
    Ok(())
}

fn load_catalog(config: &Config) -> Result<Arc<ToolCatalog>> {
    let catalog = ToolCatalog::builtin()
        .with_disabled(&config.policy.disabled_tools)
        .context("Invalid policy.disabled_tools")?;
    Ok(Arc::new(catalog))
}

fn build_orchestrator(config: &Config, plain: bool) -> Result<Arc<TurnOrchestrator>> {
    let catalog = load_catalog(config)?;
    let llm: Arc<dyn LlmClient> = Arc::new(
        OllamaClient::new(OllamaConfig::from(&config.llm)).map_err(|e| eyre!("Failed to create LLM client: {}", e))?,
    );

    let policy = PolicyEngine::new(catalog.clone(), &config.remote.workspace_root, &config.policy)
        .context("Failed to build policy engine")?;
    let transport = SshTransport::new(SshConfig::from(&config.remote)).context("Failed to configure SSH")?;
    let executor = RemoteExecutor::new(Arc::new(transport), ExecutorConfig::from(&config.remote));

    let store = JsonlMessageStore::new(&config.storage.data_dir).context("Failed to open message store")?;
    let memory = MemoryManager::new(Arc::new(store), llm.clone(), config.memory.clone())
        .with_temperature(config.llm.summary_temperature);

    let replies = Replies::new(&catalog, config.remote.user.clone());
    let formatter: Arc<dyn ResponseFormatter> = if plain {
        Arc::new(PlainFormatter::new(replies))
    } else {
        Arc::new(LlmFormatter::new(llm.clone(), replies).with_temperature(config.llm.format_temperature))
    };

    let router = IntentRouter::new(llm, catalog).with_temperature(config.llm.router_temperature);

    Ok(Arc::new(TurnOrchestrator::new(
        router,
        policy,
        executor,
        memory,
        formatter,
        config.turn.clone(),
    )))
}

async fn run_application(cli: &Cli, config: &Config) -> Result<()> {
    info!("Starting application");

    if cli.is_verbose() {
        println!("{}", "Verbose mode enabled".yellow());
    }

    match &cli.command {
        Commands::Chat {
            conversation,
            message,
            plain,
        } => handle_chat_command(conversation, &message.join(" "), *plain, config).await,
        Commands::Tools => handle_tools_command(config),
        Commands::Check { tool, args } => handle_check_command(tool, args, config),
        Commands::History { conversation } => handle_history_command(conversation, config),
    }
}

async fn handle_chat_command(conversation: &str, message: &str, plain: bool, config: &Config) -> Result<()> {
    let conversation = ConversationId::parse(conversation)?;
    info!("Chat turn for {}", conversation);

    let orchestrator = build_orchestrator(config, plain)?;
    let mut stream = orchestrator.process_turn(conversation, message);

    let mut failure = None;
    while let Some(chunk) = stream.next().await {
        match chunk {
            TurnChunk::Text(text) => {
                print!("{}", text);
                std::io::stdout().flush().ok();
            }
            TurnChunk::Done { turn_id, created_at } => {
                println!();
                println!("{} {} at {}", "Saved".dimmed(), turn_id.dimmed(), created_at.to_rfc3339().dimmed());
            }
            TurnChunk::Failed { message } => failure = Some(message),
        }
    }

    orchestrator.shutdown().await;
    match failure {
        Some(message) => Err(eyre!("Turn failed: {}", message)),
        None => Ok(()),
    }
}

fn handle_tools_command(config: &Config) -> Result<()> {
    let catalog = load_catalog(config)?;
    for tool in catalog.list() {
        let tier = match tool.risk {
            RiskTier::SafeRead => tool.risk.as_str().green(),
            RiskTier::Write => tool.risk.as_str().yellow(),
            RiskTier::Refused => tool.risk.as_str().red(),
        };
        let tier = if tool.name.is_sentinel() { "sentinel".cyan() } else { tier };
        println!("{:<22} {:<10} {}", tool.name.as_str().bold(), tier, tool.description);
        for arg in &tool.args {
            let required = if arg.required { "required" } else { "optional" };
            println!("    {} ({}) {}", arg.name, required, arg.description.dimmed());
        }
    }
    Ok(())
}

fn handle_check_command(tool: &str, args: &[(String, serde_json::Value)], config: &Config) -> Result<()> {
    let catalog = load_catalog(config)?;
    let engine = PolicyEngine::new(catalog, &config.remote.workspace_root, &config.policy)
        .context("Failed to build policy engine")?;

    let args = args.iter().cloned().collect();
    match engine.evaluate_named(tool, args) {
        PolicyVerdict::Approved(approved) => {
            println!("{} {}", "approved".green().bold(), approved.tool());
            for (name, value) in approved.args() {
                println!("    {} = {}", name, value.as_token());
            }
            let command = approved.render()?;
            println!("    {} {}", "command:".dimmed(), command.command_line()?);
            if let Some(stdin) = command.stdin() {
                println!("    {} {} bytes", "stdin:".dimmed(), stdin.len());
            }
        }
        PolicyVerdict::Denied(reason) => {
            println!("{} [{}] {}", "denied".red().bold(), reason.code(), reason);
        }
        PolicyVerdict::NeedsClarification { question } => {
            println!("{} {}", "needs-clarification".yellow().bold(), question);
        }
    }
    Ok(())
}

fn handle_history_command(conversation: &str, config: &Config) -> Result<()> {
    let conversation = ConversationId::parse(conversation)?;
    let store = JsonlMessageStore::new(&config.storage.data_dir).context("Failed to open message store")?;
    let entries = store.read(&conversation)?;

    if entries.is_empty() {
        println!("{}", "No messages".dimmed());
        return Ok(());
    }

    for entry in entries {
        let role = match entry.role {
            EntryRole::User => "user".cyan(),
            EntryRole::Assistant => "assistant".green(),
            EntryRole::Summary => "summary".yellow(),
        };
        let stamp = entry.created_at.format("%Y-%m-%d %H:%M:%S").to_string();
        match entry.covers_through {
            Some(through) => println!("#{} {} {} (through #{})", entry.seq, stamp.dimmed(), role, through),
            None => println!("#{} {} {}", entry.seq, stamp.dimmed(), role),
        }
        println!("{}\n", entry.content);
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    // Setup logging first
    setup_logging().context("Failed to setup logging")?;

    // Parse CLI arguments
    let cli = Cli::parse();

    // Load configuration
    let config = Config::load(cli.config.as_ref()).context("Failed to load configuration")?;

    info!("Starting with config from: {:?}", cli.config);

    // Run the main application logic
    run_application(&cli, &config).await.context("Application failed")?;

    Ok(())
}
