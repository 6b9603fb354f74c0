use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use browser_session::BrowserSession;
use clap::{Parser, Subcommand};
use golem_cli::config::EngineConfig;
use golem_cli::orchestrator::Orchestrator;
use golem_cli::port::ConsolePort;
use golem_cli::skills::SkillCatalog;
use golem_core_types::{ChannelId, ChatEvent, SenderId};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Golem - browser-driven conversational agent with risk-gated execution
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Log level
    #[arg(short, long, default_value = "info")]
    log_level: String,

    /// Enable debug mode
    #[arg(short, long)]
    debug: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the engine with a console chat adapter on stdin/stdout
    Run(RunArgs),

    /// Send one message through the browser and print the reply
    Send(SendArgs),

    /// List the installed skill library
    Skills,

    /// Print the effective configuration
    Config,
}

#[derive(clap::Args)]
struct RunArgs {
    /// Run the browser without a visible window
    #[arg(long)]
    headless: bool,

    /// Attach to an existing remote-debugging endpoint instead of
    /// launching a browser (e.g. http://127.0.0.1:9222)
    #[arg(long)]
    attach: Option<String>,

    /// Skip the session priming message
    #[arg(long)]
    no_prime: bool,
}

#[derive(clap::Args)]
struct SendArgs {
    /// Message text
    text: String,

    /// Send as a system/priming message (settle only, no reply parsing)
    #[arg(long)]
    system: bool,

    /// Run the browser without a visible window
    #[arg(long)]
    headless: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(&cli.log_level, cli.debug)?;

    info!("Starting Golem v{}", env!("CARGO_PKG_VERSION"));
    let config = EngineConfig::load(cli.config.as_deref()).context("loading configuration")?;

    let result = match cli.command {
        Commands::Run(args) => cmd_run(args, config).await,
        Commands::Send(args) => cmd_send(args, config).await,
        Commands::Skills => cmd_skills(&config),
        Commands::Config => cmd_config(&config),
    };

    match result {
        Ok(()) => Ok(()),
        Err(err) => {
            error!("Command failed: {err:#}");
            std::process::exit(1);
        }
    }
}

fn init_logging(level: &str, debug: bool) -> Result<()> {
    let level = if debug { "debug" } else { level };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level)),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
    Ok(())
}

async fn cmd_run(args: RunArgs, mut config: EngineConfig) -> Result<()> {
    if args.headless {
        config.browser.headless = true;
    }
    if args.attach.is_some() {
        config.browser.remote_debug_url = args.attach;
    }

    let session = BrowserSession::open(&config.session_config())
        .await
        .context("opening browser session")?;
    let synchronizer = Orchestrator::synchronizer_parts(&config, session);
    let orchestrator = Arc::new(
        Orchestrator::new(config, synchronizer, Arc::new(ConsolePort))
            .context("wiring orchestrator")?,
    );

    if !args.no_prime {
        orchestrator.prime().await.context("priming session")?;
    }

    let (tx, rx) = mpsc::unbounded_channel();
    tokio::spawn(read_console_events(tx));

    info!("engine running; type messages, or !TOKEN for button actions; Ctrl+C to exit");
    tokio::select! {
        _ = orchestrator.run(rx) => {}
        _ = tokio::signal::ctrl_c() => {
            info!("shutting down");
        }
    }
    Ok(())
}

/// Console adapter: plain lines are messages, `!TOKEN` lines are button
/// presses (e.g. `!APPROVE:abc123`).
async fn read_console_events(tx: mpsc::UnboundedSender<ChatEvent>) {
    let channel = ChannelId("console".to_string());
    let sender = SenderId("operator".to_string());
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        let line = line.trim().to_string();
        if line.is_empty() {
            continue;
        }
        let event = if let Some(token) = line.strip_prefix('!') {
            ChatEvent::Button {
                token: token.to_string(),
                channel: channel.clone(),
            }
        } else {
            ChatEvent::Message {
                text: line,
                sender: sender.clone(),
                channel: channel.clone(),
            }
        };
        if tx.send(event).is_err() {
            break;
        }
    }
}

async fn cmd_send(args: SendArgs, mut config: EngineConfig) -> Result<()> {
    if args.headless {
        config.browser.headless = true;
    }
    let session = BrowserSession::open(&config.session_config())
        .await
        .context("opening browser session")?;
    let mut synchronizer = Orchestrator::synchronizer_parts(&config, session);

    let reply = synchronizer
        .send(&args.text, args.system)
        .await
        .context("sending message")?;
    if args.system {
        println!("(system message delivered)");
    } else {
        println!("{}", reply.text);
        if reply.truncated {
            eprintln!("note: the remote interface cut the reply off");
        }
    }
    Ok(())
}

fn cmd_skills(config: &EngineConfig) -> Result<()> {
    let catalog = SkillCatalog::load(&config.chat.skills_dir);
    if catalog.is_empty() {
        println!(
            "No skills installed under {}",
            config.chat.skills_dir.display()
        );
    } else {
        println!("{}", catalog.summary());
    }
    Ok(())
}

fn cmd_config(config: &EngineConfig) -> Result<()> {
    println!("browser.profile_dir     = {}", config.browser.profile_dir.display());
    println!("browser.start_url       = {}", config.browser.start_url);
    println!("browser.headless        = {}", config.browser.headless);
    println!("sync.poll_interval_ms   = {}", config.sync.poll_interval_ms);
    println!("sync.stability          = {}", config.sync.stability_threshold);
    println!("sync.ceiling_secs       = {}", config.sync.ceiling_secs);
    println!("policy.sandbox_root     = {}", config.policy.sandbox_root.display());
    println!("log.path                = {}", config.log.path.display());
    println!("log.retention_hours     = {}", config.log.retention_hours);
    println!("autonomy.enabled        = {}", config.autonomy.enabled);
    println!("autonomy.period_secs    = {}", config.autonomy.period_secs);
    Ok(())
}
