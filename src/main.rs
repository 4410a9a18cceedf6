//! Relay bot — entry point.
//!
//! Startup sequence:
//!   1. Load .env (if present)
//!   2. Load config (TOML + environment)
//!   3. Apply CLI flags, resolve effective log level
//!   4. Init logger once
//!   5. Validate credentials (fail fast)
//!   6. Build LLM provider, conversation store and chat agent
//!   7. Spawn Ctrl-C → shutdown signal watcher
//!   8. Run comms channels until shutdown or failure

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use relay_bot::config::{self, Config};
use relay_bot::error::AppError;
use relay_bot::llm::providers;
use relay_bot::logger;
use relay_bot::subsystems::agents::ChatAgent;
use relay_bot::subsystems::comms;
use relay_bot::subsystems::memory::ConversationStore;

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), AppError> {
    // .env is optional.
    let _ = dotenvy::dotenv();

    let args = parse_cli_args();

    let mut config = config::load(args.config_path.as_deref())?;

    let mut telegram_skipped = false;
    if args.interactive {
        config.comms.pty.enabled = true;
        // A console session does not need Telegram credentials.
        if config.comms.telegram.enabled && config.telegram_token.is_none() {
            config.comms.telegram.enabled = false;
            telegram_skipped = true;
        }
    }

    let effective_log_level = args.log_level.unwrap_or(config.log_level.as_str()).to_string();
    logger::init(&effective_log_level, args.log_level.is_some())?;

    if telegram_skipped {
        warn!("TELEGRAM_TOKEN not set — telegram channel disabled for this console session");
    }

    config.validate()?;

    info!(
        bot_name = %config.bot_name,
        provider = %config.llm.provider,
        model = %config.llm.openai.model,
        delivery = config.delivery.label(),
        log_level = %effective_log_level,
        "config loaded"
    );

    let provider = providers::build(&config.llm, config.llm_api_key.clone())
        .map_err(|e| AppError::Config(e.to_string()))?;
    let store = ConversationStore::new(
        config.memory.system_prompt.clone(),
        config.memory.history_cap,
    );
    let agent = Arc::new(ChatAgent::new(provider, store));

    // Ctrl-C cancels this; every channel watches it.
    let shutdown = CancellationToken::new();

    let ctrlc_token = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("ctrl-c received — initiating shutdown");
            ctrlc_token.cancel();
        }
    });

    print_startup_summary(&config, args.interactive);

    let channels = comms::start(&config, agent, shutdown.clone())?;
    let result = channels.join().await;

    // Console EOF ends the run as well; make sure everything else stops.
    shutdown.cancel();
    info!("shutdown complete");
    result
}

fn print_startup_summary(config: &Config, interactive: bool) {
    let enabled = |on: bool| if on { "on" } else { "off" };
    let history = config
        .memory
        .history_cap
        .map(|c| format!("last {c} turns"))
        .unwrap_or_else(|| "unbounded".to_string());

    let delivery = match &config.delivery {
        config::DeliveryMode::Polling => "polling".to_string(),
        config::DeliveryMode::Webhook { listen, url } => format!("webhook {url} (listen {listen})"),
    };

    println!("relay-bot {}", env!("CARGO_PKG_VERSION"));
    println!("  mode      : {}", if interactive { "interactive" } else { "daemon" });
    println!("  telegram  : {} ({delivery})", enabled(config.comms_telegram_should_load()));
    println!("  console   : {}", enabled(config.comms_pty_should_load()));
    println!("  llm       : {} / {}", config.llm.provider, config.llm.openai.model);
    println!("  history   : {history}");
}

struct CliArgs {
    log_level: Option<&'static str>,
    interactive: bool,
    config_path: Option<String>,
}

fn parse_cli_args() -> CliArgs {
    let mut verbosity = 0u8;
    let mut interactive = false;
    let mut config_path = None;

    let mut iter = std::env::args().skip(1);
    while let Some(arg) = iter.next() {
        if arg == "--" {
            break;
        }

        match arg.as_str() {
            "-h" | "--help" => {
                println!("Usage: relay-bot [OPTIONS]");
                println!();
                println!("Options:");
                println!("  -h, --help                 Print help");
                println!("  -i, --interactive          Enable the console channel");
                println!("  -f, --config <PATH>        Path to configuration file (default: config/default.toml)");
                println!("  -v, -vv, -vvv, -vvvv       Increase logging verbosity");
                std::process::exit(0);
            }
            "-i" | "--interactive" => interactive = true,
            "-f" | "--config" => {
                if let Some(path) = iter.next() {
                    config_path = Some(path);
                } else {
                    eprintln!("error: -f/--config requires a path argument");
                    std::process::exit(1);
                }
            }
            "--verbose" => verbosity = verbosity.saturating_add(1),
            a if a.starts_with('-') && a.len() > 1 && a.chars().skip(1).all(|c| c == 'v') => {
                verbosity = verbosity.saturating_add((a.len() - 1) as u8);
            }
            _ => {}
        }
    }

    //   -v → warn, -vv → info, -vvv → debug, -vvvv+ → trace
    let log_level = match verbosity {
        0 => None,
        1 => Some("warn"),
        2 => Some("info"),
        3 => Some("debug"),
        _ => Some("trace"),
    };

    CliArgs { log_level, interactive, config_path }
}
