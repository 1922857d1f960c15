//! CLI entrypoint for atrium
//!
//! This is the main binary that wires together all layers using
//! dependency injection: gateway client and HTTP fallback from the
//! infrastructure layer, chat service from the application layer.

use anyhow::{Result, bail};
use atrium_application::{ChatService, GatewayEvent, GatewayPort};
use atrium_domain::{ChatStreamState, thread_to_session_key};
use atrium_infrastructure::{ConfigLoader, GatewayClient, HttpFallback};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// Give up waiting for a reply stream after this long.
const STREAM_WAIT: Duration = Duration::from_secs(120);

#[derive(Parser)]
#[command(name = "atrium", about = "Chat with your assistant through the atrium gateway")]
struct Cli {
    /// Message to send to the assistant
    message: Option<String>,

    /// Thread to address (e.g. "work", "home", "dev:projectX")
    #[arg(short, long, default_value = "work")]
    thread: String,

    /// Print recent history for the thread instead of sending
    #[arg(long)]
    history: bool,

    /// Number of history messages to fetch
    #[arg(long, default_value_t = 20)]
    limit: u32,

    /// Ask the gateway to stop generating for the thread
    #[arg(long)]
    abort: bool,

    /// Path to a config file (merged over the global one)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Ignore all config files and use built-in defaults
    #[arg(long)]
    no_config: bool,

    /// Increase log verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging based on verbosity level
    let filter = match cli.verbose {
        0 => EnvFilter::new("warn"),
        1 => EnvFilter::new("info"),
        2 => EnvFilter::new("debug"),
        _ => EnvFilter::new("trace"), // -vvv or more
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    let config = if cli.no_config {
        ConfigLoader::load_defaults()
    } else {
        ConfigLoader::load(cli.config.as_ref())?
    };

    // === Dependency Injection ===
    let gateway = Arc::new(GatewayClient::new(config.clone()));
    let fallback = Arc::new(HttpFallback::from_config(&config));
    let service = ChatService::new(gateway.clone(), fallback);

    // A failed connect is not fatal: sends degrade to the HTTP path.
    if let Err(e) = gateway.connect().await {
        warn!("gateway connection failed, degraded mode: {}", e);
    } else if let Some(hello) = gateway.hello() {
        info!(gateway_id = %hello.gateway_id, "connected");
    }

    if cli.abort {
        service.abort(&cli.thread).await?;
        println!("abort requested for thread '{}'", cli.thread);
        gateway.disconnect();
        return Ok(());
    }

    if cli.history {
        let history = service.history(&cli.thread, cli.limit).await?;
        for message in &history.messages {
            println!("{:?}: {}", message.role, message.content);
        }
        if history.has_more {
            println!("(older messages not shown)");
        }
        gateway.disconnect();
        return Ok(());
    }

    let Some(message) = cli.message else {
        bail!("Nothing to do. Pass a message, or use --history / --abort.");
    };

    // Subscribe before sending so no reply event can slip past.
    let events = gateway.events();
    let outcome = service.send_message(&cli.thread, &message).await?;

    if outcome.via_fallback {
        println!("sent via HTTP fallback; reply will appear in the thread");
    } else {
        stream_reply(events, &cli.thread).await;
    }

    gateway.disconnect();
    Ok(())
}

/// Print streamed reply text for the thread until the run reaches a
/// terminal state (or the wait budget runs out).
async fn stream_reply(
    mut events: tokio::sync::broadcast::Receiver<GatewayEvent>,
    thread_id: &str,
) {
    use std::io::Write;

    let session_key = thread_to_session_key(thread_id);
    let deadline = tokio::time::Instant::now() + STREAM_WAIT;

    loop {
        let event = match tokio::time::timeout_at(deadline, events.recv()).await {
            Ok(Ok(event)) => event,
            Ok(Err(_)) => break,
            Err(_) => {
                warn!("no terminal chat state within {:?}", STREAM_WAIT);
                break;
            }
        };
        match event {
            GatewayEvent::Agent(notice) if notice.session_key == session_key => {
                if let Some(content) = notice.content {
                    print!("{content}");
                    let _ = std::io::stdout().flush();
                }
            }
            GatewayEvent::Chat(notice) if notice.session_key == session_key => {
                if notice.state.is_terminal() {
                    println!();
                    if notice.state != ChatStreamState::Final {
                        warn!("run ended with state {:?}", notice.state);
                    }
                    break;
                }
            }
            _ => {}
        }
    }
}
