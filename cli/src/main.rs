use std::collections::HashSet;

use clap::{Args, Parser, Subcommand};
use pushsocket::transport::{CAPABILITY_UNAVAILABLE, CLOSE_REJECTED};
use pushsocket::{ChannelRegistry, Handlers, PushConfig};
use serde::Serialize;
use serde_json::Value;
use tokio::sync::mpsc;

#[derive(Debug, thiserror::Error)]
enum CliError {
    #[error("invalid configuration: {0}")]
    Config(#[from] pushsocket::PushError),
    #[error("invalid JSON payload: {0}")]
    InvalidJson(#[from] serde_json::Error),
    #[error("channel `{0}` was rejected by the server")]
    Rejected(String),
    #[error("websockets are not available in this environment")]
    Unavailable,
}

#[derive(Parser, Debug)]
#[command(name = "push-cli", about = "Push channel subscriber over WebSockets")]
struct Cli {
    /// Origin the endpoint is resolved against, e.g. `https://example.com`.
    #[arg(long, env = "PUSH_ORIGIN")]
    origin: Option<String>,

    #[arg(long, env = "PUSH_PATH_PREFIX")]
    path_prefix: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the endpoint a channel would connect to.
    Url {
        channel: String,
        #[arg(long, help = "Host fragment: empty, /path, :port or host[:port][/path]")]
        host: Option<String>,
    },
    /// Stream channel messages to stdout as JSON lines.
    Subscribe(SubscribeArgs),
}

#[derive(Args, Debug)]
struct SubscribeArgs {
    #[arg(required = true)]
    channels: Vec<String>,

    #[arg(long, help = "Host fragment: empty, /path, :port or host[:port][/path]")]
    host: Option<String>,

    #[arg(long, help = "Close every channel after this many messages")]
    max_messages: Option<usize>,
}

#[derive(Debug)]
enum CliEvent {
    Message { channel: String, data: Value },
    Closed { channel: String, code: i32 },
}

/// One stdout line per received message.
#[derive(Debug, Serialize)]
struct OutputLine<'a> {
    channel: &'a str,
    data: &'a Value,
}

#[tokio::main]
async fn main() -> Result<(), CliError> {
    tracing_subscriber::fmt().with_writer(std::io::stderr).init();

    let cli = Cli::parse();
    let config = apply_overrides(PushConfig::from_env()?, cli.origin, cli.path_prefix)?;

    match cli.command {
        Command::Url { channel, host } => run_url(&config, &channel, host.as_deref()),
        Command::Subscribe(args) => run_subscribe(&config, args).await,
    }
}

fn apply_overrides(
    mut config: PushConfig,
    origin: Option<String>,
    path_prefix: Option<String>,
) -> Result<PushConfig, CliError> {
    if let Some(origin) = origin {
        config.origin = origin;
    }
    if let Some(prefix) = path_prefix {
        config.path_prefix = prefix.trim_end_matches('/').to_owned();
    }
    config.validate()?;
    Ok(config)
}

fn run_url(config: &PushConfig, channel: &str, host: Option<&str>) -> Result<(), CliError> {
    let registry = ChannelRegistry::with_websockets(config)?;
    println!("{}", registry.resolve(host, channel));
    Ok(())
}

async fn run_subscribe(config: &PushConfig, args: SubscribeArgs) -> Result<(), CliError> {
    let mut budget = MessageBudget::new(args.max_messages);
    if budget.is_spent() {
        eprintln!("subscribe complete: received=0");
        return Ok(());
    }

    let channels = unique_channels(args.channels);
    let (tx, mut rx) = mpsc::unbounded_channel();

    let mut registry = ChannelRegistry::with_websockets(config)?;
    for channel in &channels {
        registry.open(args.host.as_deref(), channel, forwarding_handlers(tx.clone()));
    }
    drop(tx);

    let mut open: HashSet<String> = channels.into_iter().collect();
    let mut closing = false;
    let mut rejected: Option<String> = None;
    let mut unavailable = false;

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    while !open.is_empty() {
        tokio::select! {
            event = rx.recv() => {
                let Some(event) = event else { break };
                match event {
                    CliEvent::Message { channel, data } => {
                        // Frames already in flight when closing started are dropped.
                        if !closing && budget.admit() {
                            print_json(&OutputLine { channel: &channel, data: &data })?;
                            if budget.is_spent() {
                                closing = true;
                                registry.close_all();
                            }
                        }
                    }
                    CliEvent::Closed { channel, code } => {
                        eprintln!("channel {channel} closed: code={code}");
                        if code == i32::from(CLOSE_REJECTED) && rejected.is_none() {
                            rejected = Some(channel.clone());
                        }
                        if code == CAPABILITY_UNAVAILABLE {
                            unavailable = true;
                        }
                        open.remove(&channel);
                    }
                }
            }
            result = &mut ctrl_c, if !closing => {
                if let Err(error) = result {
                    tracing::warn!(%error, "ctrl-c handler failed; closing channels");
                }
                closing = true;
                registry.close_all();
            }
        }
    }

    eprintln!("subscribe complete: received={}", budget.received);
    if unavailable {
        return Err(CliError::Unavailable);
    }
    if let Some(channel) = rejected {
        return Err(CliError::Rejected(channel));
    }
    Ok(())
}

/// Caps how many messages `subscribe` prints.
#[derive(Debug)]
struct MessageBudget {
    limit: Option<usize>,
    received: usize,
}

impl MessageBudget {
    fn new(limit: Option<usize>) -> Self {
        Self { limit, received: 0 }
    }

    fn is_spent(&self) -> bool {
        self.limit.is_some_and(|limit| self.received >= limit)
    }

    /// Count one message. Returns false once the limit has been reached.
    fn admit(&mut self) -> bool {
        if self.is_spent() {
            return false;
        }
        self.received = self.received.saturating_add(1);
        true
    }
}

fn forwarding_handlers(tx: mpsc::UnboundedSender<CliEvent>) -> Handlers {
    let message_tx = tx.clone();
    Handlers::new()
        .on_message(move |data, channel, _event| {
            let _ = message_tx.send(CliEvent::Message { channel: channel.to_owned(), data });
        })
        .on_close(move |code, channel, _event| {
            let _ = tx.send(CliEvent::Closed { channel: channel.to_owned(), code });
        })
}

/// Drop repeated names; reopening a channel would close the first subscription.
fn unique_channels(channels: Vec<String>) -> Vec<String> {
    let mut seen = HashSet::new();
    channels.into_iter().filter(|c| seen.insert(c.clone())).collect()
}

fn print_json(value: &impl Serialize) -> Result<(), CliError> {
    let rendered = serde_json::to_string(value)?;
    println!("{rendered}");
    Ok(())
}

#[cfg(test)]
#[path = "main_test.rs"]
mod tests;
