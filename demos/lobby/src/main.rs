//! Lobby: a minimal host/join demo for Roster.
//!
//! # Usage
//!
//! ```bash
//! # Host a lobby; the host is player conn-0
//! lobby host --bind 127.0.0.1:7777 --name Host --attr color=red
//!
//! # Join it from another terminal
//! lobby join --server 127.0.0.1:7777 --name Alice
//!
//! # Quit as soon as anyone leaves, like a standalone game build would
//! lobby join --server 127.0.0.1:7777 --name Bob --quit-on-leave
//! ```

use std::sync::Arc;

use clap::{Args, Parser, Subcommand};
use roster::prelude::*;
use tokio::sync::Notify;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Roster lobby demo
#[derive(Parser, Debug)]
#[command(name = "lobby")]
#[command(about = "Host or join a player lobby")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, global = true, default_value = "info")]
    log_level: String,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Host a lobby and play in it
    Host {
        /// Address to bind to
        #[arg(short, long, default_value = roster::DEFAULT_BIND_ADDR)]
        bind: String,

        #[command(flatten)]
        player: PlayerArgs,
    },

    /// Join someone else's lobby
    Join {
        /// Address of the host
        #[arg(short, long, default_value = roster::DEFAULT_BIND_ADDR)]
        server: String,

        #[command(flatten)]
        player: PlayerArgs,
    },
}

#[derive(Args, Debug)]
struct PlayerArgs {
    /// Display name
    #[arg(short, long)]
    name: String,

    /// Extra attribute as key=value (repeatable)
    #[arg(short, long = "attr", value_parser = parse_attr)]
    attrs: Vec<(String, String)>,

    /// Exit when any player leaves
    #[arg(long)]
    quit_on_leave: bool,
}

impl PlayerArgs {
    fn record(&self) -> PlayerRecord {
        self.attrs
            .iter()
            .fold(PlayerRecord::new(&self.name), |record, (k, v)| {
                record.with_attribute(k, v)
            })
    }
}

fn parse_attr(raw: &str) -> Result<(String, String), String> {
    raw.split_once('=')
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .ok_or_else(|| format!("expected key=value, got `{raw}`"))
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level));
    tracing_subscriber::registry().with(fmt::layer()).with(filter).init();

    let quit = Arc::new(Notify::new());

    match cli.command {
        Command::Host { bind, player } => {
            let mut builder = RosterServer::builder()
                .bind(&bind)
                .local_record(player.record());
            if player.quit_on_leave {
                builder = builder.termination_policy(quit_policy(&quit));
            }
            let events = builder.subscribe();
            let server = builder.build().await?;
            tracing::info!("Lobby hosted on {}", server.local_addr()?);

            let handle = server.handle();
            let run = tokio::spawn(server.run());
            watch(&handle, events, &quit).await;
            handle.shutdown().await?;
            run.await??;
        }
        Command::Join { server, player } => {
            let mut builder = RosterClient::builder(player.record());
            if player.quit_on_leave {
                builder = builder.termination_policy(quit_policy(&quit));
            }
            let events = builder.subscribe();
            let client = builder.connect(&server).await?;
            tracing::info!("Joined {} as {}", server, client.connection_id());

            watch(&client.handle(), events, &quit).await;
            // The session may already be over if the host went away.
            if let Err(e) = client.disconnect("quit").await {
                tracing::debug!(error = %e, "disconnect failed");
            }
        }
    }

    Ok(())
}

fn quit_policy(quit: &Arc<Notify>) -> impl TerminationPolicy {
    let quit = Arc::clone(quit);
    move |id: ConnectionId| {
        tracing::warn!(%id, "player left, quitting");
        quit.notify_one();
    }
}

/// Prints membership changes until Ctrl-C, the quit policy fires, or the
/// session ends.
async fn watch(
    handle: &MembershipHandle,
    mut events: EventStream,
    quit: &Notify,
) {
    loop {
        tokio::select! {
            event = events.recv() => match event {
                Some(MembershipEvent::PlayerAdded(id)) => {
                    match handle.record_of(id).await {
                        Ok(record) => tracing::info!("+ {id}: {record}"),
                        Err(e) => tracing::warn!(%id, error = %e, "joined but unreadable"),
                    }
                    print_roster(handle).await;
                }
                Some(MembershipEvent::PlayerRemoved(id)) => {
                    tracing::info!("- {id}");
                    print_roster(handle).await;
                }
                None => break,
            },
            () = handle.stopped() => {
                tracing::info!("session ended");
                break;
            }
            () = quit.notified() => break,
            _ = tokio::signal::ctrl_c() => break,
        }
    }
}

async fn print_roster(handle: &MembershipHandle) {
    if let Ok(players) = handle.players().await {
        let names: Vec<String> = players
            .iter()
            .map(|(id, record)| format!("{id}={}", record.display_name))
            .collect();
        tracing::info!(players = players.len(), "roster: {}", names.join(", "));
    }
}
