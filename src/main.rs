use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, bail};
use broadside::{
    choose_target, init_logging, ConnectionId, EventBus, GameServer, Gateway, InMemoryTransport,
    Message, ServerConfig, SessionState, SessionView, TcpTransport, Transport, PROTOCOL_VERSION,
};
use clap::{Parser, Subcommand};
use log::{error, info, warn};
use rand::rngs::SmallRng;
use rand::SeedableRng;
use serde::Serialize;
use tokio::net::TcpListener;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Accept TCP clients and host their games.
    Serve {
        #[arg(long, default_value = "0.0.0.0:8080")]
        bind: String,
        /// Background worker count (defaults to the number of CPUs).
        #[arg(long)]
        workers: Option<usize>,
        /// Cap on background jobs running at once (defaults to the worker count).
        #[arg(long)]
        max_in_flight: Option<usize>,
        /// Seconds a player waits for the opponent to place ships.
        #[arg(long, default_value_t = 120)]
        readiness_timeout: u64,
    },
    /// Play bot clients against the server AI in-process and print a JSON summary.
    Simulate {
        #[arg(long, default_value_t = 4)]
        games: usize,
        #[arg(long, help = "Fix RNG seed for reproducible bot play (e.g., --seed 12345)")]
        seed: Option<u64>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_logging();
    let cli = Cli::parse();

    match cli.command {
        Commands::Serve {
            bind,
            workers,
            max_in_flight,
            readiness_timeout,
        } => {
            let mut config =
                ServerConfig::default().with_readiness_timeout(Duration::from_secs(readiness_timeout));
            if let Some(workers) = workers {
                config = config.with_workers(workers);
            }
            if let Some(cap) = max_in_flight {
                config = config.with_max_in_flight(cap);
            }
            serve(&bind, config).await
        }
        Commands::Simulate { games, seed } => simulate(games, seed).await,
    }
}

async fn serve(bind: &str, config: ServerConfig) -> anyhow::Result<()> {
    let bus = Arc::new(EventBus::new(config.event_capacity));
    let server = GameServer::start(config, bus.clone());
    let listener = TcpListener::bind(bind).await?;
    info!("listening on {}", bind);

    loop {
        tokio::select! {
            accepted = listener.accept() => {
                let (stream, addr) = match accepted {
                    Ok(accepted) => accepted,
                    Err(e) => {
                        warn!("accept failed: {}", e);
                        continue;
                    }
                };
                if let Err(e) = stream.set_nodelay(true) {
                    warn!("{}: cannot disable nagle: {}", addr, e);
                }
                let gateway = Gateway::new(
                    Arc::clone(&server),
                    Box::new(TcpTransport::new(stream)),
                    bus.subscribe(),
                );
                tokio::spawn(async move {
                    if let Err(e) = gateway.run().await {
                        warn!("{}: connection ended with an error: {:#}", addr, e);
                    }
                });
            }
            _ = tokio::signal::ctrl_c() => {
                info!("interrupt received");
                break;
            }
        }
    }
    server.shutdown().await;
    Ok(())
}

#[derive(Serialize)]
struct GameSummary {
    bot: String,
    won: bool,
    shots_fired: u32,
    shots_hit: u32,
}

async fn simulate(games: usize, seed: Option<u64>) -> anyhow::Result<()> {
    let config = ServerConfig::default();
    let bus = Arc::new(EventBus::new(config.event_capacity));
    let server = GameServer::start(config, bus.clone());

    let mut bots = Vec::with_capacity(games);
    for game in 0..games {
        let (client, server_side) = InMemoryTransport::pair();
        let gateway = Gateway::new(Arc::clone(&server), Box::new(server_side), bus.subscribe());
        tokio::spawn(async move {
            if let Err(e) = gateway.run().await {
                error!("gateway for bot {} failed: {:#}", game, e);
            }
        });
        let rng = match seed {
            Some(s) => SmallRng::seed_from_u64(s.wrapping_add(game as u64)),
            None => SmallRng::from_rng(&mut rand::rng()),
        };
        let name = format!("bot-{}", game);
        bots.push(tokio::spawn(async move {
            tokio::time::timeout(Duration::from_secs(60), play_bot(client, name, rng))
                .await
                .map_err(|_| anyhow!("bot timed out"))?
        }));
    }

    let mut results = Vec::with_capacity(games);
    for bot in bots {
        results.push(bot.await??);
    }
    server.shutdown().await;

    let summary = serde_json::json!({
        "games": results,
        "analytics": server.analytics().snapshot(),
        "leaderboard": server.leaderboard().top(10),
        "dispatch": server.dispatch_stats(),
    });
    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}

/// Wait for the reply to the last request, skipping broadcast events.
async fn reply(transport: &mut InMemoryTransport) -> anyhow::Result<Message> {
    loop {
        match transport.recv().await? {
            Message::Event(_) => continue,
            Message::Error { kind, message } => bail!("{:?}: {}", kind, message),
            other => return Ok(other),
        }
    }
}

async fn status(transport: &mut InMemoryTransport) -> anyhow::Result<SessionView> {
    transport.send(Message::Status).await?;
    match reply(transport).await? {
        Message::StatusReport(view) => Ok(*view),
        other => bail!("expected a status report, got {:?}", other),
    }
}

async fn play_bot(
    mut transport: InMemoryTransport,
    name: String,
    mut rng: SmallRng,
) -> anyhow::Result<GameSummary> {
    transport
        .send(Message::Hello {
            version: PROTOCOL_VERSION,
            name: name.clone(),
        })
        .await?;
    let me: ConnectionId = match reply(&mut transport).await? {
        Message::Welcome { connection, .. } => connection,
        other => bail!("expected Welcome, got {:?}", other),
    };

    transport.send(Message::PlayAi).await?;
    reply(&mut transport).await?;
    transport.send(Message::PlaceShips { placements: None }).await?;
    match reply(&mut transport).await? {
        Message::Ready => {}
        other => bail!("expected Ready, got {:?}", other),
    }

    let view = loop {
        let view = status(&mut transport).await?;
        if view.state == SessionState::GameOver {
            break view;
        }
        if view.current_turn != Some(me) {
            // Any event means the board moved on.
            transport.recv().await?;
            continue;
        }
        let target = view
            .target
            .as_ref()
            .ok_or_else(|| anyhow!("no opponent board"))?;
        let coord = choose_target(target, &mut rng);
        transport
            .send(Message::FireShot {
                x: coord.x,
                y: coord.y,
            })
            .await?;
        reply(&mut transport).await?;
    };

    Ok(GameSummary {
        bot: name,
        won: view.winner == Some(me),
        shots_fired: view.stats.shots_fired,
        shots_hit: view.stats.shots_hit,
    })
}
