use std::sync::Arc;
use std::time::Duration;

use huddle::prelude::*;
use rand::seq::SliceRandom;
use tokio::task::JoinSet;

const PLAYERS: [&str; 4] = ["ana", "ben", "cy", "dee"];

type SimEngine = Engine<MemoryStore, MemoryBroadcast, MemoryPresence, DevAuth>;

// ---------------------------------------------------------------------------
// Auth
// ---------------------------------------------------------------------------

/// Trusts tokens of the form `dev:<id>`.
struct DevAuth;

impl Authenticator for DevAuth {
    async fn authenticate(&self, token: &str) -> Result<PlayerId, SessionError> {
        token
            .strip_prefix("dev:")
            .filter(|id| !id.is_empty())
            .map(PlayerId::new)
            .ok_or_else(|| SessionError::AuthFailed("expected dev:<id>".into()))
    }
}

fn request(who: &str, request_id: String, command: Command) -> CommandRequest {
    CommandRequest {
        room_id: RoomId::new("sim"),
        token: format!("dev:{who}"),
        request_id: RequestId::new(request_id),
        command,
    }
}

// ---------------------------------------------------------------------------
// Simulation
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
struct Tally {
    applied: usize,
    replayed: usize,
    rejected: usize,
}

impl Tally {
    fn count(&mut self, response: &CommandResponse) {
        match response {
            CommandResponse::Ok(ack) if ack.replayed => self.replayed += 1,
            CommandResponse::Ok(_) => self.applied += 1,
            CommandResponse::Err(_) => self.rejected += 1,
        }
    }
}

#[derive(Debug)]
struct Summary {
    status_version: u64,
    cache_versions: Vec<u64>,
    online: Vec<PlayerId>,
    stats: RoundStats,
    tally: Tally,
}

/// Sends every request at once and tallies the responses.
async fn race(engine: &Arc<SimEngine>, requests: Vec<CommandRequest>, tally: &mut Tally) {
    let mut set = JoinSet::new();
    for req in requests {
        let engine = Arc::clone(engine);
        set.spawn(async move { engine.handle(req).await });
    }
    while let Some(joined) = set.join_next().await {
        match joined {
            Ok(response) => tally.count(&response),
            Err(e) => tracing::error!(error = %e, "client task failed"),
        }
    }
}

async fn simulate(rounds: u32) -> Result<Summary, HuddleError> {
    let broadcast = Arc::new(MemoryBroadcast::new());
    let presence = Arc::new(MemoryPresence::new());
    let engine = Arc::new(
        Engine::builder()
            .command_config(CommandConfig {
                rate_limit_ms: 0,
                ..CommandConfig::default()
            })
            .build(
                Arc::new(MemoryStore::new()),
                Arc::clone(&broadcast),
                Arc::clone(&presence),
                DevAuth,
            )?,
    );
    let room_id = RoomId::new("sim");
    let host = PLAYERS[0];
    let mut tally = Tally::default();

    engine
        .create_room(CreateRoomRequest {
            room_id: room_id.clone(),
            token: format!("dev:{host}"),
            name: host.to_uppercase(),
            options: RoomOptions::default(),
        })
        .await?;

    // Everyone else joins at once, and each join is retried once.
    let joins = PLAYERS[1..]
        .iter()
        .flat_map(|who| {
            let join = Command::Join {
                name: who.to_uppercase(),
                avatar: None,
            };
            [
                request(who, format!("join-{who}"), join.clone()),
                request(who, format!("join-{who}"), join),
            ]
        })
        .collect();
    race(&engine, joins, &mut tally).await;

    let snapshot = engine.room(&room_id).await?;
    let mut sessions = Vec::new();
    for who in PLAYERS {
        sessions.push(
            ClientSession::start(
                PlayerId::new(who),
                snapshot.clone(),
                Arc::clone(&presence),
                broadcast.as_ref(),
                Arc::new(SystemClock),
                SessionConfig::default(),
            )
            .await,
        );
    }

    for round in 1..=rounds {
        let open = if round == 1 { Command::Start } else { Command::NextRound };
        // The host's client retries the open before the first reply lands.
        race(
            &engine,
            vec![
                request(host, format!("open-{round}"), open.clone()),
                request(host, format!("open-{round}"), open),
            ],
            &mut tally,
        )
        .await;
        race(
            &engine,
            vec![request(host, format!("deal-{round}"), Command::Deal)],
            &mut tally,
        )
        .await;

        // Each player proposes an ordering; the first one in decides the round.
        let seated: Vec<PlayerId> = engine
            .room(&room_id)
            .await?
            .seats
            .into_iter()
            .map(|seat| seat.id)
            .collect();
        let proposals = PLAYERS
            .iter()
            .map(|who| {
                let mut list = seated.clone();
                list.shuffle(&mut rand::rng());
                request(who, format!("order-{round}-{who}"), Command::SubmitOrder { list })
            })
            .collect();
        race(&engine, proposals, &mut tally).await;

        let finals = PLAYERS
            .iter()
            .map(|who| request(who, format!("finalize-{round}-{who}"), Command::Finalize))
            .collect();
        race(&engine, finals, &mut tally).await;

        let room = engine.room(&room_id).await?;
        tracing::info!(
            round,
            status = %room.status,
            status_version = room.status_version,
            successes = room.stats.success_count,
            "round finished"
        );
    }

    let online = engine.stable_online(&room_id).await?;
    tracing::info!(online = ?online.stable, "stable online set");

    let room = engine.room(&room_id).await?;
    let converged = tokio::time::timeout(Duration::from_secs(2), async {
        while sessions
            .iter()
            .any(|s| s.cache().status_version() < room.status_version)
        {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await;
    if converged.is_err() {
        tracing::warn!("client caches did not converge in time");
    }

    let cache_versions = sessions.iter().map(|s| s.cache().status_version()).collect();
    for session in sessions {
        session.close().await?;
    }

    Ok(Summary {
        status_version: room.status_version,
        cache_versions,
        online: online.stable,
        stats: room.stats,
        tally,
    })
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let rounds = std::env::args()
        .nth(1)
        .and_then(|arg| arg.parse().ok())
        .unwrap_or(3);
    let summary = simulate(rounds).await?;

    tracing::info!(
        status_version = summary.status_version,
        caches = ?summary.cache_versions,
        online = summary.online.len(),
        successes = summary.stats.success_count,
        games = summary.stats.game_count,
        applied = summary.tally.applied,
        replayed = summary.tally.replayed,
        rejected = summary.tally.rejected,
        "simulation complete"
    );
    Ok(())
}
