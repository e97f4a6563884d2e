//! Versus - command-line client
//!
//! Every command except `demo` works on the SQLite database named by the
//! config, so two shells pointed at the same file are two remote players.

#![warn(missing_docs)]

mod cli;

use std::sync::Arc;

use anyhow::{Context, Result, bail};
use clap::Parser;
use cli::{Cli, Command};
use tracing::{info, instrument, warn};
use tracing_subscriber::EnvFilter;
use versus_sync::{
    LocalHub, MemoryStore, SqliteStore, SyncContext, SyncEngine, SyncErrorKind, VersusConfig,
};
use versus_tictactoe::{GameState, Mark, MatchId};

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let mut config = VersusConfig::load_or_default(&cli.config)?;
    if let Some(db_path) = cli.db_path {
        config = config.with_database_path(db_path);
    }

    match cli.command {
        Command::Create { name } => create(&config, name).await,
        Command::Join { match_id, name } => join(&config, MatchId::new(match_id), name).await,
        Command::Show { match_id } => show(&config, MatchId::new(match_id)).await,
        Command::Move {
            match_id,
            index,
            mark,
        } => play(&config, MatchId::new(match_id), index, mark).await,
        Command::ResetBoard { match_id } => reset(&config, MatchId::new(match_id), false).await,
        Command::ResetScores { match_id } => reset(&config, MatchId::new(match_id), true).await,
        Command::Demo => demo(&config).await,
    }
}

/// Builds an engine over the configured database.
#[instrument(skip(config), fields(db = %config.database_path()))]
fn open_engine(config: &VersusConfig) -> Result<SyncEngine> {
    let store = SqliteStore::open(config.database_path().clone())
        .with_context(|| format!("opening {}", config.database_path()))?;
    let hub = Arc::new(LocalHub::new(store));
    Ok(SyncEngine::new(SyncContext::from_hub(
        hub,
        config.sync_options(),
    )))
}

fn display_name(config: &VersusConfig, name: Option<String>) -> Result<String> {
    match name.or_else(|| config.player_name().clone()) {
        Some(name) if !name.trim().is_empty() => Ok(name),
        _ => bail!("no display name given; pass --name or set player_name in the config"),
    }
}

fn print_state(state: &GameState) {
    println!("match   {}", state.id);
    println!(
        "players X: {}  O: {}",
        state.player(Mark::X).unwrap_or("-"),
        state.player(Mark::O).unwrap_or("-")
    );
    println!(
        "status  {}  turn {}  score {}-{}  version {}",
        state.status, state.turn, state.score_x, state.score_o, state.version
    );
    println!("{}", state.board.render());
}

async fn create(config: &VersusConfig, name: Option<String>) -> Result<()> {
    let name = display_name(config, name)?;
    let engine = open_engine(config)?;
    let created = engine.create_match(&name).await?;
    info!(match_id = %created.id, "Created");
    print_state(&created);
    Ok(())
}

async fn join(config: &VersusConfig, match_id: MatchId, name: Option<String>) -> Result<()> {
    let name = display_name(config, name)?;
    let engine = open_engine(config)?;
    let joined = engine.join_match(match_id, &name).await?;
    print_state(&joined);
    Ok(())
}

async fn show(config: &VersusConfig, match_id: MatchId) -> Result<()> {
    let engine = open_engine(config)?;
    let state = engine.bind(match_id).await?;
    print_state(&state);
    Ok(())
}

async fn play(config: &VersusConfig, match_id: MatchId, index: usize, mark: Mark) -> Result<()> {
    let engine = open_engine(config)?;
    engine.bind(match_id).await?;
    match engine.submit_move(index, mark).await {
        Ok(state) => {
            print_state(&state);
            Ok(())
        }
        Err(err) if err.kind() == SyncErrorKind::Conflict => {
            warn!(error = %err, "Move lost a race");
            if let Some(current) = engine.authoritative() {
                print_state(&current);
            }
            bail!("{}: the match changed before your move landed; try again", err.kind())
        }
        Err(err) => Err(err.into()),
    }
}

async fn reset(config: &VersusConfig, match_id: MatchId, scores: bool) -> Result<()> {
    let engine = open_engine(config)?;
    engine.bind(match_id).await?;
    let state = if scores {
        engine.reset_scores().await?
    } else {
        engine.reset_board().await?
    };
    print_state(&state);
    Ok(())
}

/// Two clients share one in-memory hub: a full game, then a lost race.
#[instrument(skip(config))]
async fn demo(config: &VersusConfig) -> Result<()> {
    let hub = Arc::new(LocalHub::new(MemoryStore::new()));
    let alice = SyncEngine::new(SyncContext::from_hub(hub.clone(), config.sync_options()));
    let bob = SyncEngine::new(SyncContext::from_hub(hub, config.sync_options()));

    let created = alice.create_match("Alice").await?;
    let joined = bob.join_match(created.id.clone(), "Bob").await?;
    alice.resync().await?;
    print_state(&joined);

    for (index, mark) in [(0, Mark::X), (3, Mark::O), (1, Mark::X), (4, Mark::O), (2, Mark::X)] {
        let (mover, watcher) = match mark {
            Mark::X => (&alice, &bob),
            Mark::O => (&bob, &alice),
        };
        let state = mover.submit_move(index, mark).await?;
        watcher.resync().await?;
        println!("{} plays {}", mark, index);
        print_state(&state);
    }

    let reset = bob.reset_board().await?;
    alice.resync().await?;
    println!("board reset, {} starts", reset.turn);

    let (first, second) = tokio::join!(
        alice.submit_move(4, reset.turn),
        bob.submit_move(4, reset.turn)
    );
    for (who, outcome) in [("Alice", first), ("Bob", second)] {
        match outcome {
            Ok(state) => println!("{} won the race at version {}", who, state.version),
            Err(err) => println!("{} lost the race: {}", who, err.kind()),
        }
    }
    if let Some(state) = alice.authoritative() {
        print_state(&state);
    }
    Ok(())
}
