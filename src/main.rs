use std::path::PathBuf;

use anyhow::{bail, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use duel_tracker::api::state::AppState;
use duel_tracker::calculate;
use duel_tracker::config::AppConfig;
use duel_tracker::ledger::{
    Anomaly, Ledger, MatchChange, MatchInput, MatchLocator, MatchUpdate, SessionInput,
};
use duel_tracker::models::{MatchId, Session, SessionId};
use duel_tracker::storage::{write_user_stats, SessionStore, StorageConfig};

#[derive(Parser)]
#[command(name = "duel-tracker")]
#[command(about = "Points ledger and match tracker for TCG ranked sessions")]
#[command(version)]
struct Cli {
    /// Path to configuration file
    #[arg(long, default_value = "./config.toml")]
    config: String,

    /// Data directory path (overrides config)
    #[arg(long)]
    data_dir: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long)]
    log_level: Option<String>,

    /// Output logs as JSON
    #[arg(long)]
    json_logs: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the API server
    Serve {
        /// Bind address
        #[arg(long)]
        host: Option<String>,

        /// Port number
        #[arg(long)]
        port: Option<u16>,
    },

    /// Manage sessions
    Session {
        #[command(subcommand)]
        action: SessionAction,
    },

    /// Manage the matches of a session
    Match {
        #[command(subcommand)]
        action: MatchAction,
    },

    /// Show statistics for one session
    Stats { session: String },

    /// Recompute and store the aggregate statistics of a user
    UserStats { user_id: String },
}

#[derive(Subcommand)]
enum SessionAction {
    /// Create a new session
    Create {
        user_id: String,
        name: String,

        /// "rated" or "dc" (default from config)
        #[arg(long)]
        formula: Option<String>,

        /// Starting points (default depends on formula)
        #[arg(long)]
        start: Option<f64>,
    },

    /// List sessions
    List {
        #[arg(long)]
        user: Option<String>,
    },

    /// Print a session with its full ledger
    Show { id: String },

    /// Delete a session and all its matches
    Delete { id: String },
}

#[derive(Subcommand)]
enum MatchAction {
    /// Append a match, or insert it with --position
    Add {
        session: String,

        #[arg(long)]
        deck: String,

        #[arg(long)]
        opponent: String,

        /// Win or Loss
        #[arg(long)]
        result: String,

        /// 1st or 2nd
        #[arg(long)]
        turn: String,

        /// Manual points after this match
        #[arg(long)]
        custom_points: Option<f64>,

        #[arg(long)]
        notes: Option<String>,

        /// Insert at this 0-based position instead of appending
        #[arg(long)]
        position: Option<usize>,
    },

    /// Edit a match
    Edit {
        session: String,

        /// Match id, or 0-based position with --index
        target: String,

        /// Treat TARGET as a position
        #[arg(long)]
        index: bool,

        #[arg(long)]
        deck: Option<String>,

        #[arg(long)]
        opponent: Option<String>,

        #[arg(long)]
        result: Option<String>,

        #[arg(long)]
        turn: Option<String>,

        #[arg(long, conflicts_with = "clear_custom")]
        custom_points: Option<f64>,

        /// Remove the manual points override
        #[arg(long)]
        clear_custom: bool,

        #[arg(long)]
        notes: Option<String>,
    },

    /// Delete a match
    Delete {
        session: String,

        /// Match id, or 0-based position with --index
        target: String,

        #[arg(long)]
        index: bool,
    },

    /// Delete every match of a session
    Clear { session: String },
}

fn locator(target: String, index: bool) -> Result<MatchLocator> {
    if index {
        match target.parse::<usize>() {
            Ok(i) => Ok(MatchLocator::Index(i)),
            Err(_) => bail!("Invalid match position: {}", target),
        }
    } else {
        Ok(MatchLocator::Id(MatchId::from(target)))
    }
}

fn print_ledger(session: &Session) {
    println!(
        "{} [{}] {} ({}, start {})",
        session.id, session.user_id, session.name, session.points_formula, session.points_start
    );
    for (i, m) in session.matches.iter().enumerate() {
        let marker = if m.custom_points_after.is_some() { "*" } else { "" };
        println!(
            "  {:>3}  {:<5} {:<4} {:<20} vs {:<20} {:>8} -> {}{}",
            i, m.result, m.turn, m.deck, m.opponent_deck, m.points_before, m.points_after, marker
        );
    }
}

fn print_change(verb: &str, change: &MatchChange, session: &Session) {
    println!(
        "{} match {} ({} recomputed, now {} points)",
        verb,
        change.entry.id,
        change.recomputed,
        session.current_points()
    );
    if change.stale {
        println!("  points not recomputed (recompute_on_result_change = false); later points are stale");
    }
    print_anomalies(&change.anomalies);
}

fn print_anomalies(anomalies: &[Anomaly]) {
    for a in anomalies {
        println!(
            "  anomaly: match #{} ({}) {:?} points_after={}",
            a.position, a.match_id, a.kind, a.points_after
        );
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = AppConfig::load_or_default(&PathBuf::from(&cli.config))?;
    if let Some(dir) = &cli.data_dir {
        config.data_dir = PathBuf::from(dir);
    }
    if let Some(level) = &cli.log_level {
        config.log_level = level.clone();
    }

    // Initialize tracing
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.log_level));

    if cli.json_logs {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }

    tracing::info!("Starting duel-tracker v{}", env!("CARGO_PKG_VERSION"));

    let store = SessionStore::new(StorageConfig::new(config.data_dir.clone()));
    let ledger = Ledger::new(config.ledger.options);

    match cli.command {
        Commands::Serve { host, port } => {
            let host = host.unwrap_or(config.server.host.clone());
            let port = port.unwrap_or(config.server.port);

            let state = AppState::new(store, ledger, config.ledger.default_formula)
                .with_cors_origin(config.server.cors_origin.clone());
            let app = duel_tracker::api::build_router(state);

            let addr = format!("{}:{}", host, port);
            let listener = tokio::net::TcpListener::bind(&addr).await?;
            tracing::info!("Listening on http://{}", addr);
            axum::serve(listener, app).await?;
        }
        Commands::Session { action } => match action {
            SessionAction::Create {
                user_id,
                name,
                formula,
                start,
            } => {
                let input = SessionInput {
                    user_id: Some(user_id),
                    name: Some(name),
                    points_formula: formula,
                    points_start: start,
                };
                let session = input.validate(config.ledger.default_formula)?;
                store.insert(&session)?;
                println!("Created session {}", session.id);
            }
            SessionAction::List { user } => {
                let sessions = match user.as_deref() {
                    Some(user_id) => store.list_for_user(user_id)?,
                    None => store.list()?,
                };
                for s in &sessions {
                    println!(
                        "{}  {:<10} {:<24} {:<5} {:>3} matches  {} points",
                        s.id,
                        s.user_id,
                        s.name,
                        s.points_formula,
                        s.len(),
                        s.current_points()
                    );
                }
                println!("{} session(s)", sessions.len());
            }
            SessionAction::Show { id } => {
                let session = store.get(&SessionId::from(id))?;
                print_ledger(&session);
            }
            SessionAction::Delete { id } => {
                let removed = store.delete(&SessionId::from(id))?;
                println!("Deleted session {} ({} matches)", removed.id, removed.len());
            }
        },
        Commands::Match { action } => match action {
            MatchAction::Add {
                session,
                deck,
                opponent,
                result,
                turn,
                custom_points,
                notes,
                position,
            } => {
                let mut session = store.get(&SessionId::from(session))?;
                let input = MatchInput {
                    deck: Some(deck),
                    opponent_deck: Some(opponent),
                    result: Some(result),
                    turn: Some(turn),
                    custom_points_after: custom_points,
                    notes,
                };
                let change = match position {
                    Some(p) => ledger.insert(&mut session, p, &input)?,
                    None => ledger.append(&mut session, &input)?,
                };
                store.save(&session)?;
                print_change("Added", &change, &session);
            }
            MatchAction::Edit {
                session,
                target,
                index,
                deck,
                opponent,
                result,
                turn,
                custom_points,
                clear_custom,
                notes,
            } => {
                let mut session = store.get(&SessionId::from(session))?;
                let update = MatchUpdate {
                    deck,
                    opponent_deck: opponent,
                    result,
                    turn,
                    custom_points_after: custom_points,
                    clear_custom_points: clear_custom,
                    notes,
                };
                let change = ledger.edit(&mut session, &locator(target, index)?, &update)?;
                store.save(&session)?;
                print_change("Edited", &change, &session);
            }
            MatchAction::Delete {
                session,
                target,
                index,
            } => {
                let mut session = store.get(&SessionId::from(session))?;
                let change = ledger.delete(&mut session, &locator(target, index)?)?;
                store.save(&session)?;
                print_change("Deleted", &change, &session);
            }
            MatchAction::Clear { session } => {
                let mut session = store.get(&SessionId::from(session))?;
                let removed = ledger.clear(&mut session);
                store.save(&session)?;
                println!("Cleared {} match(es) from {}", removed, session.id);
            }
        },
        Commands::Stats { session } => {
            let session = store.get(&SessionId::from(session))?;
            let stats = calculate::session_stats(&session);
            println!("{}", serde_json::to_string_pretty(&stats)?);
        }
        Commands::UserStats { user_id } => {
            let sessions = store.list_for_user(&user_id)?;
            let stats = calculate::recompute_user_stats(&user_id, &sessions);
            write_user_stats(store.config(), &stats)?;
            println!("{}", serde_json::to_string_pretty(&stats)?);
        }
    }

    Ok(())
}
