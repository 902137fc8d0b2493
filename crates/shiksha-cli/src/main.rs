//! Shiksha Leap - an offline-first command line client for learning games.
//!
//! Records game results and achievements locally and pushes them to the
//! server whenever it is reachable.

mod app;

use std::io;
use std::path::Path;

use anyhow::{bail, Context, Result};
use serde_json::Value;
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use app::{App, GameFilter};
use shiksha_core::models::GameLog;
use shiksha_core::Config;

const USAGE: &str = "\
Usage: shiksha <command> [args]

Commands:
  login [contact]                          Log in with a one-time code
  logout                                   Clear the session and all local data
  status                                   Session, pending records and cache state
  sync                                     Push pending records now
  watch                                    Sync in the background, driven by stdin events
  log-game <subject> <grade> <game> <score> <max>
                                           Record a finished game
  achievement <badge> [description]        Record an achievement
  progress [subject]                       Show saved progress
  save-progress <subject> <json>           Save progress for a subject
  games <grade> [subject | --search <kw> | --recommend [seed]]
                                           Browse the game catalog
  fetch <grade> <file>                     Load a game file (offline if cached)
  language [code]                          Show or set the interface language
  export                                   Dump every local record as JSON";

/// Log file prefix inside the data directory
const LOG_FILE: &str = "shiksha.log";

/// Initialize the tracing subscriber: stderr plus a daily log file.
fn init_tracing(log_dir: Option<&Path>) -> Option<WorkerGuard> {
    // Use RUST_LOG env var to control log level (e.g., RUST_LOG=debug)
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    let (file_layer, guard) = match log_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, LOG_FILE);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            (Some(fmt::layer().with_ansi(false).with_writer(writer)), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(io::stderr))
        .with(file_layer)
        .with(filter)
        .init();
    guard
}

fn arg<'a>(args: &'a [String], index: usize, name: &str) -> Result<&'a str> {
    args.get(index)
        .map(String::as_str)
        .with_context(|| format!("Missing <{}>\n\n{}", name, USAGE))
}

fn parse<T: std::str::FromStr>(args: &[String], index: usize, name: &str) -> Result<T> {
    let raw = arg(args, index, name)?;
    raw.parse()
        .map_err(|_| anyhow::anyhow!("Invalid <{}>: {}", name, raw))
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (silently ignore if not found)
    let _ = dotenvy::dotenv();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let Some(command) = args.first().map(String::as_str) else {
        println!("{}", USAGE);
        return Ok(());
    };
    if matches!(command, "-h" | "--help" | "help") {
        println!("{}", USAGE);
        return Ok(());
    }

    let config = Config::load().unwrap_or_else(|e| {
        eprintln!("Warning: failed to load config ({}), using defaults", e);
        Config::default()
    });
    let log_dir = config.data_dir().ok();
    if let Some(dir) = &log_dir {
        let _ = std::fs::create_dir_all(dir);
    }
    let _guard = init_tracing(log_dir.as_deref());
    info!(command, "Shiksha Leap starting");

    let mut app = App::bootstrap(config).await?;

    match command {
        "login" => app.login(args.get(1).cloned()).await?,
        "logout" => app.logout().await?,
        "status" => app.status().await?,
        "sync" => app.sync().await?,
        "watch" => app.watch().await?,
        "log-game" => {
            let log = GameLog::new(
                arg(&args, 1, "subject")?,
                parse(&args, 2, "grade")?,
                arg(&args, 3, "game")?,
                parse(&args, 4, "score")?,
                parse(&args, 5, "max")?,
            );
            if log.score > log.max_score {
                bail!("Score {} exceeds maximum {}", log.score, log.max_score);
            }
            app.log_game(log).await?;
        }
        "achievement" => {
            let description = args.get(2).map(String::as_str);
            app.add_achievement(arg(&args, 1, "badge")?, description).await?;
        }
        "progress" => app.show_progress(args.get(1).map(String::as_str)).await?,
        "save-progress" => {
            let payload: Value =
                serde_json::from_str(arg(&args, 2, "json")?).context("Progress must be JSON")?;
            app.save_progress(arg(&args, 1, "subject")?, payload).await?;
        }
        "games" => {
            let grade: u8 = parse(&args, 1, "grade")?;
            let filter = match args.get(2).map(String::as_str) {
                None => GameFilter::All,
                Some("--search") => GameFilter::Search(arg(&args, 3, "kw")?),
                Some("--recommend") => GameFilter::Recommended(match args.get(3) {
                    Some(_) => Some(parse(&args, 3, "seed")?),
                    None => None,
                }),
                Some(subject) => GameFilter::Subject(subject),
            };
            app.games(grade, filter);
        }
        "fetch" => app.fetch_game(parse(&args, 1, "grade")?, arg(&args, 2, "file")?).await?,
        "language" => app.language(args.get(1).map(String::as_str)).await?,
        "export" => app.export().await?,
        other => bail!("Unknown command: {}\n\n{}", other, USAGE),
    }

    info!("Shiksha Leap finished");
    Ok(())
}
