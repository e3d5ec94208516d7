//! hacksim terminal entry point.
//!
//! Runs an interactive hacking-themed shell over the mission engine. Lines
//! starting with `:` are meta commands (`:help` lists them); everything else
//! goes to the simulated terminal and is graded against the active mission.

mod repl;

use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;

use hacksim_core::{
    JsonUserStore, MemoryAttemptStore, MemoryCatalog, MemoryUserStore, SessionManager, UserStore,
};
use hacksim_types::config::EngineConfig;
use repl::{Flow, Repl};

/// Missions compiled into the binary, used when no `--catalog` is given.
pub(crate) const DEFAULT_CATALOG: &str = include_str!("../missions.toml");

#[derive(Debug, Parser)]
#[command(name = "hacksim", about = "Educational hacking terminal simulator")]
struct Args {
    /// Mission catalog (TOML). Defaults to the bundled missions.
    #[arg(long)]
    catalog: Option<PathBuf>,

    /// Engine configuration (TOML).
    #[arg(long)]
    config: Option<PathBuf>,

    /// Player name used to key sessions and scores.
    #[arg(long, default_value = "hacker")]
    user: String,

    /// Start inside this mission instead of the free-play file system.
    #[arg(long)]
    challenge: Option<String>,

    /// Persist file systems and scores as JSON under this directory.
    #[arg(long)]
    data_dir: Option<PathBuf>,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => EngineConfig::load(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => EngineConfig::default(),
    };
    let catalog = match &args.catalog {
        Some(path) => MemoryCatalog::load(path)
            .with_context(|| format!("loading catalog {}", path.display()))?,
        None => MemoryCatalog::from_toml_str(DEFAULT_CATALOG).context("bundled catalog")?,
    };
    log::info!(
        "Starting hacksim for {} ({} missions: {})",
        args.user,
        catalog.len(),
        catalog.ids().collect::<Vec<_>>().join(", "),
    );

    let users: Arc<dyn UserStore> = match &args.data_dir {
        Some(dir) => {
            let store = JsonUserStore::open(dir)
                .with_context(|| format!("opening data dir {}", dir.display()))?;
            log::info!("Persisting player state under {}", dir.display());
            Arc::new(store)
        },
        None => Arc::new(MemoryUserStore::new()),
    };
    let manager = Arc::new(SessionManager::new(
        config,
        Arc::new(catalog),
        users,
        Arc::new(MemoryAttemptStore::new()),
    ));
    let _sweeper = manager.spawn_sweeper()?;

    if let Some(id) = &args.challenge {
        manager
            .get_or_create(&args.user, Some(id))
            .with_context(|| format!("starting mission {id}"))?;
    }

    let mut repl = Repl::new(Arc::clone(&manager), args.user, args.challenge);
    let stdin = io::stdin();
    let mut stdout = io::stdout().lock();
    let mut lines = stdin.lock().lines();
    loop {
        write!(stdout, "{}", repl.prompt())?;
        stdout.flush()?;
        let Some(line) = lines.next() else {
            writeln!(stdout)?;
            break;
        };
        if repl.handle(&line?, &mut stdout)? == Flow::Quit {
            break;
        }
    }

    log::info!("Session closed");
    Ok(())
}
