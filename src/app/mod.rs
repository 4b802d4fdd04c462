mod episode;
mod player;
mod session;
mod tui;


use std::env;
use std::sync::Arc;

use anyhow::Result;

use crate::cli::{Cli, Command, WatchArgs};
use crate::db::{Database, PreferenceStore};
use crate::paths::database_file_path;

use self::episode::{
    DemoEpisodeProvider, EpisodeProvider, HttpEpisodeProvider, format_clock, format_saved_at,
    truncate,
};
use self::session::{KEY_WATCHING_PROGRESS, WatchProgress};

pub fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Some(Command::Watch(args)) => run_watch(&args),
        Some(Command::Prefs) => run_prefs(&open_db()?),
        Some(Command::Progress) => run_progress(&open_db()?),
        None => run_watch(&WatchArgs::default()),
    }
}

#[cfg(unix)]
fn run_watch(args: &WatchArgs) -> Result<()> {
    use self::player::{MpvPlayer, PlayerConfig, resolve_player_bin};
    use self::session::{PageLocation, PlaybackSessionController, SystemClock};
    use crate::paths::player_socket_path;

    let db = open_db()?;
    let provider = episode_provider(args.api.as_deref());
    let config = PlayerConfig::default();
    let player = MpvPlayer::spawn(&config, &resolve_player_bin(), &player_socket_path())?;
    let location = match args.query.as_deref() {
        Some(query) => PageLocation::parse(query),
        None => PageLocation::with_anime_id(args.id.as_deref()),
    };

    let mut controller = PlaybackSessionController::new(
        player,
        db,
        provider,
        Box::new(location),
        Box::new(SystemClock),
        config,
    );
    controller.initialize()?;
    match args.episode {
        Some(episode) => controller.load_episode(episode),
        None => controller.resume()?,
    }

    tui::run_tui(&mut controller, args.episodes)
}

#[cfg(not(unix))]
fn run_watch(_args: &WatchArgs) -> Result<()> {
    anyhow::bail!("the mpv player backend needs Unix domain sockets")
}

fn episode_provider(api_override: Option<&str>) -> Arc<dyn EpisodeProvider> {
    let base_url = api_override
        .map(str::to_string)
        .or_else(|| env::var("ANIPLAY_EPISODE_API").ok())
        .filter(|url| !url.trim().is_empty());
    match base_url {
        Some(url) => {
            log::info!("using episode API at {url}");
            Arc::new(HttpEpisodeProvider::new(&url))
        }
        None => Arc::new(DemoEpisodeProvider),
    }
}

fn run_prefs(db: &Database) -> Result<()> {
    let items = db.list_items()?;
    if items.is_empty() {
        println!("No stored preferences yet. Run `aniplay watch` first.");
        return Ok(());
    }

    println!("{:<20} {:<40} {:<28}", "KEY", "VALUE", "UPDATED");
    for item in items.iter().filter(|item| item.key != KEY_WATCHING_PROGRESS) {
        println!(
            "{:<20} {:<40} {:<28}",
            item.key,
            truncate(&item.value, 40),
            item.updated_at
        );
    }
    Ok(())
}

fn run_progress(db: &Database) -> Result<()> {
    let Some(raw) = db.get_item(KEY_WATCHING_PROGRESS)? else {
        println!("No watch progress saved yet.");
        return Ok(());
    };
    match serde_json::from_str::<WatchProgress>(&raw) {
        Ok(progress) => {
            println!("Anime:    {}", progress.anime_id);
            println!("Episode:  {}", progress.episode);
            println!(
                "Position: {} / {}",
                format_clock(progress.position_seconds),
                progress
                    .duration_seconds
                    .map(format_clock)
                    .unwrap_or_else(|| "--:--".to_string())
            );
            println!("Saved:    {}", format_saved_at(progress.saved_at_ms));
        }
        Err(err) => println!("Stored watch progress is unreadable ({err})."),
    }
    Ok(())
}

fn open_db() -> Result<Database> {
    let db_path = database_file_path()?;
    let db = Database::open(&db_path)?;
    db.migrate()?;
    Ok(db)
}
