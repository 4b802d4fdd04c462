use clap::{Args, Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(
    name = "aniplay",
    version,
    about = "Watch anime episodes in mpv with saved preferences and resume points"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Open the player page (default).
    Watch(WatchArgs),
    /// Print persisted player preferences.
    Prefs,
    /// Print the persisted watch progress record.
    Progress,
}

#[derive(Debug, Clone, Args)]
pub struct WatchArgs {
    /// Anime id, used as the page `id` query parameter.
    #[arg(long, conflicts_with = "query")]
    pub id: Option<String>,
    /// Raw page query string such as `id=frieren`; only `id` is read.
    #[arg(long)]
    pub query: Option<String>,
    /// Episode to open instead of resuming saved progress.
    #[arg(long, short)]
    pub episode: Option<u32>,
    /// Number of entries shown in the episode list.
    #[arg(long, default_value_t = 12)]
    pub episodes: u32,
    /// Episode API base URL; overrides ANIPLAY_EPISODE_API.
    #[arg(long)]
    pub api: Option<String>,
}

impl Default for WatchArgs {
    fn default() -> Self {
        Self {
            id: None,
            query: None,
            episode: None,
            episodes: 12,
            api: None,
        }
    }
}
