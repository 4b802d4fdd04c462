use std::path::PathBuf;

use anyhow::{Context, Result};

pub fn database_file_path() -> Result<PathBuf> {
    let base = dirs::data_dir().context("unable to resolve data directory")?;
    Ok(base.join("aniplay").join("aniplay.db"))
}

pub fn player_socket_path() -> PathBuf {
    std::env::temp_dir().join(format!("aniplay-mpv-{}.sock", std::process::id()))
}
