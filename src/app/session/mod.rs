mod controller;

pub(crate) use controller::*;

use std::fmt;

use chrono::Utc;
use serde::{Deserialize, Serialize};

pub(crate) const KEY_SUBTITLE_ENABLED: &str = "subtitleEnabled";
pub(crate) const KEY_VIDEO_QUALITY: &str = "videoQuality";
pub(crate) const KEY_PLAYBACK_RATE: &str = "playbackRate";
pub(crate) const KEY_PLAYER_VOLUME: &str = "playerVolume";
pub(crate) const KEY_WATCHING_PROGRESS: &str = "watchingProgress";

pub(crate) const DEFAULT_ANIME_ID: &str = "default";
pub(crate) const NOTICE_TTL_MS: i64 = 5_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub(crate) enum Quality {
    #[default]
    Auto,
    P720,
    P1080,
}

impl Quality {
    pub(crate) const ALL: [Quality; 3] = [Quality::Auto, Quality::P720, Quality::P1080];

    /// Unrecognized values select the auto tier.
    pub(crate) fn parse(raw: &str) -> Self {
        match raw.trim() {
            "1080p" => Self::P1080,
            "720p" => Self::P720,
            _ => Self::Auto,
        }
    }

    pub(crate) fn as_str(self) -> &'static str {
        match self {
            Self::Auto => "auto",
            Self::P720 => "720p",
            Self::P1080 => "1080p",
        }
    }

    /// Index into an episode's tiered source list.
    pub(crate) fn source_index(self) -> usize {
        match self {
            Self::P1080 => 0,
            Self::P720 => 1,
            Self::Auto => 2,
        }
    }
}

impl fmt::Display for Quality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Session {
    pub(crate) current_episode: u32,
    pub(crate) quality: Quality,
    pub(crate) subtitle_enabled: bool,
    pub(crate) playback_rate: f64,
    pub(crate) volume: u8,
    pub(crate) is_fullscreen: bool,
}

impl Default for Session {
    fn default() -> Self {
        Self {
            current_episode: 1,
            quality: Quality::Auto,
            subtitle_enabled: true,
            playback_rate: 1.0,
            volume: 100,
            is_fullscreen: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum PlaybackState {
    Uninitialized,
    Initializing,
    Ready,
    Playing,
    Paused,
    Error,
}

impl PlaybackState {
    pub(crate) fn label(self) -> &'static str {
        match self {
            Self::Uninitialized => "uninitialized",
            Self::Initializing => "initializing",
            Self::Ready => "ready",
            Self::Playing => "playing",
            Self::Paused => "paused",
            Self::Error => "error",
        }
    }
}

/// The single persisted resume point. Field names match the stored JSON.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct WatchProgress {
    pub(crate) anime_id: String,
    pub(crate) episode: u32,
    #[serde(rename = "time")]
    pub(crate) position_seconds: f64,
    #[serde(rename = "duration")]
    pub(crate) duration_seconds: Option<f64>,
    #[serde(rename = "timestamp")]
    pub(crate) saved_at_ms: i64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Notice {
    pub(crate) message: String,
    pub(crate) shown_at_ms: i64,
}

impl Notice {
    pub(crate) fn is_expired(&self, now_ms: i64) -> bool {
        now_ms.saturating_sub(self.shown_at_ms) >= NOTICE_TTL_MS
    }
}

#[derive(Debug, thiserror::Error)]
pub(crate) enum SessionError {
    #[error("quality {quality} needs source #{index} but the episode lists {available}")]
    MissingSource {
        quality: Quality,
        index: usize,
        available: usize,
    },
    #[error("failed to load episode {episode}: {reason}")]
    Fetch { episode: u32, reason: String },
}

/// Page address the player is embedded in.
pub(crate) trait Location {
    fn query_param(&self, name: &str) -> Option<String>;
}

#[derive(Debug, Clone, Default)]
pub(crate) struct PageLocation {
    params: Vec<(String, String)>,
}

impl PageLocation {
    pub(crate) fn parse(query: &str) -> Self {
        let params = url::form_urlencoded::parse(query.trim_start_matches('?').as_bytes())
            .map(|(key, value)| (key.into_owned(), value.into_owned()))
            .collect();
        Self { params }
    }

    pub(crate) fn with_anime_id(anime_id: Option<&str>) -> Self {
        let params = anime_id
            .map(|id| vec![("id".to_string(), id.to_string())])
            .unwrap_or_default();
        Self { params }
    }
}

impl Location for PageLocation {
    fn query_param(&self, name: &str) -> Option<String> {
        self.params
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.clone())
    }
}

pub(crate) trait Clock {
    fn now_ms(&self) -> i64;
}

#[derive(Debug, Default, Clone, Copy)]
pub(crate) struct SystemClock;

impl Clock for SystemClock {
    fn now_ms(&self) -> i64 {
        Utc::now().timestamp_millis()
    }
}
