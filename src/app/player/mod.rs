#[cfg(unix)]
mod mpv;

#[cfg(unix)]
pub(crate) use mpv::*;

use anyhow::Result;

pub(crate) const HLS_MIME_TYPE: &str = "application/x-mpegURL";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ControlBarItem {
    PlayToggle,
    VolumePanel,
    CurrentTimeDisplay,
    TimeDivider,
    DurationDisplay,
    ProgressControl,
    RemainingTimeDisplay,
    PlaybackRateMenuButton,
    ChaptersButton,
    DescriptionsButton,
    SubsCapsButton,
    AudioTrackButton,
    FullscreenToggle,
}

impl ControlBarItem {
    pub(crate) fn label(self) -> &'static str {
        match self {
            Self::PlayToggle => "play",
            Self::VolumePanel => "volume",
            Self::CurrentTimeDisplay => "time",
            Self::TimeDivider => "/",
            Self::DurationDisplay => "duration",
            Self::ProgressControl => "progress",
            Self::RemainingTimeDisplay => "remaining",
            Self::PlaybackRateMenuButton => "rate",
            Self::ChaptersButton => "chapters",
            Self::DescriptionsButton => "descriptions",
            Self::SubsCapsButton => "subs",
            Self::AudioTrackButton => "audio",
            Self::FullscreenToggle => "fullscreen",
        }
    }
}

/// Construction options handed to a player backend.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct PlayerConfig {
    pub(crate) controls: bool,
    pub(crate) autoplay: bool,
    pub(crate) preload: bool,
    pub(crate) fluid: bool,
    pub(crate) responsive: bool,
    pub(crate) playback_rates: Vec<f64>,
    pub(crate) control_bar: Vec<ControlBarItem>,
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            controls: true,
            autoplay: false,
            preload: true,
            fluid: true,
            responsive: true,
            playback_rates: vec![0.5, 1.0, 1.25, 1.5, 2.0],
            control_bar: vec![
                ControlBarItem::PlayToggle,
                ControlBarItem::VolumePanel,
                ControlBarItem::CurrentTimeDisplay,
                ControlBarItem::TimeDivider,
                ControlBarItem::DurationDisplay,
                ControlBarItem::ProgressControl,
                ControlBarItem::RemainingTimeDisplay,
                ControlBarItem::PlaybackRateMenuButton,
                ControlBarItem::ChaptersButton,
                ControlBarItem::DescriptionsButton,
                ControlBarItem::SubsCapsButton,
                ControlBarItem::AudioTrackButton,
                ControlBarItem::FullscreenToggle,
            ],
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum TextTrackMode {
    Showing,
    Disabled,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct TextTrack {
    pub(crate) kind: String,
    pub(crate) src: String,
    pub(crate) srclang: String,
    pub(crate) label: String,
    pub(crate) mode: TextTrackMode,
}

impl TextTrack {
    pub(crate) fn subtitles(src: &str, srclang: &str, label: &str) -> Self {
        Self {
            kind: "subtitles".to_string(),
            src: src.to_string(),
            srclang: srclang.to_string(),
            label: label.to_string(),
            mode: TextTrackMode::Disabled,
        }
    }
}

/// HTML media error codes, which player backends map their failures onto.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum MediaErrorCode {
    Network = 2,
    Decode = 3,
    SrcNotSupported = 4,
}

impl MediaErrorCode {
    pub(crate) fn code(self) -> u16 {
        self as u16
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct MediaError {
    pub(crate) code: MediaErrorCode,
    pub(crate) message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) enum PlayerEventKind {
    Error,
    FullscreenChange,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum PlayerEvent {
    Error(MediaError),
    FullscreenChange { fullscreen: bool },
}

impl PlayerEvent {
    pub(crate) fn kind(&self) -> PlayerEventKind {
        match self {
            Self::Error(_) => PlayerEventKind::Error,
            Self::FullscreenChange { .. } => PlayerEventKind::FullscreenChange,
        }
    }
}

/// Fullscreen entry points in the order they should be tried.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum FullscreenApi {
    Standard,
    Prefixed,
}

pub(crate) const FULLSCREEN_PRIORITY: [FullscreenApi; 2] =
    [FullscreenApi::Standard, FullscreenApi::Prefixed];

/// Control surface of an external video player.
pub(crate) trait Player {
    fn set_source(&mut self, url: &str, mime_type: &str) -> Result<()>;
    fn add_remote_text_track(&mut self, track: TextTrack, default: bool) -> Result<()>;
    fn remote_text_tracks(&self) -> Vec<TextTrack>;
    fn set_text_track_mode(&mut self, index: usize, mode: TextTrackMode) -> Result<()>;

    fn current_time(&self) -> f64;
    fn set_current_time(&mut self, seconds: f64) -> Result<()>;
    fn duration(&self) -> Option<f64>;

    fn volume(&self) -> f64;
    fn set_volume(&mut self, volume: f64) -> Result<()>;
    fn playback_rate(&self) -> f64;
    fn set_playback_rate(&mut self, rate: f64) -> Result<()>;

    fn paused(&self) -> bool;
    fn play(&mut self) -> Result<()>;
    fn pause(&mut self) -> Result<()>;

    fn fullscreen_apis(&self) -> Vec<FullscreenApi>;
    fn request_fullscreen(&mut self, api: FullscreenApi) -> Result<()>;
    fn exit_fullscreen(&mut self, api: FullscreenApi) -> Result<()>;

    fn supports_adaptive_streaming(&self) -> bool {
        false
    }

    fn attach_adaptive_streaming(&mut self) -> Result<()> {
        Ok(())
    }

    fn subscribe(&mut self, kind: PlayerEventKind) -> Result<()>;
    fn poll_events(&mut self) -> Vec<PlayerEvent>;
}
