use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, mpsc};
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{Context, Result, anyhow};

use crate::db::PreferenceStore;

use super::super::episode::{EpisodeData, EpisodeProvider};
use super::super::player::{
    FULLSCREEN_PRIORITY, HLS_MIME_TYPE, MediaError, MediaErrorCode, Player, PlayerConfig,
    PlayerEvent, PlayerEventKind, TextTrack, TextTrackMode,
};
use super::{
    Clock, DEFAULT_ANIME_ID, KEY_PLAYBACK_RATE, KEY_PLAYER_VOLUME, KEY_SUBTITLE_ENABLED,
    KEY_VIDEO_QUALITY, KEY_WATCHING_PROGRESS, Location, Notice, PlaybackState, Quality, Session,
    SessionError, WatchProgress,
};

pub(crate) const DEFAULT_SKIP_SECONDS: f64 = 10.0;
pub(crate) const LOAD_FAILED_MESSAGE: &str = "Failed to load episode. Please try another server.";

const SUBTITLE_LANG: &str = "id";
const SUBTITLE_LABEL: &str = "Indonesian";

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

struct EpisodeLoad {
    episode: u32,
    result: Result<EpisodeData>,
}

/// Coordinates one playback session: episode, source tier, subtitles,
/// preferences and the resume point.
///
/// Episode data is fetched on worker threads; finished fetches are applied
/// by [`pump`](Self::pump) or [`settle`](Self::settle) in completion order.
/// There is no cancellation, so the last fetch to finish decides the
/// player source.
pub(crate) struct PlaybackSessionController<P, S> {
    player: P,
    store: S,
    provider: Arc<dyn EpisodeProvider>,
    location: Box<dyn Location>,
    clock: Box<dyn Clock>,
    config: PlayerConfig,
    session: Session,
    state: PlaybackState,
    title: String,
    episode: Option<EpisodeData>,
    notice: Option<Notice>,
    resume_pending: bool,
    loads_tx: mpsc::Sender<EpisodeLoad>,
    loads_rx: mpsc::Receiver<EpisodeLoad>,
    in_flight: usize,
}

impl<P: Player, S: PreferenceStore> PlaybackSessionController<P, S> {
    pub(crate) fn new(
        player: P,
        store: S,
        provider: Arc<dyn EpisodeProvider>,
        location: Box<dyn Location>,
        clock: Box<dyn Clock>,
        config: PlayerConfig,
    ) -> Self {
        let (loads_tx, loads_rx) = mpsc::channel();
        Self {
            player,
            store,
            provider,
            location,
            clock,
            config,
            session: Session::default(),
            state: PlaybackState::Uninitialized,
            title: String::new(),
            episode: None,
            notice: None,
            resume_pending: false,
            loads_tx,
            loads_rx,
            in_flight: 0,
        }
    }

    pub(crate) fn initialize(&mut self) -> Result<()> {
        self.state = PlaybackState::Initializing;

        if self.player.supports_adaptive_streaming() {
            if let Err(err) = self.player.attach_adaptive_streaming() {
                log::warn!("adaptive streaming unavailable: {err:#}");
            }
        } else {
            log::debug!("player reports no adaptive streaming support");
        }

        self.player
            .subscribe(PlayerEventKind::Error)
            .context("failed to subscribe to player errors")?;
        self.player
            .subscribe(PlayerEventKind::FullscreenChange)
            .context("failed to subscribe to fullscreen changes")?;

        self.load_preferences()?;
        self.state = PlaybackState::Ready;
        Ok(())
    }

    fn load_preferences(&mut self) -> Result<()> {
        self.session.subtitle_enabled =
            self.store.get_item(KEY_SUBTITLE_ENABLED)?.as_deref() != Some("false");
        self.session.quality = self
            .store
            .get_item(KEY_VIDEO_QUALITY)?
            .map(|raw| Quality::parse(&raw))
            .unwrap_or_default();
        if let Some(raw) = self.store.get_item(KEY_PLAYBACK_RATE)? {
            match raw.trim().parse::<f64>() {
                Ok(rate) if rate.is_finite() && rate > 0.0 => {
                    match self.player.set_playback_rate(rate) {
                        Ok(()) => self.session.playback_rate = rate,
                        Err(err) => log::warn!("player rejected stored rate {rate}: {err:#}"),
                    }
                }
                _ => log::warn!("ignoring stored playback rate {raw:?}"),
            }
        }

        if let Some(raw) = self.store.get_item(KEY_PLAYER_VOLUME)?
            && !raw.is_empty()
        {
            match raw.trim().parse::<f64>() {
                Ok(volume) if volume.is_finite() => {
                    let volume = volume.round().clamp(0.0, 100.0) as u8;
                    self.session.volume = volume;
                    self.player.set_volume(f64::from(volume) / 100.0)?;
                }
                _ => log::warn!("ignoring stored volume {raw:?}"),
            }
        }
        Ok(())
    }

    pub(crate) fn load_episode(&mut self, episode_number: u32) {
        let episode_number = episode_number.max(1);
        self.session.current_episode = episode_number;
        self.title = format!("Episode {episode_number}");

        let provider = Arc::clone(&self.provider);
        let tx = self.loads_tx.clone();
        self.in_flight += 1;
        log::debug!("fetching episode {episode_number}");
        thread::spawn(move || {
            let result =
                panic::catch_unwind(AssertUnwindSafe(|| provider.fetch_episode(episode_number)))
                    .unwrap_or_else(|payload| {
                        Err(anyhow!("episode lookup panicked: {}", panic_message(&*payload)))
                    });
            let _ = tx.send(EpisodeLoad {
                episode: episode_number,
                result,
            });
        });
    }

    /// Opens the stored episode for this anime and seeks to the saved
    /// position once its source is applied; falls back to episode 1.
    pub(crate) fn resume(&mut self) -> Result<()> {
        let anime_id = self.anime_id();
        let episode = match self.stored_progress()? {
            Some(progress) if progress.anime_id == anime_id => {
                self.resume_pending = true;
                progress.episode
            }
            _ => 1,
        };
        self.load_episode(episode);
        Ok(())
    }

    fn apply_load(&mut self, load: EpisodeLoad) {
        self.in_flight = self.in_flight.saturating_sub(1);
        let applied = load
            .result
            .map_err(|err| {
                anyhow::Error::new(SessionError::Fetch {
                    episode: load.episode,
                    reason: format!("{err:#}"),
                })
            })
            .and_then(|data| self.apply_episode(data));
        if let Err(err) = applied {
            log::error!("Error loading episode {}: {err:#}", load.episode);
            self.resume_pending = false;
            self.show_notice(LOAD_FAILED_MESSAGE);
        }
    }

    fn apply_episode(&mut self, data: EpisodeData) -> Result<()> {
        let url = self.source_url(&data.sources)?.to_string();
        self.player.set_source(&url, HLS_MIME_TYPE)?;
        log::info!(
            "episode {} source set to {url} ({})",
            data.episode_number,
            self.session.quality
        );

        if let Some(subtitle_url) = data.subtitle_url.as_deref()
            && self.session.subtitle_enabled
        {
            self.player.add_remote_text_track(
                TextTrack::subtitles(subtitle_url, SUBTITLE_LANG, SUBTITLE_LABEL),
                true,
            )?;
        }

        self.state = PlaybackState::Ready;
        self.episode = Some(data);
        if std::mem::take(&mut self.resume_pending)
            && let Err(err) = self.load_watching_progress()
        {
            log::warn!("failed to restore saved position: {err:#}");
        }
        if let Err(err) = self.save_watching_progress() {
            log::warn!("failed to save watch progress: {err:#}");
        }
        Ok(())
    }

    pub(crate) fn source_url<'a>(&self, sources: &'a [String]) -> Result<&'a str, SessionError> {
        let quality = self.session.quality;
        let index = quality.source_index();
        sources
            .get(index)
            .map(String::as_str)
            .ok_or(SessionError::MissingSource {
                quality,
                index,
                available: sources.len(),
            })
    }

    pub(crate) fn toggle_subtitle(&mut self) -> Result<()> {
        self.session.subtitle_enabled = !self.session.subtitle_enabled;
        let mode = if self.session.subtitle_enabled {
            TextTrackMode::Showing
        } else {
            TextTrackMode::Disabled
        };
        for index in 0..self.player.remote_text_tracks().len() {
            self.player.set_text_track_mode(index, mode)?;
        }

        let flag = if self.session.subtitle_enabled {
            "true"
        } else {
            "false"
        };
        self.store.set_item(KEY_SUBTITLE_ENABLED, flag)
    }

    /// Re-resolves the current episode's source; playback restarts from the
    /// beginning of the new source.
    pub(crate) fn change_quality(&mut self, quality: Quality) -> Result<()> {
        self.session.quality = quality;
        self.store.set_item(KEY_VIDEO_QUALITY, quality.as_str())?;
        self.load_episode(self.session.current_episode);
        Ok(())
    }

    pub(crate) fn skip_forward(&mut self, seconds: f64) -> Result<()> {
        let target = self.player.current_time() + seconds;
        self.player.set_current_time(target)?;
        self.save_watching_progress()
    }

    pub(crate) fn skip_backward(&mut self, seconds: f64) -> Result<()> {
        let target = self.player.current_time() - seconds;
        self.player.set_current_time(target)?;
        self.save_watching_progress()
    }

    pub(crate) fn toggle_play(&mut self) -> Result<()> {
        if self.player.paused() {
            self.player.play()?;
            self.state = PlaybackState::Playing;
        } else {
            self.player.pause()?;
            self.state = PlaybackState::Paused;
        }
        Ok(())
    }

    /// Requests the opposite of the last reported fullscreen state. The
    /// flag itself only changes when the player reports the transition.
    pub(crate) fn toggle_fullscreen(&mut self) -> Result<()> {
        let available = self.player.fullscreen_apis();
        let Some(api) = FULLSCREEN_PRIORITY
            .into_iter()
            .find(|api| available.contains(api))
        else {
            log::warn!("player exposes no fullscreen capability");
            return Ok(());
        };

        if self.session.is_fullscreen {
            self.player.exit_fullscreen(api)
        } else {
            self.player.request_fullscreen(api)
        }
    }

    pub(crate) fn set_volume(&mut self, volume: u8) -> Result<()> {
        let volume = volume.min(100);
        self.player.set_volume(f64::from(volume) / 100.0)?;
        self.session.volume = volume;
        self.store.set_item(KEY_PLAYER_VOLUME, &volume.to_string())
    }

    pub(crate) fn set_playback_rate(&mut self, rate: f64) -> Result<()> {
        self.session.playback_rate = rate;
        self.player.set_playback_rate(rate)?;
        self.store.set_item(KEY_PLAYBACK_RATE, &rate.to_string())
    }

    pub(crate) fn save_watching_progress(&mut self) -> Result<()> {
        let progress = WatchProgress {
            anime_id: self.anime_id(),
            episode: self.session.current_episode,
            position_seconds: self.player.current_time(),
            duration_seconds: self.player.duration(),
            saved_at_ms: self.clock.now_ms(),
        };
        let raw = serde_json::to_string(&progress).context("failed to encode watch progress")?;
        self.store.set_item(KEY_WATCHING_PROGRESS, &raw)
    }

    /// Seeks to the stored position when it belongs to the current anime
    /// and episode. Returns whether a seek was issued.
    pub(crate) fn load_watching_progress(&mut self) -> Result<bool> {
        let Some(progress) = self.stored_progress()? else {
            return Ok(false);
        };
        if progress.anime_id != self.anime_id()
            || progress.episode != self.session.current_episode
        {
            return Ok(false);
        }
        self.player.set_current_time(progress.position_seconds)?;
        Ok(true)
    }

    pub(crate) fn stored_progress(&self) -> Result<Option<WatchProgress>> {
        let Some(raw) = self.store.get_item(KEY_WATCHING_PROGRESS)? else {
            return Ok(None);
        };
        match serde_json::from_str::<WatchProgress>(&raw) {
            Ok(progress) => Ok(Some(progress)),
            Err(err) => {
                log::warn!("ignoring unreadable watch progress: {err}");
                Ok(None)
            }
        }
    }

    pub(crate) fn handle_event(&mut self, event: PlayerEvent) -> Result<()> {
        match event {
            PlayerEvent::Error(error) => self.handle_error(&error),
            PlayerEvent::FullscreenChange { fullscreen } => {
                self.session.is_fullscreen = fullscreen;
                Ok(())
            }
        }
    }

    /// An unsupported source drops once to the 720p tier; anything else
    /// is only logged.
    pub(crate) fn handle_error(&mut self, error: &MediaError) -> Result<()> {
        log::error!(
            "Video error (code {}): {}",
            error.code.code(),
            error.message
        );
        self.state = PlaybackState::Error;

        if error.code != MediaErrorCode::SrcNotSupported {
            return Ok(());
        }
        if self.session.quality == Quality::P720 {
            log::warn!("720p source is also unsupported; no further fallback");
            return Ok(());
        }
        log::info!("falling back from {} to 720p", self.session.quality);
        self.change_quality(Quality::P720)
    }

    /// Applies finished episode fetches and dispatches pending player
    /// events. Call once per event-loop tick.
    pub(crate) fn pump(&mut self) {
        while let Ok(load) = self.loads_rx.try_recv() {
            self.apply_load(load);
        }
        for event in self.player.poll_events() {
            let kind = event.kind();
            if let Err(err) = self.handle_event(event) {
                log::error!("failed to handle {kind:?} event: {err:#}");
            }
        }
    }

    /// Blocks until every in-flight fetch has been applied or `timeout`
    /// passes. Returns false on timeout.
    pub(crate) fn settle(&mut self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        while self.in_flight > 0 {
            let remaining = deadline.saturating_duration_since(Instant::now());
            match self.loads_rx.recv_timeout(remaining) {
                Ok(load) => self.apply_load(load),
                Err(_) => return false,
            }
        }
        true
    }

    pub(crate) fn anime_id(&self) -> String {
        self.location
            .query_param("id")
            .filter(|id| !id.is_empty())
            .unwrap_or_else(|| DEFAULT_ANIME_ID.to_string())
    }

    fn show_notice(&mut self, message: &str) {
        self.notice = Some(Notice {
            message: message.to_string(),
            shown_at_ms: self.clock.now_ms(),
        });
    }

    /// The banner, while it has neither expired nor been dismissed.
    pub(crate) fn notice(&self) -> Option<&Notice> {
        let now = self.clock.now_ms();
        self.notice.as_ref().filter(|notice| !notice.is_expired(now))
    }

    pub(crate) fn dismiss_notice(&mut self) {
        self.notice = None;
    }

    pub(crate) fn is_loading(&self) -> bool {
        self.in_flight > 0
    }

    pub(crate) fn session(&self) -> &Session {
        &self.session
    }

    pub(crate) fn state(&self) -> PlaybackState {
        self.state
    }

    pub(crate) fn title(&self) -> &str {
        &self.title
    }

    pub(crate) fn episode(&self) -> Option<&EpisodeData> {
        self.episode.as_ref()
    }

    pub(crate) fn config(&self) -> &PlayerConfig {
        &self.config
    }

    pub(crate) fn player(&self) -> &P {
        &self.player
    }

    #[cfg(test)]
    pub(crate) fn player_mut(&mut self) -> &mut P {
        &mut self.player
    }

    #[cfg(test)]
    pub(crate) fn into_store(self) -> S {
        self.store
    }
}
