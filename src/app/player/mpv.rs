use std::collections::HashSet;
use std::env;
use std::ffi::OsString;
use std::fs;
use std::io::{BufRead, BufReader, Write};
use std::os::unix::net::UnixStream;
use std::path::{Path, PathBuf};
use std::process::{Child, Command as ProcessCommand, Stdio};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc;
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{Context, Result, anyhow, bail};
use serde_json::{Value, json};

use super::{
    FullscreenApi, MediaError, MediaErrorCode, Player, PlayerConfig, PlayerEvent,
    PlayerEventKind, TextTrack, TextTrackMode,
};

const SOCKET_WAIT: Duration = Duration::from_secs(5);
const REPLY_TIMEOUT: Duration = Duration::from_secs(2);
const FULLSCREEN_OBSERVER_ID: u64 = 1;

pub(crate) fn resolve_player_bin() -> PathBuf {
    resolve_player_bin_from_env(env::var_os("ANIPLAY_MPV_BIN"))
}

pub(crate) fn resolve_player_bin_from_env(env_value: Option<OsString>) -> PathBuf {
    match env_value {
        Some(value) if !value.is_empty() => PathBuf::from(value),
        _ => PathBuf::from("mpv"),
    }
}

pub(crate) fn mpv_args(config: &PlayerConfig, socket_path: &Path) -> Vec<String> {
    let mut args = vec![
        "--idle=yes".to_string(),
        "--force-window=yes".to_string(),
        "--no-terminal".to_string(),
        format!("--input-ipc-server={}", socket_path.display()),
    ];
    args.push(if config.controls { "--osc=yes" } else { "--osc=no" }.to_string());
    if !config.autoplay {
        args.push("--pause".to_string());
    }
    args.push(if config.preload { "--cache=yes" } else { "--cache=no" }.to_string());
    if config.fluid {
        args.push("--keepaspect-window=yes".to_string());
    }
    if config.responsive {
        args.push("--autofit-larger=90%x90%".to_string());
    }
    args
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum MpvEvent {
    FileLoaded,
    EndFileError(MediaError),
    Fullscreen(bool),
    Other,
}

pub(crate) fn parse_mpv_event(value: &Value) -> MpvEvent {
    match value.get("event").and_then(Value::as_str) {
        Some("file-loaded") => MpvEvent::FileLoaded,
        Some("end-file") if value.get("reason").and_then(Value::as_str) == Some("error") => {
            let detail = value
                .get("file_error")
                .and_then(Value::as_str)
                .unwrap_or("unknown error");
            MpvEvent::EndFileError(MediaError {
                code: map_file_error(detail),
                message: detail.to_string(),
            })
        }
        Some("property-change")
            if value.get("name").and_then(Value::as_str) == Some("fullscreen") =>
        {
            match value.get("data").and_then(Value::as_bool) {
                Some(active) => MpvEvent::Fullscreen(active),
                None => MpvEvent::Other,
            }
        }
        _ => MpvEvent::Other,
    }
}

pub(crate) fn map_file_error(detail: &str) -> MediaErrorCode {
    let detail = detail.to_lowercase();
    if detail.contains("unrecognized")
        || detail.contains("unsupported")
        || detail.contains("no audio or video")
    {
        MediaErrorCode::SrcNotSupported
    } else if detail.contains("loading failed") || detail.contains("network") {
        MediaErrorCode::Network
    } else {
        MediaErrorCode::Decode
    }
}

/// mpv driven over its JSON IPC socket. A reader thread splits command
/// replies from asynchronous events.
pub(crate) struct MpvPlayer {
    child: Option<Child>,
    socket_path: Option<PathBuf>,
    stream: UnixStream,
    replies: mpsc::Receiver<Value>,
    events: mpsc::Receiver<Value>,
    next_request_id: AtomicU64,
    subscriptions: HashSet<PlayerEventKind>,
    tracks: Vec<TextTrack>,
    loading: bool,
    pending_seek: Option<f64>,
    deferred: Vec<Value>,
}

impl MpvPlayer {
    pub(crate) fn spawn(config: &PlayerConfig, bin: &Path, socket_path: &Path) -> Result<Self> {
        let _ = fs::remove_file(socket_path);
        let child = ProcessCommand::new(bin)
            .args(mpv_args(config, socket_path))
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .with_context(|| format!("failed to launch {}", bin.display()))?;

        let started = Instant::now();
        let stream = loop {
            match UnixStream::connect(socket_path) {
                Ok(stream) => break stream,
                Err(err) if started.elapsed() < SOCKET_WAIT => {
                    log::trace!("waiting for mpv socket: {err}");
                    thread::sleep(Duration::from_millis(50));
                }
                Err(err) => {
                    return Err(err).with_context(|| {
                        format!("mpv did not open IPC socket {}", socket_path.display())
                    });
                }
            }
        };

        Self::from_stream(stream, Some(child), Some(socket_path.to_path_buf()))
    }

    pub(crate) fn from_stream(
        stream: UnixStream,
        child: Option<Child>,
        socket_path: Option<PathBuf>,
    ) -> Result<Self> {
        let reader = stream.try_clone().context("failed to clone mpv socket")?;
        let (reply_tx, replies) = mpsc::channel();
        let (event_tx, events) = mpsc::channel();
        thread::spawn(move || {
            for line in BufReader::new(reader).lines() {
                let Ok(line) = line else {
                    break;
                };
                let Ok(value) = serde_json::from_str::<Value>(&line) else {
                    log::debug!("ignoring non-JSON mpv line: {line}");
                    continue;
                };
                let sent = if value.get("event").is_some() {
                    event_tx.send(value).is_ok()
                } else {
                    reply_tx.send(value).is_ok()
                };
                if !sent {
                    break;
                }
            }
        });

        Ok(Self {
            child,
            socket_path,
            stream,
            replies,
            events,
            next_request_id: AtomicU64::new(1),
            subscriptions: HashSet::new(),
            tracks: Vec::new(),
            loading: false,
            pending_seek: None,
            deferred: Vec::new(),
        })
    }

    fn command(&self, args: Value) -> Result<Value> {
        let request_id = self.next_request_id.fetch_add(1, Ordering::SeqCst);
        let mut line = serde_json::to_string(&json!({ "command": args, "request_id": request_id }))?;
        line.push('\n');
        (&self.stream)
            .write_all(line.as_bytes())
            .context("failed to write mpv command")?;

        let deadline = Instant::now() + REPLY_TIMEOUT;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            let reply = self
                .replies
                .recv_timeout(remaining)
                .map_err(|_| anyhow!("mpv did not answer {args}"))?;
            if reply.get("request_id").and_then(Value::as_u64) != Some(request_id) {
                continue;
            }
            return match reply.get("error").and_then(Value::as_str) {
                Some("success") => Ok(reply.get("data").cloned().unwrap_or(Value::Null)),
                Some(err) => bail!("mpv rejected {args}: {err}"),
                None => bail!("mpv reply without status for {args}"),
            };
        }
    }

    fn get_property(&self, name: &str) -> Option<Value> {
        match self.command(json!(["get_property", name])) {
            Ok(value) => Some(value),
            Err(err) => {
                log::trace!("{err}");
                None
            }
        }
    }

    fn set_property(&self, name: &str, value: Value) -> Result<()> {
        self.command(json!(["set_property", name, value]))?;
        Ok(())
    }

    fn run_or_defer(&mut self, args: Value) -> Result<()> {
        if self.loading {
            self.deferred.push(args);
            return Ok(());
        }
        self.command(args)?;
        Ok(())
    }

    fn on_file_loaded(&mut self) {
        self.loading = false;
        if let Some(seconds) = self.pending_seek.take()
            && let Err(err) = self.command(json!(["seek", seconds, "absolute"]))
        {
            log::warn!("deferred seek failed: {err}");
        }
        for args in std::mem::take(&mut self.deferred) {
            if let Err(err) = self.command(args) {
                log::warn!("deferred mpv command failed: {err}");
            }
        }
    }

    fn clamp_position(&self, seconds: f64) -> f64 {
        let seconds = seconds.max(0.0);
        match self.duration() {
            Some(duration) => seconds.min(duration),
            None => seconds,
        }
    }
}

impl Player for MpvPlayer {
    fn set_source(&mut self, url: &str, mime_type: &str) -> Result<()> {
        log::debug!("loading {url} as {mime_type}");
        self.command(json!(["loadfile", url, "replace"]))?;
        self.tracks.clear();
        self.deferred.clear();
        self.pending_seek = None;
        self.loading = true;
        Ok(())
    }

    fn add_remote_text_track(&mut self, mut track: TextTrack, default: bool) -> Result<()> {
        log::debug!("adding {} track {} ({})", track.kind, track.src, track.srclang);
        let flag = if default { "select" } else { "auto" };
        self.run_or_defer(json!([
            "sub-add",
            track.src.as_str(),
            flag,
            track.label.as_str(),
            track.srclang.as_str()
        ]))?;
        track.mode = if default {
            TextTrackMode::Showing
        } else {
            TextTrackMode::Disabled
        };
        self.tracks.push(track);
        Ok(())
    }

    fn remote_text_tracks(&self) -> Vec<TextTrack> {
        self.tracks.clone()
    }

    fn set_text_track_mode(&mut self, index: usize, mode: TextTrackMode) -> Result<()> {
        let Some(track) = self.tracks.get_mut(index) else {
            bail!("no text track at index {index}");
        };
        track.mode = mode;
        let visible = mode == TextTrackMode::Showing;
        self.run_or_defer(json!(["set_property", "sub-visibility", visible]))
    }

    fn current_time(&self) -> f64 {
        if self.loading {
            return self.pending_seek.unwrap_or(0.0);
        }
        self.get_property("time-pos")
            .and_then(|value| value.as_f64())
            .unwrap_or(0.0)
    }

    fn set_current_time(&mut self, seconds: f64) -> Result<()> {
        if self.loading {
            self.pending_seek = Some(seconds.max(0.0));
            return Ok(());
        }
        let target = self.clamp_position(seconds);
        self.command(json!(["seek", target, "absolute"]))?;
        Ok(())
    }

    fn duration(&self) -> Option<f64> {
        if self.loading {
            return None;
        }
        self.get_property("duration").and_then(|value| value.as_f64())
    }

    fn volume(&self) -> f64 {
        self.get_property("volume")
            .and_then(|value| value.as_f64())
            .map(|volume| volume / 100.0)
            .unwrap_or(1.0)
    }

    fn set_volume(&mut self, volume: f64) -> Result<()> {
        self.set_property("volume", json!(volume.clamp(0.0, 1.0) * 100.0))
    }

    fn playback_rate(&self) -> f64 {
        self.get_property("speed")
            .and_then(|value| value.as_f64())
            .unwrap_or(1.0)
    }

    fn set_playback_rate(&mut self, rate: f64) -> Result<()> {
        self.set_property("speed", json!(rate))
    }

    fn paused(&self) -> bool {
        self.get_property("pause")
            .and_then(|value| value.as_bool())
            .unwrap_or(true)
    }

    fn play(&mut self) -> Result<()> {
        self.set_property("pause", json!(false))
    }

    fn pause(&mut self) -> Result<()> {
        self.set_property("pause", json!(true))
    }

    fn fullscreen_apis(&self) -> Vec<FullscreenApi> {
        vec![FullscreenApi::Standard, FullscreenApi::Prefixed]
    }

    fn request_fullscreen(&mut self, api: FullscreenApi) -> Result<()> {
        match api {
            FullscreenApi::Standard => self.set_property("fullscreen", json!(true)),
            FullscreenApi::Prefixed => self.command(json!(["cycle", "fullscreen"])).map(|_| ()),
        }
    }

    fn exit_fullscreen(&mut self, api: FullscreenApi) -> Result<()> {
        match api {
            FullscreenApi::Standard => self.set_property("fullscreen", json!(false)),
            FullscreenApi::Prefixed => self.command(json!(["cycle", "fullscreen"])).map(|_| ()),
        }
    }

    fn supports_adaptive_streaming(&self) -> bool {
        self.get_property("demuxer-lavf-list")
            .and_then(|value| {
                value
                    .as_array()
                    .map(|items| items.iter().any(|item| item.as_str() == Some("hls")))
            })
            .unwrap_or(false)
    }

    fn attach_adaptive_streaming(&mut self) -> Result<()> {
        self.set_property("hls-bitrate", json!("max"))
    }

    fn subscribe(&mut self, kind: PlayerEventKind) -> Result<()> {
        if kind == PlayerEventKind::FullscreenChange && !self.subscriptions.contains(&kind) {
            self.command(json!(["observe_property", FULLSCREEN_OBSERVER_ID, "fullscreen"]))?;
        }
        self.subscriptions.insert(kind);
        Ok(())
    }

    fn poll_events(&mut self) -> Vec<PlayerEvent> {
        let mut out = Vec::new();
        while let Ok(value) = self.events.try_recv() {
            let event = match parse_mpv_event(&value) {
                MpvEvent::FileLoaded => {
                    self.on_file_loaded();
                    continue;
                }
                MpvEvent::EndFileError(error) => {
                    self.loading = false;
                    self.deferred.clear();
                    self.pending_seek = None;
                    PlayerEvent::Error(error)
                }
                MpvEvent::Fullscreen(fullscreen) => PlayerEvent::FullscreenChange { fullscreen },
                MpvEvent::Other => continue,
            };
            if self.subscriptions.contains(&event.kind()) {
                out.push(event);
            }
        }
        out
    }
}

impl Drop for MpvPlayer {
    fn drop(&mut self) {
        if let Some(mut child) = self.child.take() {
            let _ = self.command(json!(["quit"]));
            let _ = child.kill();
            let _ = child.wait();
        }
        let _ = self.stream.shutdown(std::net::Shutdown::Both);
        if let Some(path) = self.socket_path.take() {
            let _ = fs::remove_file(path);
        }
    }
}
