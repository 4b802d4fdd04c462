use std::time::Duration;

use anyhow::{Result, anyhow};
use chrono::{Local, TimeZone};
use serde_json::Value;

use crate::http::get_text;

const DEMO_SOURCES: [&str; 3] = [
    "https://bitdash-a.akamaihd.net/s/content/media/Manifest.m3u8",
    "https://test-streams.mux.dev/x36xhzz/x36xhzz.m3u8",
    "https://content.jwplatform.com/manifests/vM7nH0Kl.m3u8",
];
const DEMO_SUBTITLES: &str = "https://pastebin.com/raw/sample.srt";
const DEMO_DURATION: &str = "23:45";

const CONNECT_TIMEOUT: Duration = Duration::from_secs(3);
const READ_TIMEOUT: Duration = Duration::from_secs(6);

/// Per-episode metadata. Sources are ordered by quality tier:
/// 1080p, 720p, auto.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct EpisodeData {
    pub(crate) episode_number: u32,
    pub(crate) title: String,
    pub(crate) duration_label: String,
    pub(crate) sources: Vec<String>,
    pub(crate) subtitle_url: Option<String>,
}

/// Looks episode metadata up by number. Called from worker threads.
pub(crate) trait EpisodeProvider: Send + Sync {
    fn fetch_episode(&self, episode_number: u32) -> Result<EpisodeData>;
}

#[derive(Debug, Default)]
pub(crate) struct DemoEpisodeProvider;

impl EpisodeProvider for DemoEpisodeProvider {
    fn fetch_episode(&self, episode_number: u32) -> Result<EpisodeData> {
        Ok(EpisodeData {
            episode_number,
            title: format!("Episode {episode_number}"),
            duration_label: DEMO_DURATION.to_string(),
            sources: DEMO_SOURCES.iter().map(|url| url.to_string()).collect(),
            subtitle_url: Some(DEMO_SUBTITLES.to_string()),
        })
    }
}

#[derive(Debug, Clone)]
pub(crate) struct HttpEpisodeProvider {
    base_url: String,
}

impl HttpEpisodeProvider {
    pub(crate) fn new(base_url: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    pub(crate) fn episode_url(&self, episode_number: u32) -> String {
        format!("{}/episodes/{episode_number}", self.base_url)
    }
}

impl EpisodeProvider for HttpEpisodeProvider {
    fn fetch_episode(&self, episode_number: u32) -> Result<EpisodeData> {
        let url = self.episode_url(episode_number);
        let raw = get_text(&url, CONNECT_TIMEOUT, READ_TIMEOUT).map_err(|err| anyhow!(err))?;
        parse_episode_data(&raw, episode_number)
            .ok_or_else(|| anyhow!("malformed episode data from {url}"))
    }
}

pub(crate) fn parse_episode_data(raw: &str, requested: u32) -> Option<EpisodeData> {
    let value: Value = serde_json::from_str(raw).ok()?;
    let episode_number = match value.get("episode") {
        Some(Value::Number(number)) => u32::try_from(number.as_u64()?).ok()?,
        Some(Value::String(text)) => text.trim().parse::<u32>().ok()?,
        _ => requested,
    };

    let sources = value
        .get("sources")?
        .as_array()?
        .iter()
        .filter_map(|item| item.as_str())
        .map(str::trim)
        .filter(|url| !url.is_empty())
        .map(str::to_string)
        .collect::<Vec<_>>();
    if sources.is_empty() {
        return None;
    }

    let title = value
        .get("title")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|title| !title.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| format!("Episode {episode_number}"));
    let duration_label = value
        .get("duration")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .trim()
        .to_string();
    let subtitle_url = value
        .get("subtitles")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|url| !url.is_empty())
        .map(str::to_string);

    Some(EpisodeData {
        episode_number,
        title,
        duration_label,
        sources,
        subtitle_url,
    })
}

pub(crate) fn format_clock(seconds: f64) -> String {
    if !seconds.is_finite() || seconds < 0.0 {
        return "--:--".to_string();
    }
    let total = seconds.floor() as u64;
    let (hours, minutes, secs) = (total / 3600, (total / 60) % 60, total % 60);
    if hours > 0 {
        format!("{hours}:{minutes:02}:{secs:02}")
    } else {
        format!("{minutes:02}:{secs:02}")
    }
}

pub(crate) fn format_saved_at(epoch_ms: i64) -> String {
    Local
        .timestamp_millis_opt(epoch_ms)
        .single()
        .map(|dt| dt.format("%Y-%m-%d %H:%M %:z").to_string())
        .unwrap_or_else(|| epoch_ms.to_string())
}

pub(crate) fn truncate(s: &str, max: usize) -> String {
    let mut out = s.to_string();
    if out.chars().count() > max {
        out = out.chars().take(max.saturating_sub(3)).collect::<String>() + "...";
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::test_server::{Behavior, TestServer};

    #[test]
    fn demo_provider_returns_three_tiers_with_subtitles() {
        let data = DemoEpisodeProvider.fetch_episode(4).expect("demo data");
        assert_eq!(data.episode_number, 4);
        assert_eq!(data.title, "Episode 4");
        assert_eq!(data.duration_label, "23:45");
        assert_eq!(data.sources.len(), 3);
        assert!(data.subtitle_url.is_some());
    }

    #[test]
    fn parse_episode_data_accepts_string_episode_and_missing_subtitles() {
        let raw = r#"{"episode":"7","title":" Finale ","duration":"24:10","sources":["a","b","c"]}"#;
        let data = parse_episode_data(raw, 1).expect("should parse");
        assert_eq!(data.episode_number, 7);
        assert_eq!(data.title, "Finale");
        assert_eq!(data.sources, vec!["a", "b", "c"]);
        assert_eq!(data.subtitle_url, None);
    }

    #[test]
    fn parse_episode_data_falls_back_to_requested_number_and_title() {
        let raw = r#"{"sources":["only"],"subtitles":""}"#;
        let data = parse_episode_data(raw, 9).expect("should parse");
        assert_eq!(data.episode_number, 9);
        assert_eq!(data.title, "Episode 9");
        assert_eq!(data.subtitle_url, None);
    }

    #[test]
    fn parse_episode_data_rejects_missing_sources() {
        assert!(parse_episode_data(r#"{"episode":1,"sources":[]}"#, 1).is_none());
        assert!(parse_episode_data(r#"{"episode":1}"#, 1).is_none());
        assert!(parse_episode_data("not json", 1).is_none());
    }

    #[test]
    fn http_provider_requests_episode_path() {
        let body = r#"{"episode":3,"title":"Episode 3","duration":"23:45","sources":["hd","sd","auto"],"subtitles":"subs.srt"}"#;
        let server = TestServer::spawn(vec![Behavior::Respond(200, body.to_string())]);
        let provider = HttpEpisodeProvider::new(&format!("{}/", server.base_url));

        let data = provider.fetch_episode(3).expect("fetch should succeed");

        assert_eq!(data.sources[0], "hd");
        assert_eq!(data.subtitle_url.as_deref(), Some("subs.srt"));
        assert_eq!(server.request_paths(), vec!["/episodes/3".to_string()]);
    }

    #[test]
    fn http_provider_reports_status_failures() {
        let server = TestServer::spawn(vec![Behavior::Respond(500, "boom".to_string())]);
        let provider = HttpEpisodeProvider::new(&server.base_url);

        let err = provider.fetch_episode(1).expect_err("500 should fail");
        assert!(err.to_string().contains("HTTP status 500"), "unexpected: {err}");
    }

    #[test]
    fn format_clock_handles_hours_and_invalid_values() {
        assert_eq!(format_clock(65.9), "01:05");
        assert_eq!(format_clock(3725.0), "1:02:05");
        assert_eq!(format_clock(f64::NAN), "--:--");
    }

    #[test]
    fn truncate_adds_ellipsis() {
        assert_eq!(truncate("Frieren", 10), "Frieren");
        assert_eq!(truncate("Beyond Journey's End", 10), "Beyond ...");
    }
}
