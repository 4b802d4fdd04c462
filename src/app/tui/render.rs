use ratatui::Frame;
use ratatui::layout::{Alignment, Constraint, Direction, Layout, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{
    Block, BorderType, Borders, Clear, Gauge, List, ListItem, Padding, Paragraph, Wrap,
};

use crate::db::PreferenceStore;

use super::super::episode::{format_clock, truncate};
use super::super::player::Player;
use super::super::session::{PlaybackSessionController, PlaybackState, Quality};
use super::{PageState, QualityModal};

const ACCENT: Color = Color::Rgb(110, 170, 255);
const MUTED: Color = Color::Rgb(185, 195, 210);
const TEXT: Color = Color::Rgb(230, 235, 242);
const DANGER: Color = Color::Rgb(255, 71, 87);

pub(super) fn draw_page<P: Player, S: PreferenceStore>(
    frame: &mut Frame,
    controller: &PlaybackSessionController<P, S>,
    page: &mut PageState,
) {
    let bg = Block::default().style(Style::default().bg(Color::Black));
    frame.render_widget(bg, frame.area());

    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3),
            Constraint::Min(8),
            Constraint::Length(3),
            Constraint::Length(3),
        ])
        .split(frame.area());

    let session = controller.session();
    let header = Paragraph::new(Line::from(vec![
        Span::styled(
            controller.title().to_string(),
            Style::default().fg(ACCENT).add_modifier(Modifier::BOLD),
        ),
        Span::styled("   ", Style::default()),
        Span::styled(
            format!("anime {}", truncate(&controller.anime_id(), 24)),
            Style::default().fg(MUTED),
        ),
        Span::styled("   ", Style::default()),
        Span::styled(
            state_label(controller.state(), controller.is_loading()),
            Style::default().fg(Color::Yellow),
        ),
    ]))
    .alignment(Alignment::Center)
    .block(panel_block("Now Playing"));
    frame.render_widget(header, chunks[0]);

    let body_chunks = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(30), Constraint::Percentage(70)])
        .split(chunks[1]);
    let details_chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Min(8), Constraint::Length(3)])
        .split(body_chunks[1]);

    let episodes: Vec<ListItem> = (1..=page.episode_count)
        .map(|number| {
            let marker = if number == session.current_episode {
                "● "
            } else {
                "  "
            };
            ListItem::new(format!("{marker}Episode {number}"))
        })
        .collect();
    let list = List::new(episodes)
        .block(panel_block("Episodes"))
        .style(Style::default().fg(TEXT))
        .highlight_style(
            Style::default()
                .bg(ACCENT)
                .fg(Color::Black)
                .add_modifier(Modifier::BOLD),
        )
        .highlight_symbol("▸ ");
    frame.render_stateful_widget(list, body_chunks[0], &mut page.episode_list);

    let player = controller.player();
    let position = player.current_time();
    let duration = player.duration();
    let (episode_title, duration_label) = controller
        .episode()
        .map(|data| (data.title.as_str(), data.duration_label.as_str()))
        .unwrap_or(("-", "-"));
    let details = format!(
        "Title\n{}  ({})\n\nQuality\n{}\n\nSubtitles\n{}\n\nPlayback rate\n{}x\n\nVolume\n{:.0}\n\nFullscreen\n{}",
        truncate(episode_title, 48),
        duration_label,
        session.quality,
        if session.subtitle_enabled { "on" } else { "off" },
        player.playback_rate(),
        player.volume() * 100.0,
        if session.is_fullscreen { "yes" } else { "no" },
    );
    let details = Paragraph::new(details)
        .style(Style::default().fg(TEXT))
        .block(panel_block("Session"));
    frame.render_widget(details, details_chunks[0]);

    let ratio = match duration {
        Some(total) if total > 0.0 => (position / total).clamp(0.0, 1.0),
        _ => 0.0,
    };
    let label = format!(
        "{} / {}",
        format_clock(position),
        duration.map(format_clock).unwrap_or_else(|| "--:--".to_string())
    );
    let progress = Gauge::default()
        .block(panel_block("Position"))
        .gauge_style(
            Style::default()
                .fg(Color::Rgb(130, 190, 255))
                .bg(Color::Black)
                .add_modifier(Modifier::BOLD),
        )
        .label(label)
        .ratio(ratio);
    frame.render_widget(progress, details_chunks[1]);

    let control_bar = controller
        .config()
        .control_bar
        .iter()
        .map(|item| item.label())
        .collect::<Vec<_>>()
        .join(" · ");
    let controls = Paragraph::new(Line::from(vec![
        Span::styled(control_bar, Style::default().fg(TEXT)),
        Span::styled(
            "   space play  ←/→ 10s  s subs  q quality  f full  +/- vol  [/] rate  r resume  Esc quit",
            Style::default().fg(MUTED),
        ),
    ]))
    .alignment(Alignment::Center)
    .block(panel_block("Controls"));
    frame.render_widget(controls, chunks[2]);

    let status_widget = Paragraph::new(page.status.clone())
        .style(status_style(&page.status))
        .block(panel_block("Status"));
    frame.render_widget(status_widget, chunks[3]);

    if let Some(notice) = controller.notice() {
        let text = format!("⚠ {}   [x]", notice.message);
        let width = (text.chars().count() as u16).saturating_add(4);
        let area = frame.area();
        let banner_area = Rect::new(
            area.x + area.width.saturating_sub(width) / 2,
            area.y + 1,
            width.min(area.width),
            3.min(area.height),
        );
        frame.render_widget(Clear, banner_area);
        let banner = Paragraph::new(text)
            .alignment(Alignment::Center)
            .style(
                Style::default()
                    .bg(DANGER)
                    .fg(Color::White)
                    .add_modifier(Modifier::BOLD),
            )
            .block(Block::default().borders(Borders::ALL).border_type(BorderType::Rounded));
        frame.render_widget(banner, banner_area);
    }

    if let Some(modal) = page.modal {
        render_quality_modal(frame, modal, session.quality);
    }
}

fn render_quality_modal(frame: &mut Frame, modal: QualityModal, current: Quality) {
    let mut lines = Vec::new();
    for (idx, quality) in Quality::ALL.iter().enumerate() {
        let marker = if *quality == current { " (current)" } else { "" };
        let style = if idx == modal.selected {
            pill_active()
        } else {
            Style::default().fg(TEXT)
        };
        lines.push(Line::from(Span::styled(format!(" {quality}{marker} "), style)));
    }
    lines.push(Line::from(""));
    lines.push(Line::from(Span::styled(
        "[↑/↓] choose   [Enter] apply   [Esc] close",
        Style::default().fg(MUTED),
    )));

    let popup_area = centered_fixed_rect(48, 10, frame.area());
    render_popup_shadow(frame, popup_area);
    frame.render_widget(Clear, popup_area);
    let popup = Paragraph::new(lines)
        .alignment(Alignment::Center)
        .wrap(Wrap { trim: true })
        .block(modal_block("Select Source"));
    frame.render_widget(popup, popup_area);
}

fn state_label(state: PlaybackState, loading: bool) -> String {
    if loading {
        format!("{} · loading", state.label())
    } else {
        state.label().to_string()
    }
}

fn panel_block(title: &'static str) -> Block<'static> {
    Block::default()
        .borders(Borders::ALL)
        .border_type(BorderType::Rounded)
        .border_style(Style::default().fg(Color::Rgb(125, 135, 150)))
        .title(title)
}

fn modal_block(title: &'static str) -> Block<'static> {
    Block::default()
        .borders(Borders::ALL)
        .border_type(BorderType::Rounded)
        .border_style(
            Style::default()
                .fg(Color::Rgb(160, 190, 235))
                .add_modifier(Modifier::BOLD),
        )
        .title(title)
        .padding(Padding::new(2, 2, 1, 1))
}

fn pill_active() -> Style {
    Style::default()
        .bg(ACCENT)
        .fg(Color::Black)
        .add_modifier(Modifier::BOLD)
}

fn status_style(status: &str) -> Style {
    if status.starts_with("ERROR:") {
        Style::default()
            .fg(Color::Rgb(255, 145, 120))
            .add_modifier(Modifier::BOLD)
    } else if status.starts_with("INFO:") {
        Style::default().fg(Color::Rgb(205, 165, 255))
    } else {
        Style::default().fg(TEXT)
    }
}

fn centered_fixed_rect(width: u16, height: u16, area: Rect) -> Rect {
    let clamped_width = width.min(area.width.max(1));
    let clamped_height = height.min(area.height.max(1));
    let x = area.x + area.width.saturating_sub(clamped_width) / 2;
    let y = area.y + area.height.saturating_sub(clamped_height) / 2;
    Rect::new(x, y, clamped_width, clamped_height)
}

fn render_popup_shadow(frame: &mut Frame, popup_area: Rect) {
    let area = frame.area();
    let shadow = Rect::new(
        (popup_area.x + 1).min(area.x + area.width.saturating_sub(1)),
        (popup_area.y + 1).min(area.y + area.height.saturating_sub(1)),
        popup_area.width.saturating_sub(1),
        popup_area.height.saturating_sub(1),
    );
    if shadow.width == 0 || shadow.height == 0 {
        return;
    }
    let shadow_block = Block::default().style(Style::default().bg(Color::Rgb(14, 16, 24)));
    frame.render_widget(shadow_block, shadow);
}
