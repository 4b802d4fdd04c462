mod actions;
mod render;

use std::io;
use std::time::Duration;

use anyhow::{Context, Result};
use crossterm::event::{self, Event, KeyEventKind};
use crossterm::execute;
use crossterm::terminal::{
    EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode,
};
use ratatui::Terminal;
use ratatui::backend::CrosstermBackend;
use ratatui::widgets::ListState;

use crate::db::PreferenceStore;

use super::player::Player;
use super::session::{PlaybackSessionController, Quality};

use self::actions::{KeyOutcome, handle_key, status_error, status_info};
use self::render::draw_page;

pub(crate) const VOLUME_STEP: u8 = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct QualityModal {
    pub(crate) selected: usize,
}

impl QualityModal {
    pub(crate) fn open_at(current: Quality) -> Self {
        let selected = Quality::ALL
            .iter()
            .position(|quality| *quality == current)
            .unwrap_or(0);
        Self { selected }
    }

    pub(crate) fn quality(self) -> Quality {
        Quality::ALL[self.selected.min(Quality::ALL.len() - 1)]
    }
}

/// What the page shows around the controller: episode list selection,
/// the quality modal and the status line.
#[derive(Debug)]
pub(crate) struct PageState {
    pub(crate) episode_count: u32,
    pub(crate) episode_list: ListState,
    pub(crate) modal: Option<QualityModal>,
    pub(crate) status: String,
}

impl PageState {
    pub(crate) fn new(episode_count: u32, current_episode: u32) -> Self {
        let episode_count = episode_count.max(current_episode).max(1);
        let mut episode_list = ListState::default();
        episode_list.select(Some(current_episode.saturating_sub(1) as usize));
        Self {
            episode_count,
            episode_list,
            modal: None,
            status: status_info("Ready."),
        }
    }

    pub(crate) fn selected_episode(&self) -> u32 {
        self.episode_list.selected().map(|idx| idx as u32 + 1).unwrap_or(1)
    }
}

struct TerminalGuard;

impl TerminalGuard {
    fn enter() -> Result<Self> {
        enable_raw_mode().context("failed to enable raw mode")?;
        execute!(io::stdout(), EnterAlternateScreen).context("failed to enter alternate screen")?;
        Ok(Self)
    }
}

impl Drop for TerminalGuard {
    fn drop(&mut self) {
        let _ = disable_raw_mode();
        let _ = execute!(io::stdout(), LeaveAlternateScreen);
    }
}

pub(crate) fn run_tui<P: Player, S: PreferenceStore>(
    controller: &mut PlaybackSessionController<P, S>,
    episode_count: u32,
) -> Result<()> {
    let _guard = TerminalGuard::enter()?;
    let mut terminal = Terminal::new(CrosstermBackend::new(io::stdout()))
        .context("failed to initialize terminal backend")?;
    terminal.clear()?;

    let mut page = PageState::new(episode_count, controller.session().current_episode);

    loop {
        controller.pump();
        terminal.draw(|frame| draw_page(frame, controller, &mut page))?;

        if !event::poll(Duration::from_millis(200))? {
            continue;
        }
        let Event::Key(key) = event::read()? else {
            continue;
        };
        if key.kind != KeyEventKind::Press {
            continue;
        }

        match handle_key(controller, &mut page, key) {
            Ok(KeyOutcome::Continue) => {}
            Ok(KeyOutcome::Quit) => break,
            Err(err) => page.status = status_error(&format!("{err:#}")),
        }
    }

    if let Err(err) = controller.save_watching_progress() {
        log::warn!("failed to save progress on exit: {err:#}");
    }
    terminal.show_cursor()?;
    Ok(())
}
