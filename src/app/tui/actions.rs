use anyhow::Result;
use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};

use crate::db::PreferenceStore;

use super::super::player::Player;
use super::super::session::{DEFAULT_SKIP_SECONDS, PlaybackSessionController, Quality};
use super::{PageState, QualityModal, VOLUME_STEP};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum KeyOutcome {
    Continue,
    Quit,
}

pub(crate) fn status_info(msg: &str) -> String {
    format!("INFO: {msg}")
}

pub(crate) fn status_error(msg: &str) -> String {
    format!("ERROR: {msg}")
}

/// Moves `step` positions through `rates` from the entry closest to
/// `current`, stopping at either end.
pub(crate) fn step_rate(rates: &[f64], current: f64, step: isize) -> f64 {
    let Some(closest) = rates
        .iter()
        .enumerate()
        .min_by(|(_, a), (_, b)| {
            (*a - current)
                .abs()
                .partial_cmp(&(*b - current).abs())
                .unwrap_or(std::cmp::Ordering::Equal)
        })
        .map(|(idx, _)| idx)
    else {
        return current;
    };
    let target = closest
        .saturating_add_signed(step)
        .min(rates.len().saturating_sub(1));
    rates[target]
}

pub(crate) fn handle_key<P: Player, S: PreferenceStore>(
    controller: &mut PlaybackSessionController<P, S>,
    page: &mut PageState,
    key: KeyEvent,
) -> Result<KeyOutcome> {
    if key.modifiers.contains(KeyModifiers::CONTROL) && key.code == KeyCode::Char('c') {
        return Ok(KeyOutcome::Quit);
    }

    if let Some(modal) = page.modal.as_mut() {
        match key.code {
            KeyCode::Up | KeyCode::Char('k') => modal.selected = modal.selected.saturating_sub(1),
            KeyCode::Down | KeyCode::Char('j') => {
                modal.selected = (modal.selected + 1).min(Quality::ALL.len() - 1)
            }
            KeyCode::Enter => {
                let quality = modal.quality();
                page.modal = None;
                controller.change_quality(quality)?;
                page.status = status_info(&format!("Quality set to {quality}."));
            }
            KeyCode::Esc | KeyCode::Char('q') => page.modal = None,
            _ => {}
        }
        return Ok(KeyOutcome::Continue);
    }

    match key.code {
        KeyCode::Esc => return Ok(KeyOutcome::Quit),
        KeyCode::Char(' ') => controller.toggle_play()?,
        KeyCode::Left => controller.skip_backward(DEFAULT_SKIP_SECONDS)?,
        KeyCode::Right => controller.skip_forward(DEFAULT_SKIP_SECONDS)?,
        KeyCode::Char('s') => {
            controller.toggle_subtitle()?;
            let state = if controller.session().subtitle_enabled {
                "on"
            } else {
                "off"
            };
            page.status = status_info(&format!("Subtitles {state}."));
        }
        KeyCode::Char('q') => {
            page.modal = Some(QualityModal::open_at(controller.session().quality));
        }
        KeyCode::Char('f') => controller.toggle_fullscreen()?,
        KeyCode::Up | KeyCode::Char('k') => {
            let selected = page.episode_list.selected().unwrap_or(0);
            page.episode_list.select(Some(selected.saturating_sub(1)));
        }
        KeyCode::Down | KeyCode::Char('j') => {
            let last = page.episode_count.saturating_sub(1) as usize;
            let selected = page.episode_list.selected().unwrap_or(0);
            page.episode_list.select(Some((selected + 1).min(last)));
        }
        KeyCode::Enter => {
            let episode = page.selected_episode();
            controller.load_episode(episode);
            page.status = status_info(&format!("Loading episode {episode}..."));
        }
        KeyCode::Char('+') | KeyCode::Char('=') => {
            let volume = controller.session().volume.saturating_add(VOLUME_STEP);
            controller.set_volume(volume.min(100))?;
        }
        KeyCode::Char('-') => {
            let volume = controller.session().volume.saturating_sub(VOLUME_STEP);
            controller.set_volume(volume)?;
        }
        KeyCode::Char('[') | KeyCode::Char(']') => {
            let step = if key.code == KeyCode::Char(']') { 1 } else { -1 };
            let rate = step_rate(
                &controller.config().playback_rates,
                controller.session().playback_rate,
                step,
            );
            controller.set_playback_rate(rate)?;
            page.status = status_info(&format!("Playback rate {rate}x."));
        }
        KeyCode::Char('r') => {
            page.status = if controller.load_watching_progress()? {
                status_info("Restored saved position.")
            } else {
                status_info("No saved position for this episode.")
            };
        }
        KeyCode::Char('x') => controller.dismiss_notice(),
        _ => {}
    }
    Ok(KeyOutcome::Continue)
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};

    use super::super::super::session::Quality;
    use super::super::super::tests::{TestController, ready_controller};
    use super::super::PageState;
    use super::{KeyOutcome, handle_key, step_rate};

    fn press(controller: &mut TestController, page: &mut PageState, code: KeyCode) -> KeyOutcome {
        handle_key(controller, page, KeyEvent::new(code, KeyModifiers::NONE)).expect("key")
    }

    #[test]
    fn step_rate_moves_from_closest_entry() {
        let rates = [0.5, 1.0, 1.25, 1.5, 2.0];
        assert_eq!(step_rate(&rates, 1.0, 1), 1.25);
        assert_eq!(step_rate(&rates, 1.0, -1), 0.5);
        assert_eq!(step_rate(&rates, 1.3, 1), 1.5);
        assert_eq!(step_rate(&rates, 2.0, 1), 2.0);
        assert_eq!(step_rate(&rates, 0.5, -1), 0.5);
        assert_eq!(step_rate(&[], 1.75, 1), 1.75);
    }

    #[test]
    fn quit_keys() {
        let mut controller = ready_controller();
        let mut page = PageState::new(12, 1);

        assert_eq!(press(&mut controller, &mut page, KeyCode::Esc), KeyOutcome::Quit);
        let ctrl_c = KeyEvent::new(KeyCode::Char('c'), KeyModifiers::CONTROL);
        assert_eq!(
            handle_key(&mut controller, &mut page, ctrl_c).expect("key"),
            KeyOutcome::Quit
        );
    }

    #[test]
    fn quality_modal_applies_selection() {
        let mut controller = ready_controller();
        let mut page = PageState::new(12, 1);

        press(&mut controller, &mut page, KeyCode::Char('q'));
        assert_eq!(page.modal.map(|modal| modal.quality()), Some(Quality::Auto));
        press(&mut controller, &mut page, KeyCode::Down);
        press(&mut controller, &mut page, KeyCode::Down);
        press(&mut controller, &mut page, KeyCode::Down);
        assert_eq!(
            press(&mut controller, &mut page, KeyCode::Enter),
            KeyOutcome::Continue
        );

        assert!(page.modal.is_none());
        assert_eq!(controller.session().quality, Quality::P1080);
        assert!(controller.settle(Duration::from_secs(2)));
        assert_eq!(controller.player().source_url(), Some("hd-ep1"));
        assert_eq!(page.status, "INFO: Quality set to 1080p.");
    }

    #[test]
    fn quality_modal_esc_closes_without_change() {
        let mut controller = ready_controller();
        let mut page = PageState::new(12, 1);

        press(&mut controller, &mut page, KeyCode::Char('q'));
        press(&mut controller, &mut page, KeyCode::Down);
        assert_eq!(press(&mut controller, &mut page, KeyCode::Esc), KeyOutcome::Continue);

        assert!(page.modal.is_none());
        assert_eq!(controller.session().quality, Quality::Auto);
        assert!(!controller.is_loading());
    }

    #[test]
    fn episode_list_selection_loads_episode() {
        let mut controller = ready_controller();
        let mut page = PageState::new(3, 1);

        for _ in 0..5 {
            press(&mut controller, &mut page, KeyCode::Char('j'));
        }
        assert_eq!(page.selected_episode(), 3);
        press(&mut controller, &mut page, KeyCode::Up);
        press(&mut controller, &mut page, KeyCode::Enter);

        assert_eq!(controller.session().current_episode, 2);
        assert!(controller.settle(Duration::from_secs(2)));
        assert_eq!(controller.player().source_url(), Some("auto-ep2"));
    }

    #[test]
    fn playback_keys_drive_controller() {
        let mut controller = ready_controller();
        let mut page = PageState::new(12, 1);
        controller.load_episode(1);
        assert!(controller.settle(Duration::from_secs(2)));
        controller.player_mut().time = 100.0;

        press(&mut controller, &mut page, KeyCode::Right);
        press(&mut controller, &mut page, KeyCode::Left);
        press(&mut controller, &mut page, KeyCode::Left);
        assert_eq!(controller.player().seeks, vec![110.0, 100.0, 90.0]);

        press(&mut controller, &mut page, KeyCode::Char(' '));
        assert!(!controller.player().paused);

        press(&mut controller, &mut page, KeyCode::Char('s'));
        assert!(!controller.session().subtitle_enabled);
        assert_eq!(page.status, "INFO: Subtitles off.");

        press(&mut controller, &mut page, KeyCode::Char('f'));
        assert_eq!(controller.player().fullscreen_calls.len(), 1);
    }

    #[test]
    fn volume_and_rate_keys_step_within_bounds() {
        let mut controller = ready_controller();
        let mut page = PageState::new(12, 1);

        press(&mut controller, &mut page, KeyCode::Char('+'));
        assert_eq!(controller.session().volume, 100);
        press(&mut controller, &mut page, KeyCode::Char('-'));
        press(&mut controller, &mut page, KeyCode::Char('-'));
        assert_eq!(controller.session().volume, 90);

        press(&mut controller, &mut page, KeyCode::Char(']'));
        assert_eq!(controller.session().playback_rate, 1.25);
        press(&mut controller, &mut page, KeyCode::Char('['));
        press(&mut controller, &mut page, KeyCode::Char('['));
        assert_eq!(controller.session().playback_rate, 0.5);
        assert_eq!(page.status, "INFO: Playback rate 0.5x.");
    }
}
