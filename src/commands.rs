//! Operator commands from single raw keystrokes.
//!
//! | Key | Command |
//! |---|---|
//! | space | toggle recording (Armed ↔ Engaged) |
//! | `q` / `x` / `z` / Ctrl-C | quit |
//!
//! Keys are read on a dedicated OS thread (crossterm's `event::read` blocks),
//! which toggles the shared [`Recorder`] directly and forwards quit requests
//! to the async side over a channel.

use std::sync::Arc;
use std::thread::JoinHandle;

use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use log::{info, warn};
use tokio::sync::mpsc;

use crate::error::RecorderError;
use crate::recorder::{Recorder, Transition};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    ToggleRecording,
    Quit,
}

/// Map a key press to a command.  Releases and repeats are ignored.
pub fn command_for_key(key: &KeyEvent) -> Option<Command> {
    if key.kind == KeyEventKind::Release {
        return None;
    }
    // In raw mode Ctrl-C is not SIGINT; it arrives as a key event.
    if key.modifiers.contains(KeyModifiers::CONTROL) && key.code == KeyCode::Char('c') {
        return Some(Command::Quit);
    }
    match key.code {
        KeyCode::Char(' ') => Some(Command::ToggleRecording),
        KeyCode::Char('q' | 'x' | 'z') => Some(Command::Quit),
        _ => None,
    }
}

/// Apply a toggle to `recorder` and tell the operator what happened.
pub fn apply_toggle(recorder: &Recorder) {
    match recorder.toggle() {
        Ok(Transition::Started { .. }) => {}
        Ok(Transition::Stopped { .. }) => {
            info!("Stopped.");
            info!("Press [q] / [ctrl+c] to quit …");
            info!("Press [space] to record new data …");
        }
        Err(RecorderError::NotActivated) => {
            info!("Sensor not streaming yet, recording unavailable.");
        }
        Err(e) => warn!("Cannot start recording: {e}"),
    }
}

/// Spawn the keystroke reader.
///
/// The thread exits after sending one [`Command::Quit`] or when the channel
/// closes.  Terminal raw mode is the caller's responsibility.
pub fn spawn_keystroke_thread(
    recorder: Option<Arc<Recorder>>,
    quit_tx: mpsc::UnboundedSender<()>,
) -> JoinHandle<()> {
    std::thread::spawn(move || loop {
        let key = match event::read() {
            Ok(Event::Key(key)) => key,
            Ok(_) => continue,
            Err(e) => {
                warn!("keyboard read failed: {e}");
                let _ = quit_tx.send(());
                break;
            }
        };
        match command_for_key(&key) {
            Some(Command::ToggleRecording) => {
                if let Some(recorder) = &recorder {
                    apply_toggle(recorder);
                }
            }
            Some(Command::Quit) => {
                let _ = quit_tx.send(());
                break;
            }
            None => {}
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn press(code: KeyCode, modifiers: KeyModifiers) -> KeyEvent {
        KeyEvent::new(code, modifiers)
    }

    #[test]
    fn space_toggles_and_quit_keys_quit() {
        let none = KeyModifiers::NONE;
        assert_eq!(
            command_for_key(&press(KeyCode::Char(' '), none)),
            Some(Command::ToggleRecording)
        );
        for c in ['q', 'x', 'z'] {
            assert_eq!(command_for_key(&press(KeyCode::Char(c), none)), Some(Command::Quit));
        }
        assert_eq!(
            command_for_key(&press(KeyCode::Char('c'), KeyModifiers::CONTROL)),
            Some(Command::Quit)
        );
        assert_eq!(command_for_key(&press(KeyCode::Char('c'), none)), None);
        assert_eq!(command_for_key(&press(KeyCode::Enter, none)), None);
    }

    #[test]
    fn key_release_is_ignored() {
        let mut key = press(KeyCode::Char(' '), KeyModifiers::NONE);
        key.kind = KeyEventKind::Release;
        assert_eq!(command_for_key(&key), None);
    }
}
