//! crossterm key mapping for terminal front-ends.

use crossterm::event::{Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};

use crate::console::ConsoleKey;

/// Map a key event to a console key.
///
/// Releases and keys the console has no use for map to `None`.
#[must_use]
pub fn console_key(key: &KeyEvent) -> Option<ConsoleKey> {
    if key.kind == KeyEventKind::Release {
        return None;
    }
    if key.modifiers.contains(KeyModifiers::CONTROL) {
        return match key.code {
            KeyCode::Char('c') => Some(ConsoleKey::Interrupt),
            KeyCode::Char('d') => Some(ConsoleKey::EndOfInput),
            KeyCode::Char('l') => Some(ConsoleKey::ClearScreen),
            KeyCode::Char('a') => Some(ConsoleKey::Home),
            KeyCode::Char('e') => Some(ConsoleKey::End),
            _ => None,
        };
    }
    match key.code {
        KeyCode::Char(c) => Some(ConsoleKey::Char(c)),
        KeyCode::Tab => Some(ConsoleKey::Char('\t')),
        KeyCode::Enter => Some(ConsoleKey::Enter),
        KeyCode::Backspace => Some(ConsoleKey::Backspace),
        KeyCode::Delete => Some(ConsoleKey::Delete),
        KeyCode::Left => Some(ConsoleKey::Left),
        KeyCode::Right => Some(ConsoleKey::Right),
        KeyCode::Home => Some(ConsoleKey::Home),
        KeyCode::End => Some(ConsoleKey::End),
        KeyCode::Up => Some(ConsoleKey::Up),
        KeyCode::Down => Some(ConsoleKey::Down),
        _ => None,
    }
}

/// Map any terminal event, ignoring everything but key presses.
#[must_use]
pub fn event_key(event: &Event) -> Option<ConsoleKey> {
    match event {
        Event::Key(key) => console_key(key),
        _ => None,
    }
}

/// Whether a key should quit the front-end (Ctrl-Q or Esc).
#[must_use]
pub fn is_quit(key: &KeyEvent) -> bool {
    key.kind != KeyEventKind::Release
        && (key.code == KeyCode::Esc
            || (key.code == KeyCode::Char('q') && key.modifiers.contains(KeyModifiers::CONTROL)))
}
