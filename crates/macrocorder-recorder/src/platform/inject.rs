//! Input synthesis via enigo

use enigo::{Coordinate, Direction, Enigo, Keyboard, Mouse, Settings};
use macrocorder_core::{BackendFactory, Button, Error, InputBackend, Result};
use std::sync::Arc;

pub struct EnigoBackend {
    enigo: Enigo,
}

impl EnigoBackend {
    pub fn new() -> Result<Self> {
        let enigo = Enigo::new(&Settings::default())
            .map_err(|e| Error::injection_failed("connect", e))?;
        Ok(Self { enigo })
    }

    fn press(&mut self, key: &str, direction: Direction) -> Result<()> {
        let k = enigo_key(key).ok_or_else(|| Error::invalid_key(key))?;
        self.enigo
            .key(k, direction)
            .map_err(|e| Error::injection_failed("key", e))
    }
}

/// Factory for the player; each session connects on its own thread
pub fn enigo_factory() -> BackendFactory {
    Arc::new(|| Ok(Box::new(EnigoBackend::new()?) as Box<dyn InputBackend>))
}

impl InputBackend for EnigoBackend {
    fn move_to(&mut self, x: f64, y: f64) -> Result<()> {
        self.enigo
            .move_mouse(x.round() as i32, y.round() as i32, Coordinate::Abs)
            .map_err(|e| Error::injection_failed("move", e))
    }

    fn button_down(&mut self, button: Button) -> Result<()> {
        self.enigo
            .button(enigo_button(button), Direction::Press)
            .map_err(|e| Error::injection_failed("button press", e))
    }

    fn button_up(&mut self, button: Button) -> Result<()> {
        self.enigo
            .button(enigo_button(button), Direction::Release)
            .map_err(|e| Error::injection_failed("button release", e))
    }

    fn key_down(&mut self, key: &str) -> Result<()> {
        self.press(key, Direction::Press)
    }

    fn key_up(&mut self, key: &str) -> Result<()> {
        self.press(key, Direction::Release)
    }
}

fn enigo_button(button: Button) -> enigo::Button {
    match button {
        Button::Left => enigo::Button::Left,
        Button::Right => enigo::Button::Right,
        Button::Middle => enigo::Button::Middle,
    }
}

fn enigo_key(name: &str) -> Option<enigo::Key> {
    use enigo::Key;

    let mut chars = name.chars();
    if let (Some(c), None) = (chars.next(), chars.next()) {
        return Some(Key::Unicode(c));
    }

    Some(match name {
        "enter" => Key::Return,
        "esc" => Key::Escape,
        "tab" => Key::Tab,
        "space" => Key::Space,
        "backspace" => Key::Backspace,
        "delete" => Key::Delete,
        "shift" | "shift_l" | "shift_r" => Key::Shift,
        "ctrl" | "ctrl_l" | "ctrl_r" => Key::Control,
        "alt" | "alt_l" | "alt_r" | "alt_gr" => Key::Alt,
        "cmd" | "cmd_l" | "cmd_r" => Key::Meta,
        "up" => Key::UpArrow,
        "down" => Key::DownArrow,
        "left" => Key::LeftArrow,
        "right" => Key::RightArrow,
        "home" => Key::Home,
        "end" => Key::End,
        "page_up" => Key::PageUp,
        "page_down" => Key::PageDown,
        "caps_lock" => Key::CapsLock,
        "f1" => Key::F1,
        "f2" => Key::F2,
        "f3" => Key::F3,
        "f4" => Key::F4,
        "f5" => Key::F5,
        "f6" => Key::F6,
        "f7" => Key::F7,
        "f8" => Key::F8,
        "f9" => Key::F9,
        "f10" => Key::F10,
        "f11" => Key::F11,
        "f12" => Key::F12,
        #[cfg(not(target_os = "macos"))]
        "insert" => Key::Insert,
        #[cfg(not(target_os = "macos"))]
        "print_screen" => Key::PrintScr,
        #[cfg(not(target_os = "macos"))]
        "scroll_lock" => Key::ScrollLock,
        #[cfg(not(target_os = "macos"))]
        "num_lock" => Key::Numlock,
        #[cfg(not(target_os = "macos"))]
        "pause" => Key::Pause,
        #[cfg(target_os = "macos")]
        "fn" => Key::Function,
        _ => return None,
    })
}
