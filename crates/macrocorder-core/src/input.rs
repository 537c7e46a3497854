//! Raw input model, key normalization and the synthesis seam

use crate::action::Button;
use crate::error::{Error, Result};
use std::time::Instant;

/// Raw event as delivered by a capture listener
#[derive(Debug, Clone, PartialEq)]
pub enum RawEvent {
    Move { x: f64, y: f64 },
    Button { button: Button, x: f64, y: f64, pressed: bool },
    KeyPress(KeyInput),
    KeyRelease(KeyInput),
}

/// Raw event with the monotonic time it was observed
#[derive(Debug, Clone, PartialEq)]
pub struct Stamped<T> {
    pub at: Instant,
    pub event: T,
}

impl<T> Stamped<T> {
    pub fn new(at: Instant, event: T) -> Self {
        Self { at, event }
    }

    pub fn now(event: T) -> Self {
        Self::new(Instant::now(), event)
    }
}

/// Key identity as reported by the platform: a printable char, a named key, or both
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct KeyInput {
    pub ch: Option<char>,
    pub name: Option<String>,
}

impl KeyInput {
    pub fn char(c: char) -> Self {
        Self {
            ch: Some(c),
            name: None,
        }
    }

    pub fn named(name: impl Into<String>) -> Self {
        Self {
            ch: None,
            name: Some(name.into()),
        }
    }
}

/// Normalize a key to the name used in the action log and the ignore-set.
///
/// Printable characters are lower-cased; named keys are reduced to a
/// canonical lower-case name.
pub fn normalize_key(key: &KeyInput) -> Result<String> {
    if let Some(c) = key.ch.filter(|c| !c.is_control()) {
        return Ok(c.to_lowercase().collect());
    }
    let raw = key.name.as_deref().map(str::trim).unwrap_or_default();
    let raw = raw.strip_prefix("Key.").unwrap_or(raw);
    if raw.is_empty() {
        return Err(Error::invalid_key(&format!("{:?}", key)));
    }
    Ok(canonical_name(&raw.to_lowercase()))
}

/// Normalize a key name typed by a human (config files, CLI flags)
pub fn normalize_key_name(name: &str) -> Result<String> {
    let mut chars = name.chars();
    match (chars.next(), chars.next()) {
        (Some(c), None) => normalize_key(&KeyInput::char(c)),
        _ => normalize_key(&KeyInput::named(name)),
    }
}

fn canonical_name(name: &str) -> String {
    let name = name.replace(['-', ' '], "_");
    match name.as_str() {
        "return" => "enter",
        "escape" => "esc",
        "control" => "ctrl",
        "control_l" | "lctrl" => "ctrl_l",
        "control_r" | "rctrl" => "ctrl_r",
        "option" => "alt",
        "command" | "super" | "meta" | "win" | "windows" => "cmd",
        "del" => "delete",
        "pageup" | "pgup" => "page_up",
        "pagedown" | "pgdn" => "page_down",
        "capslock" => "caps_lock",
        "arrowup" => "up",
        "arrowdown" => "down",
        "arrowleft" => "left",
        "arrowright" => "right",
        other => other,
    }
    .to_string()
}

/// Synthesis seam used by the player. Key names are normalized names.
pub trait InputBackend {
    fn move_to(&mut self, x: f64, y: f64) -> Result<()>;
    fn button_down(&mut self, button: Button) -> Result<()>;
    fn button_up(&mut self, button: Button) -> Result<()>;
    fn key_down(&mut self, key: &str) -> Result<()>;
    fn key_up(&mut self, key: &str) -> Result<()>;
}

impl<B: InputBackend + ?Sized> InputBackend for Box<B> {
    fn move_to(&mut self, x: f64, y: f64) -> Result<()> {
        (**self).move_to(x, y)
    }
    fn button_down(&mut self, button: Button) -> Result<()> {
        (**self).button_down(button)
    }
    fn button_up(&mut self, button: Button) -> Result<()> {
        (**self).button_up(button)
    }
    fn key_down(&mut self, key: &str) -> Result<()> {
        (**self).key_down(key)
    }
    fn key_up(&mut self, key: &str) -> Result<()> {
        (**self).key_up(key)
    }
}

/// Builds a backend on the thread that will drive it
pub type BackendFactory =
    std::sync::Arc<dyn Fn() -> Result<Box<dyn InputBackend>> + Send + Sync>;
