//! Global input capture via rdev
//!
//! `rdev::listen` cannot be stopped once running, so one listener thread is
//! started per process on first use and fans events out to subscribers.
//! Cancelling a subscription only detaches its sink.

use crate::source::{EventSink, InputSource, Subscription};
use crossbeam_channel::{bounded, RecvTimeoutError, TrySendError};
use macrocorder_core::{Button, Error, KeyInput, RawEvent, Result, Stamped};
use parking_lot::Mutex;
use rdev::{EventType, Key};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::OnceLock;
use std::thread;
use std::time::Duration;
use tracing::{debug, error, info};

/// How long `subscribe` waits for the listener to fail fast
const STARTUP_GRACE: Duration = Duration::from_millis(100);

static HUB: OnceLock<Hub> = OnceLock::new();

fn hub() -> &'static Hub {
    HUB.get_or_init(Hub::default)
}

#[derive(Default)]
struct Hub {
    subscribers: Mutex<Vec<(u64, EventSink)>>,
    next_id: AtomicU64,
    listening: AtomicBool,
    /// rdev reports button events without a position
    cursor: Mutex<(f64, f64)>,
}

impl Hub {
    fn ensure_listening(&'static self) -> Result<()> {
        if self.listening.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        let (err_tx, err_rx) = bounded::<Error>(1);
        let spawned = thread::Builder::new()
            .name("rdev-listener".into())
            .spawn(move || {
                info!("global input listener running");
                if let Err(e) = rdev::listen(|event| hub().dispatch(&event.event_type)) {
                    error!(error = ?e, "global input listener stopped");
                    hub().listening.store(false, Ordering::SeqCst);
                    let _ = err_tx.send(listen_error(e));
                }
            });
        if let Err(e) = spawned {
            self.listening.store(false, Ordering::SeqCst);
            return Err(Error::capture_failed(e));
        }

        match err_rx.recv_timeout(STARTUP_GRACE) {
            Ok(e) => Err(e),
            Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => Ok(()),
        }
    }

    fn dispatch(&self, event_type: &EventType) {
        let Some(raw) = self.translate(event_type) else {
            return;
        };
        let stamped = Stamped::now(raw);
        self.subscribers
            .lock()
            .retain(|(_, sink)| match sink.try_send(stamped.clone()) {
                Ok(()) => true,
                Err(TrySendError::Full(_)) => {
                    debug!("subscriber queue full, dropping event");
                    true
                }
                Err(TrySendError::Disconnected(_)) => false,
            });
    }

    fn translate(&self, event_type: &EventType) -> Option<RawEvent> {
        match *event_type {
            EventType::MouseMove { x, y } => {
                *self.cursor.lock() = (x, y);
                Some(RawEvent::Move { x, y })
            }
            EventType::ButtonPress(b) => self.button(b, true),
            EventType::ButtonRelease(b) => self.button(b, false),
            EventType::KeyPress(k) => Some(RawEvent::KeyPress(key_input(k))),
            EventType::KeyRelease(k) => Some(RawEvent::KeyRelease(key_input(k))),
            _ => None,
        }
    }

    fn button(&self, b: rdev::Button, pressed: bool) -> Option<RawEvent> {
        let button = match b {
            rdev::Button::Left => Button::Left,
            rdev::Button::Right => Button::Right,
            rdev::Button::Middle => Button::Middle,
            rdev::Button::Unknown(code) => {
                debug!(code, "ignoring unsupported mouse button");
                return None;
            }
        };
        let (x, y) = *self.cursor.lock();
        Some(RawEvent::Button {
            button,
            x,
            y,
            pressed,
        })
    }

    fn attach(&self, sink: EventSink) -> u64 {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        self.subscribers.lock().push((id, sink));
        id
    }

    fn detach(&self, id: u64) {
        self.subscribers.lock().retain(|(sid, _)| *sid != id);
    }
}

/// macOS refuses the event tap until the process is trusted for accessibility
fn listen_error(e: rdev::ListenError) -> Error {
    match e {
        rdev::ListenError::EventTapError => {
            Error::permission_denied("the OS refused the global event tap")
        }
        other => Error::capture_failed(format!("{:?}", other)),
    }
}

/// Process-wide OS input listener
#[derive(Debug, Clone, Copy, Default)]
pub struct RdevSource;

impl RdevSource {
    pub fn new() -> Self {
        Self
    }
}

impl InputSource for RdevSource {
    fn subscribe(&self, sink: EventSink) -> Result<Subscription> {
        let hub = hub();
        hub.ensure_listening()?;
        let id = hub.attach(sink);
        debug!(id, "input subscriber attached");
        Ok(Subscription::new(move || {
            hub.detach(id);
            debug!(id, "input subscriber detached");
            Ok(())
        }))
    }
}

/// Unshifted character for character keys, canonical name otherwise.
/// Unmapped keys produce an empty input, which normalization rejects.
fn key_input(key: Key) -> KeyInput {
    let ch = match key {
        Key::KeyA => 'a', Key::KeyB => 'b', Key::KeyC => 'c', Key::KeyD => 'd',
        Key::KeyE => 'e', Key::KeyF => 'f', Key::KeyG => 'g', Key::KeyH => 'h',
        Key::KeyI => 'i', Key::KeyJ => 'j', Key::KeyK => 'k', Key::KeyL => 'l',
        Key::KeyM => 'm', Key::KeyN => 'n', Key::KeyO => 'o', Key::KeyP => 'p',
        Key::KeyQ => 'q', Key::KeyR => 'r', Key::KeyS => 's', Key::KeyT => 't',
        Key::KeyU => 'u', Key::KeyV => 'v', Key::KeyW => 'w', Key::KeyX => 'x',
        Key::KeyY => 'y', Key::KeyZ => 'z',
        Key::Num0 | Key::Kp0 => '0', Key::Num1 | Key::Kp1 => '1',
        Key::Num2 | Key::Kp2 => '2', Key::Num3 | Key::Kp3 => '3',
        Key::Num4 | Key::Kp4 => '4', Key::Num5 | Key::Kp5 => '5',
        Key::Num6 | Key::Kp6 => '6', Key::Num7 | Key::Kp7 => '7',
        Key::Num8 | Key::Kp8 => '8', Key::Num9 | Key::Kp9 => '9',
        Key::BackQuote => '`', Key::Minus | Key::KpMinus => '-', Key::Equal => '=',
        Key::LeftBracket => '[', Key::RightBracket => ']', Key::SemiColon => ';',
        Key::Quote => '\'', Key::BackSlash | Key::IntlBackslash => '\\',
        Key::Comma => ',', Key::Dot => '.', Key::Slash | Key::KpDivide => '/',
        Key::KpPlus => '+', Key::KpMultiply => '*',
        other => return named_key(other).map(KeyInput::named).unwrap_or_default(),
    };
    KeyInput::char(ch)
}

fn named_key(key: Key) -> Option<&'static str> {
    Some(match key {
        Key::Alt => "alt",
        Key::AltGr => "alt_gr",
        Key::Backspace => "backspace",
        Key::CapsLock => "caps_lock",
        Key::ControlLeft => "ctrl_l",
        Key::ControlRight => "ctrl_r",
        Key::Delete | Key::KpDelete => "delete",
        Key::DownArrow => "down",
        Key::End => "end",
        Key::Escape => "esc",
        Key::F1 => "f1",
        Key::F2 => "f2",
        Key::F3 => "f3",
        Key::F4 => "f4",
        Key::F5 => "f5",
        Key::F6 => "f6",
        Key::F7 => "f7",
        Key::F8 => "f8",
        Key::F9 => "f9",
        Key::F10 => "f10",
        Key::F11 => "f11",
        Key::F12 => "f12",
        Key::Home => "home",
        Key::LeftArrow => "left",
        Key::MetaLeft => "cmd",
        Key::MetaRight => "cmd_r",
        Key::PageDown => "page_down",
        Key::PageUp => "page_up",
        Key::Return | Key::KpReturn => "enter",
        Key::RightArrow => "right",
        Key::ShiftLeft => "shift",
        Key::ShiftRight => "shift_r",
        Key::Space => "space",
        Key::Tab => "tab",
        Key::UpArrow => "up",
        Key::PrintScreen => "print_screen",
        Key::ScrollLock => "scroll_lock",
        Key::Pause => "pause",
        Key::NumLock => "num_lock",
        Key::Insert => "insert",
        Key::Function => "fn",
        _ => return None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use macrocorder_core::{normalize_key, ErrorCode};

    #[test]
    fn character_keys_normalize_to_chars() {
        assert_eq!(normalize_key(&key_input(Key::KeyA)).unwrap(), "a");
        assert_eq!(normalize_key(&key_input(Key::Kp7)).unwrap(), "7");
    }

    #[test]
    fn named_keys_normalize_to_names() {
        assert_eq!(normalize_key(&key_input(Key::F9)).unwrap(), "f9");
        assert_eq!(normalize_key(&key_input(Key::Return)).unwrap(), "enter");
        assert_eq!(normalize_key(&key_input(Key::ShiftLeft)).unwrap(), "shift");
    }

    #[test]
    fn refused_event_tap_is_a_permission_error() {
        let e = listen_error(rdev::ListenError::EventTapError);
        assert_eq!(e.code, ErrorCode::PermissionDenied);
        let e = listen_error(rdev::ListenError::MissingDisplayError);
        assert_eq!(e.code, ErrorCode::CaptureFailed);
        assert!(e.message.contains("MissingDisplayError"));
    }

    #[test]
    fn unknown_keys_are_rejected() {
        assert!(normalize_key(&key_input(Key::Unknown(999))).is_err());
    }
}
