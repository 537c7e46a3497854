//! Capture state machine: raw events in, finalized actions out
//!
//! Clock-injected and free of threads so every rule can be driven with
//! synthetic timestamps. The recorder actor owns exactly one of these.

use macrocorder_core::input::normalize_key;
use macrocorder_core::{
    Action, ActionKind, Button, KeyInput, Point, RawEvent, RecorderConfig, ScreenLookup, Stamped,
};
use std::collections::{HashMap, HashSet};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Pending run of pointer samples on one screen
#[derive(Debug)]
struct MoveBlock {
    path: Vec<Point>,
    started: Instant,
    last: Instant,
    screen: String,
}

/// Button held since `started`
#[derive(Debug)]
struct DragAccumulator {
    button: Button,
    origin: Point,
    path: Vec<Point>,
    started: Instant,
    screen: String,
}

#[derive(Debug)]
pub struct CaptureSession {
    pause: Duration,
    drag_threshold: f64,
    ignore: HashSet<String>,
    move_block: Option<MoveBlock>,
    drag: Option<DragAccumulator>,
    pressed: HashMap<String, Instant>,
}

impl CaptureSession {
    pub fn new(config: &RecorderConfig, ignore: HashSet<String>) -> Self {
        Self {
            pause: config.pause_threshold(),
            drag_threshold: config.drag_threshold_px,
            ignore,
            move_block: None,
            drag: None,
            pressed: HashMap::new(),
        }
    }

    /// Feed one raw event; returns the actions it finalized, in flush order
    pub fn handle(&mut self, ev: Stamped<RawEvent>, screens: &dyn ScreenLookup) -> Vec<Action> {
        let mut out = Vec::new();
        let at = ev.at;
        match ev.event {
            RawEvent::Move { x, y } => self.on_move(x, y, at, screens, &mut out),
            RawEvent::Button { button, x, y, pressed: true } => {
                self.on_press(button, x, y, at, screens, &mut out)
            }
            RawEvent::Button { button, x, y, pressed: false } => {
                self.on_release(button, x, y, at, &mut out)
            }
            RawEvent::KeyPress(key) => self.on_key_press(&key, at, &mut out),
            RawEvent::KeyRelease(key) => self.on_key_release(&key, at, &mut out),
        }
        out
    }

    /// Watchdog tick: flush a move block idle for longer than the pause threshold
    pub fn flush_idle(&mut self, now: Instant) -> Option<Action> {
        let idle = self
            .move_block
            .as_ref()
            .is_some_and(|b| now.saturating_duration_since(b.last) > self.pause);
        if idle {
            self.flush_move()
        } else {
            None
        }
    }

    /// End of session: flush the pending move block, then emit keys still
    /// held as zero-duration presses in press order. An open drag is dropped.
    pub fn finish(&mut self) -> Vec<Action> {
        if let Some(drag) = self.drag.take() {
            debug!(button = %drag.button, "discarding unreleased button");
        }
        let mut out: Vec<Action> = self.flush_move().into_iter().collect();

        let mut held: Vec<(String, Instant)> = self.pressed.drain().collect();
        held.sort_by_key(|(_, at)| *at);
        if !held.is_empty() {
            debug!(keys = held.len(), "keys still held at stop");
        }
        out.extend(
            held.into_iter()
                .map(|(key, _)| Action::new(ActionKind::Key { key, duration: 0.0 })),
        );
        out
    }

    pub fn has_pending_move(&self) -> bool {
        self.move_block.is_some()
    }

    fn on_move(&mut self, x: f64, y: f64, at: Instant, screens: &dyn ScreenLookup, out: &mut Vec<Action>) {
        if let Some(drag) = self.drag.as_mut() {
            drag.path.push((x, y));
            return;
        }

        let screen = screens.screen_at(x, y);
        if let Some(block) = self.move_block.as_mut() {
            let gap = at.saturating_duration_since(block.last);
            if gap <= self.pause && block.screen == screen {
                block.path.push((x, y));
                block.last = at;
                return;
            }
        }

        out.extend(self.flush_move());
        self.move_block = Some(MoveBlock {
            path: vec![(x, y)],
            started: at,
            last: at,
            screen,
        });
    }

    fn on_press(
        &mut self,
        button: Button,
        x: f64,
        y: f64,
        at: Instant,
        screens: &dyn ScreenLookup,
        out: &mut Vec<Action>,
    ) {
        out.extend(self.flush_move());
        if let Some(held) = &self.drag {
            debug!(held = %held.button, pressed = %button, "ignoring press while another button is held");
            return;
        }
        self.drag = Some(DragAccumulator {
            button,
            origin: (x, y),
            path: vec![(x, y)],
            started: at,
            screen: screens.screen_at(x, y),
        });
    }

    fn on_release(&mut self, button: Button, x: f64, y: f64, at: Instant, out: &mut Vec<Action>) {
        out.extend(self.flush_move());
        let drag = match self.drag.take() {
            Some(d) if d.button == button => d,
            other => {
                self.drag = other;
                debug!(%button, "release without matching press");
                return;
            }
        };

        let duration = seconds(at.saturating_duration_since(drag.started));
        let (ox, oy) = drag.origin;
        let travelled = (ox - x).abs() > self.drag_threshold || (oy - y).abs() > self.drag_threshold;

        let kind = if drag.path.len() > 1 && travelled {
            ActionKind::Drag {
                button,
                path: drag.path,
                duration,
                screen: drag.screen,
            }
        } else {
            ActionKind::Click {
                button,
                x,
                y,
                duration,
                screen: drag.screen,
            }
        };
        out.push(Action::new(kind));
    }

    fn on_key_press(&mut self, key: &KeyInput, at: Instant, out: &mut Vec<Action>) {
        let Some(name) = self.key_name(key) else {
            return;
        };
        out.extend(self.flush_move());
        // OS auto-repeat re-sends presses; keep the first
        self.pressed.entry(name).or_insert(at);
    }

    fn on_key_release(&mut self, key: &KeyInput, at: Instant, out: &mut Vec<Action>) {
        let Some(name) = self.key_name(key) else {
            return;
        };
        let duration = self
            .pressed
            .remove(&name)
            .map(|t| seconds(at.saturating_duration_since(t)))
            .unwrap_or(0.0);
        out.push(Action::new(ActionKind::Key { key: name, duration }));
    }

    /// Normalized name, or `None` for malformed and ignored keys
    fn key_name(&self, key: &KeyInput) -> Option<String> {
        match normalize_key(key) {
            Ok(name) if self.ignore.contains(&name) => None,
            Ok(name) => Some(name),
            Err(e) => {
                warn!(error = %e, "skipping unparseable key event");
                None
            }
        }
    }

    fn flush_move(&mut self) -> Option<Action> {
        let block = self.move_block.take()?;
        if block.path.len() < 2 {
            return None;
        }
        Some(Action::new(ActionKind::Move {
            duration: seconds(block.last.saturating_duration_since(block.started)),
            path: block.path,
            screen: block.screen,
        }))
    }
}

/// Seconds rounded to milliseconds
fn seconds(d: Duration) -> f64 {
    (d.as_secs_f64() * 1000.0).round() / 1000.0
}
