//! Macro replay with reconstructed timing
//!
//! Each `play` runs on its own worker thread and returns immediately. Timing
//! inside a path uses a sleep-then-spin wait against `Instant`, polling the
//! session's cancel flag on every iteration.

use crossbeam_channel::{unbounded, Receiver};
use macrocorder_core::{Action, ActionKind, BackendFactory, Button, Error, InputBackend, Point, Result};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// Pause after every action, independent of speed
pub const ACTION_GAP: Duration = Duration::from_millis(20);
/// Pause between repeat passes
pub const PASS_GAP: Duration = Duration::from_millis(20);
/// Hold after pressing before the first drag sample
pub const DRAG_PRESS_SETTLE: Duration = Duration::from_millis(15);
/// Hold after the last drag sample before releasing
pub const DRAG_RELEASE_SETTLE: Duration = Duration::from_millis(10);
/// Minimum per-sample spacing at speed 1.0
pub const MOVE_STEP_FLOOR: Duration = Duration::from_millis(1);
pub const DRAG_STEP_FLOOR: Duration = Duration::from_millis(5);

const SPIN_WINDOW: Duration = Duration::from_millis(2);
const SLEEP_QUANTUM: Duration = Duration::from_micros(500);

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlayOptions {
    /// Time divisor; must be finite and > 0
    pub speed: f64,
    /// Number of passes; 0 loops until stopped
    pub repeat: u32,
    /// First pass starts at this index; later passes start at 0
    pub start_offset: usize,
}

impl Default for PlayOptions {
    fn default() -> Self {
        Self {
            speed: 1.0,
            repeat: 1,
            start_offset: 0,
        }
    }
}

/// Progress notifications for hosts that run their own event loop
#[derive(Debug, Clone, PartialEq)]
pub enum PlaybackEvent {
    Step { index: usize, action: Action },
    Done,
}

struct Session {
    cancel: Arc<AtomicBool>,
    worker: thread::JoinHandle<()>,
}

impl Session {
    fn stop(self) {
        self.cancel.store(true, Ordering::SeqCst);
        // on_done may call back into the player from the worker itself
        if self.worker.thread().id() == thread::current().id() {
            return;
        }
        if self.worker.join().is_err() {
            error!("playback worker panicked");
        }
    }
}

/// Fires `on_done` exactly once, whichever way the worker exits
struct DoneGuard(Option<Box<dyn FnOnce() + Send>>);

impl Drop for DoneGuard {
    fn drop(&mut self) {
        if let Some(f) = self.0.take() {
            f();
        }
    }
}

/// Replays action lists
pub struct Player {
    factory: BackendFactory,
    session: Mutex<Option<Session>>,
}

impl Player {
    pub fn new(factory: BackendFactory) -> Self {
        Self {
            factory,
            session: Mutex::new(None),
        }
    }

    /// Start replaying `actions`. Any running session is stopped first.
    ///
    /// `on_step(index, action)` runs on the worker before each action;
    /// `on_done` runs exactly once when the session ends for any reason,
    /// including when `opts` are rejected here.
    pub fn play<S, D>(&self, actions: Vec<Action>, opts: PlayOptions, on_step: S, on_done: D) -> Result<()>
    where
        S: FnMut(usize, &Action) + Send + 'static,
        D: FnOnce() + Send + 'static,
    {
        self.stop();
        let done = DoneGuard(Some(Box::new(on_done)));

        if !(opts.speed.is_finite() && opts.speed > 0.0) {
            warn!(speed = opts.speed, "rejecting playback speed");
            return Err(Error::invalid_argument(format!(
                "speed must be a positive number, got {}",
                opts.speed
            )));
        }

        let cancel = Arc::new(AtomicBool::new(false));
        let worker_cancel = cancel.clone();
        let factory = self.factory.clone();
        info!(actions = actions.len(), speed = opts.speed, repeat = opts.repeat, "playback started");

        let worker = thread::Builder::new()
            .name("macro-player".into())
            .spawn(move || {
                let _done = done;
                run_session(&actions, opts, &worker_cancel, &factory, on_step);
                debug!("playback finished");
            })
            .map_err(|e| Error::injection_failed("spawn playback worker", e))?;

        let previous = self.session.lock().replace(Session { cancel, worker });
        if let Some(previous) = previous {
            previous.stop();
        }
        Ok(())
    }

    /// `play` with progress delivered over a channel instead of callbacks.
    /// The last event of every session is [`PlaybackEvent::Done`].
    pub fn play_events(&self, actions: Vec<Action>, opts: PlayOptions) -> Result<Receiver<PlaybackEvent>> {
        let (tx, rx) = unbounded();
        let step_tx = tx.clone();
        let on_step = move |index: usize, action: &Action| {
            let _ = step_tx.send(PlaybackEvent::Step {
                index,
                action: action.clone(),
            });
        };
        let on_done = move || {
            let _ = tx.send(PlaybackEvent::Done);
        };
        self.play(actions, opts, on_step, on_done).map(|()| rx)
    }

    /// Request cancellation and wait for the worker to exit
    pub fn stop(&self) {
        let session = self.session.lock().take();
        if let Some(session) = session {
            debug!("stopping playback");
            session.stop();
        }
    }

    pub fn is_playing(&self) -> bool {
        self.session
            .lock()
            .as_ref()
            .is_some_and(|s| !s.worker.is_finished() && !s.cancel.load(Ordering::SeqCst))
    }
}

impl Drop for Player {
    fn drop(&mut self) {
        self.stop();
    }
}

// ============================================================================
// Worker
// ============================================================================

fn run_session<S>(actions: &[Action], opts: PlayOptions, cancel: &AtomicBool, factory: &BackendFactory, mut on_step: S)
where
    S: FnMut(usize, &Action),
{
    if actions.is_empty() {
        debug!("nothing to play");
        return;
    }
    let backend = match factory() {
        Ok(b) => b,
        Err(e) => {
            error!(error = %e, "failed to open input synthesis");
            return;
        }
    };
    let mut driver = Driver {
        backend,
        cancel,
        speed: opts.speed,
    };

    let mut pass: u32 = 0;
    while opts.repeat == 0 || pass < opts.repeat {
        let first = if pass == 0 { opts.start_offset } else { 0 };
        for (index, action) in actions.iter().enumerate().skip(first) {
            if driver.cancelled() {
                return;
            }
            on_step(index, action);
            if let Err(e) = driver.dispatch(action) {
                warn!(index, kind = action.kind_name(), error = %e, "playback step failed");
            }
            if !driver.pause(ACTION_GAP) {
                return;
            }
        }
        pass += 1;
        if !driver.pause(PASS_GAP) {
            return;
        }
    }
}

struct Driver<'a> {
    backend: Box<dyn InputBackend>,
    cancel: &'a AtomicBool,
    speed: f64,
}

impl Driver<'_> {
    fn cancelled(&self) -> bool {
        self.cancel.load(Ordering::SeqCst)
    }

    /// Cancellable fixed pause; false when cancelled
    fn pause(&self, d: Duration) -> bool {
        wait_until(Instant::now() + d, self.cancel)
    }

    fn dispatch(&mut self, action: &Action) -> Result<()> {
        match &action.kind {
            ActionKind::Move { path, duration, .. } => {
                if path.len() < 2 {
                    return Ok(());
                }
                self.play_path(path, duration / self.speed)
            }
            ActionKind::Drag {
                button,
                path,
                duration,
                ..
            } => {
                if path.len() < 2 {
                    return Ok(());
                }
                self.play_drag(*button, path, duration / self.speed)
            }
            ActionKind::Click { button, x, y, .. } => {
                self.backend.move_to(*x, *y)?;
                self.backend.button_down(*button)?;
                self.backend.button_up(*button)
            }
            ActionKind::Key { key, .. } => {
                self.backend.key_down(key)?;
                self.backend.key_up(key)
            }
        }
    }

    fn play_path(&mut self, path: &[Point], duration_s: f64) -> Result<()> {
        let samples = ease_resample(path);
        let step = step_interval(duration_s, samples.len(), MOVE_STEP_FLOOR, self.speed);
        let start = Instant::now();
        for (i, &(x, y)) in samples.iter().enumerate() {
            if !wait_for(sample_deadline(start, step, i), self.cancel) {
                return Ok(());
            }
            self.backend.move_to(x, y)?;
        }
        Ok(())
    }

    fn play_drag(&mut self, button: Button, path: &[Point], duration_s: f64) -> Result<()> {
        let samples = ease_resample(path);
        let step = step_interval(duration_s, samples.len(), DRAG_STEP_FLOOR, self.speed);
        let (x0, y0) = samples[0];
        self.backend.move_to(x0, y0)?;
        self.backend.button_down(button)?;

        let moved = self.drag_samples(&samples, step);
        // Released on every exit path, cancellation and errors included
        let released = self.backend.button_up(button);
        moved.and(released)
    }

    fn drag_samples(&mut self, samples: &[Point], step: Duration) -> Result<()> {
        if !self.pause(DRAG_PRESS_SETTLE) {
            return Ok(());
        }
        let start = Instant::now();
        for (i, &(x, y)) in samples.iter().enumerate().skip(1) {
            if !wait_for(sample_deadline(start, step, i), self.cancel) {
                return Ok(());
            }
            self.backend.move_to(x, y)?;
        }
        self.pause(DRAG_RELEASE_SETTLE);
        Ok(())
    }
}

// ============================================================================
// Timing
// ============================================================================

/// Smoothstep resampling: same sample count, sample `i` taken from the
/// recorded path at `floor(ease(i / (n - 1)) * (n - 1))`. Endpoints are exact.
pub fn ease_resample(path: &[Point]) -> Vec<Point> {
    let n = path.len();
    if n < 2 {
        return path.to_vec();
    }
    let last = (n - 1) as f64;
    (0..n)
        .map(|i| {
            let t = i as f64 / last;
            let eased = 3.0 * t * t - 2.0 * t * t * t;
            let idx = ((eased * last).floor() as usize).min(n - 1);
            path[idx]
        })
        .collect()
}

/// Per-sample spacing: `max(duration / (n - 1), floor / speed)`, saturating
/// at `Duration::MAX`. NaN and negative durations count as zero.
pub fn step_interval(duration_s: f64, samples: usize, floor: Duration, speed: f64) -> Duration {
    let per_step = if duration_s > 0.0 {
        duration_s / samples.saturating_sub(1).max(1) as f64
    } else {
        0.0
    };
    let floor_s = floor.as_secs_f64() / speed;
    Duration::try_from_secs_f64(per_step.max(floor_s).max(0.0)).unwrap_or(Duration::MAX)
}

/// Deadline of sample `i`, or `None` when it lies beyond what `Instant` can hold
pub fn sample_deadline(start: Instant, step: Duration, i: usize) -> Option<Instant> {
    let i = u32::try_from(i).ok()?;
    step.checked_mul(i).and_then(|offset| start.checked_add(offset))
}

/// `wait_until` where `None` is a deadline that never arrives
fn wait_for(deadline: Option<Instant>, cancel: &AtomicBool) -> bool {
    match deadline {
        Some(deadline) => wait_until(deadline, cancel),
        None => {
            while !cancel.load(Ordering::SeqCst) {
                thread::sleep(SLEEP_QUANTUM);
            }
            false
        }
    }
}

/// Wait for `deadline`: sleep in short quanta while far away, then spin.
/// Returns false as soon as `cancel` is set.
pub fn wait_until(deadline: Instant, cancel: &AtomicBool) -> bool {
    loop {
        if cancel.load(Ordering::SeqCst) {
            return false;
        }
        let now = Instant::now();
        if now >= deadline {
            return true;
        }
        if deadline - now > SPIN_WINDOW {
            thread::sleep(SLEEP_QUANTUM);
        } else {
            std::hint::spin_loop();
        }
    }
}
