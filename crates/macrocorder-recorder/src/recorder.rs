//! Macro recorder: subscribes to raw input and streams finalized actions
//!
//! One capture thread owns the [`CaptureSession`]; raw events, the idle-flush
//! watchdog tick and the stop signal are multiplexed with `select!`, so the
//! move buffer, drag accumulator and key registry are never shared.
//! Flush latency after the last pointer sample is within
//! `pause_threshold + poll_interval`.

use crate::session::CaptureSession;
use crate::source::{InputSource, Subscription};
use crossbeam_channel::{bounded, select, tick, Receiver, Sender};
use macrocorder_core::{Action, Error, RawEvent, RecorderConfig, Result, ScreenLookup, Stamped};
use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::Arc;
use std::thread;
use std::time::Instant;
use tracing::{debug, error, info, warn};

/// Called on the capture thread for every finalized action
pub type ActionCallback = Arc<dyn Fn(&Action) + Send + Sync>;

/// Recording in progress
struct ActiveCapture {
    subscription: Subscription,
    stop_tx: Sender<()>,
    worker: thread::JoinHandle<Vec<Action>>,
}

/// The recorder: `Idle -> Recording -> Idle`
pub struct Recorder {
    config: RecorderConfig,
    ignore: HashSet<String>,
    source: Arc<dyn InputSource>,
    screens: Arc<dyn ScreenLookup>,
    on_action: Option<ActionCallback>,
    active: Mutex<Option<ActiveCapture>>,
}

impl Recorder {
    pub fn new(
        config: RecorderConfig,
        ignore_keys: HashSet<String>,
        source: Arc<dyn InputSource>,
        screens: Arc<dyn ScreenLookup>,
    ) -> Self {
        Self {
            config,
            ignore: ignore_keys,
            source,
            screens,
            on_action: None,
            active: Mutex::new(None),
        }
    }

    /// Stream every action to `f` as it is finalized
    pub fn on_action(mut self, f: impl Fn(&Action) + Send + Sync + 'static) -> Self {
        self.on_action = Some(Arc::new(f));
        self
    }

    pub fn is_recording(&self) -> bool {
        self.active.lock().is_some()
    }

    /// Open capture and start the idle watchdog. No-op while already recording.
    ///
    /// On failure every acquired resource is released and the recorder stays idle.
    pub fn start(&self) -> Result<()> {
        let mut active = self.active.lock();
        if active.is_some() {
            debug!("start ignored: already recording");
            return Ok(());
        }

        let (events_tx, events_rx) = bounded(self.config.channel_capacity.max(1));
        let subscription = self.source.subscribe(events_tx).map_err(|e| {
            error!(error = %e, "failed to open input capture");
            e
        })?;

        let (stop_tx, stop_rx) = bounded(1);
        let actor = CaptureActor {
            session: CaptureSession::new(&self.config, self.ignore.clone()),
            screens: self.screens.clone(),
            on_action: self.on_action.clone(),
            actions: Vec::new(),
        };
        let poll = self.config.poll_interval();
        let worker = thread::Builder::new()
            .name("macro-capture".into())
            .spawn(move || actor.run(events_rx, stop_rx, poll));

        let worker = match worker {
            Ok(w) => w,
            Err(e) => {
                if let Err(e) = subscription.cancel() {
                    warn!(error = %e, "failed to release input capture");
                }
                error!(error = %e, "failed to spawn capture thread");
                return Err(Error::capture_failed(e));
            }
        };

        *active = Some(ActiveCapture {
            subscription,
            stop_tx,
            worker,
        });
        info!("recording started");
        Ok(())
    }

    /// Close capture, flush what is buffered and return the session's actions.
    /// No-op (empty) while idle.
    pub fn stop(&self) -> Vec<Action> {
        let Some(capture) = self.active.lock().take() else {
            debug!("stop ignored: not recording");
            return Vec::new();
        };

        // No new raw events after this point; the capture thread drains what
        // was already queued, then flushes once.
        if let Err(e) = capture.subscription.cancel() {
            warn!(error = %e, "failed to release input capture");
        }
        let _ = capture.stop_tx.send(());

        match capture.worker.join() {
            Ok(actions) => {
                info!(actions = actions.len(), "recording stopped");
                actions
            }
            Err(_) => {
                error!("capture thread panicked; session lost");
                Vec::new()
            }
        }
    }
}

impl Drop for Recorder {
    fn drop(&mut self) {
        if self.is_recording() {
            self.stop();
        }
    }
}

// ============================================================================
// Capture Thread
// ============================================================================

struct CaptureActor {
    session: CaptureSession,
    screens: Arc<dyn ScreenLookup>,
    on_action: Option<ActionCallback>,
    actions: Vec<Action>,
}

impl CaptureActor {
    fn run(
        mut self,
        events: Receiver<Stamped<RawEvent>>,
        stop: Receiver<()>,
        poll: std::time::Duration,
    ) -> Vec<Action> {
        let watchdog = tick(poll);

        loop {
            select! {
                recv(events) -> msg => match msg {
                    Ok(ev) => self.handle(ev),
                    Err(_) => {
                        debug!("input source closed");
                        break;
                    }
                },
                recv(watchdog) -> _ => {
                    if let Some(action) = self.session.flush_idle(Instant::now()) {
                        self.emit(action);
                    }
                }
                recv(stop) -> _ => break,
            }
        }

        while let Ok(ev) = events.try_recv() {
            self.handle(ev);
        }
        for action in self.session.finish() {
            self.emit(action);
        }
        self.actions
    }

    fn handle(&mut self, ev: Stamped<RawEvent>) {
        for action in self.session.handle(ev, self.screens.as_ref()) {
            self.emit(action);
        }
    }

    fn emit(&mut self, action: Action) {
        debug!(kind = action.kind_name(), id = %action.id, "action recorded");
        if let Some(cb) = &self.on_action {
            cb(&action);
        }
        self.actions.push(action);
    }
}
