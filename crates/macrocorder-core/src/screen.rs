//! Screen resolution bridge
//!
//! Display queries may only be safe on one thread (the host's UI thread).
//! Capture threads submit `(x, y)` through a [`ScreenResolver`]; the thread owning
//! the [`ScreenHost`] answers. A resolver never waits longer than
//! [`RESOLVE_TIMEOUT`] and falls back to [`UNKNOWN_SCREEN`].

use crate::action::UNKNOWN_SCREEN;
use crossbeam_channel::{bounded, unbounded, Receiver, RecvTimeoutError, Sender, TryRecvError};
use serde::{Deserialize, Serialize};
use std::thread;
use std::time::Duration;
use tracing::{debug, warn};

/// Upper bound a capture thread waits for a display answer
pub const RESOLVE_TIMEOUT: Duration = Duration::from_millis(200);

/// Platform display query, executed on the display-affine thread
pub trait DisplayQuery {
    fn screen_at(&self, x: f64, y: f64) -> Option<String>;
}

/// Infallible point-to-screen lookup used by the recorder
pub trait ScreenLookup: Send + Sync {
    fn screen_at(&self, x: f64, y: f64) -> String;
}

/// Named display rectangle
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScreenRect {
    pub name: String,
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl ScreenRect {
    pub fn new(name: impl Into<String>, x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            name: name.into(),
            x,
            y,
            width,
            height,
        }
    }

    pub fn contains(&self, x: f64, y: f64) -> bool {
        x >= self.x && y >= self.y && x < self.x + self.width && y < self.y + self.height
    }
}

/// Static display layout; first matching rectangle wins
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DisplayLayout {
    pub screens: Vec<ScreenRect>,
}

impl DisplayLayout {
    pub fn new(screens: Vec<ScreenRect>) -> Self {
        Self { screens }
    }
}

impl DisplayQuery for DisplayLayout {
    fn screen_at(&self, x: f64, y: f64) -> Option<String> {
        self.screens
            .iter()
            .find(|s| s.contains(x, y))
            .map(|s| s.name.clone())
    }
}

impl ScreenLookup for DisplayLayout {
    fn screen_at(&self, x: f64, y: f64) -> String {
        DisplayQuery::screen_at(self, x, y).unwrap_or_else(|| UNKNOWN_SCREEN.to_string())
    }
}

/// Every point maps to the same screen
#[derive(Debug, Clone)]
pub struct FixedScreen(pub String);

impl ScreenLookup for FixedScreen {
    fn screen_at(&self, _x: f64, _y: f64) -> String {
        self.0.clone()
    }
}

struct Request {
    x: f64,
    y: f64,
    reply: Sender<String>,
}

/// Capture-side handle; cheap to clone
#[derive(Clone)]
pub struct ScreenResolver {
    tx: Sender<Request>,
    timeout: Duration,
}

/// Display-side end of the bridge
pub struct ScreenHost<Q> {
    query: Q,
    rx: Receiver<Request>,
}

impl ScreenResolver {
    /// Create a connected resolver/host pair. The host must be serviced on
    /// the thread allowed to run `query`.
    pub fn bridge<Q: DisplayQuery>(query: Q) -> (ScreenResolver, ScreenHost<Q>) {
        let (tx, rx) = unbounded();
        (
            ScreenResolver {
                tx,
                timeout: RESOLVE_TIMEOUT,
            },
            ScreenHost { query, rx },
        )
    }

    /// Run the host on a dedicated thread. The query is built on that thread.
    pub fn spawn<Q, F>(make_query: F) -> ScreenResolver
    where
        Q: DisplayQuery,
        F: FnOnce() -> Q + Send + 'static,
    {
        let (tx, rx) = unbounded::<Request>();
        thread::Builder::new()
            .name("screen-host".into())
            .spawn(move || ScreenHost { query: make_query(), rx }.run())
            .map_err(|e| warn!(error = %e, "failed to spawn screen host thread"))
            .ok();
        ScreenResolver {
            tx,
            timeout: RESOLVE_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Resolve a point, waiting at most the configured timeout
    pub fn resolve(&self, x: f64, y: f64) -> String {
        let (reply, answer) = bounded(1);
        if self.tx.send(Request { x, y, reply }).is_err() {
            debug!("screen host gone");
            return UNKNOWN_SCREEN.to_string();
        }
        match answer.recv_timeout(self.timeout) {
            Ok(name) => name,
            Err(RecvTimeoutError::Timeout) => {
                debug!(x, y, "screen lookup timed out");
                UNKNOWN_SCREEN.to_string()
            }
            Err(RecvTimeoutError::Disconnected) => UNKNOWN_SCREEN.to_string(),
        }
    }
}

impl ScreenLookup for ScreenResolver {
    fn screen_at(&self, x: f64, y: f64) -> String {
        self.resolve(x, y)
    }
}

impl<Q: DisplayQuery> ScreenHost<Q> {
    /// Answer all pending requests without blocking. Returns how many were served.
    pub fn pump(&self) -> usize {
        let mut served = 0;
        loop {
            match self.rx.try_recv() {
                Ok(req) => {
                    self.answer(req);
                    served += 1;
                }
                Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => return served,
            }
        }
    }

    /// Serve until every resolver has been dropped
    pub fn run(self) {
        while let Ok(req) = self.rx.recv() {
            self.answer(req);
        }
    }

    fn answer(&self, req: Request) {
        let name = self
            .query
            .screen_at(req.x, req.y)
            .unwrap_or_else(|| UNKNOWN_SCREEN.to_string());
        // The requester may have timed out already
        let _ = req.reply.try_send(name);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    fn two_screens() -> DisplayLayout {
        DisplayLayout::new(vec![
            ScreenRect::new("left", 0.0, 0.0, 1920.0, 1080.0),
            ScreenRect::new("right", 1920.0, 0.0, 1280.0, 1024.0),
        ])
    }

    #[test]
    fn layout_lookup() {
        let l = two_screens();
        assert_eq!(ScreenLookup::screen_at(&l, 10.0, 10.0), "left");
        assert_eq!(ScreenLookup::screen_at(&l, 1920.0, 5.0), "right");
        assert_eq!(ScreenLookup::screen_at(&l, -1.0, 5.0), UNKNOWN_SCREEN);
    }

    #[test]
    fn spawned_host_answers() {
        let r = ScreenResolver::spawn(two_screens);
        assert_eq!(r.resolve(2000.0, 100.0), "right");
        assert_eq!(r.clone().resolve(100.0, 100.0), "left");
    }

    #[test]
    fn unserviced_host_times_out() {
        let (r, _host) = ScreenResolver::bridge(two_screens());
        let r = r.with_timeout(Duration::from_millis(30));
        let started = Instant::now();
        assert_eq!(r.resolve(10.0, 10.0), UNKNOWN_SCREEN);
        assert!(started.elapsed() < Duration::from_secs(1));
    }

    #[test]
    fn dropped_host_is_unknown() {
        let (r, host) = ScreenResolver::bridge(two_screens());
        drop(host);
        assert_eq!(r.resolve(10.0, 10.0), UNKNOWN_SCREEN);
    }

    #[test]
    fn pump_serves_from_host_thread() {
        let (r, host) = ScreenResolver::bridge(two_screens());
        let worker = thread::spawn(move || r.resolve(5.0, 5.0));
        let deadline = Instant::now() + Duration::from_secs(2);
        while !worker.is_finished() && Instant::now() < deadline {
            host.pump();
            thread::sleep(Duration::from_millis(1));
        }
        assert_eq!(worker.join().unwrap(), "left");
    }
}
