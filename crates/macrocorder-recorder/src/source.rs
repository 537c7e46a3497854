//! Raw input sources the recorder subscribes to

use crossbeam_channel::{Sender, TrySendError};
use macrocorder_core::{RawEvent, Result, Stamped};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Instant;
use tracing::warn;

pub type EventSink = Sender<Stamped<RawEvent>>;

/// A capture listener that forwards raw events into a sink
pub trait InputSource: Send + Sync {
    fn subscribe(&self, sink: EventSink) -> Result<Subscription>;
}

/// Live subscription; cancelled explicitly or on drop
pub struct Subscription {
    cancel: Option<Box<dyn FnOnce() -> Result<()> + Send>>,
}

impl Subscription {
    pub fn new(cancel: impl FnOnce() -> Result<()> + Send + 'static) -> Self {
        Self {
            cancel: Some(Box::new(cancel)),
        }
    }

    pub fn cancel(mut self) -> Result<()> {
        match self.cancel.take() {
            Some(f) => f(),
            None => Ok(()),
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(f) = self.cancel.take() {
            if let Err(e) = f() {
                warn!(error = %e, "failed to release input subscription");
            }
        }
    }
}

/// In-memory source: whatever is pushed goes to the current subscriber.
/// Used by hosts that already own an event loop, and by tests.
#[derive(Clone, Default)]
pub struct ChannelSource {
    sink: Arc<Mutex<Option<EventSink>>>,
}

impl ChannelSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Deliver an event stamped now. Returns false when nobody is listening.
    pub fn push(&self, event: RawEvent) -> bool {
        self.push_at(Instant::now(), event)
    }

    pub fn push_at(&self, at: Instant, event: RawEvent) -> bool {
        let guard = self.sink.lock();
        let Some(sink) = guard.as_ref() else {
            return false;
        };
        match sink.try_send(Stamped::new(at, event)) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                warn!("raw event queue full, dropping event");
                false
            }
            Err(TrySendError::Disconnected(_)) => false,
        }
    }

    pub fn is_subscribed(&self) -> bool {
        self.sink.lock().is_some()
    }
}

impl InputSource for ChannelSource {
    fn subscribe(&self, sink: EventSink) -> Result<Subscription> {
        *self.sink.lock() = Some(sink);
        let slot = self.sink.clone();
        Ok(Subscription::new(move || {
            slot.lock().take();
            Ok(())
        }))
    }
}
