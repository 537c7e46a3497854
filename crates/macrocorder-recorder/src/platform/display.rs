//! Monitor lookup via xcap

use macrocorder_core::DisplayQuery;
use tracing::warn;
use xcap::Monitor;

/// Enumerates monitors on every query so hot-plugged displays are seen.
/// Must be called from the thread that owns display access; wrap it with
/// `ScreenResolver::bridge` or `ScreenResolver::spawn`.
#[derive(Debug, Default)]
pub struct MonitorQuery;

impl MonitorQuery {
    pub fn new() -> Self {
        Self
    }
}

impl DisplayQuery for MonitorQuery {
    fn screen_at(&self, x: f64, y: f64) -> Option<String> {
        let monitors = match Monitor::all() {
            Ok(m) => m,
            Err(e) => {
                warn!(error = %e, "failed to enumerate monitors");
                return None;
            }
        };

        monitors.iter().enumerate().find_map(|(idx, monitor)| {
            let left = monitor.x().unwrap_or(0) as f64;
            let top = monitor.y().unwrap_or(0) as f64;
            let width = monitor.width().unwrap_or(0) as f64;
            let height = monitor.height().unwrap_or(0) as f64;
            let inside = x >= left && x < left + width && y >= top && y < top + height;
            inside.then(|| {
                monitor
                    .name()
                    .unwrap_or_else(|_| format!("Monitor {}", idx + 1))
            })
        })
    }
}
