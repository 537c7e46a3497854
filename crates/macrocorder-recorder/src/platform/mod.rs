//! Native adapters (feature `native`)
//!
//! - capture: global listener via rdev
//! - inject: input synthesis via enigo
//! - display: monitor enumeration via xcap

mod capture;
mod display;
mod inject;

pub use capture::RdevSource;
pub use display::MonitorQuery;
pub use inject::{enigo_factory, EnigoBackend};
