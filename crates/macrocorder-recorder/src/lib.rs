//! macrocorder-recorder - pointer/keyboard macro capture and replay
//!
//! Records raw input into coalesced actions and plays them back with
//! reconstructed timing.
//!
//! ## Platform Support
//!
//! The engine is platform-free and driven through the seams in
//! `macrocorder_core` plus [`source::InputSource`]. The `native` feature adds:
//!
//! - **Capture**: rdev global listener
//! - **Synthesis**: enigo
//! - **Displays**: xcap monitor enumeration

pub mod recorder;
pub mod replay;
pub mod session;
pub mod source;
pub mod storage;

#[cfg(feature = "native")]
pub mod platform;

pub use recorder::{ActionCallback, Recorder};
pub use replay::{PlayOptions, PlaybackEvent, Player};
pub use session::CaptureSession;
pub use source::{ChannelSource, EventSink, InputSource, Subscription};
pub use storage::MacroStore;

#[cfg(feature = "native")]
pub use platform::{enigo_factory, EnigoBackend, MonitorQuery, RdevSource};

pub mod prelude {
    pub use crate::recorder::Recorder;
    pub use crate::replay::{PlayOptions, PlaybackEvent, Player};
    pub use crate::source::{ChannelSource, InputSource};
    pub use crate::storage::{self, MacroStore};

    #[cfg(feature = "native")]
    pub use crate::platform::{enigo_factory, MonitorQuery, RdevSource};
}
