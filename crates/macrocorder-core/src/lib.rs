//! macrocorder-core - data model and seams for pointer/keyboard macro recording
//!
//! Platform-free: the action log, raw input model, key normalization,
//! process configuration and the screen resolution bridge.

pub mod action;
pub mod config;
pub mod error;
pub mod input;
pub mod screen;

pub use action::{flatten, Action, ActionKind, ActionNode, Button, GroupInfo, Point, UNKNOWN_SCREEN};
pub use config::{AppConfig, Hotkeys, PlaybackDefaults, RecorderConfig};
pub use error::{Error, ErrorCode, Result};
pub use input::{normalize_key, BackendFactory, InputBackend, KeyInput, RawEvent, Stamped};
pub use screen::{
    DisplayLayout, DisplayQuery, FixedScreen, ScreenHost, ScreenLookup, ScreenRect, ScreenResolver,
};

pub mod prelude {
    pub use crate::action::{Action, ActionKind, ActionNode, Button};
    pub use crate::config::{AppConfig, RecorderConfig};
    pub use crate::error::{Error, ErrorCode, Result};
    pub use crate::input::{InputBackend, KeyInput, RawEvent, Stamped};
    pub use crate::screen::{ScreenLookup, ScreenResolver};
}
