//! Capture configuration, preview frames and output naming.
//!
//! These are the plain data types shared by the platform backends and the
//! session; nothing here touches a device.

mod config;
mod frame;
/// Timestamp file names for stills and clips.
pub mod naming;

pub use config::{
    ConfigError, FileConfig, FinalizeErrorPolicy, HostConfig, LensFacing, PreviewConfig,
    SessionConfig,
};
pub use frame::Frame;
pub use naming::MediaKind;
