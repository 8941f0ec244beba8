//! Ambience - Ambient Effect Engine for Live Voice Streaming
//!
//! Plays a looping background effect under a converted voice stream while
//! the speaker is active, and rebuilds the voice signal graph when the input
//! configuration changes.
//!
//! # Architecture
//!
//! - `dsp`: level metering, the activity gate and the shared effect gain stage
//! - `playback`: manifest-driven effect library and the loop player
//! - `graph`: routing table, FIFO reconfigure lock and the graph controller
//! - `session`: ambient effect, activity monitor and the session context
//! - `config` / `remote`: settings and the server-side collaborator

pub mod cli;
pub mod config;
pub mod dsp;
pub mod engine;
pub mod error;
pub mod graph;
pub mod playback;
pub mod remote;
pub mod session;

pub use config::EngineSettings;
pub use error::{AmbienceError, Result};
pub use session::SessionContext;
