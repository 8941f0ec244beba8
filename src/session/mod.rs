//! Session orchestration
//!
//! The ambient effect (gate plus loop player), the periodic activity monitor
//! and the session context that owns them together with the signal graph.

pub mod ambient;
pub mod context;
pub mod monitor;

pub use ambient::AmbientEffect;
pub use context::SessionContext;
pub use monitor::{sample_once, ActivityMonitor, DEFAULT_MONITOR_PERIOD_MS};
