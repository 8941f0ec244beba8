//! Signal analysis and control
//!
//! Level metering, the activity gate that decides when the ambient effect
//! plays, and the shared gain stage the effect is mixed through.

mod gain;
mod gate;
mod level;

pub use gain::GainStage;
pub use gate::{
    clamp_gain, ActivityGate, ActivityState, GatePhase, GateSignal, DEFAULT_SILENCE_BUDGET_MS,
    DEFAULT_THRESHOLD_DB,
};
pub use level::{
    compute_level, db_to_linear, rms, LevelTap, LEVEL_EPSILON, LEVEL_FLOOR_DB,
};
