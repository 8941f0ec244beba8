//! Voice signal graph
//!
//! - Routing table: the directed node graph for one reconfiguration
//! - Reconfigure lock: FIFO serialization of rebuilds
//! - Controller: input acquisition and table rebuilds

pub mod controller;
pub mod lock;
pub mod routing;

pub use controller::{
    CaptureConstraints, CaptureStream, ControllerPhase, DeviceCapture, InputSelector,
    NoiseSuppressor, RouteGains, RoutingHandles, SignalGraphConfig, SignalGraphController,
};
pub use lock::{ReconfigureGuard, ReconfigureLock};
pub use routing::{NodeId, NodeKind, NodeSpec, RoutingTable, TapSide};
