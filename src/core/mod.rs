/// Hub core: modem connections and the device registry
///
/// This package contains:
/// - Per-modem connection state machine and its frame handlers
/// - TTL cache for status snapshots
/// - Heartbeat liveness sweep
/// - Outbound device selection policies
/// - The registry that owns every running connection
pub mod cache;
pub mod connection;
pub mod handlers;
pub mod health;
pub mod registry;
pub mod selection;

// Re-export commonly used types
pub use connection::{
    ConnectionContext, ConnectionOptions, ConnectionState, ModemConnection, StatusCallback,
    TaskStatusUpdater,
};
pub use health::HealthConfig;
pub use registry::{
    BatchSendRequest, BatchSendResult, DeviceRegistry, DeviceRuntimeStatus, DeviceStats,
    DeviceUpdate, NewDevice, RegistryConfig,
};
pub use selection::{SendStrategy, Selector};
