pub mod config;
pub mod errors;
pub mod lifecycle;
pub mod map;
pub mod models;
pub mod realtime;
pub mod services;
pub mod store;

// Re-export commonly used types
pub use config::AppConfig;
pub use errors::{ErrorKind, KekeError, KekeResult, ValidationError};
pub use lifecycle::RideLifecycleController;
pub use realtime::EventChannel;
pub use store::{RideState, RideStateStore};
