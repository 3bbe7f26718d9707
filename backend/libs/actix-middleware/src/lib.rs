//! # Actix Middleware Library
//!
//! Shared middleware for the workspace's Actix services
//!
//! ## Modules
//! - `device_auth`: bearer-token authentication resolving a (user, device) pair
//! - `metrics`: Prometheus HTTP metrics middleware

pub mod device_auth;
pub mod metrics;

pub use device_auth::{Claims, DeviceAuthMiddleware, DeviceIdentity};
pub use metrics::MetricsMiddleware;
