//! Port Exposure Tracker
//!
//! Records which container ports have been exposed through the host
//! network switch and keeps the switch's forwarder in sync as bindings
//! are added and removed.

pub mod api;
pub mod config;
pub mod error;
pub mod server;
pub mod tracker;
pub mod types;

pub use api::{ExposeRequest, ExposureApi, ExposureClient, UnexposeRequest};
pub use config::{TrackerConfig, HOST_SWITCH_IP};
pub use error::{ApiError, TrackerError};
pub use tracker::Tracker;
pub use types::{PortBinding, PortMap, Protocol};
