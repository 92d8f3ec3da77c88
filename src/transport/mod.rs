//! Telemetry delivery
//!
//! Transports are stateless from the session's point of view: each `send`
//! is independent and the session guarantees at most one in flight per
//! target.

#[cfg(feature = "http")]
pub mod http;

#[cfg(feature = "http")]
pub use http::HttpTransport;

use crate::telemetry::TelemetrySnapshot;
use crate::TransportError;
use futures::future::BoxFuture;

pub type TransportFuture = BoxFuture<'static, Result<(), TransportError>>;

/// Delivers snapshots to the telemetry endpoint.
pub trait TelemetryTransport: Send + Sync {
    /// Resolve to `Ok(())` only once the endpoint has accepted the snapshot.
    fn send(&self, endpoint: &str, snapshot: TelemetrySnapshot) -> TransportFuture;
}
