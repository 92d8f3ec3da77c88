//! readtime
//!
//! Render scheduling and read-time telemetry for paginated document views.
//!
//! A [`Session`] wraps an opaque page renderer and an opaque telemetry
//! transport. It coalesces bursts of re-render triggers (container resize,
//! pixel-density change, content mutation) into at most one render pass per
//! target, tracks how much of every rendered page is visible, integrates that
//! into per-page read time, and periodically reports the result.
//!
//! # Features
//!
//! - **Debounced single-flight rendering**: triggers inside the quiet window
//!   collapse into one pass; triggers during a pass are deferred, never lost
//! - **Visibility-weighted read time**: time counts only while the host is in
//!   the foreground, scaled by each page's visible fraction
//! - **At-most-one flush in flight**: failed deliveries keep their data for
//!   the next attempt
//! - **HTTP transport** (`http` feature, default): JSON POST via `reqwest`
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use readtime::{Event, Foreground, FixedPageRenderer, HttpTransport, Session, TrackerConfig};
//!
//! # async fn run() -> readtime::Result<()> {
//! let config = TrackerConfig {
//!     endpoint: "https://example.com/api/record-read-times".to_string(),
//!     ..Default::default()
//! };
//! let renderer = Arc::new(FixedPageRenderer::uniform(12, 595.0, 842.0));
//! let transport = Arc::new(HttpTransport::new(&config)?);
//! let foreground = Foreground::new(true);
//!
//! let (session, handle) = Session::new(config, renderer, transport, foreground)?;
//! let driver = tokio::spawn(session.run());
//!
//! handle.send(Event::ContentAdded {
//!     target: "edition-42".into(),
//!     document: "/pdfs/2025-01-01.pdf".to_string(),
//! })?;
//! # handle.shutdown().await?;
//! # let _ = driver.await;
//! # Ok(())
//! # }
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

pub mod error;
pub use error::{Error, ObserverAttachError, RenderError, Result, TransportError};

// Per-target debounce and single-flight state machine
pub mod scheduler;

// Renderer seam plus page layout helpers
pub mod rendering;

// Visibility, accumulation and flush bookkeeping
pub mod telemetry;

// Snapshot delivery
pub mod transport;

// Host-facing event surface (observers, foreground state)
pub mod platform;

pub mod session;

pub use platform::{Event, EventSender, Foreground, NoopObserverHost, ObserverHost};
pub use rendering::{FixedPageRenderer, PageRenderer, RenderConstraints, RenderJob, RenderedPage};
pub use scheduler::{RenderPhase, RenderScheduler, TargetView};
pub use session::{Session, SessionHandle, SessionReport, TargetReport};
pub use telemetry::{DurationPolicy, Page, PageSet, ResetPolicy, TelemetrySnapshot};
#[cfg(feature = "http")]
pub use transport::HttpTransport;
pub use transport::TelemetryTransport;

/// Configuration for a tracking session
///
/// The defaults follow the cadences the viewer was tuned with: a 60ms
/// debounce, a 2px resize dead band, a 100ms accumulation tick and a
/// telemetry flush at most every 5 seconds.
///
/// # Examples
///
/// ```
/// let cfg = readtime::TrackerConfig::default();
/// assert_eq!(cfg.debounce_ms, 60);
/// assert_eq!(cfg.flush_interval_ms, 5000);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackerConfig {
    /// Quiet window before a burst of triggers starts a render pass
    pub debounce_ms: u64,
    /// Minimum width change (CSS px) for a resize to count as real
    pub width_epsilon: f64,
    /// Period of the read-time accumulation tick
    pub tick_period_ms: u64,
    /// Minimum time between the starts of two successful flushes
    pub flush_interval_ms: u64,
    /// How often flush eligibility is evaluated (and failed flushes retried)
    pub flush_check_period_ms: u64,
    /// Telemetry endpoint handed to the transport
    pub endpoint: String,
    /// Timeout for a single telemetry request
    pub request_timeout_ms: u64,
    /// Viewing surface used when a target has no width sample yet
    pub surface: Surface,
    /// Pixel density assumed until a density change is observed
    pub device_pixel_ratio: f64,
    /// Whether page read time survives a re-render of the same target
    pub duration_policy: DurationPolicy,
    /// How durations are reset after a successful flush
    pub reset_policy: ResetPolicy,
    /// Client identifier sent with every snapshot; generated when absent
    pub client_id: Option<uuid::Uuid>,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            debounce_ms: 60,
            width_epsilon: 2.0,
            tick_period_ms: 100,
            flush_interval_ms: 5000,
            flush_check_period_ms: 1000,
            endpoint: "http://localhost:8080/api/record-read-times".to_string(),
            request_timeout_ms: 10000,
            surface: Surface::default(),
            device_pixel_ratio: 1.0,
            duration_policy: DurationPolicy::default(),
            reset_policy: ResetPolicy::default(),
            client_id: None,
        }
    }
}

impl TrackerConfig {
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    pub fn tick_period(&self) -> Duration {
        Duration::from_millis(self.tick_period_ms)
    }

    pub fn flush_interval(&self) -> Duration {
        Duration::from_millis(self.flush_interval_ms)
    }

    pub fn flush_check_period(&self) -> Duration {
        Duration::from_millis(self.flush_check_period_ms)
    }

    /// Reject settings the session loop cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.tick_period_ms == 0 {
            return Err(Error::ConfigError("tick_period_ms must be non-zero".into()));
        }
        if self.flush_check_period_ms == 0 {
            return Err(Error::ConfigError(
                "flush_check_period_ms must be non-zero".into(),
            ));
        }
        if !self.width_epsilon.is_finite() || self.width_epsilon < 0.0 {
            return Err(Error::ConfigError(format!(
                "width_epsilon must be a non-negative number, got {}",
                self.width_epsilon
            )));
        }
        if !self.device_pixel_ratio.is_finite() || self.device_pixel_ratio <= 0.0 {
            return Err(Error::ConfigError(format!(
                "device_pixel_ratio must be positive, got {}",
                self.device_pixel_ratio
            )));
        }
        if !(self.surface.width > 0.0 && self.surface.height > 0.0) {
            return Err(Error::ConfigError("surface must have a positive size".into()));
        }
        #[cfg(feature = "http")]
        {
            url::Url::parse(&self.endpoint).map_err(|e| {
                Error::ConfigError(format!("Invalid endpoint '{}': {}", self.endpoint, e))
            })?;
        }
        Ok(())
    }
}

/// Viewing surface dimensions in CSS pixels
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Surface {
    pub width: f64,
    pub height: f64,
}

impl Default for Surface {
    fn default() -> Self {
        Self {
            width: 1280.0,
            height: 720.0,
        }
    }
}

/// Opaque identity of a render target (one document container).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TargetId(String);

impl TargetId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TargetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TargetId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for TargetId {
    fn from(id: String) -> Self {
        Self(id)
    }
}
