//! JSON-over-HTTP transport backed by `reqwest`.

use crate::telemetry::TelemetrySnapshot;
use crate::transport::{TelemetryTransport, TransportFuture};
use crate::{Error, Result, TrackerConfig};
use reqwest::Client;
use std::time::Duration;

/// POSTs each snapshot as JSON; any non-2xx answer counts as a failure.
#[derive(Clone)]
pub struct HttpTransport {
    client: Client,
}

impl HttpTransport {
    pub fn new(config: &TrackerConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_millis(config.request_timeout_ms))
            .user_agent(concat!("readtime/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| Error::ConfigError(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self { client })
    }
}

impl TelemetryTransport for HttpTransport {
    fn send(&self, endpoint: &str, snapshot: TelemetrySnapshot) -> TransportFuture {
        let request = self.client.post(endpoint).json(&snapshot);
        Box::pin(async move {
            request.send().await?.error_for_status()?;
            Ok(())
        })
    }
}
