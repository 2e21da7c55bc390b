//! HTTP client for the dewdrop service.
//!
//! The poller reads the cached outdoor dew point from the service and posts
//! every finished feed back to it.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use tracing::debug;

use dewdrop_core::{DewPointSource, Error, FeedSink, Result};
use dewdrop_types::SensorFeed;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Client for the dewdrop service API.
#[derive(Debug, Clone)]
pub struct ServerClient {
    client: Client,
    base_url: String,
}

impl ServerClient {
    /// Create a client for the service at `base_url`.
    pub fn new(base_url: &str) -> Result<Self> {
        if !base_url.starts_with("http://") && !base_url.starts_with("https://") {
            return Err(Error::invalid_config(format!(
                "server URL must start with http:// or https://, got {}",
                base_url
            )));
        }
        Ok(Self {
            client: Client::builder().timeout(REQUEST_TIMEOUT).build()?,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn dewpoint_url(&self) -> String {
        format!("{}/weather/outdoor-dewpoint", self.base_url)
    }

    pub fn feed_url(&self) -> String {
        format!("{}/arduino/sensor-feed", self.base_url)
    }
}

/// Decode the bare JSON number served by the dew point endpoint.
pub fn parse_dewpoint(body: &str) -> Result<f64> {
    serde_json::from_str::<f64>(body)
        .map_err(|e| Error::Weather(format!("invalid outdoor dew point {:?}: {}", body.trim(), e)))
}

#[async_trait]
impl DewPointSource for ServerClient {
    async fn fetch_dewpoint(&self) -> Result<f64> {
        let url = self.dewpoint_url();
        let response = self.client.get(&url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(Error::http_status(url, status.as_u16()));
        }
        let value = parse_dewpoint(&response.text().await?)?;
        debug!("Outdoor dew point {:.2} C", value);
        Ok(value)
    }
}

#[async_trait]
impl FeedSink for ServerClient {
    async fn submit(&self, feed: &SensorFeed) -> Result<()> {
        let url = self.feed_url();
        let response = self.client.post(&url).json(feed).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(Error::http_status(url, status.as_u16()));
        }
        debug!("Submitted feed for device {}", feed.device_id);
        Ok(())
    }
}
