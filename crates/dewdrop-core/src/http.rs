//! Network (Wi-Fi) transport.
//!
//! The device exposes `GET {endpoint}/data`, which answers with the same
//! comma-separated data line as the serial device, and
//! `POST {endpoint}/led?state={0|1}` with an empty JSON body, which succeeds
//! with HTTP 200. A successful light request is reported to the link as the
//! acknowledgement token.

use std::time::Duration;

use async_trait::async_trait;
use tracing::trace;

use dewdrop_types::ACK;

use crate::backoff::Backoff;
use crate::error::{Error, Result};
use crate::transport::{Command, Exhaustion, Transport};

/// Default request timeout for the device.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(2);

/// HTTP transport to a device on the local network.
///
/// Budget exhaustion is [`Exhaustion::BestEffort`]: the last reply is handed
/// to the parser instead of failing outright.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
    endpoint: String,
    policy: Backoff,
}

impl HttpTransport {
    /// Create a transport for `endpoint` (for example `http://192.168.1.40`).
    pub fn new(endpoint: impl Into<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(DEFAULT_REQUEST_TIMEOUT)
            .build()?;
        Ok(Self::with_client(client, endpoint))
    }

    /// Create a transport sharing an existing client.
    pub fn with_client(client: reqwest::Client, endpoint: impl Into<String>) -> Self {
        let endpoint = endpoint.into().trim_end_matches('/').to_string();
        Self {
            client,
            endpoint,
            policy: Backoff::http_poll(),
        }
    }

    /// Override the polling policy.
    #[must_use]
    pub fn with_policy(mut self, policy: Backoff) -> Self {
        self.policy = policy;
        self
    }

    /// The data endpoint URL.
    pub fn data_url(&self) -> String {
        format!("{}/data", self.endpoint)
    }

    /// The light endpoint URL for a command.
    pub fn light_url(&self, open_windows: bool) -> String {
        format!(
            "{}/led?state={}",
            self.endpoint,
            Command::light(open_windows).as_str()
        )
    }

    async fn read_data(&self) -> Result<String> {
        let url = self.data_url();
        let response = self.client.get(&url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(Error::http_status(url, status.as_u16()));
        }
        Ok(response.text().await?.trim().to_string())
    }

    async fn set_light(&self, open_windows: bool) -> Result<String> {
        let url = self.light_url(open_windows);
        let response = self
            .client
            .post(&url)
            .json(&serde_json::json!({}))
            .send()
            .await?;
        let status = response.status();
        if status != reqwest::StatusCode::OK {
            return Err(Error::http_status(url, status.as_u16()));
        }
        Ok(ACK.to_string())
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn exchange(&mut self, command: Command) -> Result<String> {
        let reply = match command {
            Command::ReadData => self.read_data().await?,
            Command::Light { open_windows } => self.set_light(open_windows).await?,
        };
        trace!("{} <- {:?}", self.endpoint, reply);
        Ok(reply)
    }

    fn policy(&self) -> Backoff {
        self.policy
    }

    fn exhaustion(&self) -> Exhaustion {
        Exhaustion::BestEffort
    }

    fn describe(&self) -> String {
        format!("http {}", self.endpoint)
    }
}
