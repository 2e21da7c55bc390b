//! Chat webhook notifications.
//!
//! Each channel posts `{"content": message}` to its own webhook URL, the
//! format Discord and compatible services accept.

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use tracing::debug;

use dewdrop_core::{Channel, Error, Notifier, Result};

use crate::config::WebhooksConfig;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Serialize)]
struct WebhookMessage<'a> {
    content: &'a str,
}

/// [`Notifier`] that posts to one webhook per channel.
#[derive(Debug, Clone)]
pub struct WebhookNotifier {
    client: Client,
    urls: BTreeMap<Channel, String>,
}

impl WebhookNotifier {
    /// Create a notifier from configuration. Channels without a URL are
    /// skipped when sent to.
    pub fn new(config: &WebhooksConfig) -> Result<Self> {
        let client = Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        let urls = [
            (Channel::Feed, &config.sensor_feed),
            (Channel::WindowAlert, &config.window_alert),
            (Channel::HumidityAlert, &config.humidity_alert),
        ]
        .into_iter()
        .filter_map(|(channel, url)| url.clone().map(|url| (channel, url)))
        .collect();
        Ok(Self { client, urls })
    }

    /// Whether `channel` has a webhook.
    pub fn is_configured(&self, channel: Channel) -> bool {
        self.urls.contains_key(&channel)
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn send(&self, channel: Channel, message: &str) -> Result<()> {
        let Some(url) = self.urls.get(&channel) else {
            debug!("No webhook for {}, dropping message", channel);
            return Ok(());
        };

        let response = self
            .client
            .post(url)
            .json(&WebhookMessage { content: message })
            .send()
            .await
            .map_err(|e| Error::Notification(format!("{}: {}", channel, e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Notification(format!(
                "{} webhook returned {}: {}",
                channel, status, body
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_configured_channels() {
        let config = WebhooksConfig {
            sensor_feed: Some("https://example.com/feed".to_string()),
            window_alert: None,
            humidity_alert: Some("https://example.com/humidity".to_string()),
        };
        let notifier = WebhookNotifier::new(&config).unwrap();

        assert!(notifier.is_configured(Channel::Feed));
        assert!(!notifier.is_configured(Channel::WindowAlert));
        assert!(notifier.is_configured(Channel::HumidityAlert));
    }

    #[tokio::test]
    async fn test_unconfigured_channel_is_skipped() {
        let notifier = WebhookNotifier::new(&WebhooksConfig::default()).unwrap();
        notifier.send(Channel::WindowAlert, "hello").await.unwrap();
    }

    #[test]
    fn test_message_body() {
        let body = serde_json::to_string(&WebhookMessage { content: "hi\nthere" }).unwrap();
        assert_eq!(body, r#"{"content":"hi\nthere"}"#);
    }
}
