use crate::channel::client::{ChannelClient, ChannelMessage, MessageMedia};
use crate::error::ImgsyncError;
use crate::imgsync::config::SyncConfig;
use anyhow::{Context, Result};
use reqwest::blocking::{Client, RequestBuilder};
use std::time::Duration;

/// Client for a message bridge exposing a channel's history over HTTP.
/// Built once from configuration and handed to the sync by reference.
#[derive(Debug, Clone)]
pub struct HttpChannelClient {
    client: Client,
    endpoint: String,
    api_id: String,
    api_hash: String,
}

impl HttpChannelClient {
    pub fn from_config(cfg: &SyncConfig) -> Result<Self> {
        let endpoint = cfg
            .endpoint
            .clone()
            .ok_or(ImgsyncError::MissingSetting("IMGSYNC_CHANNEL_ENDPOINT"))?;
        let api_id = cfg
            .api_id
            .clone()
            .ok_or(ImgsyncError::MissingSetting("IMGSYNC_API_ID"))?;
        let api_hash = cfg
            .api_hash
            .clone()
            .ok_or(ImgsyncError::MissingSetting("IMGSYNC_API_HASH"))?;

        let client = Client::builder()
            .timeout(Duration::from_secs(cfg.request_timeout_secs))
            .build()?;
        Ok(Self {
            client,
            endpoint: endpoint.trim_end_matches('/').to_string(),
            api_id,
            api_hash,
        })
    }

    fn get(&self, path: &str) -> RequestBuilder {
        self.client
            .get(format!("{}{path}", self.endpoint))
            .header("X-Api-Id", &self.api_id)
            .bearer_auth(&self.api_hash)
    }
}

fn channel_segment(channel: &str) -> String {
    channel.trim_start_matches('@').to_string()
}

impl ChannelClient for HttpChannelClient {
    fn iter_messages(
        &self,
        channel: &str,
        min_id: u64,
        limit: usize,
    ) -> Result<Vec<ChannelMessage>> {
        let response = self
            .get(&format!("/channels/{}/messages", channel_segment(channel)))
            .query(&[("min_id", min_id.to_string()), ("limit", limit.to_string())])
            .send()
            .with_context(|| format!("failed to list messages of {channel}"))?;
        if !response.status().is_success() {
            anyhow::bail!(
                "listing messages of {channel} failed with status {}",
                response.status()
            );
        }
        let messages: Vec<ChannelMessage> = response
            .json()
            .with_context(|| format!("invalid message list for {channel}"))?;
        Ok(messages)
    }

    fn download_media(&self, message: &ChannelMessage) -> Result<Vec<u8>> {
        let MessageMedia::Photo { file_id, .. } = &message.media else {
            anyhow::bail!("message {} carries no photo", message.id);
        };
        let response = self
            .get(&format!("/media/{file_id}"))
            .send()
            .with_context(|| format!("failed to download media of message {}", message.id))?;
        if !response.status().is_success() {
            anyhow::bail!(
                "media download for message {} failed with status {}",
                message.id,
                response.status()
            );
        }
        Ok(response.bytes()?.to_vec())
    }
}
