use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MessageMedia {
    Photo { mime_type: String, file_id: String },
    #[serde(other)]
    Other,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReactionCount {
    pub emoticon: Option<String>,
    pub count: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelMessage {
    pub id: u64,
    pub date: DateTime<Utc>,
    #[serde(default)]
    pub forwards: Option<u64>,
    #[serde(default)]
    pub reactions: Vec<ReactionCount>,
    pub media: MessageMedia,
}

impl ChannelMessage {
    pub fn reaction_total(&self) -> u64 {
        self.reactions.iter().map(|r| r.count).sum()
    }

    pub fn forward_count(&self) -> u64 {
        self.forwards.unwrap_or(0)
    }

    /// The mime type when this message carries a photo.
    pub fn photo_mime(&self) -> Option<&str> {
        match &self.media {
            MessageMedia::Photo { mime_type, .. } => Some(mime_type.as_str()),
            MessageMedia::Other => None,
        }
    }
}

/// The two operations the sync needs from a message channel. Calls are made
/// one at a time; authentication and transport belong to the implementor.
pub trait ChannelClient {
    /// Messages with `id > min_id`, newest first, at most `limit` of them.
    fn iter_messages(&self, channel: &str, min_id: u64, limit: usize)
    -> Result<Vec<ChannelMessage>>;

    fn download_media(&self, message: &ChannelMessage) -> Result<Vec<u8>>;
}
