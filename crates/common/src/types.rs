//! Message and reply types shared by the pipeline, the stores, and the
//! transport adapters.

use serde::{Deserialize, Serialize};

/// Prefix the WhatsApp transports put in front of E.164 numbers.
pub const WHATSAPP_PREFIX: &str = "whatsapp:";

/// Kind of conversation an inbound message belongs to.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChatType {
    #[default]
    Direct,
    Group,
}

impl ChatType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Direct => "direct",
            Self::Group => "group",
        }
    }
}

/// Normalized inbound message, produced by a transport adapter before the
/// reply pipeline runs.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MsgContext {
    /// Raw message text (may include timestamp / sender wrappers).
    pub body: String,
    pub from: Option<String>,
    pub to: Option<String>,
    pub message_sid: Option<String>,
    pub chat_type: ChatType,
    pub sender_name: Option<String>,
    pub group_subject: Option<String>,
    /// Comma separated member list, as rendered by the transport.
    pub group_members: Option<String>,
    /// Local path of downloaded inbound media.
    pub media_path: Option<String>,
    pub media_type: Option<String>,
    pub media_url: Option<String>,
    /// Transcript of inbound audio, filled in by the transcription collaborator.
    pub transcript: Option<String>,
}

impl MsgContext {
    pub fn new(body: impl Into<String>) -> Self {
        Self {
            body: body.into(),
            ..Self::default()
        }
    }

    /// Group chats are flagged either by the adapter or by the sender id
    /// (`…@g.us` JIDs and `group:` keys).
    pub fn is_group(&self) -> bool {
        if self.chat_type == ChatType::Group {
            return true;
        }
        self.from
            .as_deref()
            .is_some_and(|from| from.contains("@g.us") || from.starts_with("group:"))
    }

    /// Sender without the transport prefix.
    pub fn from_normalized(&self) -> &str {
        strip_whatsapp_prefix(self.from.as_deref().unwrap_or_default())
    }

    /// Recipient without the transport prefix.
    pub fn to_normalized(&self) -> &str {
        strip_whatsapp_prefix(self.to.as_deref().unwrap_or_default())
    }
}

/// Strip a leading `whatsapp:` marker from an address.
pub fn strip_whatsapp_prefix(addr: &str) -> &str {
    addr.strip_prefix(WHATSAPP_PREFIX).unwrap_or(addr)
}

/// One unit handed to a delivery collaborator.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplyPayload {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub media_url: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub media_urls: Vec<String>,
}

impl ReplyPayload {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            ..Self::default()
        }
    }

    /// Every media reference carried by the payload, `media_urls` first.
    pub fn all_media(&self) -> Vec<&str> {
        if !self.media_urls.is_empty() {
            return self.media_urls.iter().map(String::as_str).collect();
        }
        self.media_url.as_deref().into_iter().collect()
    }

    pub fn is_empty(&self) -> bool {
        self.text.as_deref().is_none_or(|t| t.trim().is_empty())
            && self.media_url.is_none()
            && self.media_urls.is_empty()
    }
}
