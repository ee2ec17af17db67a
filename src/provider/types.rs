use futures_core::stream::BoxStream;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::future::Future;
use std::pin::Pin;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// An image supplied alongside the latest user message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Attachment {
    pub name: String,
    pub content_type: String,
    /// `data:<content_type>;base64,<payload>`
    pub url: String,
}

impl Attachment {
    /// Base64 payload without the data URL prefix.
    pub fn base64_data(&self) -> &str {
        self.url
            .split_once(";base64,")
            .map(|(_, data)| data)
            .unwrap_or(&self.url)
    }
}

/// One generation turn.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationRequest {
    pub provider_id: String,
    pub model_id: String,
    pub max_tokens: u32,
    pub transcript: Vec<Message>,
    pub style_flag: bool,
    pub api_keys: BTreeMap<String, String>,
    pub attachment: Option<Attachment>,
}

#[cfg(test)]
impl GenerationRequest {
    pub fn for_test(prompt: &str) -> Self {
        Self {
            provider_id: "Anthropic".to_string(),
            model_id: "claude-3-5-sonnet-latest".to_string(),
            max_tokens: 8000,
            transcript: vec![Message::user(prompt)],
            style_flag: false,
            api_keys: BTreeMap::new(),
            attachment: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ChatChunk {
    pub text: String,
}

pub type ChunkStream = BoxStream<'static, anyhow::Result<ChatChunk>>;

pub type OpenStream = Pin<Box<dyn Future<Output = anyhow::Result<ChunkStream>> + Send>>;

/// A generation backend.
///
/// The returned future resolves once the backend accepted the request; the
/// stream then yields text chunks until it ends or fails.
pub trait Provider {
    fn name(&self) -> &'static str;

    /// Start streaming a response.
    fn stream_chat(&self, req: GenerationRequest) -> OpenStream;
}
