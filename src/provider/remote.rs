use super::sse::ensure_success;
use super::{ChatChunk, ChunkStream, GenerationRequest, Message, OpenStream, Provider};
use anyhow::{anyhow, Context};
use serde::Serialize;
use std::collections::BTreeMap;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::StreamExt;

/// A hosted "generate code" endpoint that streams plain text back.
#[derive(Debug, Clone)]
pub struct RemoteProvider {
    http: reqwest::Client,
    endpoint: String,
}

impl RemoteProvider {
    pub fn new(http: reqwest::Client, endpoint: impl Into<String>) -> Self {
        Self {
            http,
            endpoint: endpoint.into(),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct Body<'a> {
    model: &'a str,
    provider: &'a str,
    shadcn: bool,
    api_keys: &'a BTreeMap<String, String>,
    messages: &'a [Message],
    #[serde(skip_serializing_if = "Option::is_none")]
    image_file: Option<&'a super::Attachment>,
}

/// Yields the longest valid UTF-8 prefix of everything pushed so far.
#[derive(Debug, Default)]
struct Utf8Buffer {
    pending: Vec<u8>,
}

impl Utf8Buffer {
    fn push(&mut self, bytes: &[u8]) -> anyhow::Result<String> {
        self.pending.extend_from_slice(bytes);
        let valid = match std::str::from_utf8(&self.pending) {
            Ok(_) => self.pending.len(),
            Err(e) if e.error_len().is_none() => e.valid_up_to(),
            Err(e) => return Err(anyhow!(e).context("response body is not valid UTF-8")),
        };
        let rest = self.pending.split_off(valid);
        let text = String::from_utf8(std::mem::replace(&mut self.pending, rest))?;
        Ok(text)
    }
}

fn text_chunks(resp: reqwest::Response) -> ChunkStream {
    let (tx, rx) = mpsc::channel::<anyhow::Result<ChatChunk>>(64);

    tokio::spawn(async move {
        let mut stream = resp.bytes_stream();
        let mut utf8 = Utf8Buffer::default();

        while let Some(item) = stream.next().await {
            let item = item
                .map_err(|e| anyhow!(e).context("network stream error"))
                .and_then(|b| utf8.push(&b));
            match item {
                Ok(text) if text.is_empty() => {}
                Ok(text) => {
                    if tx.send(Ok(ChatChunk { text })).await.is_err() {
                        return;
                    }
                }
                Err(e) => {
                    let _ = tx.send(Err(e)).await;
                    return;
                }
            }
        }
        if !utf8.pending.is_empty() {
            let _ = tx.send(Err(anyhow!("response body ended inside a UTF-8 sequence"))).await;
        }
    });

    Box::pin(ReceiverStream::new(rx))
}

impl Provider for RemoteProvider {
    fn name(&self) -> &'static str {
        "remote"
    }

    fn stream_chat(&self, req: GenerationRequest) -> OpenStream {
        let this = self.clone();

        Box::pin(async move {
            let body = Body {
                model: &req.model_id,
                provider: &req.provider_id,
                shadcn: req.style_flag,
                api_keys: &req.api_keys,
                messages: &req.transcript,
                image_file: req.attachment.as_ref(),
            };
            let resp = this
                .http
                .post(&this.endpoint)
                .json(&body)
                .send()
                .await
                .with_context(|| format!("failed to reach {}", this.endpoint))?;
            let resp = ensure_success(resp, "generation endpoint").await?;
            Ok(text_chunks(resp))
        })
    }
}
