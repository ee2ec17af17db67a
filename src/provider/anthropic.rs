use super::sse::{ensure_success, sse_chunks, Step};
use super::{GenerationRequest, OpenStream, Provider, Role};
use crate::prompt;
use anyhow::{anyhow, Context};
use serde::Deserialize;
use serde_json::{json, Value};

const API_VERSION: &str = "2023-06-01";

#[derive(Debug, Clone)]
pub struct AnthropicProvider {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl AnthropicProvider {
    pub fn new(http: reqwest::Client, base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            http,
            base_url: base_url.into(),
            api_key: api_key.into(),
        }
    }
}

fn body(req: &GenerationRequest) -> Value {
    let last = req.transcript.len().saturating_sub(1);
    let messages: Vec<Value> = req
        .transcript
        .iter()
        .enumerate()
        .map(|(i, m)| {
            let content = match &req.attachment {
                Some(image) if i == last && m.role == Role::User => json!([
                    {
                        "type": "image",
                        "source": {
                            "type": "base64",
                            "media_type": image.content_type,
                            "data": image.base64_data(),
                        },
                    },
                    { "type": "text", "text": m.content },
                ]),
                _ => json!(m.content),
            };
            json!({ "role": m.role.as_str(), "content": content })
        })
        .collect();

    json!({
        "model": req.model_id,
        "system": prompt::system_prompt(req.style_flag),
        "messages": messages,
        "max_tokens": req.max_tokens,
        "stream": true,
    })
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum Event {
    ContentBlockDelta { delta: BlockDelta },
    MessageStop,
    Error { error: ApiError },
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
struct BlockDelta {
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    message: String,
}

fn decode(data: &str) -> anyhow::Result<Step> {
    match serde_json::from_str::<Event>(data)? {
        Event::ContentBlockDelta { delta } => Ok(delta
            .text
            .filter(|t| !t.is_empty())
            .map_or(Step::Skip, Step::Text)),
        Event::MessageStop => Ok(Step::Done),
        Event::Error { error } => Err(anyhow!("Anthropic stream error: {}", error.message)),
        Event::Other => Ok(Step::Skip),
    }
}

impl Provider for AnthropicProvider {
    fn name(&self) -> &'static str {
        "anthropic"
    }

    fn stream_chat(&self, req: GenerationRequest) -> OpenStream {
        let this = self.clone();

        Box::pin(async move {
            let url = format!("{}/messages", this.base_url);
            let resp = this
                .http
                .post(&url)
                .header("x-api-key", &this.api_key)
                .header("anthropic-version", API_VERSION)
                .json(&body(&req))
                .send()
                .await
                .with_context(|| format!("failed to reach {url}"))?;
            let resp = ensure_success(resp, "Anthropic API").await?;
            Ok(sse_chunks(resp, decode))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::Attachment;
    use crate::test_support::serve;
    use tokio_stream::StreamExt;

    #[test]
    fn system_prompt_is_separate_and_image_is_base64_source() {
        let mut req = GenerationRequest::for_test("clone this");
        req.attachment = Some(Attachment {
            name: "shot.jpg".to_string(),
            content_type: "image/jpeg".to_string(),
            url: "data:image/jpeg;base64,QUJD".to_string(),
        });

        let b = body(&req);
        assert!(b["system"].as_str().unwrap().contains("React"));
        let content = &b["messages"][0]["content"];
        assert_eq!(content[0]["source"]["data"], "QUJD");
        assert_eq!(content[0]["source"]["media_type"], "image/jpeg");
        assert_eq!(content[1]["text"], "clone this");
    }

    #[test]
    fn decode_events() {
        assert_eq!(
            decode(r#"{"type":"content_block_delta","index":0,"delta":{"type":"text_delta","text":"hi"}}"#).unwrap(),
            Step::Text("hi".to_string())
        );
        assert_eq!(decode(r#"{"type":"ping"}"#).unwrap(), Step::Skip);
        assert_eq!(decode(r#"{"type":"message_stop"}"#).unwrap(), Step::Done);
        assert!(decode(r#"{"type":"error","error":{"type":"overloaded_error","message":"Overloaded"}}"#).is_err());
    }

    #[tokio::test]
    async fn streams_text_deltas() {
        let body = concat!(
            "event: message_start\n",
            "data: {\"type\":\"message_start\",\"message\":{}}\n\n",
            "event: content_block_delta\n",
            "data: {\"type\":\"content_block_delta\",\"index\":0,\"delta\":{\"type\":\"text_delta\",\"text\":\"```tsx\\n\"}}\n\n",
            "event: content_block_delta\n",
            "data: {\"type\":\"content_block_delta\",\"index\":0,\"delta\":{\"type\":\"text_delta\",\"text\":\"<App />\"}}\n\n",
            "event: message_stop\n",
            "data: {\"type\":\"message_stop\"}\n\n",
        );
        let base = serve(200, "text/event-stream", body.to_string()).await;
        let p = AnthropicProvider::new(reqwest::Client::new(), base, "key");

        let stream = p.stream_chat(GenerationRequest::for_test("x")).await.unwrap();
        let text: Vec<String> = stream.map(|c| c.unwrap().text).collect().await;
        assert_eq!(text, vec!["```tsx\n", "<App />"]);
    }
}
