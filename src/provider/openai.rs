use super::sse::{ensure_success, sse_chunks, Step};
use super::{GenerationRequest, OpenStream, Provider, Role};
use crate::prompt;
use anyhow::Context;
use serde::Deserialize;
use serde_json::{json, Value};

/// Any backend that speaks OpenAI chat completions with `stream: true`.
#[derive(Debug, Clone)]
pub struct OpenAiProvider {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl OpenAiProvider {
    pub fn new(http: reqwest::Client, base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            http,
            base_url: base_url.into(),
            api_key: api_key.into(),
        }
    }
}

fn body(req: &GenerationRequest) -> Value {
    let mut messages = vec![json!({
        "role": "system",
        "content": prompt::system_prompt(req.style_flag),
    })];

    let last = req.transcript.len().saturating_sub(1);
    for (i, m) in req.transcript.iter().enumerate() {
        let content = match &req.attachment {
            Some(image) if i == last && m.role == Role::User => json!([
                { "type": "text", "text": m.content },
                { "type": "image_url", "image_url": { "url": image.url } },
            ]),
            _ => json!(m.content),
        };
        messages.push(json!({ "role": m.role.as_str(), "content": content }));
    }

    json!({
        "model": req.model_id,
        "messages": messages,
        "max_tokens": req.max_tokens,
        "stream": true,
    })
}

#[derive(Debug, Deserialize)]
struct StreamResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    delta: Delta,
}

#[derive(Debug, Deserialize)]
struct Delta {
    content: Option<String>,
}

fn decode(data: &str) -> anyhow::Result<Step> {
    if data.trim() == "[DONE]" {
        return Ok(Step::Done);
    }
    let r: StreamResponse = serde_json::from_str(data)?;
    Ok(r
        .choices
        .into_iter()
        .next()
        .and_then(|c| c.delta.content)
        .filter(|t| !t.is_empty())
        .map_or(Step::Skip, Step::Text))
}

impl Provider for OpenAiProvider {
    fn name(&self) -> &'static str {
        "openai"
    }

    fn stream_chat(&self, req: GenerationRequest) -> OpenStream {
        let this = self.clone();

        Box::pin(async move {
            let url = format!("{}/chat/completions", this.base_url);
            let mut builder = this.http.post(&url).json(&body(&req));
            if !this.api_key.is_empty() {
                builder = builder.bearer_auth(&this.api_key);
            }

            let resp = builder
                .send()
                .await
                .with_context(|| format!("failed to reach {url}"))?;
            let resp = ensure_success(resp, &req.provider_id).await?;
            Ok(sse_chunks(resp, decode))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::{Attachment, Message};
    use crate::test_support::serve;
    use tokio_stream::StreamExt;

    #[test]
    fn image_goes_on_the_last_user_message() {
        let mut req = GenerationRequest::for_test("make it blue");
        req.transcript.insert(0, Message::user("todo app"));
        req.transcript.insert(1, Message::assistant("```tsx\nA\n```"));
        req.attachment = Some(Attachment {
            name: "a.png".to_string(),
            content_type: "image/png".to_string(),
            url: "data:image/png;base64,AAAA".to_string(),
        });

        let b = body(&req);
        let messages = b["messages"].as_array().unwrap();
        assert_eq!(messages.len(), 4);
        assert_eq!(messages[0]["role"], "system");
        assert_eq!(messages[1]["content"], "todo app");
        assert_eq!(messages[2]["role"], "assistant");
        assert_eq!(messages[3]["content"][1]["image_url"]["url"], "data:image/png;base64,AAAA");
        assert_eq!(b["stream"], true);
    }

    #[test]
    fn decode_handles_done_and_empty_deltas() {
        assert_eq!(decode("[DONE]").unwrap(), Step::Done);
        assert_eq!(decode(r#"{"choices":[{"delta":{"role":"assistant"}}]}"#).unwrap(), Step::Skip);
        assert_eq!(
            decode(r#"{"choices":[{"delta":{"content":"hi"}}]}"#).unwrap(),
            Step::Text("hi".to_string())
        );
        assert!(decode("{not json").is_err());
    }

    #[tokio::test]
    async fn streams_content_until_done() {
        let body = concat!(
            "data: {\"choices\":[{\"delta\":{\"content\":\"```ts\\n\"}}]}\n\n",
            "data: {\"choices\":[{\"delta\":{\"content\":\"let a = 1;\"}}]}\n\n",
            "data: [DONE]\n\n",
            "data: {\"choices\":[{\"delta\":{\"content\":\"ignored\"}}]}\n\n",
        );
        let base = serve(200, "text/event-stream", body.to_string()).await;
        let p = OpenAiProvider::new(reqwest::Client::new(), base, "sk-test");

        let stream = p.stream_chat(GenerationRequest::for_test("x")).await.unwrap();
        let text: Vec<String> = stream.map(|c| c.unwrap().text).collect().await;
        assert_eq!(text, vec!["```ts\n", "let a = 1;"]);
    }

    #[tokio::test]
    async fn bad_status_fails_to_open() {
        let base = serve(401, "application/json", r#"{"error":"bad key"}"#.to_string()).await;
        let p = OpenAiProvider::new(reqwest::Client::new(), base, "");
        let err = p.stream_chat(GenerationRequest::for_test("x")).await.err().unwrap();
        assert!(format!("{err:#}").contains("401"));
    }
}
