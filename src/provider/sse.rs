use super::types::{ChatChunk, ChunkStream};
use anyhow::anyhow;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::StreamExt;

/// What one decoded event contributes to the output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step {
    Text(String),
    Skip,
    Done,
}

/// Fail with the response body when the backend refused the request.
pub async fn ensure_success(resp: reqwest::Response, what: &str) -> anyhow::Result<reqwest::Response> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let text = resp.text().await.unwrap_or_default();
    Err(anyhow!("{what} error: HTTP {status}: {}", text.trim()))
}

/// Decode an SSE body, turning each `data:` payload into a [`Step`].
pub fn sse_chunks<F>(resp: reqwest::Response, mut decode: F) -> ChunkStream
where
    F: FnMut(&str) -> anyhow::Result<Step> + Send + 'static,
{
    let (tx, rx) = mpsc::channel::<anyhow::Result<ChatChunk>>(64);

    tokio::spawn(async move {
        let mut stream = resp.bytes_stream();
        let mut parser = SseParser::new();
        let mut ended = false;

        while !ended {
            let events = match stream.next().await {
                Some(Ok(bytes)) => parser.push(&bytes),
                Some(Err(e)) => {
                    let _ = tx.send(Err(anyhow!(e).context("network stream error"))).await;
                    return;
                }
                // An event without its closing blank line still counts.
                None => {
                    ended = true;
                    parser.finish()
                }
            };

            for ev in events {
                let data = match ev {
                    Ok(SseEvent::Data(data)) => data,
                    Ok(SseEvent::Other) => continue,
                    Err(e) => {
                        let _ = tx.send(Err(e)).await;
                        return;
                    }
                };
                if data.trim().is_empty() {
                    continue;
                }
                match decode(&data) {
                    Ok(Step::Text(text)) => {
                        if tx.send(Ok(ChatChunk { text })).await.is_err() {
                            return;
                        }
                    }
                    Ok(Step::Skip) => {}
                    Ok(Step::Done) => return,
                    Err(e) => {
                        let _ = tx.send(Err(e.context("failed to decode SSE event"))).await;
                        return;
                    }
                }
            }
        }
    });

    Box::pin(ReceiverStream::new(rx))
}

/// Split a body into newline-delimited records (Ollama streams JSON lines).
pub fn json_line_chunks<F>(resp: reqwest::Response, mut decode: F) -> ChunkStream
where
    F: FnMut(&str) -> anyhow::Result<Step> + Send + 'static,
{
    let (tx, rx) = mpsc::channel::<anyhow::Result<ChatChunk>>(64);

    tokio::spawn(async move {
        let mut stream = resp.bytes_stream();
        let mut lines = LineBuffer::default();
        let mut ended = false;

        while !ended {
            let batch = match stream.next().await {
                Some(Ok(bytes)) => lines.push(&bytes),
                Some(Err(e)) => {
                    let _ = tx.send(Err(anyhow!(e).context("network stream error"))).await;
                    return;
                }
                None => {
                    ended = true;
                    lines.finish().into_iter().collect()
                }
            };

            for line in batch {
                let line = match line {
                    Ok(l) => l,
                    Err(e) => {
                        let _ = tx.send(Err(e)).await;
                        return;
                    }
                };
                if line.trim().is_empty() {
                    continue;
                }
                match decode(&line) {
                    Ok(Step::Text(text)) => {
                        if tx.send(Ok(ChatChunk { text })).await.is_err() {
                            return;
                        }
                    }
                    Ok(Step::Skip) => {}
                    Ok(Step::Done) => return,
                    Err(e) => {
                        let _ = tx.send(Err(e.context("failed to decode JSON line"))).await;
                        return;
                    }
                }
            }
        }
    });

    Box::pin(ReceiverStream::new(rx))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SseEvent {
    Data(String),
    Other,
}

/// Collects complete UTF-8 lines from arbitrarily split byte chunks.
#[derive(Debug, Default)]
pub struct LineBuffer {
    buf: Vec<u8>,
}

impl LineBuffer {
    pub fn push(&mut self, chunk: &[u8]) -> Vec<anyhow::Result<String>> {
        self.buf.extend_from_slice(chunk);
        let mut out = Vec::new();

        while let Some(pos) = self.buf.iter().position(|&b| b == b'\n') {
            let mut line = self.buf.drain(..=pos).collect::<Vec<u8>>();
            line.pop();
            if line.ends_with(b"\r") {
                line.pop();
            }
            out.push(
                String::from_utf8(line).map_err(|e| anyhow!(e).context("stream line is not valid UTF-8")),
            );
        }

        out
    }

    /// Whatever is left once the body ends, as a last unterminated line.
    pub fn finish(&mut self) -> Option<anyhow::Result<String>> {
        if self.buf.is_empty() {
            return None;
        }
        let mut line = std::mem::take(&mut self.buf);
        if line.ends_with(b"\r") {
            line.pop();
        }
        Some(String::from_utf8(line).map_err(|e| anyhow!(e).context("stream line is not valid UTF-8")))
    }
}

/// Minimal SSE parser.
///
/// - Collects UTF-8 lines
/// - Emits Data events when a blank line ends an event
#[derive(Debug, Default)]
pub struct SseParser {
    lines: LineBuffer,
    cur_data: String,
}

impl SseParser {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, chunk: &[u8]) -> Vec<anyhow::Result<SseEvent>> {
        let lines = self.lines.push(chunk);
        self.feed(lines)
    }

    /// Flush a trailing line and any event still waiting for its blank line.
    pub fn finish(&mut self) -> Vec<anyhow::Result<SseEvent>> {
        let mut lines: Vec<_> = self.lines.finish().into_iter().collect();
        lines.push(Ok(String::new()));
        self.feed(lines)
    }

    fn feed(&mut self, lines: Vec<anyhow::Result<String>>) -> Vec<anyhow::Result<SseEvent>> {
        let mut out = Vec::new();

        for line in lines {
            let line = match line {
                Ok(l) => l,
                Err(e) => {
                    out.push(Err(e));
                    continue;
                }
            };

            if line.is_empty() {
                if !self.cur_data.is_empty() {
                    if self.cur_data.ends_with('\n') {
                        self.cur_data.pop();
                    }
                    out.push(Ok(SseEvent::Data(std::mem::take(&mut self.cur_data))));
                }
                continue;
            }

            if let Some(rest) = line.strip_prefix("data:") {
                let rest = rest.strip_prefix(' ').unwrap_or(rest);
                self.cur_data.push_str(rest);
                self.cur_data.push('\n');
            } else {
                // event:, id:, retry: and comments carry nothing we need.
                out.push(Ok(SseEvent::Other));
            }
        }

        out
    }
}
