//! Streaming chat completion client.

use futures_util::StreamExt;

use super::wire::{ChatCompletionRequest, StreamChunk};
use super::ChatError;

/// Base URL of the upstream completion API.
pub const API_BASE_URL: &str = "https://api.ppinfra.com/v3/openai";

/// One parsed line of the server-sent-event body.
enum SseLine {
    /// A decoded data chunk.
    Chunk(Box<StreamChunk>),
    /// The literal `data: [DONE]` terminator.
    Done,
    /// Blank line, comment, or an undecodable data payload.
    Skip,
}

/// Parse one line of the SSE body.
fn parse_sse_line(line: &str) -> SseLine {
    let Some(data) = line.strip_prefix("data: ") else {
        return SseLine::Skip;
    };

    if data == "[DONE]" {
        return SseLine::Done;
    }

    match serde_json::from_str::<StreamChunk>(data) {
        Ok(chunk) => SseLine::Chunk(Box::new(chunk)),
        Err(e) => {
            tracing::warn!(error = %e, "failed to decode stream chunk, skipping");
            SseLine::Skip
        }
    }
}

/// An accepted completion stream: the POST went through and the response
/// status was checked, but no body bytes have been consumed yet.
///
/// Splitting acceptance from draining lets the caller surface an upstream
/// rejection as a plain error response before committing to any streaming
/// framing of its own.
#[derive(Debug)]
pub struct CompletionStream {
    response: reqwest::Response,
}

impl CompletionStream {
    /// Drain the SSE body, handing every decoded chunk to `handler`.
    ///
    /// Returns when the upstream sends `data: [DONE]` or closes the body. A
    /// handler error aborts the stream and is surfaced to the caller; the
    /// connection is dropped, which releases the upstream request.
    pub async fn for_each_chunk<F>(self, mut handler: F) -> Result<(), ChatError>
    where
        F: FnMut(&StreamChunk) -> Result<(), ChatError>,
    {
        let mut body = self.response.bytes_stream();
        let mut buf: Vec<u8> = Vec::new();

        'stream: while let Some(chunk) = body.next().await {
            let bytes = chunk?;
            buf.extend_from_slice(&bytes);

            // SSE frames are newline-delimited; a TCP chunk may carry a
            // partial line, so keep the tail buffered.
            while let Some(pos) = buf.iter().position(|&b| b == b'\n') {
                let line: Vec<u8> = buf.drain(..=pos).collect();
                let line = String::from_utf8_lossy(&line);

                match parse_sse_line(line.trim()) {
                    SseLine::Done => break 'stream,
                    SseLine::Chunk(chunk) => handler(&chunk)?,
                    SseLine::Skip => {}
                }
            }
        }

        Ok(())
    }
}

/// Client for the upstream completion API. Pure transport: no persistence,
/// no retries.
#[derive(Clone)]
pub struct ChatClient {
    http: reqwest::Client,
    api_key: String,
    base_url: String,
}

impl ChatClient {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            api_key: api_key.into(),
            base_url: API_BASE_URL.to_string(),
        }
    }

    /// Point the client at a different base URL (tests, self-hosted gateways).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// POST a streaming completion and check the response status. A
    /// non-success status is an error carrying the response body; on success
    /// the returned stream is open but undrained.
    pub async fn open_stream(
        &self,
        request: &ChatCompletionRequest,
    ) -> Result<CompletionStream, ChatError> {
        let response = self
            .http
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(ChatError::Upstream { status, body });
        }

        Ok(CompletionStream { response })
    }

    /// POST a streaming completion and hand every decoded chunk to `handler`.
    ///
    /// Convenience for [`Self::open_stream`] followed by
    /// [`CompletionStream::for_each_chunk`].
    pub async fn stream_completion<F>(
        &self,
        request: &ChatCompletionRequest,
        handler: F,
    ) -> Result<(), ChatError>
    where
        F: FnMut(&StreamChunk) -> Result<(), ChatError>,
    {
        self.open_stream(request).await?.for_each_chunk(handler).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_done_line() {
        assert!(matches!(parse_sse_line("data: [DONE]"), SseLine::Done));
    }

    #[test]
    fn test_parse_chunk_line() {
        let line = r#"data: {"choices":[{"index":0,"delta":{"content":"he"}}]}"#;
        match parse_sse_line(line) {
            SseLine::Chunk(chunk) => {
                assert_eq!(chunk.choices[0].delta.content.as_deref(), Some("he"));
            }
            _ => panic!("expected a chunk"),
        }
    }

    #[test]
    fn test_blank_and_comment_lines_skipped() {
        assert!(matches!(parse_sse_line(""), SseLine::Skip));
        assert!(matches!(parse_sse_line(": keep-alive"), SseLine::Skip));
        assert!(matches!(parse_sse_line("event: message"), SseLine::Skip));
    }

    #[test]
    fn test_undecodable_data_skipped() {
        assert!(matches!(parse_sse_line("data: not json"), SseLine::Skip));
    }

    #[test]
    fn test_done_requires_exact_payload() {
        // "[DONE]extra" is not the terminator; it is garbage data.
        assert!(matches!(parse_sse_line("data: [DONE]extra"), SseLine::Skip));
    }

    #[test]
    fn test_chunk_accumulation_over_lines() {
        // Deltas "he" and "llo" plus a terminal usage of 7 tokens
        // accumulate to "hello"/7.
        let lines = [
            r#"data: {"choices":[{"index":0,"delta":{"content":"he"}}]}"#,
            r#"data: {"choices":[{"index":0,"delta":{"content":"llo"}}]}"#,
            r#"data: {"choices":[],"usage":{"prompt_tokens":3,"completion_tokens":4,"total_tokens":7}}"#,
            "data: [DONE]",
        ];

        let mut full = String::new();
        let mut usage = None;
        for line in lines {
            match parse_sse_line(line) {
                SseLine::Chunk(chunk) => {
                    for choice in &chunk.choices {
                        if let Some(content) = choice.delta.content.as_deref() {
                            full.push_str(content);
                        }
                    }
                    if let Some(u) = chunk.usage {
                        usage = Some(u);
                    }
                }
                SseLine::Done => break,
                SseLine::Skip => {}
            }
        }

        assert_eq!(full, "hello");
        assert_eq!(usage.unwrap().total_tokens, 7);
    }
}
