//! Shared wire parsers for provider streams.
//!
//! Remote providers stream over HTTP SSE; the local provider streams
//! newline-delimited JSON. Both reduce to the same line-buffering loop:
//! - Line buffering from chunked responses
//! - `data: ` prefix extraction and `[DONE]` filtering (SSE only)
//! - Remaining-buffer processing for providers that end without a final
//!   newline (configurable)
//!
//! Transport read errors are yielded as items so the streaming adapter
//! can classify them as mid-stream failures.

use bytes::{Bytes, BytesMut};
use futures::Stream;
use tokio_stream::StreamExt;

/// Options for the line parsers.
#[derive(Clone, Debug)]
pub struct SseParserOptions {
    /// Whether to process remaining buffer content after the stream ends.
    /// Default: `true` (Gemini needs this; `OpenAI` sends explicit `[DONE]`).
    pub process_remaining_buffer: bool,
}

impl Default for SseParserOptions {
    fn default() -> Self {
        Self {
            process_remaining_buffer: true,
        }
    }
}

/// Parse SSE lines from a byte stream, yielding JSON data strings.
///
/// Read errors are passed through; the stream ends after the first error.
pub fn parse_sse_lines<S>(
    byte_stream: S,
    options: &SseParserOptions,
) -> impl Stream<Item = Result<String, reqwest::Error>> + Send + use<S>
where
    S: Stream<Item = Result<Bytes, reqwest::Error>> + Send + Unpin + 'static,
{
    parse_lines(byte_stream, options.process_remaining_buffer, extract_sse_data)
}

/// Parse newline-delimited JSON from a byte stream.
///
/// Every non-empty line is yielded verbatim; there is no prefix or
/// `[DONE]` handling.
pub fn parse_json_lines<S>(
    byte_stream: S,
    options: &SseParserOptions,
) -> impl Stream<Item = Result<String, reqwest::Error>> + Send + use<S>
where
    S: Stream<Item = Result<Bytes, reqwest::Error>> + Send + Unpin + 'static,
{
    parse_lines(byte_stream, options.process_remaining_buffer, extract_json_line)
}

fn parse_lines<S>(
    byte_stream: S,
    process_remaining: bool,
    extract: fn(&str) -> Option<String>,
) -> impl Stream<Item = Result<String, reqwest::Error>> + Send + use<S>
where
    S: Stream<Item = Result<Bytes, reqwest::Error>> + Send + Unpin + 'static,
{
    futures::stream::unfold(
        (byte_stream, BytesMut::with_capacity(8192), false),
        move |(mut stream, mut buffer, done)| async move {
            if done {
                return None;
            }

            loop {
                // Check buffer for a complete line (\n)
                if let Some(newline_pos) = buffer.iter().position(|&b| b == b'\n') {
                    let mut line_bytes = buffer.split_to(newline_pos + 1);
                    line_bytes.truncate(line_bytes.len() - 1);
                    if line_bytes.last() == Some(&b'\r') {
                        line_bytes.truncate(line_bytes.len() - 1);
                    }

                    let line = match std::str::from_utf8(&line_bytes) {
                        Ok(s) => s,
                        Err(_) => continue, // skip invalid UTF-8 lines
                    };

                    if let Some(data) = extract(line) {
                        return Some((Ok(data), (stream, buffer, false)));
                    }
                    continue;
                }

                match stream.next().await {
                    Some(Ok(chunk)) => {
                        buffer.extend_from_slice(&chunk);
                    }
                    Some(Err(e)) => {
                        // Surface the read error, then end the stream.
                        return Some((Err(e), (stream, buffer, true)));
                    }
                    None => {
                        if process_remaining && !buffer.is_empty() {
                            let line = match std::str::from_utf8(&buffer) {
                                Ok(s) => s.trim().to_owned(),
                                Err(_) => return None,
                            };
                            buffer.clear();
                            if let Some(data) = extract(&line) {
                                return Some((Ok(data), (stream, buffer, true)));
                            }
                        }
                        return None;
                    }
                }
            }
        },
    )
}

/// Extract the data payload from an SSE line.
///
/// Returns `Some(data)` for valid data lines, `None` for comments, empty
/// lines, non-data fields, and `[DONE]` markers.
fn extract_sse_data(line: &str) -> Option<String> {
    let trimmed = line.trim();

    if trimmed.is_empty() || trimmed.starts_with(':') {
        return None;
    }

    let data = trimmed
        .strip_prefix("data: ")
        .or_else(|| trimmed.strip_prefix("data:"))?;

    let data = data.trim();

    if data == "[DONE]" || data.is_empty() {
        return None;
    }

    Some(data.to_owned())
}

fn extract_json_line(line: &str) -> Option<String> {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return None;
    }
    Some(trimmed.to_owned())
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    async fn collect_sse(chunks: Vec<&'static str>, options: &SseParserOptions) -> Vec<String> {
        let stream = futures::stream::iter(
            chunks
                .into_iter()
                .map(|c| Ok::<_, reqwest::Error>(Bytes::from(c))),
        );
        parse_sse_lines(stream, options)
            .filter_map(|r| r.ok())
            .collect()
            .await
    }

    // ── extract_sse_data ─────────────────────────────────────────────────

    #[test]
    fn extract_data_line() {
        assert_eq!(
            extract_sse_data("data: {\"type\":\"message\"}"),
            Some("{\"type\":\"message\"}".into())
        );
    }

    #[test]
    fn extract_data_line_no_space() {
        assert_eq!(extract_sse_data("data:{\"a\":1}"), Some("{\"a\":1}".into()));
    }

    #[test]
    fn extract_skips_done_marker() {
        assert_eq!(extract_sse_data("data: [DONE]"), None);
    }

    #[test]
    fn extract_skips_empty_comment_and_fields() {
        assert_eq!(extract_sse_data(""), None);
        assert_eq!(extract_sse_data(": comment"), None);
        assert_eq!(extract_sse_data("event: ping"), None);
        assert_eq!(extract_sse_data("data: "), None);
    }

    // ── parse_sse_lines ──────────────────────────────────────────────────

    #[tokio::test]
    async fn parse_single_chunk_single_event() {
        let results = collect_sse(
            vec!["data: {\"type\":\"hello\"}\n\n"],
            &SseParserOptions::default(),
        )
        .await;
        assert_eq!(results, ["{\"type\":\"hello\"}"]);
    }

    #[tokio::test]
    async fn parse_multiple_events_one_chunk() {
        let results = collect_sse(
            vec!["data: {\"a\":1}\n\ndata: {\"b\":2}\n\n"],
            &SseParserOptions::default(),
        )
        .await;
        assert_eq!(results, ["{\"a\":1}", "{\"b\":2}"]);
    }

    #[tokio::test]
    async fn parse_event_split_across_chunks() {
        let results = collect_sse(
            vec!["data: {\"par", "tial\":true}\n\n"],
            &SseParserOptions::default(),
        )
        .await;
        assert_eq!(results, ["{\"partial\":true}"]);
    }

    #[tokio::test]
    async fn parse_filters_done_and_comments() {
        let results = collect_sse(
            vec![": hi\n\ndata: {\"ok\":true}\n\ndata: [DONE]\n\n"],
            &SseParserOptions::default(),
        )
        .await;
        assert_eq!(results, ["{\"ok\":true}"]);
    }

    #[tokio::test]
    async fn parse_remaining_buffer_enabled() {
        let results = collect_sse(
            vec!["data: {\"trailing\":true}"],
            &SseParserOptions {
                process_remaining_buffer: true,
            },
        )
        .await;
        assert_eq!(results, ["{\"trailing\":true}"]);
    }

    #[tokio::test]
    async fn parse_remaining_buffer_disabled() {
        let results = collect_sse(
            vec!["data: {\"trailing\":true}"],
            &SseParserOptions {
                process_remaining_buffer: false,
            },
        )
        .await;
        assert!(results.is_empty());
    }

    #[tokio::test]
    async fn parse_handles_carriage_returns() {
        let results = collect_sse(
            vec!["data: {\"cr\":true}\r\n\r\n"],
            &SseParserOptions::default(),
        )
        .await;
        assert_eq!(results, ["{\"cr\":true}"]);
    }

    // ── parse_json_lines ─────────────────────────────────────────────────

    #[tokio::test]
    async fn json_lines_yield_each_line() {
        let stream = futures::stream::iter(vec![Ok::<_, reqwest::Error>(Bytes::from(
            "{\"a\":1}\n{\"b\":2}\n",
        ))]);
        let results: Vec<String> = parse_json_lines(stream, &SseParserOptions::default())
            .filter_map(|r| r.ok())
            .collect()
            .await;
        assert_eq!(results, ["{\"a\":1}", "{\"b\":2}"]);
    }

    #[tokio::test]
    async fn json_lines_skip_blank_lines() {
        let stream = futures::stream::iter(vec![Ok::<_, reqwest::Error>(Bytes::from(
            "{\"a\":1}\n\n  \n{\"b\":2}",
        ))]);
        let results: Vec<String> = parse_json_lines(stream, &SseParserOptions::default())
            .filter_map(|r| r.ok())
            .collect()
            .await;
        assert_eq!(results, ["{\"a\":1}", "{\"b\":2}"]);
    }
}
