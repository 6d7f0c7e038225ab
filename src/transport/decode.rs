//! Streaming decoders (bytes → provider-native JSON chunks).
//!
//! This layer decodes *framing* only (SSE or NDJSON) and leaves the
//! meaning of each chunk to the adapter's extractors.

use bytes::Bytes;
use futures::{stream, StreamExt};
use serde_json::Value;

use crate::adapter::WireFormat;
use crate::BoxStream;

pub trait Decoder: Send + Sync {
    /// Decode a byte stream into JSON chunks. Transport errors pass
    /// through; frames that are not JSON payloads (comments, keep-alives)
    /// are skipped.
    fn decode(&self, input: BoxStream<'static, Bytes>) -> BoxStream<'static, Value>;
}

pub fn decoder_for(format: WireFormat) -> Box<dyn Decoder> {
    match format {
        WireFormat::Sse => Box::new(SseDecoder::default()),
        WireFormat::Ndjson => Box::new(NdjsonDecoder),
    }
}

/// Server-sent-events decoder:
/// - splits on the frame delimiter (default `"\n\n"`)
/// - strips the `data:` prefix
/// - skips `:` comment lines
/// - stops at the done sentinel (default `"[DONE]"`)
/// - flushes whatever remains in the buffer at EOF
pub struct SseDecoder {
    delimiter: String,
    prefix: String,
    done_signal: String,
}

impl Default for SseDecoder {
    fn default() -> Self {
        Self {
            delimiter: "\n\n".to_string(),
            prefix: "data: ".to_string(),
            done_signal: "[DONE]".to_string(),
        }
    }
}

impl SseDecoder {
    pub fn new(delimiter: impl Into<String>, prefix: impl Into<String>, done_signal: impl Into<String>) -> Self {
        Self {
            delimiter: delimiter.into(),
            prefix: prefix.into(),
            done_signal: done_signal.into(),
        }
    }
}

impl Decoder for SseDecoder {
    fn decode(&self, input: BoxStream<'static, Bytes>) -> BoxStream<'static, Value> {
        let delimiter = self.delimiter.clone();
        let prefix = self.prefix.clone();
        let done_signal = self.done_signal.clone();

        let stream = stream::unfold((input, String::new()), move |(mut input, mut buf)| {
            let delimiter = delimiter.clone();
            let prefix = prefix.clone();
            let done_signal = done_signal.clone();
            async move {
                let is_done = |frame: &str| {
                    let trimmed = frame.trim();
                    trimmed == done_signal
                        || trimmed
                            .strip_prefix("data:")
                            .map(|rest| rest.trim() == done_signal)
                            .unwrap_or(false)
                };

                let parse_frame = |raw: &str| -> Option<Value> {
                    let trimmed = raw.trim();
                    if trimmed.is_empty() || trimmed.starts_with(':') {
                        return None;
                    }
                    let payload = trimmed
                        .strip_prefix(prefix.as_str())
                        .or_else(|| trimmed.strip_prefix("data:").map(str::trim_start))
                        .unwrap_or(trimmed);
                    serde_json::from_str(payload).ok()
                };

                loop {
                    // Emit the next full frame if one is already buffered.
                    if let Some(index) = buf.find(&delimiter) {
                        let frame = buf[..index].to_string();
                        buf.drain(..index + delimiter.len());
                        if is_done(&frame) {
                            return None;
                        }
                        if let Some(value) = parse_frame(&frame) {
                            return Some((Ok(value), (input, buf)));
                        }
                        // non-JSON frame: skip and keep scanning
                        continue;
                    }

                    match input.next().await {
                        Some(Ok(bytes)) => {
                            buf.push_str(&String::from_utf8_lossy(&bytes));
                        }
                        Some(Err(e)) => return Some((Err(e), (input, buf))),
                        None => {
                            // EOF: the last frame may lack a trailing delimiter
                            if is_done(&buf) {
                                return None;
                            }
                            let leftover = std::mem::take(&mut buf);
                            return parse_frame(&leftover).map(|value| (Ok(value), (input, buf)));
                        }
                    }
                }
            }
        });

        Box::pin(stream)
    }
}

/// NDJSON / JSONL decoder: one JSON object per line.
pub struct NdjsonDecoder;

impl Decoder for NdjsonDecoder {
    fn decode(&self, input: BoxStream<'static, Bytes>) -> BoxStream<'static, Value> {
        let stream = stream::unfold((input, String::new()), |(mut input, mut buf)| async move {
            loop {
                if let Some(index) = buf.find('\n') {
                    let line = buf[..index].trim().to_string();
                    buf.drain(..index + 1);
                    if line.is_empty() {
                        continue;
                    }
                    match serde_json::from_str::<Value>(&line) {
                        Ok(value) => return Some((Ok(value), (input, buf))),
                        Err(e) => return Some((Err(crate::Error::Serialization(e)), (input, buf))),
                    }
                }

                match input.next().await {
                    Some(Ok(bytes)) => {
                        buf.push_str(&String::from_utf8_lossy(&bytes));
                    }
                    Some(Err(e)) => return Some((Err(e), (input, buf))),
                    None => {
                        let line = std::mem::take(&mut buf);
                        let line = line.trim();
                        if line.is_empty() {
                            return None;
                        }
                        return serde_json::from_str::<Value>(line)
                            .ok()
                            .map(|value| (Ok(value), (input, buf)));
                    }
                }
            }
        });

        Box::pin(stream)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn byte_stream(chunks: Vec<&'static str>) -> BoxStream<'static, Bytes> {
        Box::pin(tokio_stream::iter(
            chunks
                .into_iter()
                .map(|s| Ok::<_, crate::Error>(Bytes::from(s))),
        ))
    }

    async fn collect(stream: BoxStream<'static, Value>) -> Vec<Value> {
        stream.map(|r| r.unwrap()).collect().await
    }

    #[tokio::test]
    async fn sse_frames_split_across_byte_chunks() {
        let decoder = SseDecoder::default();
        let input = byte_stream(vec![
            "data: {\"n\"",
            ": 1}\n\ndata: {\"n\": 2}\n\n",
            "data: [DONE]\n\n",
        ]);
        let values = collect(decoder.decode(input)).await;
        assert_eq!(values.len(), 2);
        assert_eq!(values[0]["n"], 1);
        assert_eq!(values[1]["n"], 2);
    }

    #[tokio::test]
    async fn sse_skips_comments_and_non_json_frames() {
        let decoder = SseDecoder::default();
        let input = byte_stream(vec![": keep-alive\n\nnot json\n\ndata: {\"ok\": true}\n\n"]);
        let values = collect(decoder.decode(input)).await;
        assert_eq!(values, vec![serde_json::json!({"ok": true})]);
    }

    #[tokio::test]
    async fn sse_flushes_final_frame_without_delimiter() {
        let decoder = SseDecoder::default();
        let input = byte_stream(vec!["data: {\"last\": true}"]);
        let values = collect(decoder.decode(input)).await;
        assert_eq!(values, vec![serde_json::json!({"last": true})]);
    }

    #[tokio::test]
    async fn sse_stops_at_done_sentinel() {
        let decoder = SseDecoder::default();
        let input = byte_stream(vec!["data: [DONE]\n\ndata: {\"after\": true}\n\n"]);
        let values = collect(decoder.decode(input)).await;
        assert!(values.is_empty());
    }

    #[tokio::test]
    async fn ndjson_decodes_line_per_object() {
        let decoder = NdjsonDecoder;
        let input = byte_stream(vec!["{\"a\": 1}\n{\"a\"", ": 2}\n{\"a\": 3}"]);
        let values = collect(decoder.decode(input)).await;
        assert_eq!(values.len(), 3);
        assert_eq!(values[2]["a"], 3);
    }
}
