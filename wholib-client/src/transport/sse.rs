//! Server-push (SSE) transport
//!
//! Consumes a `text/event-stream` response incrementally. Frames follow the
//! standard wire format: `event:` names the frame, `data:` lines carry the
//! JSON payload, a blank line dispatches, and `:` comment lines are
//! keep-alives. Payloads decode to `ServerEvent`; an unparseable payload is
//! a protocol error that is logged and skipped without tearing down the
//! connection.

use futures::StreamExt;
use tokio::sync::mpsc;
use tracing::{debug, warn};
use wholib_common::events::ServerEvent;
use wholib_common::{Error, Result};

/// One dispatched SSE frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SseFrame {
    /// A comment line (`: heartbeat`) — liveness only
    Comment,
    /// A complete event with optional name and joined data payload
    Event { name: Option<String>, data: String },
}

/// Incremental parser for `text/event-stream` bytes.
///
/// Pure and synchronous so it can be tested without any network: feed it
/// chunks as they arrive, collect complete frames.
#[derive(Default)]
pub struct SseParser {
    buffer: Vec<u8>,
    event_name: Option<String>,
    data_lines: Vec<String>,
}

impl SseParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one chunk of bytes; returns frames completed by this chunk.
    ///
    /// Buffered as raw bytes and decoded per complete line: chunk boundaries
    /// fall anywhere, including inside a multibyte UTF-8 character.
    pub fn push_chunk(&mut self, chunk: &[u8]) -> Vec<SseFrame> {
        self.buffer.extend_from_slice(chunk);

        let mut frames = Vec::new();
        while let Some(pos) = self.buffer.iter().position(|&b| b == b'\n') {
            let line_bytes: Vec<u8> = self.buffer.drain(..=pos).collect();
            let line = String::from_utf8_lossy(&line_bytes);
            let line = line.trim_end_matches(['\n', '\r']);
            if let Some(frame) = self.push_line(line) {
                frames.push(frame);
            }
        }
        frames
    }

    fn push_line(&mut self, line: &str) -> Option<SseFrame> {
        if line.is_empty() {
            // Blank line dispatches the accumulated event, if any.
            if self.data_lines.is_empty() && self.event_name.is_none() {
                return None;
            }
            let frame = SseFrame::Event {
                name: self.event_name.take(),
                data: self.data_lines.join("\n"),
            };
            self.data_lines.clear();
            return Some(frame);
        }

        if line.starts_with(':') {
            return Some(SseFrame::Comment);
        }

        let (field, value) = match line.split_once(':') {
            Some((f, v)) => (f, v.strip_prefix(' ').unwrap_or(v)),
            None => (line, ""),
        };

        match field {
            "event" => self.event_name = Some(value.to_string()),
            "data" => self.data_lines.push(value.to_string()),
            // `id` and `retry` are legal fields this client doesn't use.
            _ => {}
        }
        None
    }
}

/// Established SSE channel.
pub struct SseTransport {
    response: reqwest::Response,
}

impl SseTransport {
    /// Open the event stream. Setup errors (refused connection, non-2xx,
    /// wrong content type) let the selector move on to the next transport.
    pub async fn connect(http: reqwest::Client, url: String) -> Result<Self> {
        let response = http
            .get(&url)
            .header(reqwest::header::ACCEPT, "text/event-stream")
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(Error::Api {
                status: response.status().as_u16(),
                message: format!("event stream unavailable at {}", url),
            });
        }

        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("");
        if !content_type.starts_with("text/event-stream") {
            return Err(Error::Protocol(format!(
                "expected text/event-stream, got {}",
                content_type
            )));
        }

        Ok(Self { response })
    }

    /// Pump decoded events until the stream ends or the receiver drops.
    pub async fn run(self, tx: mpsc::Sender<ServerEvent>) -> Result<()> {
        let mut parser = SseParser::new();
        let mut stream = self.response.bytes_stream();

        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            for frame in parser.push_chunk(&chunk) {
                let event = match decode_frame(frame) {
                    Ok(Some(event)) => event,
                    Ok(None) => continue,
                    Err(e) => {
                        // Protocol error: log and keep the connection up.
                        warn!("Dropping malformed SSE frame: {}", e);
                        continue;
                    }
                };
                if tx.send(event).await.is_err() {
                    debug!("SSE consumer dropped; closing stream");
                    return Ok(());
                }
            }
        }

        // Server closed the stream: a transport failure, not a clean end.
        Err(Error::Protocol("event stream closed by server".to_string()))
    }
}

/// Decode one frame into a `ServerEvent`.
///
/// Comment keep-alives count as heartbeats so the liveness path doesn't
/// depend on the server also sending explicit heartbeat events.
pub fn decode_frame(frame: SseFrame) -> Result<Option<ServerEvent>> {
    match frame {
        SseFrame::Comment => Ok(Some(ServerEvent::Heartbeat)),
        SseFrame::Event { data, .. } if data.is_empty() => Ok(None),
        SseFrame::Event { data, .. } => serde_json::from_str(&data)
            .map(Some)
            .map_err(|e| Error::Protocol(format!("bad event payload: {}", e))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parser_single_event() {
        let mut parser = SseParser::new();
        let frames = parser.push_chunk(b"event: items_updated\ndata: {\"x\":1}\n\n");
        assert_eq!(
            frames,
            vec![SseFrame::Event {
                name: Some("items_updated".to_string()),
                data: "{\"x\":1}".to_string(),
            }]
        );
    }

    #[test]
    fn test_parser_handles_chunks_split_mid_line() {
        let mut parser = SseParser::new();
        assert!(parser.push_chunk(b"data: {\"type\":").is_empty());
        assert!(parser.push_chunk(b"\"heartbeat\"}\n").is_empty());
        let frames = parser.push_chunk(b"\n");
        assert_eq!(
            frames,
            vec![SseFrame::Event {
                name: None,
                data: "{\"type\":\"heartbeat\"}".to_string(),
            }]
        );
    }

    #[test]
    fn test_parser_comment_is_keepalive() {
        let mut parser = SseParser::new();
        let frames = parser.push_chunk(b": heartbeat\n");
        assert_eq!(frames, vec![SseFrame::Comment]);
        // Comments don't open an event; a following blank line is inert.
        assert!(parser.push_chunk(b"\n").is_empty());
    }

    #[test]
    fn test_parser_multiline_data_joined() {
        let mut parser = SseParser::new();
        let frames = parser.push_chunk(b"data: line1\ndata: line2\n\n");
        assert_eq!(
            frames,
            vec![SseFrame::Event {
                name: None,
                data: "line1\nline2".to_string(),
            }]
        );
    }

    #[test]
    fn test_parser_multibyte_char_split_across_chunks() {
        // "café" with the 0xC3 0xA9 sequence of 'é' split between chunks.
        let payload = br#"data: {"type":"error","message":"caf"#;
        let mut parser = SseParser::new();
        assert!(parser.push_chunk(payload).is_empty());
        assert!(parser.push_chunk(&[0xC3]).is_empty());
        let frames = parser.push_chunk(&[0xA9, b'"', b'}', b'\n', b'\n']);

        assert_eq!(frames.len(), 1);
        match decode_frame(frames.into_iter().next().unwrap()).unwrap().unwrap() {
            ServerEvent::Error { message } => assert_eq!(message, "café"),
            other => panic!("wrong event type: {}", other.event_type()),
        }
    }

    #[test]
    fn test_parser_crlf_lines() {
        let mut parser = SseParser::new();
        let frames = parser.push_chunk(b"data: {\"type\":\"heartbeat\"}\r\n\r\n");
        assert_eq!(frames.len(), 1);
    }

    #[test]
    fn test_decode_items_updated_payload() {
        let data = r#"{"type":"items_updated","items":[]}"#;
        let event = decode_frame(SseFrame::Event {
            name: Some("items_updated".to_string()),
            data: data.to_string(),
        })
        .unwrap()
        .unwrap();
        assert_eq!(event.event_type(), "items_updated");
    }

    #[test]
    fn test_decode_comment_maps_to_heartbeat() {
        let event = decode_frame(SseFrame::Comment).unwrap().unwrap();
        assert_eq!(event.event_type(), "heartbeat");
    }

    #[test]
    fn test_decode_malformed_payload_is_protocol_error() {
        let result = decode_frame(SseFrame::Event {
            name: None,
            data: "{not json".to_string(),
        });
        assert!(matches!(result, Err(Error::Protocol(_))));
    }
}
