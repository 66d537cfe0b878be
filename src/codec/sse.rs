//! Server-sent-event decoding for the streaming chat path.
//!
//! The producer task reads the HTTP byte stream, splits it into lines,
//! strips the `data: ` prefix and forwards payloads into a bounded channel.
//! The sentinel `[DONE]` ends the stream; dropping the receiver cancels the
//! producer at its next send.

use futures_util::StreamExt;
use tokio::sync::mpsc;
use tracing::debug;

/// Capacity of the delta channel. A consumer that stops draining blocks the
/// producer here until the upstream transport closes.
pub const SSE_CHANNEL_CAPACITY: usize = 100;

const DATA_PREFIX: &str = "data:";
const DONE_SENTINEL: &str = "[DONE]";

/// What one decoded SSE line means.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SseEvent {
    /// A `data:` payload.
    Data(String),
    /// The `[DONE]` sentinel.
    Done,
    /// Comment, blank line, or a field we do not care about.
    Ignore,
}

/// Decode one line of an SSE stream. Total: anything unrecognized is ignored.
pub fn decode_line(line: &str) -> SseEvent {
    let line = line.trim_end_matches('\r');
    let Some(rest) = line.strip_prefix(DATA_PREFIX) else {
        return SseEvent::Ignore;
    };
    let payload = rest.strip_prefix(' ').unwrap_or(rest);
    if payload == DONE_SENTINEL {
        SseEvent::Done
    } else if payload.is_empty() {
        SseEvent::Ignore
    } else {
        SseEvent::Data(payload.to_string())
    }
}

/// Split buffered bytes into complete lines, leaving the unterminated tail
/// in place. Byte-based so a multi-byte character split across transport
/// chunks is only decoded once its line is complete.
fn drain_lines(buffer: &mut Vec<u8>) -> Vec<String> {
    let mut lines = Vec::new();
    while let Some(pos) = buffer.iter().position(|&b| b == b'\n') {
        let line: Vec<u8> = buffer.drain(..=pos).collect();
        let text = String::from_utf8_lossy(&line);
        lines.push(text.trim_end_matches(['\n', '\r']).to_string());
    }
    lines
}

/// Spawn a producer that pumps `response`'s body through the SSE decoder
/// into a bounded channel of data payloads. The channel closes on `[DONE]`,
/// on transport end, or on transport error (logged, not surfaced).
pub fn spawn_pump(response: reqwest::Response) -> mpsc::Receiver<String> {
    let (tx, rx) = mpsc::channel(SSE_CHANNEL_CAPACITY);

    tokio::spawn(async move {
        let mut stream = response.bytes_stream();
        let mut buffer: Vec<u8> = Vec::new();

        'outer: while let Some(chunk) = stream.next().await {
            let chunk = match chunk {
                Ok(c) => c,
                Err(e) => {
                    debug!(error = %e, "sse transport ended with error");
                    break;
                }
            };
            buffer.extend_from_slice(&chunk);

            for line in drain_lines(&mut buffer) {
                match decode_line(&line) {
                    SseEvent::Data(payload) => {
                        if tx.send(payload).await.is_err() {
                            // Receiver dropped; stop reading.
                            break 'outer;
                        }
                    }
                    SseEvent::Done => break 'outer,
                    SseEvent::Ignore => {}
                }
            }
        }
        // tx drops here, closing the channel.
    });

    rx
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn data_lines_decode() {
        assert_eq!(
            decode_line(r#"data: {"delta":"你好"}"#),
            SseEvent::Data(r#"{"delta":"你好"}"#.to_string())
        );
        // No space after the colon is accepted.
        assert_eq!(decode_line("data:x"), SseEvent::Data("x".to_string()));
        assert_eq!(decode_line("data: [DONE]"), SseEvent::Done);
    }

    #[test]
    fn non_data_lines_ignored() {
        assert_eq!(decode_line(""), SseEvent::Ignore);
        assert_eq!(decode_line(": keep-alive"), SseEvent::Ignore);
        assert_eq!(decode_line("event: message"), SseEvent::Ignore);
        assert_eq!(decode_line("data:"), SseEvent::Ignore);
    }

    #[test]
    fn crlf_stripped() {
        assert_eq!(decode_line("data: hi\r"), SseEvent::Data("hi".to_string()));
    }

    #[test]
    fn drain_keeps_partial_tail() {
        let mut buf = b"data: a\ndata: b\ndata: par".to_vec();
        let lines = drain_lines(&mut buf);
        assert_eq!(lines, vec!["data: a", "data: b"]);
        assert_eq!(buf, b"data: par".to_vec());
    }

    #[test]
    fn split_multibyte_char_survives_chunk_boundary() {
        // "好" is three UTF-8 bytes; split them across two pushes.
        let bytes = "data: 你好\n".as_bytes();
        let mut buf: Vec<u8> = Vec::new();
        buf.extend_from_slice(&bytes[..8]);
        assert!(drain_lines(&mut buf).is_empty(), "incomplete line stays buffered");
        buf.extend_from_slice(&bytes[8..]);
        let lines = drain_lines(&mut buf);
        assert_eq!(lines, vec!["data: 你好"]);
    }
}
