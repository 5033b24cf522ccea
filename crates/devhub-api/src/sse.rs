//! Incremental decoder for the hub's server-push (`text/event-stream`) bodies.
//!
//! Records are separated by a blank line; each carries one or more `data:`
//! lines holding a JSON payload. Network reads split records arbitrarily, so
//! the decoder keeps the trailing incomplete fragment and prepends it to the
//! next read. A record whose JSON is malformed yields an error for that record
//! alone; its neighbours still decode.

use std::borrow::Cow;

use bytes::Bytes;
use futures_core::Stream;
use futures_util::StreamExt;

use crate::error::Error;

const RECORD_SEPARATOR: &str = "\n\n";

/// Longest incomplete record kept between reads. A hub that never ends a
/// record would otherwise grow the buffer without bound.
pub const MAX_PENDING_RECORD: usize = 1 << 20;

/// One decoded record: the parsed payload, or the reason it was rejected.
pub type DecodedFrame = Result<serde_json::Value, Error>;

/// Split `buffer` into complete records and the unfinished tail.
///
/// Every complete record with a `data:` field is parsed as JSON, in order.
/// Records without `data:` (comments, bare `event:` keep-alives) are dropped.
/// `\r\n` line endings are accepted. The returned string is the carry-over
/// to prepend to the next chunk.
pub fn decode_frames(buffer: &str) -> (Vec<DecodedFrame>, String) {
    let buffer = if buffer.contains('\r') {
        Cow::Owned(buffer.replace("\r\n", "\n"))
    } else {
        Cow::Borrowed(buffer)
    };
    let mut segments: Vec<&str> = buffer.split(RECORD_SEPARATOR).collect();
    // `split` always yields at least one segment: the (possibly empty) tail.
    let carry = segments.pop().unwrap_or_default().to_owned();
    let frames = segments.into_iter().filter_map(parse_record).collect();
    (frames, carry)
}

fn parse_record(record: &str) -> Option<DecodedFrame> {
    let data: Vec<&str> = record
        .lines()
        .map(str::trim)
        .filter_map(|line| line.strip_prefix("data:"))
        .map(str::trim)
        .collect();

    if data.is_empty() {
        return None;
    }

    let payload = data.join("\n");
    Some(
        serde_json::from_str(&payload).map_err(|e| Error::Deserialization {
            message: e.to_string(),
            body: payload,
        }),
    )
}

// ── FrameDecoder ─────────────────────────────────────────────────────

/// Stateful decoder fed with raw body chunks.
///
/// Buffers bytes rather than text so a multi-byte UTF-8 sequence split
/// across two reads is reassembled before decoding. Carriage returns are
/// dropped on the way in, which makes `\r\n` framing equivalent to `\n`.
///
/// Each feed scans only the bytes it added (plus the one before them) for a
/// record boundary. A pending record longer than [`MAX_PENDING_RECORD`] is
/// dropped with a protocol error and decoding resumes at the next boundary.
#[derive(Debug, Default)]
pub struct FrameDecoder {
    buffer: Vec<u8>,
    /// Set while discarding the rest of an oversized record.
    skipping: bool,
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `chunk` and return every record it completed, in order.
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<DecodedFrame> {
        let scan_from = self.buffer.len().saturating_sub(1);
        self.buffer
            .extend(chunk.iter().copied().filter(|b| *b != b'\r'));

        let boundary = self
            .buffer
            .get(scan_from..)
            .and_then(|new| new.windows(2).rposition(|w| w == b"\n\n"))
            .map(|pos| scan_from + pos + 2);

        let mut frames = match boundary {
            Some(end) => {
                let complete: Vec<u8> = self.buffer.drain(..end).collect();
                let start = if self.skipping {
                    self.skipping = false;
                    complete
                        .windows(2)
                        .position(|w| w == b"\n\n")
                        .map_or(complete.len(), |pos| pos + 2)
                } else {
                    0
                };
                let text = String::from_utf8_lossy(complete.get(start..).unwrap_or_default());
                decode_frames(&text).0
            }
            None => {
                if self.skipping {
                    self.discard_pending();
                }
                Vec::new()
            }
        };

        if self.buffer.len() > MAX_PENDING_RECORD {
            tracing::warn!(
                pending = self.buffer.len(),
                "dropping oversized availability record"
            );
            frames.push(Err(Error::Protocol(format!(
                "record exceeds {MAX_PENDING_RECORD} bytes"
            ))));
            self.discard_pending();
            self.skipping = true;
        }
        frames
    }

    /// Drop the buffered bytes, keeping a trailing newline so a boundary
    /// split across reads is still seen.
    fn discard_pending(&mut self) {
        let trailing_newline = self.buffer.last() == Some(&b'\n');
        self.buffer.clear();
        if trailing_newline {
            self.buffer.push(b'\n');
        }
    }

    /// The pending incomplete fragment.
    pub fn carry(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.buffer)
    }

    /// Discard the pending fragment (used when a connection is replaced).
    pub fn reset(&mut self) {
        self.buffer.clear();
        self.skipping = false;
    }
}

// ── Stream adapter ───────────────────────────────────────────────────

/// Adapt a response body into a lazy stream of decoded records.
///
/// Protocol errors are yielded in place and the stream continues. A body
/// error is yielded once and ends the stream; the decoder's carry dies with it.
pub fn frames<S>(body: S) -> impl Stream<Item = DecodedFrame> + Send
where
    S: Stream<Item = Result<Bytes, Error>> + Send + 'static,
{
    async_stream::stream! {
        let mut decoder = FrameDecoder::new();
        let mut body = std::pin::pin!(body);

        while let Some(chunk) = body.next().await {
            match chunk {
                Ok(bytes) => {
                    for frame in decoder.feed(&bytes) {
                        yield frame;
                    }
                }
                Err(e) => {
                    if !decoder.carry().is_empty() {
                        tracing::debug!(
                            pending = decoder.carry().len(),
                            "discarding partial record after body error"
                        );
                    }
                    yield Err(e);
                    return;
                }
            }
        }
    }
}
