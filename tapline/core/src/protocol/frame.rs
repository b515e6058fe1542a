//! Frame Decoder
//!
//! Turns the raw byte chunks of an event-stream response body into complete
//! frame payloads.
//!
//! # Frame Format
//!
//! ```text
//! data: {"content":"Fed "}\n
//! \n
//! : keep-alive\n
//! \n
//! data: {"done":true,"impact":"neutral","analysis":"No change."}\n
//! \n
//! ```
//!
//! A frame is one or more lines terminated by a blank line. The payload is
//! carried on lines starting with [`PAYLOAD_MARKER`]; several payload lines in
//! one frame are joined with `\n`. Every other line (comments, `event:`,
//! `id:`, `retry:`) is ignored, and a frame without a payload line yields
//! nothing.
//!
//! # Chunking
//!
//! - UTF-8 is decoded incrementally: a multi-byte character split across two
//!   chunks is held back and completed by the next chunk
//! - Invalid byte sequences become U+FFFD instead of aborting the stream
//! - `\r\n` and lone `\r` line endings are normalised to `\n`, even when the
//!   `\r` and `\n` arrive in different chunks
//! - The undelimited tail of the buffer is bounded by `max_frame_bytes`

use std::borrow::Cow;
use std::collections::VecDeque;

use thiserror::Error;

/// Marker that starts a payload line
pub const PAYLOAD_MARKER: &str = "data:";

/// Blank line separating frames
pub const FRAME_DELIMITER: &str = "\n\n";

/// Default bound on a single partial frame (10 MB)
pub const MAX_FRAME_SIZE: usize = 10 * 1024 * 1024;

/// Minimum buffer capacity for decoder
const MIN_BUFFER_CAPACITY: usize = 4096;

/// One complete frame extracted from the body
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Frame {
    /// Payload text with the marker stripped
    pub payload: String,
}

impl Frame {
    /// Extract the payload from a delimited block of lines
    ///
    /// Returns `None` when the block carries no payload line.
    fn from_block(block: &str) -> Option<Self> {
        let mut payload: Option<String> = None;

        for line in block.split('\n') {
            let Some(rest) = line.strip_prefix(PAYLOAD_MARKER) else {
                continue;
            };
            let rest = rest.strip_prefix(' ').unwrap_or(rest);
            match payload.as_mut() {
                Some(existing) => {
                    existing.push('\n');
                    existing.push_str(rest);
                }
                None => payload = Some(rest.to_string()),
            }
        }

        payload.map(|payload| Self { payload })
    }
}

/// Errors raised while decoding the body
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum DecodeError {
    /// The buffered partial frame grew past the configured limit
    #[error("partial frame exceeds {limit} bytes")]
    FrameTooLarge {
        /// Configured limit in bytes
        limit: usize,
    },
}

/// Incremental decoder for one response body
///
/// Owned by exactly one session; holds at most one partial frame between
/// chunk arrivals.
#[derive(Debug)]
pub struct FrameDecoder {
    /// Decoded text not yet split into frames
    buffer: String,
    /// Position where we've consumed up to
    read_pos: usize,
    /// Start offsets of delimiters found but not yet consumed
    delimiters: VecDeque<usize>,
    /// Where the next delimiter search resumes
    scan_pos: usize,
    /// End of the last delimiter found; the partial frame starts here
    partial_start: usize,
    /// Incomplete UTF-8 sequence at the end of the last chunk
    utf8_tail: Vec<u8>,
    /// The last chunk ended with `\r`
    pending_cr: bool,
    /// The partial frame was dropped for exceeding the limit
    overflowed: bool,
    max_frame_bytes: usize,
}

impl Default for FrameDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameDecoder {
    /// Create a decoder with the default frame size limit
    #[must_use]
    pub fn new() -> Self {
        Self::with_max_frame_bytes(MAX_FRAME_SIZE)
    }

    /// Create a decoder with a custom limit on the partial frame size
    #[must_use]
    pub fn with_max_frame_bytes(max_frame_bytes: usize) -> Self {
        Self {
            buffer: String::with_capacity(MIN_BUFFER_CAPACITY),
            read_pos: 0,
            delimiters: VecDeque::new(),
            scan_pos: 0,
            partial_start: 0,
            utf8_tail: Vec::new(),
            pending_cr: false,
            overflowed: false,
            max_frame_bytes,
        }
    }

    /// Feed a chunk and iterate over the frames it completes
    ///
    /// The returned iterator is lazy: each `next()` splits one frame off the
    /// buffer. Frames left unread stay buffered and are returned by the next
    /// call to [`FrameDecoder::next_frame`] or `feed`.
    ///
    /// When the undelimited tail exceeds the configured limit, the tail is
    /// dropped, the frames completed before it are still yielded, and the
    /// iterator then yields [`DecodeError::FrameTooLarge`] once and resets
    /// the decoder.
    pub fn feed(&mut self, data: &[u8]) -> Frames<'_> {
        self.push(data);
        Frames { decoder: self }
    }

    /// Append a chunk to the buffer without extracting frames
    pub fn push(&mut self, data: &[u8]) {
        if self.overflowed {
            // Rest of the oversized frame; dropped until the error is taken
            return;
        }
        self.compact();

        self.decode_utf8(data);
        self.scan();

        if self.buffer.len() - self.partial_start > self.max_frame_bytes {
            self.buffer.truncate(self.partial_start);
            self.scan_pos = self.partial_start;
            self.utf8_tail.clear();
            self.pending_cr = false;
            self.overflowed = true;
        }
    }

    /// Split the next complete frame off the buffer
    ///
    /// Blocks without a payload line are skipped. After the last complete
    /// frame, a pending [`DecodeError::FrameTooLarge`] is returned once.
    pub fn next_frame(&mut self) -> Option<Result<Frame, DecodeError>> {
        while let Some(start) = self.delimiters.pop_front() {
            let frame = Frame::from_block(&self.buffer[self.read_pos..start]);
            self.read_pos = start + FRAME_DELIMITER.len();
            if let Some(frame) = frame {
                return Some(Ok(frame));
            }
        }

        if self.overflowed {
            self.clear();
            return Some(Err(DecodeError::FrameTooLarge {
                limit: self.max_frame_bytes,
            }));
        }
        None
    }

    /// Signal end of body
    ///
    /// Discards whatever partial frame is left and returns its size in bytes,
    /// or `None` if nothing but whitespace remained.
    pub fn finish(&mut self) -> Option<usize> {
        let rest = &self.buffer[self.read_pos..];
        let discarded = if rest.trim().is_empty() && self.utf8_tail.is_empty() {
            None
        } else {
            Some(rest.len() + self.utf8_tail.len())
        };
        self.clear();
        discarded
    }

    /// Number of bytes buffered but not yet returned as frames
    #[must_use]
    pub fn buffered(&self) -> usize {
        self.buffer.len() - self.read_pos + self.utf8_tail.len()
    }

    /// Clear the buffer
    pub fn clear(&mut self) {
        self.buffer.clear();
        self.read_pos = 0;
        self.delimiters.clear();
        self.scan_pos = 0;
        self.partial_start = 0;
        self.utf8_tail.clear();
        self.pending_cr = false;
        self.overflowed = false;
    }

    /// Drop consumed text once it dominates the buffer
    fn compact(&mut self) {
        let worthwhile = self.read_pos == self.buffer.len()
            || (self.read_pos > self.buffer.len() / 2 && self.read_pos > MIN_BUFFER_CAPACITY);
        if self.read_pos == 0 || !worthwhile {
            return;
        }

        let consumed = self.read_pos;
        self.buffer.drain(..consumed);
        self.read_pos = 0;
        for start in &mut self.delimiters {
            *start -= consumed;
        }
        self.scan_pos -= consumed;
        self.partial_start -= consumed;
    }

    /// Record the delimiters in text appended since the last scan
    fn scan(&mut self) {
        while let Some(offset) = self.buffer[self.scan_pos..].find(FRAME_DELIMITER) {
            let start = self.scan_pos + offset;
            self.delimiters.push_back(start);
            self.scan_pos = start + FRAME_DELIMITER.len();
            self.partial_start = self.scan_pos;
        }

        // A trailing `\n` may open a delimiter the next chunk closes
        let resume = if self.buffer.ends_with('\n') {
            self.buffer.len() - 1
        } else {
            self.buffer.len()
        };
        self.scan_pos = self.scan_pos.max(resume);
    }

    fn decode_utf8(&mut self, data: &[u8]) {
        let joined: Cow<'_, [u8]> = if self.utf8_tail.is_empty() {
            Cow::Borrowed(data)
        } else {
            let mut bytes = std::mem::take(&mut self.utf8_tail);
            bytes.extend_from_slice(data);
            Cow::Owned(bytes)
        };

        let mut input: &[u8] = &joined;
        loop {
            match std::str::from_utf8(input) {
                Ok(text) => {
                    self.push_text(text);
                    break;
                }
                Err(e) => {
                    let valid = e.valid_up_to();
                    self.push_text(&String::from_utf8_lossy(&input[..valid]));
                    match e.error_len() {
                        Some(len) => {
                            self.push_text("\u{FFFD}");
                            input = &input[valid + len..];
                        }
                        None => {
                            // Incomplete sequence: wait for the next chunk
                            self.utf8_tail.extend_from_slice(&input[valid..]);
                            break;
                        }
                    }
                }
            }
        }
    }

    fn push_text(&mut self, text: &str) {
        if text.is_empty() {
            return;
        }

        let mut text = text;
        if self.pending_cr {
            self.pending_cr = false;
            if !text.starts_with('\n') {
                self.buffer.push('\n');
            }
        }
        if let Some(stripped) = text.strip_suffix('\r') {
            self.pending_cr = true;
            text = stripped;
        }

        if text.contains('\r') {
            self.buffer
                .push_str(&text.replace("\r\n", "\n").replace('\r', "\n"));
        } else {
            self.buffer.push_str(text);
        }
    }
}

/// Lazy iterator over the frames completed by one chunk
#[derive(Debug)]
pub struct Frames<'a> {
    decoder: &'a mut FrameDecoder,
}

impl Iterator for Frames<'_> {
    type Item = Result<Frame, DecodeError>;

    fn next(&mut self) -> Option<Self::Item> {
        self.decoder.next_frame()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn payloads(decoder: &mut FrameDecoder, chunk: &[u8]) -> Vec<String> {
        decoder
            .feed(chunk)
            .map(|frame| frame.unwrap().payload)
            .collect()
    }

    #[test]
    fn test_single_frame() {
        let mut decoder = FrameDecoder::new();
        let frames = payloads(&mut decoder, b"data: {\"content\":\"hi\"}\n\n");
        assert_eq!(frames, vec![r#"{"content":"hi"}"#.to_string()]);
        assert_eq!(decoder.buffered(), 0);
    }

    #[test]
    fn test_multiple_frames_in_one_chunk() {
        let mut decoder = FrameDecoder::new();
        let frames = payloads(&mut decoder, b"data: a\n\ndata: b\n\ndata: c");
        assert_eq!(frames, vec!["a".to_string(), "b".to_string()]);

        // The trailing partial frame is held back
        assert_eq!(decoder.buffered(), "data: c".len());
        let frames = payloads(&mut decoder, b"\n\n");
        assert_eq!(frames, vec!["c".to_string()]);
    }

    #[test]
    fn test_delimiter_split_across_chunks() {
        let mut decoder = FrameDecoder::new();
        assert!(payloads(&mut decoder, b"data: x\n").is_empty());
        assert_eq!(payloads(&mut decoder, b"\ndata: y\n\n"), vec!["x", "y"]);
    }

    #[test]
    fn test_multibyte_split_at_every_offset() {
        let body = "data: {\"content\":\"caf\u{e9} \u{1F4C8} \u{4E2D}\u{6587}\"}\n\n".as_bytes();
        for split in 0..=body.len() {
            let mut decoder = FrameDecoder::new();
            let mut frames = payloads(&mut decoder, &body[..split]);
            frames.extend(payloads(&mut decoder, &body[split..]));
            assert_eq!(
                frames,
                vec!["{\"content\":\"caf\u{e9} \u{1F4C8} \u{4E2D}\u{6587}\"}".to_string()],
                "split at byte {split}"
            );
        }
    }

    #[test]
    fn test_invalid_utf8_is_replaced() {
        let mut decoder = FrameDecoder::new();
        let frames = payloads(&mut decoder, b"data: a\xFFb\n\n");
        assert_eq!(frames, vec!["a\u{FFFD}b".to_string()]);
    }

    #[test]
    fn test_non_payload_lines_are_ignored() {
        let mut decoder = FrameDecoder::new();
        let frames = payloads(
            &mut decoder,
            b": keep-alive\n\nevent: update\nid: 7\ndata: payload\n\nretry: 100\n\n",
        );
        assert_eq!(frames, vec!["payload".to_string()]);
    }

    #[test]
    fn test_multiple_payload_lines_are_joined() {
        let mut decoder = FrameDecoder::new();
        let frames = payloads(&mut decoder, b"data: first\ndata:second\n\n");
        assert_eq!(frames, vec!["first\nsecond".to_string()]);
    }

    #[test]
    fn test_crlf_line_endings() {
        let mut decoder = FrameDecoder::new();
        let frames = payloads(&mut decoder, b"data: a\r\n\r\ndata: b\r\n\r\n");
        assert_eq!(frames, vec!["a", "b"]);
    }

    #[test]
    fn test_crlf_split_between_chunks() {
        let mut decoder = FrameDecoder::new();
        assert!(payloads(&mut decoder, b"data: a\r").is_empty());
        assert!(payloads(&mut decoder, b"\n\r").is_empty());
        assert_eq!(payloads(&mut decoder, b"\n"), vec!["a"]);
    }

    #[test]
    fn test_lazy_iteration_keeps_unread_frames() {
        let mut decoder = FrameDecoder::new();
        let first = decoder
            .feed(b"data: 1\n\ndata: 2\n\n")
            .next()
            .map(|f| f.unwrap().payload);
        assert_eq!(first.as_deref(), Some("1"));
        assert_eq!(
            decoder.next_frame().map(|f| f.unwrap().payload).as_deref(),
            Some("2")
        );
        assert!(decoder.next_frame().is_none());
    }

    #[test]
    fn test_finish_reports_truncated_frame() {
        let mut decoder = FrameDecoder::new();
        assert!(payloads(&mut decoder, b"data: {\"content\":\"cut").is_empty());
        assert_eq!(decoder.finish(), Some("data: {\"content\":\"cut".len()));
        assert_eq!(decoder.buffered(), 0);
    }

    #[test]
    fn test_finish_counts_incomplete_utf8_tail() {
        let mut decoder = FrameDecoder::new();
        // First two bytes of a three-byte character
        assert!(payloads(&mut decoder, &[0xE4, 0xB8]).is_empty());
        assert_eq!(decoder.finish(), Some(2));
    }

    #[test]
    fn test_finish_on_clean_body() {
        let mut decoder = FrameDecoder::new();
        assert_eq!(payloads(&mut decoder, b"data: x\n\n\n"), vec!["x"]);
        assert_eq!(decoder.finish(), None);
    }

    #[test]
    fn test_frame_too_large() {
        let mut decoder = FrameDecoder::with_max_frame_bytes(16);
        decoder.push(b"data: this line never ends");
        assert_eq!(
            decoder.next_frame(),
            Some(Err(DecodeError::FrameTooLarge { limit: 16 }))
        );
        assert_eq!(decoder.buffered(), 0);
        assert!(decoder.next_frame().is_none());
    }

    #[test]
    fn test_complete_frames_survive_oversized_tail() {
        let mut decoder = FrameDecoder::with_max_frame_bytes(16);
        let results: Vec<_> = decoder
            .feed(b"data: a\n\ndata: this partial frame never ends")
            .collect();
        assert_eq!(
            results,
            vec![
                Ok(Frame {
                    payload: "a".to_string()
                }),
                Err(DecodeError::FrameTooLarge { limit: 16 }),
            ]
        );

        // The decoder starts over after reporting the error
        assert_eq!(payloads(&mut decoder, b"data: b\n\n"), vec!["b"]);
    }

    #[test]
    fn test_oversized_tail_ignores_further_chunks_until_reported() {
        let mut decoder = FrameDecoder::with_max_frame_bytes(8);
        decoder.push(b"data: 0123456789");
        decoder.push(b"more of the same frame\n\n");
        assert_eq!(
            decoder.next_frame(),
            Some(Err(DecodeError::FrameTooLarge { limit: 8 }))
        );
        assert!(decoder.next_frame().is_none());
    }

    #[test]
    fn test_large_frame_in_small_chunks() {
        let text = "x".repeat(20_000);
        let body = format!("data: {text}\n\ndata: tail\n\n");
        let mut decoder = FrameDecoder::new();
        let mut frames = Vec::new();
        for chunk in body.as_bytes().chunks(7) {
            frames.extend(payloads(&mut decoder, chunk));
        }
        assert_eq!(frames, vec![text, "tail".to_string()]);
        assert_eq!(decoder.buffered(), 0);
    }

    #[test]
    fn test_limit_applies_to_partial_frame_only() {
        let mut decoder = FrameDecoder::with_max_frame_bytes(16);
        let frames = payloads(&mut decoder, b"data: complete frame longer than limit\n\ndata: x");
        assert_eq!(frames, vec!["complete frame longer than limit"]);
    }
}
