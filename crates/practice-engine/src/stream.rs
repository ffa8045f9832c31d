//! Incremental decoder for the newline-delimited JSON generation stream.
//!
//! Bytes arrive in arbitrary chunks. Splitting happens on the raw `\n` byte
//! before any UTF-8 decoding, so a multi-byte character split across chunks
//! is reassembled intact.

use std::ops::Range;

use serde::{Deserialize, Serialize};
use tracing::{trace, warn};

use crate::error::PracticeError;

/// One event of the generation stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamEvent {
    /// Generation progress.
    Status {
        /// Progress message.
        message: String,
    },
    /// Terminal success carrying the generated exercises.
    #[serde(rename = "result")]
    Exercises {
        /// Raw exercise records in session order, decoded one by one at
        /// ingestion.
        exercises: Vec<serde_json::Value>,
    },
    /// Terminal failure.
    Error {
        /// Failure message from the service.
        message: String,
    },
}

impl StreamEvent {
    /// Returns `true` for `result` and `error` events.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Exercises { .. } | Self::Error { .. })
    }
}

/// Reassembles stream lines from byte chunks and parses them into events.
///
/// Blank lines are skipped. Lines that are not valid JSON events are dropped
/// and counted. Bytes after the last newline stay buffered until more data
/// arrives or [`StreamDecoder::finish`] is called.
#[derive(Debug, Default)]
pub struct StreamDecoder {
    buffer: Vec<u8>,
    cursor: usize,
    scanned: usize,
    decoded: usize,
    dropped: usize,
}

impl StreamDecoder {
    /// Creates an empty decoder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a chunk and returns the events it completes.
    ///
    /// The returned iterator decodes lazily. Lines it does not reach before
    /// being dropped remain buffered for the next call.
    pub fn feed(&mut self, chunk: &[u8]) -> Events<'_> {
        self.compact();
        self.buffer.extend_from_slice(chunk);
        Events { decoder: self }
    }

    /// Decodes a trailing line that was never terminated by a newline.
    ///
    /// Call once after the last chunk. The decoder is empty afterwards.
    pub fn finish(&mut self) -> Option<StreamEvent> {
        let range = self.cursor..self.buffer.len();
        let event = self.decode(range);
        self.buffer.clear();
        self.cursor = 0;
        self.scanned = 0;
        event
    }

    /// Number of events decoded so far.
    #[must_use]
    pub const fn decoded_events(&self) -> usize {
        self.decoded
    }

    /// Number of malformed lines dropped so far.
    #[must_use]
    pub const fn dropped_lines(&self) -> usize {
        self.dropped
    }

    /// Number of buffered bytes not yet decoded.
    #[must_use]
    pub fn pending_bytes(&self) -> usize {
        self.buffer.len() - self.cursor
    }

    fn compact(&mut self) {
        if self.cursor > 0 {
            self.buffer.drain(..self.cursor);
            self.scanned -= self.cursor;
            self.cursor = 0;
        }
    }

    /// Finds the next complete line, excluding its newline.
    fn next_line(&mut self) -> Option<Range<usize>> {
        let from = self.scanned.max(self.cursor);
        match self.buffer[from..].iter().position(|&b| b == b'\n') {
            Some(offset) => {
                let end = from + offset;
                let line = self.cursor..end;
                self.cursor = end + 1;
                self.scanned = self.cursor;
                Some(line)
            }
            None => {
                self.scanned = self.buffer.len();
                None
            }
        }
    }

    fn decode(&mut self, range: Range<usize>) -> Option<StreamEvent> {
        let line = &self.buffer[range];
        if line.iter().all(u8::is_ascii_whitespace) {
            return None;
        }

        match serde_json::from_slice::<StreamEvent>(line) {
            Ok(event) => {
                trace!(len = line.len(), "decoded stream event");
                self.decoded += 1;
                Some(event)
            }
            Err(e) => {
                let error = PracticeError::stream_parse(line.len(), e.to_string());
                warn!(%error, "dropping malformed stream line");
                self.dropped += 1;
                None
            }
        }
    }
}

/// Events completed by one [`StreamDecoder::feed`] call.
#[derive(Debug)]
pub struct Events<'a> {
    decoder: &'a mut StreamDecoder,
}

impl Iterator for Events<'_> {
    type Item = StreamEvent;

    fn next(&mut self) -> Option<StreamEvent> {
        loop {
            let line = self.decoder.next_line()?;
            if let Some(event) = self.decoder.decode(line) {
                return Some(event);
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    const STATUS: &str = r#"{"type":"status","message":"Generating..."}"#;
    const RESULT: &str = r#"{"type":"result","exercises":[{"id":1,"type":"free_text","question":"Vertaal 'kat'","answer":"cat"}]}"#;

    fn feed_all(decoder: &mut StreamDecoder, chunks: &[&[u8]]) -> Vec<StreamEvent> {
        let mut events = Vec::new();
        for chunk in chunks {
            events.extend(decoder.feed(chunk));
        }
        events.extend(decoder.finish());
        events
    }

    #[test]
    fn test_decodes_complete_lines() {
        let mut decoder = StreamDecoder::new();
        let input = format!("{STATUS}\n{RESULT}\n");
        let events = feed_all(&mut decoder, &[input.as_bytes()]);

        assert_eq!(events.len(), 2);
        assert_eq!(
            events[0],
            StreamEvent::Status {
                message: "Generating...".to_string()
            }
        );
        assert!(events[1].is_terminal());
        assert_eq!(decoder.decoded_events(), 2);
    }

    #[test]
    fn test_one_byte_chunks_match_single_chunk() {
        let input = format!("{STATUS}\n{RESULT}\n");

        let mut whole = StreamDecoder::new();
        let expected = feed_all(&mut whole, &[input.as_bytes()]);

        let mut split = StreamDecoder::new();
        let chunks: Vec<&[u8]> = input.as_bytes().chunks(1).collect();
        let actual = feed_all(&mut split, &chunks);

        assert_eq!(actual, expected);
    }

    #[test]
    fn test_multibyte_character_split_across_chunks() {
        let line = "{\"type\":\"status\",\"message\":\"Übung für café ☕\"}\n";
        let bytes = line.as_bytes();
        let split_at = line.find('☕').unwrap() + 1;

        let mut decoder = StreamDecoder::new();
        let events = feed_all(&mut decoder, &[&bytes[..split_at], &bytes[split_at..]]);
        assert_eq!(
            events,
            vec![StreamEvent::Status {
                message: "Übung für café ☕".to_string()
            }]
        );
    }

    #[test]
    fn test_malformed_and_blank_lines_are_skipped() {
        let input = format!("{STATUS}\nnot json\n\n  \n{{\"type\":\"unknown\"}}\n{RESULT}\n");
        let mut decoder = StreamDecoder::new();
        let events = feed_all(&mut decoder, &[input.as_bytes()]);

        assert_eq!(events.len(), 2);
        assert_eq!(decoder.dropped_lines(), 2);
    }

    #[test]
    fn test_trailing_fragment_is_decoded_on_finish() {
        let mut decoder = StreamDecoder::new();
        let first: Vec<StreamEvent> = decoder.feed(STATUS.as_bytes()).collect();
        assert!(first.is_empty());
        assert_eq!(decoder.pending_bytes(), STATUS.len());

        let last = decoder.finish();
        assert!(matches!(last, Some(StreamEvent::Status { .. })));
        assert_eq!(decoder.pending_bytes(), 0);
    }

    #[test]
    fn test_crlf_line_endings() {
        let input = format!("{STATUS}\r\n{RESULT}\r\n");
        let mut decoder = StreamDecoder::new();
        let events = feed_all(&mut decoder, &[input.as_bytes()]);
        assert_eq!(events.len(), 2);
        assert_eq!(decoder.dropped_lines(), 0);
    }

    #[test]
    fn test_unconsumed_events_stay_buffered() {
        let input = format!("{STATUS}\n{STATUS}\n");
        let mut decoder = StreamDecoder::new();

        let first = decoder.feed(input.as_bytes()).next();
        assert!(first.is_some());

        // The second line is still pending and comes out with the next feed
        let rest: Vec<StreamEvent> = decoder.feed(b"").collect();
        assert_eq!(rest.len(), 1);
    }
}
