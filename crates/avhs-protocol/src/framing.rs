//! STX/ETX packet framing.
//!
//! Frame format: [0x02][ASCII payload][0x03]
//!
//! The device sends packets back to back over TCP and may split or merge them
//! arbitrarily, so the receive side keeps a per-stream buffer and only ever
//! cuts on the end marker. A span terminated by ETX that does not begin with
//! STX is dropped.

use crate::{ETX, STX};

/// Pending bytes allowed without an end marker before the buffer is discarded.
pub const MAX_PENDING_BYTES: usize = 64 * 1024;

/// Wrap a command payload in start/end markers.
pub fn encode(command: &str) -> Vec<u8> {
    let mut buf = Vec::with_capacity(command.len() + 2);
    encode_into(&mut buf, command);
    buf
}

/// Encode into a reusable buffer. The buffer is cleared first.
pub fn encode_into(buf: &mut Vec<u8>, command: &str) {
    buf.clear();
    buf.push(STX);
    buf.extend_from_slice(command.as_bytes());
    buf.push(ETX);
}

/// Result of feeding one chunk into a [`Framer`].
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Frames {
    /// Decoded payloads in arrival order, markers stripped
    pub packets: Vec<String>,
    /// ETX-terminated spans dropped for lacking a leading STX
    pub malformed: usize,
    /// Bytes discarded because no end marker arrived within [`MAX_PENDING_BYTES`]
    pub overflowed: usize,
}

/// Restartable packet extractor for one byte stream.
#[derive(Debug)]
pub struct Framer {
    buf: Vec<u8>,
    limit: usize,
}

impl Default for Framer {
    fn default() -> Self {
        Self::new()
    }
}

impl Framer {
    pub fn new() -> Self {
        Self::with_limit(MAX_PENDING_BYTES)
    }

    pub fn with_limit(limit: usize) -> Self {
        Self {
            buf: Vec::with_capacity(256),
            limit,
        }
    }

    /// Append `data` and extract every complete packet.
    ///
    /// Trailing bytes after the last end marker are kept for the next call.
    /// Output does not depend on how the stream is split into chunks, with
    /// one exception: the pending limit is checked after each call, so a
    /// packet longer than the limit survives when it arrives in one chunk
    /// but is discarded when its end marker comes in a later one.
    pub fn feed(&mut self, data: &[u8]) -> Frames {
        self.buf.extend_from_slice(data);

        let mut frames = Frames::default();
        let mut offset = 0;

        while let Some(pos) = self.buf[offset..].iter().position(|&b| b == ETX) {
            let end = offset + pos;
            let span = &self.buf[offset..end];
            offset = end + 1;

            match span.split_first() {
                Some((&STX, payload)) => {
                    frames
                        .packets
                        .push(String::from_utf8_lossy(payload).into_owned());
                }
                _ => frames.malformed += 1,
            }
        }

        self.buf.drain(..offset);

        if self.buf.len() > self.limit {
            frames.overflowed = self.buf.len();
            self.buf.clear();
        }

        frames
    }

    /// Bytes currently waiting for an end marker.
    pub fn pending(&self) -> &[u8] {
        &self.buf
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_wraps_markers() {
        assert_eq!(encode("SBUS:02:00"), b"\x02SBUS:02:00\x03".to_vec());
    }

    #[test]
    fn single_packet() {
        let mut framer = Framer::new();
        let frames = framer.feed(b"\x02ABST:02:00\x03");
        assert_eq!(frames.packets, vec!["ABST:02:00"]);
        assert_eq!(frames.malformed, 0);
        assert!(framer.pending().is_empty());
    }

    #[test]
    fn partial_packet_is_retained() {
        let mut framer = Framer::new();
        assert!(framer.feed(b"\x02ABST:0").packets.is_empty());
        assert_eq!(framer.pending(), b"\x02ABST:0");

        let frames = framer.feed(b"2:00\x03\x02SP");
        assert_eq!(frames.packets, vec!["ABST:02:00"]);
        assert_eq!(framer.pending(), b"\x02SP");
    }

    #[test]
    fn span_without_start_marker_is_dropped() {
        let mut framer = Framer::new();
        let frames = framer.feed(b"\x02AB\x03CD\x03");
        assert_eq!(frames.packets, vec!["AB"]);
        assert_eq!(frames.malformed, 1);
    }

    #[test]
    fn leading_garbage_swallows_the_first_packet() {
        // The span runs from the last consumed offset, so junk before STX
        // makes the whole span malformed.
        let mut framer = Framer::new();
        let frames = framer.feed(b"xx\x02AB\x03\x02CD\x03");
        assert_eq!(frames.packets, vec!["CD"]);
        assert_eq!(frames.malformed, 1);
    }

    #[test]
    fn empty_payload_is_emitted() {
        let mut framer = Framer::new();
        let frames = framer.feed(b"\x02\x03");
        assert_eq!(frames.packets, vec![""]);
    }

    #[test]
    fn overflow_discards_pending() {
        let mut framer = Framer::with_limit(8);
        let frames = framer.feed(b"\x02AB\x03\x020123456789");
        assert_eq!(frames.packets, vec!["AB"]);
        assert_eq!(frames.overflowed, 11);
        assert!(framer.pending().is_empty());

        let frames = framer.feed(b"\x02OK\x03");
        assert_eq!(frames.packets, vec!["OK"]);
    }

    #[test]
    fn oversized_packet_depends_on_chunking() {
        let stream = b"\x020123456789\x03";

        let mut whole = Framer::with_limit(8);
        assert_eq!(whole.feed(stream).packets, vec!["0123456789"]);

        let mut split = Framer::with_limit(8);
        let first = split.feed(&stream[..11]);
        assert!(first.packets.is_empty());
        assert_eq!(first.overflowed, 11);
        let rest = split.feed(&stream[11..]);
        assert!(rest.packets.is_empty());
        assert_eq!(rest.malformed, 1);
    }
}
