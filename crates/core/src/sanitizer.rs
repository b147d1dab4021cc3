// SPDX-License-Identifier: MIT

//! Strips terminal control sequences from a byte stream while preserving
//! text, UTF-8 multi-byte sequences, and newlines.
//!
//! Recognizes CSI (`ESC [ ... final`), OSC (`ESC ] ... (BEL|ESC \)`),
//! single-character escapes (`ESC X`), and standalone `\r` not immediately
//! followed by `\n`. The transform is chunk-boundary-safe: a sequence split
//! across two calls to [`Sanitizer::process`] is recognized the same way it
//! would be if the input had arrived in one call, via a small internal tail
//! buffer. Never fails — malformed input beyond the tail bound is flushed
//! literally to guarantee forward progress.

/// Bound on how many bytes of an unterminated escape sequence are held
/// across calls before being given up on and flushed as literal text.
const MAX_TAIL: usize = 256;

enum ScanResult {
    /// The escape sequence starting at index 0 of the scanned slice is
    /// `len` bytes long and fully consumed (stripped).
    Complete(usize),
    /// Not enough bytes yet to know where the sequence ends.
    Incomplete,
}

/// Chunk-boundary-safe terminal control sequence scrubber.
#[derive(Debug, Default)]
pub struct Sanitizer {
    tail: Vec<u8>,
}

impl Sanitizer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sanitize one chunk, carrying any unterminated sequence forward
    /// internally for the next call.
    pub fn process(&mut self, chunk: &[u8]) -> Vec<u8> {
        let mut buf = std::mem::take(&mut self.tail);
        buf.extend_from_slice(chunk);
        let mut out = Vec::with_capacity(buf.len());
        let n = buf.len();
        let mut i = 0;

        while i < n {
            let b = buf[i];
            if b == 0x1B {
                match Self::scan_escape(&buf[i..]) {
                    ScanResult::Complete(len) => {
                        i += len;
                    }
                    ScanResult::Incomplete => {
                        let remaining = n - i;
                        if remaining > MAX_TAIL {
                            out.extend_from_slice(&buf[i..]);
                            return out;
                        }
                        self.tail = buf[i..].to_vec();
                        return out;
                    }
                }
            } else if b == 0x0D {
                match buf.get(i + 1) {
                    Some(b'\n') => {
                        out.push(b);
                        i += 1;
                    }
                    Some(_) => {
                        // standalone \r: drop it, keep scanning from the next byte
                        i += 1;
                    }
                    None => {
                        // ambiguous until we see what follows in the next chunk
                        self.tail = vec![b];
                        return out;
                    }
                }
            } else {
                out.push(b);
                i += 1;
            }
        }
        out
    }

    /// Flush whatever partial sequence remains as literal bytes. Call at
    /// end-of-stream so a trailing incomplete escape isn't silently lost.
    pub fn finish(&mut self) -> Vec<u8> {
        std::mem::take(&mut self.tail)
    }

    fn scan_escape(s: &[u8]) -> ScanResult {
        debug_assert_eq!(s[0], 0x1B);
        let Some(&kind) = s.get(1) else {
            return ScanResult::Incomplete;
        };
        match kind {
            b'[' => {
                // CSI: ESC [ <parameter/intermediate bytes> <final byte 0x40..=0x7E>
                let mut j = 2;
                loop {
                    match s.get(j) {
                        None => return ScanResult::Incomplete,
                        Some(&c) if (0x40..=0x7E).contains(&c) => return ScanResult::Complete(j + 1),
                        Some(_) => j += 1,
                    }
                }
            }
            b']' => {
                // OSC: ESC ] ... (BEL | ESC \)
                let mut j = 2;
                loop {
                    match s.get(j) {
                        None => return ScanResult::Incomplete,
                        Some(0x07) => return ScanResult::Complete(j + 1),
                        Some(0x1B) => match s.get(j + 1) {
                            None => return ScanResult::Incomplete,
                            Some(b'\\') => return ScanResult::Complete(j + 2),
                            // unterminated OSC interrupted by an unrelated
                            // escape: end the OSC here without consuming it.
                            Some(_) => return ScanResult::Complete(j),
                        },
                        Some(_) => j += 1,
                    }
                }
            }
            _ => ScanResult::Complete(2),
        }
    }
}
