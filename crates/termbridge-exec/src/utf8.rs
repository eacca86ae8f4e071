//! Incremental UTF-8 decoding for pipe reads.

/// Turns arbitrary byte chunks into text without splitting characters.
///
/// A multi-byte sequence cut off at the end of a read is held back until
/// the next chunk completes it. Invalid bytes become U+FFFD.
#[derive(Debug, Default)]
pub struct Utf8Chunker {
    pending: Vec<u8>,
}

impl Utf8Chunker {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Decode as much of `bytes` (plus any held-back tail) as possible.
    pub fn push(&mut self, bytes: &[u8]) -> String {
        self.pending.extend_from_slice(bytes);
        let mut out = String::new();
        loop {
            match std::str::from_utf8(&self.pending) {
                Ok(text) => {
                    out.push_str(text);
                    self.pending.clear();
                    break;
                }
                Err(err) => {
                    let valid = err.valid_up_to();
                    out.push_str(&String::from_utf8_lossy(&self.pending[..valid]));
                    if let Some(bad) = err.error_len() {
                        out.push(char::REPLACEMENT_CHARACTER);
                        self.pending.drain(..valid + bad);
                    } else {
                        self.pending.drain(..valid);
                        break;
                    }
                }
            }
        }
        out
    }

    /// Flush whatever is still held back, lossily.
    pub fn finish(&mut self) -> String {
        let rest = String::from_utf8_lossy(&self.pending).into_owned();
        self.pending.clear();
        rest
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_multibyte_is_reassembled() {
        let bytes = "héllo €".as_bytes();
        let mut chunker = Utf8Chunker::new();
        let mut out = String::new();
        for b in bytes {
            out.push_str(&chunker.push(std::slice::from_ref(b)));
        }
        out.push_str(&chunker.finish());
        assert_eq!(out, "héllo €");
    }

    #[test]
    fn invalid_bytes_are_replaced_in_place() {
        let mut chunker = Utf8Chunker::new();
        assert_eq!(chunker.push(b"a\xffb"), "a\u{fffd}b");
        assert_eq!(chunker.finish(), "");
    }

    #[test]
    fn dangling_tail_is_flushed_on_finish() {
        let mut chunker = Utf8Chunker::new();
        assert_eq!(chunker.push(&[b'x', 0xE2, 0x82]), "x");
        assert_eq!(chunker.finish(), "\u{fffd}");
    }
}
