//! Incremental UTF-8 decoding of worker output chunks.

/// Decodes a byte stream chunk by chunk without splitting characters.
///
/// A multi-byte sequence cut off at the end of a chunk is held back and
/// completed by the next one. Bytes that can never form valid UTF-8 become
/// U+FFFD.
#[derive(Debug, Default)]
pub(crate) struct Utf8ChunkDecoder {
    pending: Vec<u8>,
}

impl Utf8ChunkDecoder {
    pub(crate) fn decode(&mut self, chunk: &[u8]) -> String {
        let mut bytes = std::mem::take(&mut self.pending);
        bytes.extend_from_slice(chunk);

        let mut out = String::with_capacity(bytes.len());
        let mut rest = bytes.as_slice();
        loop {
            match std::str::from_utf8(rest) {
                Ok(text) => {
                    out.push_str(text);
                    rest = &[];
                    break;
                }
                Err(err) => {
                    let valid = err.valid_up_to();
                    out.push_str(&String::from_utf8_lossy(&rest[..valid]));
                    match err.error_len() {
                        Some(len) => {
                            out.push(char::REPLACEMENT_CHARACTER);
                            rest = &rest[valid + len..];
                        }
                        None => {
                            rest = &rest[valid..];
                            break;
                        }
                    }
                }
            }
        }

        self.pending = rest.to_vec();
        out
    }

    /// Flush whatever is still held back once the stream has ended.
    pub(crate) fn finish(&mut self) -> String {
        let tail = std::mem::take(&mut self.pending);
        String::from_utf8_lossy(&tail).into_owned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_ascii_passes_through() {
        let mut d = Utf8ChunkDecoder::default();
        assert_eq!(d.decode(b"page 1 done\n"), "page 1 done\n");
        assert_eq!(d.finish(), "");
    }

    #[test]
    fn test_split_multibyte_char_is_joined() {
        let bytes = "café ✓".as_bytes();
        // cut inside the 3-byte check mark
        let cut = bytes.len() - 1;
        let mut d = Utf8ChunkDecoder::default();
        assert_eq!(d.decode(&bytes[..cut]), "café ");
        assert_eq!(d.decode(&bytes[cut..]), "✓");
    }

    #[test]
    fn test_invalid_byte_is_replaced() {
        let mut d = Utf8ChunkDecoder::default();
        assert_eq!(d.decode(b"a\xffb"), "a\u{FFFD}b");
    }

    #[test]
    fn test_truncated_tail_flushed_lossy() {
        let mut d = Utf8ChunkDecoder::default();
        assert_eq!(d.decode(&[b'x', 0xE2, 0x9C]), "x");
        assert_eq!(d.finish(), "\u{FFFD}");
    }
}
