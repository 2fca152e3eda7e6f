// MIT License - Copyright (c) 2021 TJForc

use tracing::warn;

/// Incremental UTF-8 decoder for socket reads.
///
/// A multi-byte character split across two reads is held back until the rest
/// arrives. Invalid sequences are replaced with U+FFFD and counted.
#[derive(Debug, Default)]
pub struct Utf8Decoder {
    pending: Vec<u8>,
    invalid_sequences: u64,
}

impl Utf8Decoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decode as much of `bytes` (after any held-back prefix) as possible.
    pub fn decode(&mut self, bytes: &[u8]) -> String {
        self.pending.extend_from_slice(bytes);
        let data = std::mem::take(&mut self.pending);

        let mut out = String::with_capacity(data.len());
        let mut rest = data.as_slice();
        loop {
            match std::str::from_utf8(rest) {
                Ok(valid) => {
                    out.push_str(valid);
                    break;
                }
                Err(e) => {
                    let (valid, after) = rest.split_at(e.valid_up_to());
                    // valid_up_to guarantees this prefix is UTF-8
                    out.push_str(&String::from_utf8_lossy(valid));
                    match e.error_len() {
                        Some(len) => {
                            self.invalid_sequences += 1;
                            warn!("Replacing {} invalid UTF-8 byte(s) in response stream", len);
                            out.push(char::REPLACEMENT_CHARACTER);
                            rest = &after[len..];
                        }
                        None => {
                            // Truncated character at the end of this read.
                            self.pending.extend_from_slice(after);
                            break;
                        }
                    }
                }
            }
        }
        out
    }

    /// Bytes held back waiting for the rest of a character.
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    pub fn invalid_sequences(&self) -> u64 {
        self.invalid_sequences
    }
}
