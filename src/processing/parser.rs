use crate::core::{ApId, SignalStrength};
use thiserror::Error;

/// Size of one batch record: 6-byte AP identifier followed by one signal byte
pub const RECORD_SIZE: usize = 7;

/// One `(AP, signal strength)` pair decoded from a batch payload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanRecord {
    pub ap_id: ApId,
    pub signal_strength: SignalStrength,
}

/// Errors that can occur while decoding a batch payload
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("Insufficient data: need {required} bytes, got {available}")]
    InsufficientData { required: usize, available: usize },
    #[error("Invalid hex payload at offset {offset}: {details}")]
    InvalidHex { offset: usize, details: String },
}

/// Decoder for the fixed 7-byte batch record format
///
/// Bytes 0-5 of a record are the AP identifier, byte 6 is the signal strength
/// stored as an unsigned byte and read back as a two's-complement value.
/// Trailing bytes that do not form a whole record are dropped.
#[derive(Debug, Clone)]
pub struct BatchParser {
    strict_validation: bool,
}

impl BatchParser {
    /// Create a lenient parser; a payload shorter than one record decodes to no records
    pub fn new() -> Self {
        Self {
            strict_validation: false,
        }
    }

    /// Create a parser that rejects payloads without a single complete record
    pub fn strict() -> Self {
        Self {
            strict_validation: true,
        }
    }

    /// Enable or disable strict validation
    pub fn set_strict_validation(&mut self, strict: bool) {
        self.strict_validation = strict;
    }

    /// Decode a raw payload into scan records, in payload order
    pub fn parse_payload(&self, data: &[u8]) -> Result<Vec<ScanRecord>, ParseError> {
        if self.strict_validation && data.len() < RECORD_SIZE {
            return Err(ParseError::InsufficientData {
                required: RECORD_SIZE,
                available: data.len(),
            });
        }

        Ok(data
            .chunks_exact(RECORD_SIZE)
            .map(|record| {
                let mut mac = [0u8; 6];
                mac.copy_from_slice(&record[..6]);
                ScanRecord {
                    ap_id: ApId::from_mac_bytes(mac),
                    signal_strength: decode_signal(record[6]),
                }
            })
            .collect())
    }

    /// Decode a hex-encoded payload (whitespace ignored) and parse it
    pub fn parse_hex(&self, text: &str) -> Result<Vec<ScanRecord>, ParseError> {
        let bytes = decode_hex(text)?;
        self.parse_payload(&bytes)
    }
}

impl Default for BatchParser {
    fn default() -> Self {
        Self::new()
    }
}

/// Map an unsigned signal byte to dBm: values >= 128 wrap to negative.
pub fn decode_signal(byte: u8) -> SignalStrength {
    byte as i8 as SignalStrength
}

/// Decode a hex string into bytes. Whitespace between digits is allowed.
pub fn decode_hex(text: &str) -> Result<Vec<u8>, ParseError> {
    let digits: Vec<(usize, char)> = text
        .char_indices()
        .filter(|(_, c)| !c.is_whitespace())
        .collect();

    if digits.len() % 2 != 0 {
        return Err(ParseError::InvalidHex {
            offset: text.len(),
            details: "odd number of hex digits".to_string(),
        });
    }

    digits
        .chunks_exact(2)
        .map(|pair| {
            let (offset, hi) = pair[0];
            let (_, lo) = pair[1];
            let hi = hi.to_digit(16);
            let lo = lo.to_digit(16);
            match (hi, lo) {
                (Some(hi), Some(lo)) => Ok((hi * 16 + lo) as u8),
                _ => Err(ParseError::InvalidHex {
                    offset,
                    details: "non-hex digit".to_string(),
                }),
            }
        })
        .collect()
}
