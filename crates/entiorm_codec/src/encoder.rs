//! Canonical CBOR encoder.

use crate::error::{CodecError, CodecResult};
use crate::value::Value;
use ciborium::value::{Integer, Value as Cbor};
use std::cmp::Ordering;

/// Encode a value to canonical CBOR bytes.
///
/// Map keys are written in canonical order (encoded length first, then
/// bytewise) regardless of how the map was built, and integers use the
/// shortest encoding.
///
/// # Errors
///
/// Returns an error if a map holds the same key twice, or if the
/// underlying writer fails.
pub fn to_canonical_cbor(value: &Value) -> CodecResult<Vec<u8>> {
    let mut encoder = CanonicalEncoder::new();
    encoder.encode(value)?;
    Ok(encoder.into_bytes())
}

/// Encodes a single map key; used for canonical key ordering.
pub(crate) fn encode_key(value: &Value) -> Vec<u8> {
    let mut buffer = Vec::new();
    write_key(&mut buffer, value);
    buffer
}

fn write_key(buffer: &mut Vec<u8>, value: &Value) {
    match value {
        Value::Null => buffer.push(0xf6),
        Value::Bool(false) => buffer.push(0xf4),
        Value::Bool(true) => buffer.push(0xf5),
        #[allow(clippy::cast_sign_loss)]
        Value::Integer(n) if *n >= 0 => write_header(buffer, 0, *n as u64),
        #[allow(clippy::cast_sign_loss)]
        Value::Integer(n) => write_header(buffer, 1, (-1 - *n) as u64),
        Value::Bytes(b) => {
            write_header(buffer, 2, b.len() as u64);
            buffer.extend_from_slice(b);
        }
        Value::Text(s) => {
            write_header(buffer, 3, s.len() as u64);
            buffer.extend_from_slice(s.as_bytes());
        }
        Value::Array(items) => {
            write_header(buffer, 4, items.len() as u64);
            for item in items {
                write_key(buffer, item);
            }
        }
        Value::Map(pairs) => {
            let mut entries: Vec<(Vec<u8>, Vec<u8>)> = pairs
                .iter()
                .map(|(k, v)| (encode_key(k), encode_key(v)))
                .collect();
            entries.sort_by(|a, b| cmp_encoded(&a.0, &b.0));
            write_header(buffer, 5, entries.len() as u64);
            for (k, v) in entries {
                buffer.extend_from_slice(&k);
                buffer.extend_from_slice(&v);
            }
        }
    }
}

#[allow(clippy::cast_possible_truncation)]
fn write_header(buffer: &mut Vec<u8>, major_type: u8, value: u64) {
    let mt = major_type << 5;
    if value < 24 {
        buffer.push(mt | (value as u8));
    } else if u8::try_from(value).is_ok() {
        buffer.push(mt | 24);
        buffer.push(value as u8);
    } else if u16::try_from(value).is_ok() {
        buffer.push(mt | 25);
        buffer.extend_from_slice(&(value as u16).to_be_bytes());
    } else if u32::try_from(value).is_ok() {
        buffer.push(mt | 26);
        buffer.extend_from_slice(&(value as u32).to_be_bytes());
    } else {
        buffer.push(mt | 27);
        buffer.extend_from_slice(&value.to_be_bytes());
    }
}

/// Encoded length first, then bytewise.
pub(crate) fn cmp_encoded(a: &[u8], b: &[u8]) -> Ordering {
    a.len().cmp(&b.len()).then_with(|| a.cmp(b))
}

/// A canonical CBOR encoder that appends into an owned buffer.
#[derive(Debug, Default)]
pub struct CanonicalEncoder {
    buffer: Vec<u8>,
}

impl CanonicalEncoder {
    /// Create a new encoder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a new encoder with the specified capacity.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buffer: Vec::with_capacity(capacity),
        }
    }

    /// Encode a value, appending to the buffer.
    pub fn encode(&mut self, value: &Value) -> CodecResult<()> {
        ciborium::ser::into_writer(&to_cbor(value)?, &mut self.buffer)
            .map_err(|e| CodecError::encoding_failed(e.to_string()))
    }

    /// Consume this encoder and return the encoded bytes.
    pub fn into_bytes(self) -> Vec<u8> {
        self.buffer
    }

    /// Get a reference to the encoded bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.buffer
    }
}

fn to_cbor(value: &Value) -> CodecResult<Cbor> {
    Ok(match value {
        Value::Null => Cbor::Null,
        Value::Bool(b) => Cbor::Bool(*b),
        Value::Integer(n) => Cbor::Integer(Integer::from(*n)),
        Value::Bytes(b) => Cbor::Bytes(b.clone()),
        Value::Text(s) => Cbor::Text(s.clone()),
        Value::Array(items) => {
            Cbor::Array(items.iter().map(to_cbor).collect::<CodecResult<_>>()?)
        }
        Value::Map(pairs) => {
            let mut encoded = pairs
                .iter()
                .map(|(k, v)| Ok((encode_key(k), to_cbor(k)?, to_cbor(v)?)))
                .collect::<CodecResult<Vec<(Vec<u8>, Cbor, Cbor)>>>()?;
            encoded.sort_by(|a, b| cmp_encoded(&a.0, &b.0));
            if encoded.windows(2).any(|pair| pair[0].0 == pair[1].0) {
                return Err(CodecError::invalid_structure("map contains a duplicate key"));
            }
            Cbor::Map(encoded.into_iter().map(|(_, k, v)| (k, v)).collect())
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn small_integers_use_one_byte() {
        assert_eq!(to_canonical_cbor(&Value::Integer(7)).unwrap(), vec![0x07]);
        assert_eq!(to_canonical_cbor(&Value::Integer(-1)).unwrap(), vec![0x20]);
        assert_eq!(
            to_canonical_cbor(&Value::Integer(500)).unwrap(),
            vec![0x19, 0x01, 0xf4]
        );
    }

    #[test]
    fn null_and_bools() {
        assert_eq!(to_canonical_cbor(&Value::Null).unwrap(), vec![0xf6]);
        assert_eq!(to_canonical_cbor(&Value::Bool(false)).unwrap(), vec![0xf4]);
        assert_eq!(to_canonical_cbor(&Value::Bool(true)).unwrap(), vec![0xf5]);
    }

    #[test]
    fn unsorted_map_is_written_sorted() {
        let unsorted = Value::Map(vec![
            (Value::from("b"), Value::Integer(2)),
            (Value::from("a"), Value::Integer(1)),
        ]);
        let sorted = Value::from_entries([("a", Value::Integer(1)), ("b", Value::Integer(2))]);
        assert_eq!(
            to_canonical_cbor(&unsorted).unwrap(),
            to_canonical_cbor(&sorted).unwrap()
        );
    }

    #[test]
    fn encoder_appends() {
        let mut encoder = CanonicalEncoder::with_capacity(8);
        encoder.encode(&Value::Integer(1)).unwrap();
        encoder.encode(&Value::Integer(2)).unwrap();
        assert_eq!(encoder.as_bytes(), &[0x01, 0x02]);
    }

    #[test]
    fn duplicate_map_keys_are_rejected() {
        let duplicated = Value::Map(vec![
            (Value::from("a"), Value::Integer(1)),
            (Value::from("a"), Value::Integer(2)),
        ]);
        let err = to_canonical_cbor(&duplicated).unwrap_err();
        assert!(matches!(err, CodecError::InvalidStructure { .. }));

        let nested = Value::Array(vec![duplicated]);
        assert!(to_canonical_cbor(&nested).is_err());
    }

    #[test]
    fn key_bytes_match_written_bytes() {
        let values = [
            Value::Null,
            Value::Bool(true),
            Value::Integer(23),
            Value::Integer(24),
            Value::Integer(-300),
            Value::Integer(i64::MIN),
            Value::Bytes(vec![1, 2, 3]),
            Value::from("title"),
            Value::Array(vec![Value::Integer(1), Value::from("x")]),
            Value::Map(vec![
                (Value::from("bb"), Value::Integer(2)),
                (Value::Integer(1), Value::Null),
            ]),
        ];
        for value in values {
            assert_eq!(encode_key(&value), to_canonical_cbor(&value).unwrap(), "{value}");
        }
    }
}
