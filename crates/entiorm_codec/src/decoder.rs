//! Canonical CBOR decoder.

use crate::error::{CodecError, CodecResult};
use crate::value::Value;
use ciborium::value::Value as Cbor;
use std::cmp::Ordering;

/// Decode a value from CBOR bytes.
///
/// # Errors
///
/// Returns an error if the bytes are not valid CBOR, contain floats or
/// tags, or contain a map whose keys are not in canonical order.
pub fn from_cbor(bytes: &[u8]) -> CodecResult<Value> {
    CanonicalDecoder::new(bytes).decode()
}

/// A canonical CBOR decoder over a borrowed byte slice.
#[derive(Debug)]
pub struct CanonicalDecoder<'a> {
    data: &'a [u8],
}

impl<'a> CanonicalDecoder<'a> {
    /// Create a new decoder for the given bytes.
    pub fn new(data: &'a [u8]) -> Self {
        Self { data }
    }

    /// Decode a single value.
    pub fn decode(&mut self) -> CodecResult<Value> {
        let raw: Cbor = ciborium::de::from_reader(self.data)
            .map_err(|e| CodecError::decoding_failed(e.to_string()))?;
        from_cbor_value(raw)
    }
}

fn from_cbor_value(raw: Cbor) -> CodecResult<Value> {
    match raw {
        Cbor::Null => Ok(Value::Null),
        Cbor::Bool(b) => Ok(Value::Bool(b)),
        Cbor::Integer(n) => i64::try_from(n)
            .map(Value::Integer)
            .map_err(|_| CodecError::IntegerOverflow),
        Cbor::Bytes(b) => Ok(Value::Bytes(b)),
        Cbor::Text(s) => Ok(Value::Text(s)),
        Cbor::Float(_) => Err(CodecError::FloatForbidden),
        Cbor::Tag(tag, _) => Err(CodecError::unsupported_type(format!("tag {tag}"))),
        Cbor::Array(items) => Ok(Value::Array(
            items
                .into_iter()
                .map(from_cbor_value)
                .collect::<CodecResult<_>>()?,
        )),
        Cbor::Map(pairs) => {
            let pairs = pairs
                .into_iter()
                .map(|(k, v)| Ok((from_cbor_value(k)?, from_cbor_value(v)?)))
                .collect::<CodecResult<Vec<_>>>()?;
            for window in pairs.windows(2) {
                if window[0].0.cmp_canonical(&window[1].0) != Ordering::Less {
                    return Err(CodecError::invalid_structure(
                        "map keys are not in canonical order or are duplicated",
                    ));
                }
            }
            Ok(Value::Map(pairs))
        }
        _ => Err(CodecError::unsupported_type("simple value")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::to_canonical_cbor;

    #[test]
    fn decode_scalars() {
        assert_eq!(from_cbor(&[0xf6]).unwrap(), Value::Null);
        assert_eq!(from_cbor(&[0xf5]).unwrap(), Value::Bool(true));
        assert_eq!(from_cbor(&[0x07]).unwrap(), Value::Integer(7));
        assert_eq!(from_cbor(&[0x20]).unwrap(), Value::Integer(-1));
    }

    #[test]
    fn reject_float() {
        // half-precision 1.0
        assert_eq!(from_cbor(&[0xf9, 0x3c, 0x00]), Err(CodecError::FloatForbidden));
    }

    #[test]
    fn reject_unsorted_map() {
        // {"b": 1, "a": 2}
        let bytes = [0xa2, 0x61, b'b', 0x01, 0x61, b'a', 0x02];
        assert!(matches!(
            from_cbor(&bytes),
            Err(CodecError::InvalidStructure { .. })
        ));
    }

    #[test]
    fn reject_truncated_input() {
        let bytes = to_canonical_cbor(&Value::from("hello")).unwrap();
        assert!(matches!(
            from_cbor(&bytes[..3]),
            Err(CodecError::DecodingFailed { .. })
        ));
    }
}
