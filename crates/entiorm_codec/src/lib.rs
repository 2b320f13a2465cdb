//! # EntiORM Codec
//!
//! Dynamic values and canonical CBOR encoding for EntiORM.
//!
//! [`Value`] is the storage-shaped representation of an entity field: what
//! a mapper reads from the store, what `get_raw_value` hands back, and
//! what entity snapshots are made of. Snapshots are persisted as canonical
//! CBOR so that identical state always produces identical bytes.
//!
//! ## Usage
//!
//! ```
//! use entiorm_codec::{from_cbor, to_canonical_cbor, Value};
//!
//! let value = Value::from_entries([("id", Value::Integer(7))]);
//! let bytes = to_canonical_cbor(&value).unwrap();
//! assert_eq!(from_cbor(&bytes).unwrap(), value);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod decoder;
mod encoder;
mod error;
mod value;

pub use decoder::{from_cbor, CanonicalDecoder};
pub use encoder::{to_canonical_cbor, CanonicalEncoder};
pub use error::{CodecError, CodecResult};
pub use value::Value;

/// Trait for types that can be encoded to canonical CBOR.
pub trait Encode {
    /// Encode this value to canonical CBOR bytes.
    fn encode(&self) -> CodecResult<Vec<u8>>;
}

/// Trait for types that can be decoded from CBOR.
pub trait Decode: Sized {
    /// Decode this value from CBOR bytes.
    fn decode(bytes: &[u8]) -> CodecResult<Self>;
}

impl Encode for Value {
    fn encode(&self) -> CodecResult<Vec<u8>> {
        to_canonical_cbor(self)
    }
}

impl Decode for Value {
    fn decode(bytes: &[u8]) -> CodecResult<Self> {
        from_cbor(bytes)
    }
}
