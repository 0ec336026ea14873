use crate::error::{DecodeError, EncodeError};
use crate::reader::Reader;
use crate::writer::Writer;

/// The generated triple for one schema type.
///
/// The contract between the three operations is exact: `encode` writes
/// `size()` bytes, and a successful `decode` consumes `size()` bytes of
/// the value it produced.
pub trait Codec: Sized {
    /// Exact encoded byte length. No side effects.
    fn size(&self) -> usize;

    /// Writes exactly `self.size()` bytes into `w`.
    fn encode(&self, w: &mut Writer) -> Result<(), EncodeError>;

    /// Reads one value, consuming exactly `value.size()` bytes.
    fn decode(r: &mut Reader<'_>) -> Result<Self, DecodeError>;
}

/// A custom codec for a single member, supplied by the application.
///
/// Generated code obtains one instance per codec identity from a
/// lazily-initialized table and routes all three operations through it;
/// none of the built-in strategy selection applies to such members.
pub trait FieldCodec<T> {
    fn field_size(&self, value: &T) -> usize;
    fn encode_field(&self, value: &T, w: &mut Writer) -> Result<(), EncodeError>;
    fn decode_field(&self, r: &mut Reader<'_>) -> Result<T, DecodeError>;
}

/// Encodes a value into a fresh buffer sized by `Codec::size`.
pub fn encode_to_vec<T: Codec>(value: &T) -> Result<Vec<u8>, EncodeError> {
    let mut w = Writer::with_capacity(value.size());
    value.encode(&mut w)?;
    debug_assert_eq!(w.len(), value.size(), "encode/size disagreement");
    Ok(w.into_vec())
}

/// Decodes a value from the front of `bytes`, returning it together with
/// the number of bytes consumed.
pub fn decode_from_slice<T: Codec>(bytes: &[u8]) -> Result<(T, usize), DecodeError> {
    let mut r = Reader::new(bytes);
    let value = T::decode(&mut r)?;
    Ok((value, r.consumed()))
}
