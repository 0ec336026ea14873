//! Runtime support for `wirec`-generated codecs.
//!
//! Generated code depends on this crate alone: a slice-backed [`Reader`],
//! a growable [`Writer`] with count backpatching, the [`Codec`] triple,
//! [`FieldCodec`] for custom member codecs, and a process-wide buffer pool
//! for pooled-buffer members.
//!
//! All multi-byte values are little-endian on the wire. Text is a 4-byte
//! little-endian byte-length prefix followed by UTF-8 bytes.

mod codec;
mod error;
mod pool;
mod reader;
mod writer;

pub use codec::{decode_from_slice, encode_to_vec, Codec, FieldCodec};
pub use error::{DecodeError, EncodeError};
pub use pool::PooledBuf;
pub use reader::Reader;
pub use writer::{CountSlot, Writer};

/// Upper bound on speculative `Vec::with_capacity` in generated decode
/// loops. A hostile count field must not translate into an allocation
/// before the elements actually arrive.
pub const MAX_COUNT_PREALLOC: usize = 4096;
