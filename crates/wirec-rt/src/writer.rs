use crate::error::EncodeError;

/// A growable little-endian byte sink.
///
/// Counts go through the checked `put_count_*` family so an oversized
/// collection surfaces as [`EncodeError::CountOverflow`] instead of a
/// silently truncated wire value. `reserve_count_*` / `patch_*` support
/// sinks that need the count written before it is known.
#[derive(Debug, Default)]
pub struct Writer {
    buf: Vec<u8>,
}

/// A reserved count slot, to be backpatched once the element run is done.
#[derive(Debug, Clone, Copy)]
pub struct CountSlot {
    pos: usize,
}

macro_rules! put_scalar {
    ($name:ident, $ty:ty) => {
        pub fn $name(&mut self, value: $ty) {
            self.buf.extend_from_slice(&value.to_le_bytes());
        }
    };
}

macro_rules! put_count {
    ($name:ident, $ty:ty, $via:ident) => {
        pub fn $name(&mut self, member: &'static str, count: usize) -> Result<(), EncodeError> {
            let narrowed = <$ty>::try_from(count).map_err(|_| EncodeError::CountOverflow {
                member,
                count,
                max: <$ty>::MAX as u64,
            })?;
            self.$via(narrowed);
            Ok(())
        }
    };
}

impl Writer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buf: Vec::with_capacity(capacity),
        }
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn into_vec(self) -> Vec<u8> {
        self.buf
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.buf
    }

    put_scalar!(put_u8, u8);
    put_scalar!(put_i8, i8);
    put_scalar!(put_u16, u16);
    put_scalar!(put_i16, i16);
    put_scalar!(put_u32, u32);
    put_scalar!(put_i32, i32);
    put_scalar!(put_u64, u64);
    put_scalar!(put_i64, i64);
    put_scalar!(put_f32, f32);
    put_scalar!(put_f64, f64);

    pub fn put_bool(&mut self, value: bool) {
        self.put_u8(value as u8);
    }

    /// Length-prefixed UTF-8 text: 4-byte little-endian byte count, then
    /// the bytes. The empty string writes a zero length and nothing else.
    pub fn put_str(&mut self, value: &str) {
        self.put_u32(value.len() as u32);
        self.buf.extend_from_slice(value.as_bytes());
    }

    /// Raw block append, used by the byte-collection fast path.
    pub fn put_bytes(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    put_count!(put_count_u8, u8, put_u8);
    put_count!(put_count_i8, i8, put_i8);
    put_count!(put_count_u16, u16, put_u16);
    put_count!(put_count_i16, i16, put_i16);
    put_count!(put_count_u32, u32, put_u32);
    put_count!(put_count_i32, i32, put_i32);
    put_count!(put_count_u64, u64, put_u64);
    put_count!(put_count_i64, i64, put_i64);

    /// Reserves a 4-byte count slot to be filled in by [`Writer::patch_i32`].
    pub fn reserve_count_i32(&mut self) -> CountSlot {
        let pos = self.buf.len();
        self.put_i32(0);
        CountSlot { pos }
    }

    pub fn patch_i32(&mut self, slot: CountSlot, value: i32) {
        self.buf[slot.pos..slot.pos + 4].copy_from_slice(&value.to_le_bytes());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scalars_are_little_endian() {
        let mut w = Writer::new();
        w.put_u16(0x0102);
        w.put_i32(1234);
        assert_eq!(w.as_slice(), &[0x02, 0x01, 0xd2, 0x04, 0x00, 0x00]);
    }

    #[test]
    fn put_str_prefixes_byte_length() {
        let mut w = Writer::new();
        w.put_str("héllo");
        // "héllo" is 6 bytes of UTF-8, not 5 characters.
        assert_eq!(&w.as_slice()[..4], &[6, 0, 0, 0]);
        assert_eq!(w.len(), 10);
    }

    #[test]
    fn count_overflow_is_an_error_not_a_wrap() {
        let mut w = Writer::new();
        let err = w
            .put_count_u8("items", 300)
            .expect_err("300 cannot be a u8 count");
        assert_eq!(
            err,
            EncodeError::CountOverflow {
                member: "items",
                count: 300,
                max: 255
            }
        );
        // Nothing was written by the failed put.
        assert!(w.is_empty());
    }

    #[test]
    fn reserve_and_patch_backfills_the_slot() {
        let mut w = Writer::new();
        let slot = w.reserve_count_i32();
        w.put_u8(0xaa);
        w.put_u8(0xbb);
        w.patch_i32(slot, 2);
        assert_eq!(w.as_slice(), &[2, 0, 0, 0, 0xaa, 0xbb]);
    }
}
