use crate::error::DecodeError;

/// A non-owning cursor over an in-memory byte source.
///
/// Every `take_*` either consumes exactly the bytes it reports or fails
/// without consuming anything, so `consumed()` is always the exact number
/// of bytes a successful decode used.
#[derive(Debug)]
pub struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
}

macro_rules! take_scalar {
    ($name:ident, $ty:ty, $width:expr, $what:expr) => {
        pub fn $name(&mut self) -> Result<$ty, DecodeError> {
            let bytes = self.take($width, $what)?;
            let mut raw = [0u8; $width];
            raw.copy_from_slice(bytes);
            Ok(<$ty>::from_le_bytes(raw))
        }
    };
}

macro_rules! take_count {
    ($name:ident, $via:ident) => {
        /// Reads a collection count, rejecting negative values.
        pub fn $name(&mut self, member: &'static str) -> Result<usize, DecodeError> {
            let raw = self.$via()? as i64;
            if raw < 0 {
                return Err(DecodeError::NegativeCount { member, count: raw });
            }
            Ok(raw as usize)
        }
    };
}

impl<'a> Reader<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    pub fn consumed(&self) -> usize {
        self.pos
    }

    pub fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    pub fn is_empty(&self) -> bool {
        self.pos == self.buf.len()
    }

    fn take(&mut self, n: usize, what: &'static str) -> Result<&'a [u8], DecodeError> {
        if self.remaining() < n {
            return Err(DecodeError::UnexpectedEof {
                what,
                needed: n,
                remaining: self.remaining(),
            });
        }
        let out = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        Ok(out)
    }

    take_scalar!(take_u8, u8, 1, "u8");
    take_scalar!(take_i8, i8, 1, "i8");
    take_scalar!(take_u16, u16, 2, "u16");
    take_scalar!(take_i16, i16, 2, "i16");
    take_scalar!(take_u32, u32, 4, "u32");
    take_scalar!(take_i32, i32, 4, "i32");
    take_scalar!(take_u64, u64, 8, "u64");
    take_scalar!(take_i64, i64, 8, "i64");
    take_scalar!(take_f32, f32, 4, "f32");
    take_scalar!(take_f64, f64, 8, "f64");

    pub fn take_bool(&mut self) -> Result<bool, DecodeError> {
        Ok(self.take_u8()? != 0)
    }

    /// Length-prefixed UTF-8 text: 4-byte little-endian byte count, then
    /// that many bytes. Length 0 decodes to the empty string.
    pub fn take_str(&mut self, field: &'static str) -> Result<String, DecodeError> {
        let len = self.take_count_u32(field)?;
        let bytes = self.take(len, field)?;
        let s = std::str::from_utf8(bytes).map_err(|_| DecodeError::InvalidText { field })?;
        Ok(s.to_owned())
    }

    /// Raw block read, used by the byte-collection fast path.
    pub fn take_bytes(&mut self, n: usize, what: &'static str) -> Result<&'a [u8], DecodeError> {
        self.take(n, what)
    }

    take_count!(take_count_u8, take_u8);
    take_count!(take_count_i8, take_i8);
    take_count!(take_count_u16, take_u16);
    take_count!(take_count_i16, take_i16);
    take_count!(take_count_u32, take_u32);
    take_count!(take_count_i32, take_i32);
    take_count!(take_count_i64, take_i64);

    /// u64 counts wider than the address space are rejected as EOF-sized
    /// rather than wrapped.
    pub fn take_count_u64(&mut self, member: &'static str) -> Result<usize, DecodeError> {
        let raw = self.take_u64()?;
        usize::try_from(raw).map_err(|_| DecodeError::UnexpectedEof {
            what: member,
            needed: usize::MAX,
            remaining: 0,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn take_scalars_little_endian() {
        let data = [0x01, 0x00, 0x02, 0x01, 0xd2, 0x04, 0x00, 0x00];
        let mut r = Reader::new(&data);
        assert_eq!(r.take_u8().expect("u8"), 1);
        assert_eq!(r.take_u8().expect("u8"), 0);
        assert_eq!(r.take_u16().expect("u16"), 0x0102);
        assert_eq!(r.take_i32().expect("i32"), 1234);
        assert_eq!(r.consumed(), 8);
        assert!(r.is_empty());
    }

    #[test]
    fn take_past_end_reports_needed_and_remaining() {
        let mut r = Reader::new(&[0xaa]);
        let err = r.take_u32().expect_err("short read must fail");
        assert_eq!(
            err,
            DecodeError::UnexpectedEof {
                what: "u32",
                needed: 4,
                remaining: 1
            }
        );
        // A failed take consumes nothing.
        assert_eq!(r.consumed(), 0);
        assert_eq!(r.take_u8().expect("u8 still available"), 0xaa);
    }

    #[test]
    fn take_str_reads_length_prefixed_utf8() {
        let mut data = vec![5, 0, 0, 0];
        data.extend_from_slice(b"hello");
        let mut r = Reader::new(&data);
        assert_eq!(r.take_str("greeting").expect("str"), "hello");
        assert_eq!(r.consumed(), 9);
    }

    #[test]
    fn take_str_zero_length_is_empty() {
        let mut r = Reader::new(&[0, 0, 0, 0]);
        assert_eq!(r.take_str("s").expect("str"), "");
        assert!(r.is_empty());
    }

    #[test]
    fn take_str_invalid_utf8_names_the_field() {
        let mut r = Reader::new(&[2, 0, 0, 0, 0xff, 0xfe]);
        let err = r.take_str("name").expect_err("invalid utf-8");
        assert_eq!(err, DecodeError::InvalidText { field: "name" });
    }

    #[test]
    fn negative_count_is_rejected() {
        let mut r = Reader::new(&[0xff, 0xff, 0xff, 0xff]);
        let err = r.take_count_i32("items").expect_err("negative count");
        assert_eq!(
            err,
            DecodeError::NegativeCount {
                member: "items",
                count: -1
            }
        );
    }

    #[test]
    fn bool_decodes_any_nonzero_as_true() {
        let mut r = Reader::new(&[0, 1, 7]);
        assert!(!r.take_bool().expect("bool"));
        assert!(r.take_bool().expect("bool"));
        assert!(r.take_bool().expect("bool"));
    }
}
