//! Aligned primitive encoding and decoding.
//!
//! The DBus marshaling format aligns every value to the natural alignment of
//! its type and requires padding bytes to be zero. [`WireBuf`] appends
//! values in a chosen byte order; [`WireCursor`] walks a byte slice in the
//! order announced by the message's endianness tag.

use crate::WireError;

/// Byte order of a message, from the first header byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endian {
    Little,
    Big,
}

impl Endian {
    /// The broker emits host byte order; readers must accept either.
    pub const NATIVE: Self = if cfg!(target_endian = "big") {
        Self::Big
    } else {
        Self::Little
    };

    /// Decode the endianness tag byte (`l` or `B`).
    #[must_use]
    pub const fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            fbus_types::protocol::ENDIAN_LITTLE => Some(Self::Little),
            fbus_types::protocol::ENDIAN_BIG => Some(Self::Big),
            _ => None,
        }
    }

    #[inline]
    #[must_use]
    pub const fn tag(self) -> u8 {
        match self {
            Self::Little => fbus_types::protocol::ENDIAN_LITTLE,
            Self::Big => fbus_types::protocol::ENDIAN_BIG,
        }
    }
}

/// Growable encode buffer.
#[derive(Debug)]
pub struct WireBuf {
    data: Vec<u8>,
    endian: Endian,
}

macro_rules! push_int {
    ($name:ident, $ty:ty, $align:expr) => {
        pub fn $name(&mut self, value: $ty) {
            self.pad_to($align);
            let bytes = match self.endian {
                Endian::Little => value.to_le_bytes(),
                Endian::Big => value.to_be_bytes(),
            };
            self.data.extend_from_slice(&bytes);
        }
    };
}

impl WireBuf {
    #[must_use]
    pub fn new(endian: Endian) -> Self {
        Self {
            data: Vec::with_capacity(256),
            endian,
        }
    }

    #[inline]
    #[must_use]
    pub fn endian(&self) -> Endian {
        self.endian
    }

    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Append zero bytes until the write position is `align`-aligned.
    pub fn pad_to(&mut self, align: usize) {
        let missing = self.data.len().next_multiple_of(align) - self.data.len();
        self.data.resize(self.data.len() + missing, 0);
    }

    pub fn push_u8(&mut self, value: u8) {
        self.data.push(value);
    }

    push_int!(push_u16, u16, 2);
    push_int!(push_i16, i16, 2);
    push_int!(push_u32, u32, 4);
    push_int!(push_i32, i32, 4);
    push_int!(push_u64, u64, 8);
    push_int!(push_i64, i64, 8);

    pub fn push_f64(&mut self, value: f64) {
        self.pad_to(8);
        let bytes = match self.endian {
            Endian::Little => value.to_bits().to_le_bytes(),
            Endian::Big => value.to_bits().to_be_bytes(),
        };
        self.data.extend_from_slice(&bytes);
    }

    pub fn push_bool(&mut self, value: bool) {
        self.push_u32(u32::from(value));
    }

    /// Append a string: aligned u32 byte length, the bytes, one NUL.
    pub fn push_string(&mut self, value: &str) {
        self.push_u32(value.len() as u32);
        self.data.extend_from_slice(value.as_bytes());
        self.data.push(0);
    }

    /// Append a signature: u8 byte length, the bytes, one NUL.
    pub fn push_signature(&mut self, value: &str) {
        debug_assert!(value.len() <= u8::MAX as usize);
        self.data.push(value.len() as u8);
        self.data.extend_from_slice(value.as_bytes());
        self.data.push(0);
    }

    pub fn push_bytes(&mut self, bytes: &[u8]) {
        self.data.extend_from_slice(bytes);
    }

    /// Reserve an aligned u32 slot, to be patched once its value is known
    /// (array lengths, the body-length header field).
    #[must_use]
    pub fn reserve_u32(&mut self) -> usize {
        self.pad_to(4);
        let at = self.data.len();
        self.data.extend_from_slice(&[0; 4]);
        at
    }

    /// Patch a slot returned by [`WireBuf::reserve_u32`].
    pub fn patch_u32(&mut self, at: usize, value: u32) {
        let bytes = match self.endian {
            Endian::Little => value.to_le_bytes(),
            Endian::Big => value.to_be_bytes(),
        };
        self.data[at..at + 4].copy_from_slice(&bytes);
    }

    #[must_use]
    pub fn into_vec(self) -> Vec<u8> {
        self.data
    }
}

/// Decode cursor over one message image.
#[derive(Debug, Clone)]
pub struct WireCursor<'a> {
    data: &'a [u8],
    offset: usize,
    endian: Endian,
}

macro_rules! read_int {
    ($name:ident, $ty:ty, $align:expr) => {
        pub fn $name(&mut self) -> Result<$ty, WireError> {
            self.align_to($align)?;
            let bytes = self.take(std::mem::size_of::<$ty>())?;
            let array = bytes.try_into().expect("length checked by take()");
            Ok(match self.endian {
                Endian::Little => <$ty>::from_le_bytes(array),
                Endian::Big => <$ty>::from_be_bytes(array),
            })
        }
    };
}

impl<'a> WireCursor<'a> {
    #[must_use]
    pub fn new(data: &'a [u8], endian: Endian) -> Self {
        Self {
            data,
            offset: 0,
            endian,
        }
    }

    #[inline]
    #[must_use]
    pub fn offset(&self) -> usize {
        self.offset
    }

    #[inline]
    #[must_use]
    pub fn remaining(&self) -> usize {
        self.data.len() - self.offset
    }

    #[inline]
    #[must_use]
    pub fn at_end(&self) -> bool {
        self.offset == self.data.len()
    }

    #[inline]
    #[must_use]
    pub fn endian(&self) -> Endian {
        self.endian
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], WireError> {
        let end = self
            .offset
            .checked_add(n)
            .filter(|&end| end <= self.data.len())
            .ok_or(WireError::UnexpectedEof)?;
        let bytes = &self.data[self.offset..end];
        self.offset = end;
        Ok(bytes)
    }

    /// Skip padding up to `align`; the padding bytes must be zero.
    pub fn align_to(&mut self, align: usize) -> Result<(), WireError> {
        let missing = self.offset.next_multiple_of(align) - self.offset;
        let pad = self.take(missing)?;
        if pad.iter().any(|&b| b != 0) {
            return Err(WireError::NonZeroPadding);
        }
        Ok(())
    }

    pub fn read_u8(&mut self) -> Result<u8, WireError> {
        Ok(self.take(1)?[0])
    }

    read_int!(read_u16, u16, 2);
    read_int!(read_i16, i16, 2);
    read_int!(read_u32, u32, 4);
    read_int!(read_i32, i32, 4);
    read_int!(read_u64, u64, 8);
    read_int!(read_i64, i64, 8);

    pub fn read_f64(&mut self) -> Result<f64, WireError> {
        Ok(f64::from_bits(self.read_u64()?))
    }

    pub fn read_bool(&mut self) -> Result<bool, WireError> {
        match self.read_u32()? {
            0 => Ok(false),
            1 => Ok(true),
            other => Err(WireError::InvalidBool(other)),
        }
    }

    pub fn read_string(&mut self) -> Result<&'a str, WireError> {
        let len = self.read_u32()? as usize;
        self.read_str_body(len)
    }

    pub fn read_signature(&mut self) -> Result<&'a str, WireError> {
        let len = self.read_u8()? as usize;
        self.read_str_body(len)
    }

    fn read_str_body(&mut self, len: usize) -> Result<&'a str, WireError> {
        let bytes = self.take(len + 1)?;
        if bytes[len] != 0 {
            return Err(WireError::UnterminatedString);
        }
        let s = std::str::from_utf8(&bytes[..len]).map_err(|_| WireError::InvalidUtf8)?;
        if s.bytes().any(|b| b == 0) {
            return Err(WireError::UnterminatedString);
        }
        Ok(s)
    }

    pub fn read_bytes(&mut self, n: usize) -> Result<&'a [u8], WireError> {
        self.take(n)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn alignment_inserts_zero_padding() {
        let mut buf = WireBuf::new(Endian::Little);
        buf.push_u8(1);
        buf.push_u32(2);
        buf.push_u8(3);
        buf.push_u64(4);
        let data = buf.into_vec();
        assert_eq!(data.len(), 1 + 3 + 4 + 1 + 7 + 8);

        let mut cur = WireCursor::new(&data, Endian::Little);
        assert_eq!(cur.read_u8().unwrap(), 1);
        assert_eq!(cur.read_u32().unwrap(), 2);
        assert_eq!(cur.read_u8().unwrap(), 3);
        assert_eq!(cur.read_u64().unwrap(), 4);
        assert!(cur.at_end());
    }

    #[test]
    fn nonzero_padding_is_rejected() {
        let data = [1u8, 0xff, 0, 0, 2, 0, 0, 0];
        let mut cur = WireCursor::new(&data, Endian::Little);
        cur.read_u8().unwrap();
        assert!(matches!(cur.read_u32(), Err(WireError::NonZeroPadding)));
    }

    #[test]
    fn big_endian_round_trip() {
        let mut buf = WireBuf::new(Endian::Big);
        buf.push_u32(0xAABB_CCDD);
        buf.push_string("hi");
        let data = buf.into_vec();
        assert_eq!(&data[..4], &[0xAA, 0xBB, 0xCC, 0xDD]);

        let mut cur = WireCursor::new(&data, Endian::Big);
        assert_eq!(cur.read_u32().unwrap(), 0xAABB_CCDD);
        assert_eq!(cur.read_string().unwrap(), "hi");
    }

    #[test]
    fn string_embedded_nul_is_rejected() {
        let mut data = vec![3, 0, 0, 0];
        data.extend_from_slice(b"a\0b\0");
        let mut cur = WireCursor::new(&data, Endian::Little);
        assert!(matches!(
            cur.read_string(),
            Err(WireError::UnterminatedString)
        ));
    }

    #[test]
    fn truncated_input() {
        let data = [5, 0, 0, 0];
        let mut cur = WireCursor::new(&data, Endian::Little);
        assert!(matches!(cur.read_string(), Err(WireError::UnexpectedEof)));
    }

    #[test]
    fn patchable_length_slot() {
        let mut buf = WireBuf::new(Endian::Little);
        let slot = buf.reserve_u32();
        buf.push_string("payload");
        let len = (buf.len() - slot - 4) as u32;
        buf.patch_u32(slot, len);
        let data = buf.into_vec();
        let mut cur = WireCursor::new(&data, Endian::Little);
        assert_eq!(cur.read_u32().unwrap() as usize, data.len() - 4);
    }
}
