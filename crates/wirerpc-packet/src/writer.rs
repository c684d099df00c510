use bytes::{BufMut, Bytes, BytesMut};

use crate::error::{PacketError, Result};

const INITIAL_BUFFER_CAPACITY: usize = 256;

/// Append an unsigned LEB128 varint.
pub fn put_var_u64(dst: &mut impl BufMut, mut value: u64) {
    while value >= 0x80 {
        dst.put_u8((value as u8 & 0x7f) | 0x80);
        value >>= 7;
    }
    dst.put_u8(value as u8);
}

/// Append an unsigned LEB128 varint.
pub fn put_var_u32(dst: &mut impl BufMut, value: u32) {
    put_var_u64(dst, u64::from(value));
}

pub fn zigzag_i32(value: i32) -> u32 {
    ((value << 1) ^ (value >> 31)) as u32
}

pub fn unzigzag_i32(value: u32) -> i32 {
    ((value >> 1) as i32) ^ -((value & 1) as i32)
}

pub fn zigzag_i64(value: i64) -> u64 {
    ((value << 1) ^ (value >> 63)) as u64
}

pub fn unzigzag_i64(value: u64) -> i64 {
    ((value >> 1) as i64) ^ -((value & 1) as i64)
}

/// Checks that a length fits the `u32` prefixes used on the wire.
pub(crate) fn wire_len(len: usize) -> Result<u32> {
    u32::try_from(len).map_err(|_| PacketError::ContentTooLarge {
        size: len,
        max: u32::MAX as usize,
    })
}

/// Growable little-endian buffer with the same field vocabulary as
/// [`BinaryReader`](crate::BinaryReader).
#[derive(Debug, Default)]
pub struct BinaryWriter {
    buf: BytesMut,
}

impl BinaryWriter {
    pub fn new() -> Self {
        Self::with_capacity(INITIAL_BUFFER_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buf: BytesMut::with_capacity(capacity),
        }
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn u8(&mut self, value: u8) -> &mut Self {
        self.buf.put_u8(value);
        self
    }

    pub fn u16(&mut self, value: u16) -> &mut Self {
        self.buf.put_u16_le(value);
        self
    }

    pub fn u32(&mut self, value: u32) -> &mut Self {
        self.buf.put_u32_le(value);
        self
    }

    pub fn u64(&mut self, value: u64) -> &mut Self {
        self.buf.put_u64_le(value);
        self
    }

    pub fn f64(&mut self, value: f64) -> &mut Self {
        self.buf.put_f64_le(value);
        self
    }

    pub fn var_u32(&mut self, value: u32) -> &mut Self {
        put_var_u32(&mut self.buf, value);
        self
    }

    pub fn var_u64(&mut self, value: u64) -> &mut Self {
        put_var_u64(&mut self.buf, value);
        self
    }

    pub fn var_i32(&mut self, value: i32) -> &mut Self {
        self.var_u32(zigzag_i32(value))
    }

    pub fn var_i64(&mut self, value: i64) -> &mut Self {
        self.var_u64(zigzag_i64(value))
    }

    /// Append raw bytes with no length prefix.
    pub fn bytes(&mut self, value: &[u8]) -> &mut Self {
        self.buf.put_slice(value);
        self
    }

    /// Append a `u32` length followed by the bytes.
    pub fn bytes_of_u32(&mut self, value: &[u8]) -> Result<&mut Self> {
        let len = wire_len(value.len())?;
        self.buf.put_u32_le(len);
        self.buf.put_slice(value);
        Ok(self)
    }

    /// Append a varint length followed by the bytes.
    pub fn bytes_of_var_u32(&mut self, value: &[u8]) -> Result<&mut Self> {
        let len = wire_len(value.len())?;
        put_var_u32(&mut self.buf, len);
        self.buf.put_slice(value);
        Ok(self)
    }

    /// Append a varint length followed by the UTF-8 bytes of `value`.
    pub fn string_of_var_u32(&mut self, value: &str) -> Result<&mut Self> {
        self.bytes_of_var_u32(value.as_bytes())
    }

    /// Take the written bytes, leaving the writer empty for reuse.
    pub fn dump(&mut self) -> Bytes {
        self.buf.split().freeze()
    }
}
