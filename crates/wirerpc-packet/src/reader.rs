use bytes::Bytes;

use crate::error::{PacketError, Result};
use crate::writer::{unzigzag_i32, unzigzag_i64};

/// Cursor over one inbound message.
///
/// Fields must be read in exactly the order they were written. A single
/// reader is reused across messages via [`BinaryReader::reset`].
#[derive(Debug, Clone, Default)]
pub struct BinaryReader {
    buf: Bytes,
    pos: usize,
}

impl BinaryReader {
    /// Create an empty reader.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a reader positioned at the start of `buf`.
    pub fn from_bytes(buf: impl Into<Bytes>) -> Self {
        Self {
            buf: buf.into(),
            pos: 0,
        }
    }

    /// Point the reader at a new message and rewind the cursor.
    pub fn reset(&mut self, buf: impl Into<Bytes>) {
        self.buf = buf.into();
        self.pos = 0;
    }

    /// Current cursor offset.
    pub fn position(&self) -> usize {
        self.pos
    }

    /// Bytes left after the cursor.
    pub fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    /// Returns true when every byte has been consumed.
    pub fn is_exhausted(&self) -> bool {
        self.remaining() == 0
    }

    fn advance(&mut self, n: usize) -> Result<usize> {
        let available = self.remaining();
        if n > available {
            return Err(PacketError::Truncated {
                offset: self.pos,
                needed: n,
                available,
            });
        }
        let start = self.pos;
        self.pos += n;
        Ok(start)
    }

    fn array<const N: usize>(&mut self) -> Result<[u8; N]> {
        let start = self.advance(N)?;
        let mut raw = [0u8; N];
        raw.copy_from_slice(&self.buf[start..start + N]);
        Ok(raw)
    }

    /// Skip `n` bytes.
    pub fn skip(&mut self, n: usize) -> Result<()> {
        self.advance(n).map(|_| ())
    }

    pub fn u8(&mut self) -> Result<u8> {
        let start = self.advance(1)?;
        Ok(self.buf[start])
    }

    pub fn u16(&mut self) -> Result<u16> {
        self.array().map(u16::from_le_bytes)
    }

    pub fn u32(&mut self) -> Result<u32> {
        self.array().map(u32::from_le_bytes)
    }

    pub fn u64(&mut self) -> Result<u64> {
        self.array().map(u64::from_le_bytes)
    }

    pub fn f64(&mut self) -> Result<f64> {
        self.array().map(f64::from_le_bytes)
    }

    /// Read an unsigned LEB128 varint of at most 5 bytes.
    pub fn var_u32(&mut self) -> Result<u32> {
        let mut result = 0u32;
        for i in 0..5 {
            let byte = self.u8()?;
            if i == 4 && byte > 0x0f {
                return Err(PacketError::VarintOverflow(32));
            }
            result |= u32::from(byte & 0x7f) << (7 * i);
            if byte & 0x80 == 0 {
                return Ok(result);
            }
        }
        Err(PacketError::VarintOverflow(32))
    }

    /// Read an unsigned LEB128 varint of at most 10 bytes.
    pub fn var_u64(&mut self) -> Result<u64> {
        let mut result = 0u64;
        for i in 0..10 {
            let byte = self.u8()?;
            if i == 9 && byte > 0x01 {
                return Err(PacketError::VarintOverflow(64));
            }
            result |= u64::from(byte & 0x7f) << (7 * i);
            if byte & 0x80 == 0 {
                return Ok(result);
            }
        }
        Err(PacketError::VarintOverflow(64))
    }

    /// Read a zig-zag encoded signed varint.
    pub fn var_i32(&mut self) -> Result<i32> {
        self.var_u32().map(unzigzag_i32)
    }

    /// Read a zig-zag encoded signed varint.
    pub fn var_i64(&mut self) -> Result<i64> {
        self.var_u64().map(unzigzag_i64)
    }

    /// Read `len` bytes without copying.
    pub fn bytes(&mut self, len: usize) -> Result<Bytes> {
        let start = self.advance(len)?;
        Ok(self.buf.slice(start..start + len))
    }

    /// Read a `u32` length followed by that many bytes.
    pub fn bytes_of_u32(&mut self) -> Result<Bytes> {
        let len = self.u32()? as usize;
        self.bytes(len)
    }

    /// Read a varint length followed by that many bytes.
    pub fn bytes_of_var_u32(&mut self) -> Result<Bytes> {
        let len = self.var_u32()? as usize;
        self.bytes(len)
    }

    /// Read a varint length followed by that many bytes of UTF-8.
    pub fn string_of_var_u32(&mut self) -> Result<String> {
        let raw = self.bytes_of_var_u32()?;
        Ok(std::str::from_utf8(&raw)?.to_owned())
    }
}
