/*!
 Positioned byte-level primitives over an in-memory `typedstream`.

 This is the lowest layer of the decoder: it knows nothing about head bytes,
 type encodings, or events, only how to pull fixed-width integers, floats, and
 length-prefixed blobs out of a byte slice while honoring whatever byte order
 the stream's header declared.
*/
use crate::error::{Error, Result};

/// The multi-byte integer/float interpretation in effect for the remainder of a decode
///
/// Captured once from the stream header (spec.md §3) and then applied to every
/// subsequent multi-byte read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ByteOrder {
    Little,
    Big,
}

/// Wraps a byte slice and tracks the current read position
#[derive(Debug)]
pub struct ByteReader<'a> {
    bytes: &'a [u8],
    pos: usize,
    order: ByteOrder,
}

impl<'a> ByteReader<'a> {
    pub fn new(bytes: &'a [u8]) -> Self {
        Self {
            bytes,
            pos: 0,
            order: ByteOrder::Little,
        }
    }

    /// Current byte offset, used for diagnostics in errors
    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn byte_order(&self) -> ByteOrder {
        self.order
    }

    /// Fix the byte order used for every subsequent multi-byte read
    pub fn set_byte_order(&mut self, order: ByteOrder) {
        self.order = order;
    }

    pub fn is_at_end(&self) -> bool {
        self.pos >= self.bytes.len()
    }

    pub fn remaining(&self) -> usize {
        self.bytes.len() - self.pos.min(self.bytes.len())
    }

    /// Read the byte at the current position without consuming it
    pub fn peek_byte(&self) -> Result<u8> {
        self.bytes.get(self.pos).copied().ok_or(Error::Truncated {
            offset: self.pos,
            requested: 1,
            available: self.remaining(),
        })
    }

    /// Peek one byte past the current position, used by the stream reader to
    /// collapse runs of repeated type bytes
    pub fn peek_next_byte(&self) -> Result<u8> {
        self.bytes
            .get(self.pos + 1)
            .copied()
            .ok_or(Error::Truncated {
                offset: self.pos + 1,
                requested: 1,
                available: self.bytes.len().saturating_sub(self.pos + 1),
            })
    }

    /// Consume and return a single byte
    pub fn read_byte(&mut self) -> Result<u8> {
        let byte = self.peek_byte()?;
        self.pos += 1;
        Ok(byte)
    }

    /// Consume and return exactly `n` bytes
    pub fn read_exact(&mut self, n: usize) -> Result<&'a [u8]> {
        let end = self
            .pos
            .checked_add(n)
            .filter(|&end| end <= self.bytes.len())
            .ok_or(Error::Truncated {
                offset: self.pos,
                requested: n,
                available: self.remaining(),
            })?;
        let slice = &self.bytes[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    fn read_array<const N: usize>(&mut self) -> Result<[u8; N]> {
        self.read_exact(N)?
            .try_into()
            .map_err(Error::SliceError)
    }

    pub fn read_i16(&mut self) -> Result<i16> {
        let buf = self.read_array::<2>()?;
        Ok(match self.order {
            ByteOrder::Little => i16::from_le_bytes(buf),
            ByteOrder::Big => i16::from_be_bytes(buf),
        })
    }

    pub fn read_u16(&mut self) -> Result<u16> {
        let buf = self.read_array::<2>()?;
        Ok(match self.order {
            ByteOrder::Little => u16::from_le_bytes(buf),
            ByteOrder::Big => u16::from_be_bytes(buf),
        })
    }

    pub fn read_i32(&mut self) -> Result<i32> {
        let buf = self.read_array::<4>()?;
        Ok(match self.order {
            ByteOrder::Little => i32::from_le_bytes(buf),
            ByteOrder::Big => i32::from_be_bytes(buf),
        })
    }

    pub fn read_u32(&mut self) -> Result<u32> {
        let buf = self.read_array::<4>()?;
        Ok(match self.order {
            ByteOrder::Little => u32::from_le_bytes(buf),
            ByteOrder::Big => u32::from_be_bytes(buf),
        })
    }

    pub fn read_f32(&mut self) -> Result<f32> {
        let buf = self.read_array::<4>()?;
        Ok(match self.order {
            ByteOrder::Little => f32::from_le_bytes(buf),
            ByteOrder::Big => f32::from_be_bytes(buf),
        })
    }

    pub fn read_f64(&mut self) -> Result<f64> {
        let buf = self.read_array::<8>()?;
        Ok(match self.order {
            ByteOrder::Little => f64::from_le_bytes(buf),
            ByteOrder::Big => f64::from_be_bytes(buf),
        })
    }

    /// Read `n` bytes and interpret them as UTF-8 text
    pub fn read_str(&mut self, n: usize) -> Result<&'a str> {
        std::str::from_utf8(self.read_exact(n)?).map_err(Error::StringParseError)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_little_endian_by_default() {
        let bytes = [0x00, 0x01];
        let mut reader = ByteReader::new(&bytes);
        assert_eq!(reader.read_u16().unwrap(), 0x0100);
    }

    #[test]
    fn honors_big_endian_once_set() {
        let bytes = [0x00, 0x01];
        let mut reader = ByteReader::new(&bytes);
        reader.set_byte_order(ByteOrder::Big);
        assert_eq!(reader.read_u16().unwrap(), 0x0001);
    }

    #[test]
    fn truncated_read_is_an_error() {
        let bytes = [0x01];
        let mut reader = ByteReader::new(&bytes);
        assert!(matches!(reader.read_u16(), Err(Error::Truncated { .. })));
    }

    #[test]
    fn position_advances_with_reads() {
        let bytes = [0xAA, 0xBB, 0xCC];
        let mut reader = ByteReader::new(&bytes);
        reader.read_byte().unwrap();
        assert_eq!(reader.position(), 1);
        reader.read_exact(2).unwrap();
        assert_eq!(reader.position(), 3);
        assert!(reader.is_at_end());
    }
}
