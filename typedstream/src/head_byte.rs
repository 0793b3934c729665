/*!
 Decodes the format's variable-width integer and tag-byte ("head byte") scheme.

 Every scalar and every shared reference in a `typedstream` begins with a
 single head byte that says how to interpret what follows (spec.md §3, §4.2).
 Most byte values are direct signed-integer literals; a handful are reserved
 as control tags. The exact wire values below are a concrete resolution of the
 loosely specified constants in spec.md §3 (see `DESIGN.md`): the literal
 range and the two/four-byte integer extension tags are grounded in the
 teacher's reverse-engineered, empirically-verified parser; the single-byte
 `HEAD_REF` tag generalizes it to an unsigned extension so arbitrarily large
 reference tables are representable.
*/
use crate::byte_reader::ByteReader;
use crate::error::{Error, Result};

/// Next 2 bytes are a signed 16-bit integer
pub const HEAD_INT_2BYTES: u8 = 0x81;
/// Next 4 bytes are a signed 32-bit integer
pub const HEAD_INT_4BYTES: u8 = 0x82;
/// Next 4 or 8 bytes are an IEEE float, width picked by the expected type
pub const HEAD_FLOAT: u8 = 0x83;
/// A freshly shared value (object, class, c-string, or type-encoding) follows
pub const HEAD_NEW: u8 = 0x84;
/// Nil sentinel: a nil object reference, or the terminator of a class chain
pub const HEAD_NIL: u8 = 0x85;
/// End-of-object marker
pub const HEAD_END: u8 = 0x86;
/// Bytes at or above this value (and below [`HEAD_REF_EXT`]) are inline reference ids:
/// `id = byte - HEAD_REF_BASE`
pub const HEAD_REF_BASE: u8 = 0x92;
/// Extended reference id: the next head-byte-coded unsigned integer is the id
pub const HEAD_REF_EXT: u8 = 0xFF;

/// The inline reference-id space spans `HEAD_REF_BASE..HEAD_REF_EXT`
const MAX_INLINE_REF: u8 = HEAD_REF_EXT - 1;

fn is_reserved(byte: u8) -> bool {
    matches!(
        byte,
        HEAD_INT_2BYTES | HEAD_INT_4BYTES | HEAD_FLOAT | HEAD_NEW | HEAD_NIL | HEAD_END
    ) || byte >= HEAD_REF_BASE
}

/// Read a signed integer, widened to [`i64`] regardless of its encoded width
pub fn read_signed_int(reader: &mut ByteReader) -> Result<i64> {
    let offset = reader.position();
    match reader.peek_byte()? {
        HEAD_INT_2BYTES => {
            reader.read_byte()?;
            Ok(reader.read_i16()? as i64)
        }
        HEAD_INT_4BYTES => {
            reader.read_byte()?;
            Ok(reader.read_i32()? as i64)
        }
        byte if is_reserved(byte) => Err(Error::MalformedHead { offset, byte }),
        byte => {
            reader.read_byte()?;
            Ok(byte as i8 as i64)
        }
    }
}

/// Read an unsigned integer, widened to [`u64`] regardless of its encoded width
pub fn read_unsigned_int(reader: &mut ByteReader) -> Result<u64> {
    let offset = reader.position();
    match reader.peek_byte()? {
        HEAD_INT_2BYTES => {
            reader.read_byte()?;
            Ok(reader.read_u16()? as u64)
        }
        HEAD_INT_4BYTES => {
            reader.read_byte()?;
            Ok(reader.read_u32()? as u64)
        }
        byte if is_reserved(byte) => Err(Error::MalformedHead { offset, byte }),
        byte => {
            reader.read_byte()?;
            Ok(byte as u64)
        }
    }
}

/// Read a 32-bit float, honoring a literal [`HEAD_FLOAT`] tag or falling back
/// to an integer literal coerced into a float (small whole-number floats are
/// sometimes written as plain integers)
pub fn read_float(reader: &mut ByteReader) -> Result<f32> {
    match reader.peek_byte()? {
        HEAD_FLOAT => {
            reader.read_byte()?;
            reader.read_f32()
        }
        _ => Ok(read_signed_int(reader)? as f32),
    }
}

/// Read a 64-bit float, same fallback rule as [`read_float`]
pub fn read_double(reader: &mut ByteReader) -> Result<f64> {
    match reader.peek_byte()? {
        HEAD_FLOAT => {
            reader.read_byte()?;
            reader.read_f64()
        }
        _ => Ok(read_signed_int(reader)? as f64),
    }
}

/// What the head byte at the current position announces, for callers that
/// need to branch on shared-value structure (objects, classes, c-strings)
/// rather than just read a number
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeadTag {
    New,
    Nil,
    End,
    Reference(u64),
}

/// Peek the current head byte and classify it as one of the structural tags,
/// without consuming anything but a [`HEAD_REF_EXT`] extension int
pub fn peek_tag(reader: &mut ByteReader) -> Result<HeadTag> {
    let offset = reader.position();
    match reader.peek_byte()? {
        HEAD_NEW => Ok(HeadTag::New),
        HEAD_NIL => Ok(HeadTag::Nil),
        HEAD_END => Ok(HeadTag::End),
        HEAD_REF_EXT => {
            reader.read_byte()?;
            let id = read_unsigned_int(reader)?;
            Ok(HeadTag::Reference(id))
        }
        byte if byte >= HEAD_REF_BASE => {
            reader.read_byte()?;
            Ok(HeadTag::Reference((byte - HEAD_REF_BASE) as u64))
        }
        byte => Err(Error::MalformedHead { offset, byte }),
    }
}

/// Consume the [`HEAD_NEW`] tag. Callers use this once they've decided (via
/// [`peek_tag`]) that a fresh shared value follows.
pub fn expect_new(reader: &mut ByteReader) -> Result<()> {
    let offset = reader.position();
    let byte = reader.read_byte()?;
    if byte == HEAD_NEW {
        Ok(())
    } else {
        Err(Error::MalformedHead { offset, byte })
    }
}

/// Consume the [`HEAD_NIL`] tag.
pub fn expect_nil(reader: &mut ByteReader) -> Result<()> {
    let offset = reader.position();
    let byte = reader.read_byte()?;
    if byte == HEAD_NIL {
        Ok(())
    } else {
        Err(Error::MalformedHead { offset, byte })
    }
}

/// Consume the [`HEAD_END`] tag.
pub fn expect_end(reader: &mut ByteReader) -> Result<()> {
    let offset = reader.position();
    let byte = reader.read_byte()?;
    if byte == HEAD_END {
        Ok(())
    } else {
        Err(Error::MalformedHead { offset, byte })
    }
}

/// Encode a reference id back into its inline-or-extended head byte form,
/// used by the reference table's round-trip tests and by callers that want
/// to understand how many distinct ids an inline encoding can hold
pub fn encode_reference(id: u64) -> Vec<u8> {
    if id <= (MAX_INLINE_REF - HEAD_REF_BASE) as u64 {
        vec![HEAD_REF_BASE + id as u8]
    } else {
        let mut out = vec![HEAD_REF_EXT];
        if id <= u16::MAX as u64 {
            out.push(HEAD_INT_2BYTES);
            out.extend_from_slice(&(id as u16).to_le_bytes());
        } else {
            out.push(HEAD_INT_4BYTES);
            out.extend_from_slice(&(id as u32).to_le_bytes());
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn two_byte_signed_literal() {
        let bytes = [HEAD_INT_2BYTES, 0xFF, 0xFF];
        let mut reader = ByteReader::new(&bytes);
        assert_eq!(read_signed_int(&mut reader).unwrap(), -1);
    }

    #[test]
    fn four_byte_unsigned_literal() {
        // matches the boundary example in spec.md §8 under a big-endian header
        let bytes = [HEAD_INT_4BYTES, 0x00, 0x00, 0x01, 0x00];
        let mut reader = ByteReader::new(&bytes);
        reader.set_byte_order(crate::byte_reader::ByteOrder::Big);
        assert_eq!(read_unsigned_int(&mut reader).unwrap(), 256);
    }

    #[test]
    fn direct_literal_byte() {
        let bytes = [0x05];
        let mut reader = ByteReader::new(&bytes);
        assert_eq!(read_signed_int(&mut reader).unwrap(), 5);
    }

    #[test]
    fn negative_direct_literal_byte() {
        let bytes = [0xFE]; // -2 as i8
        let mut reader = ByteReader::new(&bytes);
        assert_eq!(read_signed_int(&mut reader).unwrap(), -2);
    }

    #[test]
    fn inline_reference_round_trips() {
        let encoded = encode_reference(3);
        let mut reader = ByteReader::new(&encoded);
        assert_eq!(peek_tag(&mut reader).unwrap(), HeadTag::Reference(3));
    }

    #[test]
    fn extended_reference_round_trips() {
        let encoded = encode_reference(10_000);
        let mut reader = ByteReader::new(&encoded);
        assert_eq!(peek_tag(&mut reader).unwrap(), HeadTag::Reference(10_000));
    }

    #[test]
    fn float_tag_reads_four_bytes() {
        let mut bytes = vec![HEAD_FLOAT];
        bytes.extend_from_slice(&1.5f32.to_le_bytes());
        let mut reader = ByteReader::new(&bytes);
        assert_eq!(read_float(&mut reader).unwrap(), 1.5);
    }

    #[test]
    fn float_falls_back_to_integer_literal() {
        let bytes = [7u8];
        let mut reader = ByteReader::new(&bytes);
        assert_eq!(read_float(&mut reader).unwrap(), 7.0);
    }
}
