/*!
 The flat event stream emitted by the [`StreamReader`](crate::stream_reader::StreamReader)
 (spec.md §3 "Events").
*/
use crate::byte_reader::ByteOrder;
use crate::type_encoding::TypeDescriptor;

/// A decoded scalar, produced for every primitive-typed slot in a
/// `BeginTypedValues` group
#[derive(Debug, Clone, PartialEq)]
pub enum Scalar {
    Signed(i64),
    Unsigned(u64),
    Float(f32),
    Double(f64),
}

/// One event in the flat stream the [`StreamReader`](crate::stream_reader::StreamReader)
/// produces. Every `Begin*` is closed by exactly one matching `End*`
/// (spec.md §3 "Invariants").
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    /// Emitted exactly once, first
    Header {
        streamer_version: u64,
        byte_order: ByteOrderTag,
        system_version: u64,
    },
    /// Opens a group whose values follow in order
    BeginTypedValues(Vec<TypeDescriptor>),
    /// Closes the group opened by the matching `BeginTypedValues`
    EndTypedValues,
    /// A decoded primitive scalar
    Atom(Scalar),
    /// Opens an object group; `id` is the id just assigned to it in the
    /// object namespace
    BeginObject { id: u64 },
    /// One link in the object's class chain, most-derived first
    SingleClass { name: Vec<u8>, version: i64, id: u64 },
    /// A reference to an earlier class link, terminating the chain
    ClassReference { id: u64 },
    /// Closes the object group opened by `BeginObject`
    EndObject,
    BeginArray { count: u32 },
    EndArray,
    BeginStruct { name: String },
    EndStruct,
    /// A shared, nil-permitted C string
    CString { value: Option<Vec<u8>>, id: Option<u64> },
    /// A selector, coded identically to a C string
    Selector { value: Option<Vec<u8>> },
    /// A reference to an earlier object, resolved by the Unarchiver to the
    /// identical decoded value
    ObjectReference { id: u64 },
    /// A nil object in an `@` slot
    Nil,
    /// Raw bytes for an encoding this crate parses but does not interpret
    /// (bitfields, pointers, unknown single-character codes)
    UnsupportedAtom { encoding: String, raw: Vec<u8> },
}

/// Byte order recorded in the stream header (spec.md §3)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ByteOrderTag {
    Little,
    Big,
}

impl From<ByteOrderTag> for ByteOrder {
    fn from(tag: ByteOrderTag) -> Self {
        match tag {
            ByteOrderTag::Little => ByteOrder::Little,
            ByteOrderTag::Big => ByteOrder::Big,
        }
    }
}
