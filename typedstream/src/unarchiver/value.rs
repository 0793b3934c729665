/*!
 The decoded value graph produced by the [`Unarchiver`](super::Unarchiver)
 (spec.md §5, §6).
*/
use crate::events::Scalar;

/// One link in a decoded object's class chain, most-derived first
#[derive(Debug, Clone, PartialEq)]
pub struct ClassLink {
    pub name: String,
    pub version: i64,
}

/// The fully-resolved chain of classes an object was archived under
pub type ClassChain = Vec<ClassLink>;

/// A decoded `typedstream` value
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Nil,
    /// A reserved slot for an object whose class chain/fields are still being
    /// read; only ever observed if a reference to an object points back into
    /// itself before the object it names has finished decoding (spec.md §5
    /// "Object identity")
    Placeholder,
    Scalar(Scalar),
    String(Vec<u8>),
    Selector(Option<Vec<u8>>),
    Array(Vec<Value>),
    Struct { name: String, fields: Vec<Value> },
    /// Raw bytes for a value this crate parses the shape of but does not
    /// interpret (bitfields, pointers, unknown codes)
    Unsupported { encoding: String, raw: Vec<u8> },
    /// A shared class value (a `#` slot), distinct from an object's class chain
    Class(ClassLink),
    /// An object whose class had no registered decoder: its class chain and
    /// raw field values are kept as-is
    Generic {
        class_chain: ClassChain,
        fields: Vec<Value>,
    },
    /// The result of a registered class decoder
    Object {
        class_chain: ClassChain,
        decoded: Box<Value>,
    },
    /// An `NSString`/`NSMutableString`
    Str(String),
    /// An `NSNumber`
    Number(Scalar),
    /// An `NSData`/`NSMutableData`
    Data(Vec<u8>),
    /// An `NSArray`/`NSMutableArray`
    List(Vec<Value>),
    /// An `NSDictionary`/`NSMutableDictionary`, in encounter order
    Dict(Vec<(Value, Value)>),
    /// An `NSDate`, stored as the raw reference-epoch seconds typedstream carries
    Date(f64),
}

impl Value {
    /// Borrow the contents as a UTF-8 string if this is a decoded
    /// `NSString`/`NSMutableString` value (mirrors the teacher's
    /// `deserialize_as_nsstring` convenience accessor)
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s.as_str()),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Value::List(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_dict(&self) -> Option<&[(Value, Value)]> {
        match self {
            Value::Dict(entries) => Some(entries),
            _ => None,
        }
    }
}
