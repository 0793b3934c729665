/*!
 Errors that can happen when parsing `typedstream` data.
*/

use std::{
    array::TryFromSliceError,
    fmt::{Display, Formatter, Result as FmtResult},
    str::Utf8Error,
};

use crate::reference_table::Namespace;

/// Errors that can happen while decoding a `typedstream`
#[derive(Debug)]
pub enum Error {
    /// The first bytes of the stream are not the `streamtyped` preamble
    InvalidSignature,
    /// The header declared a streamer version other than the one this crate understands
    UnsupportedStreamerVersion(u64),
    /// The byte source ran out while more bytes were expected
    Truncated {
        /// Byte offset where the read was attempted
        offset: usize,
        /// Number of bytes requested
        requested: usize,
        /// Number of bytes actually available
        available: usize,
    },
    /// A head byte was incompatible with the requested interpretation
    MalformedHead {
        /// Byte offset of the offending head byte
        offset: usize,
        /// The head byte itself
        byte: u8,
    },
    /// A reference id did not resolve to an earlier "new" occurrence in its namespace
    UnknownReference {
        /// The id that failed to resolve
        id: u64,
        /// Which of the three reference namespaces was being resolved
        namespace: Namespace,
    },
    /// The type-encoding grammar was violated
    BadTypeEncoding {
        /// The raw bytes being parsed
        bytes: Vec<u8>,
        /// Byte offset within `bytes` where parsing failed
        offset: usize,
    },
    /// The unarchiver's expected encoding did not match the stream's declared encoding
    TypeMismatch {
        /// The encoding the caller asked for
        expected: String,
        /// The encoding actually present in the stream
        actual: String,
    },
    /// A numeric value did not fit the declared type encoding
    ValueOutOfRange {
        /// The declared encoding, rendered as text (e.g. `"s"`)
        encoding: String,
        /// The raw value that was read
        raw: i64,
    },
    /// An encoding the core declines to decode a value for (e.g. a bitfield or function pointer)
    UnsupportedType(String),
    /// A registered class decoder returned an error
    ClassDecoderFailed {
        /// The name of the class whose decoder failed
        class_name: String,
        /// The underlying error
        underlying: Box<Error>,
    },
    /// Failed to interpret a byte slice as a fixed-width integer
    SliceError(TryFromSliceError),
    /// Failed to interpret bytes as UTF-8 text
    StringParseError(Utf8Error),
}

impl Display for Error {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        match self {
            Error::InvalidSignature => write!(fmt, "input is not a typedstream (bad signature)"),
            Error::UnsupportedStreamerVersion(version) => {
                write!(fmt, "unsupported streamer version {version}, only 4 is understood")
            }
            Error::Truncated {
                offset,
                requested,
                available,
            } => write!(
                fmt,
                "truncated stream at offset {offset:#x}: needed {requested} bytes, only {available} available"
            ),
            Error::MalformedHead { offset, byte } => {
                write!(fmt, "malformed head byte {byte:#04x} at offset {offset:#x}")
            }
            Error::UnknownReference { id, namespace } => {
                write!(fmt, "unknown reference {id} in {namespace} namespace")
            }
            Error::BadTypeEncoding { bytes, offset } => write!(
                fmt,
                "invalid type encoding at offset {offset}: {:?}",
                String::from_utf8_lossy(bytes)
            ),
            Error::TypeMismatch { expected, actual } => {
                write!(fmt, "expected encoding `{expected}`, found `{actual}`")
            }
            Error::ValueOutOfRange { encoding, raw } => {
                write!(fmt, "value {raw} does not fit declared encoding `{encoding}`")
            }
            Error::UnsupportedType(encoding) => {
                write!(fmt, "unsupported type encoding `{encoding}`")
            }
            Error::ClassDecoderFailed {
                class_name,
                underlying,
            } => write!(fmt, "decoder for class `{class_name}` failed: {underlying}"),
            Error::SliceError(why) => write!(fmt, "unable to slice source stream: {why}"),
            Error::StringParseError(why) => write!(fmt, "failed to parse string: {why}"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::ClassDecoderFailed { underlying, .. } => Some(underlying),
            Error::SliceError(why) => Some(why),
            Error::StringParseError(why) => Some(why),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
