/*!
 Errors that can happen during the application's runtime
*/
use std::{
    fmt::{Display, Formatter, Result as FmtResult},
    io::Error as IoError,
    path::PathBuf,
};

use typedstream::Error as TypedStreamError;

/// Errors that can happen during the application's runtime
#[derive(Debug)]
pub enum RuntimeError {
    ReadError(IoError, PathBuf),
    DecodeError(TypedStreamError),
}

impl Display for RuntimeError {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        match self {
            RuntimeError::ReadError(why, path) => write!(fmt, "{why}: {path:?}"),
            RuntimeError::DecodeError(why) => write!(fmt, "{why}"),
        }
    }
}

impl std::error::Error for RuntimeError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            RuntimeError::ReadError(why, _) => Some(why),
            RuntimeError::DecodeError(why) => Some(why),
        }
    }
}
