#![forbid(unsafe_code)]
#![doc = include_str!("../README.md")]

pub mod byte_reader;
pub mod error;
pub mod events;
pub mod head_byte;
pub mod reference_table;
pub mod stream_reader;
pub mod type_encoding;
pub mod unarchiver;

pub use error::{Error, Result};
pub use stream_reader::StreamReader;
pub use unarchiver::{unarchive_all, unarchive_from_bytes, Unarchiver};
