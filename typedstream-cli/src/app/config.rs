/*!
 Holds the loaded input and drives the subcommand the user selected.
*/
use std::{fs, path::PathBuf};

use typedstream::{stream_reader::StreamReader, unarchiver::Unarchiver};

use crate::app::{
    error::RuntimeError,
    options::{Mode, Options},
};

/// Application state: the file the user asked to parse and which subcommand to run
pub struct Config {
    mode: Mode,
    bytes: Vec<u8>,
}

impl Config {
    pub fn new(options: Options) -> Result<Self, RuntimeError> {
        let bytes = fs::read(&options.path)
            .map_err(|why| RuntimeError::ReadError(why, options.path.clone()))?;
        Ok(Self {
            mode: options.mode,
            bytes,
        })
    }

    pub fn start(&self) -> Result<(), RuntimeError> {
        match self.mode {
            Mode::Read => self.dump_events(),
            Mode::Decode => self.dump_tree(),
        }
    }

    fn dump_events(&self) -> Result<(), RuntimeError> {
        for event in StreamReader::new(&self.bytes) {
            let event = event.map_err(RuntimeError::DecodeError)?;
            println!("{event:#?}");
        }
        Ok(())
    }

    fn dump_tree(&self) -> Result<(), RuntimeError> {
        let values = Unarchiver::new(&self.bytes)
            .decode_all()
            .map_err(RuntimeError::DecodeError)?;
        for value in values {
            println!("{value:#?}");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn read_error_reports_missing_path() {
        let options = Options {
            path: PathBuf::from("/nonexistent/path/to/a/typedstream/file"),
            mode: Mode::Read,
        };
        assert!(matches!(Config::new(options), Err(RuntimeError::ReadError(_, _))));
    }
}
