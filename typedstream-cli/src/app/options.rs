/*!
 Command-line argument parsing for the two subcommands this binary exposes
 (spec.md §6 "CLI surface").
*/
use std::path::PathBuf;

use clap::{crate_version, Arg, ArgMatches, Command};

pub const SUBCOMMAND_READ: &str = "read";
pub const SUBCOMMAND_DECODE: &str = "decode";
pub const OPTION_FILE: &str = "file";

/// Which subcommand the user invoked
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// `read <file>`: dump the raw event stream
    Read,
    /// `decode <file>`: dump the reconstructed object tree
    Decode,
}

/// Parsed, validated command-line options
pub struct Options {
    pub path: PathBuf,
    pub mode: Mode,
}

impl Options {
    pub fn from_args(args: &ArgMatches) -> Result<Self, String> {
        let (mode, sub_args) = match args.subcommand() {
            Some((SUBCOMMAND_READ, sub_args)) => (Mode::Read, sub_args),
            Some((SUBCOMMAND_DECODE, sub_args)) => (Mode::Decode, sub_args),
            _ => return Err(format!("expected a `{SUBCOMMAND_READ}` or `{SUBCOMMAND_DECODE}` subcommand")),
        };

        let path = sub_args
            .get_one::<String>(OPTION_FILE)
            .map(PathBuf::from)
            .ok_or_else(|| format!("missing required <{OPTION_FILE}> argument"))?;

        Ok(Options { path, mode })
    }
}

fn file_arg() -> Arg {
    Arg::new(OPTION_FILE)
        .required(true)
        .value_name("path/to/file")
        .help("Path to a typedstream-encoded file")
}

pub fn from_command_line() -> ArgMatches {
    Command::new("typedstream-cli")
        .version(crate_version!())
        .about("Dump typedstream event streams and decoded object trees")
        .subcommand_required(true)
        .subcommand(
            Command::new(SUBCOMMAND_READ)
                .about("Tokenize the file and dump its raw event stream")
                .arg(file_arg()),
        )
        .subcommand(
            Command::new(SUBCOMMAND_DECODE)
                .about("Unarchive the file and dump the reconstructed object tree")
                .arg(file_arg()),
        )
        .get_matches()
}
