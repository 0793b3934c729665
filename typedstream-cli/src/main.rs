#![forbid(unsafe_code)]
#![doc = include_str!("../README.md")]
mod app;

use std::process::ExitCode;

use app::{
    config::Config,
    options::{from_command_line, Options},
};

fn main() -> ExitCode {
    let args = from_command_line();

    let options = match Options::from_args(&args) {
        Ok(options) => options,
        Err(why) => {
            eprintln!("Invalid command line options: {why}");
            return ExitCode::FAILURE;
        }
    };

    let config = match Config::new(options) {
        Ok(config) => config,
        Err(why) => {
            eprintln!("Unable to load input: {why}");
            return ExitCode::FAILURE;
        }
    };

    if let Err(why) = config.start() {
        eprintln!("Unable to parse input: {why}");
        return ExitCode::FAILURE;
    }

    ExitCode::SUCCESS
}
