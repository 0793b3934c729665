/*!
 Application plumbing: argument parsing, runtime configuration, and errors.
*/
pub mod config;
pub mod error;
pub mod options;
