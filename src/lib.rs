//! `osh`: a small interactive shell.
//!
//! Reads one line at a time and runs it as a child process, with a
//! trailing `&` for background execution, one `|` between two commands,
//! `<`/`>` redirection of stdin/stdout and `!!` to run the previous line
//! again.

pub mod config;
pub mod eval;
pub mod global;
pub mod history;
pub mod job;
pub mod parser;
pub mod redirect;
pub mod types;

pub use config::Config;
pub use eval::{eval, ExecError, Flow};
pub use global::State;
