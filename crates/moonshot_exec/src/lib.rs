//! # moonshot_exec
//!
//! Runs external commands for deployment hooks. Output is captured while it
//! is echoed live to the console (and optionally mirrored to a log sink), and
//! the caller's input is forwarded to the child so interactive commands keep
//! working. See [`ProcessRunner::run`].

mod command_line;
mod config;
mod console;
mod error;
mod log_sink;
mod relay;
mod result;
mod runner;
mod spec;

pub use command_line::*;
pub use config::*;
pub use console::{Console, Input, InputPipe, Output, SharedBuffer};
pub use error::*;
pub use log_sink::*;
pub use relay::StreamKind;
pub use result::*;
pub use runner::*;
pub use spec::*;
