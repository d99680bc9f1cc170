//! External processing-tool boundary.
//!
//! The pipeline treats every processing tool as an opaque executable: it
//! builds an argument list, runs it, and inspects nothing but the exit
//! status and the captured stdout/stderr text.

mod command;
mod runner;

pub use command::{ToolCommand, ToolOutput};
pub use runner::{ProcessRunner, ToolRunner};
