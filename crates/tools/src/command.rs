//! Tool invocation and its captured result.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;

/// A fully constructed external invocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolCommand {
    /// Executable path or name resolved via PATH
    pub program: PathBuf,

    /// Command arguments
    pub args: Vec<String>,

    /// Environment variables
    pub env: HashMap<String, String>,
}

impl ToolCommand {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            env: HashMap::new(),
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }
}

/// Captured result of one invocation.
#[derive(Debug, Clone)]
pub struct ToolOutput {
    /// Exit code (-1 when the process was killed by a signal)
    pub exit_code: i32,

    /// Standard output
    pub stdout: String,

    /// Standard error
    pub stderr: String,

    /// Wall-clock duration
    pub duration: std::time::Duration,
}

impl ToolOutput {
    /// Strict success: zero exit status and nothing on the error stream.
    /// Diagnostic text on stderr counts as failure even with a success exit.
    pub fn clean(&self) -> bool {
        self.exit_code == 0 && self.stderr.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_collects_args() {
        let cmd = ToolCommand::new("newstack")
            .arg("-fileinlist")
            .args(["sources.txt", "-output", "stack.st"]);
        assert_eq!(cmd.args, vec!["-fileinlist", "sources.txt", "-output", "stack.st"]);
    }

    #[test]
    fn stderr_text_spoils_a_clean_exit() {
        let output = ToolOutput {
            exit_code: 0,
            stdout: "done".into(),
            stderr: "warning: something".into(),
            duration: std::time::Duration::ZERO,
        };
        assert!(!output.clean());
    }
}
