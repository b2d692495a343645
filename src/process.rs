//! Running the util-linux tools that describe the system.
//!
//! The decision engine never runs tools itself. The probe collaborator uses
//! [`Cmd`] to run `findmnt` and `lsblk` and hands their captured output to
//! the parsers.

use anyhow::{bail, Context, Result};
use std::process::{Command, ExitStatus};

/// Captured result of a finished tool.
#[derive(Debug, Clone)]
pub struct ToolOutput {
    pub status: ExitStatus,
    pub stdout: String,
    pub stderr: String,
}

impl ToolOutput {
    pub fn success(&self) -> bool {
        self.status.success()
    }

    /// Exit code, or -1 if terminated by a signal.
    pub fn code(&self) -> i32 {
        self.status.code().unwrap_or(-1)
    }

    pub fn stderr_trimmed(&self) -> &str {
        self.stderr.trim()
    }

    /// Nothing on stdout. findmnt reports "no matches" this way.
    pub fn is_empty(&self) -> bool {
        self.stdout.trim().is_empty()
    }
}

/// Tool invocation builder.
pub struct Cmd {
    program: String,
    args: Vec<String>,
    /// Non-zero exit codes that still count as a valid answer.
    tolerated: Vec<i32>,
    context: Option<String>,
}

impl Cmd {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            tolerated: Vec::new(),
            context: None,
        }
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Accept `code` as a valid exit status.
    pub fn tolerate_exit(mut self, code: i32) -> Self {
        self.tolerated.push(code);
        self
    }

    /// What the command was for, used as the error message.
    pub fn context(mut self, what: impl Into<String>) -> Self {
        self.context = Some(what.into());
        self
    }

    pub fn run(self) -> Result<ToolOutput> {
        log::debug!("Running {} {}", self.program, self.args.join(" "));

        // Column names and JSON keys must not be localized.
        let output = Command::new(&self.program)
            .args(&self.args)
            .env("LC_ALL", "C")
            .output()
            .with_context(|| format!("Failed to execute '{}'. Is it installed?", self.program))?;

        let result = ToolOutput {
            status: output.status,
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        };

        if result.success() || self.tolerated.contains(&result.code()) {
            return Ok(result);
        }

        let what = self
            .context
            .unwrap_or_else(|| format!("'{}' failed", self.program));
        match result.stderr_trimmed() {
            "" => bail!("{} (exit code {})", what, result.code()),
            stderr => bail!("{} (exit code {}):\n{}", what, result.code(), stderr),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_captures_stdout() {
        let result = Cmd::new("echo").args(["[]"]).run().unwrap();
        assert!(result.success());
        assert_eq!(result.stdout.trim(), "[]");
        assert!(!result.is_empty());
    }

    #[test]
    fn test_failure_carries_context_and_stderr() {
        let err = Cmd::new("ls")
            .args(["/nonexistent_path_12345"])
            .context("lsblk failed to list block devices")
            .run()
            .unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("lsblk failed to list block devices"));
        assert!(msg.contains("exit code"));
    }

    #[test]
    fn test_tolerated_exit() {
        let result = Cmd::new("false").tolerate_exit(1).run().unwrap();
        assert!(!result.success());
        assert_eq!(result.code(), 1);
        assert!(result.is_empty());
    }

    #[test]
    fn test_other_exit_still_fails() {
        assert!(Cmd::new("false").tolerate_exit(2).run().is_err());
    }

    #[test]
    fn test_missing_program() {
        let err = Cmd::new("nonexistent_program_12345").run().unwrap_err();
        assert!(err.to_string().contains("Is it installed?"));
    }
}
