//! Blocking execution of external programs with argument vectors.
//!
//! Arguments are passed straight to the program; no shell is involved, so
//! names, emails and paths need no quoting.

use std::ffi::OsStr;
use std::process::{Command, Output, Stdio};

use crate::error::{GitusrError, Result};

/// Captured result of one program run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutput {
    /// Exit code, `None` when terminated by a signal.
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }

    /// Turn a non-zero exit into [`GitusrError::ExternalTool`].
    pub fn check(self, program: &str) -> Result<Self> {
        if self.success() {
            return Ok(self);
        }
        let detail = self.stderr.trim();
        let message = match (self.code, detail.is_empty()) {
            (Some(code), true) => format!("exited with status {code}"),
            (Some(code), false) => format!("exited with status {code}: {detail}"),
            (None, _) => "terminated by signal".to_string(),
        };
        Err(GitusrError::external(program, message))
    }
}

impl From<Output> for CommandOutput {
    fn from(output: Output) -> Self {
        Self {
            code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        }
    }
}

/// Run `program` with `args`, capturing both streams. A non-zero exit is
/// not an error here; callers decide which codes they accept.
///
/// # Errors
///
/// Returns [`GitusrError::ExternalTool`] if the program cannot be started.
pub fn run<I, S>(program: &str, args: I) -> Result<CommandOutput>
where
    I: IntoIterator<Item = S>,
    S: AsRef<OsStr>,
{
    let output = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .output()
        .map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => GitusrError::external(program, "not installed"),
            _ => GitusrError::external(program, format!("failed to start: {e}")),
        })?;
    let output = CommandOutput::from(output);
    log::trace!("{program} exited with {:?}", output.code);
    Ok(output)
}

/// Run and require exit status 0.
pub fn run_checked<I, S>(program: &str, args: I) -> Result<CommandOutput>
where
    I: IntoIterator<Item = S>,
    S: AsRef<OsStr>,
{
    run(program, args)?.check(program)
}
