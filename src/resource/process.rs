use super::traits::BoxFuture;
use crate::error::ResourceError;
use std::process::Stdio;
use tokio::io::AsyncWriteExt;

/// Maximum captured output per stream in bytes (1 MB).
const MAX_OUTPUT_BYTES: usize = 1_048_576;

/// One invocation of an external control-plane tool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    pub program: String,
    pub args: Vec<String>,
    pub stdin: Option<String>,
}

impl CommandSpec {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            stdin: None,
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

    pub fn stdin(mut self, input: impl Into<String>) -> Self {
        self.stdin = Some(input.into());
        self
    }

    /// Program and arguments joined for logs and error messages.
    pub fn display(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// Process seam under `CliResourceClient`; swapped out in tests.
pub trait CommandRunner: Send + Sync {
    fn run<'a>(&'a self, spec: &'a CommandSpec) -> BoxFuture<'a, Result<CommandOutput, ResourceError>>;
}

/// Runs commands as child processes.
///
/// Children are killed when the returned future is dropped, so timeouts and
/// cancellation above this layer never leave stray processes behind.
pub struct ProcessRunner;

impl ProcessRunner {
    pub const fn new() -> Self {
        Self
    }
}

impl CommandRunner for ProcessRunner {
    fn run<'a>(&'a self, spec: &'a CommandSpec) -> BoxFuture<'a, Result<CommandOutput, ResourceError>> {
        Box::pin(async move {
            tracing::debug!(command = %spec.display(), "exec");

            let command_error = |message: String| ResourceError::Command {
                program: spec.program.clone(),
                message,
            };

            let mut cmd = tokio::process::Command::new(&spec.program);
            cmd.args(&spec.args)
                .stdout(Stdio::piped())
                .stderr(Stdio::piped())
                .stdin(if spec.stdin.is_some() {
                    Stdio::piped()
                } else {
                    Stdio::null()
                })
                .kill_on_drop(true);

            let mut child = cmd
                .spawn()
                .map_err(|e| command_error(format!("failed to spawn: {e}")))?;

            if let Some(input) = &spec.stdin
                && let Some(mut stdin) = child.stdin.take()
            {
                stdin
                    .write_all(input.as_bytes())
                    .await
                    .map_err(|e| command_error(format!("failed to write stdin: {e}")))?;
                // Dropping stdin closes the pipe so the child sees EOF.
                drop(stdin);
            }

            let output = child
                .wait_with_output()
                .await
                .map_err(|e| command_error(format!("failed to wait: {e}")))?;

            Ok(CommandOutput {
                stdout: truncate_output(String::from_utf8_lossy(&output.stdout).into_owned()),
                stderr: truncate_output(String::from_utf8_lossy(&output.stderr).into_owned()),
                exit_code: output.status.code().unwrap_or(-1),
            })
        })
    }
}

fn truncate_output(mut text: String) -> String {
    if text.len() > MAX_OUTPUT_BYTES {
        text.truncate(text.floor_char_boundary(MAX_OUTPUT_BYTES));
        text.push_str("\n... [output truncated at 1MB]");
    }
    text
}
