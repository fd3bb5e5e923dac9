use crate::command::CommandError;

/// Abstraction over external CLI execution (`gcloud`, `docker`) for testability.
///
/// Production code uses [`RealExecutor`], tests use mockall-generated mocks.
#[allow(async_fn_in_trait)]
pub trait CommandExecutor: Send + Sync {
    /// Execute a command and capture stdout.
    async fn exec(&self, args: &[String]) -> Result<String, CommandError>;

    /// Execute a command, streaming output to the terminal.
    async fn exec_streaming(&self, args: &[String]) -> Result<(), CommandError>;

    /// Execute a command with data piped to stdin.
    async fn exec_with_stdin(
        &self,
        args: &[String],
        stdin_data: &[u8],
    ) -> Result<String, CommandError>;
}

/// Runs a real CLI program.
#[derive(Debug, Clone, Copy)]
pub struct RealExecutor {
    program: &'static str,
}

impl RealExecutor {
    pub const fn new(program: &'static str) -> Self {
        Self { program }
    }

    pub const fn gcloud() -> Self {
        Self::new("gcloud")
    }

    pub const fn docker() -> Self {
        Self::new("docker")
    }

    fn failed(&self, args: &[String], stderr: String) -> CommandError {
        CommandError::CommandFailed {
            program: self.program,
            args: args.to_vec(),
            stderr,
        }
    }

    fn stdout(
        &self,
        args: &[String],
        output: std::process::Output,
    ) -> Result<String, CommandError> {
        if output.status.success() {
            String::from_utf8(output.stdout).map_err(|e| CommandError::InvalidUtf8 {
                program: self.program,
                source: e,
            })
        } else {
            Err(self.failed(args, String::from_utf8_lossy(&output.stderr).to_string()))
        }
    }
}

impl CommandExecutor for RealExecutor {
    async fn exec(&self, args: &[String]) -> Result<String, CommandError> {
        use std::process::Stdio;

        tracing::debug!(program = self.program, ?args, "exec");
        let output = tokio::process::Command::new(self.program)
            .args(args)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|e| CommandError::NotFound {
                program: self.program,
                source: e,
            })?;

        self.stdout(args, output)
    }

    async fn exec_streaming(&self, args: &[String]) -> Result<(), CommandError> {
        use std::process::Stdio;

        tracing::debug!(program = self.program, ?args, "exec (streaming)");
        let status = tokio::process::Command::new(self.program)
            .args(args)
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            .status()
            .await
            .map_err(|e| CommandError::NotFound {
                program: self.program,
                source: e,
            })?;

        if status.success() {
            Ok(())
        } else {
            Err(self.failed(args, format!("exit code: {status}")))
        }
    }

    async fn exec_with_stdin(
        &self,
        args: &[String],
        stdin_data: &[u8],
    ) -> Result<String, CommandError> {
        use std::process::Stdio;
        use tokio::io::AsyncWriteExt;

        tracing::debug!(program = self.program, ?args, "exec (stdin)");
        let mut child = tokio::process::Command::new(self.program)
            .args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| CommandError::NotFound {
                program: self.program,
                source: e,
            })?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin
                .write_all(stdin_data)
                .await
                .map_err(|e| CommandError::StdinWrite {
                    program: self.program,
                    source: e,
                })?;
            stdin.shutdown().await.map_err(|e| CommandError::StdinWrite {
                program: self.program,
                source: e,
            })?;
        }

        let output = child
            .wait_with_output()
            .await
            .map_err(|e| CommandError::NotFound {
                program: self.program,
                source: e,
            })?;

        self.stdout(args, output)
    }
}

/// Owned argument list from string literals.
pub(crate) fn args<const N: usize>(a: [&str; N]) -> Vec<String> {
    a.iter().map(|s| (*s).to_owned()).collect()
}
