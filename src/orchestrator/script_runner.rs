use super::{GenerationCall, JsonTransport};
use crate::models::ScriptCommands;
use crate::workflow::GenerationError;
use async_trait::async_trait;
use std::path::PathBuf;
use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::Command;
use tracing::debug;

/// Generator that runs one external command per generation call
///
/// The serialized `GenerationInput` is piped to stdin; stdout must be the
/// JSON result body.
pub struct ScriptGenerator {
    commands: ScriptCommands,
    working_dir: Option<PathBuf>,
}

impl ScriptGenerator {
    pub fn new(commands: ScriptCommands) -> Self {
        Self {
            commands,
            working_dir: None,
        }
    }

    /// Run commands from `dir` instead of the current directory
    pub fn with_working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    /// Internal: Run a CLI command
    async fn run_command(
        &self,
        call: GenerationCall,
        argv: &[String],
        request: &str,
    ) -> Result<String, GenerationError> {
        let Some((program, args)) = argv.split_first() else {
            return Err(GenerationError::NotConfigured { call });
        };
        let remote = |message: String| GenerationError::Remote { call, message };

        let mut cmd = Command::new(program);
        cmd.args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = &self.working_dir {
            cmd.current_dir(dir);
        }

        let mut child = cmd.spawn().map_err(|e| {
            remote(format!(
                "Command '{}' not found. Please ensure it is installed and in your PATH ({})",
                program, e
            ))
        })?;

        // Write request to stdin
        if let Some(mut stdin) = child.stdin.take() {
            stdin
                .write_all(request.as_bytes())
                .await
                .map_err(|e| remote(format!("Failed to write to stdin: {}", e)))?;
            stdin
                .flush()
                .await
                .map_err(|e| remote(format!("Failed to flush stdin: {}", e)))?;
            drop(stdin);
        }

        // Stream stdout and stderr concurrently to avoid backpressure deadlock
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| remote("Failed to capture stdout".to_string()))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| remote("Failed to capture stderr".to_string()))?;

        let mut stdout_reader = BufReader::new(stdout).lines();
        let mut stderr_reader = BufReader::new(stderr).lines();

        let mut output = String::new();
        let mut stderr_output = String::new();
        let mut stdout_done = false;
        let mut stderr_done = false;

        while !stdout_done || !stderr_done {
            tokio::select! {
                line = stdout_reader.next_line(), if !stdout_done => {
                    match line {
                        Ok(Some(line)) => {
                            output.push_str(&line);
                            output.push('\n');
                        }
                        Ok(None) => stdout_done = true,
                        Err(e) => return Err(remote(format!("Failed to read stdout: {}", e))),
                    }
                }
                line = stderr_reader.next_line(), if !stderr_done => {
                    match line {
                        Ok(Some(line)) => {
                            debug!(%call, "{}", line);
                            stderr_output.push_str(&line);
                            stderr_output.push('\n');
                        }
                        Ok(None) => stderr_done = true,
                        Err(e) => return Err(remote(format!("Failed to read stderr: {}", e))),
                    }
                }
            }
        }

        let status = child
            .wait()
            .await
            .map_err(|e| remote(format!("Failed to wait for '{}': {}", program, e)))?;

        if !status.success() {
            return Err(remote(format!(
                "Command '{}' failed with exit code {:?}\nStderr: {}",
                program,
                status.code(),
                stderr_output.trim_end()
            )));
        }

        Ok(output)
    }
}

#[async_trait]
impl JsonTransport for ScriptGenerator {
    async fn exchange(&self, call: GenerationCall, request: String) -> Result<String, GenerationError> {
        let argv = self.commands.argv(call);
        debug!(%call, command = ?argv, "running generation script");
        self.run_command(call, argv, &request).await
    }
}
