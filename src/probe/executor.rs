//! Remote command execution over the system `ssh` client.
use async_trait::async_trait;
use std::process::Stdio;
use std::time::Duration;
use thiserror::Error;
use tokio::process::Command as TokioCommand;
use tracing::{debug, warn};

/// Exit status `ssh` reserves for its own failures (connect, auth, ...).
const SSH_TRANSPORT_FAILURE: i32 = 255;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: Option<i32>,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }

    /// stderr if there is any, otherwise stdout.
    pub fn failure_detail(&self) -> String {
        let stderr = self.stderr.trim();
        if stderr.is_empty() {
            self.stdout.trim().to_string()
        } else {
            stderr.to_string()
        }
    }
}

#[derive(Error, Debug)]
pub enum TransportError {
    #[error("Failed to start ssh: {0}")]
    Spawn(#[source] std::io::Error),
    #[error("Connection to {host} failed: {detail}")]
    Connect { host: String, detail: String },
}

/// Runs one shell command on a remote host.
///
/// `Err` means the host could not be reached; a command that ran and failed
/// is an `Ok` with a non-zero exit code.
#[async_trait]
pub trait RemoteExecutor: Send + Sync {
    async fn run(&self, host: &str, command: &str) -> Result<CommandOutput, TransportError>;
}

pub struct SshExecutor {
    username: String,
    private_key_path: String,
    connect_timeout: Duration,
}

impl SshExecutor {
    pub fn new(username: &str, private_key_path: &str, connect_timeout: Duration) -> Self {
        Self {
            username: username.to_string(),
            private_key_path: private_key_path.to_string(),
            connect_timeout,
        }
    }

    fn build_command(&self, host: &str, command: &str) -> TokioCommand {
        let connect_timeout = format!("ConnectTimeout={}", self.connect_timeout.as_secs().max(1));
        let mut cmd = TokioCommand::new("ssh");
        cmd.args([
            "-i",
            self.private_key_path.as_str(),
            "-l",
            self.username.as_str(),
            "-o",
            "BatchMode=yes",
            "-o",
            connect_timeout.as_str(),
            "-o",
            "StrictHostKeyChecking=accept-new",
            "-o",
            "ServerAliveInterval=15",
            "-o",
            "ServerAliveCountMax=3",
            "--",
            host,
            command,
        ]);
        cmd.stdin(Stdio::null());
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::piped());
        // An aborted monitor task must not leave ssh processes behind.
        cmd.kill_on_drop(true);
        cmd
    }
}

#[async_trait]
impl RemoteExecutor for SshExecutor {
    async fn run(&self, host: &str, command: &str) -> Result<CommandOutput, TransportError> {
        debug!(host = %host, command = %command, "Running remote command.");
        let output = self
            .build_command(host, command)
            .output()
            .await
            .map_err(TransportError::Spawn)?;

        let result = CommandOutput {
            stdout: String::from_utf8_lossy(&output.stdout).trim_end().to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).trim_end().to_string(),
            exit_code: output.status.code(),
        };

        match result.exit_code {
            Some(SSH_TRANSPORT_FAILURE) | None => {
                let detail = if result.stderr.is_empty() {
                    format!("ssh exited with {}", output.status)
                } else {
                    result.stderr.trim().to_string()
                };
                warn!(host = %host, error = %detail, "SSH transport failure.");
                Err(TransportError::Connect {
                    host: host.to_string(),
                    detail,
                })
            }
            Some(_) => Ok(result),
        }
    }
}

/// Single-quotes `arg` for a POSIX shell.
pub fn shell_quote(arg: &str) -> String {
    format!("'{}'", arg.replace('\'', r"'\''"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shell_quote() {
        assert_eq!(shell_quote("trainer"), "'trainer'");
        assert_eq!(shell_quote("/mnt/output"), "'/mnt/output'");
        assert_eq!(shell_quote("it's"), r"'it'\''s'");
        assert_eq!(shell_quote("$(reboot)"), "'$(reboot)'");
    }

    #[test]
    fn test_ssh_arguments() {
        let executor = SshExecutor::new("ops", "/keys/id_ed25519", Duration::from_secs(5));
        let cmd = executor.build_command("10.0.0.5", "uptime");
        let args: Vec<String> = cmd
            .as_std()
            .get_args()
            .map(|a| a.to_string_lossy().into_owned())
            .collect();

        assert_eq!(cmd.as_std().get_program(), "ssh");
        assert!(args.contains(&"ConnectTimeout=5".to_string()));
        assert!(args.contains(&"BatchMode=yes".to_string()));
        // Host and command come last, after the option terminator.
        assert_eq!(&args[args.len() - 3..], ["--", "10.0.0.5", "uptime"]);
    }

    #[test]
    fn test_failure_detail_prefers_stderr() {
        let output = CommandOutput {
            stdout: "partial".to_string(),
            stderr: "Error: No such container: trainer\n".to_string(),
            exit_code: Some(1),
        };
        assert!(!output.success());
        assert_eq!(output.failure_detail(), "Error: No such container: trainer");
    }
}
