//! In-process doubles for the two external collaborators.
use async_trait::async_trait;
use std::sync::Mutex;

use crate::notifications::Notification;
use crate::notifications::senders::{NotificationSender, SenderError};
use crate::probe::executor::{CommandOutput, RemoteExecutor, TransportError};

enum Script {
    Output(CommandOutput),
    Unreachable(String),
}

/// Answers remote commands from a prefix table. The first rule whose prefix
/// starts the command wins; unmatched commands exit with 127.
#[derive(Default)]
pub struct ScriptedExecutor {
    rules: Vec<(String, Script)>,
    commands: Mutex<Vec<String>>,
}

impl ScriptedExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reply(mut self, prefix: &str, stdout: &str) -> Self {
        self.rules.push((prefix.to_string(), Script::Output(ok(stdout))));
        self
    }

    /// Like `reply`, but takes precedence over every earlier rule.
    pub fn reply_first(mut self, prefix: &str, stdout: &str) -> Self {
        self.rules.insert(0, (prefix.to_string(), Script::Output(ok(stdout))));
        self
    }

    pub fn fail(mut self, prefix: &str, stderr: &str) -> Self {
        let output = CommandOutput {
            stdout: String::new(),
            stderr: stderr.to_string(),
            exit_code: Some(1),
        };
        self.rules.insert(0, (prefix.to_string(), Script::Output(output)));
        self
    }

    /// Every command fails at the transport level.
    pub fn unreachable(mut self, detail: &str) -> Self {
        self.rules.insert(0, (String::new(), Script::Unreachable(detail.to_string())));
        self
    }

    pub fn commands(&self) -> Vec<String> {
        self.commands.lock().unwrap().clone()
    }
}

fn ok(stdout: &str) -> CommandOutput {
    CommandOutput {
        stdout: stdout.to_string(),
        stderr: String::new(),
        exit_code: Some(0),
    }
}

#[async_trait]
impl RemoteExecutor for ScriptedExecutor {
    async fn run(&self, host: &str, command: &str) -> Result<CommandOutput, TransportError> {
        self.commands.lock().unwrap().push(command.to_string());
        match self.rules.iter().find(|(prefix, _)| command.starts_with(prefix.as_str())) {
            Some((_, Script::Output(output))) => Ok(output.clone()),
            Some((_, Script::Unreachable(detail))) => Err(TransportError::Connect {
                host: host.to_string(),
                detail: detail.clone(),
            }),
            None => Ok(CommandOutput {
                stdout: String::new(),
                stderr: format!("sh: {command}: command not found"),
                exit_code: Some(127),
            }),
        }
    }
}

/// Keeps every delivered notification.
#[derive(Default)]
pub struct RecordingSender {
    sent: Mutex<Vec<Notification>>,
    failing: bool,
}

impl RecordingSender {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing() -> Self {
        Self {
            failing: true,
            ..Self::default()
        }
    }

    pub fn sent(&self) -> Vec<Notification> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl NotificationSender for RecordingSender {
    async fn send(&self, notification: &Notification) -> Result<(), SenderError> {
        if self.failing {
            return Err(SenderError::SendFailed("chat unavailable".to_string()));
        }
        self.sent.lock().unwrap().push(notification.clone());
        Ok(())
    }
}
