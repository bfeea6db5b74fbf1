use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::debug;

use super::ModelInvoker;
use crate::config::LlmConfig;
use crate::error::InvocationError;

/// Runs `<program> <args...> <prompt>` once per prompt and returns stdout.
///
/// With the default config this is `ollama run <model> <prompt>`. The child
/// is killed if the invocation is dropped, so a timeout or shutdown never
/// leaves a model process behind.
pub struct CommandInvoker {
    program: String,
    args: Vec<String>,
    timeout: Duration,
}

impl CommandInvoker {
    pub fn new(program: impl Into<String>, args: Vec<String>, timeout: Duration) -> Self {
        Self {
            program: program.into(),
            args,
            timeout,
        }
    }

    pub fn from_config(config: &LlmConfig) -> Self {
        let mut args = config.args.clone();
        args.push(config.model.clone());
        Self::new(config.command.clone(), args, config.timeout())
    }
}

#[async_trait]
impl ModelInvoker for CommandInvoker {
    async fn invoke(&self, prompt: &str) -> Result<String, InvocationError> {
        let mut command = Command::new(&self.program);
        command
            .args(&self.args)
            .arg(prompt)
            .stdin(Stdio::null())
            .kill_on_drop(true);

        debug!("Running model: {} {:?}", self.program, self.args);

        let output = match tokio::time::timeout(self.timeout, command.output()).await {
            Ok(result) => result.map_err(|source| InvocationError::Spawn {
                program: self.program.clone(),
                source,
            })?,
            Err(_) => return Err(InvocationError::Timeout(self.timeout)),
        };

        if !output.status.success() {
            return Err(InvocationError::Exit {
                code: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        let reply = String::from_utf8_lossy(&output.stdout).trim().to_string();
        if reply.is_empty() {
            return Err(InvocationError::EmptyOutput);
        }
        Ok(reply)
    }
}
