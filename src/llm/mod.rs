mod command;
mod http;

pub use command::CommandInvoker;
pub use http::HttpInvoker;

use anyhow::Result;
use async_trait::async_trait;

use crate::config::{LlmConfig, LlmProvider};
use crate::error::InvocationError;

/// Turns a prompt into a reply. Every call is independent: no session
/// state survives between invocations.
#[async_trait]
pub trait ModelInvoker: Send + Sync {
    async fn invoke(&self, prompt: &str) -> Result<String, InvocationError>;
}

/// Build the invoker selected by `[llm] provider`.
pub fn from_config(config: &LlmConfig) -> Result<Box<dyn ModelInvoker>> {
    Ok(match config.provider {
        LlmProvider::Command => Box::new(CommandInvoker::from_config(config)),
        LlmProvider::Http => Box::new(HttpInvoker::new(config)?),
    })
}
