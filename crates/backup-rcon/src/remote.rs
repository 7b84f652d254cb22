use std::path::PathBuf;

use async_trait::async_trait;
use thiserror::Error;

use crate::players::parse_player_count;

/// Everything a remote control client may need to reach one instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteTarget {
    pub container: String,
    pub server_dir: PathBuf,
}

impl RemoteTarget {
    pub fn new(container: impl Into<String>, server_dir: impl Into<PathBuf>) -> Self {
        Self {
            container: container.into(),
            server_dir: server_dir.into(),
        }
    }
}

#[derive(Debug, Error)]
pub enum RemoteError {
    #[error("failed to spawn `{program}`: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("command `{command}` failed: {output}")]
    CommandFailed { command: String, output: String },

    #[error("RCON is not configured for {0}")]
    NotConfigured(String),

    #[error("unexpected response: {0}")]
    UnexpectedResponse(String),

    #[error(transparent)]
    Rcon(anyhow::Error),
}

/// Administrative channel into a running game server.
#[async_trait]
pub trait RemoteControl: Send + Sync {
    async fn send(&self, target: &RemoteTarget, command: &str) -> Result<String, RemoteError>;

    async fn is_running(&self, target: &RemoteTarget) -> Result<bool, RemoteError>;

    async fn player_count(&self, target: &RemoteTarget) -> Result<u32, RemoteError> {
        let output = self.send(target, "list").await?;
        parse_player_count(&output)
    }

    async fn say(&self, target: &RemoteTarget, message: &str) -> Result<(), RemoteError> {
        self.send(target, &format!("say {message}")).await.map(|_| ())
    }
}
