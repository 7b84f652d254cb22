mod docker;
mod players;
mod remote;

use anyhow::{Context, Result};
use minecraft_client_rs::Client;
use std::path::Path;
use tokio::fs;
use tokio::task::spawn_blocking;

pub use docker::DockerExec;
pub use players::parse_player_count;
pub use remote::{RemoteControl, RemoteError, RemoteTarget};

pub struct RconSettings {
    pub address: String,
    pub password: String,
}

pub struct RconClient {
    address: String,
    password: String,
}

impl RconClient {
    pub fn new(address: String, password: String) -> Self {
        Self { address, password }
    }

    pub async fn execute(&self, command: &str) -> Result<String> {
        let address = self.address.clone();
        let password = self.password.clone();
        let command = command.to_string();

        spawn_blocking(move || {
            let mut client = Client::new(address)
                .map_err(|err| anyhow::anyhow!(err.to_string()))?;
            client
                .authenticate(password)
                .map_err(|err| anyhow::anyhow!(err.to_string()))?;
            let response = client
                .send_command(command)
                .map_err(|err| anyhow::anyhow!(err.to_string()))?;
            client
                .close()
                .map_err(|err| anyhow::anyhow!(err.to_string()))?;
            Ok::<_, anyhow::Error>(response.body)
        })
        .await
        .with_context(|| "RCON task failed")?
    }
}

/// Reads RCON address and password from `<server_dir>/server.properties`.
/// `Ok(None)` when the file is missing or RCON is disabled.
pub async fn load_rcon_settings(server_dir: &Path) -> Result<Option<RconSettings>> {
    let properties_path = server_dir.join("server.properties");
    let content = match fs::read_to_string(&properties_path).await {
        Ok(value) => value,
        Err(_) => return Ok(None),
    };
    parse_rcon_settings(&content)
}

fn parse_rcon_settings(content: &str) -> Result<Option<RconSettings>> {
    let mut enabled = false;
    let mut port: Option<u16> = None;
    let mut password: Option<String> = None;

    for line in content.lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        let Some((key, value)) = trimmed.split_once('=') else {
            continue;
        };
        match key.trim() {
            "enable-rcon" => enabled = value.trim().eq_ignore_ascii_case("true"),
            "rcon.port" => port = value.trim().parse::<u16>().ok(),
            "rcon.password" => {
                let val = value.trim();
                if !val.is_empty() {
                    password = Some(val.to_string());
                }
            }
            _ => {}
        }
    }

    if !enabled {
        return Ok(None);
    }

    let password = password.ok_or_else(|| anyhow::anyhow!("Missing rcon.password"))?;
    let address = format!("127.0.0.1:{}", port.unwrap_or(25575));
    Ok(Some(RconSettings { address, password }))
}

/// Talks RCON directly to servers on this host, resolving each target's
/// endpoint from its `server.properties`.
#[derive(Debug, Default, Clone)]
pub struct DirectRcon;

impl DirectRcon {
    pub fn new() -> Self {
        Self
    }

    async fn client_for(&self, target: &RemoteTarget) -> Result<RconClient, RemoteError> {
        let settings = load_rcon_settings(&target.server_dir)
            .await
            .map_err(RemoteError::Rcon)?
            .ok_or_else(|| RemoteError::NotConfigured(target.container.clone()))?;
        Ok(RconClient::new(settings.address, settings.password))
    }
}

#[async_trait::async_trait]
impl RemoteControl for DirectRcon {
    async fn send(&self, target: &RemoteTarget, command: &str) -> Result<String, RemoteError> {
        let client = self.client_for(target).await?;
        client.execute(command).await.map_err(RemoteError::Rcon)
    }

    async fn is_running(&self, target: &RemoteTarget) -> Result<bool, RemoteError> {
        let client = self.client_for(target).await?;
        // A server that accepts an RCON session is up; anything else is not.
        Ok(client.execute("list").await.is_ok())
    }
}
