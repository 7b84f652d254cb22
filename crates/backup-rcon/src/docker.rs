use std::path::PathBuf;
use std::process::Output;

use async_trait::async_trait;
use tokio::process::Command;

use crate::remote::{RemoteControl, RemoteError, RemoteTarget};

/// Reaches servers through `docker exec <container> rcon-cli <command>`.
#[derive(Debug, Clone)]
pub struct DockerExec {
    docker_bin: PathBuf,
    rcon_cli: String,
}

impl DockerExec {
    pub fn new(docker_bin: impl Into<PathBuf>, rcon_cli: impl Into<String>) -> Self {
        Self {
            docker_bin: docker_bin.into(),
            rcon_cli: rcon_cli.into(),
        }
    }

    pub fn docker_bin(&self) -> &PathBuf {
        &self.docker_bin
    }

    async fn docker(&self, args: &[&str]) -> Result<Output, RemoteError> {
        Command::new(&self.docker_bin)
            .args(args)
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|source| RemoteError::Spawn {
                program: self.docker_bin.display().to_string(),
                source,
            })
    }
}

#[async_trait]
impl RemoteControl for DockerExec {
    async fn send(&self, target: &RemoteTarget, command: &str) -> Result<String, RemoteError> {
        let mut args = vec!["exec", target.container.as_str(), self.rcon_cli.as_str()];
        args.extend(command.split_whitespace());

        let output = self.docker(&args).await?;
        let text = combined_output(&output);
        if !output.status.success() {
            return Err(RemoteError::CommandFailed {
                command: command.to_string(),
                output: text,
            });
        }
        Ok(text)
    }

    async fn is_running(&self, target: &RemoteTarget) -> Result<bool, RemoteError> {
        let output = self
            .docker(&["ps", "--filter", "status=running", "--format", "{{.Names}}"])
            .await?;
        if !output.status.success() {
            return Err(RemoteError::CommandFailed {
                command: "docker ps".to_string(),
                output: combined_output(&output),
            });
        }
        let stdout = String::from_utf8_lossy(&output.stdout);
        Ok(container_listed(&stdout, &target.container))
    }
}

fn combined_output(output: &Output) -> String {
    let mut text = String::from_utf8_lossy(&output.stdout).into_owned();
    text.push_str(&String::from_utf8_lossy(&output.stderr));
    text.trim_end().to_string()
}

fn container_listed(ps_output: &str, container: &str) -> bool {
    ps_output
        .lines()
        .map(|line| line.trim().trim_matches('\''))
        .any(|name| name == container)
}
