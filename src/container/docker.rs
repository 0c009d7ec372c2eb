//! Container engine driven through the `docker` (or compatible) CLI.

use std::process::Output;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::debug;

use crate::container::{ContainerEngine, RunSpec};
use crate::error::ForgeError;

/// Engine backed by a Docker-compatible command line (`docker`, `podman`).
#[derive(Debug, Clone)]
pub struct DockerCli {
    binary: String,
}

impl DockerCli {
    pub fn new(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
        }
    }

    /// Arguments for `create`: no network, bind mounts, optional user, then image and argv.
    pub fn create_args(spec: &RunSpec) -> Vec<String> {
        let mut args = vec![
            "create".to_string(),
            "--network".to_string(),
            "none".to_string(),
        ];
        if let Some(user) = &spec.user {
            args.push("--user".to_string());
            args.push(user.clone());
        }
        for mount in &spec.mounts {
            args.push("-v".to_string());
            args.push(format!(
                "{}:{}:{}",
                mount.host.display(),
                mount.container,
                mount.mode.as_str()
            ));
        }
        args.push(spec.image.clone());
        args.extend(spec.argv.iter().cloned());
        args
    }

    async fn invoke(&self, args: &[String]) -> Result<Output, ForgeError> {
        debug!(binary = %self.binary, ?args, "Invoking container engine");
        let output = Command::new(&self.binary)
            .args(args)
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| {
                ForgeError::Io(format!("Failed to launch {}: {}", self.binary, e))
            })?;
        Ok(output)
    }

    async fn invoke_checked(&self, args: &[String]) -> Result<String, ForgeError> {
        let output = self.invoke(args).await?;
        if !output.status.success() {
            let verb = args.first().map(String::as_str).unwrap_or("");
            return Err(ForgeError::Io(format!(
                "{} {} failed: {}",
                self.binary,
                verb,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }
}

#[async_trait]
impl ContainerEngine for DockerCli {
    async fn create(&self, spec: &RunSpec) -> Result<String, ForgeError> {
        let id = self.invoke_checked(&Self::create_args(spec)).await?;
        if id.is_empty() {
            return Err(ForgeError::Io(format!(
                "{} create returned no container id",
                self.binary
            )));
        }
        Ok(id)
    }

    async fn start(&self, id: &str) -> Result<(), ForgeError> {
        self.invoke_checked(&["start".to_string(), id.to_string()])
            .await
            .map(|_| ())
    }

    async fn wait(&self, id: &str) -> Result<i64, ForgeError> {
        let out = self
            .invoke_checked(&["wait".to_string(), id.to_string()])
            .await?;
        out.lines()
            .last()
            .and_then(|l| l.trim().parse::<i64>().ok())
            .ok_or_else(|| ForgeError::Io(format!("Unexpected wait output: {:?}", out)))
    }

    async fn logs(&self, id: &str) -> Result<(String, String), ForgeError> {
        let output = self.invoke(&["logs".to_string(), id.to_string()]).await?;
        Ok((
            String::from_utf8_lossy(&output.stdout).into_owned(),
            String::from_utf8_lossy(&output.stderr).into_owned(),
        ))
    }

    async fn remove(&self, id: &str) -> Result<(), ForgeError> {
        self.invoke_checked(&["rm".to_string(), "-f".to_string(), id.to_string()])
            .await
            .map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::container::Mount;
    use std::time::Duration;

    #[test]
    fn test_create_args_layout() {
        let spec = RunSpec {
            image: "cadforge/cadquery-runtime:latest".into(),
            argv: vec!["python3".into(), "/out/script.py".into()],
            mounts: vec![
                Mount::ro("/tmp/t/scripts", "/out"),
                Mount::rw("/tmp/t/output", "/output"),
            ],
            timeout: Duration::from_secs(30),
            user: Some("1000:1000".into()),
        };
        assert_eq!(
            DockerCli::create_args(&spec),
            vec![
                "create",
                "--network",
                "none",
                "--user",
                "1000:1000",
                "-v",
                "/tmp/t/scripts:/out:ro",
                "-v",
                "/tmp/t/output:/output:rw",
                "cadforge/cadquery-runtime:latest",
                "python3",
                "/out/script.py",
            ]
        );
    }

    #[tokio::test]
    async fn test_missing_binary_is_io_error() {
        let cli = DockerCli::new("cadforge-no-such-engine");
        let err = cli.start("abc").await.unwrap_err();
        assert_eq!(err.label(), "IO_ERROR");
    }
}
