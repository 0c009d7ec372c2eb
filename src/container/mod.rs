//! One-shot sandboxed container runs.
//!
//! [`ContainerBridge`] drives the create/start/wait/remove lifecycle over any
//! [`ContainerEngine`]; callers depend on the [`ContainerRunner`] seam so
//! tests can substitute a scripted runner.

pub mod docker;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::Serialize;
use tracing::{debug, info, instrument, warn};

use crate::error::ForgeError;

pub use docker::DockerCli;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MountMode {
    Ro,
    Rw,
}

impl MountMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            MountMode::Ro => "ro",
            MountMode::Rw => "rw",
        }
    }
}

/// Host directory bound into the container.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Mount {
    pub host: PathBuf,
    pub container: String,
    pub mode: MountMode,
}

impl Mount {
    pub fn ro(host: impl Into<PathBuf>, container: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            container: container.into(),
            mode: MountMode::Ro,
        }
    }

    pub fn rw(host: impl Into<PathBuf>, container: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            container: container.into(),
            mode: MountMode::Rw,
        }
    }
}

/// Everything one container invocation needs.
#[derive(Debug, Clone)]
pub struct RunSpec {
    pub image: String,
    pub argv: Vec<String>,
    pub mounts: Vec<Mount>,
    pub timeout: Duration,
    /// `uid:gid` the process runs as, so files it writes stay readable on the host
    pub user: Option<String>,
}

/// Captured result of a container that exited zero.
#[derive(Debug, Clone)]
pub struct RunOutput {
    pub exit_code: i64,
    pub stdout: String,
    pub stderr: String,
    pub elapsed: Duration,
}

/// Primitive operations of a container engine.
#[async_trait]
pub trait ContainerEngine: Send + Sync {
    /// Create a detached container and return its id.
    async fn create(&self, spec: &RunSpec) -> Result<String, ForgeError>;
    async fn start(&self, id: &str) -> Result<(), ForgeError>;
    /// Block until the container exits and return its exit code.
    async fn wait(&self, id: &str) -> Result<i64, ForgeError>;
    /// Return `(stdout, stderr)` of the container.
    async fn logs(&self, id: &str) -> Result<(String, String), ForgeError>;
    /// Force-remove the container, killing it if still running.
    async fn remove(&self, id: &str) -> Result<(), ForgeError>;
}

#[async_trait]
impl<T: ContainerEngine + ?Sized> ContainerEngine for Arc<T> {
    async fn create(&self, spec: &RunSpec) -> Result<String, ForgeError> {
        (**self).create(spec).await
    }
    async fn start(&self, id: &str) -> Result<(), ForgeError> {
        (**self).start(id).await
    }
    async fn wait(&self, id: &str) -> Result<i64, ForgeError> {
        (**self).wait(id).await
    }
    async fn logs(&self, id: &str) -> Result<(String, String), ForgeError> {
        (**self).logs(id).await
    }
    async fn remove(&self, id: &str) -> Result<(), ForgeError> {
        (**self).remove(id).await
    }
}

/// Seam used by the converter and the code executor.
#[async_trait]
pub trait ContainerRunner: Send + Sync {
    async fn run(&self, spec: RunSpec) -> Result<RunOutput, ForgeError>;
}

/// Lifecycle driver: the container is removed on every exit path,
/// including a caller dropping the run future.
pub struct ContainerBridge<E> {
    engine: Arc<E>,
}

/// Removes the container from a background task if the run is abandoned
/// before it could remove it itself.
struct RemoveOnDrop<E: ContainerEngine + 'static> {
    engine: Arc<E>,
    id: Option<String>,
}

impl<E: ContainerEngine + 'static> RemoveOnDrop<E> {
    fn disarm(mut self) {
        self.id = None;
    }
}

impl<E: ContainerEngine + 'static> Drop for RemoveOnDrop<E> {
    fn drop(&mut self) {
        let Some(id) = self.id.take() else {
            return;
        };
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            warn!(container = %id, "No runtime left to remove abandoned container");
            return;
        };
        let engine = Arc::clone(&self.engine);
        handle.spawn(async move {
            match engine.remove(&id).await {
                Ok(()) => info!(container = %id, "Removed container of cancelled run"),
                Err(e) => warn!(container = %id, "Failed to remove container: {}", e),
            }
        });
    }
}

impl<E: ContainerEngine + 'static> ContainerBridge<E> {
    pub fn new(engine: E) -> Self {
        Self {
            engine: Arc::new(engine),
        }
    }

    async fn drive(&self, id: &str, spec: &RunSpec) -> Result<RunOutput, ForgeError> {
        let started = Instant::now();
        self.engine.start(id).await?;

        let exit_code = match tokio::time::timeout(spec.timeout, self.engine.wait(id)).await {
            Ok(code) => code?,
            Err(_) => {
                return Err(ForgeError::TimeoutExceeded {
                    seconds: spec.timeout.as_secs(),
                })
            }
        };
        let elapsed = started.elapsed();
        // Finishing exactly at the deadline does not count as success
        if elapsed >= spec.timeout {
            return Err(ForgeError::TimeoutExceeded {
                seconds: spec.timeout.as_secs(),
            });
        }

        let (stdout, stderr) = self.engine.logs(id).await?;
        if exit_code != 0 {
            return Err(ForgeError::ContainerFailure {
                exit_code,
                stdout,
                stderr,
            });
        }

        Ok(RunOutput {
            exit_code,
            stdout,
            stderr,
            elapsed,
        })
    }
}

#[async_trait]
impl<E: ContainerEngine + 'static> ContainerRunner for ContainerBridge<E> {
    #[instrument(name = "container.run", skip_all, fields(image = %spec.image))]
    async fn run(&self, spec: RunSpec) -> Result<RunOutput, ForgeError> {
        let id = self.engine.create(&spec).await?;
        debug!(container = %id, argv = ?spec.argv, "Container created");

        let guard = RemoveOnDrop {
            engine: Arc::clone(&self.engine),
            id: Some(id.clone()),
        };
        let result = self.drive(&id, &spec).await;
        guard.disarm();

        if let Err(e) = self.engine.remove(&id).await {
            warn!(container = %id, "Failed to remove container: {}", e);
        }

        match &result {
            Ok(output) => info!(
                container = %id,
                elapsed_ms = output.elapsed.as_millis() as u64,
                "Container finished"
            ),
            Err(e) => warn!(container = %id, error = %e, "Container run failed"),
        }
        result
    }
}

/// `uid:gid` owning `path`, used to map container writes back to the caller.
#[cfg(unix)]
pub fn owner_of(path: &Path) -> Option<String> {
    use std::os::unix::fs::MetadataExt;
    std::fs::metadata(path)
        .ok()
        .map(|m| format!("{}:{}", m.uid(), m.gid()))
}

#[cfg(not(unix))]
pub fn owner_of(_path: &Path) -> Option<String> {
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    /// Records every primitive call; `wait` sleeps then returns `exit_code`.
    struct ScriptedEngine {
        exit_code: i64,
        wait_for: Duration,
        calls: Mutex<Vec<String>>,
    }

    impl ScriptedEngine {
        fn new(exit_code: i64, wait_for: Duration) -> Self {
            Self {
                exit_code,
                wait_for,
                calls: Mutex::new(Vec::new()),
            }
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }

        fn record(&self, call: &str) {
            self.calls.lock().unwrap().push(call.to_string());
        }
    }

    #[async_trait]
    impl ContainerEngine for ScriptedEngine {
        async fn create(&self, _spec: &RunSpec) -> Result<String, ForgeError> {
            self.record("create");
            Ok("c1".into())
        }
        async fn start(&self, _id: &str) -> Result<(), ForgeError> {
            self.record("start");
            Ok(())
        }
        async fn wait(&self, _id: &str) -> Result<i64, ForgeError> {
            self.record("wait");
            tokio::time::sleep(self.wait_for).await;
            Ok(self.exit_code)
        }
        async fn logs(&self, _id: &str) -> Result<(String, String), ForgeError> {
            self.record("logs");
            Ok(("out".into(), "NameError: boom".into()))
        }
        async fn remove(&self, _id: &str) -> Result<(), ForgeError> {
            self.record("remove");
            Ok(())
        }
    }

    fn spec(timeout: Duration) -> RunSpec {
        RunSpec {
            image: "runtime".into(),
            argv: vec!["python3".into(), "/out/script.py".into()],
            mounts: vec![],
            timeout,
            user: None,
        }
    }

    #[tokio::test]
    async fn test_success_removes_container() {
        let engine = Arc::new(ScriptedEngine::new(0, Duration::ZERO));
        let bridge = ContainerBridge::new(Arc::clone(&engine));
        let output = bridge.run(spec(Duration::from_secs(5))).await.unwrap();
        assert_eq!(output.exit_code, 0);
        assert_eq!(engine.calls().last().map(String::as_str), Some("remove"));
    }

    #[tokio::test]
    async fn test_nonzero_exit_is_container_failure() {
        let engine = Arc::new(ScriptedEngine::new(1, Duration::ZERO));
        let bridge = ContainerBridge::new(Arc::clone(&engine));
        let err = bridge.run(spec(Duration::from_secs(5))).await.unwrap_err();
        match err {
            ForgeError::ContainerFailure {
                exit_code, stderr, ..
            } => {
                assert_eq!(exit_code, 1);
                assert_eq!(stderr, "NameError: boom");
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(engine.calls().contains(&"remove".to_string()));
    }

    #[tokio::test]
    async fn test_timeout_still_removes_container() {
        let engine = Arc::new(ScriptedEngine::new(0, Duration::from_secs(10)));
        let bridge = ContainerBridge::new(Arc::clone(&engine));
        let err = bridge
            .run(spec(Duration::from_millis(20)))
            .await
            .unwrap_err();
        assert_eq!(err.label(), "TIMEOUT_EXCEEDED");
        assert_eq!(engine.calls().last().map(String::as_str), Some("remove"));
    }

    #[tokio::test]
    async fn test_cancelled_run_removes_container() {
        let engine = Arc::new(ScriptedEngine::new(0, Duration::from_secs(10)));
        let bridge = ContainerBridge::new(Arc::clone(&engine));
        let cancelled = tokio::time::timeout(
            Duration::from_millis(50),
            bridge.run(spec(Duration::from_secs(30))),
        )
        .await;
        assert!(cancelled.is_err());

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(engine.calls().last().map(String::as_str), Some("remove"));
    }

    #[tokio::test]
    async fn test_exit_at_deadline_is_timeout() {
        let deadline = Duration::from_millis(30);
        let engine = Arc::new(ScriptedEngine::new(0, deadline));
        let bridge = ContainerBridge::new(Arc::clone(&engine));
        let err = bridge.run(spec(deadline)).await.unwrap_err();
        assert_eq!(err.label(), "TIMEOUT_EXCEEDED");
    }

    #[cfg(unix)]
    #[test]
    fn test_owner_of_existing_dir() {
        let dir = tempfile::tempdir().unwrap();
        let owner = owner_of(dir.path()).unwrap();
        assert!(owner.contains(':'));
    }
}
