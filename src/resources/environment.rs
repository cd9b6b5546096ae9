use std::collections::BTreeMap;
use std::path::Path;

use futures_util::future::BoxFuture;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Child;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use super::{EnvironmentError, SubEnvironment};
use crate::config::model::EnvironmentConfig;
use crate::platform::{self, ProcessGroupHandle};

// ---------------------------------------------------------------------------
// ProcessEnvironment
// ---------------------------------------------------------------------------

/// A sub-environment hosted in a child process group.
pub struct ProcessEnvironment {
    name: String,
    child: Child,
    pid: Option<u32>,
    group: Option<ProcessGroupHandle>,
}

impl ProcessEnvironment {
    /// Spawn the environment's command with `working_dir` as its cwd. Output
    /// is forwarded into the bridge's own log.
    pub fn spawn(
        name: &str,
        config: &EnvironmentConfig,
        working_dir: &Path,
    ) -> Result<Self, EnvironmentError> {
        let mut cmd = platform::shell_command(&config.command);
        cmd.current_dir(working_dir);
        cmd.envs(&config.env);
        cmd.stdin(std::process::Stdio::null());
        cmd.stdout(std::process::Stdio::piped());
        cmd.stderr(std::process::Stdio::piped());
        cmd.kill_on_drop(true);
        platform::configure_process_group(&mut cmd);

        let mut child = cmd.spawn().map_err(|source| EnvironmentError::Spawn {
            name: name.to_string(),
            source,
        })?;

        let pid = child.id();
        let group = platform::post_spawn_setup(pid);
        info!(environment = %name, pid = ?pid, "environment started: {}", config.command);

        if let Some(out) = child.stdout.take() {
            tokio::spawn(forward_output(name.to_string(), out, false));
        }
        if let Some(err) = child.stderr.take() {
            tokio::spawn(forward_output(name.to_string(), err, true));
        }

        Ok(Self {
            name: name.to_string(),
            child,
            pid,
            group,
        })
    }
}

async fn forward_output<R: AsyncRead + Unpin>(environment: String, stream: R, is_stderr: bool) {
    let mut reader = BufReader::new(stream);
    let mut line = String::new();
    loop {
        line.clear();
        match reader.read_line(&mut line).await {
            Ok(0) => break, // EOF
            Ok(_) => {
                let text = line.trim_end_matches(['\r', '\n']);
                if is_stderr {
                    warn!(environment = %environment, "{}", text);
                } else {
                    info!(environment = %environment, "{}", text);
                }
            }
            Err(e) => {
                warn!(environment = %environment, error = %e, "output read error");
                break;
            }
        }
    }
}

impl SubEnvironment for ProcessEnvironment {
    fn name(&self) -> &str {
        &self.name
    }

    fn stop(&mut self) -> BoxFuture<'_, Result<(), EnvironmentError>> {
        Box::pin(async move {
            platform::request_termination(&mut self.child, self.pid, self.group.as_ref()).map_err(
                |source| EnvironmentError::Signal {
                    name: self.name.clone(),
                    source,
                },
            )?;

            let status = self.child.wait().await.map_err(|e| EnvironmentError::Stop {
                name: self.name.clone(),
                reason: e.to_string(),
            })?;
            info!(environment = %self.name, %status, "environment stopped");
            Ok(())
        })
    }

    fn kill(&mut self) {
        debug!(environment = %self.name, "killing environment process group");
        platform::force_kill(&mut self.child, self.pid, self.group.as_ref());
    }
}

// ---------------------------------------------------------------------------
// EnvironmentPool
// ---------------------------------------------------------------------------

/// Live sub-environment handles, keyed by name.
#[derive(Default)]
pub struct EnvironmentPool {
    handles: Mutex<BTreeMap<String, Box<dyn SubEnvironment>>>,
}

impl EnvironmentPool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a handle, returning the one it replaced, if any.
    pub async fn insert(&self, env: Box<dyn SubEnvironment>) -> Option<Box<dyn SubEnvironment>> {
        let name = env.name().to_string();
        self.handles.lock().await.insert(name, env)
    }

    pub async fn take(&self, name: &str) -> Option<Box<dyn SubEnvironment>> {
        self.handles.lock().await.remove(name)
    }

    pub async fn names(&self) -> Vec<String> {
        self.handles.lock().await.keys().cloned().collect()
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::platform::test_commands;
    use std::time::Duration;

    fn env_config(command: &str) -> EnvironmentConfig {
        EnvironmentConfig {
            command: command.to_string(),
            env: BTreeMap::new(),
        }
    }

    #[tokio::test]
    async fn stop_acknowledges_after_sigterm() {
        let dir = tempfile::tempdir().unwrap();
        let mut env =
            ProcessEnvironment::spawn("sleeper", &env_config(test_commands::sleep_long()), dir.path())
                .unwrap();
        assert_eq!(env.name(), "sleeper");

        let result = tokio::time::timeout(Duration::from_secs(5), env.stop()).await;
        assert!(matches!(result, Ok(Ok(()))), "stop should be acknowledged");
    }

    #[tokio::test]
    async fn stubborn_environment_times_out_then_dies_on_kill() {
        let dir = tempfile::tempdir().unwrap();
        let mut env = ProcessEnvironment::spawn(
            "stubborn",
            &env_config(test_commands::ignore_term_and_sleep()),
            dir.path(),
        )
        .unwrap();
        // Give the shell a moment to install its trap.
        tokio::time::sleep(Duration::from_millis(200)).await;

        let result = tokio::time::timeout(Duration::from_millis(300), env.stop()).await;
        assert!(result.is_err(), "stop should not be acknowledged in time");

        env.kill();
        let status = tokio::time::timeout(Duration::from_secs(5), env.child.wait())
            .await
            .expect("killed environment should exit")
            .unwrap();
        assert!(!status.success());
    }

    #[tokio::test]
    async fn spawn_failure_names_environment() {
        let config = env_config("true");
        let err = ProcessEnvironment::spawn("ghost", &config, Path::new("/definitely/not/here"))
            .err()
            .expect("spawning in a missing directory should fail");
        assert!(err.to_string().contains("ghost"));
    }

    #[tokio::test]
    async fn pool_take_removes_handle() {
        let dir = tempfile::tempdir().unwrap();
        let pool = EnvironmentPool::new();
        let env =
            ProcessEnvironment::spawn("one", &env_config(test_commands::sleep_long()), dir.path())
                .unwrap();
        assert!(pool.insert(Box::new(env)).await.is_none());
        assert_eq!(pool.names().await, vec!["one".to_string()]);

        let mut taken = pool.take("one").await.unwrap();
        assert!(pool.take("one").await.is_none());
        taken.kill();
    }
}
