//! Ephemeral dev node process
//!
//! A dev foundation suite gets its own node: the configured launch command
//! is started on a free local port, probed with `system_health` until it
//! answers, and terminated when the suite completes.

use std::collections::BTreeMap;
use std::net::TcpListener;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::{Duration, Instant};

use tokio::process::{Child, Command};

use crate::common::config::LaunchConfig;
use crate::common::logging::node_log_path;
use crate::common::{Error, Result};
use crate::rpc::RpcClient;

/// Placeholder replaced with the node's port in args and endpoint URLs
pub const PORT_PLACEHOLDER: &str = "{port}";

/// Interval between readiness probes
const PROBE_INTERVAL: Duration = Duration::from_millis(250);

/// Grace period between SIGTERM and kill
const SHUTDOWN_GRACE: Duration = Duration::from_secs(3);

/// A running dev node owned by one chain context
pub struct DevNode {
    /// Node subprocess
    child: Child,
    /// Port substituted for `{port}`
    port: u16,
    /// File receiving the node's stdout and stderr
    log_path: Option<PathBuf>,
}

impl std::fmt::Debug for DevNode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DevNode")
            .field("pid", &self.child.id())
            .field("port", &self.port)
            .field("log_path", &self.log_path)
            .finish()
    }
}

/// Ask the OS for a free local TCP port
pub fn free_port() -> Result<u16> {
    let listener = TcpListener::bind("127.0.0.1:0")?;
    Ok(listener.local_addr()?.port())
}

/// Replace `{port}` in every endpoint URL
pub fn substitute_port(endpoints: &BTreeMap<String, String>, port: u16) -> BTreeMap<String, String> {
    endpoints
        .iter()
        .map(|(name, url)| {
            (
                name.clone(),
                url.replace(PORT_PLACEHOLDER, &port.to_string()),
            )
        })
        .collect()
}

/// Resolve the node command through PATH unless it already names a file
fn resolve_command(command: &Path) -> Result<PathBuf> {
    if command.is_absolute() || command.components().count() > 1 {
        return Ok(command.to_path_buf());
    }
    which::which(command).map_err(|e| {
        Error::NodeStartFailed(format!("{} not found in PATH: {}", command.display(), e))
    })
}

fn log_stdio(log_path: Option<&Path>) -> (Stdio, Stdio) {
    let file = log_path.and_then(|path| {
        if let Some(parent) = path.parent() {
            let _ = std::fs::create_dir_all(parent);
        }
        std::fs::File::create(path).ok()
    });
    match file {
        Some(file) => match file.try_clone() {
            Ok(copy) => (Stdio::from(file), Stdio::from(copy)),
            Err(_) => (Stdio::from(file), Stdio::null()),
        },
        None => (Stdio::null(), Stdio::null()),
    }
}

impl DevNode {
    /// Start the node on a free port
    ///
    /// Returns the node together with the endpoints it serves.
    pub async fn launch(
        launch: &LaunchConfig,
        endpoints: &BTreeMap<String, String>,
        suite_id: &str,
    ) -> Result<(Self, BTreeMap<String, String>)> {
        let port = free_port()?;
        let command = resolve_command(&launch.command)?;
        let args: Vec<String> = launch
            .args
            .iter()
            .map(|arg| arg.replace(PORT_PLACEHOLDER, &port.to_string()))
            .collect();

        let log_path = node_log_path(suite_id);
        let (stdout, stderr) = log_stdio(log_path.as_deref());

        tracing::info!(
            suite = %suite_id,
            command = %command.display(),
            port,
            "Launching dev node"
        );

        let child = Command::new(&command)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(stdout)
            .stderr(stderr)
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                Error::NodeStartFailed(format!("Failed to start {}: {}", command.display(), e))
            })?;

        Ok((
            Self {
                child,
                port,
                log_path,
            },
            substitute_port(endpoints, port),
        ))
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn log_path(&self) -> Option<&Path> {
        self.log_path.as_deref()
    }

    /// Probe `system_health` until the node answers
    ///
    /// Fails early when the process exits during startup.
    pub async fn wait_ready(&mut self, url: &str, startup: Duration) -> Result<()> {
        let deadline = Instant::now() + startup;
        let mut last_error = String::from("no attempt made");

        while Instant::now() < deadline {
            if let Ok(Some(status)) = self.child.try_wait() {
                return Err(Error::NodeStartFailed(format!(
                    "Node exited during startup ({}){}",
                    status,
                    self.log_hint()
                )));
            }

            match probe(url).await {
                Ok(()) => {
                    tracing::debug!(%url, "Dev node is ready");
                    return Ok(());
                }
                Err(e) => last_error = e.to_string(),
            }

            tokio::time::sleep(PROBE_INTERVAL).await;
        }

        Err(Error::NodeStartFailed(format!(
            "Node at {} did not answer within {}s: {}{}",
            url,
            startup.as_secs(),
            last_error,
            self.log_hint()
        )))
    }

    fn log_hint(&self) -> String {
        self.log_path
            .as_ref()
            .map(|p| format!(" (see {})", p.display()))
            .unwrap_or_default()
    }

    /// Check if the node process is still running
    pub fn is_running(&mut self) -> bool {
        self.child.try_wait().ok().flatten().is_none()
    }

    /// Stop the node: SIGTERM first, kill after the grace period
    pub async fn terminate(&mut self) -> Result<()> {
        if !self.is_running() {
            return Ok(());
        }

        #[cfg(unix)]
        if let Some(pid) = self.child.id() {
            // SAFETY: plain signal delivery to a child we own
            unsafe {
                libc::kill(pid as libc::pid_t, libc::SIGTERM);
            }
            if tokio::time::timeout(SHUTDOWN_GRACE, self.child.wait())
                .await
                .is_ok()
            {
                tracing::debug!(port = self.port, "Dev node stopped");
                return Ok(());
            }
        }

        // Force kill if still running
        let _ = self.child.kill().await;
        tracing::debug!(port = self.port, "Dev node killed");
        Ok(())
    }
}

async fn probe(url: &str) -> Result<()> {
    let client = RpcClient::connect(url, PROBE_INTERVAL * 4).await?;
    let result = client.request("system_health", vec![]).await.map(|_| ());
    client.close().await;
    result
}

impl Drop for DevNode {
    fn drop(&mut self) {
        // Best-effort since we can't await in drop
        let _ = self.child.start_kill();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_substitute_port() {
        let mut endpoints = BTreeMap::new();
        endpoints.insert("para".to_string(), "ws://127.0.0.1:{port}".to_string());
        endpoints.insert("relay".to_string(), "ws://relay.example".to_string());
        let resolved = substitute_port(&endpoints, 9955);
        assert_eq!(resolved["para"], "ws://127.0.0.1:9955");
        assert_eq!(resolved["relay"], "ws://relay.example");
    }

    #[test]
    fn test_free_port_is_bindable() {
        let port = free_port().unwrap();
        assert!(port > 0);
        assert!(TcpListener::bind(("127.0.0.1", port)).is_ok());
    }

    #[test]
    fn test_missing_command_is_reported() {
        let err = resolve_command(Path::new("definitely-not-a-node-binary-x9")).unwrap_err();
        assert!(matches!(err, Error::NodeStartFailed(_)));
    }

    #[tokio::test]
    async fn test_node_exiting_early_fails_startup() {
        let launch = LaunchConfig {
            command: PathBuf::from("true"),
            args: vec![],
        };
        let Ok((mut node, _)) = DevNode::launch(&launch, &BTreeMap::new(), "exit-early").await
        else {
            // `true` missing from PATH on this machine
            return;
        };
        let err = node
            .wait_ready("http://127.0.0.1:1", Duration::from_secs(5))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NodeStartFailed(_)));
    }
}
