//! Tunnel Supervisor (C4): maintains one active SOCKS5 endpoint on a
//! loopback port, backed by an SSH `-D` dynamic port forward, so the
//! browser driver pool can route traffic through it.

mod config;

use std::time::Duration;

use scout_core::{ProxyEndpoint, ProxyStatus, ScoutError};
use tokio::net::TcpStream;
use tokio::process::{Child, Command};
use tracing::{info, warn};

pub struct TunnelSupervisor {
    entries: Vec<ProxyEndpoint>,
    current_idx: Option<usize>,
    current_child: Option<Child>,
    establish_timeout: Duration,
    probe_timeout: Duration,
}

impl TunnelSupervisor {
    pub fn load(config_path: &str, establish_timeout: Duration, probe_timeout: Duration) -> Result<Self, ScoutError> {
        let entries = config::load(config_path)?;
        if entries.is_empty() {
            return Err(ScoutError::Config(format!(
                "tunnel config {config_path} defines no entries"
            )));
        }
        Ok(Self {
            entries,
            current_idx: None,
            current_child: None,
            establish_timeout,
            probe_timeout,
        })
    }

    /// Spawn the SSH dynamic port forward for `name` and poll the loopback
    /// port until it accepts TCP connections (up to `establish_timeout`)
    /// or declare the attempt failed.
    pub async fn establish(&mut self, name: &str) -> Result<(), ScoutError> {
        let idx = self
            .entries
            .iter()
            .position(|e| e.name == name)
            .ok_or_else(|| ScoutError::Config(format!("unknown tunnel {name}")))?;

        self.kill_current();

        let entry = &self.entries[idx];
        info!(tunnel = %entry.name, port = entry.local_loopback_port, "establishing tunnel");

        let child = Command::new("ssh")
            .arg("-N")
            .arg("-D")
            .arg(entry.local_loopback_port.to_string())
            .arg("-i")
            .arg(&entry.ssh_key_path)
            .arg("-p")
            .arg(entry.ssh_port.to_string())
            .arg("-o")
            .arg("StrictHostKeyChecking=no")
            .arg(format!("{}@{}", entry.ssh_user, entry.remote_ssh_host))
            .kill_on_drop(true)
            .stdin(std::process::Stdio::null())
            .stdout(std::process::Stdio::null())
            .stderr(std::process::Stdio::null())
            .spawn()
            .map_err(|e| ScoutError::Proxy(format!("spawning ssh for {name}: {e}")))?;

        self.current_child = Some(child);
        self.entries[idx].status = ProxyStatus::Connecting;

        let port = entry.local_loopback_port;
        if wait_for_port(port, self.establish_timeout).await {
            self.entries[idx].status = ProxyStatus::Up;
            self.current_idx = Some(idx);
            info!(tunnel = %name, "tunnel established");
            Ok(())
        } else {
            self.entries[idx].status = ProxyStatus::Failed;
            self.kill_current();
            warn!(tunnel = %name, "tunnel failed to come up within timeout");
            Err(ScoutError::Proxy(format!("{name} did not come up within {:?}", self.establish_timeout)))
        }
    }

    /// The in-use endpoint, if its loopback port still answers within
    /// `probe_timeout`. A failed probe flips its status to `Failed` so
    /// the caller can decide whether to rotate.
    pub async fn current(&mut self) -> Option<ProxyEndpoint> {
        let idx = self.current_idx?;
        if wait_for_port(self.entries[idx].local_loopback_port, self.probe_timeout).await {
            self.entries[idx].status = ProxyStatus::Up;
            Some(self.entries[idx].clone())
        } else {
            self.entries[idx].status = ProxyStatus::Failed;
            None
        }
    }

    /// Close the current tunnel and establish the next one in round-robin
    /// order. If every other entry also fails, the supervisor ends up with
    /// no current tunnel and the caller decides whether to proceed direct.
    pub async fn rotate(&mut self) -> Result<(), ScoutError> {
        let start = self.current_idx.unwrap_or(0);
        self.kill_current();
        self.current_idx = None;

        for step in 1..=self.entries.len() {
            let idx = (start + step) % self.entries.len();
            let name = self.entries[idx].name.clone();
            match self.establish(&name).await {
                Ok(()) => return Ok(()),
                Err(e) => warn!(tunnel = %name, error = %e, "rotation candidate failed, trying next"),
            }
        }

        Err(ScoutError::Proxy("no proxy available after rotating through all tunnels".into()))
    }

    /// Configured tunnel names, in the deterministic order `load` returns.
    pub fn entry_names(&self) -> Vec<String> {
        self.entries.iter().map(|e| e.name.clone()).collect()
    }

    /// Tear down the current child process. Idempotent.
    pub fn close_all(&mut self) {
        self.kill_current();
        self.current_idx = None;
    }

    fn kill_current(&mut self) {
        if let Some(mut child) = self.current_child.take() {
            let _ = child.start_kill();
        }
    }
}

impl Drop for TunnelSupervisor {
    fn drop(&mut self) {
        self.kill_current();
    }
}

async fn wait_for_port(port: u16, timeout: Duration) -> bool {
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        if TcpStream::connect(("127.0.0.1", port)).await.is_ok() {
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(200)).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn wait_for_port_detects_listener() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            loop {
                if listener.accept().await.is_err() {
                    break;
                }
            }
        });
        assert!(wait_for_port(port, Duration::from_secs(2)).await);
    }

    #[tokio::test]
    async fn wait_for_port_times_out_on_closed_port() {
        // Port 1 is privileged/unassigned in test sandboxes and should
        // refuse connections promptly.
        assert!(!wait_for_port(1, Duration::from_millis(300)).await);
    }
}
