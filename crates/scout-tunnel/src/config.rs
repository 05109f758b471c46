use std::collections::BTreeMap;

use scout_core::{ProxyEndpoint, ProxyStatus, ScoutError};
use serde::Deserialize;

/// On-disk shape of the tunnel config file: a JSON object mapping tunnel
/// names to endpoint records.
#[derive(Debug, Deserialize)]
struct TunnelEntryFile {
    remote_ssh_host: String,
    ssh_port: u16,
    ssh_user: String,
    local_loopback_port: u16,
    ssh_key_path: String,
}

pub fn load(path: &str) -> Result<Vec<ProxyEndpoint>, ScoutError> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| ScoutError::Config(format!("reading tunnel config {path}: {e}")))?;
    let entries: BTreeMap<String, TunnelEntryFile> = serde_json::from_str(&raw)
        .map_err(|e| ScoutError::Config(format!("parsing tunnel config {path}: {e}")))?;

    Ok(entries
        .into_iter()
        .map(|(name, e)| ProxyEndpoint {
            name,
            local_loopback_port: e.local_loopback_port,
            remote_ssh_host: e.remote_ssh_host,
            ssh_port: e.ssh_port,
            ssh_user: e.ssh_user,
            ssh_key_path: e.ssh_key_path,
            status: ProxyStatus::Down,
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn loads_and_orders_deterministically() {
        let mut file = tempfile_json(
            r#"{
                "b-tunnel": {"remote_ssh_host": "b.example.com", "ssh_port": 22, "ssh_user": "scout", "local_loopback_port": 1081, "ssh_key_path": "/keys/b"},
                "a-tunnel": {"remote_ssh_host": "a.example.com", "ssh_port": 22, "ssh_user": "scout", "local_loopback_port": 1080, "ssh_key_path": "/keys/a"}
            }"#,
        );
        let entries = load(file.path_str()).unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].name, "a-tunnel");
        assert_eq!(entries[1].name, "b-tunnel");
        file.flush_noop();
    }

    struct TempJson {
        path: std::path::PathBuf,
    }
    impl TempJson {
        fn path_str(&self) -> &str {
            self.path.to_str().unwrap()
        }
        fn flush_noop(&mut self) {}
    }
    impl Drop for TempJson {
        fn drop(&mut self) {
            let _ = std::fs::remove_file(&self.path);
        }
    }
    fn tempfile_json(contents: &str) -> TempJson {
        let path = std::env::temp_dir().join(format!(
            "scout-tunnel-test-{}.json",
            std::process::id()
        ));
        let mut f = std::fs::File::create(&path).unwrap();
        f.write_all(contents.as_bytes()).unwrap();
        TempJson { path }
    }
}
