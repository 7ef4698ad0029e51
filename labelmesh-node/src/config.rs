//! Process-level configuration loading (ambient plumbing — spec.md §1
//! calls config loading an external collaborator, but the loader itself
//! still belongs to the ambient stack). Grounded in the teacher's
//! load-or-create identity pattern in
//! `wichain-backend/src-tauri/src/main.rs`, generalized from a
//! hardcoded Tauri app-data path to an explicit TOML file.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// Startup parameters (spec.md §6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeConfig {
    /// Local listen port (TCP + UDP).
    pub port: u16,
    /// Discovery port (UDP broadcast destination). Main iff `port == dport`.
    pub dport: u16,
    /// Seconds until this node expires if silent.
    pub ttl: f64,
    /// Heartbeats per `ttl`.
    pub tpf: f64,
    /// Present iff this node publishes its own advert.
    #[serde(default)]
    pub client: Option<ClientConfig>,
    /// Port for the optional debug status endpoint.
    #[serde(default)]
    pub debug_port: Option<u16>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    pub name: String,
    pub ttp: f64,
    #[serde(default)]
    pub labels: Vec<String>,
    /// Path to a PEM-encoded PKCS#8 RSA private key. A fresh key is
    /// generated and written here if the file is absent.
    #[serde(default)]
    pub key_path: Option<PathBuf>,
}

impl NodeConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)
            .with_context(|| format!("reading config file {}", path.display()))?;
        let cfg: NodeConfig = toml::from_str(&text)
            .with_context(|| format!("parsing config file {}", path.display()))?;
        Ok(cfg)
    }

    pub fn is_main(&self) -> bool {
        self.port == self.dport
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_minimal_relay_config() {
        let toml = r#"
            port = 60000
            dport = 60000
            ttl = 30.0
            tpf = 3.0
        "#;
        let cfg: NodeConfig = toml::from_str(toml).unwrap();
        assert!(cfg.is_main());
        assert!(cfg.client.is_none());
    }

    #[test]
    fn parses_client_config() {
        let toml = r#"
            port = 60001
            dport = 60000
            ttl = 30.0
            tpf = 3.0

            [client]
            name = "alice"
            ttp = 1.0
            labels = ["weather"]
        "#;
        let cfg: NodeConfig = toml::from_str(toml).unwrap();
        assert!(!cfg.is_main());
        let client = cfg.client.unwrap();
        assert_eq!(client.name, "alice");
        assert_eq!(client.labels, vec!["weather".to_string()]);
    }
}
