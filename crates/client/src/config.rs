use std::net::SocketAddr;

use cubesync::{DEFAULT_PORT, ReplicationConfig};

#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub server_addr: SocketAddr,
    pub bind_addr: String,
    pub name: String,
    pub client_id: u64,
    pub duration_secs: Option<f64>,
    pub grab_interval_secs: f64,
    pub stats_interval_secs: f64,
    pub replication: ReplicationConfig,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            server_addr: SocketAddr::from(([127, 0, 0, 1], DEFAULT_PORT)),
            bind_addr: "0.0.0.0:0".to_string(),
            name: "player".to_string(),
            client_id: 1,
            duration_secs: None,
            grab_interval_secs: 3.0,
            stats_interval_secs: 5.0,
            replication: ReplicationConfig::default(),
        }
    }
}
