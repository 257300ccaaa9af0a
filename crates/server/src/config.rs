use cubesync::{DEFAULT_PORT, PacketLossSimulation, ReplicationConfig};

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub bind_addr: String,
    pub name: String,
    pub loopback_clients: usize,
    pub duration_secs: Option<f64>,
    pub seed: u64,
    pub stats_interval_secs: f64,
    pub replication: ReplicationConfig,
    pub packet_loss: PacketLossSimulation,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: format!("0.0.0.0:{DEFAULT_PORT}"),
            name: "server".to_string(),
            loopback_clients: 0,
            duration_secs: None,
            seed: 0,
            stats_interval_secs: 5.0,
            replication: ReplicationConfig::default(),
            packet_loss: PacketLossSimulation::default(),
        }
    }
}
