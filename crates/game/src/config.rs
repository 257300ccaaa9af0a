#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PriorityWeights {
    pub resting: u32,
    pub active: u32,
    pub unconfirmed_claim: u32,
}

impl Default for PriorityWeights {
    fn default() -> Self {
        Self {
            resting: 1,
            active: 10,
            unconfirmed_claim: 1000,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ReplicationConfig {
    pub max_state_updates: usize,
    pub jitter_delay_frames: u32,
    pub connection_timeout_secs: f64,
    pub server_info_interval_frames: u32,
    pub authority_release_frames: u32,
    pub priority: PriorityWeights,
}

impl Default for ReplicationConfig {
    fn default() -> Self {
        Self {
            max_state_updates: 64,
            jitter_delay_frames: 6,
            connection_timeout_secs: 5.0,
            server_info_interval_frames: 60,
            authority_release_frames: 30,
            priority: PriorityWeights::default(),
        }
    }
}
