//! Tracker configuration

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackerConfig {
    /// How many recent confirmed messages a conversation feed carries.
    pub feed_limit: usize,
    /// How many inbound `sent` messages the global delivery sweep observes.
    pub sweep_limit: usize,
    /// How many recent messages a seen sweep scans for eligible inbound ones.
    pub seen_scan_limit: usize,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            feed_limit: 80,
            sweep_limit: 50,
            seen_scan_limit: 200,
        }
    }
}
