use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::timer::SessionGoal;

/// Configuration for a focus session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Goal length in seconds; 0 runs open-ended
    /// Default: 300 seconds (5 minutes)
    pub goal_secs: u64,

    /// Cadence of the timer tick
    pub tick_interval: Duration,

    /// Sessions shorter than this are not written to history
    pub min_recorded: Duration,
}

impl SessionConfig {
    pub fn goal(&self) -> SessionGoal {
        SessionGoal::from_secs(self.goal_secs)
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            goal_secs: 300,
            tick_interval: Duration::from_millis(100),
            min_recorded: Duration::from_secs(10),
        }
    }
}
