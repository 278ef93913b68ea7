//! Tracker configuration.

/// Configuration for a state manager.
#[derive(Debug, Clone)]
pub struct TrackerConfig {
    /// Maximum number of tracking events retained for polling.
    pub max_event_history: usize,

    /// Initial capacity of the entry arena.
    pub initial_capacity: usize,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            max_event_history: 10_000,
            initial_capacity: 64,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_values() {
        let config = TrackerConfig::default();
        assert_eq!(config.max_event_history, 10_000);
        assert_eq!(config.initial_capacity, 64);
    }
}
