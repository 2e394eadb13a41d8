use std::time::Duration;

/// Settings for [`crate::spawn`].
#[derive(Debug, Clone)]
pub struct Config {
    progress_interval: Duration,
    event_capacity: usize,
    thread_name: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            progress_interval: Duration::from_millis(250),
            event_capacity: 256,
            thread_name: "avplayer-dispatch".to_string(),
        }
    }
}

impl Config {
    /// Period of the progress timer.
    pub fn progress_interval(mut self, interval: Duration) -> Self {
        self.progress_interval = interval.max(Duration::from_millis(1));
        self
    }

    /// Events a subscriber may have queued before stale progress is discarded.
    pub fn event_capacity(mut self, capacity: usize) -> Self {
        self.event_capacity = capacity.max(1);
        self
    }

    pub fn thread_name(mut self, name: impl Into<String>) -> Self {
        self.thread_name = name.into();
        self
    }

    pub fn get_progress_interval(&self) -> Duration {
        self.progress_interval
    }

    pub fn get_event_capacity(&self) -> usize {
        self.event_capacity
    }

    pub fn get_thread_name(&self) -> &str {
        &self.thread_name
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_bridge_timing() {
        let config = Config::default();
        assert_eq!(config.get_progress_interval(), Duration::from_millis(250));
        assert_eq!(config.get_thread_name(), "avplayer-dispatch");
    }

    #[test]
    fn zero_values_are_raised() {
        let config = Config::default()
            .progress_interval(Duration::ZERO)
            .event_capacity(0);
        assert_eq!(config.get_progress_interval(), Duration::from_millis(1));
        assert_eq!(config.get_event_capacity(), 1);
    }
}
