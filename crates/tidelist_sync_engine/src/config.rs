//! Configuration for the sync engine.

use chrono::Duration;

/// Tunables for change application.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// How far ahead of server time a client-declared timestamp may lie
    /// before it is clamped to server time.
    pub clock_skew_tolerance: Duration,
    /// Maximum number of changes accepted in one sync request.
    pub max_batch: usize,
}

impl EngineConfig {
    /// Creates the default configuration.
    pub fn new() -> Self {
        Self {
            clock_skew_tolerance: Duration::minutes(5),
            max_batch: 500,
        }
    }

    /// Sets the clock-skew tolerance.
    pub fn with_clock_skew_tolerance(mut self, tolerance: Duration) -> Self {
        self.clock_skew_tolerance = tolerance;
        self
    }

    /// Sets the maximum batch size.
    pub fn with_max_batch(mut self, max: usize) -> Self {
        self.max_batch = max;
        self
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.clock_skew_tolerance, Duration::minutes(5));
        assert_eq!(config.max_batch, 500);
    }

    #[test]
    fn builder() {
        let config = EngineConfig::new()
            .with_clock_skew_tolerance(Duration::seconds(30))
            .with_max_batch(10);

        assert_eq!(config.clock_skew_tolerance, Duration::seconds(30));
        assert_eq!(config.max_batch, 10);
    }
}
