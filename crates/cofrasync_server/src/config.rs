//! Server configuration.

/// Configuration for the reference remote.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Maximum records accepted in one push request.
    pub max_push_batch: usize,
    /// Maximum changes returned by one pull.
    pub max_pull_batch: usize,
}

impl ServerConfig {
    /// Creates a configuration with the default limits.
    pub fn new() -> Self {
        Self {
            max_push_batch: 500,
            max_pull_batch: 1000,
        }
    }

    /// Sets the maximum push batch size.
    pub fn with_max_push_batch(mut self, size: usize) -> Self {
        self.max_push_batch = size;
        self
    }

    /// Sets the maximum pull batch size. Values below 1 are raised to 1.
    pub fn with_max_pull_batch(mut self, size: usize) -> Self {
        self.max_pull_batch = size.max(1);
        self
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_builder() {
        let config = ServerConfig::default()
            .with_max_push_batch(50)
            .with_max_pull_batch(0);
        assert_eq!(config.max_push_batch, 50);
        assert_eq!(config.max_pull_batch, 1);
    }
}
