use batchflow_core::EngineConfig;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Settings shared by a test run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestConfig {
    /// Engine configuration handed to the repository and jobs
    pub engine: EngineConfig,
    /// Upper bound for a single job run
    pub timeout: Duration,
    /// Time a probing step body holds its slot
    pub step_delay: Duration,
}

impl Default for TestConfig {
    fn default() -> Self {
        Self {
            engine: EngineConfig::default(),
            timeout: Duration::from_secs(5),
            step_delay: Duration::from_millis(20),
        }
    }
}

impl TestConfig {
    /// Defaults with a custom engine configuration
    pub fn new(engine: EngineConfig) -> Self {
        Self {
            engine,
            ..Default::default()
        }
    }
}
