//! Core E2E testing framework

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use tracing::{error, info};

/// Main test framework coordinator
pub struct TestFramework {
    config: TestConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestConfig {
    /// Upper bound for a single scenario, in seconds
    pub timeout_secs: u64,

    /// Enable detailed logging
    pub verbose: bool,

    /// Address relays bind to; port 0 picks a free port
    pub bind_address: String,
}

impl Default for TestConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 60,
            verbose: false,
            bind_address: "127.0.0.1:0".to_string(),
        }
    }
}

/// Test scenario trait
#[async_trait::async_trait]
pub trait TestScenario {
    async fn execute(&self, framework: &TestFramework) -> Result<TestMetrics>;

    fn name(&self) -> &str;
    fn description(&self) -> &str;
    fn timeout(&self) -> Duration;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestResult {
    pub scenario_name: String,
    pub success: bool,
    pub duration: Duration,
    pub error_message: Option<String>,
    pub metrics: TestMetrics,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TestMetrics {
    pub events_emitted: u64,
    pub messages_received: u64,
    pub batches_received: u64,
    pub connect_attempts: u64,
}

impl TestFramework {
    pub fn new(config: TestConfig) -> Result<Self> {
        if config.timeout_secs == 0 {
            anyhow::bail!("timeout_secs must be greater than 0");
        }
        Ok(Self { config })
    }

    pub fn config(&self) -> &TestConfig {
        &self.config
    }

    /// Run one scenario under the shorter of its own and the global timeout
    pub async fn run_scenario<S: TestScenario>(&self, scenario: S) -> Result<TestResult> {
        let limit = scenario
            .timeout()
            .min(Duration::from_secs(self.config.timeout_secs));
        info!(scenario = scenario.name(), "{}", scenario.description());

        let started = Instant::now();
        let outcome = tokio::time::timeout(limit, scenario.execute(self)).await;
        let duration = started.elapsed();

        let result = match outcome {
            Ok(Ok(metrics)) => TestResult {
                scenario_name: scenario.name().to_string(),
                success: true,
                duration,
                error_message: None,
                metrics,
            },
            Ok(Err(e)) => TestResult {
                scenario_name: scenario.name().to_string(),
                success: false,
                duration,
                error_message: Some(format!("{:#}", e)),
                metrics: TestMetrics::default(),
            },
            Err(_) => TestResult {
                scenario_name: scenario.name().to_string(),
                success: false,
                duration,
                error_message: Some(format!("timed out after {:?}", limit)),
                metrics: TestMetrics::default(),
            },
        };

        if result.success {
            info!(scenario = %result.scenario_name, duration_ms = duration.as_millis() as u64, "Scenario passed");
        } else {
            error!(
                scenario = %result.scenario_name,
                error = result.error_message.as_deref().unwrap_or_default(),
                "Scenario failed"
            );
        }
        Ok(result)
    }
}
