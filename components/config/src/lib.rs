use std::time::Duration;

use error::ConfigurationError;
use serde::{Deserialize, Serialize};

pub mod error;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Server {
    pub host: String,

    pub port: u16,

    #[serde(rename = "metrics-port")]
    pub metrics_port: u16,

    #[serde(rename = "worker-threads")]
    pub worker_threads: usize,
}

impl Default for Server {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_owned(),
            port: 9000,
            metrics_port: 9100,
            worker_threads: 1,
        }
    }
}

/// Knobs of the completion protocol proper: how long a state machine holds
/// reports before arbitrating, and how long a chosen committer may stay
/// silent before the supervisor repairs the segment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Completion {
    #[serde(rename = "election-hold-ms")]
    pub election_hold_ms: u64,

    #[serde(rename = "commit-timeout-ms")]
    pub commit_timeout_ms: u64,

    #[serde(rename = "supervisor-interval-ms")]
    pub supervisor_interval_ms: u64,

    #[serde(rename = "max-repair-attempts")]
    pub max_repair_attempts: u32,
}

impl Default for Completion {
    fn default() -> Self {
        Self {
            election_hold_ms: 3_000,
            commit_timeout_ms: 120_000,
            supervisor_interval_ms: 5_000,
            max_repair_attempts: 3,
        }
    }
}

impl Completion {
    pub fn election_hold(&self) -> Duration {
        Duration::from_millis(self.election_hold_ms)
    }

    pub fn commit_timeout(&self) -> Duration {
        Duration::from_millis(self.commit_timeout_ms)
    }

    pub fn supervisor_interval(&self) -> Duration {
        Duration::from_millis(self.supervisor_interval_ms)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FlushPolicyKind {
    SizeBased,
    FixedRows,
    TimeBased,
}

/// Sizing of the next segment after each commit.
///
/// The defaults reproduce the adaptive size-based policy: aim at 500 MiB
/// on disk, blend the observed rows-to-bytes ratio 1:3 with history, and
/// grow/shrink aggressively outside the `[0.5x, 1.5x]` guard band.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Flush {
    pub policy: FlushPolicyKind,

    #[serde(rename = "ideal-segment-size-bytes")]
    pub ideal_segment_size_bytes: u64,

    #[serde(rename = "min-size-factor")]
    pub min_size_factor: f64,

    #[serde(rename = "max-size-factor")]
    pub max_size_factor: f64,

    #[serde(rename = "initial-rows-threshold")]
    pub initial_rows_threshold: u64,

    #[serde(rename = "current-ratio-weight")]
    pub current_ratio_weight: f64,

    #[serde(rename = "prior-ratio-weight")]
    pub prior_ratio_weight: f64,

    #[serde(rename = "time-flush-interval-ms")]
    pub time_flush_interval_ms: u64,
}

impl Default for Flush {
    fn default() -> Self {
        Self {
            policy: FlushPolicyKind::SizeBased,
            ideal_segment_size_bytes: 500 * 1024 * 1024,
            min_size_factor: 0.5,
            max_size_factor: 1.5,
            initial_rows_threshold: 100_000,
            current_ratio_weight: 0.25,
            prior_ratio_weight: 0.75,
            time_flush_interval_ms: 6 * 3600 * 1000,
        }
    }
}

impl Flush {
    pub fn time_flush_interval(&self) -> Duration {
        Duration::from_millis(self.time_flush_interval_ms)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Configuration {
    pub server: Server,

    pub completion: Completion,

    pub flush: Flush,
}

impl Configuration {
    /// Check and apply the configuration.
    pub fn check_and_apply(&mut self) -> Result<(), ConfigurationError> {
        let total_processor_num = num_cpus::get();
        if self.server.worker_threads > total_processor_num {
            return Err(ConfigurationError::ConcurrencyTooLarge(
                self.server.worker_threads,
            ));
        }
        if self.server.worker_threads == 0 {
            return Err(ConfigurationError::NotPositive("worker-threads"));
        }
        if self.server.port == self.server.metrics_port {
            return Err(ConfigurationError::PortClash(self.server.port));
        }

        if self.completion.commit_timeout_ms == 0 {
            return Err(ConfigurationError::NotPositive("commit-timeout-ms"));
        }
        if self.completion.supervisor_interval_ms == 0 {
            return Err(ConfigurationError::NotPositive("supervisor-interval-ms"));
        }

        if self.flush.ideal_segment_size_bytes == 0 {
            return Err(ConfigurationError::NotPositive("ideal-segment-size-bytes"));
        }
        if self.flush.initial_rows_threshold == 0 {
            return Err(ConfigurationError::NotPositive("initial-rows-threshold"));
        }
        if self.flush.time_flush_interval_ms == 0 {
            return Err(ConfigurationError::NotPositive("time-flush-interval-ms"));
        }

        let current = self.flush.current_ratio_weight;
        let prior = self.flush.prior_ratio_weight;
        if current <= 0.0 || prior <= 0.0 || (current + prior - 1.0).abs() > 1e-9 {
            return Err(ConfigurationError::BadBlendWeights { current, prior });
        }

        let min = self.flush.min_size_factor;
        let max = self.flush.max_size_factor;
        if min <= 0.0 || min >= 1.0 || max <= 1.0 {
            return Err(ConfigurationError::BadGuardBands { min, max });
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::error::Error;

    use super::Configuration;

    #[test]
    fn test_yaml() -> Result<(), Box<dyn Error>> {
        let yaml = r#"
server:
  host: 0.0.0.0
  port: 9000
  metrics-port: 9100
  worker-threads: 1
completion:
  election-hold-ms: 3000
  commit-timeout-ms: 120000
  supervisor-interval-ms: 5000
  max-repair-attempts: 3
flush:
  policy: size-based
  ideal-segment-size-bytes: 524288000
  min-size-factor: 0.5
  max-size-factor: 1.5
  initial-rows-threshold: 100000
  current-ratio-weight: 0.25
  prior-ratio-weight: 0.75
  time-flush-interval-ms: 21600000
"#;
        let mut config: Configuration = serde_yaml::from_str(yaml)?;
        assert_eq!(9000, config.server.port);
        assert_eq!(3000, config.completion.election_hold_ms);
        assert_eq!(524_288_000, config.flush.ideal_segment_size_bytes);
        assert_eq!(100_000, config.flush.initial_rows_threshold);
        config.check_and_apply()?;
        Ok(())
    }

    #[test]
    fn test_defaults_pass_validation() {
        let mut config = Configuration::default();
        assert!(config.check_and_apply().is_ok());
        assert_eq!(100_000, config.flush.initial_rows_threshold);
        assert_eq!(500 * 1024 * 1024, config.flush.ideal_segment_size_bytes);
    }

    #[test]
    fn test_bad_weights_rejected() {
        let mut config = Configuration::default();
        config.flush.current_ratio_weight = 0.5;
        config.flush.prior_ratio_weight = 0.75;
        assert!(config.check_and_apply().is_err());
    }

    #[test]
    fn test_port_clash_rejected() {
        let mut config = Configuration::default();
        config.server.metrics_port = config.server.port;
        assert!(config.check_and_apply().is_err());
    }
}
