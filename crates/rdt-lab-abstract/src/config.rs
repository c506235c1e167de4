use crate::generation::Generation;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Channel and session parameters shared by both directions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimConfig {
    /// Probability that a transmission is dropped.
    pub loss_rate: f64,
    /// Probability that a surviving transmission is munged.
    pub corrupt_rate: f64,
    pub min_latency: u64,
    pub max_latency: u64,
    /// Retransmission timeout in milliseconds (3.0 only).
    pub timeout_ms: u64,
    pub seed: u64,
    /// Upper bound, in milliseconds, on the time the sender spends awaiting
    /// acknowledgements. Time spent waiting on the feed is not counted.
    pub max_duration_ms: u64,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            loss_rate: 0.0,
            corrupt_rate: 0.0,
            min_latency: 10,
            max_latency: 100,
            timeout_ms: 300,
            seed: 0,
            max_duration_ms: 60_000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("{name} must be within [0, 1], got {value}")]
    ProbabilityOutOfRange { name: &'static str, value: f64 },
    #[error("min_latency ({min}) exceeds max_latency ({max})")]
    LatencyRange { min: u64, max: u64 },
    #[error("timeout_ms must be positive for {0}")]
    ZeroTimeout(Generation),
    #[error("{generation} has no loss recovery; loss_rate must be 0 (got {loss_rate})")]
    LossWithoutTimeout { generation: Generation, loss_rate: f64 },
    #[error("{generation} has no loss recovery; scripted drops are not allowed")]
    ScriptedLossWithoutTimeout { generation: Generation },
}

impl SimConfig {
    /// Reject parameter combinations the given generation cannot survive.
    ///
    /// Generations before 3.0 never retransmit without a bad reply, so any
    /// loss would leave a `receive` blocked forever.
    pub fn validate(&self, generation: Generation) -> Result<(), ConfigError> {
        check_probability("loss_rate", self.loss_rate)?;
        check_probability("corrupt_rate", self.corrupt_rate)?;

        if self.min_latency > self.max_latency {
            return Err(ConfigError::LatencyRange {
                min: self.min_latency,
                max: self.max_latency,
            });
        }

        if generation.retransmits_on_timeout() {
            if self.timeout_ms == 0 {
                return Err(ConfigError::ZeroTimeout(generation));
            }
        } else if self.loss_rate > 0.0 {
            return Err(ConfigError::LossWithoutTimeout {
                generation,
                loss_rate: self.loss_rate,
            });
        }

        Ok(())
    }
}

fn check_probability(name: &'static str, value: f64) -> Result<(), ConfigError> {
    if (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(ConfigError::ProbabilityOutOfRange { name, value })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_is_valid_everywhere() {
        for generation in Generation::ALL {
            SimConfig::default().validate(generation).unwrap();
        }
    }

    #[test]
    fn loss_requires_timer() {
        let config = SimConfig {
            loss_rate: 0.2,
            ..Default::default()
        };
        assert_eq!(
            config.validate(Generation::Rdt22),
            Err(ConfigError::LossWithoutTimeout {
                generation: Generation::Rdt22,
                loss_rate: 0.2
            })
        );
        config.validate(Generation::Rdt30).unwrap();
    }

    #[test]
    fn rejects_bad_ranges() {
        let config = SimConfig {
            corrupt_rate: 1.5,
            ..Default::default()
        };
        assert!(matches!(
            config.validate(Generation::Rdt20),
            Err(ConfigError::ProbabilityOutOfRange { name: "corrupt_rate", .. })
        ));

        let config = SimConfig {
            min_latency: 50,
            max_latency: 10,
            ..Default::default()
        };
        assert!(matches!(
            config.validate(Generation::Rdt21),
            Err(ConfigError::LatencyRange { .. })
        ));

        let config = SimConfig {
            timeout_ms: 0,
            ..Default::default()
        };
        assert_eq!(
            config.validate(Generation::Rdt30),
            Err(ConfigError::ZeroTimeout(Generation::Rdt30))
        );
        config.validate(Generation::Rdt20).unwrap();
    }

    #[test]
    fn partial_toml_falls_back_to_defaults() {
        let config: SimConfig = toml::from_str("loss_rate = 0.1\nseed = 7").unwrap();
        assert_eq!(config.loss_rate, 0.1);
        assert_eq!(config.seed, 7);
        assert_eq!(config.timeout_ms, SimConfig::default().timeout_ms);
    }
}
