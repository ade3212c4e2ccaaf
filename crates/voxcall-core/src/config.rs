//! Call agent configuration loaded from the environment.
//!
//! Every tunable is env-driven with a sane default so behavior changes
//! without code edits. The core components never hardcode defaults
//! themselves — they take their sub-config as given.
//!
//! | Env | Default | Description |
//! |-----|---------|-------------|
//! | SESSION_MAX_RETRIES | 3 | Session start attempts before giving up. |
//! | SESSION_BACKOFF_BASE_S | 2.0 | Exponential backoff base between attempts. |
//! | SILENCE_TIMEOUT_S | 10.0 | User inactivity after an assistant turn before a re-prompt. |
//! | SILENCE_MAX_REPEATS | 2 | Re-prompts before the agent politely hangs up. |
//! | SILENCE_REPEAT_DELAY_S | 0.5 | Cosmetic pause before each re-prompt. |
//! | GREETING_DELAY_S | 0.8 | Pause after session start before the greeting. |
//! | MAX_CALL_DURATION_S | 900 | Hard call ceiling; triggers a spoken goodbye. |
//! | GOODBYE_DELAY_S | 3.0 | Grace period so trailing goodbye audio finishes. |
//! | AUDIO_SAMPLE_RATE_HZ | 24000 | PCM sample rate for the local monitor path. |
//! | AUDIO_CHANNELS | 1 | Channel count for the local monitor path. |
//! | HEALTH_HOST / HEALTH_PORT | 0.0.0.0 / 8080 | Health endpoint bind address. |

use crate::audio::AudioConfig;
use crate::error::{CallError, CallResult};
use crate::launcher::RetryPolicy;
use crate::lifecycle::LifecycleConfig;
use crate::monitor::MonitorConfig;
use serde::{Deserialize, Serialize};
use std::time::Duration;

fn env_u32(key: &str, default: u32) -> u32 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_f64(key: &str, default: f64) -> f64 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_secs(key: &str, default: f64) -> Duration {
    Duration::from_secs_f64(env_f64(key, default).max(0.0))
}

fn env_string(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

/// Bind address for the health endpoint surface.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthConfig {
    pub host: String,
    pub port: u16,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
        }
    }
}

/// Full agent configuration: one sub-config per component.
#[derive(Debug, Clone, Default)]
pub struct CallConfig {
    pub retry: RetryPolicy,
    pub monitor: MonitorConfig,
    pub lifecycle: LifecycleConfig,
    pub audio: AudioConfig,
    pub health: HealthConfig,
}

impl CallConfig {
    /// Load from environment. Unset or unparsable values fall back to the
    /// defaults documented in the module header.
    pub fn from_env() -> Self {
        Self {
            retry: RetryPolicy {
                max_attempts: env_u32("SESSION_MAX_RETRIES", 3),
                backoff_base_seconds: env_f64("SESSION_BACKOFF_BASE_S", 2.0),
            },
            monitor: MonitorConfig {
                timeout: env_secs("SILENCE_TIMEOUT_S", 10.0),
                max_repeats: env_u32("SILENCE_MAX_REPEATS", 2),
                repeat_delay: env_secs("SILENCE_REPEAT_DELAY_S", 0.5),
            },
            lifecycle: LifecycleConfig {
                greeting: env_string(
                    "AGENT_GREETING",
                    "Greet the caller briefly and ask how you can help.",
                ),
                greeting_delay: env_secs("GREETING_DELAY_S", 0.8),
                max_call_duration: env_secs("MAX_CALL_DURATION_S", 900.0),
                goodbye_delay: env_secs("GOODBYE_DELAY_S", 3.0),
            },
            audio: AudioConfig {
                sample_rate: env_u32("AUDIO_SAMPLE_RATE_HZ", 24000),
                channels: env_u32("AUDIO_CHANNELS", 1) as u16,
                block_size: env_u32("AUDIO_BLOCK_SIZE", 1024) as usize,
            },
            health: HealthConfig {
                host: env_string("HEALTH_HOST", "0.0.0.0"),
                port: env_u32("HEALTH_PORT", 8080) as u16,
            },
        }
    }

    /// Sanity-check the loaded values. Called once at startup.
    pub fn validate(&self) -> CallResult<()> {
        if self.retry.max_attempts == 0 {
            return Err(CallError::Config(
                "SESSION_MAX_RETRIES must be at least 1".to_string(),
            ));
        }
        if self.retry.backoff_base_seconds < 1.0 {
            return Err(CallError::Config(
                "SESSION_BACKOFF_BASE_S must be >= 1.0".to_string(),
            ));
        }
        if self.monitor.timeout.is_zero() {
            return Err(CallError::Config(
                "SILENCE_TIMEOUT_S must be positive".to_string(),
            ));
        }
        if self.lifecycle.max_call_duration.is_zero() {
            return Err(CallError::Config(
                "MAX_CALL_DURATION_S must be positive".to_string(),
            ));
        }
        if self.audio.channels == 0 {
            return Err(CallError::Config(
                "AUDIO_CHANNELS must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = CallConfig::default();
        config.validate().unwrap();
    }

    #[test]
    fn env_defaults_match_documented_values() {
        let config = CallConfig::from_env();
        assert_eq!(config.retry.max_attempts, 3);
        assert!((config.retry.backoff_base_seconds - 2.0).abs() < 1e-9);
        assert_eq!(config.monitor.max_repeats, 2);
        assert_eq!(config.lifecycle.max_call_duration, Duration::from_secs(900));
        assert_eq!(config.health.port, 8080);
    }

    #[test]
    fn zero_retries_rejected() {
        let mut config = CallConfig::default();
        config.retry.max_attempts = 0;
        assert!(config.validate().is_err());
    }
}
