//! In-process configuration types.
//!
//! No file or environment parsing lives here — the caller is responsible
//! for producing these structs however it sees fit; this crate only
//! consumes them.

use serde::{Deserialize, Serialize};

/// Per-model rate-limit configuration on a deployment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelLimits {
    pub name: String,
    #[serde(default)]
    pub tpm_limit: u64,
    #[serde(default)]
    pub rpm_limit: u64,
    #[serde(default = "default_cooldown_seconds")]
    pub cooldown_seconds: u64,
}

fn default_cooldown_seconds() -> u64 {
    60
}

impl Default for ModelLimits {
    fn default() -> Self {
        Self {
            name: String::new(),
            tpm_limit: 0,
            rpm_limit: 0,
            cooldown_seconds: default_cooldown_seconds(),
        }
    }
}

/// Static configuration for one backend deployment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeploymentConfig {
    pub name: String,
    #[serde(default)]
    pub endpoint: Option<String>,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub api_version: Option<String>,
    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: u64,
    pub models: Vec<ModelLimits>,
}

fn default_timeout_seconds() -> u64 {
    600
}

/// Bounds the `Switchboard::create` retry loop.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct FailoverPolicy {
    pub max_attempts: u32,
}

impl Default for FailoverPolicy {
    fn default() -> Self {
        Self { max_attempts: 2 }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn model_limits_defaults() {
        let limits = ModelLimits::default();
        assert_eq!(limits.tpm_limit, 0);
        assert_eq!(limits.rpm_limit, 0);
        assert_eq!(limits.cooldown_seconds, 60);
    }

    #[test]
    fn failover_policy_default_is_two_attempts() {
        assert_eq!(FailoverPolicy::default().max_attempts, 2);
    }
}
