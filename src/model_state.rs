//! Per-(deployment, model) state: usage counters, cooldown clock, and the
//! utilization function the selector ranks candidates by.
//!
//! Counters are plain atomics at `Ordering::Relaxed` — routing decisions
//! tolerate eventually-consistent reads, and no invariant spans more than
//! one field at a time.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use rand::Rng;

fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

/// Runtime state of one model on one deployment.
pub struct ModelState {
    name: String,
    tpm_limit: u64,
    rpm_limit: u64,
    cooldown_period_secs: u64,
    tpm_usage: AtomicU64,
    rpm_usage: AtomicU64,
    /// Epoch seconds; `0` means "not cooling down".
    cooldown_until: AtomicU64,
}

impl std::fmt::Debug for ModelState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelState")
            .field("name", &self.name)
            .field("tpm_limit", &self.tpm_limit)
            .field("rpm_limit", &self.rpm_limit)
            .field("tpm_usage", &self.tpm_usage.load(Ordering::Relaxed))
            .field("rpm_usage", &self.rpm_usage.load(Ordering::Relaxed))
            .field("healthy", &self.healthy())
            .finish()
    }
}

/// Point-in-time snapshot returned by [`crate::Switchboard::stats`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct UtilStats {
    pub tpm_usage: u64,
    pub tpm_limit: u64,
    pub rpm_usage: u64,
    pub rpm_limit: u64,
    pub healthy: bool,
}

impl ModelState {
    pub fn new(name: impl Into<String>, tpm_limit: u64, rpm_limit: u64, cooldown_seconds: u64) -> Self {
        Self {
            name: name.into(),
            tpm_limit,
            rpm_limit,
            cooldown_period_secs: cooldown_seconds,
            tpm_usage: AtomicU64::new(0),
            rpm_usage: AtomicU64::new(0),
            cooldown_until: AtomicU64::new(0),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// `now >= cooldown_until`.
    pub fn healthy(&self) -> bool {
        now_secs() >= self.cooldown_until.load(Ordering::Relaxed)
    }

    /// `1.0` while cooling down, otherwise `max(tpm_ratio, rpm_ratio) + ε`
    /// with `ε` sampled fresh from `[0, 0.01)` per call.
    pub fn util(&self) -> f64 {
        if !self.healthy() {
            return 1.0;
        }
        let tpm_ratio = if self.tpm_limit == 0 {
            0.0
        } else {
            self.tpm_usage.load(Ordering::Relaxed) as f64 / self.tpm_limit as f64
        };
        let rpm_ratio = if self.rpm_limit == 0 {
            0.0
        } else {
            self.rpm_usage.load(Ordering::Relaxed) as f64 / self.rpm_limit as f64
        };
        let epsilon = rand::thread_rng().gen_range(0.0..0.01);
        tpm_ratio.max(rpm_ratio) + epsilon
    }

    /// Adds `n` (possibly negative, e.g. reconciling a preflight
    /// overestimate) to `tpm_usage`, clamping at `0`.
    pub fn spend_tokens(&self, n: i64) {
        Self::saturating_add(&self.tpm_usage, n);
    }

    pub fn spend_request(&self) {
        self.rpm_usage.fetch_add(1, Ordering::Relaxed);
    }

    /// `cooldown_until = now + (duration or cooldown_period)`.
    pub fn mark_down(&self, duration: Option<Duration>) {
        let secs = duration.map(|d| d.as_secs()).unwrap_or(self.cooldown_period_secs);
        self.cooldown_until.store(now_secs() + secs, Ordering::Relaxed);
    }

    /// `cooldown_until = 0`.
    pub fn mark_up(&self) {
        self.cooldown_until.store(0, Ordering::Relaxed);
    }

    /// Alias for [`ModelState::mark_up`].
    pub fn reset_cooldown(&self) {
        self.mark_up();
    }

    /// Zeros `tpm_usage` and `rpm_usage`. Does not touch `cooldown_until`.
    pub fn reset_usage(&self) {
        self.tpm_usage.store(0, Ordering::Relaxed);
        self.rpm_usage.store(0, Ordering::Relaxed);
    }

    pub fn stats(&self) -> UtilStats {
        UtilStats {
            tpm_usage: self.tpm_usage.load(Ordering::Relaxed),
            tpm_limit: self.tpm_limit,
            rpm_usage: self.rpm_usage.load(Ordering::Relaxed),
            rpm_limit: self.rpm_limit,
            healthy: self.healthy(),
        }
    }

    fn saturating_add(counter: &AtomicU64, n: i64) {
        let _ = counter.fetch_update(Ordering::Relaxed, Ordering::Relaxed, |current| {
            let signed = current as i64 + n;
            Some(signed.max(0) as u64)
        });
    }
}
