//! Public façade: owns the deployment registry and session map, runs the
//! periodic usage-reset ticker, and drives selection plus failover retry
//! for every `create` call.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use dashmap::DashMap;
use tokio::task::JoinHandle;

use crate::config::{DeploymentConfig, FailoverPolicy};
use crate::deployment::{CreateResponse, Deployment};
use crate::error::SwitchboardError;
use crate::model_state::UtilStats;
use crate::selector::{P2CSelector, Selector};
use crate::session_map::{SessionMap, DEFAULT_MAX_SESSIONS};
use crate::types::ChatCompletionRequest;
use crate::upstream::Upstream;

/// Construction input: a deployment's static configuration paired with the
/// upstream handle built from it. Building the client itself is the
/// caller's responsibility — it is the one out-of-scope collaborator this
/// crate never constructs.
pub struct DeploymentSpec {
    pub config: DeploymentConfig,
    pub upstream: Arc<dyn Upstream>,
}

/// Optional construction parameters, all defaulted if omitted.
#[derive(Default)]
pub struct SwitchboardOptions {
    pub selector: Option<Box<dyn Selector>>,
    pub failover: Option<FailoverPolicy>,
    /// Window length for the periodic reset ticker. `0` disables it.
    pub ratelimit_window_seconds: Option<u64>,
    pub max_sessions: Option<usize>,
}

/// Snapshot returned by [`Switchboard::stats`].
pub type Stats = HashMap<String, HashMap<String, UtilStats>>;

pub struct Switchboard {
    deployments: DashMap<String, Arc<Deployment>>,
    sessions: SessionMap,
    selector: Box<dyn Selector>,
    failover: FailoverPolicy,
    ratelimit_window_seconds: u64,
    reset_task: Mutex<Option<JoinHandle<()>>>,
}

impl std::fmt::Debug for Switchboard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Switchboard")
            .field("deployments", &self.deployments.iter().map(|e| e.key().clone()).collect::<Vec<_>>())
            .field("sessions", &self.sessions.len())
            .field("failover", &self.failover)
            .field("ratelimit_window_seconds", &self.ratelimit_window_seconds)
            .finish()
    }
}

impl Switchboard {
    /// Fails with `ConfigError` on an empty or duplicate-named deployment
    /// list, or a `FailoverPolicy` with `max_attempts == 0`.
    pub fn new(deployments: Vec<DeploymentSpec>, options: SwitchboardOptions) -> Result<Self, SwitchboardError> {
        if deployments.is_empty() {
            return Err(SwitchboardError::ConfigError("No deployments configured".into()));
        }

        let failover = options.failover.unwrap_or_default();
        if failover.max_attempts == 0 {
            return Err(SwitchboardError::ConfigError(
                "FailoverPolicy::max_attempts must be at least 1".into(),
            ));
        }

        let map = DashMap::with_capacity(deployments.len());
        for spec in deployments {
            let name = spec.config.name.clone();
            if map.contains_key(&name) {
                return Err(SwitchboardError::ConfigError(format!(
                    "Duplicate deployment name: {name}"
                )));
            }
            map.insert(name, Arc::new(Deployment::new(spec.config, spec.upstream)?));
        }

        Ok(Self {
            deployments: map,
            sessions: SessionMap::new(options.max_sessions.unwrap_or(DEFAULT_MAX_SESSIONS)),
            selector: options.selector.unwrap_or_else(|| Box::new(P2CSelector)),
            failover,
            ratelimit_window_seconds: options.ratelimit_window_seconds.unwrap_or(60),
            reset_task: Mutex::new(None),
        })
    }

    /// Starts the periodic usage-reset ticker. Idempotent: calling twice
    /// without an intervening `stop()` leaves the existing ticker running.
    pub fn start(self: &Arc<Self>) {
        if self.ratelimit_window_seconds == 0 {
            return;
        }
        let mut guard = self.reset_task.lock().unwrap();
        if guard.is_some() {
            return;
        }
        let this = self.clone();
        let period = Duration::from_secs(self.ratelimit_window_seconds);
        *guard = Some(tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.tick().await; // first tick fires immediately
            loop {
                interval.tick().await;
                tracing::debug!("resetting usage counters");
                this.reset_usage();
            }
        }));
    }

    /// Cancels the reset ticker and awaits its termination. Idempotent.
    pub async fn stop(&self) {
        let handle = self.reset_task.lock().unwrap().take();
        if let Some(handle) = handle {
            handle.abort();
            let _ = handle.await;
        }
    }

    /// Looks up a deployment by name, independent of health or selection.
    pub fn deployment(&self, name: &str) -> Option<Arc<Deployment>> {
        self.deployments.get(name).map(|entry| entry.value().clone())
    }

    pub fn select_deployment(
        &self,
        model: &str,
        session_id: Option<&str>,
    ) -> Result<Arc<Deployment>, SwitchboardError> {
        if let Some(session_id) = session_id {
            if let Some(pinned) = self.sessions.get(session_id) {
                if pinned.is_healthy(model) {
                    return Ok(pinned);
                }
            }
        }

        let eligible: Vec<Arc<Deployment>> = self
            .deployments
            .iter()
            .filter(|entry| entry.value().is_healthy(model))
            .map(|entry| entry.value().clone())
            .collect();

        if eligible.is_empty() {
            return Err(SwitchboardError::NoEligibleDeployments {
                model: model.to_string(),
            });
        }

        let chosen = if eligible.len() == 1 {
            eligible[0].clone()
        } else {
            self.selector.select(model, &eligible)
        };

        if let Some(session_id) = session_id {
            self.sessions.put(session_id.to_string(), &chosen);
        }

        Ok(chosen)
    }

    /// Selects a deployment and performs the request, retrying on another
    /// deployment up to `failover.max_attempts` times unless the failure is
    /// `ClientFault`, `NoEligibleDeployments`, or `Cancelled`.
    pub async fn create(
        &self,
        request: ChatCompletionRequest,
        session_id: Option<&str>,
    ) -> Result<CreateResponse, SwitchboardError> {
        let mut last_err: Option<SwitchboardError> = None;

        for attempt in 1..=self.failover.max_attempts {
            let deployment = match self.select_deployment(&request.model, session_id) {
                Ok(d) => d,
                Err(e) => return Err(e),
            };

            tracing::debug!(
                deployment = deployment.name(),
                model = %request.model,
                attempt,
                "attempting completion"
            );

            match deployment.create(request.clone()).await {
                Ok(response) => return Ok(response),
                Err(err) if err.is_retryable() => {
                    tracing::warn!(deployment = deployment.name(), error = %err, "retryable failure, re-selecting");
                    last_err = Some(err);
                }
                Err(err) => return Err(err),
            }
        }

        Err(last_err.expect("failover loop runs at least once"))
    }

    /// Zeros every deployment's usage counters. Does not touch cooldowns.
    pub fn reset_usage(&self) {
        for entry in self.deployments.iter() {
            entry.value().reset_usage();
        }
    }

    pub fn stats(&self) -> Stats {
        self.deployments
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().stats()))
            .collect()
    }
}
