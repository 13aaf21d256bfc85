//! Power-of-two random choices selection.
//!
//! Sampling two candidates and picking the less loaded one gives near-optimal
//! load distribution at O(1) decision cost, and avoids the herd behavior a
//! global-minimum pick would cause when many requests select concurrently.

use std::sync::Arc;

use rand::Rng;

use crate::deployment::Deployment;

/// Pluggable selection policy, consulted by `Switchboard::select_deployment`
/// once more than one eligible candidate remains.
pub trait Selector: Send + Sync {
    /// `candidates` is guaranteed non-empty and already filtered to
    /// deployments healthy for `model`.
    fn select(&self, model: &str, candidates: &[Arc<Deployment>]) -> Arc<Deployment>;
}

/// Default selector: power of two random choices.
#[derive(Debug, Default, Clone, Copy)]
pub struct P2CSelector;

impl Selector for P2CSelector {
    fn select(&self, model: &str, candidates: &[Arc<Deployment>]) -> Arc<Deployment> {
        if candidates.len() == 1 {
            return candidates[0].clone();
        }

        let (i, j) = two_random_indices(candidates.len());
        let a = &candidates[i];
        let b = &candidates[j];
        if a.util(model) <= b.util(model) {
            a.clone()
        } else {
            b.clone()
        }
    }
}

fn two_random_indices(len: usize) -> (usize, usize) {
    let mut rng = rand::thread_rng();
    let i = rng.gen_range(0..len);
    let mut j = rng.gen_range(0..len - 1);
    if j >= i {
        j += 1;
    }
    (i, j)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{DeploymentConfig, ModelLimits};
    use crate::types::{ChatCompletionRequest, ChatCompletionResponse};
    use crate::upstream::{ChunkStream, Upstream, UpstreamError};
    use async_trait::async_trait;

    struct NoopUpstream;

    #[async_trait]
    impl Upstream for NoopUpstream {
        async fn complete(
            &self,
            _request: ChatCompletionRequest,
        ) -> Result<ChatCompletionResponse, UpstreamError> {
            unimplemented!()
        }

        async fn stream(&self, _request: ChatCompletionRequest) -> Result<ChunkStream, UpstreamError> {
            unimplemented!()
        }
    }

    fn deployment(name: &str, tpm_usage: i64) -> Arc<Deployment> {
        let config = DeploymentConfig {
            name: name.into(),
            endpoint: None,
            api_key: None,
            api_version: None,
            timeout_seconds: 600,
            models: vec![ModelLimits {
                name: "gpt-4o".into(),
                tpm_limit: 1000,
                rpm_limit: 100,
                cooldown_seconds: 60,
            }],
        };
        let d = Deployment::new(config, Arc::new(NoopUpstream)).unwrap();
        d.model_state("gpt-4o").unwrap().spend_tokens(tpm_usage);
        Arc::new(d)
    }

    #[test]
    fn single_candidate_is_returned_directly() {
        let d = deployment("only", 0);
        let chosen = P2CSelector.select("gpt-4o", std::slice::from_ref(&d));
        assert_eq!(chosen.name(), "only");
    }

    #[test]
    fn prefers_lower_utilization_candidate() {
        let busy = deployment("busy", 900);
        let idle = deployment("idle", 0);
        let candidates = vec![busy, idle];
        for _ in 0..20 {
            let chosen = P2CSelector.select("gpt-4o", &candidates);
            assert_eq!(chosen.name(), "idle");
        }
    }

    #[test]
    fn two_random_indices_are_distinct() {
        for _ in 0..50 {
            let (i, j) = two_random_indices(5);
            assert_ne!(i, j);
            assert!(i < 5 && j < 5);
        }
    }
}
