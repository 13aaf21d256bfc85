//! Bounded least-recently-used mapping from session key to the deployment
//! it was last routed to.
//!
//! Holds only [`Weak`] references: the `Switchboard`'s deployment registry
//! is the sole owner, and evicting or losing a session entry must never be
//! the thing that keeps a `Deployment` alive.

use std::num::NonZeroUsize;
use std::sync::{Arc, Weak};

use lru::LruCache;
use parking_lot::Mutex;

use crate::deployment::Deployment;

/// Default bound on the number of tracked sessions.
pub const DEFAULT_MAX_SESSIONS: usize = 1024;

pub struct SessionMap {
    inner: Mutex<LruCache<String, Weak<Deployment>>>,
}

impl SessionMap {
    pub fn new(max_size: usize) -> Self {
        let cap = NonZeroUsize::new(max_size).unwrap_or(NonZeroUsize::new(1).unwrap());
        Self {
            inner: Mutex::new(LruCache::new(cap)),
        }
    }

    /// Looks up `key`, marking it most-recently-used. Returns `None` if the
    /// key is absent or its deployment has since been dropped.
    pub fn get(&self, key: &str) -> Option<Arc<Deployment>> {
        let mut guard = self.inner.lock();
        guard.get(key).and_then(Weak::upgrade)
    }

    /// Inserts or updates `key`, marking it most-recently-used. Evicts the
    /// least-recently-used entry if this insert pushes the map past its
    /// bound.
    pub fn put(&self, key: String, deployment: &Arc<Deployment>) {
        self.inner.lock().put(key, Arc::downgrade(deployment));
    }

    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
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

    fn deployment(name: &str) -> Arc<Deployment> {
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
        Arc::new(Deployment::new(config, Arc::new(NoopUpstream)).unwrap())
    }

    #[test]
    fn put_then_get_returns_same_deployment() {
        let sessions = SessionMap::new(1024);
        let d = deployment("d1");
        sessions.put("session-a".into(), &d);
        let got = sessions.get("session-a").unwrap();
        assert_eq!(got.name(), "d1");
    }

    #[test]
    fn absent_key_returns_none() {
        let sessions = SessionMap::new(1024);
        assert!(sessions.get("missing").is_none());
    }

    #[test]
    fn evicts_least_recently_used_beyond_bound() {
        let sessions = SessionMap::new(2);
        let a = deployment("a");
        let b = deployment("b");
        let c = deployment("c");
        sessions.put("s1".into(), &a);
        sessions.put("s2".into(), &b);
        sessions.put("s3".into(), &c);
        assert_eq!(sessions.len(), 2);
        assert!(sessions.get("s1").is_none());
    }

    #[test]
    fn get_marks_entry_recently_used() {
        let sessions = SessionMap::new(2);
        let a = deployment("a");
        let b = deployment("b");
        let c = deployment("c");
        sessions.put("s1".into(), &a);
        sessions.put("s2".into(), &b);
        // touch s1 so s2 becomes the least-recently-used entry
        sessions.get("s1");
        sessions.put("s3".into(), &c);
        assert!(sessions.get("s2").is_none());
        assert!(sessions.get("s1").is_some());
    }

    #[test]
    fn dropped_deployment_upgrades_to_none() {
        let sessions = SessionMap::new(1024);
        {
            let d = deployment("ephemeral");
            sessions.put("s1".into(), &d);
        }
        assert!(sessions.get("s1").is_none());
    }
}
