//! One configured backend: owns an [`Upstream`] handle and the
//! [`ModelState`] for every model it serves. Performs preflight/postflight
//! accounting around each call and categorizes upstream failures.

use std::collections::HashMap;
use std::sync::Arc;

use crate::config::DeploymentConfig;
use crate::error::SwitchboardError;
use crate::model_state::{ModelState, UtilStats};
use crate::stream::StreamWrapper;
use crate::types::{estimate_tokens, ChatCompletionRequest, ChatCompletionResponse, StreamOptions};
use crate::upstream::{classify, Upstream};

/// Result of [`Deployment::create`]: either a completed response or a lazy
/// chunk stream, mirroring the non-stream/stream split in the Upstream
/// contract.
pub enum CreateResponse {
    Response(ChatCompletionResponse),
    Stream(StreamWrapper),
}

impl std::fmt::Debug for CreateResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CreateResponse::Response(r) => f.debug_tuple("Response").field(r).finish(),
            CreateResponse::Stream(_) => f.debug_tuple("Stream").field(&"<chunk stream>").finish(),
        }
    }
}

/// One configured backend, constructed once at `Switchboard` construction
/// and kept for the life of the `Switchboard`.
pub struct Deployment {
    name: String,
    config: DeploymentConfig,
    models: HashMap<String, Arc<ModelState>>,
    upstream: Arc<dyn Upstream>,
}

impl Deployment {
    /// Fails with `ConfigError` if `config.models` names the same model
    /// twice — silently keeping only the last entry would leave the
    /// deployment enforcing limits the caller never actually configured.
    pub fn new(config: DeploymentConfig, upstream: Arc<dyn Upstream>) -> Result<Self, SwitchboardError> {
        let mut models = HashMap::with_capacity(config.models.len());
        for m in &config.models {
            if models.contains_key(&m.name) {
                return Err(SwitchboardError::ConfigError(format!(
                    "Duplicate model {} configured for deployment {}",
                    m.name, config.name
                )));
            }
            models.insert(
                m.name.clone(),
                Arc::new(ModelState::new(&m.name, m.tpm_limit, m.rpm_limit, m.cooldown_seconds)),
            );
        }
        Ok(Self {
            name: config.name.clone(),
            config,
            models,
            upstream,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn has_model(&self, model: &str) -> bool {
        self.models.contains_key(model)
    }

    pub fn model_state(&self, model: &str) -> Option<&Arc<ModelState>> {
        self.models.get(model)
    }

    /// `false` for a model this deployment does not serve.
    pub fn is_healthy(&self, model: &str) -> bool {
        self.models.get(model).is_some_and(|m| m.healthy())
    }

    pub fn util(&self, model: &str) -> f64 {
        self.models.get(model).map(|m| m.util()).unwrap_or(0.0)
    }

    pub fn reset_usage(&self) {
        for model in self.models.values() {
            model.reset_usage();
        }
    }

    pub fn stats(&self) -> HashMap<String, UtilStats> {
        self.models.iter().map(|(name, m)| (name.clone(), m.stats())).collect()
    }

    /// Perform one chat-completion request against this deployment,
    /// updating the target model's counters before and after the upstream
    /// call.
    pub async fn create(
        &self,
        mut request: ChatCompletionRequest,
    ) -> Result<CreateResponse, SwitchboardError> {
        let model_name = request.model.clone();
        let model = self.models.get(&model_name).ok_or_else(|| {
            SwitchboardError::ConfigError(format!("Model {model_name} not configured for deployment {}", self.name))
        })?;

        // Preflight: reserve capacity before issuing the call so concurrent
        // selectors see this request's load immediately.
        let preflight = estimate_tokens(&request.messages) as i64;
        model.spend_tokens(preflight);
        model.spend_request();

        if request.timeout_seconds.is_none() {
            request.timeout_seconds = Some(self.config.timeout_seconds as f64);
        }

        if request.stream {
            if request.stream_options.is_none() {
                request.stream_options = Some(StreamOptions::default());
            }
            tracing::debug!(deployment = %self.name, model = %model_name, "creating streaming completion");
            match self.upstream.stream(request).await {
                Ok(chunks) => Ok(CreateResponse::Stream(StreamWrapper::new(
                    chunks,
                    model.clone(),
                    self.name.clone(),
                    preflight,
                ))),
                Err(err) => Err(classify(&err, model, &self.name)),
            }
        } else {
            tracing::debug!(deployment = %self.name, model = %model_name, "creating completion");
            match self.upstream.complete(request).await {
                Ok(response) => {
                    if let Some(usage) = response.usage {
                        model.spend_tokens(usage.total_tokens as i64 - preflight);
                    }
                    Ok(CreateResponse::Response(response))
                }
                Err(err) => Err(classify(&err, model, &self.name)),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ModelLimits;
    use crate::types::{ChatMessage, MessageContent, MessageRole, Usage};
    use crate::upstream::{ChunkStream, UpstreamError};
    use async_trait::async_trait;
    use std::sync::Mutex;

    struct MockUpstream {
        response: Mutex<Option<Result<ChatCompletionResponse, UpstreamError>>>,
    }

    #[async_trait]
    impl Upstream for MockUpstream {
        async fn complete(
            &self,
            _request: ChatCompletionRequest,
        ) -> Result<ChatCompletionResponse, UpstreamError> {
            self.response
                .lock()
                .unwrap()
                .take()
                .expect("mock upstream called more times than configured")
        }

        async fn stream(&self, _request: ChatCompletionRequest) -> Result<ChunkStream, UpstreamError> {
            unimplemented!("not used in these tests")
        }
    }

    fn deployment(response: Result<ChatCompletionResponse, UpstreamError>) -> Deployment {
        let config = DeploymentConfig {
            name: "d1".into(),
            endpoint: None,
            api_key: None,
            api_version: None,
            timeout_seconds: 600,
            models: vec![ModelLimits {
                name: "gpt-4o".into(),
                tpm_limit: 1000,
                rpm_limit: 6,
                cooldown_seconds: 60,
            }],
        };
        let upstream = Arc::new(MockUpstream {
            response: Mutex::new(Some(response)),
        });
        Deployment::new(config, upstream).unwrap()
    }

    fn request() -> ChatCompletionRequest {
        ChatCompletionRequest {
            model: "gpt-4o".into(),
            messages: vec![ChatMessage {
                role: MessageRole::User,
                content: MessageContent::Text("x".repeat(120)), // 30-token preflight estimate
            }],
            stream: false,
            stream_options: None,
            timeout_seconds: None,
            extra: serde_json::Map::new(),
        }
    }

    #[tokio::test]
    async fn successful_completion_reconciles_exact_usage() {
        let d = deployment(Ok(ChatCompletionResponse {
            id: "r1".into(),
            model: "gpt-4o".into(),
            usage: Some(Usage {
                prompt_tokens: 20,
                completion_tokens: 10,
                total_tokens: 30,
            }),
        }));
        d.create(request()).await.unwrap();
        let stats = d.stats();
        let m = &stats["gpt-4o"];
        assert_eq!(m.tpm_usage, 30);
        assert_eq!(m.rpm_usage, 1);
    }

    #[tokio::test]
    async fn unknown_model_is_config_error_without_mutation() {
        let d = deployment(Ok(ChatCompletionResponse {
            id: "r1".into(),
            model: "gpt-4o".into(),
            usage: None,
        }));
        let mut req = request();
        req.model = "not-configured".into();
        let err = d.create(req).await.unwrap_err();
        assert!(matches!(err, SwitchboardError::ConfigError(_)));
        assert_eq!(d.stats()["gpt-4o"].rpm_usage, 0);
    }

    #[test]
    fn duplicate_model_in_config_is_config_error() {
        let config = DeploymentConfig {
            name: "d1".into(),
            endpoint: None,
            api_key: None,
            api_version: None,
            timeout_seconds: 600,
            models: vec![
                ModelLimits {
                    name: "gpt-4o".into(),
                    tpm_limit: 1000,
                    rpm_limit: 6,
                    cooldown_seconds: 60,
                },
                ModelLimits {
                    name: "gpt-4o".into(),
                    tpm_limit: 2000,
                    rpm_limit: 12,
                    cooldown_seconds: 60,
                },
            ],
        };
        let upstream = Arc::new(MockUpstream {
            response: Mutex::new(None),
        });
        let err = Deployment::new(config, upstream).unwrap_err();
        assert!(matches!(err, SwitchboardError::ConfigError(_)));
    }

    #[tokio::test]
    async fn rate_limit_marks_down() {
        let d = deployment(Err(UpstreamError::RateLimited("quota".into())));
        let err = d.create(request()).await.unwrap_err();
        assert!(matches!(err, SwitchboardError::RateLimited { .. }));
        assert!(!d.is_healthy("gpt-4o"));
    }

    #[tokio::test]
    async fn client_fault_does_not_mark_down() {
        let d = deployment(Err(UpstreamError::ClientFault("bad request".into())));
        let err = d.create(request()).await.unwrap_err();
        assert!(matches!(err, SwitchboardError::ClientFault { .. }));
        assert!(d.is_healthy("gpt-4o"));
    }

    #[tokio::test]
    async fn no_usage_record_leaves_preflight_estimate_as_charge() {
        let d = deployment(Ok(ChatCompletionResponse {
            id: "r1".into(),
            model: "gpt-4o".into(),
            usage: None,
        }));
        d.create(request()).await.unwrap();
        assert_eq!(d.stats()["gpt-4o"].tpm_usage, 30);
    }
}
