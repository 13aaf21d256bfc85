//! # litellm-router
//!
//! A client-side load balancer and failover router for LLM chat-completion
//! deployments that are functionally interchangeable but individually
//! capacity-constrained by per-minute token (TPM) and per-minute request
//! (RPM) quotas.
//!
//! A caller submits a chat-completion request naming a model; [`Switchboard`]
//! selects one healthy backend [`Deployment`] serving that model, forwards
//! the request through the caller-supplied [`Upstream`], records resource
//! consumption, and returns either a completed response or a streamed
//! sequence of chunks. If the chosen backend fails in a way that is not
//! intrinsic to the request, the router transparently retries on a
//! different backend.
//!
//! This crate implements the selection-accounting-failover engine only. The
//! upstream HTTP client, configuration parsing, and a process entry point
//! are left to the caller — `Upstream` is the one trait boundary this crate
//! consumes without implementing.
//!
//! ## Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use litellm_router::{
//!     config::{DeploymentConfig, ModelLimits},
//!     switchboard::{DeploymentSpec, SwitchboardOptions},
//!     Switchboard,
//! };
//!
//! # async fn run(my_upstream: Arc<dyn litellm_router::Upstream>) -> Result<(), litellm_router::SwitchboardError> {
//! let spec = DeploymentSpec {
//!     config: DeploymentConfig {
//!         name: "primary".into(),
//!         endpoint: Some("https://example.invalid".into()),
//!         api_key: None,
//!         api_version: None,
//!         timeout_seconds: 600,
//!         models: vec![ModelLimits {
//!             name: "gpt-4o".into(),
//!             tpm_limit: 100_000,
//!             rpm_limit: 600,
//!             cooldown_seconds: 60,
//!         }],
//!     },
//!     upstream: my_upstream,
//! };
//!
//! let switchboard = Arc::new(Switchboard::new(vec![spec], SwitchboardOptions::default())?);
//! switchboard.start();
//! # Ok(())
//! # }
//! ```

#![warn(clippy::all)]

pub mod config;
pub mod deployment;
pub mod error;
pub mod model_state;
pub mod selector;
pub mod session_map;
pub mod stream;
pub mod switchboard;
pub mod types;
pub mod upstream;

pub use deployment::{CreateResponse, Deployment};
pub use error::{ErrorKind, Result, SwitchboardError};
pub use model_state::{ModelState, UtilStats};
pub use selector::{P2CSelector, Selector};
pub use session_map::SessionMap;
pub use stream::StreamWrapper;
pub use switchboard::{DeploymentSpec, Switchboard, SwitchboardOptions};
pub use upstream::{ChunkStream, Upstream, UpstreamError};
