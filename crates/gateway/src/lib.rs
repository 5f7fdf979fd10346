//! Proxy layer for the remote inference services: panel detection,
//! colorization, manual and AI animation, and clip merging. Each operation
//! normalizes the upstream response shape, enforces a timeout, and maps every
//! failure into [`GatewayError`] so callers can substitute fallbacks.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use workflow::{AiModel, Effect};

pub mod fallback;
mod guard;
pub use guard::RequestGuard;
mod http;
pub use http::HttpGateway;
mod normalize;
pub use normalize::{ensure_data_uri, normalize, parse_task_status, Normalized};
mod poller;
pub use poller::{poll_task, PollConfig, PollSuccess};

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("transport error: {0}")]
    Transport(String),
    #[error("request timed out after {0:?}")]
    Timeout(Duration),
    #[error("no usable artifact in response")]
    NoArtifact,
    #[error("task failed: {0}")]
    TaskFailed(String),
    #[error("task timed out after {checks} status checks")]
    TaskTimeout { checks: u32 },
    #[error("request already in progress")]
    InProgress,
    #[error("effect {0} has no manual animation endpoint")]
    UnsupportedEffect(Effect),
}

impl From<reqwest::Error> for GatewayError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            // reqwest does not expose the configured duration here.
            GatewayError::Timeout(Duration::ZERO)
        } else {
            GatewayError::Transport(err.to_string())
        }
    }
}

/// An asynchronous animation job created on the remote service. Ephemeral:
/// held only while the poller drives it to a terminal state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskHandle {
    pub id: String,
    pub status_url: String,
    pub model: AiModel,
}

/// Remote task state as reported by a status check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskStatus {
    Pending,
    Running,
    /// Terminal success; carries the video URL if the result included one.
    Done(Option<String>),
    /// Terminal failure reported by the service itself.
    Failed(String),
}

/// Outcome of starting an AI animation: either an async task to poll (VIDU)
/// or an immediately available video (WAN-style synchronous models).
#[derive(Debug, Clone)]
pub enum AiStart {
    Task(TaskHandle),
    Video(String),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MergedVideo {
    pub file_url: String,
    pub file_name: String,
}

/// Endpoint URLs and budgets for the proxied services. Defaults follow the
/// deployed service contracts: 2 min for panel detection, 3 min for manual
/// animation, 5 min for colorization and task initiation.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub panel_endpoint: String,
    pub colorize_endpoint: String,
    /// Base for the per-effect manual endpoints (`manual_zoom/` etc.).
    pub manual_base: String,
    pub vidu_endpoint: String,
    pub wan_endpoint: String,
    pub merge_endpoint: String,

    pub panel_timeout: Duration,
    pub colorize_timeout: Duration,
    pub manual_timeout: Duration,
    pub task_start_timeout: Duration,
    pub merge_timeout: Duration,

    pub colorize_retries: u32,
    pub retry_backoff: Duration,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            panel_endpoint: "http://localhost:8300/crop_panels/".into(),
            colorize_endpoint: "http://localhost:8301/colorize/".into(),
            manual_base: "http://localhost:8301/".into(),
            vidu_endpoint: "http://localhost:8300/vidu_animate/".into(),
            wan_endpoint: "http://localhost:8300/wan_animate/".into(),
            merge_endpoint: "http://localhost:8301/create_anime/".into(),
            panel_timeout: Duration::from_secs(120),
            colorize_timeout: Duration::from_secs(300),
            manual_timeout: Duration::from_secs(180),
            task_start_timeout: Duration::from_secs(300),
            merge_timeout: Duration::from_secs(300),
            colorize_retries: 3,
            retry_backoff: Duration::from_secs(5),
        }
    }
}

impl GatewayConfig {
    pub fn with_panel_endpoint(mut self, url: impl Into<String>) -> Self {
        self.panel_endpoint = url.into();
        self
    }

    pub fn with_colorize_endpoint(mut self, url: impl Into<String>) -> Self {
        self.colorize_endpoint = url.into();
        self
    }

    pub fn with_manual_base(mut self, url: impl Into<String>) -> Self {
        self.manual_base = url.into();
        self
    }

    pub fn with_animation_endpoints(
        mut self,
        vidu: impl Into<String>,
        wan: impl Into<String>,
    ) -> Self {
        self.vidu_endpoint = vidu.into();
        self.wan_endpoint = wan.into();
        self
    }

    pub fn with_merge_endpoint(mut self, url: impl Into<String>) -> Self {
        self.merge_endpoint = url.into();
        self
    }

    pub fn with_retry_backoff(mut self, backoff: Duration) -> Self {
        self.retry_backoff = backoff;
        self
    }
}

/// Unified interface over the remote capabilities. The HTTP implementation
/// is [`HttpGateway`]; tests drive the engine with scripted implementations.
#[async_trait]
pub trait InferenceApi: Send + Sync {
    /// Panel detection over a page image. Returns panel data URIs or URLs.
    async fn detect_panels(&self, image: Vec<u8>, token: &str)
        -> Result<Vec<String>, GatewayError>;

    /// Colorize a panel. Returns a data URI. Retries transient failures.
    async fn colorize(&self, image: Vec<u8>, token: &str) -> Result<String, GatewayError>;

    /// Fixed-effect animation (zoom/reveal/shake). Returns a video URL.
    async fn animate_manual(
        &self,
        image: Vec<u8>,
        effect: Effect,
        token: &str,
    ) -> Result<String, GatewayError>;

    /// Start an AI animation. VIDU-style models return an async task; WAN-style
    /// models return the video directly.
    async fn animate_ai_start(
        &self,
        image: Vec<u8>,
        prompt: &str,
        model: AiModel,
        token: &str,
    ) -> Result<AiStart, GatewayError>;

    /// One status check against a task's status URL.
    async fn check_task_status(&self, status_url: &str) -> Result<TaskStatus, GatewayError>;

    /// Merge per-clip videos (plus optional music) into one file.
    async fn merge_videos(
        &self,
        videos: &[String],
        music: Option<&str>,
        settings: &serde_json::Value,
    ) -> Result<MergedVideo, GatewayError>;

    /// Same-origin image proxy: fetch raw bytes for a remote panel URL.
    async fn fetch_image(&self, url: &str) -> Result<Vec<u8>, GatewayError>;
}
