use std::time::Duration;

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use serde_json::Value;

use workflow::{AiModel, Effect};

use crate::{
    normalize::{normalize, parse_task_status, Normalized},
    AiStart, GatewayConfig, GatewayError, InferenceApi, MergedVideo, RequestGuard, TaskHandle,
    TaskStatus,
};

/// Outer per-request budget; individual operations apply tighter limits.
const OUTER_BUDGET: Duration = Duration::from_secs(600);
const STATUS_CHECK_TIMEOUT: Duration = Duration::from_secs(30);

/// HTTP implementation of [`InferenceApi`] over the external inference
/// services. Requests are multipart forms; responses go through the shape
/// normalizer before anything reaches a caller.
pub struct HttpGateway {
    client: reqwest::Client,
    config: GatewayConfig,
    guard: RequestGuard,
}

impl HttpGateway {
    pub fn new(config: GatewayConfig) -> Result<Self, GatewayError> {
        let client = reqwest::Client::builder().timeout(OUTER_BUDGET).build()?;
        Ok(Self {
            client,
            config,
            guard: RequestGuard::new(),
        })
    }

    pub fn guard(&self) -> &RequestGuard {
        &self.guard
    }

    fn manual_endpoint(&self, effect: Effect) -> Result<String, GatewayError> {
        let path = match effect {
            Effect::Zoom => "manual_zoom/",
            Effect::Reveal => "manual_reveal/",
            Effect::Shake => "manual_shake/",
            Effect::Ai => return Err(GatewayError::UnsupportedEffect(effect)),
        };
        Ok(format!("{}{path}", self.config.manual_base))
    }

    fn ai_endpoint(&self, model: AiModel) -> &str {
        match model {
            AiModel::Vidu => &self.config.vidu_endpoint,
            AiModel::Wan => &self.config.wan_endpoint,
            // CogVideoX is served through the VIDU task endpoint.
            AiModel::Cogvideox => &self.config.vidu_endpoint,
        }
    }

    fn image_part(image: Vec<u8>, file_name: &str) -> Result<Part, GatewayError> {
        Ok(Part::bytes(image)
            .file_name(file_name.to_string())
            .mime_str("image/png")?)
    }

    /// POST a multipart form and decode the JSON body, treating an elapsed
    /// deadline as a failure rather than "unknown".
    async fn post_form(
        &self,
        url: &str,
        form: Form,
        deadline: Duration,
    ) -> Result<Value, GatewayError> {
        let send = async {
            let response = self.client.post(url).multipart(form).send().await?;
            if !response.status().is_success() {
                return Err(GatewayError::Transport(format!(
                    "API responded with status: {}",
                    response.status()
                )));
            }
            Ok(response.json::<Value>().await?)
        };
        tokio::time::timeout(deadline, send)
            .await
            .map_err(|_| GatewayError::Timeout(deadline))?
    }

    async fn detect_panels_inner(
        &self,
        image: Vec<u8>,
        token: &str,
    ) -> Result<Vec<String>, GatewayError> {
        let form = Form::new()
            .part("file", Self::image_part(image, "manga_page.jpg")?)
            .text("timestamp", token.to_string());
        let body = self
            .post_form(&self.config.panel_endpoint, form, self.config.panel_timeout)
            .await?;
        match normalize(&body)? {
            Normalized::Panels(panels) => Ok(panels),
            _ => Err(GatewayError::NoArtifact),
        }
    }

    async fn colorize_inner(&self, image: Vec<u8>, token: &str) -> Result<String, GatewayError> {
        let mut last_err = GatewayError::NoArtifact;
        for attempt in 1..=self.config.colorize_retries {
            let form = Form::new()
                .part("file", Self::image_part(image.clone(), "panel.jpg")?)
                .text("timestamp", token.to_string());
            let result = self
                .post_form(
                    &self.config.colorize_endpoint,
                    form,
                    self.config.colorize_timeout,
                )
                .await
                .and_then(|body| match normalize(&body)? {
                    Normalized::Colorized(image) => Ok(image),
                    _ => Err(GatewayError::NoArtifact),
                });
            match result {
                Ok(image) => return Ok(image),
                Err(err) => {
                    log::warn!("colorize attempt {attempt} failed: {err}");
                    last_err = err;
                    if attempt < self.config.colorize_retries {
                        tokio::time::sleep(self.config.retry_backoff).await;
                    }
                }
            }
        }
        log::error!(
            "colorize failed after {} attempts: {last_err}",
            self.config.colorize_retries
        );
        Err(last_err)
    }

    async fn animate_manual_inner(
        &self,
        image: Vec<u8>,
        effect: Effect,
        token: &str,
    ) -> Result<String, GatewayError> {
        let endpoint = self.manual_endpoint(effect)?;
        let form = Form::new()
            .part("file", Self::image_part(image, "colorized_panel.png")?)
            .text("effect", effect.as_str())
            .text("timestamp", token.to_string());
        let body = self
            .post_form(&endpoint, form, self.config.manual_timeout)
            .await?;
        match normalize(&body)? {
            Normalized::Video(url) | Normalized::File { url, .. } => Ok(url),
            _ => Err(GatewayError::NoArtifact),
        }
    }

    async fn animate_ai_start_inner(
        &self,
        image: Vec<u8>,
        prompt: &str,
        model: AiModel,
        token: &str,
    ) -> Result<AiStart, GatewayError> {
        let endpoint = self.ai_endpoint(model).to_string();
        let form = Form::new()
            .part("file", Self::image_part(image, "panel.png")?)
            .text("prompt", prompt.to_string())
            .text("model", model.to_string())
            .text("timestamp", token.to_string());
        let body = self
            .post_form(&endpoint, form, self.config.task_start_timeout)
            .await?;
        match normalize(&body)? {
            Normalized::Task { id, status_url } => Ok(AiStart::Task(TaskHandle {
                id,
                status_url: join_status_url(&endpoint, &status_url),
                model,
            })),
            Normalized::Video(url) | Normalized::File { url, .. } => Ok(AiStart::Video(url)),
            _ => Err(GatewayError::NoArtifact),
        }
    }
}

/// Status URLs may come back relative to the animation host.
fn join_status_url(endpoint: &str, status_url: &str) -> String {
    if status_url.starts_with("http://") || status_url.starts_with("https://") {
        return status_url.to_string();
    }
    let origin = endpoint
        .find("://")
        .and_then(|scheme_end| {
            endpoint[scheme_end + 3..]
                .find('/')
                .map(|path_start| &endpoint[..scheme_end + 3 + path_start])
        })
        .unwrap_or(endpoint);
    format!("{}{}", origin, status_url)
}

#[async_trait]
impl InferenceApi for HttpGateway {
    async fn detect_panels(
        &self,
        image: Vec<u8>,
        token: &str,
    ) -> Result<Vec<String>, GatewayError> {
        let guard_token = format!("detect-panels-{token}");
        if !self.guard.try_acquire(&guard_token) {
            return Err(GatewayError::InProgress);
        }
        let result = self.detect_panels_inner(image, token).await;
        self.guard.release(&guard_token);
        result
    }

    async fn colorize(&self, image: Vec<u8>, token: &str) -> Result<String, GatewayError> {
        let guard_token = format!("colorize-{token}");
        if !self.guard.try_acquire(&guard_token) {
            return Err(GatewayError::InProgress);
        }
        let result = self.colorize_inner(image, token).await;
        self.guard.release(&guard_token);
        result
    }

    async fn animate_manual(
        &self,
        image: Vec<u8>,
        effect: Effect,
        token: &str,
    ) -> Result<String, GatewayError> {
        let guard_token = format!("manual-{effect}-{token}");
        if !self.guard.try_acquire(&guard_token) {
            return Err(GatewayError::InProgress);
        }
        let result = self.animate_manual_inner(image, effect, token).await;
        self.guard.release(&guard_token);
        result
    }

    async fn animate_ai_start(
        &self,
        image: Vec<u8>,
        prompt: &str,
        model: AiModel,
        token: &str,
    ) -> Result<AiStart, GatewayError> {
        let guard_token = format!("{model}-{token}");
        if !self.guard.try_acquire(&guard_token) {
            return Err(GatewayError::InProgress);
        }
        let result = self.animate_ai_start_inner(image, prompt, model, token).await;
        self.guard.release(&guard_token);
        result
    }

    async fn check_task_status(&self, status_url: &str) -> Result<TaskStatus, GatewayError> {
        let send = async {
            let response = self.client.get(status_url).send().await?;
            if !response.status().is_success() {
                return Err(GatewayError::Transport(format!(
                    "status API responded with status: {}",
                    response.status()
                )));
            }
            Ok(response.json::<Value>().await?)
        };
        let body = tokio::time::timeout(STATUS_CHECK_TIMEOUT, send)
            .await
            .map_err(|_| GatewayError::Timeout(STATUS_CHECK_TIMEOUT))??;
        Ok(parse_task_status(&body))
    }

    async fn merge_videos(
        &self,
        videos: &[String],
        music: Option<&str>,
        settings: &Value,
    ) -> Result<MergedVideo, GatewayError> {
        let payload = serde_json::json!({
            "videos": videos,
            "music": music,
            "settings": settings,
        });
        let json_part = Part::bytes(payload.to_string().into_bytes())
            .file_name("videos.json")
            .mime_str("application/json")?;
        let form = Form::new().part("file", json_part);
        let body = self
            .post_form(&self.config.merge_endpoint, form, self.config.merge_timeout)
            .await?;
        match normalize(&body)? {
            Normalized::File { url, name } => Ok(MergedVideo {
                file_url: url,
                file_name: name.unwrap_or_else(|| "anime-video.mp4".to_string()),
            }),
            Normalized::Video(url) => Ok(MergedVideo {
                file_url: url,
                file_name: "anime-video.mp4".to_string(),
            }),
            _ => Err(GatewayError::NoArtifact),
        }
    }

    async fn fetch_image(&self, url: &str) -> Result<Vec<u8>, GatewayError> {
        let response = self.client.get(url).send().await?;
        if !response.status().is_success() {
            return Err(GatewayError::Transport(format!(
                "failed to fetch image: {}",
                response.status()
            )));
        }
        Ok(response.bytes().await?.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_join_status_url() {
        assert_eq!(
            join_status_url("http://host:8300/vidu_animate/", "/status/t-1"),
            "http://host:8300/status/t-1"
        );
        assert_eq!(
            join_status_url("http://host:8300/vidu_animate/", "https://other/status/t-1"),
            "https://other/status/t-1"
        );
    }

    #[tokio::test]
    async fn test_duplicate_inflight_token_gets_in_progress() {
        let gateway = HttpGateway::new(GatewayConfig::default()).unwrap();
        // Simulate an outstanding colorize call with the same client token.
        assert!(gateway.guard().try_acquire("colorize-1700000000000"));

        let err = gateway
            .colorize(vec![1, 2, 3], "1700000000000")
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::InProgress));
    }

    #[test]
    fn test_manual_endpoint_rejects_ai_effect() {
        let gateway = HttpGateway::new(GatewayConfig::default()).unwrap();
        assert!(matches!(
            gateway.manual_endpoint(Effect::Ai),
            Err(GatewayError::UnsupportedEffect(Effect::Ai))
        ));
        assert_eq!(
            gateway.manual_endpoint(Effect::Shake).unwrap(),
            "http://localhost:8301/manual_shake/"
        );
    }
}
