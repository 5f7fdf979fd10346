//! Orchestration layer: validates a stage transition against the workflow
//! state machine, issues the gateway call, drives async tasks through the
//! poller, substitutes fallback artifacts on failure, writes results back
//! into the project, and persists after every mutation.

use std::sync::Arc;

use base64::Engine as _;
use thiserror::Error;

use gateway::{fallback, poll_task, AiStart, GatewayError, InferenceApi, PollConfig};
use gateway::fallback::MergeOutcome;
use store::{Library, StoreError};
use workflow::{
    advance, blocked_steps, retreat, set_panels, AiModel, Animation, AnimationSettings, Artifact,
    ArtifactOrigin, Effect, MusicTrack, Project, StageArtifact, Step, WorkflowError,
};

#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Workflow(#[from] WorkflowError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("another request for this action is already in progress")]
    InProgress,
    #[error("project not found: {0}")]
    ProjectNotFound(String),
    #[error("cannot resolve artifact payload: {0}")]
    UnresolvableArtifact(String),
    #[error(transparent)]
    Gateway(GatewayError),
}

/// A stage result: the produced artifact plus a warning when the value is a
/// fallback substitution rather than a genuine remote result.
#[derive(Debug, Clone)]
pub struct StageOutcome<T> {
    pub value: T,
    pub warning: Option<String>,
}

impl<T> StageOutcome<T> {
    fn ok(value: T) -> Self {
        Self {
            value,
            warning: None,
        }
    }

    fn degraded(value: T, warning: String) -> Self {
        Self {
            value,
            warning: Some(warning),
        }
    }

    pub fn is_degraded(&self) -> bool {
        self.warning.is_some()
    }
}

pub struct Engine {
    api: Arc<dyn InferenceApi>,
    library: Library,
    poll: PollConfig,
}

impl Engine {
    pub fn new(api: Arc<dyn InferenceApi>, library: Library) -> Self {
        Self {
            api,
            library,
            poll: PollConfig::default(),
        }
    }

    pub fn with_poll_config(mut self, poll: PollConfig) -> Self {
        self.poll = poll;
        self
    }

    pub fn library(&self) -> &Library {
        &self.library
    }

    fn project(&self, id: &str) -> Result<&Project, EngineError> {
        self.library
            .get_project(id)
            .ok_or_else(|| EngineError::ProjectNotFound(id.to_string()))
    }

    fn project_mut(&mut self, id: &str) -> Result<&mut Project, EngineError> {
        self.library
            .get_project_mut(id)
            .ok_or_else(|| EngineError::ProjectNotFound(id.to_string()))
    }

    /// Precondition check: reject a stage action before any network call if
    /// its step is unreachable for this project.
    fn ensure_unblocked(project: &Project, step: Step) -> Result<(), EngineError> {
        if blocked_steps(project).contains(&step) {
            return Err(WorkflowError::StepBlocked {
                target: step,
                reason: "required upstream artifact is missing".into(),
            }
            .into());
        }
        Ok(())
    }

    /// Client-issued idempotency token; the gateway keys its in-flight guard
    /// on `(operation, token)`.
    fn request_token() -> String {
        chrono::Utc::now().timestamp_millis().to_string()
    }

    /// Resolve an artifact reference into raw image bytes: data URIs are
    /// decoded locally, http(s) URLs go through the image proxy.
    async fn artifact_bytes(&self, artifact: &Artifact) -> Result<Vec<u8>, EngineError> {
        if artifact.is_data_uri() {
            let b64 = artifact
                .uri
                .split_once(',')
                .map(|(_, data)| data)
                .ok_or_else(|| {
                    EngineError::UnresolvableArtifact("malformed data URI".to_string())
                })?;
            base64::engine::general_purpose::STANDARD
                .decode(b64)
                .map_err(|e| EngineError::UnresolvableArtifact(format!("bad base64 payload: {e}")))
        } else if artifact.is_http_url() {
            self.api
                .fetch_image(&artifact.uri)
                .await
                .map_err(EngineError::Gateway)
        } else {
            Err(EngineError::UnresolvableArtifact(format!(
                "no byte representation for {}",
                artifact.uri
            )))
        }
    }

    // --- project management -------------------------------------------------

    pub fn create_project(&mut self, name: &str) -> Result<Project, EngineError> {
        let project = Project::new(name);
        self.library.upsert_project(project.clone())?;
        Ok(project)
    }

    pub fn rename_project(&mut self, id: &str, name: &str) -> Result<(), EngineError> {
        self.project_mut(id)?.name = name.to_string();
        self.library.persist()?;
        Ok(())
    }

    pub fn delete_project(&mut self, id: &str) -> Result<(), EngineError> {
        self.library.delete_project(id)?;
        Ok(())
    }

    /// Move a project backward, cascade-clearing downstream artifacts.
    pub fn go_back(&mut self, id: &str, target: Step) -> Result<(), EngineError> {
        let project = self.project_mut(id)?;
        retreat(project, target)?;
        self.library.persist()?;
        Ok(())
    }

    // --- upload -------------------------------------------------------------

    /// Store the page image and enter the crop stage. Re-uploading over an
    /// existing page invalidates everything derived from it.
    pub fn upload_image(&mut self, id: &str, data_uri: String) -> Result<(), EngineError> {
        let project = self.project_mut(id)?;
        if project.current_step > Step::Upload {
            retreat(project, Step::Upload)?;
        }
        advance(project, StageArtifact::Image(Artifact::local(data_uri)))?;
        self.library.persist()?;
        Ok(())
    }

    // --- crop ---------------------------------------------------------------

    /// Run panel detection. On any remote failure the original page is
    /// substituted as the panels, padded to five slots.
    pub async fn detect_panels(
        &mut self,
        id: &str,
    ) -> Result<StageOutcome<Vec<Artifact>>, EngineError> {
        let project = self.project(id)?;
        Self::ensure_unblocked(project, Step::Crop)?;
        let page = project
            .image
            .clone()
            .ok_or(WorkflowError::StepBlocked {
                target: Step::Crop,
                reason: "no image uploaded".into(),
            })?;

        let bytes = self.artifact_bytes(&page).await?;
        let token = Self::request_token();
        let outcome = match self.api.detect_panels(bytes, &token).await {
            Ok(panels) => StageOutcome::ok(
                panels.into_iter().map(Artifact::remote).collect::<Vec<_>>(),
            ),
            Err(GatewayError::InProgress) => return Err(EngineError::InProgress),
            Err(err) => {
                log::warn!("panel detection failed, using page as panels: {err}");
                StageOutcome::degraded(
                    fallback::panels(&page),
                    format!("Panel detection unavailable ({err}); using the full page as panels."),
                )
            }
        };

        let project = self.project_mut(id)?;
        if project.current_step > Step::Crop {
            retreat(project, Step::Crop)?;
        }
        set_panels(project, outcome.value.clone())?;
        self.library.persist()?;
        Ok(outcome)
    }

    /// Choose one detected panel and enter the colorize stage.
    pub fn select_panel(&mut self, id: &str, index: usize) -> Result<(), EngineError> {
        let project = self.project_mut(id)?;
        let panel = project
            .panels
            .get(index)
            .cloned()
            .ok_or(WorkflowError::PanelOutOfRange(index))?;
        if project.current_step > Step::Crop {
            retreat(project, Step::Crop)?;
        }
        advance(project, StageArtifact::SelectedPanel(panel))?;
        self.library.persist()?;
        Ok(())
    }

    // --- colorize -----------------------------------------------------------

    /// Colorize the selected panel. Exhausted retries or an unusable response
    /// degrade to the original panel passed through unchanged.
    pub async fn colorize(&mut self, id: &str) -> Result<StageOutcome<Artifact>, EngineError> {
        let project = self.project(id)?;
        Self::ensure_unblocked(project, Step::Colorize)?;
        let panel = project
            .selected_panel
            .clone()
            .ok_or(WorkflowError::StepBlocked {
                target: Step::Colorize,
                reason: "no panel selected".into(),
            })?;

        let bytes = self.artifact_bytes(&panel).await?;
        let token = Self::request_token();
        let outcome = match self.api.colorize(bytes, &token).await {
            Ok(image) => StageOutcome::ok(Artifact::remote(image)),
            Err(GatewayError::InProgress) => return Err(EngineError::InProgress),
            Err(err) => {
                log::warn!("colorization failed, keeping original panel: {err}");
                StageOutcome::degraded(
                    fallback::colorized(&panel),
                    format!("Colorization unavailable ({err}); using the original panel."),
                )
            }
        };

        self.finish_colorize(id, outcome.value.clone())?;
        Ok(outcome)
    }

    /// Skip colorization: the selected panel is carried forward, tagged
    /// `Skipped` so it stays distinguishable from a fallback substitution.
    pub fn skip_colorize(&mut self, id: &str) -> Result<(), EngineError> {
        let project = self.project(id)?;
        Self::ensure_unblocked(project, Step::Colorize)?;
        let panel = project
            .selected_panel
            .clone()
            .ok_or(WorkflowError::StepBlocked {
                target: Step::Colorize,
                reason: "no panel selected".into(),
            })?;
        self.finish_colorize(id, panel.with_origin(ArtifactOrigin::Skipped))
    }

    fn finish_colorize(&mut self, id: &str, artifact: Artifact) -> Result<(), EngineError> {
        let project = self.project_mut(id)?;
        if project.current_step > Step::Colorize {
            retreat(project, Step::Colorize)?;
        }
        advance(project, StageArtifact::ColorizedPanel(artifact))?;
        self.library.persist()?;
        Ok(())
    }

    // --- animate ------------------------------------------------------------

    /// Generate a fixed-effect clip for the colorized panel. The animation is
    /// returned, not saved; call [`Engine::save_animation`] to keep it.
    pub async fn animate_manual(
        &mut self,
        id: &str,
        effect: Effect,
    ) -> Result<StageOutcome<Animation>, EngineError> {
        let project = self.project(id)?;
        Self::ensure_unblocked(project, Step::Animate)?;
        let panel = project
            .colorized_panel
            .clone()
            .ok_or(WorkflowError::StepBlocked {
                target: Step::Animate,
                reason: "no colorized panel".into(),
            })?;

        let bytes = self.artifact_bytes(&panel).await?;
        let token = Self::request_token();
        let (video, warning) = match self.api.animate_manual(bytes, effect, &token).await {
            Ok(url) => (Artifact::remote(url), None),
            Err(GatewayError::InProgress) => return Err(EngineError::InProgress),
            Err(err) => {
                log::warn!("manual animation failed, using CSS placeholder: {err}");
                (
                    fallback::manual_animation(effect),
                    Some(format!(
                        "Animation service unavailable ({err}); using a CSS {effect} fallback."
                    )),
                )
            }
        };

        let settings = AnimationSettings {
            video_url: Some(video),
            ..Default::default()
        };
        let animation = Animation::new(panel, effect, settings);
        Ok(match warning {
            None => StageOutcome::ok(animation),
            Some(w) => StageOutcome::degraded(animation, w),
        })
    }

    /// Generate an AI clip. Task-based models are driven through the poller;
    /// every failure path degrades to a placeholder tagged by the prompt's
    /// animation vocabulary.
    pub async fn animate_ai(
        &mut self,
        id: &str,
        prompt: &str,
        model: AiModel,
        mut progress: impl FnMut(u8, String),
    ) -> Result<StageOutcome<Animation>, EngineError> {
        let project = self.project(id)?;
        Self::ensure_unblocked(project, Step::Animate)?;
        let panel = project
            .colorized_panel
            .clone()
            .ok_or(WorkflowError::StepBlocked {
                target: Step::Animate,
                reason: "no colorized panel".into(),
            })?;

        let bytes = self.artifact_bytes(&panel).await?;
        let token = Self::request_token();
        let started = match self.api.animate_ai_start(bytes, prompt, model, &token).await {
            Ok(started) => Ok(started),
            Err(GatewayError::InProgress) => return Err(EngineError::InProgress),
            Err(err) => Err(err),
        };

        let result = match started {
            Ok(AiStart::Video(url)) => {
                progress(100, "Animation ready".to_string());
                Ok(url)
            }
            Ok(AiStart::Task(task)) => {
                progress(5, format!("Task created with ID: {}", task.id));
                let api = self.api.clone();
                let status_url = task.status_url.clone();
                poll_task(
                    &self.poll,
                    move || {
                        let api = api.clone();
                        let status_url = status_url.clone();
                        async move { api.check_task_status(&status_url).await }
                    },
                    &mut progress,
                )
                .await
                .map(|success| success.video_url)
            }
            Err(err) => Err(err),
        };

        let (video, warning) = match result {
            Ok(url) => (Artifact::remote(url), None),
            Err(err) => {
                log::warn!("AI animation failed, using prompt-tagged placeholder: {err}");
                (
                    fallback::ai_animation(prompt),
                    Some(format!(
                        "AI animation unavailable ({err}); using a fallback animation."
                    )),
                )
            }
        };

        let settings = AnimationSettings {
            video_url: Some(video),
            prompt: Some(prompt.to_string()),
            model: Some(model),
            ..Default::default()
        };
        let animation = Animation::new(panel, Effect::Ai, settings);
        Ok(match warning {
            None => StageOutcome::ok(animation),
            Some(w) => StageOutcome::degraded(animation, w),
        })
    }

    /// Attach a generated animation to its project's feed.
    pub fn save_animation(&mut self, id: &str, animation: Animation) -> Result<(), EngineError> {
        self.project_mut(id)?.add_animation(animation);
        self.library.persist()?;
        Ok(())
    }

    pub fn delete_animation(&mut self, id: &str, animation_id: &str) -> Result<bool, EngineError> {
        let removed = self.project_mut(id)?.remove_animation(animation_id);
        self.library.persist()?;
        Ok(removed)
    }

    // --- merge --------------------------------------------------------------

    /// Ordered clip references for a project's feed, for merging.
    pub fn clip_urls(&self, id: &str) -> Result<Vec<String>, EngineError> {
        Ok(self
            .project(id)?
            .animations
            .iter()
            .filter_map(|a| a.settings.video_url.as_ref())
            .map(|v| v.uri.clone())
            .collect())
    }

    /// Merge clips (plus optional music) into one video; on failure the
    /// result degrades to preview mode carrying the ordered clip list.
    pub async fn merge_videos(
        &mut self,
        videos: &[String],
        music: Option<&str>,
        settings: serde_json::Value,
    ) -> Result<StageOutcome<MergeOutcome>, EngineError> {
        match self.api.merge_videos(videos, music, &settings).await {
            Ok(merged) => Ok(StageOutcome::ok(MergeOutcome::Merged {
                file_url: merged.file_url,
                file_name: merged.file_name,
            })),
            Err(GatewayError::InProgress) => Err(EngineError::InProgress),
            Err(err) => {
                log::warn!("merge failed, falling back to preview mode: {err}");
                Ok(StageOutcome::degraded(
                    fallback::merge(videos, &settings),
                    format!("Merge service unavailable ({err}); using preview mode."),
                ))
            }
        }
    }

    // --- music library ------------------------------------------------------

    pub fn add_track(&mut self, track: MusicTrack) -> Result<(), EngineError> {
        self.library.add_track(track)?;
        Ok(())
    }

    pub fn remove_track(&mut self, id: &str) -> Result<(), EngineError> {
        self.library.remove_track(id)?;
        Ok(())
    }
}
