use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{AiModel, Artifact, Effect, Step, WorkflowError};

/// Per-clip generation parameters. Manual effects carry at least `video_url`;
/// AI clips additionally carry the prompt and model. Unknown keys round-trip
/// through `extra`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AnimationSettings {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub video_url: Option<Artifact>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prompt: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<AiModel>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// A saved animation clip. Owned exclusively by its parent project; created
/// when a generation action succeeds (or a fallback is substituted) and the
/// user saves, destroyed only by explicit deletion.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Animation {
    pub id: String,
    pub image: Artifact,
    pub effect: Effect,
    pub settings: AnimationSettings,
    pub created_at: DateTime<Utc>,
}

impl Animation {
    pub fn new(image: Artifact, effect: Effect, settings: AnimationSettings) -> Self {
        Self {
            id: format!("anim-{}", Uuid::new_v4()),
            image,
            effect,
            settings,
            created_at: Utc::now(),
        }
    }
}

/// A background music track in the shared library.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MusicTrack {
    pub id: String,
    pub name: String,
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub artist: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub genre: Option<String>,
}

impl MusicTrack {
    pub fn new(name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            name: name.into(),
            url: url.into(),
            artist: None,
            genre: None,
        }
    }
}

/// One manga page worked through the upload → crop → colorize → animate
/// pipeline. Artifact fields form a dependency chain: each may only be
/// populated while everything upstream of it is.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Project {
    pub id: String,
    pub name: String,
    pub current_step: Step,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<Artifact>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub panels: Vec<Artifact>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selected_panel: Option<Artifact>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub colorized_panel: Option<Artifact>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub animations: Vec<Animation>,
}

impl Project {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            name: name.into(),
            current_step: Step::Upload,
            image: None,
            panels: Vec::new(),
            selected_panel: None,
            colorized_panel: None,
            animations: Vec::new(),
        }
    }

    pub fn add_animation(&mut self, animation: Animation) {
        self.animations.push(animation);
    }

    pub fn remove_animation(&mut self, animation_id: &str) -> bool {
        let before = self.animations.len();
        self.animations.retain(|a| a.id != animation_id);
        self.animations.len() != before
    }

    /// colorized ⟹ selected ⟹ panels non-empty ⟹ image present.
    pub fn check_invariants(&self) -> Result<(), WorkflowError> {
        if self.colorized_panel.is_some() && self.selected_panel.is_none() {
            return Err(WorkflowError::InvariantViolated(
                "colorized_panel set without selected_panel",
            ));
        }
        if self.selected_panel.is_some() && self.panels.is_empty() {
            return Err(WorkflowError::InvariantViolated(
                "selected_panel set without panels",
            ));
        }
        if !self.panels.is_empty() && self.image.is_none() {
            return Err(WorkflowError::InvariantViolated(
                "panels present without image",
            ));
        }
        Ok(())
    }
}
