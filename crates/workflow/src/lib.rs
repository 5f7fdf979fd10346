use serde::{Deserialize, Serialize};
use thiserror::Error;

mod artifact;
pub use artifact::*;
mod project;
pub use project::*;
mod steps;
pub use steps::*;

#[derive(Debug, Error)]
pub enum WorkflowError {
    #[error("step {target} is blocked: {reason}")]
    StepBlocked { target: Step, reason: String },
    #[error("invalid transition from {from} to {to}")]
    InvalidTransition { from: Step, to: Step },
    #[error("artifact kind {got} cannot complete step {step}")]
    ArtifactMismatch { step: Step, got: &'static str },
    #[error("panel index {0} out of range")]
    PanelOutOfRange(usize),
    #[error("project invariant violated: {0}")]
    InvariantViolated(&'static str),
}

/// AI video models reachable through the animation gateway.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AiModel {
    Vidu,
    Wan,
    Cogvideox,
}

impl std::fmt::Display for AiModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Vidu => write!(f, "vidu"),
            Self::Wan => write!(f, "wan"),
            Self::Cogvideox => write!(f, "cogvideox"),
        }
    }
}

/// Manual animation effects, plus the `Ai` tag used when a clip came from a
/// generative model rather than a fixed effect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Effect {
    Zoom,
    Shake,
    Reveal,
    Ai,
}

impl Effect {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Zoom => "zoom",
            Self::Shake => "shake",
            Self::Reveal => "reveal",
            Self::Ai => "ai",
        }
    }
}

impl std::fmt::Display for Effect {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
