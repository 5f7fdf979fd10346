//! Degradation policy: when a remote call exhausts its retries, times out, or
//! returns an unusable shape, a deterministic local artifact is substituted so
//! the workflow can always complete. Fallback artifacts carry the `Fallback`
//! origin tag, which keeps them non-downloadable and lets the renderer switch
//! to CSS keyframe animation.

use serde_json::Value;

use workflow::{Artifact, Effect};

/// Fallback panel count: the original page duplicated into this many slots.
pub const PANEL_SLOTS: usize = 5;

/// Panel detection fallback: the uploaded page itself, padded to
/// [`PANEL_SLOTS`] entries.
pub fn panels(page: &Artifact) -> Vec<Artifact> {
    (0..PANEL_SLOTS)
        .map(|_| Artifact::fallback(page.uri.clone()))
        .collect()
}

/// Colorization fallback: the uncolorized panel passed through unchanged,
/// retagged so it remains distinguishable from a real result.
pub fn colorized(panel: &Artifact) -> Artifact {
    Artifact::fallback(panel.uri.clone())
}

/// Manual animation fallback: a placeholder reference encoding the effect
/// name, rendered client-side as a CSS keyframe animation.
pub fn manual_animation(effect: Effect) -> Artifact {
    Artifact::fallback(format!("offline://animation/{effect}"))
}

/// Animation-type vocabulary scanned in prompt text, in priority order.
const PROMPT_KEYWORDS: &[(&str, &[&str])] = &[
    ("zoom", &["zoom", "close", "closer", "magnify"]),
    ("pan", &["pan", "move", "slide", "shift"]),
    ("shake", &["shake", "vibrate", "tremble", "quake"]),
    ("fade", &["fade", "dissolve", "appear", "disappear"]),
];

/// Pick an animation type for an AI prompt by keyword scan; `zoom` if nothing
/// matches.
pub fn animation_kind_for_prompt(prompt: &str) -> &'static str {
    let words: Vec<String> = prompt
        .to_lowercase()
        .split_whitespace()
        .map(|w| w.trim_matches(|c: char| !c.is_alphanumeric()).to_string())
        .collect();
    for (kind, keywords) in PROMPT_KEYWORDS {
        if words.iter().any(|w| keywords.contains(&w.as_str())) {
            return kind;
        }
    }
    "zoom"
}

/// AI animation fallback: placeholder tagged by the prompt's vocabulary.
pub fn ai_animation(prompt: &str) -> Artifact {
    Artifact::fallback(format!(
        "offline://animation/{}",
        animation_kind_for_prompt(prompt)
    ))
}

/// Result of a merge request: a single merged file, or the preview-mode
/// fallback carrying the ordered clip list and settings.
#[derive(Debug, Clone)]
pub enum MergeOutcome {
    Merged { file_url: String, file_name: String },
    Preview { videos: Vec<String>, settings: Value },
}

impl MergeOutcome {
    pub fn is_preview(&self) -> bool {
        matches!(self, Self::Preview { .. })
    }
}

/// Merge fallback: keep the clips individually playable in order.
pub fn merge(videos: &[String], settings: &Value) -> MergeOutcome {
    MergeOutcome::Preview {
        videos: videos.to_vec(),
        settings: settings.clone(),
    }
}
