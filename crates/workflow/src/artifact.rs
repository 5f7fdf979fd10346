use serde::{Deserialize, Serialize};

/// Where an artifact came from. Remote results are the only ones a user can
/// download; placeholders synthesized after a failed remote call are tagged
/// `Fallback`, and an explicitly skipped colorization is tagged `Skipped` so
/// the two identical-looking states stay distinguishable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactOrigin {
    /// Produced by a remote inference service.
    Remote,
    /// Supplied locally (e.g. the uploaded page image).
    Local,
    /// Substituted by the degradation policy after a remote failure.
    Fallback,
    /// Carried through unchanged because the user skipped the stage.
    Skipped,
}

/// A reference to a produced image or video: a data URI, an http(s) URL, or
/// an `offline://` placeholder for CSS-rendered fallback animations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Artifact {
    pub uri: String,
    pub origin: ArtifactOrigin,
}

impl Artifact {
    pub fn remote(uri: impl Into<String>) -> Self {
        Self {
            uri: uri.into(),
            origin: ArtifactOrigin::Remote,
        }
    }

    pub fn local(uri: impl Into<String>) -> Self {
        Self {
            uri: uri.into(),
            origin: ArtifactOrigin::Local,
        }
    }

    pub fn fallback(uri: impl Into<String>) -> Self {
        Self {
            uri: uri.into(),
            origin: ArtifactOrigin::Fallback,
        }
    }

    /// Reuse this artifact's data under a different origin tag.
    pub fn with_origin(&self, origin: ArtifactOrigin) -> Self {
        Self {
            uri: self.uri.clone(),
            origin,
        }
    }

    /// Only genuine remote results can be downloaded; local uploads and
    /// offline placeholders cannot.
    pub fn is_downloadable(&self) -> bool {
        self.origin == ArtifactOrigin::Remote
    }

    pub fn is_data_uri(&self) -> bool {
        self.uri.starts_with("data:")
    }

    pub fn is_http_url(&self) -> bool {
        self.uri.starts_with("http://") || self.uri.starts_with("https://")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_downloadable_only_for_remote() {
        assert!(Artifact::remote("https://cdn.example/clip.mp4").is_downloadable());
        assert!(!Artifact::local("data:image/png;base64,AAAA").is_downloadable());
        assert!(!Artifact::fallback("offline://animation/zoom").is_downloadable());
        let skipped = Artifact::remote("data:image/png;base64,AAAA")
            .with_origin(ArtifactOrigin::Skipped);
        assert!(!skipped.is_downloadable());
    }

    #[test]
    fn test_uri_kind_checks() {
        assert!(Artifact::local("data:image/png;base64,AAAA").is_data_uri());
        assert!(Artifact::remote("http://host/panel.png").is_http_url());
        assert!(!Artifact::fallback("offline://animation/pan").is_http_url());
    }
}
