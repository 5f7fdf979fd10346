//! Client-local persistence: the Project list and the MusicTrack list, each
//! serialized as JSON under a dedicated key. State is read once at startup
//! and written back after every mutation; last writer wins. A file that
//! fails to parse is logged and replaced by the in-memory default — loading
//! never crashes the application.

use std::fs;
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::Serialize;
use thiserror::Error;

use workflow::{MusicTrack, Project};

const PROJECTS_KEY: &str = "projects";
const MUSIC_TRACKS_KEY: &str = "music_tracks";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
    #[error("project not found: {0}")]
    ProjectNotFound(String),
}

pub fn default_data_dir() -> PathBuf {
    let base = dirs::data_local_dir().unwrap_or_else(std::env::temp_dir);
    base.join("mangaflow")
}

/// Key-value JSON storage rooted at a directory; one `<key>.json` per key.
#[derive(Debug, Clone)]
pub struct KvStore {
    root: PathBuf,
}

impl KvStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn key_path(&self, key: &str) -> PathBuf {
        self.root.join(format!("{key}.json"))
    }

    /// Load a key, falling back to the default on a missing or unreadable
    /// value. Parse failures are logged, never propagated.
    pub fn load_or_default<T: DeserializeOwned + Default>(&self, key: &str) -> T {
        let path = self.key_path(key);
        let raw = match fs::read_to_string(&path) {
            Ok(raw) => raw,
            Err(err) => {
                if path.exists() {
                    log::warn!("failed to read {}: {err}", path.display());
                }
                return T::default();
            }
        };
        match serde_json::from_str(&raw) {
            Ok(value) => value,
            Err(err) => {
                log::warn!(
                    "failed to parse {}: {err}; keeping default state",
                    path.display()
                );
                T::default()
            }
        }
    }

    pub fn save<T: Serialize>(&self, key: &str, value: &T) -> Result<(), StoreError> {
        fs::create_dir_all(&self.root)?;
        let json = serde_json::to_string_pretty(value)?;
        fs::write(self.key_path(key), json)?;
        Ok(())
    }
}

/// In-memory working set backed by a [`KvStore`]. Every mutating call writes
/// the affected list back immediately.
pub struct Library {
    store: KvStore,
    projects: Vec<Project>,
    tracks: Vec<MusicTrack>,
}

impl Library {
    pub fn open(root: impl AsRef<Path>) -> Self {
        let store = KvStore::new(root.as_ref());
        let projects = store.load_or_default(PROJECTS_KEY);
        let tracks = store.load_or_default(MUSIC_TRACKS_KEY);
        Self {
            store,
            projects,
            tracks,
        }
    }

    pub fn projects(&self) -> &[Project] {
        &self.projects
    }

    pub fn get_project(&self, id: &str) -> Option<&Project> {
        self.projects.iter().find(|p| p.id == id)
    }

    pub fn get_project_mut(&mut self, id: &str) -> Option<&mut Project> {
        self.projects.iter_mut().find(|p| p.id == id)
    }

    /// Insert or replace by id, then persist.
    pub fn upsert_project(&mut self, project: Project) -> Result<(), StoreError> {
        match self.projects.iter_mut().find(|p| p.id == project.id) {
            Some(existing) => *existing = project,
            None => self.projects.push(project),
        }
        self.store.save(PROJECTS_KEY, &self.projects)
    }

    pub fn delete_project(&mut self, id: &str) -> Result<(), StoreError> {
        let before = self.projects.len();
        self.projects.retain(|p| p.id != id);
        if self.projects.len() == before {
            return Err(StoreError::ProjectNotFound(id.to_string()));
        }
        self.store.save(PROJECTS_KEY, &self.projects)
    }

    /// Persist the current state of a project already mutated in place.
    pub fn persist(&self) -> Result<(), StoreError> {
        self.store.save(PROJECTS_KEY, &self.projects)
    }

    pub fn tracks(&self) -> &[MusicTrack] {
        &self.tracks
    }

    pub fn get_track(&self, id: &str) -> Option<&MusicTrack> {
        self.tracks.iter().find(|t| t.id == id)
    }

    pub fn add_track(&mut self, track: MusicTrack) -> Result<(), StoreError> {
        self.tracks.push(track);
        self.store.save(MUSIC_TRACKS_KEY, &self.tracks)
    }

    pub fn remove_track(&mut self, id: &str) -> Result<(), StoreError> {
        self.tracks.retain(|t| t.id != id);
        self.store.save(MUSIC_TRACKS_KEY, &self.tracks)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use workflow::{advance, Artifact, StageArtifact, Step};

    #[test]
    fn test_roundtrip_projects_and_tracks() {
        let dir = tempfile::tempdir().unwrap();
        {
            let mut library = Library::open(dir.path());
            let mut project = Project::new("Page 1");
            advance(
                &mut project,
                StageArtifact::Image(Artifact::local("data:image/png;base64,PAGE")),
            )
            .unwrap();
            library.upsert_project(project).unwrap();
            library
                .add_track(MusicTrack::new("Battle Theme", "https://cdn.example/battle.mp3"))
                .unwrap();
        }

        let library = Library::open(dir.path());
        assert_eq!(library.projects().len(), 1);
        assert_eq!(library.projects()[0].current_step, Step::Crop);
        assert!(library.projects()[0].image.is_some());
        assert_eq!(library.tracks().len(), 1);
        assert_eq!(library.tracks()[0].name, "Battle Theme");
    }

    #[test]
    fn test_corrupt_file_keeps_default_state() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path()).unwrap();
        std::fs::write(dir.path().join("projects.json"), "{not json").unwrap();

        let library = Library::open(dir.path());
        assert!(library.projects().is_empty());
    }

    #[test]
    fn test_missing_dir_loads_empty() {
        let dir = tempfile::tempdir().unwrap();
        let library = Library::open(dir.path().join("never-written"));
        assert!(library.projects().is_empty());
        assert!(library.tracks().is_empty());
    }

    #[test]
    fn test_delete_project() {
        let dir = tempfile::tempdir().unwrap();
        let mut library = Library::open(dir.path());
        let project = Project::new("Page 1");
        let id = project.id.clone();
        library.upsert_project(project).unwrap();

        library.delete_project(&id).unwrap();
        assert!(library.projects().is_empty());
        assert!(matches!(
            library.delete_project(&id),
            Err(StoreError::ProjectNotFound(_))
        ));
    }

    #[test]
    fn test_upsert_replaces_by_id() {
        let dir = tempfile::tempdir().unwrap();
        let mut library = Library::open(dir.path());
        let mut project = Project::new("Page 1");
        let id = project.id.clone();
        library.upsert_project(project.clone()).unwrap();

        project.name = "Renamed".to_string();
        library.upsert_project(project).unwrap();
        assert_eq!(library.projects().len(), 1);
        assert_eq!(library.get_project(&id).unwrap().name, "Renamed");
    }
}
