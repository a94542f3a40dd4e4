//! Collaborator seams owned by the embedding application

use anyhow::Result;

/// Source of the embedding application's scene snapshot
///
/// The scene text is gathered at submit time and injected into the request
/// payload as side-channel context. A headless embedder uses [`NullScene`].
pub trait SceneProvider: Send + Sync {
    fn scene_as_text(&self) -> Result<String>;
}

/// Scene provider for contexts without a scene (CLI, tests)
#[derive(Debug, Default)]
pub struct NullScene;

impl SceneProvider for NullScene {
    fn scene_as_text(&self) -> Result<String> {
        Ok(String::new())
    }
}
