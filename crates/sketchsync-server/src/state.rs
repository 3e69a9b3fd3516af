//! Shared server state.

use sketchsync_core::SceneStore;

use crate::config::ServerConfig;
use crate::registry::ConnectionRegistry;

/// State shared by every connection task.
///
/// Lock order is registry, then scene. The scene lock is only ever taken
/// briefly and never across I/O.
#[derive(Debug)]
pub struct AppState {
    pub scene: SceneStore,
    pub registry: ConnectionRegistry,
    pub config: ServerConfig,
}

impl AppState {
    pub fn new(config: ServerConfig) -> Self {
        Self {
            scene: SceneStore::new(),
            registry: ConnectionRegistry::new(),
            config,
        }
    }

    /// The current scene as canonical `add` lines, ascending by id.
    pub fn snapshot_lines(&self) -> Vec<String> {
        self.scene
            .snapshot()
            .iter()
            .map(|(id, shape)| shape.encode(Some(*id)))
            .collect()
    }
}
