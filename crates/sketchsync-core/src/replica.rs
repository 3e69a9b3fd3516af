//! Client-side mirror of the shared scene.
//!
//! A replica only ever changes by applying canonical lines received from the
//! server, including the echo of its own requests. Local edits are sent as
//! requests and show up once the server broadcasts them.

use log::debug;

use crate::protocol::{Command, decode};
use crate::scene::SceneStore;
use crate::shapes::{Rgb, Shape, ShapeId};

/// A shape picked for editing, carried together with its id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Editable {
    pub id: ShapeId,
    /// Local copy. Edits made through this handle only update the preview.
    pub shape: Shape,
}

impl Editable {
    /// Translate the preview and return the request to send.
    pub fn move_by(&mut self, dx: i32, dy: i32) -> Command {
        self.shape.translate(dx, dy);
        Command::move_by(self.id, dx, dy)
    }

    /// Recolor the preview and return the request to send.
    pub fn recolor(&mut self, color: Rgb) -> Command {
        self.shape.set_color(color);
        Command::recolor(self.id, color)
    }

    pub fn delete(&self) -> Command {
        Command::delete(self.id)
    }
}

/// Local copy of the scene built from broadcast lines.
#[derive(Debug, Default)]
pub struct SceneReplica {
    scene: SceneStore,
}

impl SceneReplica {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply one line from the server. Returns whether it was applied.
    ///
    /// Malformed lines and id-less `add` requests are ignored; a replica
    /// never allocates ids.
    pub fn apply_line(&self, line: &str) -> bool {
        self.apply(decode(line))
    }

    pub fn apply(&self, cmd: Command) -> bool {
        if cmd.is_add() && cmd.id().is_none() {
            debug!("Replica ignoring add without an id");
            return false;
        }
        self.scene.apply(cmd).is_some()
    }

    pub fn snapshot(&self) -> Vec<(ShapeId, Shape)> {
        self.scene
            .snapshot()
            .into_iter()
            .map(|(id, shape)| (id, Shape::clone(&shape)))
            .collect()
    }

    pub fn get(&self, id: ShapeId) -> Option<Editable> {
        self.scene.get(id).map(|shape| Editable {
            id,
            shape: Shape::clone(&shape),
        })
    }

    /// Topmost shape under `(x, y)`. Later (higher id) shapes are on top.
    pub fn hit_test(&self, x: i32, y: i32) -> Option<Editable> {
        self.scene
            .snapshot()
            .into_iter()
            .rev()
            .find(|(_, shape)| shape.contains_point(x, y))
            .map(|(id, shape)| Editable {
                id,
                shape: Shape::clone(&shape),
            })
    }

    pub fn len(&self) -> usize {
        self.scene.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scene.is_empty()
    }
}
