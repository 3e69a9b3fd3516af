//! Authoritative id → shape mapping.
//!
//! Every operation runs inside one short critical section. Shapes are held
//! behind `Arc` and mutated copy-on-write, so a snapshot handed out earlier
//! keeps seeing the geometry it was taken with.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use log::trace;

use crate::protocol::Command;
use crate::shapes::{Rgb, Shape, ShapeId};

/// First id handed out by a fresh store.
pub const FIRST_ID: ShapeId = 1;

#[derive(Debug)]
struct SceneInner {
    shapes: BTreeMap<ShapeId, Arc<Shape>>,
    next_id: ShapeId,
}

/// Thread-safe shape store with monotonic id allocation.
#[derive(Debug)]
pub struct SceneStore {
    inner: Mutex<SceneInner>,
}

impl Default for SceneStore {
    fn default() -> Self {
        Self::new()
    }
}

impl SceneStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(SceneInner {
                shapes: BTreeMap::new(),
                next_id: FIRST_ID,
            }),
        }
    }

    // Every critical section leaves the map consistent, so a poisoned lock is safe to reuse.
    fn lock(&self) -> MutexGuard<'_, SceneInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Store a shape under a freshly allocated id. Ids are never reused.
    pub fn insert(&self, shape: Shape) -> ShapeId {
        let mut inner = self.lock();
        let id = inner.next_id;
        inner.next_id += 1;
        inner.shapes.insert(id, Arc::new(shape));
        id
    }

    /// Insert or replace the shape at an externally supplied id. Leaves the
    /// id counter alone.
    pub fn upsert(&self, id: ShapeId, shape: Shape) {
        self.lock().shapes.insert(id, Arc::new(shape));
    }

    /// Translate a shape. Returns false (and does nothing) if the id is absent.
    pub fn move_by(&self, id: ShapeId, dx: i32, dy: i32) -> bool {
        self.update(id, |shape| shape.translate(dx, dy))
    }

    /// Recolor a shape. Returns false (and does nothing) if the id is absent.
    pub fn recolor(&self, id: ShapeId, color: Rgb) -> bool {
        self.update(id, |shape| shape.set_color(color))
    }

    fn update(&self, id: ShapeId, f: impl FnOnce(&mut Shape)) -> bool {
        let mut inner = self.lock();
        match inner.shapes.get_mut(&id) {
            Some(shape) => {
                f(Arc::make_mut(shape));
                true
            }
            None => {
                trace!("Ignoring edit of missing shape {}", id);
                false
            }
        }
    }

    /// Remove a shape. Returns whether anything was removed.
    pub fn delete(&self, id: ShapeId) -> bool {
        self.lock().shapes.remove(&id).is_some()
    }

    pub fn get(&self, id: ShapeId) -> Option<Arc<Shape>> {
        self.lock().shapes.get(&id).cloned()
    }

    /// Point-in-time copy of the scene, ascending by id.
    pub fn snapshot(&self) -> Vec<(ShapeId, Arc<Shape>)> {
        self.lock()
            .shapes
            .iter()
            .map(|(id, shape)| (*id, Arc::clone(shape)))
            .collect()
    }

    /// Resolve a shape handle obtained from [`SceneStore::get`] or
    /// [`SceneStore::snapshot`] back to its id.
    ///
    /// This is an identity lookup: it matches the exact allocation, not equal
    /// geometry, and stops matching once the shape has been edited (edits
    /// copy the shape). It scans the whole store. Prefer carrying the id
    /// alongside the shape.
    pub fn lookup_id(&self, shape: &Arc<Shape>) -> Option<ShapeId> {
        self.lock()
            .shapes
            .iter()
            .find(|(_, stored)| Arc::ptr_eq(stored, shape))
            .map(|(id, _)| *id)
    }

    pub fn contains(&self, id: ShapeId) -> bool {
        self.lock().shapes.contains_key(&id)
    }

    /// The id the next insert will return.
    pub fn next_id(&self) -> ShapeId {
        self.lock().next_id
    }

    pub fn len(&self) -> usize {
        self.lock().shapes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().shapes.is_empty()
    }

    /// Apply a decoded command and return its canonical, id-bearing form.
    ///
    /// An id-less `add` is inserted under a new id; an `add` that already has
    /// an id is upserted. Edits of missing shapes are no-ops but still return
    /// the command so every replica sees the same history. Returns `None`
    /// for [`Command::Malformed`] and for an `add` with no buildable shape.
    pub fn apply(&self, cmd: Command) -> Option<Command> {
        match cmd {
            Command::AddShape { id, .. } | Command::AddPolyline { id, .. } => {
                let shape = cmd.to_shape()?;
                match id {
                    Some(id) => {
                        self.upsert(id, shape);
                        Some(cmd)
                    }
                    None => {
                        let id = self.insert(shape);
                        Some(cmd.with_id(id))
                    }
                }
            }
            Command::Move { id, dx, dy } => {
                self.move_by(id, dx, dy);
                Some(cmd)
            }
            Command::Recolor { id, color } => {
                self.recolor(id, color);
                Some(cmd)
            }
            Command::Delete { id } => {
                self.delete(id);
                Some(cmd)
            }
            Command::Malformed => None,
        }
    }
}
