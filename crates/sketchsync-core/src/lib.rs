//! SketchSync Core Library
//!
//! Shape model, line protocol and scene store shared by the relay server and
//! its clients. No I/O happens here.

pub mod protocol;
pub mod replica;
pub mod scene;
pub mod shapes;

pub use protocol::{Command, CornerKind, ProtocolError, decode, encode_shape};
pub use replica::{Editable, SceneReplica};
pub use scene::SceneStore;
pub use shapes::{Point, Rgb, Shape, ShapeId, ShapeKind};
