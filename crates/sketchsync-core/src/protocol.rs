//! Line-oriented text protocol for scene edits.
//!
//! Every message is one line of whitespace-separated tokens:
//!
//! ```text
//! add <ellipse|rectangle|segment> [id] <x1> <y1> <x2> <y2> <rgb>
//! add polyline [id] <n> <x1> <y1> ... <xn> <yn> <rgb>
//! move <id> <dx> <dy>
//! recolor <id> <rgb>
//! delete <id>
//! ```
//!
//! The `id` of an `add` is absent on requests sent by a client and present on
//! the canonical lines the server broadcasts. `rgb` is a packed `0xRRGGBB`
//! integer; a signed ARGB value is accepted and its alpha byte dropped.

use std::fmt::Write as _;
use std::str::FromStr;

use log::debug;
use thiserror::Error;

use crate::shapes::{Ellipse, Point, Polyline, Rectangle, Rgb, Segment, Shape, ShapeId, ShapeKind};

/// Shape kinds described by two corner points.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CornerKind {
    Ellipse,
    Rectangle,
    Segment,
}

impl CornerKind {
    pub fn as_str(self) -> &'static str {
        self.shape_kind().as_str()
    }

    pub fn shape_kind(self) -> ShapeKind {
        match self {
            CornerKind::Ellipse => ShapeKind::Ellipse,
            CornerKind::Rectangle => ShapeKind::Rectangle,
            CornerKind::Segment => ShapeKind::Segment,
        }
    }
}

/// A decoded edit command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    AddShape {
        id: Option<ShapeId>,
        kind: CornerKind,
        x1: i32,
        y1: i32,
        x2: i32,
        y2: i32,
        color: Rgb,
    },
    AddPolyline {
        id: Option<ShapeId>,
        points: Vec<Point>,
        color: Rgb,
    },
    Move {
        id: ShapeId,
        dx: i32,
        dy: i32,
    },
    Recolor {
        id: ShapeId,
        color: Rgb,
    },
    Delete {
        id: ShapeId,
    },
    /// Anything that failed to parse. Receivers ignore it.
    Malformed,
}

/// Why a line failed to parse.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolError {
    #[error("empty line")]
    Empty,
    #[error("unknown command: {0}")]
    UnknownCommand(String),
    #[error("unknown shape kind: {0}")]
    UnknownKind(String),
    #[error("wrong token count for {command}: got {got}")]
    TokenCount { command: &'static str, got: usize },
    #[error("expected an integer, got {0:?}")]
    NotAnInteger(String),
    #[error("shape ids must be positive")]
    ZeroId,
    #[error("polyline point count must be at least 1")]
    EmptyPolyline,
    #[error("color out of range: {0}")]
    ColorRange(i64),
}

/// Decode a line, collapsing every parse failure into [`Command::Malformed`].
pub fn decode(line: &str) -> Command {
    match parse(line) {
        Ok(cmd) => cmd,
        Err(e) => {
            debug!("Dropping malformed line {:?}: {}", line, e);
            Command::Malformed
        }
    }
}

/// Decode a line, reporting why it was rejected.
pub fn parse(line: &str) -> Result<Command, ProtocolError> {
    let tokens: Vec<&str> = line.split_whitespace().collect();
    let Some((&verb, args)) = tokens.split_first() else {
        return Err(ProtocolError::Empty);
    };

    match verb {
        "add" => parse_add(args),
        "move" => {
            expect_len("move", args, 3)?;
            Ok(Command::Move {
                id: parse_id(args[0])?,
                dx: parse_int(args[1])?,
                dy: parse_int(args[2])?,
            })
        }
        "recolor" => {
            expect_len("recolor", args, 2)?;
            Ok(Command::Recolor {
                id: parse_id(args[0])?,
                color: parse_color(args[1])?,
            })
        }
        "delete" => {
            expect_len("delete", args, 1)?;
            Ok(Command::Delete {
                id: parse_id(args[0])?,
            })
        }
        other => Err(ProtocolError::UnknownCommand(other.to_string())),
    }
}

fn parse_add(args: &[&str]) -> Result<Command, ProtocolError> {
    let Some((&kind, rest)) = args.split_first() else {
        return Err(ProtocolError::TokenCount {
            command: "add",
            got: 0,
        });
    };
    let kind = ShapeKind::from_name(kind).ok_or_else(|| ProtocolError::UnknownKind(kind.to_string()))?;

    let corner_kind = match kind {
        ShapeKind::Polyline => return parse_add_polyline(rest),
        ShapeKind::Ellipse => CornerKind::Ellipse,
        ShapeKind::Rectangle => CornerKind::Rectangle,
        ShapeKind::Segment => CornerKind::Segment,
    };

    let (id, fields) = match rest.len() {
        5 => (None, rest),
        6 => (Some(parse_id(rest[0])?), &rest[1..]),
        got => {
            return Err(ProtocolError::TokenCount {
                command: "add",
                got: got + 2,
            });
        }
    };

    Ok(Command::AddShape {
        id,
        kind: corner_kind,
        x1: parse_int(fields[0])?,
        y1: parse_int(fields[1])?,
        x2: parse_int(fields[2])?,
        y2: parse_int(fields[3])?,
        color: parse_color(fields[4])?,
    })
}

/// `rest` is everything after `add polyline`. The request form has `2n + 2`
/// tokens and the id-bearing form `2n + 3`, so parity tells them apart.
fn parse_add_polyline(rest: &[&str]) -> Result<Command, ProtocolError> {
    let too_short = || ProtocolError::TokenCount {
        command: "add polyline",
        got: rest.len() + 2,
    };

    let (id, body) = if rest.len() % 2 == 0 {
        (None, rest)
    } else {
        let (&id, body) = rest.split_first().ok_or_else(too_short)?;
        (Some(parse_id(id)?), body)
    };

    let (&count, body) = body.split_first().ok_or_else(too_short)?;
    let count: usize = parse_int::<u32>(count)? as usize;
    if count == 0 {
        return Err(ProtocolError::EmptyPolyline);
    }
    let expected = count.checked_mul(2).and_then(|n| n.checked_add(1));
    if expected != Some(body.len()) {
        return Err(too_short());
    }

    let (color, coords) = body.split_last().ok_or_else(too_short)?;
    let points = coords
        .chunks_exact(2)
        .map(|pair| Ok(Point::new(parse_int(pair[0])?, parse_int(pair[1])?)))
        .collect::<Result<Vec<_>, ProtocolError>>()?;

    Ok(Command::AddPolyline {
        id,
        points,
        color: parse_color(color)?,
    })
}

fn expect_len(command: &'static str, args: &[&str], n: usize) -> Result<(), ProtocolError> {
    if args.len() == n {
        Ok(())
    } else {
        Err(ProtocolError::TokenCount {
            command,
            got: args.len() + 1,
        })
    }
}

fn parse_int<T: FromStr>(token: &str) -> Result<T, ProtocolError> {
    token
        .parse()
        .map_err(|_| ProtocolError::NotAnInteger(token.to_string()))
}

fn parse_id(token: &str) -> Result<ShapeId, ProtocolError> {
    match parse_int::<ShapeId>(token)? {
        0 => Err(ProtocolError::ZeroId),
        id => Ok(id),
    }
}

fn parse_color(token: &str) -> Result<Rgb, ProtocolError> {
    let value: i64 = parse_int(token)?;
    if value < i64::from(i32::MIN) || value > i64::from(u32::MAX) {
        return Err(ProtocolError::ColorRange(value));
    }
    // Two's complement wrap keeps the low 24 bits of a negative ARGB value.
    Ok(Rgb::from_packed(value as u32))
}

impl Command {
    /// Request to add a corner-defined shape.
    pub fn add_shape(kind: CornerKind, p1: Point, p2: Point, color: Rgb) -> Self {
        Command::AddShape {
            id: None,
            kind,
            x1: p1.x,
            y1: p1.y,
            x2: p2.x,
            y2: p2.y,
            color,
        }
    }

    /// Request to add a polyline.
    pub fn add_polyline(points: Vec<Point>, color: Rgb) -> Self {
        Command::AddPolyline {
            id: None,
            points,
            color,
        }
    }

    pub fn move_by(id: ShapeId, dx: i32, dy: i32) -> Self {
        Command::Move { id, dx, dy }
    }

    pub fn recolor(id: ShapeId, color: Rgb) -> Self {
        Command::Recolor { id, color }
    }

    pub fn delete(id: ShapeId) -> Self {
        Command::Delete { id }
    }

    /// Describe an existing shape as an `add` command.
    pub fn from_shape(id: Option<ShapeId>, shape: &Shape) -> Self {
        match shape {
            Shape::Ellipse(s) => Self::corner_add(id, CornerKind::Ellipse, s.min(), s.max(), s.color),
            Shape::Rectangle(s) => {
                Self::corner_add(id, CornerKind::Rectangle, s.min(), s.max(), s.color)
            }
            Shape::Segment(s) => Self::corner_add(id, CornerKind::Segment, s.start, s.end, s.color),
            Shape::Polyline(s) => Command::AddPolyline {
                id,
                points: s.points().to_vec(),
                color: s.color,
            },
        }
    }

    fn corner_add(id: Option<ShapeId>, kind: CornerKind, p1: Point, p2: Point, color: Rgb) -> Self {
        Command::AddShape {
            id,
            kind,
            x1: p1.x,
            y1: p1.y,
            x2: p2.x,
            y2: p2.y,
            color,
        }
    }

    /// The shape id this command refers to, if it has one yet.
    pub fn id(&self) -> Option<ShapeId> {
        match self {
            Command::AddShape { id, .. } | Command::AddPolyline { id, .. } => *id,
            Command::Move { id, .. } | Command::Recolor { id, .. } | Command::Delete { id } => {
                Some(*id)
            }
            Command::Malformed => None,
        }
    }

    /// Attach a server-assigned id to an `add`. Other commands are returned unchanged.
    pub fn with_id(mut self, new_id: ShapeId) -> Self {
        if let Command::AddShape { id, .. } | Command::AddPolyline { id, .. } = &mut self {
            *id = Some(new_id);
        }
        self
    }

    pub fn is_add(&self) -> bool {
        matches!(self, Command::AddShape { .. } | Command::AddPolyline { .. })
    }

    /// Build the shape an `add` describes.
    pub fn to_shape(&self) -> Option<Shape> {
        match self {
            Command::AddShape {
                kind,
                x1,
                y1,
                x2,
                y2,
                color,
                ..
            } => {
                let (p1, p2) = (Point::new(*x1, *y1), Point::new(*x2, *y2));
                Some(match kind {
                    CornerKind::Ellipse => Ellipse::from_corners(p1, p2, *color).into(),
                    CornerKind::Rectangle => Rectangle::from_corners(p1, p2, *color).into(),
                    CornerKind::Segment => Segment::new(p1, p2, *color).into(),
                })
            }
            Command::AddPolyline { points, color, .. } => {
                Polyline::from_points(points.clone(), *color).map(Shape::from)
            }
            _ => None,
        }
    }

    /// Canonical line for this command. [`Command::Malformed`] encodes as an
    /// empty line, which decodes back to `Malformed`.
    pub fn encode(&self) -> String {
        let mut out = String::new();
        // Writing into a String cannot fail.
        let _ = match self {
            Command::AddShape {
                id,
                kind,
                x1,
                y1,
                x2,
                y2,
                color,
            } => {
                out.push_str("add ");
                out.push_str(kind.as_str());
                write_id(&mut out, *id);
                write!(out, " {} {} {} {} {}", x1, y1, x2, y2, color.packed())
            }
            Command::AddPolyline { id, points, color } => {
                out.push_str("add polyline");
                write_id(&mut out, *id);
                let _ = write!(out, " {}", points.len());
                for p in points {
                    let _ = write!(out, " {} {}", p.x, p.y);
                }
                write!(out, " {}", color.packed())
            }
            Command::Move { id, dx, dy } => write!(out, "move {} {} {}", id, dx, dy),
            Command::Recolor { id, color } => write!(out, "recolor {} {}", id, color.packed()),
            Command::Delete { id } => write!(out, "delete {}", id),
            Command::Malformed => Ok(()),
        };
        out
    }
}

fn write_id(out: &mut String, id: Option<ShapeId>) {
    if let Some(id) = id {
        let _ = write!(out, " {}", id);
    }
}

/// Canonical `add` line for a stored shape. Used for both handshake snapshots
/// and live broadcasts.
pub fn encode_shape(id: Option<ShapeId>, shape: &Shape) -> String {
    Command::from_shape(id, shape).encode()
}
