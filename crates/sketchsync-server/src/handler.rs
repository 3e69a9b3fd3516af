//! Per-connection task.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use sketchsync_core::{Command, SceneStore, decode};
use tokio::net::TcpStream;
use tokio::net::tcp::OwnedWriteHalf;
use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio_util::codec::{FramedRead, FramedWrite, LinesCodec, LinesCodecError};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::registry::{ConnId, ConnectionRegistry};
use crate::state::AppState;

/// How long a closing connection may spend flushing queued lines to a peer
/// that no longer reads.
const FINAL_FLUSH_TIMEOUT: Duration = Duration::from_secs(5);

/// Drives one participant: handshake, request loop, teardown.
pub struct ConnectionHandler {
    id: ConnId,
    peer: SocketAddr,
    state: Arc<AppState>,
}

/// Keeps a connection registered for as long as it is alive.
struct Registration<'a> {
    registry: &'a ConnectionRegistry,
    id: ConnId,
}

impl Drop for Registration<'_> {
    fn drop(&mut self) {
        self.registry.deregister(self.id);
    }
}

impl ConnectionHandler {
    pub fn new(state: Arc<AppState>, peer: SocketAddr) -> Self {
        Self {
            id: Uuid::new_v4(),
            peer,
            state,
        }
    }

    pub fn id(&self) -> ConnId {
        self.id
    }

    /// Serve the connection until the peer hangs up, an I/O error occurs, or
    /// it is evicted for falling behind.
    pub async fn run(self, stream: TcpStream) {
        let Self { id, peer, state } = self;
        let config = &state.config;

        let (read_half, write_half) = stream.into_split();
        let mut lines = FramedRead::new(
            read_half,
            LinesCodec::new_with_max_length(config.max_line_length),
        );
        let sink = FramedWrite::new(write_half, LinesCodec::new());
        let (tx, rx) = mpsc::channel(config.queue_capacity);
        let mut writer = tokio::spawn(write_loop(sink, rx));

        let registration = match state.registry.register(id, tx, || state.snapshot_lines()) {
            Ok(shapes) => {
                info!(conn = %id, peer = %peer, shapes, "Connection registered");
                Registration {
                    registry: &state.registry,
                    id,
                }
            }
            Err(e) => {
                warn!(conn = %id, peer = %peer, "Handshake failed: {}", e);
                writer.abort();
                return;
            }
        };

        let mut writer_done = false;
        loop {
            tokio::select! {
                line = lines.next() => match line {
                    Some(Ok(line)) => {
                        process_line(&state, id, &line);
                    }
                    Some(Err(LinesCodecError::MaxLineLengthExceeded)) => {
                        warn!(conn = %id, "Line exceeds {} bytes, closing", config.max_line_length);
                        break;
                    }
                    Some(Err(LinesCodecError::Io(e))) => {
                        warn!(conn = %id, "Read failed: {}", e);
                        break;
                    }
                    None => break,
                },
                result = &mut writer => {
                    writer_done = true;
                    match result {
                        Ok(Ok(())) => debug!(conn = %id, "Outbound queue closed"),
                        Ok(Err(e)) => warn!(conn = %id, "Write failed: {}", e),
                        Err(e) => warn!(conn = %id, "Writer task failed: {}", e),
                    }
                    break;
                }
            }
        }

        // Deregistering drops the queue sender, letting the writer flush and exit.
        drop(registration);
        if !writer_done {
            match timeout(FINAL_FLUSH_TIMEOUT, &mut writer).await {
                Ok(Ok(Err(e))) => debug!(conn = %id, "Final flush failed: {}", e),
                Ok(_) => {}
                Err(_) => {
                    debug!(conn = %id, "Final flush timed out");
                    writer.abort();
                }
            }
        }
        info!(conn = %id, peer = %peer, "Connection closed");
    }
}

async fn write_loop(
    mut sink: FramedWrite<OwnedWriteHalf, LinesCodec>,
    mut rx: mpsc::Receiver<Arc<str>>,
) -> Result<(), LinesCodecError> {
    while let Some(item) = rx.recv().await {
        sink.send(&*item).await?;
    }
    Ok(())
}

/// Decode one request line, apply it to the scene and broadcast the
/// canonical result. Returns the broadcast line, or `None` if the request was
/// dropped.
///
/// The originating connection gets its own edit back through the same
/// broadcast as everyone else and applies nothing locally beforehand.
pub(crate) fn process_line(state: &AppState, conn: ConnId, line: &str) -> Option<Arc<str>> {
    let cmd = decode(line);
    if cmd == Command::Malformed {
        debug!(conn = %conn, line, "Dropping malformed line");
        return None;
    }

    let published = state
        .registry
        .publish(|| resolve(&state.scene, cmd).map(|canonical| canonical.encode()));
    if let Some(line) = &published {
        debug!(conn = %conn, line = %line, "Applied");
    }
    published
}

/// Apply a request to the scene, returning its canonical form.
///
/// An `add` that carries an id may only replace a live shape. Deleted ids
/// stay dead and future ids stay unclaimed. Runs under the registry lock, so
/// no other edit lands between the check and the replace.
fn resolve(scene: &SceneStore, cmd: Command) -> Option<Command> {
    if let (true, Some(id)) = (cmd.is_add(), cmd.id()) {
        if !scene.contains(id) {
            debug!(id, "Refusing add for an id with no live shape");
            return None;
        }
    }
    scene.apply(cmd)
}
