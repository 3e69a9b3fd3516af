//! Headless line-protocol client.
//!
//! Keeps a [`SceneReplica`] fed from the server's broadcasts. Requests are
//! only sent, never applied locally; the replica changes when the server
//! echoes them back.

use std::net::SocketAddr;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use sketchsync_core::{Command, SceneReplica};
use tokio::net::TcpStream;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::time::{Instant, timeout};
use tokio_util::codec::{FramedRead, FramedWrite, LinesCodec};

use crate::config::DEFAULT_MAX_LINE_LENGTH;
use crate::error::ServerResult;

pub struct SketchClient {
    lines: FramedRead<OwnedReadHalf, LinesCodec>,
    sink: FramedWrite<OwnedWriteHalf, LinesCodec>,
    replica: SceneReplica,
}

impl SketchClient {
    pub async fn connect(addr: SocketAddr) -> ServerResult<Self> {
        let stream = TcpStream::connect(addr).await?;
        stream.set_nodelay(true)?;
        let (read_half, write_half) = stream.into_split();
        Ok(Self {
            lines: FramedRead::new(read_half, LinesCodec::new_with_max_length(DEFAULT_MAX_LINE_LENGTH)),
            sink: FramedWrite::new(write_half, LinesCodec::new()),
            replica: SceneReplica::new(),
        })
    }

    pub fn replica(&self) -> &SceneReplica {
        &self.replica
    }

    /// Send a request.
    pub async fn send(&mut self, cmd: &Command) -> ServerResult<()> {
        self.send_line(&cmd.encode()).await
    }

    /// Send a raw line, well-formed or not.
    pub async fn send_line(&mut self, line: &str) -> ServerResult<()> {
        self.sink.send(line).await?;
        Ok(())
    }

    /// Read the next line and apply it to the replica. `None` once the
    /// server has closed the connection.
    pub async fn recv_line(&mut self) -> ServerResult<Option<String>> {
        match self.lines.next().await {
            Some(line) => {
                let line = line?;
                self.replica.apply_line(&line);
                Ok(Some(line))
            }
            None => Ok(None),
        }
    }

    /// Like [`SketchClient::recv_line`], giving up with `Ok(None)` after `wait`.
    pub async fn recv_line_within(&mut self, wait: Duration) -> ServerResult<Option<String>> {
        match timeout(wait, self.recv_line()).await {
            Ok(result) => result,
            Err(_) => Ok(None),
        }
    }

    /// Read exactly `n` lines, failing on timeout or disconnect.
    pub async fn recv_lines(&mut self, n: usize, wait: Duration) -> ServerResult<Vec<String>> {
        let deadline = Instant::now() + wait;
        let mut lines = Vec::with_capacity(n);
        while lines.len() < n {
            let remaining = deadline.saturating_duration_since(Instant::now());
            match self.recv_line_within(remaining).await? {
                Some(line) => lines.push(line),
                None => {
                    return Err(std::io::Error::new(
                        std::io::ErrorKind::TimedOut,
                        format!("received {} of {} lines", lines.len(), n),
                    )
                    .into());
                }
            }
        }
        Ok(lines)
    }

    /// Apply incoming lines until `done` holds for the replica or `wait`
    /// elapses. Returns whether `done` was reached.
    pub async fn sync_until(
        &mut self,
        wait: Duration,
        done: impl Fn(&SceneReplica) -> bool,
    ) -> ServerResult<bool> {
        let deadline = Instant::now() + wait;
        while !done(&self.replica) {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() || self.recv_line_within(remaining).await?.is_none() {
                return Ok(done(&self.replica));
            }
        }
        Ok(true)
    }
}
