//! Listener and accept loop.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::config::ServerConfig;
use crate::error::{ServerError, ServerResult};
use crate::handler::ConnectionHandler;
use crate::http;
use crate::state::AppState;

/// Pause after a failed accept before trying again.
const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

/// A bound relay server, ready to [`run`](SketchServer::run).
pub struct SketchServer {
    state: Arc<AppState>,
    listener: TcpListener,
    http_listener: Option<TcpListener>,
}

impl SketchServer {
    /// Bind the protocol listener and, if configured, the HTTP listener.
    pub async fn bind(config: ServerConfig) -> ServerResult<Self> {
        let listener = bind(config.addr).await?;
        let http_listener = match config.http_addr {
            Some(addr) => Some(bind(addr).await?),
            None => None,
        };
        Ok(Self {
            state: Arc::new(AppState::new(config)),
            listener,
            http_listener,
        })
    }

    pub fn local_addr(&self) -> ServerResult<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    pub fn http_addr(&self) -> Option<SocketAddr> {
        self.http_listener.as_ref().and_then(|l| l.local_addr().ok())
    }

    pub fn state(&self) -> Arc<AppState> {
        Arc::clone(&self.state)
    }

    /// Accept connections until `shutdown` is cancelled. Each connection is
    /// served by its own task; a failing accept is logged and retried.
    pub async fn run(self, shutdown: CancellationToken) -> ServerResult<()> {
        let Self {
            state,
            listener,
            http_listener,
        } = self;

        if let Some(http_listener) = http_listener {
            let state = Arc::clone(&state);
            let shutdown = shutdown.clone();
            tokio::spawn(async move {
                if let Err(e) = http::serve(http_listener, state, shutdown).await {
                    warn!("HTTP status server stopped: {}", e);
                }
            });
        }

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                accepted = listener.accept() => match accepted {
                    Ok((stream, peer)) => {
                        if let Err(e) = stream.set_nodelay(true) {
                            warn!(peer = %peer, "Failed to set TCP_NODELAY: {}", e);
                        }
                        let handler = ConnectionHandler::new(Arc::clone(&state), peer);
                        info!(conn = %handler.id(), peer = %peer, "New connection");
                        tokio::spawn(handler.run(stream));
                    }
                    Err(e) => {
                        warn!("Accept failed: {}", e);
                        tokio::time::sleep(ACCEPT_BACKOFF).await;
                    }
                },
            }
        }

        info!("Listener stopped");
        Ok(())
    }
}

async fn bind(addr: SocketAddr) -> ServerResult<TcpListener> {
    TcpListener::bind(addr)
        .await
        .map_err(|source| ServerError::Bind { addr, source })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::SketchClient;
    use sketchsync_core::{Command, CornerKind, Point, Rgb, ShapeId};
    use tokio::task::JoinHandle;

    const WAIT: Duration = Duration::from_secs(5);

    struct Harness {
        addr: SocketAddr,
        state: Arc<AppState>,
        shutdown: CancellationToken,
        task: JoinHandle<ServerResult<()>>,
    }

    impl Harness {
        async fn start(config: ServerConfig) -> Self {
            let server = SketchServer::bind(config).await.unwrap();
            let addr = server.local_addr().unwrap();
            let state = server.state();
            let shutdown = CancellationToken::new();
            let task = tokio::spawn(server.run(shutdown.clone()));
            Self {
                addr,
                state,
                shutdown,
                task,
            }
        }

        async fn connect(&self) -> SketchClient {
            SketchClient::connect(self.addr).await.unwrap()
        }

        /// Wait until the server has registered `n` connections.
        async fn wait_for_connections(&self, n: usize) {
            let deadline = tokio::time::Instant::now() + WAIT;
            while self.state.registry.len() != n {
                assert!(tokio::time::Instant::now() < deadline, "expected {} connections", n);
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        }

        fn scene(&self) -> Vec<(ShapeId, sketchsync_core::Shape)> {
            self.state
                .scene
                .snapshot()
                .into_iter()
                .map(|(id, shape)| (id, sketchsync_core::Shape::clone(&shape)))
                .collect()
        }

        async fn stop(self) {
            self.shutdown.cancel();
            self.task.await.unwrap().unwrap();
        }
    }

    fn red_rect(x1: i32, y1: i32, x2: i32, y2: i32) -> Command {
        Command::add_shape(CornerKind::Rectangle, Point::new(x1, y1), Point::new(x2, y2), Rgb::RED)
    }

    #[tokio::test]
    async fn test_worked_example_over_tcp() {
        let harness = Harness::start(ServerConfig::local()).await;
        let mut alice = harness.connect().await;
        let mut bob = harness.connect().await;
        harness.wait_for_connections(2).await;

        alice.send(&red_rect(10, 10, 50, 50)).await.unwrap();
        let expected = "add rectangle 1 10 10 50 50 16711680";
        assert_eq!(alice.recv_lines(1, WAIT).await.unwrap(), vec![expected]);
        assert_eq!(bob.recv_lines(1, WAIT).await.unwrap(), vec![expected]);

        bob.send(&Command::move_by(1, 5, -5)).await.unwrap();
        alice.recv_lines(1, WAIT).await.unwrap();
        bob.recv_lines(1, WAIT).await.unwrap();
        let moved = alice.replica().get(1).unwrap().shape;
        assert_eq!(Command::from_shape(Some(1), &moved).encode(), "add rectangle 1 15 5 55 45 16711680");

        alice.send(&Command::delete(1)).await.unwrap();
        alice.send(&Command::move_by(1, 1, 1)).await.unwrap();
        assert_eq!(
            bob.recv_lines(2, WAIT).await.unwrap(),
            vec!["delete 1", "move 1 1 1"]
        );
        assert!(bob.replica().is_empty());
        assert!(harness.state.scene.is_empty());

        let mut late = harness.connect().await;
        assert!(late.recv_line_within(Duration::from_millis(200)).await.unwrap().is_none());
        harness.stop().await;
    }

    #[tokio::test]
    async fn test_concurrent_adds_get_distinct_ids() {
        let harness = Harness::start(ServerConfig::local()).await;
        let mut a = harness.connect().await;
        let mut b = harness.connect().await;
        harness.wait_for_connections(2).await;

        let (first, second) = (red_rect(0, 0, 5, 5), red_rect(10, 10, 20, 20));
        let (ra, rb) = tokio::join!(a.send(&first), b.send(&second));
        ra.unwrap();
        rb.unwrap();
        a.recv_lines(2, WAIT).await.unwrap();
        b.recv_lines(2, WAIT).await.unwrap();

        let scene = harness.scene();
        let ids: Vec<ShapeId> = scene.iter().map(|(id, _)| *id).collect();
        assert_eq!(ids, vec![1, 2]);
        assert_eq!(a.replica().snapshot(), scene);
        assert_eq!(b.replica().snapshot(), scene);
        harness.stop().await;
    }

    #[tokio::test]
    async fn test_convergence_across_many_clients() {
        const CLIENTS: usize = 5;
        const EDITS: usize = 30;

        let harness = Harness::start(ServerConfig::local()).await;
        let mut clients = Vec::new();
        for _ in 0..CLIENTS {
            clients.push(harness.connect().await);
        }
        harness.wait_for_connections(CLIENTS).await;

        // Seed one shape per client so moves and recolors have targets.
        for (i, client) in clients.iter_mut().enumerate() {
            let offset = i as i32 * 100;
            client.send(&red_rect(offset, 0, offset + 50, 50)).await.unwrap();
        }
        for client in &mut clients {
            client.recv_lines(CLIENTS, WAIT).await.unwrap();
        }

        let tasks: Vec<_> = clients
            .into_iter()
            .enumerate()
            .map(|(i, mut client)| {
                tokio::spawn(async move {
                    for n in 0..EDITS {
                        let target = ((i + n) % CLIENTS + 1) as ShapeId;
                        let cmd = match n % 4 {
                            0 => Command::move_by(target, 1, -1),
                            1 => Command::recolor(target, Rgb::new(i as u8, n as u8, 7)),
                            2 => Command::add_polyline(vec![Point::new(n as i32, 0), Point::new(0, i as i32)], Rgb::BLUE),
                            _ => Command::delete(target + CLIENTS as ShapeId * 2),
                        };
                        client.send(&cmd).await.unwrap();
                    }
                    client.send_line("this is not a command").await.unwrap();
                    client.recv_lines(CLIENTS * EDITS, WAIT).await.unwrap();
                    client
                })
            })
            .collect();

        let mut clients = Vec::new();
        for task in tasks {
            clients.push(task.await.unwrap());
        }

        let scene = harness.scene();
        for client in &clients {
            assert_eq!(client.replica().snapshot(), scene);
        }
        harness.stop().await;
    }

    #[tokio::test]
    async fn test_late_joiner_matches_early_participant() {
        let harness = Harness::start(ServerConfig::local()).await;
        let mut early = harness.connect().await;
        harness.wait_for_connections(1).await;

        early.send(&red_rect(0, 0, 10, 10)).await.unwrap();
        early
            .send(&Command::add_polyline(vec![Point::new(1, 1), Point::new(2, 2), Point::new(3, 1)], Rgb::GREEN))
            .await
            .unwrap();
        early.send(&Command::move_by(1, 3, 3)).await.unwrap();
        early.send(&Command::delete(2)).await.unwrap();
        early.send(&red_rect(5, 5, 6, 6)).await.unwrap();
        early.recv_lines(5, WAIT).await.unwrap();

        let mut late = harness.connect().await;
        harness.wait_for_connections(2).await;
        // Handshake: one canonical add per live shape.
        assert_eq!(
            late.recv_lines(2, WAIT).await.unwrap(),
            vec!["add rectangle 1 3 3 13 13 16711680", "add rectangle 3 5 5 6 6 16711680"]
        );
        assert_eq!(late.replica().snapshot(), early.replica().snapshot());

        late.send(&Command::recolor(3, Rgb::BLUE)).await.unwrap();
        early.recv_lines(1, WAIT).await.unwrap();
        late.recv_lines(1, WAIT).await.unwrap();
        assert_eq!(late.replica().snapshot(), early.replica().snapshot());
        assert_eq!(late.replica().snapshot(), harness.scene());
        harness.stop().await;
    }

    #[tokio::test]
    async fn test_joiners_during_edits_see_each_edit_once() {
        let harness = Harness::start(ServerConfig::local()).await;
        let mut editor = harness.connect().await;
        harness.wait_for_connections(1).await;
        editor.send(&red_rect(0, 0, 10, 10)).await.unwrap();
        editor.recv_lines(1, WAIT).await.unwrap();

        let edits = tokio::spawn(async move {
            for _ in 0..300 {
                editor.send(&Command::move_by(1, 1, 0)).await.unwrap();
            }
            editor
        });
        let mut joiners = Vec::new();
        for _ in 0..10 {
            joiners.push(harness.connect().await);
            tokio::task::yield_now().await;
        }
        let mut editor = edits.await.unwrap();
        editor.recv_lines(300, WAIT).await.unwrap();

        let scene = harness.scene();
        assert_eq!(editor.replica().snapshot(), scene);
        for joiner in &mut joiners {
            let target = scene.clone();
            assert!(joiner.sync_until(WAIT, |r| r.snapshot() == target).await.unwrap());
            // Nothing left over that would push it past the final state.
            assert!(joiner.recv_line_within(Duration::from_millis(100)).await.unwrap().is_none());
            assert_eq!(joiner.replica().snapshot(), scene);
        }
        harness.stop().await;
    }

    #[tokio::test]
    async fn test_disconnect_does_not_affect_others() {
        let harness = Harness::start(ServerConfig::local()).await;
        let mut stays = harness.connect().await;
        let mut leaves = harness.connect().await;
        harness.wait_for_connections(2).await;

        leaves.send(&red_rect(0, 0, 1, 1)).await.unwrap();
        stays.recv_lines(1, WAIT).await.unwrap();
        drop(leaves);
        harness.wait_for_connections(1).await;

        stays.send(&Command::move_by(1, 2, 2)).await.unwrap();
        assert_eq!(stays.recv_lines(1, WAIT).await.unwrap(), vec!["move 1 2 2"]);
        assert_eq!(harness.state.scene.len(), 1);
        harness.stop().await;
    }

    #[tokio::test]
    async fn test_overlong_line_closes_only_that_connection() {
        let config = ServerConfig::local().with_max_line_length(64);
        let harness = Harness::start(config).await;
        let mut rude = harness.connect().await;
        let mut polite = harness.connect().await;
        harness.wait_for_connections(2).await;

        rude.send_line(&"9".repeat(200)).await.unwrap();
        harness.wait_for_connections(1).await;
        // Closed or reset, but never answered.
        assert!(!matches!(rude.recv_line_within(WAIT).await, Ok(Some(_))));

        polite.send(&red_rect(0, 0, 1, 1)).await.unwrap();
        assert_eq!(polite.recv_lines(1, WAIT).await.unwrap().len(), 1);
        harness.stop().await;
    }

    #[tokio::test]
    async fn test_bind_failure_is_reported() {
        let harness = Harness::start(ServerConfig::local()).await;
        let taken = ServerConfig::local().with_addr(harness.addr);
        assert!(matches!(
            SketchServer::bind(taken).await,
            Err(ServerError::Bind { .. })
        ));
        harness.stop().await;
    }
}
