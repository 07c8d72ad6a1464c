//! Server execution logic.

use std::{collections::HashSet, net::SocketAddr, sync::Arc, time::Duration};

use axum::{
    Router,
    routing::{get, put},
};
use tokio::{net::TcpListener, sync::oneshot, task::JoinHandle};
use tower_http::trace::TraceLayer;

use chatline_shared::{
    protocol::HeartBeat,
    time::{Clock, SystemClock},
};

use crate::{
    domain::{MessagePublisher, RoomRepository},
    infrastructure::{InMemoryRoomRepository, RoomBroker},
    usecase::{FetchHistoryUseCase, ReadStateUseCase, SendMessageUseCase},
};

use super::{
    handler::{get_messages, get_unread, health_check, put_last_read, websocket_handler},
    signal::shutdown_signal,
    state::AppState,
};

pub const DEFAULT_HEARTBEAT: Duration = Duration::from_secs(10);

/// Broker settings taken from the command line
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Rooms whose subscriptions are refused
    pub restricted_rooms: Vec<u64>,
    /// Interval offered in both directions of `heart-beat`; zero disables it
    pub heart_beat: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            restricted_rooms: Vec::new(),
            heart_beat: DEFAULT_HEARTBEAT,
        }
    }
}

/// Chat broker server
///
/// # Example
///
/// ```ignore
/// let server = Server::in_memory(ServerConfig::default());
/// server.run("127.0.0.1".to_string(), 8080).await?;
/// ```
pub struct Server {
    state: Arc<AppState>,
}

impl Server {
    /// Wire the use cases around the given repository.
    pub fn new(
        repository: Arc<dyn RoomRepository>,
        broker: Arc<RoomBroker>,
        clock: Arc<dyn Clock>,
        config: ServerConfig,
    ) -> Self {
        let publisher: Arc<dyn MessagePublisher> = broker.clone();
        let state = AppState {
            send_message_usecase: Arc::new(SendMessageUseCase::new(
                repository.clone(),
                publisher,
                clock,
            )),
            fetch_history_usecase: Arc::new(FetchHistoryUseCase::new(repository.clone())),
            read_state_usecase: Arc::new(ReadStateUseCase::new(repository)),
            broker,
            restricted_rooms: config.restricted_rooms.into_iter().collect::<HashSet<_>>(),
            heart_beat: HeartBeat::new(config.heart_beat, config.heart_beat),
        };
        Self {
            state: Arc::new(state),
        }
    }

    /// Server backed by the in-memory repository and the system clock.
    pub fn in_memory(config: ServerConfig) -> Self {
        Self::new(
            Arc::new(InMemoryRoomRepository::new()),
            Arc::new(RoomBroker::new()),
            Arc::new(SystemClock),
            config,
        )
    }

    pub fn router(&self) -> Router {
        Router::new()
            // WebSocket エンドポイント
            .route("/ws", get(websocket_handler))
            // HTTP エンドポイント
            .route("/api/health", get(health_check))
            .route("/api/rooms/{room_id}/messages", get(get_messages))
            .route("/api/rooms/{room_id}/last-read", put(put_last_read))
            .route("/api/rooms/{room_id}/unread", get(get_unread))
            .layer(TraceLayer::new_for_http())
            .with_state(self.state.clone())
    }

    /// Run until Ctrl+C or SIGTERM
    ///
    /// # Errors
    ///
    /// Returns an error if the server fails to bind to the specified address or
    /// if there's an error during server execution.
    pub async fn run(self, host: String, port: u16) -> Result<(), Box<dyn std::error::Error>> {
        let bind_addr = format!("{}:{}", host, port);
        let listener = TcpListener::bind(&bind_addr).await?;
        let local_addr = listener.local_addr()?;

        tracing::info!("Chat broker listening on {}", local_addr);
        tracing::info!("Connect to: ws://{}/ws", local_addr);
        tracing::info!("Press Ctrl+C to shutdown gracefully");

        axum::serve(listener, self.router())
            .with_graceful_shutdown(shutdown_signal())
            .await?;

        tracing::info!("Server shutdown complete");

        Ok(())
    }

    /// Serve in the background; port 0 picks a free port.
    pub async fn spawn(self, host: &str, port: u16) -> std::io::Result<ServerHandle> {
        let listener = TcpListener::bind((host, port)).await?;
        let addr = listener.local_addr()?;
        let (shutdown, stop) = oneshot::channel::<()>();
        let app = self.router();

        let task = tokio::spawn(async move {
            let result = axum::serve(listener, app)
                .with_graceful_shutdown(async {
                    let _ = stop.await;
                })
                .await;
            if let Err(e) = result {
                tracing::error!("Broker on {} stopped: {}", addr, e);
            }
        });
        tracing::info!("Chat broker listening on {}", addr);

        Ok(ServerHandle {
            addr,
            shutdown: Some(shutdown),
            task,
        })
    }
}

/// A broker running in the background
pub struct ServerHandle {
    addr: SocketAddr,
    shutdown: Option<oneshot::Sender<()>>,
    task: JoinHandle<()>,
}

impl ServerHandle {
    pub fn local_addr(&self) -> SocketAddr {
        self.addr
    }

    /// `ws://host:port/ws`
    pub fn ws_url(&self) -> String {
        format!("ws://{}/ws", self.addr)
    }

    /// `http://host:port`
    pub fn http_url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// Stop accepting connections and wait for the server task.
    pub async fn shutdown(mut self) {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }
        let _ = (&mut self.task).await;
    }
}

impl Drop for ServerHandle {
    fn drop(&mut self) {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }
    }
}
