//! Server network layer handling WebSocket connections and the routing loop

use crate::action_log::ActionLog;
use crate::error::ServerError;
use crate::registry::{ConnectionId, Delivery, RoomRegistry};
use crate::store::KvStore;
use futures_util::{SinkExt, StreamExt};
use log::{debug, error, info, warn};
use shared::DEFAULT_GRID_SIZE;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::path::PathBuf;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_tungstenite::accept_async;
use tokio_tungstenite::tungstenite::Message;

/// Settings the server binary is started with
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Grid size recorded for rooms created by this server
    pub grid_size: usize,
    /// File the store is snapshotted to, if any
    pub snapshot: Option<PathBuf>,
}

impl ServerConfig {
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
            grid_size: DEFAULT_GRID_SIZE,
            snapshot: None,
        }
    }
}

/// Messages sent from connection tasks to the main server loop
#[derive(Debug)]
pub enum ServerMessage {
    Connected {
        conn: ConnectionId,
        addr: SocketAddr,
        sender: mpsc::UnboundedSender<Message>,
    },
    Frame {
        conn: ConnectionId,
        text: String,
    },
    Disconnected {
        conn: ConnectionId,
    },
    Shutdown,
}

/// Lets another task stop a running server
#[derive(Debug, Clone)]
pub struct ServerHandle {
    server_tx: mpsc::UnboundedSender<ServerMessage>,
}

impl ServerHandle {
    pub fn shutdown(&self) {
        if self.server_tx.send(ServerMessage::Shutdown).is_err() {
            debug!("Server already stopped");
        }
    }
}

/// Main server owning the listener, the connections and the room registry
pub struct Server<S: KvStore> {
    listener: TcpListener,
    registry: RoomRegistry<S>,
    connections: HashMap<ConnectionId, mpsc::UnboundedSender<Message>>,
    next_connection_id: ConnectionId,

    server_tx: mpsc::UnboundedSender<ServerMessage>,
    server_rx: mpsc::UnboundedReceiver<ServerMessage>,
}

impl<S: KvStore + 'static> Server<S> {
    pub async fn bind(addr: &str, store: S, grid_size: usize) -> Result<Self, ServerError> {
        let listener = TcpListener::bind(addr).await?;
        info!("Server listening on {}", listener.local_addr()?);

        let (server_tx, server_rx) = mpsc::unbounded_channel();

        Ok(Server {
            listener,
            registry: RoomRegistry::new(ActionLog::new(store), grid_size),
            connections: HashMap::new(),
            next_connection_id: 1,
            server_tx,
            server_rx,
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr, ServerError> {
        Ok(self.listener.local_addr()?)
    }

    pub fn handle(&self) -> ServerHandle {
        ServerHandle {
            server_tx: self.server_tx.clone(),
        }
    }

    /// Spawns the task that owns one WebSocket for its whole life
    fn spawn_connection(&mut self, stream: TcpStream, addr: SocketAddr) {
        let conn = self.next_connection_id;
        self.next_connection_id += 1;
        let server_tx = self.server_tx.clone();

        tokio::spawn(async move {
            let socket = match accept_async(stream).await {
                Ok(socket) => socket,
                Err(e) => {
                    warn!("WebSocket handshake with {} failed: {}", addr, e);
                    return;
                }
            };
            let (mut write, mut read) = socket.split();
            let (sender, mut outgoing) = mpsc::unbounded_channel::<Message>();
            if server_tx
                .send(ServerMessage::Connected { conn, addr, sender })
                .is_err()
            {
                return;
            }

            let writer = tokio::spawn(async move {
                while let Some(message) = outgoing.recv().await {
                    if let Err(e) = write.send(message).await {
                        debug!("Failed to write to connection {}: {}", conn, e);
                        break;
                    }
                }
            });

            while let Some(message) = read.next().await {
                match message {
                    Ok(Message::Text(text)) => {
                        if server_tx.send(ServerMessage::Frame { conn, text }).is_err() {
                            break;
                        }
                    }
                    Ok(Message::Close(_)) => break,
                    Ok(_) => {}
                    Err(e) => {
                        debug!("Connection {} read error: {}", conn, e);
                        break;
                    }
                }
            }

            let _ = server_tx.send(ServerMessage::Disconnected { conn });
            writer.abort();
        });
    }

    fn deliver(&self, deliveries: Vec<Delivery>) {
        for delivery in deliveries {
            match self.connections.get(&delivery.to) {
                Some(sender) => {
                    if sender.send(Message::Text(delivery.frame())).is_err() {
                        debug!("Connection {} is closing, dropped frame", delivery.to);
                    }
                }
                None => debug!("No connection {} for delivery", delivery.to),
            }
        }
    }

    async fn handle_message(&mut self, message: ServerMessage) -> bool {
        match message {
            ServerMessage::Connected { conn, addr, sender } => {
                info!("Connection {} opened from {}", conn, addr);
                self.connections.insert(conn, sender);
            }
            ServerMessage::Frame { conn, text } => {
                match self.registry.handle_frame(conn, &text).await {
                    Ok(deliveries) => self.deliver(deliveries),
                    Err(e) => error!("Failed to handle frame from connection {}: {}", conn, e),
                }
            }
            ServerMessage::Disconnected { conn } => {
                let deliveries = self.registry.handle_disconnect(conn);
                self.connections.remove(&conn);
                self.deliver(deliveries);
                info!("Connection {} closed", conn);
            }
            ServerMessage::Shutdown => {
                info!("Server shutting down");
                return false;
            }
        }
        true
    }

    /// Main server loop accepting connections and routing frames
    pub async fn run(mut self) -> Result<(), ServerError> {
        info!("Server started successfully");

        loop {
            tokio::select! {
                accepted = self.listener.accept() => match accepted {
                    Ok((stream, addr)) => self.spawn_connection(stream, addr),
                    Err(e) => error!("Failed to accept connection: {}", e),
                },
                message = self.server_rx.recv() => {
                    let Some(message) = message else {
                        break;
                    };
                    if !self.handle_message(message).await {
                        break;
                    }
                }
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use shared::{Action, Identity};

    async fn server() -> Server<MemoryStore> {
        Server::bind("127.0.0.1:0", MemoryStore::new(), 5)
            .await
            .unwrap()
    }

    #[test]
    fn test_default_config_address() {
        let config = ServerConfig::default();
        assert_eq!(config.address(), "127.0.0.1:8080");
        assert_eq!(config.grid_size, DEFAULT_GRID_SIZE);
        assert!(config.snapshot.is_none());
    }

    #[tokio::test]
    async fn test_bind_to_ephemeral_port() {
        let server = server().await;
        assert_ne!(server.local_addr().unwrap().port(), 0);
    }

    #[tokio::test]
    async fn test_frames_are_routed_to_registered_connections() {
        let mut server = server().await;
        let (sender, mut outgoing) = mpsc::unbounded_channel();
        let addr: SocketAddr = "127.0.0.1:9999".parse().unwrap();
        assert!(
            server
                .handle_message(ServerMessage::Connected {
                    conn: 7,
                    addr,
                    sender
                })
                .await
        );

        let identity = Identity::generate();
        let join = Action::join_room("room", -1).with_actor(identity.private_id());
        server
            .handle_message(ServerMessage::Frame {
                conn: 7,
                text: join.encode(),
            })
            .await;
        let edit = Action::set_cell(0, 0, "A").with_actor(identity.private_id());
        server
            .handle_message(ServerMessage::Frame {
                conn: 7,
                text: edit.encode(),
            })
            .await;

        let Ok(Message::Text(text)) = outgoing.try_recv() else {
            panic!("expected an echo");
        };
        let echo = Action::decode(&text).unwrap();
        assert_eq!(echo.sequence_number, 0);
        assert_eq!(echo.actor_id.as_deref(), Some(identity.public_id()));

        server
            .handle_message(ServerMessage::Disconnected { conn: 7 })
            .await;
        assert!(server.connections.is_empty());
        assert_eq!(server.registry.member_count("room"), 0);
    }

    #[tokio::test]
    async fn test_shutdown_stops_run() {
        let server = server().await;
        let handle = server.handle();
        handle.shutdown();
        tokio::time::timeout(std::time::Duration::from_secs(5), server.run())
            .await
            .unwrap()
            .unwrap();
    }
}
