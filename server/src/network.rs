//! Server network layer handling UDP communications and event routing

use crate::channel::{EventSink, Outbound};
use crate::client_manager::ClientManager;
use crate::config::ServerConfig;
use crate::error::GameError;
use crate::registry::LobbyRegistry;
use crate::router::Router;
use crate::validate;
use bincode::{deserialize, serialize};
use log::{debug, error, info, warn};
use shared::{Packet, PlayerId, MAX_PACKET_SIZE};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::sync::{mpsc, RwLock};

/// Messages sent from network tasks to main server loop
#[derive(Debug)]
pub enum ServerMessage {
    PacketReceived { packet: Packet, addr: SocketAddr },
    ClientIdle { client_id: PlayerId },
    ClientTimeout { client_id: PlayerId },
    /// A lobby refused a join the router had already recorded
    JoinFailed { client_id: PlayerId, code: String },
    Shutdown,
}

/// Packets addressed by socket rather than by participant, used before a
/// client has an id or after it lost one.
#[derive(Debug)]
struct DirectPacket {
    packet: Packet,
    addr: SocketAddr,
}

/// Main server coordinating networking and lobby routing
pub struct Server {
    socket: Arc<UdpSocket>,
    clients: Arc<RwLock<ClientManager>>,
    router: Router,
    idle_after: Duration,
    drop_after: Duration,

    // Communication channels
    server_tx: mpsc::UnboundedSender<ServerMessage>,
    server_rx: mpsc::UnboundedReceiver<ServerMessage>,
    direct_tx: mpsc::UnboundedSender<DirectPacket>,
    direct_rx: Option<mpsc::UnboundedReceiver<DirectPacket>>,
    outbound_rx: Option<mpsc::UnboundedReceiver<Outbound>>,
}

impl Server {
    pub async fn new(config: &ServerConfig) -> Result<Self, Box<dyn std::error::Error>> {
        validate::settings(&config.default_settings())?;
        let socket = Arc::new(UdpSocket::bind(config.address()).await?);
        info!("Server listening on {}", socket.local_addr()?);

        let (server_tx, server_rx) = mpsc::unbounded_channel();
        let (direct_tx, direct_rx) = mpsc::unbounded_channel();
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel::<Outbound>();

        let sink: Arc<dyn EventSink> = Arc::new(outbound_tx);
        let registry = LobbyRegistry::new(
            Arc::clone(&sink),
            config.default_settings(),
            config.lobby_queue,
        );

        Ok(Server {
            socket,
            clients: Arc::new(RwLock::new(ClientManager::new(config.max_clients))),
            router: Router::new(registry, sink, server_tx.clone()),
            idle_after: config.idle_after(),
            drop_after: config.drop_after(),
            server_tx,
            server_rx,
            direct_tx,
            direct_rx: Some(direct_rx),
            outbound_rx: Some(outbound_rx),
        })
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    /// Sender that can stop a running server with `ServerMessage::Shutdown`.
    pub fn control(&self) -> mpsc::UnboundedSender<ServerMessage> {
        self.server_tx.clone()
    }

    /// Spawns task that continuously listens for incoming packets
    fn spawn_network_receiver(&self) {
        let socket = Arc::clone(&self.socket);
        let server_tx = self.server_tx.clone();

        tokio::spawn(async move {
            let mut buffer = vec![0u8; MAX_PACKET_SIZE];

            loop {
                match socket.recv_from(&mut buffer).await {
                    Ok((len, addr)) => {
                        if let Ok(packet) = deserialize::<Packet>(&buffer[0..len]) {
                            if let Err(e) =
                                server_tx.send(ServerMessage::PacketReceived { packet, addr })
                            {
                                error!("Failed to send packet to main loop: {}", e);
                                break;
                            }
                        } else {
                            warn!("Failed to deserialize packet from {}", addr);
                        }
                    }
                    Err(e) => {
                        error!("Error receiving packet: {}", e);
                        tokio::time::sleep(Duration::from_millis(10)).await;
                    }
                }
            }
        });
    }

    /// Spawns task that frames lobby events and direct replies onto the socket
    fn spawn_network_sender(&mut self) {
        let socket = Arc::clone(&self.socket);
        let clients = Arc::clone(&self.clients);
        let (Some(mut direct_rx), Some(mut outbound_rx)) =
            (self.direct_rx.take(), self.outbound_rx.take())
        else {
            warn!("Network sender already running");
            return;
        };

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    Some(direct) = direct_rx.recv() => {
                        if let Err(e) = Self::send_packet_impl(&socket, &direct.packet, direct.addr).await {
                            error!("Failed to send packet to {}: {}", direct.addr, e);
                        }
                    }
                    Some(outbound) = outbound_rx.recv() => {
                        let addr = clients.read().await.get_addr(outbound.client_id);
                        let Some(addr) = addr else {
                            debug!("Dropping event for departed client {}", outbound.client_id);
                            continue;
                        };
                        let packet = Packet::Server(outbound.event);
                        if let Err(e) = Self::send_packet_impl(&socket, &packet, addr).await {
                            error!("Failed to send to client {}: {}", outbound.client_id, e);
                        }
                    }
                    else => break,
                }
            }
        });
    }

    /// Spawns task that monitors client liveness
    fn spawn_timeout_checker(&self) {
        let clients = Arc::clone(&self.clients);
        let server_tx = self.server_tx.clone();
        let idle_after = self.idle_after;
        let drop_after = self.drop_after;

        tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(1));

            loop {
                interval.tick().await;

                let report = {
                    let mut clients_guard = clients.write().await;
                    clients_guard.check_timeouts(idle_after, drop_after)
                };

                let messages = report
                    .idle
                    .into_iter()
                    .map(|client_id| ServerMessage::ClientIdle { client_id })
                    .chain(
                        report
                            .dropped
                            .into_iter()
                            .map(|client_id| ServerMessage::ClientTimeout { client_id }),
                    );
                for message in messages {
                    if let Err(e) = server_tx.send(message) {
                        error!("Failed to send timeout message: {}", e);
                        return;
                    }
                }
            }
        });
    }

    async fn send_packet_impl(
        socket: &UdpSocket,
        packet: &Packet,
        addr: SocketAddr,
    ) -> Result<(), Box<dyn std::error::Error>> {
        let data = serialize(packet)?;
        if data.len() > MAX_PACKET_SIZE {
            return Err(format!("packet of {} bytes does not fit a datagram", data.len()).into());
        }
        socket.send_to(&data, addr).await?;
        Ok(())
    }

    fn send_packet(&self, packet: Packet, addr: SocketAddr) {
        if let Err(e) = self.direct_tx.send(DirectPacket { packet, addr }) {
            error!("Failed to queue packet for sending: {}", e);
        }
    }

    async fn client_at(&self, addr: SocketAddr) -> Option<PlayerId> {
        self.clients.read().await.find_client_by_addr(addr)
    }

    /// Records activity and restores the roster entry of a client that had
    /// gone idle.
    async fn touch(&mut self, client_id: PlayerId) {
        let was_idle = self.clients.write().await.touch(client_id);
        if was_idle {
            info!("Client {} is back", client_id);
            self.router.set_liveness(client_id, true).await;
        }
    }

    /// Processes incoming packets
    async fn handle_packet(&mut self, packet: Packet, addr: SocketAddr) {
        match packet {
            Packet::Connect { client_version } => {
                info!(
                    "Client connecting from {} (version: {})",
                    addr, client_version
                );

                // Remove existing connection if present
                if let Some(existing_id) = self.client_at(addr).await {
                    info!("Removing existing client {} from {}", existing_id, addr);
                    self.clients.write().await.remove_client(&existing_id);
                    self.router.disconnect(existing_id).await;
                }

                let client_id = self.clients.write().await.add_client(addr);

                let response = match client_id {
                    Some(client_id) => Packet::Connected { client_id },
                    None => Packet::Disconnected {
                        reason: GameError::ServerFull.to_string(),
                    },
                };
                self.send_packet(response, addr);
            }

            Packet::Heartbeat => {
                if let Some(client_id) = self.client_at(addr).await {
                    self.touch(client_id).await;
                }
            }

            Packet::Disconnect => {
                if let Some(client_id) = self.client_at(addr).await {
                    self.clients.write().await.remove_client(&client_id);
                    self.router.disconnect(client_id).await;
                }
            }

            Packet::Client(event) => match self.client_at(addr).await {
                Some(client_id) => {
                    self.touch(client_id).await;
                    self.router.route(client_id, event).await;
                }
                None => {
                    warn!("Event {} from unconnected address {}", event.name(), addr);
                    self.send_packet(
                        Packet::Disconnected {
                            reason: "Not connected".to_string(),
                        },
                        addr,
                    );
                }
            },

            _ => {
                warn!("Unexpected packet type from client at {}", addr);
            }
        }
    }

    /// Main server loop coordinating all operations
    pub async fn run(&mut self) -> Result<(), Box<dyn std::error::Error>> {
        // Initialize concurrent tasks
        self.spawn_network_receiver();
        self.spawn_network_sender();
        self.spawn_timeout_checker();

        info!("Server started successfully");

        while let Some(message) = self.server_rx.recv().await {
            match message {
                ServerMessage::PacketReceived { packet, addr } => {
                    self.handle_packet(packet, addr).await;
                }
                ServerMessage::ClientIdle { client_id } => {
                    info!("Client {} went quiet", client_id);
                    self.router.set_liveness(client_id, false).await;
                }
                ServerMessage::ClientTimeout { client_id } => {
                    info!("Client {} timed out", client_id);
                    self.router.disconnect(client_id).await;
                }
                ServerMessage::JoinFailed { client_id, code } => {
                    self.router.join_failed(client_id, &code);
                }
                ServerMessage::Shutdown => break,
            }
        }

        info!("Server shutting down");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;
    use shared::{ClientEvent, ServerEvent};
    use tokio::time::timeout;

    async fn start(max_clients: &str) -> (SocketAddr, mpsc::UnboundedSender<ServerMessage>) {
        let config = ServerConfig::parse_from(["server", "--port", "0", "--max-clients", max_clients]);
        let mut server = Server::new(&config).await.unwrap();
        let addr = server.local_addr().unwrap();
        let control = server.control();
        tokio::spawn(async move { server.run().await.unwrap() });
        (addr, control)
    }

    async fn exchange(socket: &UdpSocket, server: SocketAddr, packet: &Packet) -> Packet {
        socket.send_to(&serialize(packet).unwrap(), server).await.unwrap();
        receive(socket).await
    }

    async fn receive(socket: &UdpSocket) -> Packet {
        let mut buffer = vec![0u8; MAX_PACKET_SIZE];
        let (len, _) = timeout(Duration::from_secs(2), socket.recv_from(&mut buffer))
            .await
            .expect("no reply from server")
            .unwrap();
        deserialize(&buffer[..len]).unwrap()
    }

    #[tokio::test]
    async fn test_connect_and_create_lobby() {
        let (server, control) = start("4").await;
        let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();

        let reply = exchange(&socket, server, &Packet::Connect { client_version: 1 }).await;
        let client_id = match reply {
            Packet::Connected { client_id } => client_id,
            other => panic!("Unexpected packet {:?}", other),
        };

        let create = Packet::Client(ClientEvent::CreateLobby {
            lobby_name: "Sprint".to_string(),
            host_name: "Ada".to_string(),
        });
        match exchange(&socket, server, &create).await {
            Packet::Server(ServerEvent::LobbyJoined { player_id, lobby }) => {
                assert_eq!(player_id, client_id);
                assert_eq!(lobby.host_id, client_id);
            }
            other => panic!("Unexpected packet {:?}", other),
        }

        control.send(ServerMessage::Shutdown).unwrap();
    }

    #[tokio::test]
    async fn test_oversized_default_scale_refused() {
        let scale = (0..40).map(|v| v.to_string()).collect::<Vec<_>>().join(",");
        let config = ServerConfig::parse_from(["server", "--port", "0", "--estimation-scale", scale.as_str()]);

        assert!(Server::new(&config).await.is_err());
    }

    #[tokio::test]
    async fn test_server_full() {
        let (server, control) = start("1").await;
        let first = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let second = UdpSocket::bind("127.0.0.1:0").await.unwrap();

        let connect = Packet::Connect { client_version: 1 };
        assert!(matches!(
            exchange(&first, server, &connect).await,
            Packet::Connected { .. }
        ));
        match exchange(&second, server, &connect).await {
            Packet::Disconnected { reason } => assert_eq!(reason, "Server full"),
            other => panic!("Unexpected packet {:?}", other),
        }

        control.send(ServerMessage::Shutdown).unwrap();
    }

    #[tokio::test]
    async fn test_event_before_connect_is_refused() {
        let (server, control) = start("4").await;
        let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();

        let reply = exchange(&socket, server, &Packet::Client(ClientEvent::Reveal)).await;
        assert!(matches!(reply, Packet::Disconnected { .. }));

        control.send(ServerMessage::Shutdown).unwrap();
    }

    #[tokio::test]
    async fn test_game_error_reaches_sender() {
        let (server, control) = start("4").await;
        let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        exchange(&socket, server, &Packet::Connect { client_version: 1 }).await;

        match exchange(&socket, server, &Packet::Client(ClientEvent::Reveal)).await {
            Packet::Server(ServerEvent::GameError { message }) => {
                assert_eq!(message, "You are not in a lobby")
            }
            other => panic!("Unexpected packet {:?}", other),
        }

        control.send(ServerMessage::Shutdown).unwrap();
    }
}
