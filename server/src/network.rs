//! Server network layer handling UDP handshakes and the admission flow

use crate::admission::{AdmissionPipeline, AdmissionResult, ConnectionAttempt};
use crate::error::ServerError;
use crate::notify::OperatorNotifier;
use crate::registry::OnlineRegistry;
use crate::state::AdmissionState;
use bincode::{deserialize, serialize};
use log::{debug, error, info, warn};
use shared::{Packet, Rank, MAX_MESSAGE_LENGTH, PROTOCOL_VERSION};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::net::UdpSocket;
use tokio::sync::mpsc;
use tokio::time::interval;

pub const PLAYER_TIMEOUT: Duration = Duration::from_secs(30);
pub const DUPLICATE_LOGIN_MESSAGE: &str = "Someone logged in as you!";

/// Messages sent from network tasks to main server loop
#[derive(Debug)]
pub enum ServerMessage {
    PacketReceived { packet: Packet, addr: SocketAddr },
    PlayerTimeout { name: String },
    Shutdown,
}

/// Messages queued for the sender task
#[derive(Debug)]
pub enum OutboundMessage {
    SendPacket {
        packet: Packet,
        addr: SocketAddr,
    },
    /// Sends to every online player ranked at least `min_rank`
    BroadcastPacket {
        packet: Packet,
        min_rank: Rank,
        exclude: Option<u32>,
    },
}

/// Routes operator notices to online operators as chat messages.
pub struct NetworkNotifier {
    outbound: mpsc::UnboundedSender<OutboundMessage>,
}

impl NetworkNotifier {
    pub fn new(outbound: mpsc::UnboundedSender<OutboundMessage>) -> Self {
        Self { outbound }
    }
}

impl OperatorNotifier for NetworkNotifier {
    fn notify_ops(&self, message: &str) {
        info!("(to ops) {}", message);
        let text: String = message.chars().take(MAX_MESSAGE_LENGTH).collect();
        if let Err(e) = self.outbound.send(OutboundMessage::BroadcastPacket {
            packet: Packet::Message { text },
            min_rank: Rank::OPERATOR,
            exclude: None,
        }) {
            error!("Failed to queue operator notice: {}", e);
        }
    }
}

/// Runs admission for one handshake and returns the packets to send.
///
/// On acceptance the player is registered; any older session under the same
/// name is dropped and told why.
pub fn complete_handshake(
    pipeline: &AdmissionPipeline,
    online: &OnlineRegistry,
    name: String,
    mppass: String,
    addr: SocketAddr,
) -> Vec<(Packet, SocketAddr)> {
    let attempt = ConnectionAttempt::new(name.clone(), mppass, addr.ip());

    match pipeline.admit(attempt) {
        AdmissionResult::Accepted { rank, .. } => {
            let mut replies = Vec::new();
            if let Some(old) = online.find_by_name(&name).and_then(|id| online.remove(id)) {
                replies.push((
                    Packet::Kicked {
                        reason: DUPLICATE_LOGIN_MESSAGE.to_string(),
                        fatal: true,
                    },
                    old.addr,
                ));
            }
            let client_id = online.insert(&name, addr, rank);
            replies.push((Packet::Admitted { client_id, rank }, addr));
            replies
        }
        AdmissionResult::Rejected(rejection) => vec![(
            Packet::Kicked {
                reason: rejection.reason,
                fatal: rejection.fatal,
            },
            addr,
        )],
    }
}

/// Main server coordinating networking and admission
pub struct Server {
    socket: Arc<UdpSocket>,
    state: AdmissionState,
    pipeline: Arc<AdmissionPipeline>,
    tick_duration: Duration,
    tick: u64,

    // Communication channels
    server_tx: mpsc::UnboundedSender<ServerMessage>,
    server_rx: mpsc::UnboundedReceiver<ServerMessage>,
    outbound_tx: mpsc::UnboundedSender<OutboundMessage>,
    outbound_rx: mpsc::UnboundedReceiver<OutboundMessage>,
}

impl Server {
    /// Binds the socket and builds the pipeline over `state`.
    ///
    /// The state's operator notifier is replaced with one that messages
    /// online operators.
    pub async fn new(
        addr: &str,
        tick_duration: Duration,
        state: AdmissionState,
    ) -> Result<Self, ServerError> {
        let socket = UdpSocket::bind(addr)
            .await
            .map_err(|source| ServerError::Bind {
                addr: addr.to_string(),
                source,
            })?;
        let socket = Arc::new(socket);
        info!("Server listening on {}", socket.local_addr()?);

        let (server_tx, server_rx) = mpsc::unbounded_channel();
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();

        let state = state.with_notifier(Arc::new(NetworkNotifier::new(outbound_tx.clone())));
        let pipeline = Arc::new(AdmissionPipeline::new(&state));

        Ok(Server {
            socket,
            state,
            pipeline,
            tick_duration,
            tick: 0,
            server_tx,
            server_rx,
            outbound_tx,
            outbound_rx,
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr, ServerError> {
        Ok(self.socket.local_addr()?)
    }

    pub fn state(&self) -> &AdmissionState {
        &self.state
    }

    /// Sender that can stop the main loop with [`ServerMessage::Shutdown`].
    pub fn control_handle(&self) -> mpsc::UnboundedSender<ServerMessage> {
        self.server_tx.clone()
    }

    /// Spawns task that continuously listens for incoming packets
    fn spawn_network_receiver(&self) {
        let socket = Arc::clone(&self.socket);
        let server_tx = self.server_tx.clone();

        tokio::spawn(async move {
            let mut buffer = [0u8; 2048];

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

    /// Spawns task that processes outgoing packet queue
    fn spawn_network_sender(&mut self) {
        let socket = Arc::clone(&self.socket);
        let online = Arc::clone(&self.state.online);
        let mut outbound_rx =
            std::mem::replace(&mut self.outbound_rx, mpsc::unbounded_channel().1);

        tokio::spawn(async move {
            while let Some(message) = outbound_rx.recv().await {
                match message {
                    OutboundMessage::SendPacket { packet, addr } => {
                        if let Err(e) = Self::send_packet_impl(&socket, &packet, addr).await {
                            error!("Failed to send packet to {}: {}", addr, e);
                        }
                    }
                    OutboundMessage::BroadcastPacket {
                        packet,
                        min_rank,
                        exclude,
                    } => {
                        for (id, addr) in online.addrs_at_or_above(min_rank) {
                            if Some(id) == exclude {
                                continue;
                            }
                            if let Err(e) = Self::send_packet_impl(&socket, &packet, addr).await {
                                error!("Failed to send to player {}: {}", id, e);
                            }
                        }
                    }
                }
            }
        });
    }

    /// Spawns task that removes players who stopped sending heartbeats
    fn spawn_timeout_checker(&self) {
        let online = Arc::clone(&self.state.online);
        let server_tx = self.server_tx.clone();

        tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(1));

            loop {
                interval.tick().await;

                for player in online.remove_timed_out(PLAYER_TIMEOUT) {
                    if let Err(e) = server_tx.send(ServerMessage::PlayerTimeout { name: player.name }) {
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
    ) -> Result<(), ServerError> {
        let data = serialize(packet)?;
        socket.send_to(&data, addr).await?;
        Ok(())
    }

    fn send_packet(&self, packet: Packet, addr: SocketAddr) {
        if let Err(e) = self
            .outbound_tx
            .send(OutboundMessage::SendPacket { packet, addr })
        {
            error!("Failed to queue packet for sending: {}", e);
        }
    }

    fn broadcast_message(&self, text: String, exclude: Option<u32>) {
        let packet = Packet::Message { text };
        if let Err(e) = self.outbound_tx.send(OutboundMessage::BroadcastPacket {
            packet,
            min_rank: Rank(i32::MIN),
            exclude,
        }) {
            error!("Failed to queue broadcast packet: {}", e);
        }
    }

    /// Runs admission off the main loop; it may block on saving ban files.
    fn handle_handshake(&self, name: String, mppass: String, addr: SocketAddr) {
        let pipeline = Arc::clone(&self.pipeline);
        let online = Arc::clone(&self.state.online);
        let outbound_tx = self.outbound_tx.clone();

        tokio::task::spawn_blocking(move || {
            for (packet, addr) in complete_handshake(&pipeline, &online, name, mppass, addr) {
                if let Err(e) = outbound_tx.send(OutboundMessage::SendPacket { packet, addr }) {
                    error!("Failed to queue admission reply: {}", e);
                }
            }
        });
    }

    /// Processes incoming packets
    fn handle_packet(&mut self, packet: Packet, addr: SocketAddr) {
        match packet {
            Packet::Handshake {
                protocol_version,
                name,
                mppass,
            } => {
                info!(
                    "Handshake from {} as {} (version: {})",
                    addr, name, protocol_version
                );

                if protocol_version != PROTOCOL_VERSION {
                    self.send_packet(
                        Packet::Disconnected {
                            reason: format!(
                                "Unsupported protocol version {} (expected {})",
                                protocol_version, PROTOCOL_VERSION
                            ),
                        },
                        addr,
                    );
                    return;
                }

                // A fresh handshake replaces whatever session this address had
                if let Some(existing) = self.state.online.find_by_addr(addr) {
                    info!("Removing existing player {} from {}", existing, addr);
                    self.state.online.remove(existing);
                }

                self.handle_handshake(name, mppass, addr);
            }

            Packet::Heartbeat => {
                if let Some(id) = self.state.online.find_by_addr(addr) {
                    self.state.online.touch(id);
                }
            }

            Packet::Disconnect => {
                if let Some(player) = self
                    .state
                    .online
                    .find_by_addr(addr)
                    .and_then(|id| self.state.online.remove(id))
                {
                    self.broadcast_message(format!("{} left the game", player.name), None);
                }
            }

            _ => {
                warn!("Unexpected packet type from client at {}", addr);
            }
        }
    }

    /// Periodic housekeeping
    fn on_tick(&mut self) {
        self.tick += 1;
        self.state.throttle.cleanup(Instant::now());

        if self.tick % 60 == 0 {
            let online = self.state.online.count();
            if online > 0 {
                debug!(
                    "Tick {}: {} players online ({} max)",
                    self.tick, online, self.state.config.max_players
                );
            }
        }
    }

    /// Main server loop coordinating all operations
    pub async fn run(&mut self) -> Result<(), ServerError> {
        // Initialize concurrent tasks
        self.spawn_network_receiver();
        self.spawn_network_sender();
        self.spawn_timeout_checker();

        let mut tick_interval = interval(self.tick_duration);

        info!("Server '{}' started successfully", self.state.config.server_name);

        loop {
            tokio::select! {
                // Handle network events
                message = self.server_rx.recv() => {
                    match message {
                        Some(ServerMessage::PacketReceived { packet, addr }) => {
                            self.handle_packet(packet, addr);
                        },
                        Some(ServerMessage::PlayerTimeout { name }) => {
                            self.broadcast_message(format!("{} timed out", name), None);
                        },
                        Some(ServerMessage::Shutdown) | None => {
                            info!("Server shutting down");
                            break;
                        }
                    }
                },

                // Handle server tick events
                _ = tick_interval.tick() => {
                    self.on_tick();
                },
            }
        }

        if let Err(e) = self.state.save_all() {
            error!("Failed to flush stores on shutdown: {}", e);
        }
        Ok(())
    }
}
