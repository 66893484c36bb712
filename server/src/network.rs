//! Server network layer: UDP transport, event loop, and relay fan-out
//!
//! All state mutation happens on one `tokio::select!` loop; auxiliary tasks
//! (socket receiver, outbound sender, the two liveness timers, the admin
//! listener) communicate with it exclusively over channels. Logout, liveness
//! timeout, and admin kick converge on a single removal routine so the three
//! paths are behaviorally identical.

use crate::admin::ServerStats;
use crate::liveness::LivenessMonitor;
use crate::registry::SessionRegistry;
use bincode::{deserialize, serialize};
use log::{debug, error, info, warn};
use shared::{Packet, MAX_PACKET_SIZE, MIN_STROKE_POINTS, MISS_CHECK_INTERVAL, PROBE_INTERVAL};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::sync::{mpsc, oneshot, RwLock};

/// Messages sent from auxiliary tasks to the main server loop
#[derive(Debug)]
pub enum ServerMessage {
    PacketReceived {
        packet: Packet,
        addr: SocketAddr,
    },
    /// Time to probe every connection.
    ProbeTick,
    /// Time to sweep for connections that missed their probe window.
    MissCheckTick,
    #[allow(dead_code)]
    Shutdown,
}

/// Messages queued for the outbound sender task
#[derive(Debug)]
pub enum Outbound {
    Send {
        packet: Packet,
        addr: SocketAddr,
    },
    Broadcast {
        packet: Packet,
        exclude: Option<u32>,
    },
}

/// Control inputs from the admin HTTP surface
#[derive(Debug)]
pub enum AdminCommand {
    Kick {
        player_id: u32,
        reply: oneshot::Sender<bool>,
    },
}

/// Bidirectional mapping between participant ids and transport addresses.
///
/// Written only by the main loop; the sender task reads it for broadcast
/// fan-out.
#[derive(Debug, Default)]
pub struct ConnectionTable {
    by_addr: HashMap<SocketAddr, u32>,
    by_id: HashMap<u32, SocketAddr>,
}

impl ConnectionTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, id: u32, addr: SocketAddr) {
        self.by_addr.insert(addr, id);
        self.by_id.insert(id, addr);
    }

    pub fn remove(&mut self, id: u32) -> Option<SocketAddr> {
        let addr = self.by_id.remove(&id);
        if let Some(addr) = addr {
            self.by_addr.remove(&addr);
        }
        addr
    }

    pub fn id_for(&self, addr: SocketAddr) -> Option<u32> {
        self.by_addr.get(&addr).copied()
    }

    pub fn addr_for(&self, id: u32) -> Option<SocketAddr> {
        self.by_id.get(&id).copied()
    }

    pub fn entries(&self) -> Vec<(u32, SocketAddr)> {
        self.by_id.iter().map(|(id, addr)| (*id, *addr)).collect()
    }

    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }
}

/// Timer tuning, overridable for tests and small deployments.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub probe_interval: Duration,
    pub miss_check_interval: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            probe_interval: PROBE_INTERVAL,
            miss_check_interval: MISS_CHECK_INTERVAL,
        }
    }
}

/// Main presence server coordinating the registry, liveness, and relays
pub struct Server {
    socket: Arc<UdpSocket>,
    connections: Arc<RwLock<ConnectionTable>>,
    registry: SessionRegistry,
    liveness: LivenessMonitor,
    config: ServerConfig,
    stats: Arc<ServerStats>,

    server_tx: mpsc::UnboundedSender<ServerMessage>,
    server_rx: mpsc::UnboundedReceiver<ServerMessage>,
    net_tx: mpsc::UnboundedSender<Outbound>,
    net_rx: mpsc::UnboundedReceiver<Outbound>,
    admin_tx: mpsc::UnboundedSender<AdminCommand>,
    admin_rx: mpsc::UnboundedReceiver<AdminCommand>,
}

impl Server {
    pub async fn new(addr: &str, config: ServerConfig) -> Result<Self, Box<dyn std::error::Error>> {
        let socket = Arc::new(UdpSocket::bind(addr).await?);
        info!("Server listening on {}", socket.local_addr()?);

        let (server_tx, server_rx) = mpsc::unbounded_channel();
        let (net_tx, net_rx) = mpsc::unbounded_channel();
        let (admin_tx, admin_rx) = mpsc::unbounded_channel();

        Ok(Server {
            socket,
            connections: Arc::new(RwLock::new(ConnectionTable::new())),
            registry: SessionRegistry::new(net_tx.clone()),
            liveness: LivenessMonitor::new(),
            config,
            stats: Arc::new(ServerStats::new()),
            server_tx,
            server_rx,
            net_tx,
            net_rx,
            admin_tx,
            admin_rx,
        })
    }

    /// Address the UDP socket actually bound to (useful with port 0).
    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    /// Handle the admin surface uses to feed control commands into the loop.
    pub fn admin_sender(&self) -> mpsc::UnboundedSender<AdminCommand> {
        self.admin_tx.clone()
    }

    /// Shared stats snapshot read by the admin surface.
    pub fn stats(&self) -> Arc<ServerStats> {
        Arc::clone(&self.stats)
    }

    /// Spawns task that continuously listens for incoming packets
    fn spawn_network_receiver(&self) {
        let socket = Arc::clone(&self.socket);
        let server_tx = self.server_tx.clone();

        tokio::spawn(async move {
            let mut buffer = [0u8; MAX_PACKET_SIZE];

            loop {
                match socket.recv_from(&mut buffer).await {
                    Ok((len, addr)) => {
                        if let Ok(packet) = deserialize::<Packet>(&buffer[0..len]) {
                            if server_tx
                                .send(ServerMessage::PacketReceived { packet, addr })
                                .is_err()
                            {
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

    /// Spawns task that drains the outbound queue and fans broadcasts out
    /// over the connection table. Roster broadcasts also refresh the stats
    /// mirror on the way past.
    fn spawn_network_sender(&mut self) {
        let socket = Arc::clone(&self.socket);
        let connections = Arc::clone(&self.connections);
        let stats = Arc::clone(&self.stats);
        let mut net_rx = std::mem::replace(&mut self.net_rx, mpsc::unbounded_channel().1);

        tokio::spawn(async move {
            while let Some(message) = net_rx.recv().await {
                match message {
                    Outbound::Send { packet, addr } => {
                        if let Err(e) = Self::send_packet_impl(&socket, &packet, addr).await {
                            error!("Failed to send packet to {}: {}", addr, e);
                        }
                    }
                    Outbound::Broadcast { packet, exclude } => {
                        if let Packet::Roster { participants } = &packet {
                            stats.set_roster(participants.clone()).await;
                        }

                        let targets = {
                            let table = connections.read().await;
                            table.entries()
                        };

                        for (id, addr) in targets {
                            if Some(id) == exclude {
                                continue;
                            }
                            if let Err(e) = Self::send_packet_impl(&socket, &packet, addr).await {
                                error!("Failed to send to participant {}: {}", id, e);
                            }
                        }
                    }
                }
            }
        });
    }

    /// Spawns the probe timer and the miss-check timer. Both only ever send
    /// tick messages into the main loop, so all liveness mutation happens on
    /// the single event-processing path and the timers die with the loop.
    fn spawn_liveness_timers(&self) {
        let probe_tx = self.server_tx.clone();
        let probe_interval = self.config.probe_interval;
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(probe_interval);
            interval.tick().await; // the first tick fires immediately
            loop {
                interval.tick().await;
                if probe_tx.send(ServerMessage::ProbeTick).is_err() {
                    break;
                }
            }
        });

        let sweep_tx = self.server_tx.clone();
        let miss_interval = self.config.miss_check_interval;
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(miss_interval);
            interval.tick().await;
            loop {
                interval.tick().await;
                if sweep_tx.send(ServerMessage::MissCheckTick).is_err() {
                    break;
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
        socket.send_to(&data, addr).await?;
        Ok(())
    }

    fn send_to(&self, packet: Packet, addr: SocketAddr) {
        if let Err(e) = self.net_tx.send(Outbound::Send { packet, addr }) {
            error!("Failed to queue packet for sending: {}", e);
        }
    }

    fn broadcast(&self, packet: Packet, exclude: Option<u32>) {
        if let Err(e) = self.net_tx.send(Outbound::Broadcast { packet, exclude }) {
            error!("Failed to queue broadcast packet: {}", e);
        }
    }

    /// Processes one inbound packet on the single-threaded mutation path
    async fn handle_packet(&mut self, packet: Packet, addr: SocketAddr) {
        match packet {
            Packet::Login { display_name } => self.handle_login(display_name, addr).await,

            Packet::VoiceReady { voice_addr } => {
                if let Some(id) = self.id_for(addr).await {
                    self.registry.set_voice_addr(id, voice_addr);
                }
            }

            Packet::Move { position, yaw } => {
                if let Some(id) = self.id_for(addr).await {
                    self.registry.set_position(id, position, yaw);
                }
            }

            Packet::MicState { muted } => {
                if let Some(id) = self.id_for(addr).await {
                    self.registry.set_mic_muted(id, muted);
                }
            }

            Packet::SpeakerState { muted } => {
                if let Some(id) = self.id_for(addr).await {
                    self.registry.set_speaker_muted(id, muted);
                }
            }

            Packet::Chat { text, mentions } => {
                let Some(id) = self.id_for(addr).await else {
                    return;
                };
                let Some(name) = self.registry.display_name(id).map(String::from) else {
                    return;
                };

                self.stats.push_chat(format!("{}: {}", name, text)).await;

                // The sender renders its own message locally; relay to
                // everyone else only.
                self.broadcast(
                    Packet::ChatRelay {
                        sender_id: id,
                        sender_name: name,
                        text,
                        mentions,
                        timestamp: shared::now_millis(),
                    },
                    Some(id),
                );
            }

            Packet::Stamp { glyph } => {
                let Some(id) = self.id_for(addr).await else {
                    return;
                };
                if glyph.is_empty() {
                    return;
                }
                if let Some(name) = self.registry.display_name(id) {
                    debug!("Stamp from {}: {}", name, glyph);
                }
                self.broadcast(Packet::StampRelay { owner_id: id, glyph }, Some(id));
            }

            Packet::Stroke {
                points,
                color,
                timestamp,
            } => {
                let Some(id) = self.id_for(addr).await else {
                    return;
                };
                if points.len() < MIN_STROKE_POINTS {
                    debug!("Dropping unfinished stroke from participant {}", id);
                    return;
                }
                self.broadcast(
                    Packet::StrokeRelay {
                        owner_id: id,
                        points,
                        color,
                        timestamp,
                    },
                    Some(id),
                );
            }

            Packet::ProbeAck => {
                if let Some(id) = self.id_for(addr).await {
                    self.liveness.mark_ack(id);
                }
            }

            Packet::Logout => {
                if let Some(id) = self.id_for(addr).await {
                    self.drop_participant(id, "logout").await;
                }
            }

            _ => {
                warn!("Unexpected packet type from client at {}", addr);
            }
        }
    }

    async fn handle_login(&mut self, display_name: String, addr: SocketAddr) {
        // A fresh login from an address that is already logged in replaces
        // the old session, exactly like a reconnect after a silent drop.
        if let Some(existing) = self.id_for(addr).await {
            info!("Replacing existing session {} from {}", existing, addr);
            self.drop_participant(existing, "replaced by new login").await;
        }

        match self.registry.login(&display_name) {
            Ok(id) => {
                self.connections.write().await.insert(id, addr);
                self.liveness.track(id);
                self.stats
                    .push_login(format!("login: {} (id {})", display_name, id))
                    .await;
                self.send_to(Packet::LoginAccepted { id, display_name }, addr);
                // The registry's login broadcast raced the connection-table
                // insert, so hand the newcomer the current roster directly.
                self.send_to(
                    Packet::Roster {
                        participants: self.registry.snapshot(),
                    },
                    addr,
                );
            }
            Err(error) => {
                info!("Rejected login '{}' from {}: {}", display_name, addr, error);
                self.send_to(Packet::LoginRejected { error }, addr);
            }
        }
    }

    async fn handle_admin(&mut self, command: AdminCommand) {
        match command {
            AdminCommand::Kick { player_id, reply } => {
                let addr = self.connections.read().await.addr_for(player_id);
                if let Some(addr) = addr {
                    if let Some(name) = self.registry.display_name(player_id) {
                        self.stats
                            .push_server(format!("kicked by admin: {} (id {})", name, player_id))
                            .await;
                    }
                    self.send_to(Packet::Kicked, addr);
                    // Identical to a liveness-timeout removal from here on.
                    self.drop_participant(player_id, "admin kick").await;
                }
                let _ = reply.send(addr.is_some());
            }
        }
    }

    /// The one removal routine shared by logout, liveness timeout, and kick.
    async fn drop_participant(&mut self, id: u32, reason: &str) {
        self.liveness.untrack(id);
        self.connections.write().await.remove(id);

        if let Some(p) = self.registry.remove(id) {
            self.stats
                .push_login(format!(
                    "logout: {} (id {}) [{}]",
                    p.display_name, id, reason
                ))
                .await;
        }
    }

    async fn id_for(&self, addr: SocketAddr) -> Option<u32> {
        self.connections.read().await.id_for(addr)
    }

    /// Dispatches one loop message; split out of `run` so tests can drive
    /// the loop synchronously.
    async fn handle_message(&mut self, message: ServerMessage) -> bool {
        match message {
            ServerMessage::PacketReceived { packet, addr } => {
                self.handle_packet(packet, addr).await;
                true
            }
            ServerMessage::ProbeTick => {
                if !self.registry.is_empty() {
                    self.broadcast(Packet::Probe, None);
                }
                true
            }
            ServerMessage::MissCheckTick => {
                for id in self.liveness.sweep() {
                    info!("Participant {} unresponsive, dropping", id);
                    self.drop_participant(id, "liveness timeout").await;
                }
                true
            }
            ServerMessage::Shutdown => false,
        }
    }

    /// Main server loop coordinating all operations
    pub async fn run(&mut self) -> Result<(), Box<dyn std::error::Error>> {
        self.spawn_network_receiver();
        self.spawn_network_sender();
        self.spawn_liveness_timers();

        info!("Server started successfully");

        loop {
            tokio::select! {
                message = self.server_rx.recv() => {
                    match message {
                        Some(message) => {
                            if !self.handle_message(message).await {
                                info!("Server shutting down");
                                break;
                            }
                        }
                        None => {
                            info!("Server shutting down");
                            break;
                        }
                    }
                },
                command = self.admin_rx.recv() => {
                    if let Some(command) = command {
                        self.handle_admin(command).await;
                    }
                },
            }
        }

        Ok(())
    }
}
