//! Client event loop
//!
//! One `tokio::select!` loop coordinates the three asynchronous domains:
//! the render-cadence update tick (interpolation, ephemeral expiry, the
//! throttled position push), arrival of server packets, and voice-transport
//! events. Voice negotiation is long-latency and fallible, so its events
//! arrive over a channel and never block rendering or reconciliation.

use crate::chat::{extract_mentions, ChatEntry, ChatLog};
use crate::ephemeral::{StampBoard, Stroke, StrokeBoard};
use crate::interp::{self, PushGate};
use crate::presence::Reconciler;
use crate::scene::{AvatarScene, ChatSink, PoseSource};
use crate::voice::{VoiceEvent, VoiceMesh, VoiceTransport};
use bincode::{deserialize, serialize};
use log::{debug, error, info, warn};
use shared::{LoginError, Packet, Participant, StrokePoint, MAX_PACKET_SIZE, MIN_STROKE_POINTS};
use std::net::SocketAddr;
use std::time::{Duration, Instant};
use tokio::net::UdpSocket;
use tokio::sync::mpsc;
use tokio::time::interval;

const UPDATE_TICK: Duration = Duration::from_millis(16);
const LOGIN_RETRY_INTERVAL: Duration = Duration::from_secs(2);
const MAX_LOGIN_ATTEMPTS: u32 = 5;

pub struct Client {
    socket: UdpSocket,
    server_addr: SocketAddr,
    display_name: String,
    id: Option<u32>,
    connected: bool,
    active: bool,
    login_attempts: u32,
    login_error: Option<LoginError>,
    /// Roster that arrived before our login reply; applied once the id is
    /// known so self-exclusion works.
    pending_roster: Option<Vec<Participant>>,
    voice_announced: bool,

    reconciler: Reconciler,
    scene: Box<dyn AvatarScene>,
    pose: Box<dyn PoseSource>,
    chat_log: ChatLog,
    chat_sink: Box<dyn ChatSink>,
    stamps: StampBoard,
    strokes: StrokeBoard,
    voice: VoiceMesh,
    push_gate: PushGate,

    voice_tx: mpsc::UnboundedSender<VoiceEvent>,
    voice_rx: mpsc::UnboundedReceiver<VoiceEvent>,
}

impl Client {
    pub async fn new(
        server_addr: &str,
        display_name: &str,
        scene: Box<dyn AvatarScene>,
        pose: Box<dyn PoseSource>,
        chat_sink: Box<dyn ChatSink>,
        transport: Box<dyn VoiceTransport>,
    ) -> Result<Self, Box<dyn std::error::Error>> {
        let socket = UdpSocket::bind("0.0.0.0:0").await?;
        let server_addr = server_addr.parse()?;
        let (voice_tx, voice_rx) = mpsc::unbounded_channel();

        Ok(Client {
            socket,
            server_addr,
            display_name: display_name.to_string(),
            id: None,
            connected: false,
            active: false,
            login_attempts: 0,
            login_error: None,
            pending_roster: None,
            voice_announced: false,
            reconciler: Reconciler::new(),
            scene,
            pose,
            chat_log: ChatLog::new(),
            chat_sink,
            stamps: StampBoard::new(),
            strokes: StrokeBoard::new(),
            voice: VoiceMesh::new(transport),
            push_gate: PushGate::new(),
            voice_tx,
            voice_rx,
        })
    }

    /// Sender the voice-transport implementation uses to report media events
    /// into the loop.
    pub fn voice_event_sender(&self) -> mpsc::UnboundedSender<VoiceEvent> {
        self.voice_tx.clone()
    }

    pub fn id(&self) -> Option<u32> {
        self.id
    }

    pub fn is_connected(&self) -> bool {
        self.connected
    }

    async fn connect(&mut self) -> Result<(), Box<dyn std::error::Error>> {
        info!("Logging in as {}...", self.display_name);
        self.login_attempts = 1;
        self.send_packet(&Packet::Login {
            display_name: self.display_name.clone(),
        })
        .await
    }

    async fn send_packet(&self, packet: &Packet) -> Result<(), Box<dyn std::error::Error>> {
        let data = serialize(packet)?;
        self.socket.send_to(&data, self.server_addr).await?;
        Ok(())
    }

    async fn handle_packet(&mut self, packet: Packet) {
        match packet {
            Packet::LoginAccepted { id, display_name } => {
                info!("Logged in as {} (id {})", display_name, id);
                self.id = Some(id);
                self.connected = true;
                if let Some(roster) = self.pending_roster.take() {
                    self.apply_roster(&roster);
                }
                self.announce_voice().await;
            }

            Packet::LoginRejected { error } => {
                error!("Login rejected: {}", error);
                self.login_error = Some(error);
                self.active = false;
            }

            Packet::Roster { participants } => {
                if self.id.is_some() {
                    self.apply_roster(&participants);
                } else {
                    self.pending_roster = Some(participants);
                }
            }

            Packet::ChatRelay {
                sender_id,
                sender_name,
                text,
                mentions,
                timestamp,
            } => {
                let entry = ChatEntry {
                    sender_id,
                    sender_name,
                    text,
                    mentions,
                    timestamp,
                    own: false,
                };
                if entry.mentions_name(&self.display_name) {
                    debug!("Mentioned by {}", entry.sender_name);
                }
                self.chat_sink.deliver(&entry);
                self.chat_log.push(entry);
            }

            Packet::StampRelay { owner_id, glyph } => {
                self.stamps.place(owner_id, glyph, Instant::now());
            }

            Packet::StrokeRelay {
                owner_id,
                points,
                color,
                timestamp,
            } => {
                self.strokes.add(
                    timestamp,
                    Stroke {
                        owner_id,
                        points,
                        color,
                    },
                    Instant::now(),
                );
            }

            Packet::Probe => {
                if let Err(e) = self.send_packet(&Packet::ProbeAck).await {
                    error!("Error acking probe: {}", e);
                }
            }

            Packet::Kicked => {
                warn!("Removed from the session by the server");
                self.end_session();
            }

            _ => {
                warn!("Unexpected packet type");
            }
        }
    }

    /// Applies a roster snapshot: presence reconciliation, server-override
    /// refresh of our own switches, then a voice-mesh reconciliation pass
    /// and the derived connected flags.
    fn apply_roster(&mut self, roster: &[Participant]) {
        let Some(local_id) = self.id else {
            return;
        };

        if let Some(self_view) =
            self.reconciler
                .apply_snapshot(roster, local_id, self.scene.as_mut())
        {
            if self_view.mic_muted != self.voice.mic_muted() {
                self.voice.set_mic_muted(self_view.mic_muted);
            }
            if self_view.speaker_muted != self.voice.speaker_muted() {
                self.voice.set_speaker_muted(self_view.speaker_muted);
            }
        }

        let desired = self.reconciler.desired_voice_peers();
        self.voice.reconcile(&desired);

        for (_, shadow) in self.reconciler.iter_mut() {
            shadow.voice_connected = shadow
                .participant
                .voice_addr
                .as_deref()
                .map(|addr| self.voice.is_connected(addr))
                .unwrap_or(false);
        }
    }

    /// Reports our voice address once the transport has one; the server
    /// rebroadcasts it so peers can start calling us.
    async fn announce_voice(&mut self) {
        if self.voice_announced || !self.connected {
            return;
        }
        if let Some(voice_addr) = self.voice.local_addr() {
            if let Err(e) = self.send_packet(&Packet::VoiceReady { voice_addr }).await {
                error!("Error announcing voice address: {}", e);
            } else {
                self.voice_announced = true;
            }
        }
    }

    /// One render-cadence tick: interpolation, ephemeral expiry, and the
    /// throttled outward position push.
    async fn on_update_tick(&mut self) {
        let now = Instant::now();

        interp::step(&mut self.reconciler, self.scene.as_mut());
        self.stamps.purge(now);
        self.strokes.purge(now);

        if self.connected && self.push_gate.ready(now) {
            let (position, yaw) = self.pose.pose();
            if let Err(e) = self.send_packet(&Packet::Move { position, yaw }).await {
                error!("Error sending position update: {}", e);
            }
        }
    }

    /// Sends a chat message. Our own copy is rendered locally; the server
    /// relays to everyone else.
    pub async fn send_chat(&mut self, text: &str) -> Result<(), Box<dyn std::error::Error>> {
        let mut known = self.reconciler.names();
        known.push(self.display_name.clone());
        let mentions = extract_mentions(text, &known);

        let entry = ChatEntry {
            sender_id: self.id.unwrap_or(0),
            sender_name: self.display_name.clone(),
            text: text.to_string(),
            mentions: mentions.clone(),
            timestamp: shared::now_millis(),
            own: true,
        };
        self.chat_sink.deliver(&entry);
        self.chat_log.push(entry);

        self.send_packet(&Packet::Chat {
            text: text.to_string(),
            mentions,
        })
        .await
    }

    /// Emits a head-stamp: shown locally right away, relayed to everyone
    /// else by the server.
    pub async fn emit_stamp(&mut self, glyph: &str) -> Result<(), Box<dyn std::error::Error>> {
        if let Some(id) = self.id {
            self.stamps.place(id, glyph.to_string(), Instant::now());
        }
        self.send_packet(&Packet::Stamp {
            glyph: glyph.to_string(),
        })
        .await
    }

    /// Relays a finalized pen stroke. Strokes with fewer than two points
    /// were never completed and are silently discarded.
    pub async fn emit_stroke(
        &mut self,
        points: Vec<StrokePoint>,
        color: &str,
    ) -> Result<(), Box<dyn std::error::Error>> {
        if points.len() < MIN_STROKE_POINTS {
            debug!("Discarding unfinished stroke");
            return Ok(());
        }

        let timestamp = shared::now_millis();
        if let Some(id) = self.id {
            self.strokes.add(
                timestamp,
                Stroke {
                    owner_id: id,
                    points: points.clone(),
                    color: color.to_string(),
                },
                Instant::now(),
            );
        }
        self.send_packet(&Packet::Stroke {
            points,
            color: color.to_string(),
            timestamp,
        })
        .await
    }

    /// Toggles the local mic: the capture track is disabled, the links stay
    /// up, and the server learns the flag for the roster.
    pub async fn set_mic_muted(&mut self, muted: bool) -> Result<(), Box<dyn std::error::Error>> {
        self.voice.set_mic_muted(muted);
        self.send_packet(&Packet::MicState { muted }).await
    }

    /// Toggles the global speaker mute across every playback sink.
    pub async fn set_speaker_muted(
        &mut self,
        muted: bool,
    ) -> Result<(), Box<dyn std::error::Error>> {
        self.voice.set_speaker_muted(muted);
        self.send_packet(&Packet::SpeakerState { muted }).await
    }

    /// Locally configured speaker gain; never leaves this client.
    pub fn set_speaker_volume(&mut self, volume: f32) {
        self.voice.set_volume(volume);
    }

    /// Returns the client to its pre-login state: shadows destroyed, voice
    /// links closed, boards cleared.
    fn end_session(&mut self) {
        self.reconciler.clear(self.scene.as_mut());
        self.voice.shutdown();
        self.stamps.clear();
        self.strokes.clear();
        self.chat_log.clear();
        self.pending_roster = None;
        self.connected = false;
        self.id = None;
        self.voice_announced = false;
        self.active = false;
    }

    pub async fn run(&mut self) -> Result<(), Box<dyn std::error::Error>> {
        self.connect().await?;
        self.active = true;

        let mut update_interval = interval(UPDATE_TICK);
        let mut login_interval = interval(LOGIN_RETRY_INTERVAL);
        login_interval.tick().await; // skip the immediate first tick

        let mut buffer = [0u8; MAX_PACKET_SIZE];

        while self.active {
            tokio::select! {
                result = self.socket.recv_from(&mut buffer) => {
                    match result {
                        Ok((len, addr)) => {
                            if addr != self.server_addr {
                                continue;
                            }
                            if let Ok(packet) = deserialize::<Packet>(&buffer[0..len]) {
                                self.handle_packet(packet).await;
                            }
                        }
                        Err(e) => error!("Error receiving packet: {}", e),
                    }
                },

                _ = update_interval.tick() => {
                    self.on_update_tick().await;
                },

                _ = login_interval.tick() => {
                    if !self.connected {
                        if self.login_attempts >= MAX_LOGIN_ATTEMPTS {
                            return Err("login timed out".into());
                        }
                        self.login_attempts += 1;
                        debug!("Retrying login (attempt {})", self.login_attempts);
                        if let Err(e) = self.send_packet(&Packet::Login {
                            display_name: self.display_name.clone(),
                        }).await {
                            error!("Error resending login: {}", e);
                        }
                    }
                },

                event = self.voice_rx.recv() => {
                    if let Some(event) = event {
                        self.voice.on_event(event);
                    }
                },

                _ = tokio::signal::ctrl_c() => {
                    info!("Logging out");
                    let _ = self.send_packet(&Packet::Logout).await;
                    self.end_session();
                },
            }
        }

        if let Some(error) = self.login_error.take() {
            return Err(Box::new(error));
        }
        Ok(())
    }
}
