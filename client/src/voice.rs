//! Voice-mesh connection manager
//!
//! Maintains exactly one live audio link per known remote participant,
//! reconciled against the presence reconciler's output after every snapshot.
//! The callback-driven media layer is hidden behind the [`VoiceTransport`]
//! trait; the manager itself is an explicit state machine per remote address
//! driven by named events, which keeps the convergence invariant checkable
//! without a media stack.
//!
//! Failure policy: a failed outbound call leaves the address absent and is
//! picked up again by the next reconciliation pass — no immediate retry
//! loops, and negotiation never blocks rendering or presence.

use log::{debug, info, warn};
use std::collections::HashMap;

/// Errors surfaced by a [`VoiceTransport`] implementation.
#[derive(Debug, thiserror::Error)]
pub enum VoiceError {
    #[error("voice transport is not ready")]
    NotReady,
    #[error("negotiation with {peer} failed: {reason}")]
    Negotiation { peer: String, reason: String },
}

/// Lifecycle of one peer link.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    /// Call opened (or answered); no remote stream yet.
    Connecting,
    /// Remote stream bound to a playback sink.
    Connected,
}

/// Named events from the media layer. Arrival order is not guaranteed to
/// match presence events; reconciliation absorbs any interleaving.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VoiceEvent {
    IncomingCall { peer: String },
    StreamReceived { peer: String },
    CallClosed { peer: String },
    CallErrored { peer: String },
}

/// Seam to the peer-to-peer media layer.
///
/// `open_call`/`answer_call` begin negotiation and may fail; stream arrival
/// and closure come back later as [`VoiceEvent`]s. Playback binding carries
/// the local speaker-mute switch and gain, which apply to playback only —
/// the capture side is controlled by `set_capture_enabled` and never affects
/// an established link.
pub trait VoiceTransport {
    /// Address peers should call us on; `None` until bootstrap completes.
    fn local_addr(&self) -> Option<String>;

    fn open_call(&mut self, peer: &str) -> Result<(), VoiceError>;

    fn answer_call(&mut self, peer: &str) -> Result<(), VoiceError>;

    fn close_call(&mut self, peer: &str);

    fn bind_playback(&mut self, peer: &str, muted: bool, volume: f32);

    fn release_playback(&mut self, peer: &str);

    fn set_playback_muted(&mut self, peer: &str, muted: bool);

    fn set_playback_volume(&mut self, peer: &str, volume: f32);

    fn set_capture_enabled(&mut self, enabled: bool);
}

/// Owns every voice link, keyed by the remote participant's voice address.
pub struct VoiceMesh {
    transport: Box<dyn VoiceTransport>,
    links: HashMap<String, LinkState>,
    mic_muted: bool,
    speaker_muted: bool,
    volume: f32,
}

impl VoiceMesh {
    /// Login defaults: mic muted, speaker live, unity gain.
    pub fn new(transport: Box<dyn VoiceTransport>) -> Self {
        let mut mesh = Self {
            transport,
            links: HashMap::new(),
            mic_muted: true,
            speaker_muted: false,
            volume: 1.0,
        };
        mesh.transport.set_capture_enabled(!mesh.mic_muted);
        mesh
    }

    pub fn local_addr(&self) -> Option<String> {
        self.transport.local_addr()
    }

    /// Reconciles live links against the desired peer-address set (all known
    /// remote addresses). Opens a call for every desired address without a
    /// link, closes every link whose address left the set. An address change
    /// is just a removal plus an addition across passes, so device reinit
    /// converges without special casing.
    pub fn reconcile(&mut self, desired: &[String]) {
        let Some(local) = self.transport.local_addr() else {
            // Voice bootstrap has not finished; nothing to call with yet.
            return;
        };

        for peer in desired {
            if *peer == local || self.links.contains_key(peer) {
                continue;
            }
            match self.transport.open_call(peer) {
                Ok(()) => {
                    debug!("Calling {}", peer);
                    self.links.insert(peer.clone(), LinkState::Connecting);
                }
                Err(e) => {
                    // Left absent; the next reconciliation pass retries.
                    warn!("Outbound call to {} failed: {}", peer, e);
                }
            }
        }

        let stale: Vec<String> = self
            .links
            .keys()
            .filter(|peer| !desired.contains(peer))
            .cloned()
            .collect();

        for peer in stale {
            info!("Closing voice link to departed peer {}", peer);
            self.transport.close_call(&peer);
            self.transport.release_playback(&peer);
            self.links.remove(&peer);
        }
    }

    /// Feeds one media-layer event through the state machine.
    pub fn on_event(&mut self, event: VoiceEvent) {
        match event {
            VoiceEvent::IncomingCall { peer } => {
                // Always accepted immediately and answered with the local
                // capture stream; readiness checks do not apply to inbound.
                match self.transport.answer_call(&peer) {
                    Ok(()) => {
                        debug!("Answered inbound call from {}", peer);
                        self.links.insert(peer, LinkState::Connecting);
                    }
                    Err(e) => warn!("Failed to answer call from {}: {}", peer, e),
                }
            }
            VoiceEvent::StreamReceived { peer } => {
                self.transport
                    .bind_playback(&peer, self.speaker_muted, self.volume);
                self.links.insert(peer, LinkState::Connected);
            }
            VoiceEvent::CallClosed { peer } | VoiceEvent::CallErrored { peer } => {
                self.transport.release_playback(&peer);
                self.links.remove(&peer);
            }
        }
    }

    /// Mute is enforced on the capture track only; every link stays up so
    /// unmuting is instant.
    pub fn set_mic_muted(&mut self, muted: bool) {
        self.mic_muted = muted;
        self.transport.set_capture_enabled(!muted);
    }

    pub fn mic_muted(&self) -> bool {
        self.mic_muted
    }

    /// Global speaker mute, applied to every bound playback sink.
    pub fn set_speaker_muted(&mut self, muted: bool) {
        self.speaker_muted = muted;
        for (peer, state) in &self.links {
            if *state == LinkState::Connected {
                self.transport.set_playback_muted(peer, muted);
            }
        }
    }

    pub fn speaker_muted(&self) -> bool {
        self.speaker_muted
    }

    pub fn set_volume(&mut self, volume: f32) {
        self.volume = volume.clamp(0.0, 1.0);
        for (peer, state) in &self.links {
            if *state == LinkState::Connected {
                self.transport.set_playback_volume(peer, self.volume);
            }
        }
    }

    pub fn state(&self, peer: &str) -> Option<LinkState> {
        self.links.get(peer).copied()
    }

    pub fn is_connected(&self, peer: &str) -> bool {
        self.state(peer) == Some(LinkState::Connected)
    }

    pub fn link_count(&self) -> usize {
        self.links.len()
    }

    /// Tears every link down; used when the session ends.
    pub fn shutdown(&mut self) {
        for peer in self.links.keys() {
            self.transport.close_call(peer);
            self.transport.release_playback(peer);
        }
        self.links.clear();
    }
}

/// Transport stand-in that logs every operation and always negotiates
/// successfully; backs the headless binary.
#[derive(Debug)]
pub struct LoggingVoiceTransport {
    local: Option<String>,
}

impl LoggingVoiceTransport {
    pub fn new(local: Option<String>) -> Self {
        Self { local }
    }
}

impl VoiceTransport for LoggingVoiceTransport {
    fn local_addr(&self) -> Option<String> {
        self.local.clone()
    }

    fn open_call(&mut self, peer: &str) -> Result<(), VoiceError> {
        info!("voice: calling {}", peer);
        Ok(())
    }

    fn answer_call(&mut self, peer: &str) -> Result<(), VoiceError> {
        info!("voice: answering {}", peer);
        Ok(())
    }

    fn close_call(&mut self, peer: &str) {
        info!("voice: closing call with {}", peer);
    }

    fn bind_playback(&mut self, peer: &str, muted: bool, volume: f32) {
        debug!(
            "voice: playback bound for {} (muted: {}, volume: {:.2})",
            peer, muted, volume
        );
    }

    fn release_playback(&mut self, peer: &str) {
        debug!("voice: playback released for {}", peer);
    }

    fn set_playback_muted(&mut self, peer: &str, muted: bool) {
        debug!("voice: playback for {} muted: {}", peer, muted);
    }

    fn set_playback_volume(&mut self, peer: &str, volume: f32) {
        debug!("voice: playback for {} volume: {:.2}", peer, volume);
    }

    fn set_capture_enabled(&mut self, enabled: bool) {
        debug!("voice: capture enabled: {}", enabled);
    }
}
