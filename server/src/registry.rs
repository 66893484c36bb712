//! Authoritative session registry
//!
//! This module owns the canonical set of connected participants. It is the
//! single writer for all participant state: login, own-record field updates,
//! and removal. Every successful mutation synchronously publishes a complete
//! roster snapshot through an injected observer channel, so mutation and
//! broadcast trigger cannot be separated by other events. The observer seam
//! also lets the registry be unit tested without a live socket.

use crate::network::Outbound;
use log::info;
use shared::{LoginError, Packet, Participant, Vec3};
use std::collections::HashMap;
use tokio::sync::mpsc;

/// Single-writer registry of connected participants.
///
/// Identifiers are assigned sequentially at login and double as the
/// participant's public session key. Display names are unique among
/// currently-present records; uniqueness is re-checked on every login so a
/// name frees up as soon as its holder leaves.
pub struct SessionRegistry {
    participants: HashMap<u32, Participant>,
    next_id: u32,
    broadcast_tx: mpsc::UnboundedSender<Outbound>,
}

impl SessionRegistry {
    /// Creates a registry that publishes roster snapshots into `broadcast_tx`.
    pub fn new(broadcast_tx: mpsc::UnboundedSender<Outbound>) -> Self {
        Self {
            participants: HashMap::new(),
            next_id: 1,
            broadcast_tx,
        }
    }

    /// Attempts to log a participant in under `display_name`.
    ///
    /// A blank name or a name already held by a present participant is
    /// rejected without any registry mutation (and without a broadcast).
    /// On success the new record carries the login defaults and the updated
    /// roster is published to everyone.
    pub fn login(&mut self, display_name: &str) -> Result<u32, LoginError> {
        let display_name = display_name.trim();
        if display_name.is_empty() {
            return Err(LoginError::NameMissing);
        }
        if self.contains_name(display_name) {
            return Err(LoginError::NameTaken);
        }

        let id = self.next_id;
        self.next_id += 1;

        self.participants
            .insert(id, Participant::new(id, display_name.to_string()));
        info!("Participant {} logged in as {}", id, display_name);
        self.publish();

        Ok(id)
    }

    /// Records the caller's voice-subsystem address once bootstrap completes.
    pub fn set_voice_addr(&mut self, id: u32, voice_addr: String) {
        if let Some(p) = self.participants.get_mut(&id) {
            info!("Voice address for {}: {}", p.display_name, voice_addr);
            p.voice_addr = Some(voice_addr);
            self.publish();
        }
    }

    pub fn set_position(&mut self, id: u32, position: Vec3, yaw: f32) {
        if let Some(p) = self.participants.get_mut(&id) {
            p.position = position;
            p.yaw = yaw;
            self.publish();
        }
    }

    pub fn set_mic_muted(&mut self, id: u32, muted: bool) {
        if let Some(p) = self.participants.get_mut(&id) {
            info!(
                "Mic state for {}: {}",
                p.display_name,
                if muted { "muted" } else { "live" }
            );
            p.mic_muted = muted;
            self.publish();
        }
    }

    pub fn set_speaker_muted(&mut self, id: u32, muted: bool) {
        if let Some(p) = self.participants.get_mut(&id) {
            info!(
                "Speaker state for {}: {}",
                p.display_name,
                if muted { "muted" } else { "live" }
            );
            p.speaker_muted = muted;
            self.publish();
        }
    }

    /// Removes a participant and publishes the shrunken roster.
    ///
    /// Logout, liveness timeout, and admin kick all funnel through here, so
    /// the three removal paths are indistinguishable to observers.
    pub fn remove(&mut self, id: u32) -> Option<Participant> {
        let removed = self.participants.remove(&id);
        if let Some(p) = &removed {
            info!("Participant {} ({}) removed", p.id, p.display_name);
            self.publish();
        }
        removed
    }

    /// Complete registry contents, ordered by id.
    pub fn snapshot(&self) -> Vec<Participant> {
        let mut roster: Vec<Participant> = self.participants.values().cloned().collect();
        roster.sort_by_key(|p| p.id);
        roster
    }

    pub fn get(&self, id: u32) -> Option<&Participant> {
        self.participants.get(&id)
    }

    pub fn display_name(&self, id: u32) -> Option<&str> {
        self.participants.get(&id).map(|p| p.display_name.as_str())
    }

    pub fn contains_name(&self, display_name: &str) -> bool {
        self.participants
            .values()
            .any(|p| p.display_name == display_name)
    }

    pub fn len(&self) -> usize {
        self.participants.len()
    }

    pub fn is_empty(&self) -> bool {
        self.participants.is_empty()
    }

    fn publish(&self) {
        // The receiver only disappears during shutdown; a failed send is
        // harmless then.
        let _ = self.broadcast_tx.send(Outbound::Broadcast {
            packet: Packet::Roster {
                participants: self.snapshot(),
            },
            exclude: None,
        });
    }
}
