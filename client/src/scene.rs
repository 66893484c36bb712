//! Seams to the rendering, input, and chat-display collaborators
//!
//! The engine never renders anything itself. It asks an [`AvatarScene`] for a
//! renderable proxy per remote participant, reads the locally-controlled pose
//! from a [`PoseSource`], and hands chat lines to a [`ChatSink`]. The headless
//! implementations below back the binary and the tests.

use crate::chat::ChatEntry;
use log::{debug, info};
use shared::{Participant, Vec3};

/// Owns the renderable proxies for remote participants.
pub trait AvatarScene {
    /// A participant appeared; create its renderable proxy.
    fn attach(&mut self, participant: &Participant);

    /// Apply a reconciled pose to the participant's proxy.
    fn place(&mut self, id: u32, position: Vec3, yaw: f32);

    /// The participant left; release its proxy.
    fn detach(&mut self, id: u32);
}

/// The locally-controlled participant's current pose, computed by input
/// handling outside the engine. Only ever read; never written back.
pub trait PoseSource {
    fn pose(&self) -> (Vec3, f32);
}

/// Display sink for chat lines (own and relayed).
pub trait ChatSink {
    fn deliver(&mut self, entry: &ChatEntry);
}

/// Scene that only logs lifecycle events; used by the headless binary.
#[derive(Debug, Default)]
pub struct LogScene;

impl AvatarScene for LogScene {
    fn attach(&mut self, participant: &Participant) {
        info!(
            "Avatar attached for {} (id {})",
            participant.display_name, participant.id
        );
    }

    fn place(&mut self, _id: u32, _position: Vec3, _yaw: f32) {}

    fn detach(&mut self, id: u32) {
        info!("Avatar detached for id {}", id);
    }
}

/// Pose source pinned to one spot.
#[derive(Debug, Default)]
pub struct FixedPose {
    pub position: Vec3,
    pub yaw: f32,
}

impl PoseSource for FixedPose {
    fn pose(&self) -> (Vec3, f32) {
        (self.position, self.yaw)
    }
}

/// Chat sink that writes lines to the log.
#[derive(Debug, Default)]
pub struct LogChatSink;

impl ChatSink for LogChatSink {
    fn deliver(&mut self, entry: &ChatEntry) {
        debug!("<{}> {}", entry.sender_name, entry.text);
    }
}
