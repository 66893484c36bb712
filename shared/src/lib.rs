use serde::{Deserialize, Serialize};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Interval between liveness probes sent to every connection.
pub const PROBE_INTERVAL: Duration = Duration::from_secs(10);
/// Interval of the miss-check sweep; a connection that has not acked a probe
/// across one full sweep is treated as dead.
pub const MISS_CHECK_INTERVAL: Duration = Duration::from_secs(20);
/// Minimum spacing between outward position pushes from a client (10 Hz).
pub const POSITION_PUSH_INTERVAL: Duration = Duration::from_millis(100);
/// Display lifetime of a head-stamp on every holder.
pub const STAMP_TTL: Duration = Duration::from_secs(3);
/// Display lifetime of a finalized pen stroke on every holder.
pub const STROKE_TTL: Duration = Duration::from_secs(5);
/// A stroke is only finalized and relayed once it has at least this many points.
pub const MIN_STROKE_POINTS: usize = 2;
/// Upper bound for a serialized packet; rosters and strokes stay well below it.
pub const MAX_PACKET_SIZE: usize = 8192;

/// Wall-clock milliseconds since the UNIX epoch, saturating at `u64::MAX`.
pub fn now_millis() -> u64 {
    let millis = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or(Duration::from_secs(0))
        .as_millis();
    millis.min(u64::MAX as u128) as u64
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Default)]
pub struct Vec3 {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Vec3 {
    pub const ZERO: Vec3 = Vec3 {
        x: 0.0,
        y: 0.0,
        z: 0.0,
    };

    pub fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }
}

/// A 2D point in the shared document coordinate space used by pen strokes.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq)]
pub struct StrokePoint {
    pub x: f32,
    pub y: f32,
}

/// Authoritative record of one connected participant. Owned by the server;
/// every client receives the full set of these in each roster snapshot.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Participant {
    /// Connection identifier assigned at login; doubles as the session key.
    pub id: u32,
    /// Unique among currently-connected participants.
    pub display_name: String,
    /// Opaque voice-subsystem address; `None` until the client finishes
    /// voice bootstrap and reports it.
    pub voice_addr: Option<String>,
    pub mic_muted: bool,
    pub speaker_muted: bool,
    pub position: Vec3,
    /// Yaw in radians.
    pub yaw: f32,
}

impl Participant {
    /// A freshly logged-in participant: mic muted, speaker live, origin pose.
    pub fn new(id: u32, display_name: String) -> Self {
        Self {
            id,
            display_name,
            voice_addr: None,
            mic_muted: true,
            speaker_muted: false,
            position: Vec3::ZERO,
            yaw: 0.0,
        }
    }
}

/// Why a login request was rejected. Crosses the wire inside
/// [`Packet::LoginRejected`], so it derives serde alongside the error traits.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum LoginError {
    #[error("a display name is required")]
    NameMissing,
    #[error("that display name is already in use")]
    NameTaken,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub enum Packet {
    // client -> server
    Login {
        display_name: String,
    },
    VoiceReady {
        voice_addr: String,
    },
    Move {
        position: Vec3,
        yaw: f32,
    },
    MicState {
        muted: bool,
    },
    SpeakerState {
        muted: bool,
    },
    Chat {
        text: String,
        mentions: Vec<String>,
    },
    Stamp {
        glyph: String,
    },
    Stroke {
        points: Vec<StrokePoint>,
        color: String,
        timestamp: u64,
    },
    ProbeAck,
    Logout,

    // server -> one client
    LoginAccepted {
        id: u32,
        display_name: String,
    },
    LoginRejected {
        error: LoginError,
    },
    Probe,
    Kicked,

    // server -> all clients
    Roster {
        participants: Vec<Participant>,
    },
    ChatRelay {
        sender_id: u32,
        sender_name: String,
        text: String,
        mentions: Vec<String>,
        timestamp: u64,
    },
    StampRelay {
        owner_id: u32,
        glyph: String,
    },
    StrokeRelay {
        owner_id: u32,
        points: Vec<StrokePoint>,
        color: String,
        timestamp: u64,
    },
}
