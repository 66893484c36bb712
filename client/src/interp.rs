//! Position interpolation and the outward push gate
//!
//! Remote entities converge toward their latest network target by a fixed
//! fraction per render tick (exponential smoothing), which decouples the
//! throttled network update rate from the display-bound render rate and
//! hides jitter. Yaw converges along the shortest angular path. The local
//! pose is never interpolated; it is pushed outward through [`PushGate`] at
//! a fixed rate on a monotonic clock, independent of how often input runs.

use crate::presence::Reconciler;
use crate::scene::AvatarScene;
use shared::POSITION_PUSH_INTERVAL;
use std::f32::consts::PI;
use std::time::{Duration, Instant};

/// Fraction of the remaining distance covered per render tick.
pub const CONVERGENCE: f32 = 0.1;

/// Wraps an angle difference into (-PI, PI] so interpolation always takes
/// the short way around.
pub fn wrap_angle(mut angle: f32) -> f32 {
    while angle > PI {
        angle -= 2.0 * PI;
    }
    while angle <= -PI {
        angle += 2.0 * PI;
    }
    angle
}

/// Advances every shadow entity's rendered pose one tick toward its target
/// and applies the result to the scene.
pub fn step(reconciler: &mut Reconciler, scene: &mut dyn AvatarScene) {
    for (id, shadow) in reconciler.iter_mut() {
        shadow.rendered_position.x +=
            (shadow.target_position.x - shadow.rendered_position.x) * CONVERGENCE;
        shadow.rendered_position.y +=
            (shadow.target_position.y - shadow.rendered_position.y) * CONVERGENCE;
        shadow.rendered_position.z +=
            (shadow.target_position.z - shadow.rendered_position.z) * CONVERGENCE;

        shadow.rendered_yaw += wrap_angle(shadow.target_yaw - shadow.rendered_yaw) * CONVERGENCE;

        scene.place(*id, shadow.rendered_position, shadow.rendered_yaw);
    }
}

/// Monotonic-clock gate limiting how often the local pose goes on the wire.
#[derive(Debug)]
pub struct PushGate {
    interval: Duration,
    last_emit: Option<Instant>,
}

impl PushGate {
    pub fn new() -> Self {
        Self::with_interval(POSITION_PUSH_INTERVAL)
    }

    pub fn with_interval(interval: Duration) -> Self {
        Self {
            interval,
            last_emit: None,
        }
    }

    /// Returns true (and arms the gate) when enough time has passed since
    /// the previous emission. The first call always passes.
    pub fn ready(&mut self, now: Instant) -> bool {
        match self.last_emit {
            Some(last) if now.duration_since(last) < self.interval => false,
            _ => {
                self.last_emit = Some(now);
                true
            }
        }
    }
}

impl Default for PushGate {
    fn default() -> Self {
        Self::new()
    }
}
