//! Client presence reconciler
//!
//! Diffs each incoming roster snapshot against the locally-tracked shadow
//! entities: create what appeared, update what changed, destroy what left.
//! The server is the sole source of truth for presence and absence, so the
//! reconciliation is idempotent — re-applying the same snapshot changes
//! nothing. The local participant's own record only refreshes the fields the
//! server may override; position stays locally authoritative and flows
//! outward only.

use crate::scene::AvatarScene;
use log::debug;
use shared::{Participant, Vec3};
use std::collections::HashMap;

/// Client-local mirror of one remote participant.
#[derive(Debug, Clone)]
pub struct ShadowEntity {
    pub participant: Participant,
    /// Latest network target; the render pose converges toward it.
    pub target_position: Vec3,
    pub target_yaw: f32,
    /// Smoothed pose actually applied to the scene proxy.
    pub rendered_position: Vec3,
    pub rendered_yaw: f32,
    /// Maintained by the voice mesh after each reconciliation pass.
    pub voice_connected: bool,
}

impl ShadowEntity {
    fn new(participant: Participant) -> Self {
        // Seed the rendered pose from the first snapshot so a new entity
        // appears in place instead of sliding in from the origin.
        let position = participant.position;
        let yaw = participant.yaw;
        Self {
            participant,
            target_position: position,
            target_yaw: yaw,
            rendered_position: position,
            rendered_yaw: yaw,
            voice_connected: false,
        }
    }
}

/// Fields of the local participant's own record that the server may
/// override; returned from each snapshot application.
#[derive(Debug, Clone, PartialEq)]
pub struct SelfView {
    pub mic_muted: bool,
    pub speaker_muted: bool,
    pub voice_addr: Option<String>,
}

#[derive(Debug, Default)]
pub struct Reconciler {
    shadows: HashMap<u32, ShadowEntity>,
}

impl Reconciler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Applies one roster snapshot.
    ///
    /// Creates a shadow entity (and scene proxy) for every record new to this
    /// client, updates mutable fields and network targets on known ones, and
    /// destroys whatever the snapshot no longer contains. Returns the local
    /// participant's own record view when the roster contains it.
    pub fn apply_snapshot(
        &mut self,
        roster: &[Participant],
        local_id: u32,
        scene: &mut dyn AvatarScene,
    ) -> Option<SelfView> {
        let mut self_view = None;

        for record in roster {
            if record.id == local_id {
                self_view = Some(SelfView {
                    mic_muted: record.mic_muted,
                    speaker_muted: record.speaker_muted,
                    voice_addr: record.voice_addr.clone(),
                });
                continue;
            }

            match self.shadows.get_mut(&record.id) {
                Some(shadow) => {
                    shadow.target_position = record.position;
                    shadow.target_yaw = record.yaw;
                    shadow.participant = record.clone();
                }
                None => {
                    debug!("Shadow entity created for {}", record.display_name);
                    scene.attach(record);
                    self.shadows.insert(record.id, ShadowEntity::new(record.clone()));
                }
            }
        }

        let departed: Vec<u32> = self
            .shadows
            .keys()
            .filter(|id| !roster.iter().any(|p| p.id == **id))
            .copied()
            .collect();

        for id in departed {
            debug!("Shadow entity removed for id {}", id);
            scene.detach(id);
            self.shadows.remove(&id);
        }

        self_view
    }

    /// Voice addresses of every known remote participant that has completed
    /// voice bootstrap — the desired peer set for the voice mesh.
    pub fn desired_voice_peers(&self) -> Vec<String> {
        let mut peers: Vec<String> = self
            .shadows
            .values()
            .filter_map(|s| s.participant.voice_addr.clone())
            .collect();
        peers.sort();
        peers
    }

    pub fn get(&self, id: u32) -> Option<&ShadowEntity> {
        self.shadows.get(&id)
    }

    pub fn ids(&self) -> Vec<u32> {
        self.shadows.keys().copied().collect()
    }

    /// Display names of every known remote participant.
    pub fn names(&self) -> Vec<String> {
        self.shadows
            .values()
            .map(|s| s.participant.display_name.clone())
            .collect()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (&u32, &mut ShadowEntity)> {
        self.shadows.iter_mut()
    }

    pub fn len(&self) -> usize {
        self.shadows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.shadows.is_empty()
    }

    /// Destroys every shadow entity, releasing all scene proxies. Used when
    /// the session ends (logout, kick, rejected login).
    pub fn clear(&mut self, scene: &mut dyn AvatarScene) {
        for id in self.shadows.keys() {
            scene.detach(*id);
        }
        self.shadows.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Scene that records attach/detach calls for assertions.
    #[derive(Default)]
    struct RecordingScene {
        attached: Vec<u32>,
        detached: Vec<u32>,
        placed: Vec<(u32, Vec3, f32)>,
    }

    impl AvatarScene for RecordingScene {
        fn attach(&mut self, participant: &Participant) {
            self.attached.push(participant.id);
        }

        fn place(&mut self, id: u32, position: Vec3, yaw: f32) {
            self.placed.push((id, position, yaw));
        }

        fn detach(&mut self, id: u32) {
            self.detached.push(id);
        }
    }

    fn participant(id: u32, name: &str) -> Participant {
        Participant::new(id, name.to_string())
    }

    #[test]
    fn test_snapshot_creates_remote_shadows_only() {
        let mut reconciler = Reconciler::new();
        let mut scene = RecordingScene::default();

        let roster = vec![participant(1, "alice"), participant(2, "bob")];
        let self_view = reconciler.apply_snapshot(&roster, 1, &mut scene);

        assert_eq!(reconciler.len(), 1);
        assert!(reconciler.get(2).is_some());
        assert!(reconciler.get(1).is_none());
        assert_eq!(scene.attached, vec![2]);
        assert!(self_view.is_some());
    }

    #[test]
    fn test_snapshot_updates_targets_not_rendered_pose() {
        let mut reconciler = Reconciler::new();
        let mut scene = RecordingScene::default();

        let mut bob = participant(2, "bob");
        reconciler.apply_snapshot(&[bob.clone()], 1, &mut scene);

        bob.position = Vec3::new(5.0, 0.0, 5.0);
        bob.yaw = 1.0;
        reconciler.apply_snapshot(&[bob], 1, &mut scene);

        let shadow = reconciler.get(2).unwrap();
        assert_eq!(shadow.target_position, Vec3::new(5.0, 0.0, 5.0));
        assert_eq!(shadow.target_yaw, 1.0);
        // The rendered pose is left for the interpolator.
        assert_eq!(shadow.rendered_position, Vec3::ZERO);
        assert_eq!(shadow.rendered_yaw, 0.0);
    }

    #[test]
    fn test_new_shadow_spawns_in_place() {
        let mut reconciler = Reconciler::new();
        let mut scene = RecordingScene::default();

        let mut bob = participant(2, "bob");
        bob.position = Vec3::new(3.0, 1.0, -4.0);
        bob.yaw = 0.7;
        reconciler.apply_snapshot(&[bob], 1, &mut scene);

        let shadow = reconciler.get(2).unwrap();
        assert_eq!(shadow.rendered_position, Vec3::new(3.0, 1.0, -4.0));
        assert_eq!(shadow.rendered_yaw, 0.7);
    }

    #[test]
    fn test_absent_shadows_destroyed() {
        let mut reconciler = Reconciler::new();
        let mut scene = RecordingScene::default();

        let roster = vec![participant(2, "bob"), participant(3, "carol")];
        reconciler.apply_snapshot(&roster, 1, &mut scene);
        assert_eq!(reconciler.len(), 2);

        reconciler.apply_snapshot(&[participant(3, "carol")], 1, &mut scene);
        assert_eq!(reconciler.len(), 1);
        assert!(reconciler.get(2).is_none());
        assert_eq!(scene.detached, vec![2]);
    }

    #[test]
    fn test_reconciliation_is_idempotent() {
        let mut reconciler = Reconciler::new();
        let mut scene = RecordingScene::default();

        let roster = vec![participant(2, "bob"), participant(3, "carol")];
        reconciler.apply_snapshot(&roster, 1, &mut scene);
        reconciler.apply_snapshot(&roster, 1, &mut scene);
        reconciler.apply_snapshot(&roster, 1, &mut scene);

        assert_eq!(reconciler.len(), 2);
        // The proxies were created exactly once.
        assert_eq!(scene.attached, vec![2, 3]);
        assert!(scene.detached.is_empty());
    }

    #[test]
    fn test_converges_to_latest_snapshot() {
        let mut reconciler = Reconciler::new();
        let mut scene = RecordingScene::default();

        let s1 = vec![participant(2, "bob"), participant(4, "dave")];
        let s2 = vec![participant(3, "carol"), participant(1, "alice")];

        reconciler.apply_snapshot(&s1, 1, &mut scene);
        reconciler.apply_snapshot(&s2, 1, &mut scene);

        // Shadow set equals the id set of s2 minus the local id, regardless
        // of what s1 contained.
        let mut ids = reconciler.ids();
        ids.sort_unstable();
        assert_eq!(ids, vec![3]);
    }

    #[test]
    fn test_self_view_reflects_server_overrides() {
        let mut reconciler = Reconciler::new();
        let mut scene = RecordingScene::default();

        let mut me = participant(1, "alice");
        me.mic_muted = false;
        me.speaker_muted = true;
        me.voice_addr = Some("peer-alice".to_string());

        let self_view = reconciler.apply_snapshot(&[me], 1, &mut scene).unwrap();
        assert_eq!(
            self_view,
            SelfView {
                mic_muted: false,
                speaker_muted: true,
                voice_addr: Some("peer-alice".to_string()),
            }
        );
    }

    #[test]
    fn test_desired_voice_peers() {
        let mut reconciler = Reconciler::new();
        let mut scene = RecordingScene::default();

        let mut bob = participant(2, "bob");
        bob.voice_addr = Some("peer-bob".to_string());
        let carol = participant(3, "carol"); // no voice yet
        let mut dave = participant(4, "dave");
        dave.voice_addr = Some("peer-dave".to_string());

        reconciler.apply_snapshot(&[bob, carol, dave], 1, &mut scene);

        assert_eq!(
            reconciler.desired_voice_peers(),
            vec!["peer-bob".to_string(), "peer-dave".to_string()]
        );
    }

    #[test]
    fn test_clear_releases_all_proxies() {
        let mut reconciler = Reconciler::new();
        let mut scene = RecordingScene::default();

        reconciler.apply_snapshot(
            &[participant(2, "bob"), participant(3, "carol")],
            1,
            &mut scene,
        );
        reconciler.clear(&mut scene);

        assert!(reconciler.is_empty());
        let mut detached = scene.detached.clone();
        detached.sort_unstable();
        assert_eq!(detached, vec![2, 3]);
    }
}
