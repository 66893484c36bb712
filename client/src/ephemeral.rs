//! Self-expiring ephemeral event boards
//!
//! Stamps and pen strokes are fire-and-forget broadcasts: the emitter and
//! every receiver independently start a local expiry timer, and there is no
//! cancellation message. An event is visible from the moment it is inserted
//! until its TTL elapses on the holder's own clock; holders with skewed
//! clocks may disagree briefly on the exact expiry moment, which is an
//! accepted approximation.

use shared::{StrokePoint, STAMP_TTL, STROKE_TTL};
use std::collections::HashMap;
use std::hash::Hash;
use std::time::{Duration, Instant};

/// Map whose entries carry their own deadline. Inserting under an existing
/// key replaces the entry and restarts its lifetime.
#[derive(Debug)]
pub struct ExpiringMap<K, V> {
    entries: HashMap<K, (V, Instant)>,
}

impl<K: Eq + Hash, V> ExpiringMap<K, V> {
    pub fn new() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }

    pub fn insert(&mut self, key: K, value: V, ttl: Duration, now: Instant) {
        self.entries.insert(key, (value, now + ttl));
    }

    /// Drops every entry whose deadline has passed.
    pub fn purge(&mut self, now: Instant) {
        self.entries.retain(|_, (_, expires_at)| now < *expires_at);
    }

    pub fn get(&self, key: &K, now: Instant) -> Option<&V> {
        self.entries
            .get(key)
            .filter(|(_, expires_at)| now < *expires_at)
            .map(|(value, _)| value)
    }

    pub fn contains(&self, key: &K, now: Instant) -> bool {
        self.get(key, now).is_some()
    }

    pub fn active(&self, now: Instant) -> impl Iterator<Item = (&K, &V)> {
        self.entries
            .iter()
            .filter(move |(_, (_, expires_at))| now < *expires_at)
            .map(|(key, (value, _))| (key, value))
    }

    pub fn active_len(&self, now: Instant) -> usize {
        self.active(now).count()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

impl<K: Eq + Hash, V> Default for ExpiringMap<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

/// Head-stamps keyed by owning participant: a new stamp from the same owner
/// replaces any still-pending one.
#[derive(Debug, Default)]
pub struct StampBoard {
    stamps: ExpiringMap<u32, String>,
}

impl StampBoard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn place(&mut self, owner_id: u32, glyph: String, now: Instant) {
        self.stamps.insert(owner_id, glyph, STAMP_TTL, now);
    }

    pub fn glyph_for(&self, owner_id: u32, now: Instant) -> Option<&str> {
        self.stamps.get(&owner_id, now).map(String::as_str)
    }

    pub fn purge(&mut self, now: Instant) {
        self.stamps.purge(now);
    }

    pub fn active_len(&self, now: Instant) -> usize {
        self.stamps.active_len(now)
    }

    pub fn clear(&mut self) {
        self.stamps.clear();
    }
}

/// A finalized pen stroke as held for display.
#[derive(Debug, Clone, PartialEq)]
pub struct Stroke {
    pub owner_id: u32,
    pub points: Vec<StrokePoint>,
    pub color: String,
}

/// Transient strokes keyed by the timestamp the emitter attached at
/// creation, which is also how expiry identifies them.
#[derive(Debug, Default)]
pub struct StrokeBoard {
    strokes: ExpiringMap<u64, Stroke>,
}

impl StrokeBoard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, timestamp: u64, stroke: Stroke, now: Instant) {
        if stroke.points.len() < shared::MIN_STROKE_POINTS {
            return;
        }
        self.strokes.insert(timestamp, stroke, STROKE_TTL, now);
    }

    pub fn get(&self, timestamp: u64, now: Instant) -> Option<&Stroke> {
        self.strokes.get(&timestamp, now)
    }

    pub fn active(&self, now: Instant) -> impl Iterator<Item = (&u64, &Stroke)> {
        self.strokes.active(now)
    }

    pub fn purge(&mut self, now: Instant) {
        self.strokes.purge(now);
    }

    pub fn active_len(&self, now: Instant) -> usize {
        self.strokes.active_len(now)
    }

    pub fn clear(&mut self) {
        self.strokes.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn points() -> Vec<StrokePoint> {
        vec![
            StrokePoint { x: 0.1, y: 0.1 },
            StrokePoint { x: 0.2, y: 0.3 },
        ]
    }

    #[test]
    fn test_entry_visible_for_full_window() {
        let mut map = ExpiringMap::new();
        let t0 = Instant::now();
        map.insert("key", 42, Duration::from_millis(5000), t0);

        assert!(map.contains(&"key", t0));
        assert!(map.contains(&"key", t0 + Duration::from_millis(1)));
        assert!(map.contains(&"key", t0 + Duration::from_millis(4999)));
        assert!(!map.contains(&"key", t0 + Duration::from_millis(5000)));
        assert!(!map.contains(&"key", t0 + Duration::from_millis(60_000)));
    }

    #[test]
    fn test_purge_drops_only_expired_entries() {
        let mut map = ExpiringMap::new();
        let t0 = Instant::now();
        map.insert(1, "a", Duration::from_millis(100), t0);
        map.insert(2, "b", Duration::from_millis(300), t0);

        map.purge(t0 + Duration::from_millis(200));

        assert!(!map.contains(&1, t0 + Duration::from_millis(200)));
        assert!(map.contains(&2, t0 + Duration::from_millis(200)));
        assert_eq!(map.active_len(t0 + Duration::from_millis(200)), 1);
    }

    #[test]
    fn test_expired_entry_invisible_before_purge() {
        let mut map = ExpiringMap::new();
        let t0 = Instant::now();
        map.insert(1, "a", Duration::from_millis(100), t0);

        // Not purged yet, but queries already treat it as gone.
        let later = t0 + Duration::from_millis(150);
        assert!(map.get(&1, later).is_none());
        assert_eq!(map.active(later).count(), 0);
    }

    #[test]
    fn test_stamp_replacement_restarts_lifetime() {
        let mut board = StampBoard::new();
        let t0 = Instant::now();

        board.place(7, "🎉".to_string(), t0);
        // Replace right before it would have expired.
        let t1 = t0 + STAMP_TTL - Duration::from_millis(10);
        board.place(7, "👍".to_string(), t1);

        // Past the original deadline the replacement is still visible.
        let t2 = t0 + STAMP_TTL + Duration::from_millis(500);
        assert_eq!(board.glyph_for(7, t2), Some("👍"));

        // The replacement expires on its own clock.
        let t3 = t1 + STAMP_TTL;
        assert_eq!(board.glyph_for(7, t3), None);
    }

    #[test]
    fn test_stamps_per_owner_are_independent() {
        let mut board = StampBoard::new();
        let t0 = Instant::now();

        board.place(1, "🎉".to_string(), t0);
        board.place(2, "👍".to_string(), t0 + Duration::from_secs(1));

        let t1 = t0 + STAMP_TTL + Duration::from_millis(1);
        assert_eq!(board.glyph_for(1, t1), None);
        assert_eq!(board.glyph_for(2, t1), Some("👍"));
    }

    #[test]
    fn test_stroke_window_matches_ttl() {
        let mut board = StrokeBoard::new();
        let t0 = Instant::now();

        board.add(
            1234,
            Stroke {
                owner_id: 2,
                points: points(),
                color: "red".to_string(),
            },
            t0,
        );

        assert!(board.get(1234, t0).is_some());
        assert!(board
            .get(1234, t0 + STROKE_TTL - Duration::from_millis(1))
            .is_some());
        assert!(board.get(1234, t0 + STROKE_TTL).is_none());
    }

    #[test]
    fn test_unfinished_stroke_not_held() {
        let mut board = StrokeBoard::new();
        let t0 = Instant::now();

        board.add(
            1,
            Stroke {
                owner_id: 2,
                points: vec![StrokePoint { x: 0.5, y: 0.5 }],
                color: "red".to_string(),
            },
            t0,
        );

        assert_eq!(board.active_len(t0), 0);
    }

    #[test]
    fn test_strokes_identified_by_timestamp() {
        let mut board = StrokeBoard::new();
        let t0 = Instant::now();

        let early = Stroke {
            owner_id: 2,
            points: points(),
            color: "red".to_string(),
        };
        let late = Stroke {
            owner_id: 3,
            points: points(),
            color: "blue".to_string(),
        };

        board.add(100, early, t0);
        board.add(200, late, t0 + Duration::from_secs(3));

        // The early stroke expires while the late one stays.
        let t1 = t0 + STROKE_TTL + Duration::from_millis(1);
        board.purge(t1);
        assert!(board.get(100, t1).is_none());
        assert_eq!(board.get(200, t1).map(|s| s.owner_id), Some(3));
        assert_eq!(board.active_len(t1), 1);
    }
}
