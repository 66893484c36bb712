//! Connection liveness bookkeeping
//!
//! Coarse two-timer design: a probe tick sends `Packet::Probe` to every
//! connection, and an independent miss-check sweep removes any connection
//! that failed to ack across one full sweep interval. The sweep is
//! deliberately not a per-probe round-trip timeout; a false positive only
//! costs the client a reconnect, never state corruption.
//!
//! This struct is pure bookkeeping. The two timers live as spawned interval
//! tasks in the network layer and only ever send tick messages into the
//! single-threaded server loop, so every mutation runs on one path and the
//! timers die with the loop.

use std::collections::HashMap;

pub struct LivenessMonitor {
    /// id -> acked-since-last-sweep flag.
    tracked: HashMap<u32, bool>,
}

impl LivenessMonitor {
    pub fn new() -> Self {
        Self {
            tracked: HashMap::new(),
        }
    }

    /// Starts watching a connection. A fresh connection is considered
    /// responsive until the first sweep re-arms its flag, giving it a full
    /// sweep interval to produce its first ack.
    pub fn track(&mut self, id: u32) {
        self.tracked.insert(id, true);
    }

    pub fn untrack(&mut self, id: u32) {
        self.tracked.remove(&id);
    }

    /// Marks a probe acknowledgment from the given connection.
    pub fn mark_ack(&mut self, id: u32) {
        if let Some(alive) = self.tracked.get_mut(&id) {
            *alive = true;
        }
    }

    /// Runs one miss-check sweep: returns the connections that have not
    /// acked since the previous sweep and re-arms everyone else's flag.
    /// Callers are expected to remove the returned ids via `untrack`.
    pub fn sweep(&mut self) -> Vec<u32> {
        let mut dead: Vec<u32> = self
            .tracked
            .iter()
            .filter(|(_, alive)| !**alive)
            .map(|(id, _)| *id)
            .collect();
        dead.sort_unstable();

        for alive in self.tracked.values_mut() {
            *alive = false;
        }

        dead
    }

    pub fn is_tracked(&self, id: u32) -> bool {
        self.tracked.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.tracked.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tracked.is_empty()
    }
}

impl Default for LivenessMonitor {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fresh_connection_survives_first_sweep() {
        let mut monitor = LivenessMonitor::new();
        monitor.track(1);

        assert!(monitor.sweep().is_empty());
    }

    #[test]
    fn test_silent_connection_dies_on_second_sweep() {
        let mut monitor = LivenessMonitor::new();
        monitor.track(1);

        assert!(monitor.sweep().is_empty());
        assert_eq!(monitor.sweep(), vec![1]);
    }

    #[test]
    fn test_ack_between_sweeps_keeps_connection_alive() {
        let mut monitor = LivenessMonitor::new();
        monitor.track(1);

        for _ in 0..5 {
            assert!(monitor.sweep().is_empty());
            monitor.mark_ack(1);
        }
    }

    #[test]
    fn test_sweep_reports_only_silent_connections() {
        let mut monitor = LivenessMonitor::new();
        monitor.track(1);
        monitor.track(2);
        monitor.track(3);

        monitor.sweep();
        monitor.mark_ack(2);

        assert_eq!(monitor.sweep(), vec![1, 3]);
    }

    #[test]
    fn test_ack_for_untracked_connection_is_ignored() {
        let mut monitor = LivenessMonitor::new();
        monitor.mark_ack(7);

        assert!(monitor.is_empty());
        assert!(!monitor.is_tracked(7));
    }

    #[test]
    fn test_untrack_stops_reporting() {
        let mut monitor = LivenessMonitor::new();
        monitor.track(1);
        monitor.sweep();
        monitor.untrack(1);

        assert!(monitor.sweep().is_empty());
        assert!(monitor.is_empty());
    }
}
