//! Performance checks for the hot paths: snapshot serialization, snapshot
//! reconciliation under churn, interpolation, and ephemeral-board expiry.

use client::ephemeral::ExpiringMap;
use client::interp;
use client::presence::Reconciler;
use client::scene::AvatarScene;
use shared::{Packet, Participant, Vec3};
use std::time::{Duration, Instant};

struct NullScene;

impl AvatarScene for NullScene {
    fn attach(&mut self, _participant: &Participant) {}
    fn place(&mut self, _id: u32, _position: Vec3, _yaw: f32) {}
    fn detach(&mut self, _id: u32) {}
}

fn roster(count: u32) -> Vec<Participant> {
    (1..=count)
        .map(|i| {
            let mut p = Participant::new(i, format!("participant-{}", i));
            p.voice_addr = Some(format!("peer-{}", i));
            p.position = Vec3::new(i as f32, 0.0, -(i as f32));
            p.yaw = (i as f32) * 0.01;
            p
        })
        .collect()
}

/// Benchmarks full-roster snapshot serialization
#[test]
fn benchmark_roster_serialization() {
    let packet = Packet::Roster {
        participants: roster(200),
    };

    let iterations = 1_000;
    let start = Instant::now();

    for _ in 0..iterations {
        let serialized = bincode::serialize(&packet).unwrap();
        let _: Packet = bincode::deserialize(&serialized).unwrap();
    }

    let duration = start.elapsed();
    println!(
        "Roster serialization: {} iterations in {:?} ({:.2} μs/iter)",
        iterations,
        duration,
        duration.as_micros() as f64 / iterations as f64
    );

    // Should complete in under 2 seconds
    assert!(duration.as_millis() < 2000);
}

/// Benchmarks reconciliation under heavy membership churn
#[test]
fn benchmark_reconciler_churn() {
    let mut reconciler = Reconciler::new();
    let mut scene = NullScene;

    // Two half-overlapping rosters so every application both creates and
    // destroys shadow entities.
    let even: Vec<Participant> = roster(100)
        .into_iter()
        .filter(|p| p.id % 2 == 0)
        .collect();
    let odd: Vec<Participant> = roster(100)
        .into_iter()
        .filter(|p| p.id % 2 == 1)
        .collect();

    let iterations = 1_000;
    let start = Instant::now();

    for i in 0..iterations {
        let snapshot = if i % 2 == 0 { &even } else { &odd };
        reconciler.apply_snapshot(snapshot, 0, &mut scene);
    }

    let duration = start.elapsed();
    println!(
        "Reconciler churn: {} applications in {:?} ({:.2} μs/apply)",
        iterations,
        duration,
        duration.as_micros() as f64 / iterations as f64
    );

    // Should complete in under 5 seconds
    assert!(duration.as_millis() < 5000);
}

/// Benchmarks interpolation across a full room
#[test]
fn benchmark_interpolation_ticks() {
    let mut reconciler = Reconciler::new();
    let mut scene = NullScene;
    reconciler.apply_snapshot(&roster(100), 0, &mut scene);

    // Move every target so each tick does real work.
    let mut moved = roster(100);
    for p in &mut moved {
        p.position = Vec3::new(-p.position.x, 5.0, -p.position.z);
        p.yaw += 2.0;
    }
    reconciler.apply_snapshot(&moved, 0, &mut scene);

    let iterations = 1_000;
    let start = Instant::now();

    for _ in 0..iterations {
        interp::step(&mut reconciler, &mut scene);
    }

    let duration = start.elapsed();
    println!(
        "Interpolation: {} entities × {} ticks in {:?} ({:.2} μs/tick)",
        reconciler.len(),
        iterations,
        duration,
        duration.as_micros() as f64 / iterations as f64
    );

    // Should complete in under 2 seconds
    assert!(duration.as_millis() < 2000);
}

/// Benchmarks ephemeral-board insertion and purge
#[test]
fn benchmark_expiring_map() {
    let mut map: ExpiringMap<u64, u64> = ExpiringMap::new();
    let t0 = Instant::now();

    let entries: u64 = 10_000;
    let start = Instant::now();

    for i in 0..entries {
        // Half the entries are already expired at purge time.
        let ttl = if i % 2 == 0 {
            Duration::from_millis(1)
        } else {
            Duration::from_secs(60)
        };
        map.insert(i, i, ttl, t0);
    }
    map.purge(t0 + Duration::from_millis(10));

    let duration = start.elapsed();
    println!(
        "ExpiringMap: {} inserts + purge in {:?}",
        entries, duration
    );

    assert_eq!(map.active_len(t0 + Duration::from_millis(10)), entries as usize / 2);
    // Should complete in under 1 second
    assert!(duration.as_millis() < 1000);
}

/// Checks the interpolation convergence rate itself: after 60 ticks at 10%
/// per tick, less than 0.2% of the starting distance remains.
#[test]
fn interpolation_reaches_target_within_sixty_ticks() {
    let mut reconciler = Reconciler::new();
    let mut scene = NullScene;

    reconciler.apply_snapshot(&roster(1), 0, &mut scene);
    let mut moved = roster(1);
    moved[0].position = Vec3::new(100.0, 0.0, 0.0);
    reconciler.apply_snapshot(&moved, 0, &mut scene);

    for _ in 0..60 {
        interp::step(&mut reconciler, &mut scene);
    }

    let shadow = reconciler.get(1).unwrap();
    let remaining = (100.0 - shadow.rendered_position.x).abs();
    assert!(
        remaining < 0.2,
        "interpolation too slow: {} remaining after 60 ticks",
        remaining
    );
}
