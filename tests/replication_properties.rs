//! Integration tests for replication invariants
//!
//! Exercises the public API the way a game host would: registry, connection
//! table and scheduler wired by hand, then the coordinator.

use replication_core::adapters::outbound::{ChannelTransport, DashMapRoleResolver, FrameSerializer, NullTransport};
use replication_core::{
    can_replicate_to, ConnectionId, ConnectionTable, EntityHandle, EventSink, NetRole,
    PriorityPolicy, ReplicatedEntity, ReplicationCondition, ReplicationConfig, ReplicationCoordinator,
    ReplicationError, ReplicationPolicy, ReplicationRegistry, ReplicationScheduler,
};
use std::sync::Arc;

struct Flat;

impl PriorityPolicy for Flat {
    fn priority(&self, _entity: &ReplicatedEntity) -> f32 {
        0.0
    }
}

fn registry() -> ReplicationRegistry {
    ReplicationRegistry::new(
        &ReplicationConfig::default(),
        Arc::new(FrameSerializer::new()),
        EventSink::disabled(),
    )
}

/// Dirty entities are always eligible, whatever the elapsed time
#[test]
fn test_dirty_wins() {
    let reg = registry();
    for (i, hz) in [0.5, 1.0, 10.0, 60.0, 1000.0].into_iter().enumerate() {
        let e = EntityHandle::new(format!("e{}", i));
        reg.register_object(e.clone(), ReplicationPolicy::new(hz)).unwrap();
        reg.mark_dirty(&e);

        for now in [0.0, 1e-6, 0.001, 0.5, 100.0] {
            assert!(reg.should_replicate(&e, now), "hz={} now={}", hz, now);
        }
    }
}

/// A clean entity is eligible exactly when 1/frequency has elapsed
#[test]
fn test_heartbeat_bound() {
    let reg = registry();
    let e = EntityHandle::new("e");
    reg.register_object(e.clone(), ReplicationPolicy::new(4.0)).unwrap();

    assert!(!reg.should_replicate(&e, 0.0));
    assert!(!reg.should_replicate(&e, 0.249));
    assert!(reg.should_replicate(&e, 0.25));
    assert!(reg.should_replicate(&e, 3.0));

    // after a send at t=0.25 the window restarts
    reg.process_replication(0.25);
    assert!(!reg.should_replicate(&e, 0.4));
    assert!(reg.should_replicate(&e, 0.5));
}

/// 9 conditions × 4 roles, for an entity that has not been sent yet
#[test]
fn test_condition_table() {
    use NetRole::{Authority, AutonomousProxy, None as NoRole, SimulatedProxy};
    use ReplicationCondition::*;

    let roles = [NoRole, SimulatedProxy, AutonomousProxy, Authority];
    let table: [(ReplicationCondition, [bool; 4]); 9] = [
        (None, [true, true, true, true]),
        (InitialOnly, [true, true, true, true]),
        (OwnerOnly, [false, false, false, true]),
        (SkipOwner, [true, true, true, false]),
        (SimulatedOnly, [false, true, false, false]),
        (AutonomousOnly, [false, false, true, false]),
        (SimulatedOrPhysics, [false, true, false, true]),
        (InitialOrOwner, [true, true, true, true]),
        (Custom, [true, true, true, true]),
    ];

    let mut cases = 0;
    for (condition, expected) in table {
        for (role, want) in roles.into_iter().zip(expected) {
            assert_eq!(
                can_replicate_to(condition, role, true),
                want,
                "{} / {}",
                condition,
                role
            );
            cases += 1;
        }
    }
    assert_eq!(cases, 36);
}

/// Same table once the entity has reached a viewer
#[test]
fn test_condition_table_after_initial_send() {
    for role in NetRole::ALL {
        assert!(!can_replicate_to(ReplicationCondition::InitialOnly, role, false));
        assert_eq!(
            can_replicate_to(ReplicationCondition::InitialOrOwner, role, false),
            role == NetRole::Authority
        );
    }
}

#[test]
fn test_owner_only_scenario() {
    assert!(can_replicate_to(ReplicationCondition::OwnerOnly, NetRole::Authority, true));
    assert!(!can_replicate_to(ReplicationCondition::OwnerOnly, NetRole::SimulatedProxy, true));
}

#[test]
fn test_frequency_scenario() {
    let reg = registry();
    let o1 = EntityHandle::new("O1");
    reg.register_object(o1.clone(), ReplicationPolicy::new(10.0)).unwrap();
    assert!(reg.should_replicate(&o1, 0.2));
}

/// The table never exceeds its limit, and rejections are reported
#[test]
fn test_admission_control() {
    let config = ReplicationConfig::default().max_connections(3);
    let table = ConnectionTable::new(&config, Arc::new(NullTransport), EventSink::disabled());

    let mut rejected = 0;
    for id in 0..10 {
        match table.add_connection(ConnectionId(id), "10.0.0.1", 7000) {
            Ok(()) => {}
            Err(ReplicationError::CapacityExceeded { max }) => {
                assert_eq!(max, 3);
                rejected += 1;
            }
            Err(e) => panic!("unexpected error: {}", e),
        }
        assert!(table.connection_count() <= 3);
    }
    assert_eq!(rejected, 7);
}

/// Q queued entries drain in ceil(Q/B) calls with budget B
#[test]
fn test_budgeted_drain() {
    for (q, b) in [(5usize, 2usize), (10, 3), (7, 7), (1, 100), (100, 1)] {
        let config = ReplicationConfig::default().max_replication_per_tick(b);
        let reg = ReplicationRegistry::new(&config, Arc::new(FrameSerializer::new()), EventSink::disabled());
        let conns = ConnectionTable::new(&config, Arc::new(NullTransport), EventSink::disabled());
        let roles = DashMapRoleResolver::default();
        let mut scheduler = ReplicationScheduler::new(&config, Arc::new(Flat), EventSink::disabled());

        for i in 0..q {
            let e = EntityHandle::new(format!("e{}", i));
            reg.register_object(e.clone(), ReplicationPolicy::default()).unwrap();
            scheduler.add_to_queue(&reg, &e);
        }

        let mut calls = 0;
        let mut drained = Vec::new();
        while scheduler.queue_size() > 0 {
            drained.push(scheduler.process_replication_queue(&reg, &conns, &roles));
            calls += 1;
        }
        assert_eq!(calls, q.div_ceil(b), "q={} b={}", q, b);
        let (last, full) = drained.split_last().unwrap();
        assert!(full.iter().all(|n| *n == b), "q={} b={} drained={:?}", q, b, drained);
        assert_eq!(*last, q - b * (calls - 1), "q={} b={}", q, b);
    }
}

#[test]
fn test_budget_scenario_two_two_one() {
    let config = ReplicationConfig::default().max_replication_per_tick(2);
    let reg = ReplicationRegistry::new(&config, Arc::new(FrameSerializer::new()), EventSink::disabled());
    let conns = ConnectionTable::new(&config, Arc::new(NullTransport), EventSink::disabled());
    let roles = DashMapRoleResolver::default();
    let mut scheduler = ReplicationScheduler::new(&config, Arc::new(Flat), EventSink::disabled());

    for i in 0..5 {
        let e = EntityHandle::new(format!("e{}", i));
        reg.register_object(e.clone(), ReplicationPolicy::default()).unwrap();
        scheduler.add_to_queue(&reg, &e);
    }

    let counts: Vec<usize> = (0..3)
        .map(|_| scheduler.process_replication_queue(&reg, &conns, &roles))
        .collect();
    assert_eq!(counts, vec![2, 2, 1]);
}

/// mark_dirty → process → clean, with a payload recorded
#[test]
fn test_dirty_round_trip() {
    let reg = registry();
    let e = EntityHandle::new("e");
    reg.register_object(e.clone(), ReplicationPolicy::default()).unwrap();

    reg.mark_dirty(&e);
    assert!(reg.is_dirty(&e));
    reg.process_replication(0.016);
    assert!(!reg.is_dirty(&e));

    let info = reg.replication_info(&e).unwrap();
    assert_eq!(info.status.last_send_time, 0.016);
    assert!(info.status.payload_size > 0);
}

/// After unregistering, an entity is never sent again
#[test]
fn test_unregister_finality() {
    let (transport, mut rx) = ChannelTransport::new(64);
    let mut c = ReplicationCoordinator::new(
        ReplicationConfig::default(),
        Arc::new(FrameSerializer::new()),
        Arc::new(transport),
        Arc::new(DashMapRoleResolver::default()),
    );
    c.initialize();
    c.add_connection(ConnectionId(1), "10.0.0.1", 7000).unwrap();

    let e = EntityHandle::new("doomed");
    c.register_object(e.clone(), ReplicationPolicy::new(100.0)).unwrap();
    c.mark_dirty(&e);
    c.update(0.1);
    while rx.try_recv().is_ok() {}

    assert!(c.unregister_object(&e));
    assert!(!c.scheduler().unwrap().contains(&e));
    assert!(!c.mark_dirty(&e));

    for _ in 0..10 {
        c.update(0.1);
    }
    assert!(rx.try_recv().is_err());
    assert!(!c.registry().unwrap().should_replicate(&e, 1e9));
}

/// Unregistering straight on the registry also keeps the entity off the wire
#[test]
fn test_registry_unregister_leaves_queue() {
    let config = ReplicationConfig::default();
    let reg = registry();
    let (transport, mut rx) = ChannelTransport::new(64);
    let conns = ConnectionTable::new(&config, Arc::new(transport), EventSink::disabled());
    conns.add_connection(ConnectionId(1), "a", 7000).unwrap();
    let roles = DashMapRoleResolver::default();
    let mut scheduler = ReplicationScheduler::new(&config, Arc::new(Flat), EventSink::disabled());

    let e = EntityHandle::new("e");
    reg.register_object(e.clone(), ReplicationPolicy::default()).unwrap();
    reg.replicate_object(&e).unwrap();
    scheduler.collect_replicated(&reg);
    reg.unregister_object(&e);
    assert!(!scheduler.contains(&e));
    assert_eq!(scheduler.queue_size(), 0);

    assert_eq!(scheduler.process_replication_queue(&reg, &conns, &roles), 0);
    assert!(rx.try_recv().is_err());
}

/// Registry mutation from game threads while the tick thread runs
#[test]
fn test_concurrent_registration_and_ticks() {
    let mut c = ReplicationCoordinator::with_defaults(ReplicationConfig::default());
    c.initialize();
    c.add_connection(ConnectionId(1), "a", 7000).unwrap();
    let registry = c.registry().unwrap();

    let workers: Vec<_> = (0..4)
        .map(|t| {
            let registry = registry.clone();
            std::thread::spawn(move || {
                let mut mine = Vec::new();
                for i in 0..50 {
                    let e = EntityHandle::new(format!("w{}-{}", t, i));
                    registry.register_object(e.clone(), ReplicationPolicy::new(30.0)).unwrap();
                    registry.mark_dirty(&e);
                    mine.push(e);
                }
                for e in mine.iter().take(25) {
                    registry.unregister_object(e);
                }
            })
        })
        .collect();

    for _ in 0..100 {
        c.update(1.0 / 60.0);
    }
    for w in workers {
        w.join().unwrap();
    }

    assert_eq!(c.total_replicated_objects(), 100);
    assert!(c.validate_system().is_ok());
}
