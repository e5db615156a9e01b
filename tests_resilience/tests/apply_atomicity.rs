//! Apply Atomicity Tests
//!
//! Validates that evaluators running concurrently with commits only ever see
//! a complete policy set, never a mix of two applies.

use core_types::{ClientParameter, Condition, PolicyCondition, PolicyResult, ResultKind};
use necp_wire::encode_parameters;
use policy::PolicyStore;
use services_client_registry::ChannelFlags;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use tests_resilience::{test_bootstrap, APP_PID, DAEMON_PID};

const ROUNDS: u32 = 200;
const POLICIES_PER_ROUND: u32 = 8;

/// Stages one round: every policy carries the round number in its order
fn stage_round(store: &PolicyStore, session: core_types::SessionId, round: u32) {
    store.delete_all(session).unwrap();
    for i in 0..POLICIES_PER_ROUND {
        let result = if round % 2 == 0 {
            PolicyResult::Drop
        } else {
            PolicyResult::Pass
        };
        store
            .add(
                session,
                round * 100 + i,
                vec![PolicyCondition::new(Condition::Domain(format!(
                    "d{}.example",
                    i
                )))],
                result,
            )
            .unwrap();
    }
}

#[test]
fn test_snapshot_never_mixes_rounds() {
    let (_kernel, host) = test_bootstrap();
    let session = host.open_session(DAEMON_PID, "writer").unwrap();
    let context = host.context().unwrap();
    let store = context.store();
    let writer = store.create_session("rounds");
    let done = AtomicBool::new(false);

    thread::scope(|scope| {
        for _ in 0..4 {
            scope.spawn(|| {
                let mut last_generation = 0;
                while !done.load(Ordering::Acquire) {
                    let snapshot = store.snapshot();
                    assert!(snapshot.generation() >= last_generation);
                    last_generation = snapshot.generation();
                    if snapshot.is_empty() {
                        continue;
                    }
                    assert_eq!(snapshot.len(), POLICIES_PER_ROUND as usize);
                    let round = snapshot.policies()[0].policy.order / 100;
                    assert!(snapshot
                        .policies()
                        .iter()
                        .all(|applied| applied.policy.order / 100 == round));
                }
            });
        }

        for round in 0..ROUNDS {
            stage_round(store, writer, round);
            store.apply_all(writer).unwrap();
        }
        done.store(true, Ordering::Release);
    });

    assert_eq!(store.snapshot().len(), POLICIES_PER_ROUND as usize);
    host.close_session(session).unwrap();
}

#[test]
fn test_cached_results_follow_commits() {
    let (_kernel, host) = test_bootstrap();
    let session = host.open_session(DAEMON_PID, "writer").unwrap();
    let (context, channel) = host.open_channel(APP_PID, ChannelFlags::empty()).unwrap();
    let store = context.store();
    let registry = context.registry();
    let writer = store.create_session("rounds");
    let parameters =
        encode_parameters(&[ClientParameter::Domain("www.d3.example".into())]).unwrap();
    let client = registry.add(channel, &parameters).unwrap();
    let done = AtomicBool::new(false);

    thread::scope(|scope| {
        for _ in 0..4 {
            scope.spawn(|| {
                while !done.load(Ordering::Acquire) {
                    let result = registry.result(channel, client).unwrap();
                    assert!(matches!(
                        result.routing_result,
                        ResultKind::Pass | ResultKind::Drop
                    ));
                }
            });
        }

        for round in 0..ROUNDS {
            stage_round(store, writer, round);
            store.apply_all(writer).unwrap();
        }
        done.store(true, Ordering::Release);
    });

    // The last round is odd, so its policies pass
    assert_eq!(
        registry.result(channel, client).unwrap().routing_result,
        ResultKind::Pass
    );
    stage_round(store, writer, ROUNDS);
    store.apply_all(writer).unwrap();
    assert_eq!(
        registry.result(channel, client).unwrap().routing_result,
        ResultKind::Drop
    );

    host.close_channel(channel).unwrap();
    host.close_session(session).unwrap();
}

#[test]
fn test_concurrent_writers_each_commit_whole() {
    let (_kernel, host) = test_bootstrap();
    let session = host.open_session(DAEMON_PID, "writer").unwrap();
    let context = host.context().unwrap();
    let store = context.store();

    thread::scope(|scope| {
        for writer in 0..4u32 {
            scope.spawn(move || {
                let id = store.create_session(format!("writer-{}", writer));
                for i in 0..POLICIES_PER_ROUND {
                    store
                        .add(
                            id,
                            writer * 100 + i,
                            vec![PolicyCondition::new(Condition::Domain(format!(
                                "w{}-{}.example",
                                writer, i
                            )))],
                            PolicyResult::Drop,
                        )
                        .unwrap();
                }
                store.apply_all(id).unwrap();
            });
        }
    });

    let snapshot = store.snapshot();
    assert_eq!(snapshot.len(), 4 * POLICIES_PER_ROUND as usize);
    host.close_session(session).unwrap();
}
