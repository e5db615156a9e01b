//! Session Teardown Tests
//!
//! Validates that closing sessions and channels, and exiting processes,
//! withdraw everything they owned, including while clients are evaluated.

use core_types::{ClientParameter, Condition, NecpError, PolicyCondition, PolicyResult, ResultKind};
use necp_wire::{encode_parameters, Command, Response, ResponseBody};
use services_client_registry::{ChannelFlags, ClientError, ClientState};
use services_policy_session::HostError;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use tests_resilience::{test_bootstrap, APP_PID, DAEMON_PID, VPN_DAEMON_PID};

fn apple_drop() -> (Vec<PolicyCondition>, PolicyResult) {
    (
        vec![PolicyCondition::new(Condition::Domain("apple.com".into()))],
        PolicyResult::Drop,
    )
}

#[test]
fn test_session_close_during_evaluation() {
    let (_kernel, host) = test_bootstrap();
    let anchor = host.open_session(DAEMON_PID, "anchor").unwrap();
    let (context, channel) = host.open_channel(APP_PID, ChannelFlags::empty()).unwrap();
    let registry = context.registry();
    let parameters = encode_parameters(&[ClientParameter::Domain("www.apple.com".into())]).unwrap();
    let client = registry.add(channel, &parameters).unwrap();
    let done = AtomicBool::new(false);

    thread::scope(|scope| {
        for _ in 0..3 {
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

        for _ in 0..50 {
            let session = host.open_session(VPN_DAEMON_PID, "short-lived").unwrap();
            let (conditions, result) = apple_drop();
            let add = Command::PolicyAdd {
                order: 10,
                conditions,
                result,
            };
            let response = Response::decode(&session.handle(&add.encode(1)).unwrap()).unwrap();
            assert!(response.is_ok());
            let apply = Command::PolicyApplyAll.encode(2);
            assert!(Response::decode(&session.handle(&apply).unwrap())
                .unwrap()
                .is_ok());
            host.close_session(session).unwrap();
        }
        done.store(true, Ordering::Release);
    });

    assert!(context.store().snapshot().is_empty());
    assert_eq!(
        registry.result(channel, client).unwrap().routing_result,
        ResultKind::Pass
    );
    host.close_channel(channel).unwrap();
    host.close_session(anchor).unwrap();
}

#[test]
fn test_closed_session_is_gone() {
    let (_kernel, host) = test_bootstrap();
    let anchor = host.open_session(DAEMON_PID, "anchor").unwrap();
    let context = host.context().unwrap();
    let store = context.store();

    let session = store.create_session("closing");
    let (conditions, result) = apple_drop();
    store.add(session, 1, conditions, result).unwrap();
    store.apply_all(session).unwrap();
    let generation = store.generation();

    store.close_session(session).unwrap();
    assert!(store.generation() > generation);
    assert!(!store.has_session(session));
    assert_eq!(store.list_all(session), Err(NecpError::InvalidProcess));
    assert_eq!(store.close_session(session), Err(NecpError::InvalidProcess));

    host.close_session(anchor).unwrap();
}

#[test]
fn test_context_released_when_idle() {
    let (_kernel, host) = test_bootstrap();
    assert!(host.context().is_none());

    let session = host.open_session(DAEMON_PID, "first").unwrap();
    let first = host.context().unwrap();
    let (conditions, result) = apple_drop();
    let add = Command::PolicyAdd {
        order: 1,
        conditions,
        result,
    };
    session.handle(&add.encode(1)).unwrap();
    session.handle(&Command::PolicyApplyAll.encode(2)).unwrap();
    assert_eq!(first.store().snapshot().len(), 1);

    host.close_session(session).unwrap();
    assert!(host.context().is_none());

    // A new context starts with an empty policy set
    let (second, channel) = host.open_channel(APP_PID, ChannelFlags::empty()).unwrap();
    assert!(second.store().snapshot().is_empty());
    host.close_channel(channel).unwrap();
    assert!(host.context().is_none());
}

#[test]
fn test_process_exit_removes_channels_not_sessions() {
    let (kernel, host) = test_bootstrap();
    let session = host.open_session(DAEMON_PID, "daemon").unwrap();
    let (context, channel) = host.open_channel(APP_PID, ChannelFlags::empty()).unwrap();
    let registry = context.registry();
    let parameters = encode_parameters(&[ClientParameter::Domain("example.com".into())]).unwrap();
    let first = registry.add(channel, &parameters).unwrap();
    let second = registry.add(channel, &parameters).unwrap();

    kernel.processes.exit(APP_PID);
    assert_eq!(host.process_exited(APP_PID), 2);
    assert_eq!(host.channel_count(), 0);
    assert_eq!(host.session_count(), 1);
    assert_eq!(registry.client_state(first), ClientState::Removed);
    assert_eq!(registry.client_state(second), ClientState::Removed);
    assert_eq!(
        registry.add(channel, &parameters),
        Err(ClientError::ChannelNotFound(channel))
    );
    assert_eq!(
        host.close_channel(channel),
        Err(HostError::ChannelNotOpen(channel))
    );

    let list = session.handle(&Command::PolicyListAll.encode(1)).unwrap();
    assert_eq!(
        Response::decode(&list).unwrap().outcome,
        Ok(ResponseBody::PolicyIds(Vec::new()))
    );
    host.close_session(session).unwrap();
    assert!(host.context().is_none());
}
