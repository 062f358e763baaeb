// Integration tests for the primary/fallback connection sequence

mod common;

use common::{manager_with_log, RecordingService, ScriptedBackend, ALT1, ALT2, PRIMARY};
use pretty_assertions::assert_eq;
use sunmi_printer::{BindError, ConnectionState};

#[test]
fn test_candidates_tried_in_declared_order() {
    let backend = ScriptedBackend::new();
    backend.reject_all();
    let (manager, log) = manager_with_log(&backend);

    manager.connect();

    assert_eq!(backend.bound_names(), vec![PRIMARY, ALT1, ALT2]);
    assert_eq!(manager.attempts(), 3);
    assert_eq!(manager.state(), ConnectionState::Disconnected);
    assert_eq!(log.entries(), vec!["listener:false"]);
}

#[test]
fn test_third_candidate_succeeds_after_two_failures() {
    let backend = ScriptedBackend::new();
    let (manager, log) = manager_with_log(&backend);

    manager.connect();
    assert_eq!(manager.state(), ConnectionState::Connecting);
    backend.session(0).null_binding();
    backend.session(1).failed(BindError::PermissionDenied("no permission".to_string()));
    backend.session(2).connected(RecordingService::new());

    assert!(manager.is_connected());
    assert_eq!(manager.attempts(), 3);
    assert_eq!(backend.bound_names(), vec![PRIMARY, ALT1, ALT2]);
    // One confirmed transition, no intermediate false
    assert_eq!(log.entries(), vec!["listener:true"]);

    let info = manager.connection_info();
    assert_eq!(info.current_identity.unwrap().name, ALT2);
    assert!(!info.exhausted);
}

#[test]
fn test_exhaustion_happens_exactly_at_max_attempts() {
    let backend = ScriptedBackend::new();
    backend.reject(ALT1, BindError::NotResolvable(ALT1.to_string()));
    let (manager, log) = manager_with_log(&backend);

    manager.connect();
    backend.session(0).failed(BindError::Rejected("busy".to_string()));
    backend.session(1).binding_died();

    assert_eq!(backend.bind_count(), manager.max_attempts());
    assert_eq!(manager.attempts(), 3);
    assert_eq!(manager.state(), ConnectionState::Disconnected);
    assert!(manager.connection_info().exhausted);
    assert_eq!(log.entries(), vec!["listener:false"]);

    // Late callbacks from the finished sequence change nothing
    backend.session(0).failed(BindError::NullBinding);
    backend.session(1).connected(RecordingService::new());
    assert_eq!(backend.bind_count(), 3);
    assert!(!manager.is_connected());
    assert_eq!(log.count("listener:false"), 1);
}

#[test]
fn test_connect_while_connecting_is_noop() {
    let backend = ScriptedBackend::new();
    let (manager, log) = manager_with_log(&backend);

    manager.connect();
    manager.connect();
    manager.connect();

    assert_eq!(backend.bind_count(), 1);
    assert_eq!(manager.attempts(), 1);
    assert!(log.entries().is_empty());
}

#[test]
fn test_connect_when_connected_renotifies_without_binding() {
    let backend = ScriptedBackend::new();
    backend.auto_connect(PRIMARY, RecordingService::new());
    let (manager, log) = manager_with_log(&backend);

    manager.connect();
    manager.connect();

    assert_eq!(backend.bind_count(), 1);
    assert_eq!(log.entries(), vec!["listener:true", "listener:true"]);
}

#[test]
fn test_stale_connect_after_disconnect_is_ignored() {
    let backend = ScriptedBackend::new();
    let (manager, log) = manager_with_log(&backend);

    manager.connect();
    manager.disconnect();
    backend.session(0).connected(RecordingService::new());

    assert!(!manager.is_connected());
    assert_eq!(manager.state(), ConnectionState::Disconnected);
    assert!(log.entries().is_empty());
    assert_eq!(backend.unbound_names(), vec![PRIMARY]);
}

#[test]
fn test_late_callback_from_abandoned_candidate_is_ignored() {
    let backend = ScriptedBackend::new();
    let (manager, log) = manager_with_log(&backend);

    manager.connect();
    backend.session(0).failed(BindError::NullBinding);
    assert_eq!(backend.bound_names(), vec![PRIMARY, ALT1]);

    // Primary answers after we already moved on
    backend.session(0).connected(RecordingService::new());
    assert!(!manager.is_connected());
    assert_eq!(manager.state(), ConnectionState::Connecting);

    backend.session(1).connected(RecordingService::new());
    assert!(manager.is_connected());
    assert_eq!(manager.connection_info().current_identity.unwrap().name, ALT1);
    assert_eq!(log.entries(), vec!["listener:true"]);
}

#[test]
fn test_disconnect_while_connecting_moves_to_next_candidate() {
    let backend = ScriptedBackend::new();
    let (manager, _log) = manager_with_log(&backend);

    manager.connect();
    backend.session(0).disconnected();

    assert_eq!(manager.state(), ConnectionState::Connecting);
    assert_eq!(manager.attempts(), 2);
    assert_eq!(backend.bound_names(), vec![PRIMARY, ALT1]);
    assert_eq!(backend.unbound_names(), vec![PRIMARY]);
}

#[test]
fn test_unsolicited_disconnect_does_not_retry() {
    let backend = ScriptedBackend::new();
    let (manager, log) = manager_with_log(&backend);

    manager.connect();
    backend.session(0).connected(RecordingService::new());
    backend.session(0).disconnected();

    assert_eq!(manager.state(), ConnectionState::Disconnected);
    assert!(!manager.is_connected());
    assert_eq!(backend.bind_count(), 1);
    assert_eq!(log.entries(), vec!["listener:true", "listener:false"]);

    // The platform restores the same binding on its own
    backend.session(0).connected(RecordingService::new());
    assert!(manager.is_connected());
    assert_eq!(
        log.entries(),
        vec!["listener:true", "listener:false", "listener:true"]
    );
}

#[test]
fn test_binding_death_starts_a_fresh_sequence() {
    let backend = ScriptedBackend::new();
    let (manager, log) = manager_with_log(&backend);

    manager.connect();
    backend.session(0).failed(BindError::NullBinding);
    backend.session(1).connected(RecordingService::new());
    assert_eq!(manager.attempts(), 2);

    backend.session(1).binding_died();

    assert_eq!(log.entries(), vec!["listener:true", "listener:false"]);
    assert_eq!(manager.state(), ConnectionState::Connecting);
    // Fresh sequence starts from the primary again
    assert_eq!(manager.attempts(), 1);
    assert_eq!(backend.bound_names(), vec![PRIMARY, ALT1, PRIMARY]);
    assert!(backend.unbound_names().contains(&ALT1.to_string()));

    backend.session(2).connected(RecordingService::new());
    assert!(manager.is_connected());
    assert_eq!(log.count("listener:true"), 2);
}

#[test]
fn test_disconnect_unbinds_without_notifying() {
    let backend = ScriptedBackend::new();
    backend.auto_connect(PRIMARY, RecordingService::new());
    let (manager, log) = manager_with_log(&backend);

    manager.connect();
    manager.disconnect();

    assert_eq!(manager.state(), ConnectionState::Disconnected);
    assert_eq!(backend.unbound_names(), vec![PRIMARY]);
    assert_eq!(log.entries(), vec!["listener:true"]);

    // Old session callbacks are stale now
    backend.session(0).disconnected();
    backend.session(0).binding_died();
    assert_eq!(backend.bind_count(), 1);
    assert_eq!(log.entries(), vec!["listener:true"]);
}

#[test]
fn test_explicit_connect_after_exhaustion_restarts_budget() {
    let backend = ScriptedBackend::new();
    backend.reject_all();
    let (manager, _log) = manager_with_log(&backend);

    manager.connect();
    assert_eq!(manager.attempts(), 3);

    backend.accept(ALT2);
    manager.connect();

    assert_eq!(backend.bind_count(), 6);
    assert_eq!(manager.attempts(), 3);
    assert_eq!(manager.state(), ConnectionState::Connecting);
    assert!(!manager.connection_info().exhausted);
}

#[test]
fn test_fresh_sequence_releases_binding_left_by_unsolicited_disconnect() {
    let backend = ScriptedBackend::new();
    let (manager, log) = manager_with_log(&backend);

    manager.connect();
    backend.session(0).failed(BindError::NullBinding);
    backend.session(1).connected(RecordingService::new());
    backend.session(1).disconnected();
    assert_eq!(backend.unbound_names(), vec![PRIMARY]);

    manager.connect();

    assert_eq!(backend.unbound_names(), vec![PRIMARY, ALT1]);
    assert_eq!(backend.bound_names(), vec![PRIMARY, ALT1, PRIMARY]);

    // The old binding can no longer come back
    backend.session(1).connected(RecordingService::new());
    assert_eq!(manager.state(), ConnectionState::Connecting);

    backend.session(2).connected(RecordingService::new());
    manager.disconnect();
    assert_eq!(backend.unbound_names(), vec![PRIMARY, ALT1, PRIMARY]);
    assert_eq!(
        log.entries(),
        vec!["listener:true", "listener:false", "listener:true"]
    );
}

#[test]
fn test_failure_reported_inside_bind_still_releases_candidate() {
    let backend = ScriptedBackend::new();
    backend.fail_inside_bind(PRIMARY, BindError::NullBinding);
    let (manager, _log) = manager_with_log(&backend);

    manager.connect();

    assert_eq!(backend.bound_names(), vec![PRIMARY, ALT1]);
    assert_eq!(backend.unbound_names(), vec![PRIMARY]);
    assert_eq!(manager.attempts(), 2);
    assert_eq!(manager.state(), ConnectionState::Connecting);

    backend.session(1).connected(RecordingService::new());
    assert!(manager.is_connected());
    assert_eq!(backend.unbound_names(), vec![PRIMARY]);
}
