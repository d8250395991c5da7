//! Queue client tests. The consumer side is plain blocking code, so these
//! are ordinary `#[test]`s; each bridge runs its own engine thread.

#![allow(clippy::unwrap_used)]

use std::time::{Duration, Instant};

use indisync_bridge::{
    BridgeConfig, BridgeError, BridgeState, Command, EventQueuePolicy, QueueClient,
};
use indisync_core::{
    BlobPolicy, CoreError, DetachedTransport, Device, EventType, Member, MemberInput,
    MemoryTransport, Notification, Origin, Session, SessionBuilder, SessionConfig, SwitchRule,
    SwitchState, Vector, VectorKind,
};
use pretty_assertions::assert_eq;
use serde_json::json;
use tokio_util::sync::CancellationToken;

const WAIT: Duration = Duration::from_secs(2);

// ── Fixtures ────────────────────────────────────────────────────────

fn board() -> Device {
    let switches = Vector::switch(
        "switches",
        SwitchRule::AnyOfMany,
        (0..5)
            .map(|i| Member::switch(format!("member{i}"), SwitchState::Off))
            .collect(),
    )
    .unwrap();
    let temp = Vector::new(
        "temperature",
        VectorKind::Number,
        vec![Member::number("celsius", 20.0, "%3.1f")],
    )
    .unwrap();
    let data = Vector::new("data", VectorKind::Blob, vec![Member::blob("file")]).unwrap();
    Device::with_vectors("board", [switches, temp, data]).unwrap()
}

fn driver() -> SessionBuilder {
    Session::builder(SessionConfig {
        name: "driver".into(),
        ..SessionConfig::default()
    })
    .device(board())
}

fn spawn(config: BridgeConfig) -> QueueClient {
    let client = QueueClient::spawn(driver(), DetachedTransport::new(), config).unwrap();
    assert!(client.wait_for(BridgeState::Connected, WAIT));
    client
}

fn on_members(n: &Notification) -> Vec<String> {
    n.vector_snapshot()
        .unwrap()
        .members()
        .filter(|m| m.switch_state() == Some(SwitchState::On))
        .map(|m| m.name.clone())
        .collect()
}

// ── Commands and events ─────────────────────────────────────────────

#[test]
fn snapshot_command_reports_current_state() {
    let mut client = spawn(BridgeConfig::default());
    client.request_snapshot().unwrap();

    let n = client.recv_timeout(WAIT).unwrap();
    assert_eq!(n.event_type, EventType::Snapshot);
    assert_eq!(n.device, None);
    assert!(n.snapshot.connected);
    assert!(n.snapshot.vector("board", "switches").is_some());
    client.join().unwrap();
}

#[test]
fn submission_yields_one_set_event() {
    let mut client = spawn(BridgeConfig::default());
    client
        .submit("board", "switches", [("member2", "On"), ("member4", "On")])
        .unwrap();

    let n = client.recv_timeout(WAIT).unwrap();
    assert_eq!(n.event_type, EventType::Set);
    assert_eq!(n.vector.as_deref(), Some("switches"));
    assert_eq!(on_members(&n), ["member2", "member4"]);
    assert!(client.recv_timeout(Duration::from_millis(100)).is_none());
}

#[test]
fn blob_events_follow_consumer_policy() {
    let mut client = spawn(BridgeConfig::default());
    let payload = b"a,b,c,d\n".to_vec();
    let blob = || [("file", MemberInput::blob(payload.clone(), ".csv"))];

    // Default policy is Never: the SetBLOB is withheld.
    client.submit("board", "data", blob()).unwrap();
    client.request_snapshot().unwrap();
    assert_eq!(client.recv_timeout(WAIT).unwrap().event_type, EventType::Snapshot);

    client.set_blob_policy("board", Some("data"), BlobPolicy::Also).unwrap();
    client.submit("board", "data", blob()).unwrap();
    let n = client.recv_timeout(WAIT).unwrap();
    assert_eq!(n.event_type, EventType::SetBlob);
    let value = n
        .snapshot
        .member("board", "data", "file")
        .and_then(|m| m.blob_value())
        .unwrap();
    assert_eq!(value.sizeformat(), (8, ".csv"));
    assert_eq!(value.data.as_ref(), payload.as_slice());
}

#[test]
fn raw_commands_are_parsed_or_dropped() {
    let mut client = spawn(BridgeConfig::default());
    client.send_raw(json!("bogus")).unwrap();
    client.send_raw(json!(["board"])).unwrap();
    client.send_raw(json!(["board", "switches", "Maybe"])).unwrap();
    client
        .send_raw(json!(["board", "switches", {"member1": "On"}]))
        .unwrap();
    client.send_raw(json!("snapshot")).unwrap();

    let set = client.recv_timeout(WAIT).unwrap();
    assert_eq!(set.event_type, EventType::Set);
    assert_eq!(on_members(&set), ["member1"]);
    assert_eq!(client.recv_timeout(WAIT).unwrap().event_type, EventType::Snapshot);
    assert_eq!(client.state(), BridgeState::Connected);

    client.send_raw(serde_json::Value::Null).unwrap();
    assert!(client.wait_for(BridgeState::Stopped, WAIT));
}

#[test]
fn latest_policy_keeps_only_newest() {
    let mut client = spawn(BridgeConfig {
        event_queue: EventQueuePolicy::Latest,
        ..BridgeConfig::default()
    });
    for value in ["1", "2", "3"] {
        client
            .submit("board", "temperature", [("celsius", value)])
            .unwrap();
    }
    std::thread::sleep(Duration::from_millis(200));

    let n = client.try_recv().unwrap();
    let celsius = n
        .snapshot
        .member("board", "temperature", "celsius")
        .and_then(|m| m.number_value())
        .and_then(|v| v.as_f64())
        .unwrap();
    assert!((celsius - 3.0).abs() < f64::EPSILON);
    assert!(client.try_recv().is_none());
}

#[test]
fn latest_value_survives_engine_exit() {
    let mut client = spawn(BridgeConfig {
        event_queue: EventQueuePolicy::Latest,
        ..BridgeConfig::default()
    });
    client
        .submit("board", "temperature", [("celsius", "7")])
        .unwrap();
    client.send(Command::Stop).unwrap();
    assert!(client.wait_for(BridgeState::Stopped, WAIT));
    // Let the engine thread drop its end of the channel.
    std::thread::sleep(Duration::from_millis(50));

    let n = client.try_recv().unwrap();
    assert_eq!(n.event_type, EventType::Set);
    assert!(client.try_recv().is_none());
}

// ── Assembly and shutdown ───────────────────────────────────────────

#[test]
fn duplicate_devices_fail_before_start() {
    let err = QueueClient::spawn(
        driver().device(Device::new("board")),
        DetachedTransport::new(),
        BridgeConfig::default(),
    )
    .unwrap_err();
    assert!(matches!(
        err,
        BridgeError::Core(CoreError::DuplicateIdentity { .. })
    ));
}

fn wedged_client() -> QueueClient {
    let client = spawn(BridgeConfig {
        event_queue: EventQueuePolicy::Bounded(1),
        backoff: Duration::from_millis(20),
        ..BridgeConfig::default()
    });
    for _ in 0..3 {
        client.request_snapshot().unwrap();
    }
    // First snapshot fills the queue; the engine now backs off on the second.
    std::thread::sleep(Duration::from_millis(100));
    client
}

#[test]
fn stop_sentinel_wins_over_full_event_queue() {
    let client = wedged_client();
    let handle = client.shutdown_handle();
    client.send(Command::Stop).unwrap();
    assert!(client.wait_for(BridgeState::Stopped, Duration::from_millis(100)));
    assert!(handle.is_shutdown());

    let started = Instant::now();
    client.shutdown();
    client.shutdown();
    client.join().unwrap();
    assert!(started.elapsed() <= Duration::from_millis(100));
}

#[test]
fn shutdown_interrupts_backoff() {
    let client = wedged_client();
    let commands = client.commands();
    let handle = client.shutdown_handle();

    let started = Instant::now();
    handle.shutdown();
    assert!(client.state() >= BridgeState::Stopping);
    client.join().unwrap();
    assert!(started.elapsed() <= Duration::from_millis(100));
    assert!(handle.is_shutdown());

    assert!(matches!(
        commands.send(Command::Snapshot),
        Err(BridgeError::Stopped)
    ));
}

#[test]
fn shutdown_interrupts_stalled_wire() {
    // The peer end stays open but is never read, so sends block once its
    // single slot is taken.
    let (_peer, client_end) = MemoryTransport::pair(1);
    let session = Session::builder(SessionConfig {
        name: "stalled".into(),
        ..SessionConfig::default()
    });
    let client = QueueClient::spawn(session, client_end, BridgeConfig::default()).unwrap();
    assert!(client.wait_for(BridgeState::Connected, WAIT));
    for device in ["a", "b", "c", "d"] {
        client
            .set_blob_policy(device, None, BlobPolicy::Also)
            .unwrap();
    }
    std::thread::sleep(Duration::from_millis(100));

    let started = Instant::now();
    client.shutdown();
    assert!(client.wait_for(BridgeState::Stopped, WAIT));
    client.join().unwrap();
    assert!(started.elapsed() < Duration::from_millis(500));
}

// ── Client-side bridge over a live driver ───────────────────────────

#[test]
fn client_bridge_mirrors_driver_and_reports_disconnect() {
    let (driver_end, client_end) = MemoryTransport::pair(16);
    let cancel = CancellationToken::new();
    let driver_thread = std::thread::spawn({
        let cancel = cancel.clone();
        move || {
            let runtime = tokio::runtime::Builder::new_current_thread()
                .enable_time()
                .build()
                .unwrap();
            runtime.block_on(async move {
                let mut session = driver().build().unwrap();
                session.run(driver_end, cancel).await.unwrap();
            });
        }
    });

    let client_session = Session::builder(SessionConfig {
        name: "client".into(),
        ..SessionConfig::default()
    });
    let mut client =
        QueueClient::spawn(client_session, client_end, BridgeConfig::default()).unwrap();
    assert!(client.wait_for(BridgeState::Connected, WAIT));

    let mut defined = Vec::new();
    while defined.len() < 3 {
        let n = client.recv_timeout(WAIT).unwrap();
        assert_eq!(n.origin, Origin::Remote);
        if matches!(n.event_type, EventType::Define | EventType::DefineBlob) {
            defined.push(n.vector.unwrap());
        }
    }
    assert_eq!(defined, ["switches", "temperature", "data"]);

    client
        .submit("board", "switches", [("member3", "On")])
        .unwrap();
    let set = client.recv_timeout(WAIT).unwrap();
    assert_eq!(set.event_type, EventType::Set);
    assert_eq!(on_members(&set), ["member3"]);

    cancel.cancel();
    driver_thread.join().unwrap();

    let deadline = Instant::now() + WAIT;
    loop {
        client.request_snapshot().unwrap();
        let n = client.recv_timeout(WAIT).unwrap();
        if n.event_type == EventType::Snapshot && !n.snapshot.connected {
            break;
        }
        assert!(Instant::now() < deadline, "disconnect never reflected");
        std::thread::sleep(Duration::from_millis(20));
    }
    assert_eq!(client.state(), BridgeState::Connected);
}
