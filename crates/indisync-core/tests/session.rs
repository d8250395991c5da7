//! Session engine tests: write validation, fan-out order, snoop timers and
//! a driver/client pair over the in-memory transport.

#![allow(clippy::unwrap_used)]

use std::sync::{Arc, Mutex};
use std::time::Duration;

use indexmap::IndexMap;
use indisync_core::session::{NewVector, ProtocolMessage};
use indisync_core::{
    BlobPolicy, CoreError, DetachedTransport, Device, DeviceHandler, EventType, Member,
    MemberInput, MemoryTransport, Notification, Origin, Session, SessionConfig, SessionContext,
    SwitchRule, SwitchState, Transport, Vector, VectorKind,
};
use pretty_assertions::assert_eq;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

// ── Fixtures ────────────────────────────────────────────────────────

fn switches(rule: SwitchRule) -> Vector {
    let members = (0..5)
        .map(|i| Member::switch(format!("member{i}"), SwitchState::Off))
        .collect();
    Vector::switch("switches", rule, members).unwrap()
}

fn led_driver() -> Session {
    let blob = Vector::new("data", VectorKind::Blob, vec![Member::blob("file")]).unwrap();
    let temp = Vector::new(
        "temperature",
        VectorKind::Number,
        vec![Member::number("celsius", 20.0, "%3.1f").with_range(-50.0, 99.0, 0.0)],
    )
    .unwrap();
    let device = Device::with_vectors("board", [switches(SwitchRule::AnyOfMany), blob, temp]).unwrap();
    Session::builder(SessionConfig::default())
        .device(device)
        .build()
        .unwrap()
}

fn write(device: &str, vector: &str, values: Vec<(&str, MemberInput)>) -> ProtocolMessage {
    ProtocolMessage::NewVector(NewVector {
        device: device.into(),
        vector: vector.into(),
        timestamp: None,
        values: values
            .into_iter()
            .map(|(k, v)| (k.to_owned(), v))
            .collect::<IndexMap<_, _>>(),
    })
}

fn drain(session: &mut Session) -> Vec<Notification> {
    std::iter::from_fn(|| session.next_notification()).collect()
}

// ── Writes ──────────────────────────────────────────────────────────

#[test]
fn any_of_many_write_sets_submitted_members() {
    let mut driver = led_driver();
    driver.handle_inbound(write(
        "board",
        "switches",
        vec![("member2", "On".into()), ("member4", "On".into())],
    ));

    let events = drain(&mut driver);
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].event_type, EventType::Set);

    let vector = events[0].vector_snapshot().unwrap();
    let on: Vec<&str> = vector
        .members()
        .filter(|m| m.switch_state() == Some(SwitchState::On))
        .map(|m| m.name.as_str())
        .collect();
    assert_eq!(on, ["member2", "member4"]);
}

#[test]
fn blob_write_keeps_size_format_and_bytes() {
    let mut driver = led_driver();
    let payload = b"1,2,3,4\n".to_vec();
    driver.handle_inbound(write(
        "board",
        "data",
        vec![("file", MemberInput::blob(payload.clone(), ".csv"))],
    ));

    let events = drain(&mut driver);
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].event_type, EventType::SetBlob);

    let blob = events[0]
        .snapshot
        .member("board", "data", "file")
        .and_then(|m| m.blob_value())
        .unwrap();
    assert_eq!(blob.sizeformat(), (8, ".csv"));
    assert_eq!(blob.data.as_ref(), payload.as_slice());
}

#[test]
fn invalid_writes_leave_no_trace() {
    let mut driver = Session::builder(SessionConfig::default())
        .device(
            Device::with_vectors("board", [{
                let mut v = switches(SwitchRule::OneOfMany);
                v.set_switch("member0", SwitchState::On).unwrap();
                v
            }])
            .unwrap(),
        )
        .build()
        .unwrap();

    driver.handle_inbound(write(
        "board",
        "switches",
        vec![("member1", "On".into()), ("member2", "On".into())],
    ));
    driver.handle_inbound(write("board", "switches", vec![("member0", "Off".into())]));
    driver.handle_inbound(write("nobody", "switches", vec![("member0", "On".into())]));

    assert!(drain(&mut driver).is_empty());
    assert_eq!(driver.store().vector("board", "switches").unwrap().on_count(), 1);
}

#[test]
fn duplicate_device_fails_assembly() {
    let err = Session::builder(SessionConfig::default())
        .device(Device::new("board"))
        .device(Device::new("board"))
        .build()
        .unwrap_err();
    assert!(err.is_fatal());
    assert!(matches!(err, CoreError::DuplicateIdentity { what: "device", .. }));
}

// ── Snapshots ───────────────────────────────────────────────────────

#[test]
fn each_snapshot_reflects_exactly_its_mutations() {
    let mut driver = led_driver();
    for i in 1..=5_i32 {
        let store = driver.store_mut();
        store
            .vector_mut("board", "temperature")
            .unwrap()
            .set_number("celsius", f64::from(i))
            .unwrap();
        store.send_update("board", "temperature", None, None).unwrap();
    }

    let events = drain(&mut driver);
    assert_eq!(events.len(), 5);
    for (i, event) in events.iter().enumerate() {
        let value = event
            .snapshot
            .member("board", "temperature", "celsius")
            .and_then(|m| m.number_value())
            .and_then(|n| n.as_f64())
            .unwrap();
        let expected = f64::from(u8::try_from(i + 1).unwrap());
        assert!((value - expected).abs() < f64::EPSILON);
    }
}

#[test]
fn snapshots_do_not_follow_later_mutations() {
    let mut driver = led_driver();
    driver.handle_inbound(write("board", "switches", vec![("member0", "On".into())]));
    let first = drain(&mut driver).remove(0);
    let before = (*first.snapshot).clone();

    driver.handle_inbound(write("board", "switches", vec![("member0", "Off".into())]));
    drain(&mut driver);

    assert_eq!(*first.snapshot, before);
    assert_eq!(
        first
            .snapshot
            .member("board", "switches", "member0")
            .and_then(|m| m.switch_state()),
        Some(SwitchState::On)
    );
    let json = driver.snapshot_notification().snapshot.to_json();
    assert_eq!(json["devices"]["board"]["name"], "board");
}

// ── Snooping ────────────────────────────────────────────────────────

#[derive(Clone, Default)]
struct Watcher {
    seen: Arc<Mutex<Vec<(EventType, Option<String>)>>>,
}

impl DeviceHandler for Watcher {
    fn on_start(&mut self, ctx: &mut SessionContext<'_>, device: &str) -> Result<(), CoreError> {
        ctx.snoop(device, "board", Some("temperature"), Some(Duration::from_secs(5)));
        Ok(())
    }

    fn on_snoop(
        &mut self,
        _ctx: &mut SessionContext<'_>,
        notification: &Notification,
    ) -> Result<(), CoreError> {
        self.seen
            .lock()
            .unwrap()
            .push((notification.event_type, notification.device.clone()));
        Ok(())
    }
}

fn snooping_session(watcher: Watcher) -> Session {
    let temp = Vector::new(
        "temperature",
        VectorKind::Number,
        vec![Member::number("celsius", 20.0, "%3.1f")],
    )
    .unwrap();
    Session::builder(SessionConfig::default())
        .device(Device::with_vectors("board", [temp]).unwrap())
        .device(Device::new("watcher"))
        .handler("watcher", watcher)
        .build()
        .unwrap()
}

#[tokio::test(start_paused = true)]
async fn snoop_timeout_fires_once_until_rearmed() {
    let watcher = Watcher::default();
    let seen = watcher.seen.clone();
    let mut session = snooping_session(watcher);
    session.start(&mut DetachedTransport::new()).await.unwrap();

    // Traffic inside the window pushes the deadline out.
    tokio::time::advance(Duration::from_secs(3)).await;
    session
        .store_mut()
        .send_update("board", "temperature", None, None)
        .unwrap();
    drain(&mut session);
    tokio::time::advance(Duration::from_secs(3)).await;
    session.expire_snoops(Instant::now());

    let types = |seen: &Mutex<Vec<(EventType, Option<String>)>>| -> Vec<EventType> {
        seen.lock().unwrap().iter().map(|(t, _)| *t).collect()
    };
    assert_eq!(types(&seen), [EventType::Set]);

    tokio::time::advance(Duration::from_secs(3)).await;
    session.expire_snoops(Instant::now());
    tokio::time::advance(Duration::from_secs(30)).await;
    session.expire_snoops(Instant::now());
    assert_eq!(types(&seen), [EventType::Set, EventType::TimeOut]);
    assert_eq!(session.next_deadline(), None);

    // Tagged with the snooped device, not the snooper.
    assert_eq!(seen.lock().unwrap()[1].1.as_deref(), Some("board"));

    session.with_context(|ctx| {
        ctx.snoop("watcher", "board", Some("temperature"), Some(Duration::from_secs(5)));
    });
    tokio::time::advance(Duration::from_secs(6)).await;
    session.expire_snoops(Instant::now());
    assert_eq!(
        types(&seen),
        [EventType::Set, EventType::TimeOut, EventType::TimeOut]
    );
}

// ── Driver and client over the in-memory transport ──────────────────

async fn pump(client: &mut Session, wire: &mut MemoryTransport, until: impl Fn(&Session) -> bool) {
    let deadline = Instant::now() + Duration::from_secs(2);
    while !until(client) {
        let message = tokio::time::timeout_at(deadline, wire.recv())
            .await
            .expect("timed out waiting for driver traffic")
            .unwrap();
        client.handle_inbound(message);
    }
}

#[tokio::test]
async fn client_mirrors_driver_and_round_trips_writes() {
    let (driver_end, mut client_end) = MemoryTransport::pair(16);
    let mut driver = led_driver();
    let cancel = CancellationToken::new();
    let driver_task = tokio::spawn({
        let cancel = cancel.clone();
        async move {
            driver.run(driver_end, cancel).await.unwrap();
            driver
        }
    });

    let mut client = Session::builder(SessionConfig::default()).build().unwrap();
    client.start(&mut client_end).await.unwrap();
    client.flush(&mut client_end).await;

    pump(&mut client, &mut client_end, |c| {
        c.store().vector("board", "temperature").is_ok()
    })
    .await;
    let defines = drain(&mut client);
    assert!(defines.iter().all(|n| n.origin == Origin::Remote));
    assert!(defines.iter().any(|n| n.event_type == EventType::DefineBlob));

    let values: IndexMap<String, MemberInput> =
        [("member1".to_owned(), MemberInput::from("On"))].into_iter().collect();
    client.submit("board", "switches", &values).unwrap();
    client.request_blobs("board", None, BlobPolicy::Also);
    client.flush(&mut client_end).await;

    pump(&mut client, &mut client_end, |c| {
        c.store().vector("board", "switches").unwrap().on_count() == 1
    })
    .await;
    let sets = drain(&mut client);
    assert_eq!(sets.last().map(|n| n.event_type), Some(EventType::Set));

    cancel.cancel();
    let driver = driver_task.await.unwrap();
    assert_eq!(driver.store().vector("board", "switches").unwrap().on_count(), 1);

    assert!(matches!(
        client_end.recv().await,
        Err(CoreError::TransportLost { .. })
    ));
    client.transport_lost(&CoreError::TransportLost {
        reason: "driver stopped".into(),
    });
    assert!(!client.snapshot_notification().snapshot.connected);
}
