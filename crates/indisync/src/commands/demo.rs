//! `demo`: a driver and a client session joined by an in-memory transport.
//!
//! The driver runs `Session::run` on its own thread. The client runs behind
//! a `QueueClient`, and everything its event queue yields is printed.

use std::path::Path;
use std::thread::JoinHandle;
use std::time::Duration;

use serde::Serialize;
use tabled::Tabled;
use tokio_util::sync::CancellationToken;

use indisync_bridge::{BridgeConfig, BridgeState, QueueClient};
use indisync_core::session::transport::DEFAULT_MEMORY_CAPACITY;
use indisync_core::{
    CoreError, EventType, MemberInput, MemoryTransport, Notification, Origin, PropertyState,
    Session, SessionConfig,
};

use crate::cli::{DemoArgs, GlobalOpts};
use crate::commands::{devices_path, load_config, member_display};
use crate::error::CliError;
use crate::output;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(2);

/// Devices served when no definition file is given.
const DEMO_DEVICES: &str = r#"
[[device]]
name = "board"

[[device.vector]]
name = "switches"
kind = "switch"
rule = "AnyOfMany"
label = "Relays"

[[device.vector.member]]
name = "relay0"
[[device.vector.member]]
name = "relay1"
[[device.vector.member]]
name = "relay2"

[[device.vector]]
name = "mode"
kind = "switch"
rule = "OneOfMany"

[[device.vector.member]]
name = "manual"
value = "On"
[[device.vector.member]]
name = "auto"

[[device.vector]]
name = "temperature"
kind = "number"
perm = "rw"

[[device.vector.member]]
name = "celsius"
value = 20.0
format = "%5.1f"
min = -40.0
max = 80.0

[[device.vector]]
name = "status"
kind = "light"

[[device.vector.member]]
name = "power"
value = "Ok"

[[device.vector]]
name = "data"
kind = "blob"

[[device.vector.member]]
name = "file"
"#;

// ── Event records ────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
struct EventRecord {
    event: EventType,
    origin: Origin,
    device: Option<String>,
    vector: Option<String>,
    timestamp: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    state: Option<PropertyState>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    members: Vec<(String, String)>,
    #[serde(skip_serializing_if = "Option::is_none")]
    snapshot: Option<serde_json::Value>,
}

impl From<&Notification> for EventRecord {
    fn from(n: &Notification) -> Self {
        let vector = n.vector_snapshot();
        Self {
            event: n.event_type,
            origin: n.origin,
            device: n.device.clone(),
            vector: n.vector.clone(),
            timestamp: n.timestamp.map(|t| t.to_rfc3339()),
            message: n.message.clone(),
            state: vector.map(|v| v.state),
            members: vector
                .map(|v| {
                    v.members()
                        .map(|m| (m.name.clone(), member_display(m)))
                        .collect()
                })
                .unwrap_or_default(),
            snapshot: (n.event_type == EventType::Snapshot).then(|| n.snapshot.to_json()),
        }
    }
}

#[derive(Tabled)]
struct EventRow {
    #[tabled(rename = "Event")]
    event: String,
    #[tabled(rename = "Origin")]
    origin: String,
    #[tabled(rename = "Device")]
    device: String,
    #[tabled(rename = "Vector")]
    vector: String,
    #[tabled(rename = "State")]
    state: String,
    #[tabled(rename = "Values")]
    values: String,
}

fn to_row(r: &EventRecord) -> EventRow {
    let values = match &r.snapshot {
        Some(json) => format!(
            "{} devices",
            json["devices"].as_object().map_or(0, serde_json::Map::len)
        ),
        None => r
            .members
            .iter()
            .map(|(name, value)| format!("{name}={value}"))
            .collect::<Vec<_>>()
            .join(", "),
    };
    EventRow {
        event: r.event.to_string(),
        origin: r.origin.to_string(),
        device: r.device.clone().unwrap_or_default(),
        vector: r.vector.clone().unwrap_or_default(),
        state: r.state.map(|s| s.to_string()).unwrap_or_default(),
        values,
    }
}

fn to_line(r: &EventRecord) -> String {
    let target = match (&r.device, &r.vector) {
        (Some(d), Some(v)) => format!("{d}.{v}"),
        (Some(d), None) => d.clone(),
        _ => "*".into(),
    };
    format!("{} {} {target}", r.event, r.origin)
}

// ── Assignments ──────────────────────────────────────────────────────

/// One `submit` per (device, vector), members in command-line order.
#[derive(Debug, PartialEq)]
struct Submission {
    device: String,
    vector: String,
    values: Vec<(String, MemberInput)>,
}

fn parse_assignments(raw: &[String]) -> Result<Vec<Submission>, CliError> {
    let mut submissions: Vec<Submission> = Vec::new();
    for assignment in raw {
        let invalid = |reason: &str| CliError::Validation {
            field: format!("--set {assignment}"),
            reason: reason.to_owned(),
        };
        let (target, value) = assignment
            .split_once('=')
            .ok_or_else(|| invalid("expected DEVICE.VECTOR.MEMBER=VALUE"))?;
        let mut parts = target.splitn(3, '.');
        let (Some(device), Some(vector), Some(member)) = (parts.next(), parts.next(), parts.next())
        else {
            return Err(invalid("expected DEVICE.VECTOR.MEMBER before '='"));
        };
        if device.is_empty() || vector.is_empty() || member.is_empty() {
            return Err(invalid("device, vector and member names must not be empty"));
        }

        let input = match value.strip_prefix('@') {
            Some(path) => read_blob(Path::new(path))?,
            None => MemberInput::from(value),
        };

        match submissions
            .iter_mut()
            .find(|s| s.device == device && s.vector == vector)
        {
            Some(existing) => existing.values.push((member.to_owned(), input)),
            None => submissions.push(Submission {
                device: device.to_owned(),
                vector: vector.to_owned(),
                values: vec![(member.to_owned(), input)],
            }),
        }
    }
    Ok(submissions)
}

/// `@path` values become BLOB inputs tagged with the file's extension.
fn read_blob(path: &Path) -> Result<MemberInput, CliError> {
    let data = std::fs::read(path)?;
    let format = path
        .extension()
        .map(|ext| format!(".{}", ext.to_string_lossy()))
        .unwrap_or_default();
    Ok(MemberInput::blob(data, format))
}

// ── Driver ───────────────────────────────────────────────────────────

fn spawn_driver(
    mut session: Session,
    transport: MemoryTransport,
    cancel: CancellationToken,
) -> Result<JoinHandle<Result<(), CoreError>>, CliError> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_time()
        .build()?;
    let handle = std::thread::Builder::new()
        .name("indisync-driver".into())
        .spawn(move || runtime.block_on(session.run(transport, cancel)))?;
    Ok(handle)
}

// ── Client ───────────────────────────────────────────────────────────

/// Everything the queue yields until it has been silent for `settle`.
fn collect_until_quiet(client: &mut QueueClient, settle: Duration, into: &mut Vec<EventRecord>) {
    while let Some(notification) = client.recv_timeout(settle) {
        tracing::debug!(
            event = %notification.event_type,
            device = ?notification.device,
            vector = ?notification.vector,
            "client event"
        );
        into.push(EventRecord::from(&notification));
    }
}

fn run_client(
    transport: MemoryTransport,
    session: SessionConfig,
    bridge: BridgeConfig,
    args: &DemoArgs,
    devices: &[String],
    submissions: Vec<Submission>,
) -> Result<Vec<EventRecord>, CliError> {
    let settle = Duration::from_millis(args.settle_ms.max(1));
    let mut client = QueueClient::spawn(Session::builder(session), transport, bridge)?;
    if !client.wait_for(BridgeState::Connected, CONNECT_TIMEOUT) {
        return Err(CliError::Timeout {
            what: "the client to connect".into(),
            millis: u64::try_from(CONNECT_TIMEOUT.as_millis()).unwrap_or(u64::MAX),
        });
    }

    if let Some(policy) = args.blobs {
        for device in devices {
            client.set_blob_policy(device, None, policy)?;
        }
    }

    let mut records = Vec::new();
    collect_until_quiet(&mut client, settle, &mut records);

    if !submissions.is_empty() {
        for Submission {
            device,
            vector,
            values,
        } in submissions
        {
            client.submit(&device, &vector, values)?;
        }
        collect_until_quiet(&mut client, settle, &mut records);
    }

    if args.snapshot {
        client.request_snapshot()?;
        collect_until_quiet(&mut client, settle, &mut records);
    }

    client.join()?;
    Ok(records)
}

// ── Handler ──────────────────────────────────────────────────────────

pub fn handle(args: &DemoArgs, global: &GlobalOpts) -> Result<(), CliError> {
    let cfg = load_config(global)?;
    let devices = match devices_path(args.file.as_deref(), &cfg) {
        Some(path) => indisync_config::load_devices(&path)?,
        None => indisync_config::parse_devices(DEMO_DEVICES)?,
    };
    let submissions = parse_assignments(&args.set)?;
    let session = cfg.session_config()?;
    let mut bridge = cfg.bridge_config()?;
    if let Some(policy) = args.blobs {
        bridge.default_blob_policy = policy;
    }

    let names: Vec<String> = devices.iter().map(|d| d.name.clone()).collect();
    let driver = Session::builder(SessionConfig {
        name: format!("{}-driver", session.name),
        ..session.clone()
    })
    .devices(devices)
    .build()?;

    let (driver_end, client_end) = MemoryTransport::pair(DEFAULT_MEMORY_CAPACITY);
    let cancel = CancellationToken::new();
    let driver_thread = spawn_driver(driver, driver_end, cancel.clone())?;
    tracing::info!(devices = names.len(), "driver started");

    let client_config = SessionConfig {
        name: format!("{}-client", session.name),
        ..session
    };
    let records = run_client(client_end, client_config, bridge, args, &names, submissions);

    cancel.cancel();
    match driver_thread.join() {
        Ok(Ok(())) => {}
        Ok(Err(e)) => {
            return Err(CliError::Driver {
                reason: e.to_string(),
            });
        }
        Err(_) => {
            return Err(CliError::Driver {
                reason: "thread panicked".into(),
            });
        }
    }
    let records = records?;

    let rendered = output::render_list(global.output, &records, to_row, to_line)?;
    output::print_output(&rendered, global.quiet);
    Ok(())
}
