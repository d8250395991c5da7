#![allow(clippy::unwrap_used)]

use std::time::Duration;

use indisync_bridge::EventQueuePolicy;
use indisync_config::{Config, ConfigError, load_config, load_devices, save_config};
use indisync_core::{BlobPolicy, SwitchState};
use pretty_assertions::assert_eq;

#[test]
fn file_values_override_defaults() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.toml");
    std::fs::write(
        &path,
        r#"
devices = "/etc/indisync/devices.toml"

[session]
name = "observatory"
snoop_timeout_secs = 2.5

[bridge]
event_queue = "latest"
blob_policy = "Also"
"#,
    )
    .unwrap();

    let cfg = load_config(Some(&path)).unwrap();
    assert_eq!(cfg.session.name, "observatory");
    assert_eq!(cfg.bridge.command_capacity, 16);

    let session = cfg.session_config().unwrap();
    assert_eq!(session.default_snoop_timeout, Some(Duration::from_millis(2500)));

    let bridge = cfg.bridge_config().unwrap();
    assert_eq!(bridge.event_queue, EventQueuePolicy::Latest);
    assert_eq!(bridge.default_blob_policy, BlobPolicy::Also);
}

#[test]
fn missing_file_yields_defaults() {
    let dir = tempfile::tempdir().unwrap();
    let cfg = load_config(Some(&dir.path().join("absent.toml"))).unwrap();
    assert_eq!(cfg, Config::default());
}

#[test]
fn bad_types_surface_as_figment_errors() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.toml");
    std::fs::write(&path, "[bridge]\nbackoff_ms = \"soon\"\n").unwrap();
    assert!(matches!(load_config(Some(&path)), Err(ConfigError::Figment(_))));
}

#[test]
fn saved_config_loads_back() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nested").join("config.toml");
    let mut cfg = Config::default();
    cfg.bridge.event_capacity = 1;
    cfg.session.message_capacity = 3;

    save_config(&cfg, &path).unwrap();
    assert_eq!(load_config(Some(&path)).unwrap(), cfg);
}

#[test]
fn device_file_loads_from_disk() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("devices.toml");
    std::fs::write(
        &path,
        r#"
[[device]]
name = "dome"
enable = false

[[device.vector]]
name = "shutter"
kind = "switch"
rule = "AtMostOne"

[[device.vector.member]]
name = "open"

[[device.vector.member]]
name = "close"
value = "On"

[[device.vector]]
name = "status"
kind = "light"

[[device.vector.member]]
name = "motor"
value = "Busy"
"#,
    )
    .unwrap();

    let devices = load_devices(&path).unwrap();
    let dome = &devices[0];
    assert!(!dome.enable);
    let shutter = dome.vector("shutter").unwrap();
    assert_eq!(shutter.device, "dome");
    assert_eq!(
        shutter.member("close").unwrap().switch_state(),
        Some(SwitchState::On)
    );
    assert!(!dome.vector("status").unwrap().perm().is_writable());
}

#[test]
fn unreadable_device_file_is_io_error() {
    let dir = tempfile::tempdir().unwrap();
    assert!(matches!(
        load_devices(&dir.path().join("none.toml")),
        Err(ConfigError::Io(_))
    ));
}
