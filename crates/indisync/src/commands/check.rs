//! `check`: validate a device definition file.

use serde::Serialize;
use tabled::Tabled;

use indisync_core::{Device, Vector, VectorKind};

use crate::cli::{CheckArgs, GlobalOpts};
use crate::commands::{devices_path, load_config, member_display};
use crate::error::CliError;
use crate::output;

#[derive(Debug, Serialize)]
struct VectorSummary {
    device: String,
    vector: String,
    kind: VectorKind,
    perm: String,
    enabled: bool,
    members: Vec<(String, String)>,
}

#[derive(Tabled)]
struct VectorRow {
    #[tabled(rename = "Device")]
    device: String,
    #[tabled(rename = "Vector")]
    vector: String,
    #[tabled(rename = "Kind")]
    kind: String,
    #[tabled(rename = "Perm")]
    perm: String,
    #[tabled(rename = "Enabled")]
    enabled: String,
    #[tabled(rename = "Members")]
    members: String,
}

fn kind_label(kind: VectorKind) -> String {
    match kind {
        VectorKind::Switch(rule) => format!("switch ({rule})"),
        VectorKind::Text => "text".into(),
        VectorKind::Number => "number".into(),
        VectorKind::Light => "light".into(),
        VectorKind::Blob => "blob".into(),
    }
}

fn summarize(device: &Device, vector: &Vector) -> VectorSummary {
    VectorSummary {
        device: device.name.clone(),
        vector: vector.name.clone(),
        kind: vector.kind(),
        perm: vector.perm().to_string(),
        enabled: device.enable && vector.enable,
        members: vector
            .members()
            .map(|m| (m.name.clone(), member_display(m)))
            .collect(),
    }
}

pub fn handle(args: &CheckArgs, global: &GlobalOpts) -> Result<(), CliError> {
    let cfg = load_config(global)?;
    let path = devices_path(args.file.as_deref(), &cfg).ok_or_else(|| CliError::NoDevices {
        config_path: indisync_config::config_path().display().to_string(),
    })?;

    let devices = indisync_config::load_devices(&path)?;
    let summaries: Vec<VectorSummary> = devices
        .iter()
        .flat_map(|d| d.vectors().map(move |v| summarize(d, v)))
        .collect();
    tracing::info!(
        path = %path.display(),
        devices = devices.len(),
        vectors = summaries.len(),
        "device definitions valid"
    );

    let color = output::should_color(global.color);
    let rendered = output::render_list(
        global.output,
        &summaries,
        |s| VectorRow {
            device: s.device.clone(),
            vector: s.vector.clone(),
            kind: kind_label(s.kind),
            perm: s.perm.clone(),
            enabled: output::status(s.enabled, if s.enabled { "yes" } else { "no" }, color),
            members: s
                .members
                .iter()
                .map(|(name, value)| format!("{name}={value}"))
                .collect::<Vec<_>>()
                .join(", "),
        },
        |s| format!("{}.{}", s.device, s.vector),
    )?;
    output::print_output(&rendered, global.quiet);
    Ok(())
}
