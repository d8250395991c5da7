//! Command handlers.

pub mod check;
pub mod config_cmd;
pub mod demo;

use std::path::{Path, PathBuf};

use indisync_config::Config;
use indisync_core::{Member, MemberValue};

use crate::cli::GlobalOpts;
use crate::error::CliError;

/// The device file from the command line, else the one named in config.
pub fn devices_path(explicit: Option<&Path>, cfg: &Config) -> Option<PathBuf> {
    explicit
        .map(Path::to_path_buf)
        .or_else(|| cfg.devices.clone())
}

pub fn load_config(global: &GlobalOpts) -> Result<Config, CliError> {
    Ok(indisync_config::load_config(global.config.as_deref())?)
}

/// Human-readable member value for tables and plain output.
pub fn member_display(member: &Member) -> String {
    match member.value() {
        MemberValue::Switch(state) => state.to_string(),
        MemberValue::Text(text) => text.clone(),
        MemberValue::Number(number) => number.value.clone(),
        MemberValue::Light(state) => state.to_string(),
        MemberValue::Blob(blob) if blob.size == 0 => "-".into(),
        MemberValue::Blob(blob) => format!("<{} bytes {}>", blob.size, blob.format),
    }
}
