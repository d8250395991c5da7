//! Config subcommand handlers.

use crate::cli::{ConfigArgs, ConfigCommand, GlobalOpts};
use crate::commands::load_config;
use crate::error::CliError;
use crate::output;

pub fn handle(args: &ConfigArgs, global: &GlobalOpts) -> Result<(), CliError> {
    match args.command {
        ConfigCommand::Path => {
            let path = global
                .config
                .clone()
                .unwrap_or_else(indisync_config::config_path);
            output::print_output(&path.display().to_string(), global.quiet);
            Ok(())
        }
        ConfigCommand::Show => {
            let cfg = load_config(global)?;
            // Surface translation errors even though only the TOML is printed.
            cfg.session_config()?;
            cfg.bridge_config()?;
            output::print_output(&indisync_config::to_toml(&cfg)?, global.quiet);
            Ok(())
        }
    }
}
