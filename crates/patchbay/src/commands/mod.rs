//! Command dispatch and the context every handler shares.

pub mod config_cmd;
pub mod flags;
pub mod watch;

use std::path::PathBuf;

use clap::ValueEnum;

use patchbay_config::Config;

use crate::cli::{ColorMode, Command, GlobalOpts, OutputFormat};
use crate::error::CliError;
use crate::output;

/// Global flags resolved against the config file.
pub struct Context {
    pub format: OutputFormat,
    pub color: bool,
    pub quiet: bool,
    pub config: Config,
    pub config_path: PathBuf,
}

impl Context {
    /// Flags win over the config file; the config file wins over defaults.
    pub fn resolve(global: &GlobalOpts) -> Result<Self, CliError> {
        let config_path = global
            .config
            .clone()
            .unwrap_or_else(patchbay_config::config_path);
        let config = patchbay_config::load_config_from(&config_path)?;

        let format = match global.output {
            Some(format) => format,
            None => OutputFormat::from_str(&config.defaults.output, true)
                .map_err(|reason| CliError::validation("defaults.output", reason))?,
        };
        let color_mode = match global.color {
            Some(mode) => mode,
            None => ColorMode::from_str(&config.defaults.color, true)
                .map_err(|reason| CliError::validation("defaults.color", reason))?,
        };

        Ok(Self {
            format,
            color: output::should_color(color_mode),
            quiet: global.quiet,
            config,
            config_path,
        })
    }

    pub fn print(&self, rendered: &str) {
        output::print_output(rendered, self.quiet);
    }
}

pub fn dispatch(cmd: Command, ctx: &Context) -> Result<(), CliError> {
    match cmd {
        Command::Watch(args) => watch::handle(&args, ctx),
        Command::Flags(args) => flags::handle(args, ctx),
        Command::Config(args) => config_cmd::handle(args, ctx),
        // Handled before a context exists.
        Command::Completions(_) => Ok(()),
    }
}
