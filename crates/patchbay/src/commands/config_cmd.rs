//! Config subcommand handlers.

use owo_colors::OwoColorize;

use patchbay_config::Config;

use crate::cli::{ConfigArgs, ConfigCommand};
use crate::commands::Context;
use crate::error::CliError;
use crate::output;

fn format_config(cfg: &Config) -> String {
    toml::to_string_pretty(cfg).unwrap_or_else(|e| format!("# unrenderable config: {e}"))
}

pub fn handle(args: ConfigArgs, ctx: &Context) -> Result<(), CliError> {
    match args.command {
        ConfigCommand::Init { force } => {
            let path = &ctx.config_path;
            if path.exists() && !force {
                return Err(CliError::ConfigExists {
                    path: path.display().to_string(),
                });
            }
            patchbay_config::save_config_to(&Config::default(), path)?;
            if !ctx.quiet {
                let mark = if ctx.color {
                    "✓".green().to_string()
                } else {
                    "✓".to_owned()
                };
                eprintln!("{mark} wrote {}", path.display());
            }
            Ok(())
        }

        ConfigCommand::Show => {
            // Fail loudly on values that would break `watch`.
            ctx.config.to_monitor_config()?;
            let path = ctx.config_path.display().to_string();
            let out = output::render_single(ctx.format, &ctx.config, format_config, |_| {
                path.clone()
            });
            ctx.print(&out);
            Ok(())
        }

        ConfigCommand::Path => {
            ctx.print(&ctx.config_path.display().to_string());
            Ok(())
        }
    }
}
