//! `patchbay flags`: inspect subscription masks.

use serde::Serialize;
use tabled::Tabled;

use patchbay_core::SubscriptionFlags;

use crate::cli::{FlagsArgs, FlagsCommand};
use crate::commands::Context;
use crate::error::CliError;
use crate::output;
use crate::scenario::parse_flags;

#[derive(Debug, Clone, Serialize, Tabled)]
struct FlagRow {
    name: &'static str,
    #[tabled(display_with = "hex")]
    value: u32,
}

#[allow(clippy::trivially_copy_pass_by_ref)]
fn hex(value: &u32) -> String {
    format!("0x{value:02X}")
}

/// A resolved mask, as printed by `decode` and `encode`.
#[derive(Debug, Clone, Serialize)]
struct Mask {
    value: u32,
    hex: String,
    flags: Vec<&'static str>,
}

impl From<SubscriptionFlags> for Mask {
    fn from(flags: SubscriptionFlags) -> Self {
        Self {
            value: flags.bits(),
            hex: hex(&flags.bits()),
            flags: flags.primitive_names(),
        }
    }
}

pub fn handle(args: FlagsArgs, ctx: &Context) -> Result<(), CliError> {
    match args.command {
        FlagsCommand::List => {
            let rows: Vec<FlagRow> = SubscriptionFlags::table()
                .into_iter()
                .map(|(name, flag)| FlagRow {
                    name,
                    value: flag.bits(),
                })
                .collect();
            let rendered = output::render_list(ctx.format, &rows, FlagRow::clone, |r| {
                format!("{} {}", r.name, hex(&r.value))
            });
            ctx.print(&rendered);
        }
        FlagsCommand::Decode { mask } => {
            let flags = decode(&mask)?;
            print_mask(ctx, flags);
        }
        FlagsCommand::Encode { names } => {
            let flags = parse_flags("names", &names.join("|"))?;
            print_mask(ctx, flags);
        }
    }
    Ok(())
}

/// Only numeric masks are decoded; bits outside the defined set are an
/// error rather than silently dropped.
fn decode(raw: &str) -> Result<SubscriptionFlags, CliError> {
    let trimmed = raw.trim();
    let value = match trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"))
    {
        Some(hex) => u32::from_str_radix(hex, 16),
        None => trimmed.parse(),
    }
    .map_err(|e| CliError::validation("mask", format!("'{raw}': {e}")))?;

    SubscriptionFlags::from_bits(value).ok_or_else(|| {
        CliError::validation(
            "mask",
            format!(
                "0x{value:X} sets bits outside 0x{:02X}",
                SubscriptionFlags::ALL.bits()
            ),
        )
    })
}

fn print_mask(ctx: &Context, flags: SubscriptionFlags) {
    let mask = Mask::from(flags);
    let rendered = output::render_single(
        ctx.format,
        &mask,
        |m| {
            let rows: Vec<FlagRow> = SubscriptionFlags::table()
                .into_iter()
                .filter(|(_, flag)| flag.bits().is_power_of_two() && flags.contains(*flag))
                .map(|(name, flag)| FlagRow {
                    name,
                    value: flag.bits(),
                })
                .collect();
            format!("{} ({})\n{}", m.hex, m.value, output::render_table(&rows))
        },
        flags_line,
    );
    ctx.print(&rendered);
}

fn flags_line(mask: &Mask) -> String {
    if mask.flags.is_empty() {
        return format!("{} NONE", mask.hex);
    }
    format!("{} {}", mask.hex, mask.flags.join("|"))
}
