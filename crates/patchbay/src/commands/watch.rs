//! `patchbay watch`: run a scenario and report every cache change.

use std::fmt::Write;

use tabled::Tabled;
use tracing::debug;

use crate::cli::WatchArgs;
use crate::commands::Context;
use crate::error::CliError;
use crate::output;
use crate::scenario::{self, Event, Report, Runner};

#[derive(Tabled)]
struct CountRow {
    kind: &'static str,
    cached: usize,
}

#[derive(Tabled)]
struct ScopeRow {
    device: String,
    scope: String,
}

pub fn handle(args: &WatchArgs, ctx: &Context) -> Result<(), CliError> {
    let scenario = scenario::load(&args.scenario)?;
    let mut config = ctx.config.to_monitor_config()?;

    // Flag > scenario > config file.
    if let Some(raw) = args
        .autosubscribe
        .as_deref()
        .or(scenario.autosubscribe.as_deref())
    {
        config.autosubscribe = scenario::parse_flags("autosubscribe", raw)?;
    }
    let settle = match args.settle.as_deref() {
        Some(raw) => scenario::parse_duration("settle", raw)?,
        None => config.poll_interval,
    };
    debug!(
        scenario = %args.scenario.display(),
        autosubscribe = %config.autosubscribe,
        ?settle,
        "starting watch"
    );

    let report = Runner::new(config, settle)?.run(&scenario)?;
    let color = ctx.color;
    let show_summary = !args.no_summary;
    let rendered = output::render_single(
        ctx.format,
        &report,
        |r| render_detail(r, show_summary),
        |r| render_plain(r, color),
    );
    ctx.print(&rendered);
    Ok(())
}

fn render_detail(report: &Report, show_summary: bool) -> String {
    let mut out = output::render_table(&report.events);
    if !show_summary {
        return out;
    }
    let c = &report.cache;
    let counts = [
        CountRow { kind: "devices", cached: c.devices },
        CountRow { kind: "ready devices", cached: c.ready },
        CountRow { kind: "signals", cached: c.signals },
        CountRow { kind: "outputs", cached: c.outputs },
        CountRow { kind: "inputs", cached: c.inputs },
        CountRow { kind: "links", cached: c.links },
        CountRow { kind: "connections", cached: c.connections },
        CountRow { kind: "waiting", cached: c.waiting },
    ];
    let _ = write!(out, "\n\n{}", output::render_table(&counts));

    if !c.subscriptions.is_empty() {
        let scopes: Vec<ScopeRow> = c
            .subscriptions
            .iter()
            .map(|(device, scope)| ScopeRow {
                device: device.clone(),
                scope: scope.clone(),
            })
            .collect();
        let _ = write!(out, "\n\n{}", output::render_table(&scopes));
    }
    out
}

fn render_plain(report: &Report, color: bool) -> String {
    report
        .events
        .iter()
        .map(|e| plain_line(e, color))
        .collect::<Vec<_>>()
        .join("\n")
}

fn plain_line(event: &Event, color: bool) -> String {
    format!(
        "{} {} {} {}",
        event.step,
        output::action_marker(event.action, color),
        event.kind,
        event.id
    )
}
