//! Scenario files for `patchbay watch`.
//!
//! A scenario declares devices to put on an in-process network and a list
//! of steps to run against it. Every step is followed by a settle phase
//! that polls the monitor until the network goes quiet, so each cache
//! change is attributed to the step that caused it.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use indexmap::IndexMap;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tabled::Tabled;
use tracing::{debug, info};

use patchbay_core::{
    Action, ConnectionMode, ConnectionProps, Direction, EntityKind, LinkProps, Monitor,
    MonitorConfig, SignalType, SubscriptionFlags, handler,
};
use patchbay_engine::{LocalDevice, LocalEngine, LocalNetwork, PropertyValue, SignalSpec};

use crate::error::CliError;

// ── File format ──────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Scenario {
    /// Default scope for the watching monitor; overrides the config file.
    pub autosubscribe: Option<String>,

    #[serde(default)]
    pub devices: Vec<DeviceDecl>,

    #[serde(default)]
    pub steps: Vec<Step>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DeviceDecl {
    /// Name prefix; the network appends `.N`.
    pub prefix: String,
    #[serde(default)]
    pub inputs: Vec<SignalDecl>,
    #[serde(default)]
    pub outputs: Vec<SignalDecl>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SignalDecl {
    pub name: String,
    #[serde(rename = "type", default = "default_signal_type")]
    pub data_type: SignalType,
    pub length: Option<u32>,
    pub unit: Option<String>,
    pub min: Option<f64>,
    pub max: Option<f64>,
}

fn default_signal_type() -> SignalType {
    SignalType::Float
}

impl SignalDecl {
    fn to_spec(&self) -> SignalSpec {
        let mut spec = SignalSpec::new(&self.name, self.data_type);
        if let Some(length) = self.length {
            spec = spec.length(length);
        }
        if let Some(ref unit) = self.unit {
            spec = spec.unit(unit);
        }
        if let (Some(min), Some(max)) = (self.min, self.max) {
            spec = spec.range(min, max);
        }
        spec
    }
}

/// One scenario step, selected by its `action` key.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case", deny_unknown_fields)]
pub enum Step {
    Subscribe {
        device: String,
        #[serde(default = "default_step_flags")]
        flags: String,
        /// Subscription lease, e.g. "5s".
        timeout: Option<String>,
    },
    Unsubscribe {
        device: String,
    },
    Autosubscribe {
        flags: String,
    },
    Link {
        source: String,
        dest: String,
    },
    Unlink {
        source: String,
        dest: String,
    },
    Connect {
        source: String,
        dest: String,
        mode: Option<ConnectionMode>,
        expression: Option<String>,
        muted: Option<bool>,
    },
    Modify {
        source: String,
        dest: String,
        mode: Option<ConnectionMode>,
        expression: Option<String>,
        muted: Option<bool>,
    },
    Disconnect {
        source: String,
        dest: String,
    },
    AddDevice(DeviceDecl),
    RemoveDevice {
        device: String,
    },
    AddSignal {
        device: String,
        direction: Direction,
        signal: SignalDecl,
    },
    RemoveSignal {
        device: String,
        direction: Direction,
        name: String,
    },
    SetProperty {
        device: String,
        key: String,
        value: PropertyValue,
    },
    /// Keep polling for a fixed time, e.g. "200ms".
    Wait {
        duration: String,
    },
}

fn default_step_flags() -> String {
    "all".into()
}

impl Step {
    fn name(&self) -> &'static str {
        match self {
            Self::Subscribe { .. } => "subscribe",
            Self::Unsubscribe { .. } => "unsubscribe",
            Self::Autosubscribe { .. } => "autosubscribe",
            Self::Link { .. } => "link",
            Self::Unlink { .. } => "unlink",
            Self::Connect { .. } => "connect",
            Self::Modify { .. } => "modify",
            Self::Disconnect { .. } => "disconnect",
            Self::AddDevice(_) => "add_device",
            Self::RemoveDevice { .. } => "remove_device",
            Self::AddSignal { .. } => "add_signal",
            Self::RemoveSignal { .. } => "remove_signal",
            Self::SetProperty { .. } => "set_property",
            Self::Wait { .. } => "wait",
        }
    }
}

fn connection_props(
    mode: Option<ConnectionMode>,
    expression: Option<&String>,
    muted: Option<bool>,
) -> ConnectionProps {
    ConnectionProps {
        mode,
        expression: expression.cloned(),
        muted,
        ..ConnectionProps::default()
    }
}

pub fn load(path: &Path) -> Result<Scenario, CliError> {
    let scenario_err = |source: Box<dyn std::error::Error + Send + Sync>| CliError::Scenario {
        path: path.display().to_string(),
        source,
    };
    let text = std::fs::read_to_string(path).map_err(|e| scenario_err(e.into()))?;
    toml::from_str(&text).map_err(|e| scenario_err(e.into()))
}

pub fn parse_flags(field: &str, raw: &str) -> Result<SubscriptionFlags, CliError> {
    raw.parse()
        .map_err(|e| CliError::validation(field, format!("{e}")))
}

pub fn parse_duration(field: &str, raw: &str) -> Result<Duration, CliError> {
    humantime::parse_duration(raw.trim())
        .map_err(|e| CliError::validation(field, format!("'{raw}': {e}")))
}

// ── Report ───────────────────────────────────────────────────────────

/// A cache change attributed to the step that caused it. Step 0 is the
/// initial device setup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Tabled)]
pub struct Event {
    pub step: usize,
    pub kind: EntityKind,
    pub action: Action,
    pub id: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct CacheSummary {
    pub devices: usize,
    /// Cached devices reporting the ready state.
    pub ready: usize,
    pub signals: usize,
    pub outputs: usize,
    pub inputs: usize,
    pub links: usize,
    pub connections: usize,
    pub waiting: usize,
    pub subscriptions: IndexMap<String, String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Report {
    pub events: Vec<Event>,
    pub cache: CacheSummary,
}

#[derive(Default)]
struct Journal {
    step: usize,
    events: Vec<Event>,
}

impl Journal {
    fn record(&mut self, kind: EntityKind, action: Action, id: String) {
        self.events.push(Event {
            step: self.step,
            kind,
            action,
            id,
        });
    }
}

// ── Runner ───────────────────────────────────────────────────────────

/// Drives a scenario: owns the network, the local device handles and the
/// monitor watching them.
pub struct Runner {
    network: LocalNetwork,
    devices: IndexMap<String, LocalDevice>,
    monitor: Monitor<LocalEngine>,
    journal: Arc<Mutex<Journal>>,
    settle: Duration,
}

impl Runner {
    pub fn new(config: MonitorConfig, settle: Duration) -> Result<Self, CliError> {
        let network = LocalNetwork::new();
        let mut monitor = Monitor::from_config(network.engine(), config)?;
        let journal = Arc::new(Mutex::new(Journal::default()));

        let db = monitor.db_mut();
        let j = Arc::clone(&journal);
        db.add_device_listener(handler(move |d: &patchbay_core::Device, action| {
            j.lock().record(EntityKind::Device, action, d.name.clone());
        }))?;
        let j = Arc::clone(&journal);
        db.add_signal_listener(handler(move |s: &patchbay_core::Signal, action| {
            j.lock().record(EntityKind::Signal, action, s.id.to_string());
        }))?;
        let j = Arc::clone(&journal);
        db.add_link_listener(handler(move |l: &patchbay_core::Link, action| {
            j.lock().record(EntityKind::Link, action, l.id.to_string());
        }))?;
        let j = Arc::clone(&journal);
        db.add_connection_listener(handler(move |c: &patchbay_core::Connection, action| {
            j.lock()
                .record(EntityKind::Connection, action, c.id.to_string());
        }))?;

        Ok(Self {
            network,
            devices: IndexMap::new(),
            monitor,
            journal,
            settle,
        })
    }

    /// Run setup and every step, then summarize the cache.
    pub fn run(mut self, scenario: &Scenario) -> Result<Report, CliError> {
        for decl in &scenario.devices {
            self.add_device(decl)?;
        }
        self.settle()?;

        for (index, step) in scenario.steps.iter().enumerate() {
            self.journal.lock().step = index + 1;
            info!(step = index + 1, action = step.name(), "running step");
            self.apply(step)?;
            self.settle()?;
        }

        let cache = self.summary();
        let events = std::mem::take(&mut self.journal.lock().events);
        Ok(Report { events, cache })
    }

    fn add_device(&mut self, decl: &DeviceDecl) -> Result<(), CliError> {
        let device = self.network.add_device(&decl.prefix);
        let name = device.name().to_owned();
        for (direction, signals) in [
            (Direction::Input, &decl.inputs),
            (Direction::Output, &decl.outputs),
        ] {
            for signal in signals {
                let added = match direction {
                    Direction::Input => device.add_input(signal.to_spec()),
                    Direction::Output => device.add_output(signal.to_spec()),
                };
                if added.is_none() {
                    return Err(CliError::Conflict {
                        resource_type: format!("{direction} signal"),
                        identifier: format!("{name}/{}", signal.name),
                    });
                }
            }
        }
        debug!(device = %name, "scenario device added");
        self.devices.insert(name, device);
        Ok(())
    }

    fn local(&self, name: &str) -> Result<&LocalDevice, CliError> {
        self.devices.get(name).ok_or_else(|| CliError::NotFound {
            resource_type: "device".into(),
            identifier: name.to_owned(),
        })
    }

    fn apply(&mut self, step: &Step) -> Result<(), CliError> {
        let lease = self.monitor.config().subscribe_timeout;
        match step {
            Step::Subscribe {
                device,
                flags,
                timeout,
            } => {
                let flags = parse_flags("flags", flags)?;
                let timeout = match timeout {
                    Some(raw) => parse_duration("timeout", raw)?,
                    None => lease,
                };
                self.monitor.subscribe(device, flags, timeout)?;
            }
            Step::Unsubscribe { device } => self.monitor.unsubscribe(device)?,
            Step::Autosubscribe { flags } => {
                let flags = parse_flags("flags", flags)?;
                self.monitor.autosubscribe(flags)?;
            }
            Step::Link { source, dest } => {
                self.monitor.link(source, dest, LinkProps::default())?;
            }
            Step::Unlink { source, dest } => self.monitor.unlink(source, dest)?,
            Step::Connect {
                source,
                dest,
                mode,
                expression,
                muted,
            } => {
                let props = connection_props(*mode, expression.as_ref(), *muted);
                self.monitor.connect(source, dest, props)?;
            }
            Step::Modify {
                source,
                dest,
                mode,
                expression,
                muted,
            } => {
                let props = connection_props(*mode, expression.as_ref(), *muted);
                self.monitor.connection_modify(source, dest, props)?;
            }
            Step::Disconnect { source, dest } => self.monitor.disconnect(source, dest)?,
            Step::AddDevice(decl) => self.add_device(decl)?,
            Step::RemoveDevice { device } => {
                self.local(device)?;
                // Dropping the handle takes the device off the network.
                self.devices.shift_remove(device.as_str());
            }
            Step::AddSignal {
                device,
                direction,
                signal,
            } => {
                let local = self.local(device)?;
                let added = match direction {
                    Direction::Input => local.add_input(signal.to_spec()),
                    Direction::Output => local.add_output(signal.to_spec()),
                };
                if added.is_none() {
                    return Err(CliError::Conflict {
                        resource_type: format!("{direction} signal"),
                        identifier: format!("{device}/{}", signal.name),
                    });
                }
            }
            Step::RemoveSignal {
                device,
                direction,
                name,
            } => {
                let local = self.local(device)?;
                let removed = match direction {
                    Direction::Input => local.remove_input(name),
                    Direction::Output => local.remove_output(name),
                };
                if !removed {
                    return Err(CliError::NotFound {
                        resource_type: format!("{direction} signal"),
                        identifier: format!("{device}/{name}"),
                    });
                }
            }
            Step::SetProperty { device, key, value } => {
                self.local(device)?.set_property(key, value.clone());
            }
            Step::Wait { duration } => {
                let duration = parse_duration("duration", duration)?;
                self.monitor.poll_until(duration, |_| false)?;
            }
        }
        Ok(())
    }

    /// Poll until one full settle window passes without an update.
    fn settle(&mut self) -> Result<(), CliError> {
        loop {
            if self.monitor.poll(self.settle)? == 0 {
                return Ok(());
            }
        }
    }

    fn summary(&self) -> CacheSummary {
        let db = self.monitor.db();
        let signals = db.signals();
        let outputs = signals.iter().filter(|s| s.is_output()).count();
        CacheSummary {
            devices: db.device_count(),
            ready: db.devices().iter().filter(|d| d.is_ready()).count(),
            signals: signals.len(),
            outputs,
            inputs: signals.len() - outputs,
            links: db.link_count(),
            connections: db.connection_count(),
            waiting: db.waiting_count(),
            subscriptions: db
                .subscriptions()
                .into_iter()
                .map(|(device, flags)| (device, flags.to_string()))
                .collect(),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    const PATCH: &str = r#"
autosubscribe = "all"

[[devices]]
prefix = "synth"
outputs = [{ name = "freq", unit = "Hz", min = 20.0, max = 20000.0 }]

[[devices]]
prefix = "filter"
inputs = [{ name = "cutoff" }]

[[steps]]
action = "connect"
source = "synth.1/freq"
dest = "filter.1/cutoff"

[[steps]]
action = "modify"
source = "synth.1/freq"
dest = "filter.1/cutoff"
mode = "expression"
expression = "y=x*2"

[[steps]]
action = "remove_device"
device = "filter.1"
"#;

    fn run(text: &str) -> Report {
        let scenario: Scenario = toml::from_str(text).unwrap();
        let config = MonitorConfig {
            autosubscribe: parse_flags("autosubscribe", scenario.autosubscribe.as_deref().unwrap())
                .unwrap(),
            ..MonitorConfig::default()
        };
        Runner::new(config, Duration::from_millis(20))
            .unwrap()
            .run(&scenario)
            .unwrap()
    }

    fn lines(report: &Report, step: usize) -> Vec<String> {
        report
            .events
            .iter()
            .filter(|e| e.step == step)
            .map(|e| format!("{} {} {}", e.kind, e.id, e.action))
            .collect()
    }

    #[test]
    fn steps_own_the_changes_they_cause() {
        let report = run(PATCH);

        let setup = lines(&report, 0);
        assert!(setup.contains(&"device synth.1 new".to_owned()), "{setup:?}");
        assert!(setup.contains(&"signal filter.1/cutoff new".to_owned()), "{setup:?}");

        assert_eq!(
            lines(&report, 1),
            vec![
                "link synth.1 -> filter.1 new".to_owned(),
                "connection synth.1/freq -> filter.1/cutoff new".to_owned(),
            ]
        );
        assert_eq!(
            lines(&report, 2),
            vec!["connection synth.1/freq -> filter.1/cutoff modified".to_owned()]
        );

        let removal = lines(&report, 3);
        assert_eq!(
            removal.first().map(String::as_str),
            Some("connection synth.1/freq -> filter.1/cutoff removed")
        );
        assert_eq!(
            removal.last().map(String::as_str),
            Some("device filter.1 removed")
        );

        assert_eq!(report.cache.devices, 1);
        assert_eq!(report.cache.ready, 1);
        assert_eq!(report.cache.outputs, 1);
        assert_eq!(report.cache.inputs, 0);
        assert_eq!(report.cache.connections, 0);
    }

    #[test]
    fn unknown_devices_in_local_steps_are_reported() {
        let scenario: Scenario = toml::from_str(
            "[[steps]]\naction = \"set_property\"\ndevice = \"ghost.1\"\nkey = \"k\"\nvalue = 1\n",
        )
        .unwrap();
        let err = Runner::new(MonitorConfig::default(), Duration::from_millis(5))
            .unwrap()
            .run(&scenario)
            .unwrap_err();
        assert!(matches!(err, CliError::NotFound { .. }), "{err}");
    }

    #[test]
    fn unknown_actions_are_rejected() {
        let parsed = toml::from_str::<Scenario>("[[steps]]\naction = \"explode\"\n");
        assert!(parsed.is_err());
    }
}
