// ── Subscription scope table ──
//
// Per-device subscription flags plus the default applied to newly
// discovered devices. Decides whether an entity belongs in the cache.

use indexmap::IndexMap;

use patchbay_engine::{ConnectionId, Direction, LinkId, SignalId, SubscriptionFlags};

#[derive(Debug, Clone, Copy)]
struct Entry {
    flags: SubscriptionFlags,
    /// Took the default scope on discovery rather than an explicit
    /// subscribe; such entries end with the device.
    adopted: bool,
}

pub(crate) struct ScopeTable {
    devices: IndexMap<String, Entry>,
    autosubscribe: SubscriptionFlags,
}

impl ScopeTable {
    pub(crate) fn new(autosubscribe: SubscriptionFlags) -> Self {
        Self {
            devices: IndexMap::new(),
            autosubscribe,
        }
    }

    pub(crate) fn autosubscribe(&self) -> SubscriptionFlags {
        self.autosubscribe
    }

    /// Change the default scope. Devices already tracked keep theirs.
    pub(crate) fn set_autosubscribe(&mut self, flags: SubscriptionFlags) {
        self.autosubscribe = flags;
    }

    pub(crate) fn flags(&self, device: &str) -> SubscriptionFlags {
        self.devices
            .get(device)
            .map(|e| e.flags)
            .unwrap_or_default()
    }

    pub(crate) fn tracks(&self, device: &str) -> bool {
        self.devices.contains_key(device)
    }

    /// Set a device's scope explicitly; empty flags stop tracking it.
    /// Returns the previous flags.
    pub(crate) fn set(&mut self, device: &str, flags: SubscriptionFlags) -> SubscriptionFlags {
        let previous = if flags.is_empty() {
            self.devices.shift_remove(device)
        } else {
            self.devices.insert(
                device.to_owned(),
                Entry {
                    flags,
                    adopted: false,
                },
            )
        };
        previous.map(|e| e.flags).unwrap_or_default()
    }

    /// Start tracking an untracked device with the default scope. Returns
    /// `true` if the device was adopted.
    pub(crate) fn adopt(&mut self, device: &str) -> bool {
        if self.autosubscribe.is_empty() || self.tracks(device) {
            return false;
        }
        self.devices.insert(
            device.to_owned(),
            Entry {
                flags: self.autosubscribe,
                adopted: true,
            },
        );
        true
    }

    /// The device left the network. An adopted scope goes with it; an
    /// explicit subscription stays for when the device comes back.
    pub(crate) fn forget(&mut self, device: &str) -> bool {
        if self.devices.get(device).is_some_and(|e| e.adopted) {
            self.devices.shift_remove(device);
            return true;
        }
        false
    }

    pub(crate) fn entries(&self) -> impl Iterator<Item = (&str, SubscriptionFlags)> {
        self.devices.iter().map(|(k, e)| (k.as_str(), e.flags))
    }

    // ── Coverage rules ───────────────────────────────────────────────

    pub(crate) fn covers_device(&self, device: &str) -> bool {
        self.flags(device).contains(SubscriptionFlags::DEVICE)
    }

    pub(crate) fn covers_signal(&self, id: &SignalId, direction: Direction) -> bool {
        self.flags(&id.device).covers_signals(direction)
    }

    pub(crate) fn covers_link(&self, id: &LinkId) -> bool {
        self.flags(&id.source)
            .contains(SubscriptionFlags::DEVICE_LINKS_OUT)
            || self
                .flags(&id.dest)
                .contains(SubscriptionFlags::DEVICE_LINKS_IN)
    }

    pub(crate) fn covers_connection(&self, id: &ConnectionId) -> bool {
        self.flags(&id.source.device)
            .contains(SubscriptionFlags::DEVICE_CONNECTIONS_OUT)
            || self
                .flags(&id.dest.device)
                .contains(SubscriptionFlags::DEVICE_CONNECTIONS_IN)
    }

    pub(crate) fn clear(&mut self) {
        self.devices.clear();
    }
}
