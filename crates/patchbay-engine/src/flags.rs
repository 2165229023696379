// ── Subscription scope bitmask ──
//
// Which parts of a remote device are mirrored into a monitor's cache.
// Composed masks are defined as the OR of their components so the two
// can never drift apart.

use std::fmt;
use std::str::FromStr;

use bitflags::{Flags, bitflags};
use serde::{Deserialize, Serialize};
use thiserror::Error;

bitflags! {
    /// Scope of a device subscription.
    ///
    /// `empty()` means "no automatic scope": devices are only mirrored
    /// after an explicit subscribe call.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
    #[serde(transparent)]
    pub struct SubscriptionFlags: u32 {
        /// Device presence and metadata.
        const DEVICE = 0x01;
        /// Input signals.
        const DEVICE_INPUTS = 0x02;
        /// Output signals.
        const DEVICE_OUTPUTS = 0x04;
        const DEVICE_SIGNALS = Self::DEVICE_INPUTS.bits() | Self::DEVICE_OUTPUTS.bits();
        /// Links whose destination is the device.
        const DEVICE_LINKS_IN = 0x08;
        /// Links whose source is the device.
        const DEVICE_LINKS_OUT = 0x10;
        const DEVICE_LINKS = Self::DEVICE_LINKS_IN.bits() | Self::DEVICE_LINKS_OUT.bits();
        /// Connections arriving at one of the device's signals.
        const DEVICE_CONNECTIONS_IN = 0x20;
        /// Connections leaving one of the device's signals.
        const DEVICE_CONNECTIONS_OUT = 0x40;
        const DEVICE_CONNECTIONS =
            Self::DEVICE_CONNECTIONS_IN.bits() | Self::DEVICE_CONNECTIONS_OUT.bits();
        const ALL = Self::DEVICE.bits()
            | Self::DEVICE_SIGNALS.bits()
            | Self::DEVICE_LINKS.bits()
            | Self::DEVICE_CONNECTIONS.bits();
    }
}

/// Failure to parse a textual subscription mask.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid subscription flag '{token}'")]
pub struct FlagParseError {
    pub token: String,
}

impl Default for SubscriptionFlags {
    fn default() -> Self {
        Self::empty()
    }
}

impl SubscriptionFlags {
    /// Build from a raw mask, dropping undefined bits.
    ///
    /// Older callers pass `0xFF` for "everything"; that maps to [`Self::ALL`].
    pub fn from_raw(mask: u32) -> Self {
        Self::from_bits_truncate(mask)
    }

    /// Whether signals of the given direction are in scope.
    pub fn covers_signals(self, direction: crate::record::Direction) -> bool {
        match direction {
            crate::record::Direction::Input => self.contains(Self::DEVICE_INPUTS),
            crate::record::Direction::Output => self.contains(Self::DEVICE_OUTPUTS),
        }
    }

    /// Every named mask with its wire value, in declaration order.
    pub fn table() -> Vec<(&'static str, Self)> {
        <Self as Flags>::FLAGS
            .iter()
            .map(|flag| (flag.name(), *flag.value()))
            .collect()
    }

    /// Names of the primitive (single-bit) flags set in this mask.
    pub fn primitive_names(self) -> Vec<&'static str> {
        Self::all()
            .iter_names()
            .filter(|(_, flag)| flag.bits().is_power_of_two() && self.contains(*flag))
            .map(|(name, _)| name)
            .collect()
    }
}

impl fmt::Display for SubscriptionFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return write!(f, "NONE");
        }
        write!(f, "{}", self.primitive_names().join("|"))
    }
}

impl FromStr for SubscriptionFlags {
    type Err = FlagParseError;

    /// Accepts flag names (any case, optional `SUB_` / `DEVICE_` prefixes for
    /// the composed names), decimal or `0x` hex integers, and any mix of
    /// them separated by `|`, `,` or `+`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut flags = Self::empty();
        for raw in s.split(['|', ',', '+']) {
            let token = raw.trim();
            if token.is_empty() {
                continue;
            }
            flags |= parse_token(token).ok_or_else(|| FlagParseError {
                token: token.to_owned(),
            })?;
        }
        Ok(flags)
    }
}

fn parse_token(token: &str) -> Option<SubscriptionFlags> {
    if let Some(hex) = token
        .strip_prefix("0x")
        .or_else(|| token.strip_prefix("0X"))
    {
        return u32::from_str_radix(hex, 16)
            .ok()
            .map(SubscriptionFlags::from_raw);
    }
    if let Ok(mask) = token.parse::<u32>() {
        return Some(SubscriptionFlags::from_raw(mask));
    }

    let upper = token.to_ascii_uppercase().replace('-', "_");
    let name = upper.strip_prefix("SUB_").unwrap_or(&upper);
    match name {
        "NONE" => Some(SubscriptionFlags::empty()),
        "ALL" | "DEVICE_ALL" => Some(SubscriptionFlags::ALL),
        other => SubscriptionFlags::from_name(other)
            .or_else(|| SubscriptionFlags::from_name(&format!("DEVICE_{other}"))),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::record::Direction;

    #[test]
    fn composed_masks_equal_union_of_components() {
        type F = SubscriptionFlags;
        assert_eq!(F::DEVICE_SIGNALS, F::DEVICE_INPUTS | F::DEVICE_OUTPUTS);
        assert_eq!(F::DEVICE_LINKS, F::DEVICE_LINKS_IN | F::DEVICE_LINKS_OUT);
        assert_eq!(
            F::DEVICE_CONNECTIONS,
            F::DEVICE_CONNECTIONS_IN | F::DEVICE_CONNECTIONS_OUT
        );
        assert_eq!(
            F::ALL,
            F::DEVICE | F::DEVICE_SIGNALS | F::DEVICE_LINKS | F::DEVICE_CONNECTIONS
        );
    }

    #[test]
    fn wire_values_are_stable() {
        assert_eq!(SubscriptionFlags::DEVICE.bits(), 0x01);
        assert_eq!(SubscriptionFlags::DEVICE_SIGNALS.bits(), 0x06);
        assert_eq!(SubscriptionFlags::DEVICE_LINKS.bits(), 0x18);
        assert_eq!(SubscriptionFlags::DEVICE_CONNECTIONS.bits(), 0x60);
        assert_eq!(SubscriptionFlags::ALL.bits(), 0x7F);
    }

    #[test]
    fn legacy_all_mask_truncates_to_all() {
        assert_eq!(SubscriptionFlags::from_raw(0xFF), SubscriptionFlags::ALL);
    }

    #[test]
    fn parses_names_and_numbers() {
        let f: SubscriptionFlags = "device | inputs".parse().unwrap();
        assert_eq!(f, SubscriptionFlags::DEVICE | SubscriptionFlags::DEVICE_INPUTS);

        let f: SubscriptionFlags = "SUB_DEVICE_SIGNALS".parse().unwrap();
        assert_eq!(f, SubscriptionFlags::DEVICE_SIGNALS);

        let f: SubscriptionFlags = "0x18".parse().unwrap();
        assert_eq!(f, SubscriptionFlags::DEVICE_LINKS);

        let f: SubscriptionFlags = "6".parse().unwrap();
        assert_eq!(f, SubscriptionFlags::DEVICE_SIGNALS);

        let f: SubscriptionFlags = "device_all".parse().unwrap();
        assert_eq!(f, SubscriptionFlags::ALL);

        let f: SubscriptionFlags = "none".parse().unwrap();
        assert!(f.is_empty());
    }

    #[test]
    fn rejects_unknown_names() {
        let err = "device,bogus".parse::<SubscriptionFlags>().unwrap_err();
        assert_eq!(err.token, "bogus");
    }

    #[test]
    fn display_lists_primitive_bits() {
        assert_eq!(
            SubscriptionFlags::DEVICE_SIGNALS.to_string(),
            "DEVICE_INPUTS|DEVICE_OUTPUTS"
        );
        assert_eq!(SubscriptionFlags::empty().to_string(), "NONE");
    }

    #[test]
    fn display_round_trips_through_parse() {
        let f = SubscriptionFlags::DEVICE | SubscriptionFlags::DEVICE_CONNECTIONS_OUT;
        assert_eq!(f.to_string().parse::<SubscriptionFlags>().unwrap(), f);
    }

    #[test]
    fn flag_table_lists_every_named_mask() {
        let rendered: Vec<String> = SubscriptionFlags::table()
            .into_iter()
            .map(|(name, flag)| format!("{name:<22} 0x{:02X}", flag.bits()))
            .collect();
        insta::assert_snapshot!(rendered.join("\n"), @r"
        DEVICE                 0x01
        DEVICE_INPUTS          0x02
        DEVICE_OUTPUTS         0x04
        DEVICE_SIGNALS         0x06
        DEVICE_LINKS_IN        0x08
        DEVICE_LINKS_OUT       0x10
        DEVICE_LINKS           0x18
        DEVICE_CONNECTIONS_IN  0x20
        DEVICE_CONNECTIONS_OUT 0x40
        DEVICE_CONNECTIONS     0x60
        ALL                    0x7F
        ");
    }

    #[test]
    fn signal_coverage_follows_direction_bits() {
        let f = SubscriptionFlags::DEVICE_OUTPUTS;
        assert!(f.covers_signals(Direction::Output));
        assert!(!f.covers_signals(Direction::Input));
    }
}
