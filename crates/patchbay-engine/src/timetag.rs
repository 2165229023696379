// ── Engine time tags ──
//
// NTP-style fixed point: whole seconds since 1900-01-01 plus a 32-bit
// binary fraction. Consumers should treat the value as opaque and only
// rely on ordering and differences.

use std::fmt;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Seconds between the NTP epoch (1900) and the Unix epoch (1970).
const NTP_UNIX_OFFSET: u64 = 2_208_988_800;

const NANOS_PER_SEC: u64 = 1_000_000_000;

/// A timestamp issued by the session engine.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TimeTag {
    pub sec: u32,
    pub frac: u32,
}

impl TimeTag {
    /// Conventional "as soon as possible" tag.
    pub const IMMEDIATE: Self = Self { sec: 0, frac: 1 };

    pub const fn new(sec: u32, frac: u32) -> Self {
        Self { sec, frac }
    }

    /// Wall-clock time converted to a tag.
    pub fn now() -> Self {
        Self::from_system_time(SystemTime::now())
    }

    pub fn from_system_time(t: SystemTime) -> Self {
        let since_unix = t.duration_since(UNIX_EPOCH).unwrap_or_default();
        Self::from_unix_duration(since_unix)
    }

    fn from_unix_duration(d: Duration) -> Self {
        let sec = u32::try_from(d.as_secs() + NTP_UNIX_OFFSET).unwrap_or(u32::MAX);
        let frac = (u64::from(d.subsec_nanos()) << 32) / NANOS_PER_SEC;
        Self {
            sec,
            frac: u32::try_from(frac).unwrap_or(u32::MAX),
        }
    }

    /// Tag value as fractional seconds since the NTP epoch.
    pub fn as_secs_f64(self) -> f64 {
        f64::from(self.sec) + f64::from(self.frac) / 4_294_967_296.0
    }

    /// Signed difference `self - earlier` in seconds.
    pub fn seconds_since(self, earlier: Self) -> f64 {
        self.as_secs_f64() - earlier.as_secs_f64()
    }

    /// Tag advanced by `d`, saturating at the end of the NTP era.
    pub fn add(self, d: Duration) -> Self {
        let nanos = (u64::from(self.frac) * NANOS_PER_SEC) >> 32;
        let total = Duration::new(u64::from(self.sec), 0)
            + Duration::from_nanos(nanos)
            + d;
        let sec = u32::try_from(total.as_secs()).unwrap_or(u32::MAX);
        let frac = (u64::from(total.subsec_nanos()) << 32) / NANOS_PER_SEC;
        Self {
            sec,
            frac: u32::try_from(frac).unwrap_or(u32::MAX),
        }
    }

    /// Convert to a UTC datetime. `None` for tags before the Unix epoch.
    pub fn to_datetime(self) -> Option<DateTime<Utc>> {
        let unix = u64::from(self.sec).checked_sub(NTP_UNIX_OFFSET)?;
        let nanos = (u64::from(self.frac) * NANOS_PER_SEC) >> 32;
        DateTime::from_timestamp(
            i64::try_from(unix).ok()?,
            u32::try_from(nanos).ok()?,
        )
    }
}

impl fmt::Display for TimeTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.to_datetime() {
            Some(dt) => write!(f, "{}", dt.format("%Y-%m-%dT%H:%M:%S%.6fZ")),
            None => write!(f, "{}.{:08x}", self.sec, self.frac),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn unix_epoch_maps_to_ntp_offset() {
        let tag = TimeTag::from_system_time(UNIX_EPOCH);
        assert_eq!(u64::from(tag.sec), NTP_UNIX_OFFSET);
        assert_eq!(tag.frac, 0);
    }

    #[test]
    fn half_second_is_half_fraction() {
        let tag = TimeTag::from_system_time(UNIX_EPOCH + Duration::from_millis(500));
        assert_eq!(tag.frac, 1 << 31);
    }

    #[test]
    fn ordering_follows_time() {
        let a = TimeTag::from_system_time(UNIX_EPOCH + Duration::from_secs(10));
        let b = a.add(Duration::from_millis(250));
        assert!(b > a);
        assert!((b.seconds_since(a) - 0.25).abs() < 1e-6);
    }

    #[test]
    fn datetime_round_trip() {
        let tag = TimeTag::from_system_time(UNIX_EPOCH + Duration::from_secs(1_700_000_000));
        let dt = tag.to_datetime().unwrap();
        assert_eq!(dt.timestamp(), 1_700_000_000);
    }

    #[test]
    fn pre_unix_tags_have_no_datetime() {
        assert!(TimeTag::IMMEDIATE.to_datetime().is_none());
        assert_eq!(TimeTag::IMMEDIATE.to_string(), "0.00000001");
    }
}
