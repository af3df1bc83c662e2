//! Timestamp flag byte and time-source identity.

use core::fmt;

use serde::{Deserialize, Serialize};

/// Millis per unit of the timestamp offset byte.
pub const MILLIS_PER_OFFSET_UNIT: i64 = 15 * 60 * 1000;

/// One-byte flag field that leads every encoded timestamp.
///
/// Bits 0..=4 are the wire vocabulary shared with observations; bits 5..=7
/// select tick-counter mode and the resolution of the 48-bit time field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TimestampFlags(u8);

impl TimestampFlags {
    pub const UTC: Self = Self(0x01);
    pub const TZ_PRESENT: Self = Self(0x02);
    pub const DST_PRESENT: Self = Self(0x04);
    pub const FRACTIONS: Self = Self(0x08);
    pub const CURRENT_TIMELINE: Self = Self(0x10);
    pub const TICK_COUNTER: Self = Self(0x20);
    pub const MILLISECONDS: Self = Self(0x40);
    pub const HUNDREDTHS_MILLISECONDS: Self = Self(0x80);

    /// Bits a clock write must agree on with the configured flags.
    pub const WRITE_MASK: Self = Self(
        Self::TICK_COUNTER.0
            | Self::UTC.0
            | Self::TZ_PRESENT.0
            | Self::MILLISECONDS.0
            | Self::HUNDREDTHS_MILLISECONDS.0,
    );

    pub const fn empty() -> Self {
        Self(0)
    }

    pub const fn from_bits(bits: u8) -> Self {
        Self(bits)
    }

    pub const fn bits(self) -> u8 {
        self.0
    }

    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    #[must_use]
    pub const fn with(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }

    #[must_use]
    pub const fn without(self, other: Self) -> Self {
        Self(self.0 & !other.0)
    }

    #[must_use]
    pub const fn masked(self, mask: Self) -> Self {
        Self(self.0 & mask.0)
    }

    pub const fn is_tick_counter(self) -> bool {
        self.contains(Self::TICK_COUNTER)
    }

    pub const fn is_utc(self) -> bool {
        self.contains(Self::UTC)
    }

    pub const fn has_offset(self) -> bool {
        self.contains(Self::TZ_PRESENT)
    }

    pub const fn resolution(self) -> Resolution {
        if self.contains(Self::HUNDREDTHS_MILLISECONDS) {
            Resolution::HundredthsOfMilliseconds
        } else if self.contains(Self::MILLISECONDS) {
            Resolution::Milliseconds
        } else {
            Resolution::Seconds
        }
    }
}

impl core::ops::BitOr for TimestampFlags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        self.with(rhs)
    }
}

impl fmt::Display for TimestampFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        const NAMES: [(TimestampFlags, &str); 8] = [
            (TimestampFlags::UTC, "utc"),
            (TimestampFlags::TZ_PRESENT, "tz"),
            (TimestampFlags::DST_PRESENT, "dst"),
            (TimestampFlags::FRACTIONS, "fractions"),
            (TimestampFlags::CURRENT_TIMELINE, "timeline"),
            (TimestampFlags::TICK_COUNTER, "ticks"),
            (TimestampFlags::MILLISECONDS, "ms"),
            (TimestampFlags::HUNDREDTHS_MILLISECONDS, "hundredths"),
        ];
        let mut first = true;
        for (flag, name) in NAMES {
            if self.contains(flag) {
                if !first {
                    f.write_str("|")?;
                }
                f.write_str(name)?;
                first = false;
            }
        }
        if first {
            f.write_str("none")?;
        }
        Ok(())
    }
}

/// Unit of the 48-bit time field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    Seconds,
    Milliseconds,
    HundredthsOfMilliseconds,
}

impl Resolution {
    /// Milliseconds to wire units.
    pub const fn scale(self, millis: u64) -> u64 {
        match self {
            Self::Seconds => millis / 1000,
            Self::Milliseconds => millis,
            Self::HundredthsOfMilliseconds => millis.saturating_mul(100),
        }
    }

    /// Wire units back to milliseconds.
    pub const fn unscale(self, value: u64) -> u64 {
        match self {
            Self::Seconds => value.saturating_mul(1000),
            Self::Milliseconds => value,
            Self::HundredthsOfMilliseconds => value / 100,
        }
    }
}

/// Where the clock's notion of time came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[repr(u8)]
pub enum TimeSource {
    #[default]
    Unknown = 0,
    Ntp = 1,
    Gps = 2,
    RadioTimeSignal = 3,
    Manual = 4,
    Atomic = 5,
    CellularNetwork = 6,
    None = 7,
}

impl TimeSource {
    pub const fn from_u8(value: u8) -> Self {
        match value {
            1 => Self::Ntp,
            2 => Self::Gps,
            3 => Self::RadioTimeSignal,
            4 => Self::Manual,
            5 => Self::Atomic,
            6 => Self::CellularNetwork,
            7 => Self::None,
            _ => Self::Unknown,
        }
    }

    pub const fn as_u8(self) -> u8 {
        self as u8
    }
}

impl fmt::Display for TimeSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Unknown => "Unknown",
            Self::Ntp => "NTP",
            Self::Gps => "GPS",
            Self::RadioTimeSignal => "Radio Time Signal",
            Self::Manual => "Manual",
            Self::Atomic => "Atomic Clock",
            Self::CellularNetwork => "Cellular Network",
            Self::None => "None",
        };
        f.write_str(name)
    }
}
