//! Service configuration parameters
//!
//! All tunable parameters for the GHS peripheral service.
//! Values can be overridden from a JSON file or the simulator command line.

use serde::{Deserialize, Serialize};

use crate::clock::{TimeSource, TimestampFlags};
use crate::error::{Error, Result};
use crate::observation::ObservationType;

/// Observation types the emitter can be configured with at once.
pub const MAX_OBSERVATION_TYPES: usize = 8;

/// Smallest ATT MTU a central may negotiate.
pub const MIN_MTU: u16 = 23;

/// Core service configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    // --- Clock ---
    /// Flag byte of every timestamp the service produces
    pub timestamp_flags: TimestampFlags,
    /// Time source reported until a client writes the clock
    pub time_source: TimeSource,
    /// Timezone + DST offset (minutes, multiple of 15)
    pub tz_offset_minutes: i16,

    // --- Emitter ---
    /// Emission period used before any schedule is negotiated (milliseconds)
    pub emitter_period_ms: u32,
    /// MDC codes of the observation types to emit
    pub observation_types: heapless::Vec<u32, MAX_OBSERVATION_TYPES>,
    /// Wrap numeric observations of one tick into a bundle
    pub bundle_observations: bool,

    // --- Transport ---
    /// MTU assumed when a stored transfer runs without a reported MTU
    pub default_mtu: u16,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        let mut observation_types = heapless::Vec::new();
        for kind in [
            ObservationType::HeartRate,
            ObservationType::SpO2,
            ObservationType::BodyTemperature,
        ] {
            // Capacity is larger than this list.
            let _ = observation_types.push(kind.code());
        }
        Self {
            // Clock
            timestamp_flags: TimestampFlags::MILLISECONDS
                | TimestampFlags::TZ_PRESENT
                | TimestampFlags::DST_PRESENT
                | TimestampFlags::CURRENT_TIMELINE,
            time_source: TimeSource::Manual,
            tz_offset_minutes: 0,

            // Emitter
            emitter_period_ms: 10_000,
            observation_types,
            bundle_observations: false,

            // Transport
            default_mtu: MIN_MTU,
        }
    }
}

impl ServiceConfig {
    /// Reject values the service cannot operate with.
    pub fn validate(&self) -> Result<()> {
        if !(1_000..=60_000).contains(&self.emitter_period_ms) {
            return Err(Error::Config("emitter period must be 1..=60 s"));
        }
        if self
            .observation_types
            .iter()
            .any(|&code| ObservationType::from_code(code) == ObservationType::Unknown)
        {
            return Err(Error::Config("unknown observation type code"));
        }
        if self.default_mtu < MIN_MTU {
            return Err(Error::Config("default MTU below 23"));
        }
        if self.tz_offset_minutes % 15 != 0 || !(-720..=840).contains(&self.tz_offset_minutes) {
            return Err(Error::Config("timezone offset must be a multiple of 15 min within -12h..+14h"));
        }
        if self.timestamp_flags.is_tick_counter() && self.timestamp_flags.is_utc() {
            return Err(Error::Config("tick counter timestamps cannot be UTC"));
        }
        Ok(())
    }

    pub fn observation_types(&self) -> Vec<ObservationType> {
        self.observation_types
            .iter()
            .map(|&code| ObservationType::from_code(code))
            .collect()
    }

    pub fn tz_offset_millis(&self) -> i64 {
        i64::from(self.tz_offset_minutes) * 60_000
    }
}
