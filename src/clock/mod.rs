//! Clock subsystem: the source of every protocol timestamp.
//!
//! ```text
//!  encoded timestamp (8 bytes)
//! ┌───────┬──────────────────────────┬─────────────┬──────────────┐
//! │ flags │ time (u48 LE, scaled)    │ time source │ offset (i8)  │
//! │  1B   │          6B              │     1B      │ 15-min units │
//! └───────┴──────────────────────────┴─────────────┴──────────────┘
//! ```
//!
//! The clock keeps an Epoch-2000 anchor and the monotonic reading taken
//! when that anchor was set; the current time is recomputed from both on
//! every read, so it never drifts once the anchors are fixed. Any change
//! (write, adjustment, resync) replaces the anchors in one step and is
//! broadcast to registered [`ClockListener`]s.

mod flags;
mod tick;

pub use flags::{MILLIS_PER_OFFSET_UNIT, Resolution, TimeSource, TimestampFlags};
pub use tick::TickCounter;

use std::sync::Arc;

use log::{debug, info, warn};

use crate::app::ports::TimePort;
use crate::bytes::{ByteReader, ByteWriter};
use crate::error::{ClockError, DecodeError};

/// Unix epoch millis at 2000-01-01T00:00:00Z.
pub const EPOCH_2000_UNIX_MILLIS: i64 = 946_684_800_000;

const U48_MASK: u64 = 0xFFFF_FFFF_FFFF;

// ── Timestamp ────────────────────────────────────────────────

/// A decoded/encodable timestamp value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Timestamp {
    pub flags: TimestampFlags,
    /// 48-bit time field in the units selected by `flags`.
    pub value: u64,
    pub time_source: TimeSource,
    pub offset_units: i8,
}

impl Timestamp {
    pub const ENCODED_LEN: usize = 8;

    pub fn to_bytes(&self) -> [u8; Self::ENCODED_LEN] {
        let mut w = ByteWriter::with_capacity(Self::ENCODED_LEN);
        w.u8(self.flags.bits())
            .u48(self.value & U48_MASK)
            .u8(self.time_source.as_u8())
            .u8(self.offset_units as u8);
        let mut out = [0u8; Self::ENCODED_LEN];
        out.copy_from_slice(&w.into_vec());
        out
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, DecodeError> {
        let mut r = ByteReader::new(bytes);
        let flags = TimestampFlags::from_bits(r.u8()?);
        let value = r.u48()?;
        let time_source = TimeSource::from_u8(r.u8()?);
        let offset_units = r.u8()? as i8;
        Ok(Self {
            flags,
            value,
            time_source,
            offset_units,
        })
    }

    /// Time field converted back to milliseconds.
    pub fn millis(&self) -> u64 {
        self.flags.resolution().unscale(self.value)
    }

    pub fn offset_millis(&self) -> i64 {
        if self.flags.has_offset() {
            i64::from(self.offset_units) * MILLIS_PER_OFFSET_UNIT
        } else {
            0
        }
    }

    /// Epoch-2000 UTC millis; `None` for tick-counter timestamps.
    pub fn utc_epoch_millis(&self) -> Option<i64> {
        if self.flags.is_tick_counter() {
            return None;
        }
        let millis = self.millis() as i64;
        Some(if self.flags.is_utc() {
            millis
        } else {
            millis - self.offset_millis()
        })
    }

    pub fn is_current_timeline(&self) -> bool {
        self.flags.contains(TimestampFlags::CURRENT_TIMELINE)
    }

    #[must_use]
    pub fn off_timeline(self) -> Self {
        Self {
            flags: self.flags.without(TimestampFlags::CURRENT_TIMELINE),
            ..self
        }
    }
}

// ── Clock state ──────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClockState {
    pub epoch_anchor_millis: i64,
    pub wall_anchor_millis: u64,
    pub tz_dst_offset_millis: i64,
    pub time_source: TimeSource,
}

/// Result of decoding a clock write, applied with [`Clock::apply`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClockUpdate {
    /// Restart the tick counter at this many milliseconds.
    Ticks(u64),
    /// Re-anchor absolute time.
    Absolute {
        utc_epoch_millis: i64,
        offset_millis: i64,
        time_source: TimeSource,
    },
}

/// Notified after every clock change.
pub trait ClockListener: Send + Sync {
    fn on_time_source_changed(&self);
}

// ── Clock ────────────────────────────────────────────────────

pub struct Clock<C: TimePort> {
    time: C,
    state: ClockState,
    flags: TimestampFlags,
    ticks: TickCounter,
    listeners: Vec<Arc<dyn ClockListener>>,
}

impl<C: TimePort> Clock<C> {
    /// Anchor the clock to the port's system time.
    pub fn new(time: C, flags: TimestampFlags, time_source: TimeSource) -> Self {
        let now = time.monotonic_millis();
        let state = ClockState {
            epoch_anchor_millis: time.system_utc_millis() - EPOCH_2000_UNIX_MILLIS,
            wall_anchor_millis: now,
            tz_dst_offset_millis: time.local_offset_millis(),
            time_source,
        };
        let mut ticks = TickCounter::new();
        ticks.set(now, 0);
        Self {
            time,
            state,
            flags,
            ticks,
            listeners: Vec::new(),
        }
    }

    pub fn time_port(&self) -> &C {
        &self.time
    }

    pub fn state(&self) -> ClockState {
        self.state
    }

    pub fn flags(&self) -> TimestampFlags {
        self.flags
    }

    pub fn set_flags(&mut self, flags: TimestampFlags) {
        info!("CLOCK: flags {} -> {}", self.flags, flags);
        self.flags = flags;
    }

    pub fn add_listener(&mut self, listener: Arc<dyn ClockListener>) {
        self.listeners.push(listener);
    }

    // ── Reads ─────────────────────────────────────────────────

    pub fn current_epoch_millis(&self) -> i64 {
        let elapsed = self
            .time
            .monotonic_millis()
            .saturating_sub(self.state.wall_anchor_millis);
        self.state.epoch_anchor_millis + elapsed as i64
    }

    pub fn current_ticks(&self) -> u64 {
        self.ticks.current(self.time.monotonic_millis())
    }

    /// Timestamp using the configured flags.
    pub fn timestamp(&self) -> Timestamp {
        self.timestamp_with(self.flags)
    }

    pub fn timestamp_with(&self, flags: TimestampFlags) -> Timestamp {
        let resolution = flags.resolution();
        if flags.is_tick_counter() {
            return Timestamp {
                flags,
                value: resolution.scale(self.current_ticks()) & U48_MASK,
                time_source: TimeSource::None,
                offset_units: 0,
            };
        }

        let offset = self.state.tz_dst_offset_millis;
        let millis = if flags.is_utc() {
            self.current_epoch_millis()
        } else {
            self.current_epoch_millis() + offset
        };
        let offset_units = if flags.has_offset() {
            (offset / MILLIS_PER_OFFSET_UNIT) as i8
        } else {
            0
        };
        Timestamp {
            flags,
            value: resolution.scale(millis.max(0) as u64) & U48_MASK,
            time_source: self.state.time_source,
            offset_units,
        }
    }

    pub fn encode(&self, flags: TimestampFlags) -> [u8; Timestamp::ENCODED_LEN] {
        let ts = self.timestamp_with(flags);
        debug!(
            "CLOCK: encode flags={} value={} source={} offset={}",
            flags, ts.value, ts.time_source, ts.offset_units
        );
        ts.to_bytes()
    }

    // ── Writes ────────────────────────────────────────────────

    /// Validate and decode a clock write without touching any state.
    pub fn decode(&self, bytes: &[u8]) -> Result<ClockUpdate, ClockError> {
        let ts = Timestamp::from_bytes(bytes).map_err(|_| ClockError::Truncated)?;

        let written = ts.flags.masked(TimestampFlags::WRITE_MASK);
        let configured = self.flags.masked(TimestampFlags::WRITE_MASK);
        if written != configured {
            return Err(ClockError::FlagMismatch {
                written: ts.flags.bits(),
                configured: self.flags.bits(),
            });
        }

        if ts.flags.is_tick_counter() {
            return Ok(ClockUpdate::Ticks(ts.millis()));
        }
        Ok(ClockUpdate::Absolute {
            // Present unless tick-counter mode, which returned above.
            utc_epoch_millis: ts.utc_epoch_millis().unwrap_or_default(),
            offset_millis: ts.offset_millis(),
            time_source: ts.time_source,
        })
    }

    pub fn apply(&mut self, update: ClockUpdate) {
        let now = self.time.monotonic_millis();
        match update {
            ClockUpdate::Ticks(millis) => {
                self.ticks.set(now, millis);
                info!("CLOCK: tick counter set to {} ms", millis);
            }
            ClockUpdate::Absolute {
                utc_epoch_millis,
                offset_millis,
                time_source,
            } => {
                self.state = ClockState {
                    epoch_anchor_millis: utc_epoch_millis,
                    wall_anchor_millis: now,
                    tz_dst_offset_millis: offset_millis,
                    time_source,
                };
                info!(
                    "CLOCK: set to {} ms (offset {} ms, source {})",
                    utc_epoch_millis, offset_millis, time_source
                );
            }
        }
        self.broadcast();
    }

    /// Decode then apply; a rejected write leaves the clock untouched.
    pub fn write(&mut self, bytes: &[u8]) -> Result<(), ClockError> {
        match self.decode(bytes) {
            Ok(update) => {
                self.apply(update);
                Ok(())
            }
            Err(e) => {
                warn!("CLOCK: write rejected: {}", e);
                Err(e)
            }
        }
    }

    pub fn set_epoch_millis(&mut self, epoch_2000_millis: i64) {
        self.state.epoch_anchor_millis = epoch_2000_millis;
        self.state.wall_anchor_millis = self.time.monotonic_millis();
        self.broadcast();
    }

    /// Shift the clock by `delta_millis` without re-reading system time.
    pub fn adjust_millis(&mut self, delta_millis: i64) {
        let current = self.current_epoch_millis();
        self.state.epoch_anchor_millis = current + delta_millis;
        self.state.wall_anchor_millis = self.time.monotonic_millis();
        info!("CLOCK: adjusted by {} ms", delta_millis);
        self.broadcast();
    }

    pub fn set_to_system_time(&mut self) {
        self.state.epoch_anchor_millis = self.time.system_utc_millis() - EPOCH_2000_UNIX_MILLIS;
        self.state.wall_anchor_millis = self.time.monotonic_millis();
        self.state.tz_dst_offset_millis = self.time.local_offset_millis();
        info!("CLOCK: resynced to system time");
        self.broadcast();
    }

    pub fn set_time_source(&mut self, source: TimeSource) {
        self.state.time_source = source;
        self.broadcast();
    }

    pub fn set_offset_millis(&mut self, offset_millis: i64) {
        self.state.tz_dst_offset_millis = offset_millis;
        self.broadcast();
    }

    fn broadcast(&self) {
        for listener in &self.listeners {
            listener.on_time_source_changed();
        }
    }
}

// ── Tests ────────────────────────────────────────────────────
