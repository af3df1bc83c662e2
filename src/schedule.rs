//! Observation schedule negotiator.
//!
//! Each observation type gets its own schedule descriptor slot, allocated
//! on first use. A descriptor value is
//!
//! ```text
//! ┌──────────────┬───────────────────────┬──────────────────────┐
//! │ type u32     │ measurement period    │ update interval      │
//! │              │ FLOAT, 3 decimals (s) │ FLOAT, 3 decimals (s)│
//! └──────────────┴───────────────────────┴──────────────────────┘
//! ```
//!
//! A write to a slot must name the type already pinned by that slot.

use log::{info, warn};

use crate::bytes::{ByteReader, ByteWriter, decode_float};
use crate::error::ScheduleError;
use crate::observation::ObservationType;

pub const MIN_MEASUREMENT_PERIOD_SECS: f64 = 0.0;
pub const MAX_MEASUREMENT_PERIOD_SECS: f64 = 60.0;
pub const MIN_UPDATE_INTERVAL_SECS: f64 = 1.0;
pub const MAX_UPDATE_INTERVAL_SECS: f64 = 60.0;

const DESCRIPTOR_PRECISION: u8 = 3;
const DESCRIPTOR_LEN: usize = 12;

pub type SlotId = u8;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScheduleEntry {
    pub kind: ObservationType,
    pub measurement_period_secs: f64,
    pub update_interval_secs: f64,
}

impl ScheduleEntry {
    pub fn new(kind: ObservationType, period: f64, interval: f64) -> Result<Self, ScheduleError> {
        if !(MIN_MEASUREMENT_PERIOD_SECS..=MAX_MEASUREMENT_PERIOD_SECS).contains(&period) {
            return Err(ScheduleError::PeriodOutOfRange);
        }
        if !(MIN_UPDATE_INTERVAL_SECS..=MAX_UPDATE_INTERVAL_SECS).contains(&interval) {
            return Err(ScheduleError::IntervalOutOfRange);
        }
        Ok(Self {
            kind,
            measurement_period_secs: period,
            update_interval_secs: interval,
        })
    }

    /// The one-second default every new slot starts with.
    pub const fn default_for(kind: ObservationType) -> Self {
        Self {
            kind,
            measurement_period_secs: 1.0,
            update_interval_secs: 1.0,
        }
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut w = ByteWriter::with_capacity(DESCRIPTOR_LEN);
        w.u32(self.kind.code())
            .float(self.measurement_period_secs, DESCRIPTOR_PRECISION)
            .float(self.update_interval_secs, DESCRIPTOR_PRECISION);
        w.into_vec()
    }

    /// Parse and validate a descriptor write.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, ScheduleError> {
        if bytes.len() < DESCRIPTOR_LEN {
            return Err(ScheduleError::Truncated);
        }
        let mut r = ByteReader::new(bytes);
        let (Ok(code), Ok(period), Ok(interval)) = (r.u32(), r.float_raw(), r.float_raw()) else {
            return Err(ScheduleError::Truncated);
        };
        Self::new(
            ObservationType::from_code(code),
            decode_float(period),
            decode_float(interval),
        )
    }

    pub fn update_interval_millis(&self) -> u64 {
        (self.update_interval_secs * 1000.0).round() as u64
    }
}

/// Lazily allocated descriptor slots, one per observation type.
#[derive(Debug, Clone)]
pub struct ScheduleNegotiator {
    slots: Vec<ScheduleEntry>,
}

impl Default for ScheduleNegotiator {
    fn default() -> Self {
        Self::new()
    }
}

impl ScheduleNegotiator {
    /// Heart rate starts pre-seeded at 1 s / 1 s.
    pub fn new() -> Self {
        Self {
            slots: vec![ScheduleEntry::default_for(ObservationType::HeartRate)],
        }
    }

    /// Set the schedule of `kind`, allocating its slot if needed.
    pub fn configure(
        &mut self,
        kind: ObservationType,
        period: f64,
        interval: f64,
    ) -> Result<ScheduleEntry, ScheduleError> {
        let entry = ScheduleEntry::new(kind, period, interval).inspect_err(|e| {
            warn!("SCHED: {} period={} interval={} rejected: {}", kind, period, interval, e);
        })?;
        let slot = self.descriptor_for(kind);
        self.slots[usize::from(slot)] = entry;
        info!(
            "SCHED: {} period={}s interval={}s (slot {})",
            kind, period, interval, slot
        );
        Ok(entry)
    }

    /// Slot of `kind`, allocating one with default values on first use.
    pub fn descriptor_for(&mut self, kind: ObservationType) -> SlotId {
        if let Some(slot) = self.slot_of(kind) {
            return slot;
        }
        self.slots.push(ScheduleEntry::default_for(kind));
        (self.slots.len() - 1) as SlotId
    }

    pub fn slot_of(&self, kind: ObservationType) -> Option<SlotId> {
        self.slots
            .iter()
            .position(|e| e.kind == kind)
            .map(|i| i as SlotId)
    }

    /// Handle a client write to descriptor `slot`.
    pub fn write_descriptor(
        &mut self,
        slot: SlotId,
        bytes: &[u8],
    ) -> Result<ScheduleEntry, ScheduleError> {
        let current = *self
            .slots
            .get(usize::from(slot))
            .ok_or(ScheduleError::UnknownSlot)?;
        let entry = ScheduleEntry::from_bytes(bytes)?;
        if entry.kind != current.kind {
            warn!(
                "SCHED: slot {} pins {}, write named {}",
                slot, current.kind, entry.kind
            );
            return Err(ScheduleError::TypeMismatch);
        }
        self.configure(
            entry.kind,
            entry.measurement_period_secs,
            entry.update_interval_secs,
        )
    }

    /// Reset `kind`'s slot to the default schedule. Slot ids never shift.
    pub fn forget(&mut self, kind: ObservationType) {
        if let Some(slot) = self.slot_of(kind) {
            self.slots[usize::from(slot)] = ScheduleEntry::default_for(kind);
        }
    }

    pub fn entry(&self, kind: ObservationType) -> Option<ScheduleEntry> {
        self.slots.iter().copied().find(|e| e.kind == kind)
    }

    pub fn entries(&self) -> &[ScheduleEntry] {
        &self.slots
    }

    pub fn descriptor_bytes(&self, slot: SlotId) -> Option<Vec<u8>> {
        self.slots.get(usize::from(slot)).map(ScheduleEntry::to_bytes)
    }
}
