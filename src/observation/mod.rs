//! Observation model.
//!
//! An [`Observation`] carries the shared header fields (handle, type,
//! timestamp, patient, supplemental info) and one [`ObservationValue`]
//! variant. Each variant owns only the fields it needs; the codec matches
//! on the variant exhaustively.
//!
//! ```text
//!  [class][len u16]{ flags │ handle │ type? │ time? │ patient? │ supp? │ value }
//! ```

pub mod codec;
mod types;
mod units;

pub use codec::{decode, decode_stored, encode, encode_stored};
pub use types::{ObservationClass, ObservationType};
pub use units::UnitCode;

use crate::clock::Timestamp;
use crate::error::DecodeError;

// ── Value payloads ───────────────────────────────────────────

/// One `(type, unit, value)` member of a compound numeric observation.
#[derive(Debug, Clone, PartialEq)]
pub struct NumericComponent {
    pub kind: ObservationType,
    pub unit: UnitCode,
    pub value: f64,
}

/// Raw samples plus the header fields that describe how to scale them.
#[derive(Debug, Clone, PartialEq)]
pub struct SampleArray {
    pub unit: UnitCode,
    pub samples: Vec<u8>,
    pub scale_factor: f64,
    pub scale_offset: f64,
    pub sample_period_secs: f64,
    pub samples_per_period: u8,
    pub bytes_per_sample: u8,
}

impl SampleArray {
    /// One-byte samples, unit scale, one period per second.
    pub fn new(unit: UnitCode, samples: Vec<u8>) -> Self {
        Self {
            unit,
            samples_per_period: u8::try_from(samples.len()).unwrap_or(u8::MAX),
            samples,
            scale_factor: 1.0,
            scale_offset: 0.0,
            sample_period_secs: 1.0,
            bytes_per_sample: 1,
        }
    }

    /// Scaled `(min, max)` over the samples, `(0, 0)` when empty.
    pub fn scaled_extremes(&self) -> (i32, i32) {
        let width = usize::from(self.bytes_per_sample.clamp(1, 4));
        let mut extremes: Option<(f64, f64)> = None;
        for chunk in self.samples.chunks_exact(width) {
            let mut wide = [0u8; 4];
            wide[..width].copy_from_slice(chunk);
            // Sign-extend from the sample width.
            let shift = 32 - 8 * width as u32;
            let raw = (i32::from_le_bytes(wide) << shift) >> shift;
            let scaled = f64::from(raw) * self.scale_factor + self.scale_offset;
            extremes = Some(match extremes {
                None => (scaled, scaled),
                Some((lo, hi)) => (lo.min(scaled), hi.max(scaled)),
            });
        }
        extremes.map_or((0, 0), |(lo, hi)| (lo as i32, hi as i32))
    }
}

/// Wire format tag of a TLV entry value.
#[derive(Debug, Clone, PartialEq)]
pub enum TlvValue {
    Utf8(String),
    Uint32(u32),
    Float32(f32),
    Struct(Vec<u8>),
}

impl TlvValue {
    pub const FORMAT_UTF8: u8 = 0x19;
    pub const FORMAT_UINT32: u8 = 0x08;
    pub const FORMAT_FLOAT32: u8 = 0x14;
    pub const FORMAT_STRUCT: u8 = 0x1B;

    pub const fn format(&self) -> u8 {
        match self {
            Self::Utf8(_) => Self::FORMAT_UTF8,
            Self::Uint32(_) => Self::FORMAT_UINT32,
            Self::Float32(_) => Self::FORMAT_FLOAT32,
            Self::Struct(_) => Self::FORMAT_STRUCT,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TlvEntry {
    pub kind: ObservationType,
    pub value: TlvValue,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ObservationValue {
    SimpleNumeric {
        value: f64,
        precision: u8,
        unit: UnitCode,
    },
    CompoundNumeric {
        components: Vec<NumericComponent>,
        precision: u8,
    },
    SampleArray(SampleArray),
    SimpleDiscrete(u32),
    String(String),
    Tlv(Vec<TlvEntry>),
    CompoundDiscreteEvent(Vec<u32>),
    CompoundState {
        supported_mask: Vec<u8>,
        state_or_event: Vec<u8>,
        value: Vec<u8>,
    },
    /// Children share the bundle's timestamp.
    Bundle(Vec<Observation>),
}

impl ObservationValue {
    pub const fn class(&self) -> ObservationClass {
        match self {
            Self::SimpleNumeric { .. } => ObservationClass::SimpleNumeric,
            Self::CompoundNumeric { .. } => ObservationClass::CompoundNumeric,
            Self::SampleArray(_) => ObservationClass::SampleArray,
            Self::SimpleDiscrete(_) => ObservationClass::SimpleDiscrete,
            Self::String(_) => ObservationClass::String,
            Self::Tlv(_) => ObservationClass::Tlv,
            Self::CompoundDiscreteEvent(_) => ObservationClass::CompoundDiscreteEvent,
            Self::CompoundState { .. } => ObservationClass::CompoundState,
            Self::Bundle(_) => ObservationClass::Bundle,
        }
    }
}

// ── Observation ──────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub struct Observation {
    /// Handle scoped to one encoded message.
    pub id: u16,
    pub kind: ObservationType,
    pub timestamp: Timestamp,
    pub patient_id: Option<u8>,
    pub supplemental_info: Vec<ObservationType>,
    pub value: ObservationValue,
}

impl Observation {
    pub fn new(id: u16, kind: ObservationType, timestamp: Timestamp, value: ObservationValue) -> Self {
        Self {
            id,
            kind,
            timestamp,
            patient_id: None,
            supplemental_info: Vec::new(),
            value,
        }
    }

    /// Simple numeric with the type's default unit and precision.
    pub fn simple_numeric(id: u16, kind: ObservationType, value: f64, timestamp: Timestamp) -> Self {
        Self::new(
            id,
            kind,
            timestamp,
            ObservationValue::SimpleNumeric {
                value,
                precision: kind.numeric_precision(),
                unit: kind.unit(),
            },
        )
    }

    /// A typeless bundle. Children take over the bundle's timestamp.
    pub fn bundle(id: u16, timestamp: Timestamp, mut children: Vec<Observation>) -> Self {
        for child in &mut children {
            child.set_timestamp(timestamp);
        }
        Self::new(
            id,
            ObservationType::Unknown,
            timestamp,
            ObservationValue::Bundle(children),
        )
    }

    #[must_use]
    pub fn with_patient(mut self, patient_id: u8) -> Self {
        self.patient_id = Some(patient_id);
        self
    }

    #[must_use]
    pub fn with_supplemental(mut self, info: Vec<ObservationType>) -> Self {
        self.supplemental_info = info;
        self
    }

    pub fn class(&self) -> ObservationClass {
        self.value.class()
    }

    /// Unit of the numeric and sample-array variants.
    pub fn unit(&self) -> Option<UnitCode> {
        match &self.value {
            ObservationValue::SimpleNumeric { unit, .. } => Some(*unit),
            ObservationValue::SampleArray(sa) => Some(sa.unit),
            _ => None,
        }
    }

    pub fn is_bundle(&self) -> bool {
        matches!(self.value, ObservationValue::Bundle(_))
    }

    /// Unbundled wire form.
    pub fn to_bytes(&self) -> Vec<u8> {
        encode(self, false)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, DecodeError> {
        decode(bytes)
    }

    /// Mark this observation (and any bundle children) as predating the
    /// current clock timeline.
    pub fn clear_current_timeline(&mut self) {
        self.set_timestamp(self.timestamp.off_timeline());
    }

    fn set_timestamp(&mut self, timestamp: Timestamp) {
        self.timestamp = timestamp;
        if let ObservationValue::Bundle(children) = &mut self.value {
            for child in children {
                child.set_timestamp(timestamp);
            }
        }
    }
}
