//! Observation type codes and the value class each one is sent as.

use core::fmt;

use serde::{Deserialize, Serialize};

use super::units::UnitCode;

/// MDC nomenclature codes the service knows how to emit.
///
/// Codes outside this table decode to [`ObservationType::Unknown`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ObservationType {
    HeartRate,
    SpO2,
    PulseRate,
    BodyTemperature,
    OralTemperature,
    BloodPressureNonInvasive,
    BloodPressureSystolic,
    BloodPressureDiastolic,
    Ppg,
    AlertType,
    DrugNameLabel,
    DoseDrugDelivered,
    DoseDrugBolus,
    Unknown,
}

impl ObservationType {
    /// Every known type, `Unknown` excluded.
    pub const ALL: [Self; 13] = [
        Self::HeartRate,
        Self::SpO2,
        Self::PulseRate,
        Self::BodyTemperature,
        Self::OralTemperature,
        Self::BloodPressureNonInvasive,
        Self::BloodPressureSystolic,
        Self::BloodPressureDiastolic,
        Self::Ppg,
        Self::AlertType,
        Self::DrugNameLabel,
        Self::DoseDrugDelivered,
        Self::DoseDrugBolus,
    ];

    pub const fn code(self) -> u32 {
        match self {
            Self::HeartRate => 0x0002_4182,
            Self::SpO2 => 0x0002_4BB8,
            Self::PulseRate => 0x0002_481A,
            Self::BodyTemperature => 0x0002_4B5C,
            Self::OralTemperature => 0x0002_E008,
            Self::BloodPressureNonInvasive => 0x0002_4A04,
            Self::BloodPressureSystolic => 0x0002_4A05,
            Self::BloodPressureDiastolic => 0x0002_4A06,
            Self::Ppg => 0x0002_4BB4,
            Self::AlertType => 0x0001_09D6,
            Self::DrugNameLabel => 0x0002_E3C0,
            Self::DoseDrugDelivered => 0x0002_E3C4,
            Self::DoseDrugBolus => 0x0002_E3C8,
            Self::Unknown => 0xFFFF_FFFF,
        }
    }

    pub fn from_code(code: u32) -> Self {
        Self::ALL
            .into_iter()
            .find(|t| t.code() == code)
            .unwrap_or(Self::Unknown)
    }

    pub const fn value_class(self) -> ObservationClass {
        match self {
            Self::HeartRate
            | Self::SpO2
            | Self::PulseRate
            | Self::BodyTemperature
            | Self::OralTemperature => ObservationClass::SimpleNumeric,
            Self::Ppg => ObservationClass::SampleArray,
            Self::BloodPressureNonInvasive => ObservationClass::CompoundNumeric,
            Self::AlertType => ObservationClass::SimpleDiscrete,
            Self::DrugNameLabel => ObservationClass::String,
            Self::DoseDrugDelivered => ObservationClass::Tlv,
            _ => ObservationClass::Unknown,
        }
    }

    /// Decimal digits sent for numeric values of this type.
    pub const fn numeric_precision(self) -> u8 {
        match self {
            Self::BodyTemperature | Self::OralTemperature | Self::SpO2 => 1,
            _ => 0,
        }
    }

    pub const fn unit(self) -> UnitCode {
        match self {
            Self::HeartRate | Self::PulseRate => UnitCode::Bpm,
            Self::SpO2 => UnitCode::Percent,
            Self::BodyTemperature | Self::OralTemperature => UnitCode::Celsius,
            Self::BloodPressureNonInvasive
            | Self::BloodPressureSystolic
            | Self::BloodPressureDiastolic => UnitCode::MmHg,
            Self::Ppg => UnitCode::Dimensionless,
            Self::DoseDrugDelivered | Self::DoseDrugBolus => UnitCode::MilliGram,
            _ => UnitCode::Unknown,
        }
    }

    /// Plausible `(min, max)` for generated samples.
    pub const fn sample_range(self) -> (f64, f64) {
        match self {
            Self::HeartRate | Self::PulseRate => (60.0, 90.0),
            Self::SpO2 => (95.0, 99.0),
            Self::BodyTemperature | Self::OralTemperature => (36.2, 37.4),
            Self::BloodPressureSystolic | Self::BloodPressureNonInvasive => (110.0, 130.0),
            Self::BloodPressureDiastolic => (70.0, 85.0),
            Self::Ppg => (0.0, 127.0),
            Self::DoseDrugDelivered | Self::DoseDrugBolus => (1.0, 5.0),
            _ => (0.0, 0.0),
        }
    }
}

impl fmt::Display for ObservationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::HeartRate => "heart rate",
            Self::SpO2 => "SpO2",
            Self::PulseRate => "pulse rate",
            Self::BodyTemperature => "body temperature",
            Self::OralTemperature => "oral temperature",
            Self::BloodPressureNonInvasive => "blood pressure",
            Self::BloodPressureSystolic => "systolic",
            Self::BloodPressureDiastolic => "diastolic",
            Self::Ppg => "PPG",
            Self::AlertType => "alert",
            Self::DrugNameLabel => "drug name",
            Self::DoseDrugDelivered => "dose delivered",
            Self::DoseDrugBolus => "bolus dose",
            Self::Unknown => "unknown",
        };
        f.write_str(name)
    }
}

// ── Observation class ────────────────────────────────────────

/// Leading class byte of every encoded observation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ObservationClass {
    SimpleNumeric = 0x00,
    SimpleDiscrete = 0x02,
    String = 0x03,
    SampleArray = 0x04,
    CompoundDiscreteEvent = 0x05,
    CompoundState = 0x06,
    CompoundNumeric = 0x07,
    Tlv = 0x08,
    Unknown = 0xF0,
    Bundle = 0xFF,
}

impl ObservationClass {
    pub const fn as_u8(self) -> u8 {
        self as u8
    }

    pub const fn from_u8(value: u8) -> Self {
        match value {
            0x00 => Self::SimpleNumeric,
            0x02 => Self::SimpleDiscrete,
            0x03 => Self::String,
            0x04 => Self::SampleArray,
            0x05 => Self::CompoundDiscreteEvent,
            0x06 => Self::CompoundState,
            0x07 => Self::CompoundNumeric,
            0x08 => Self::Tlv,
            0xFF => Self::Bundle,
            _ => Self::Unknown,
        }
    }
}
