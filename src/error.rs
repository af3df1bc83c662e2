//! Unified error types for the GHS peripheral engine.
//!
//! A single `Error` enum that every subsystem converts into, plus the
//! per-subsystem enums that handlers match on. All variants are `Copy` so
//! they can be passed back through the request boundary without allocation.
//! None of these terminate anything: each maps onto a GATT status or a
//! protocol response frame at the edge.

use core::fmt;

// ---------------------------------------------------------------------------
// Top-level error
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// Observation or timestamp bytes could not be decoded.
    Decode(DecodeError),
    /// A clock write was rejected.
    Clock(ClockError),
    /// A schedule descriptor write was rejected.
    Schedule(ScheduleError),
    /// A received segment could not be reassembled.
    Segment(SegmentError),
    /// Configuration is invalid.
    Config(&'static str),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Decode(e) => write!(f, "decode: {e}"),
            Self::Clock(e) => write!(f, "clock: {e}"),
            Self::Schedule(e) => write!(f, "schedule: {e}"),
            Self::Segment(e) => write!(f, "segment: {e}"),
            Self::Config(msg) => write!(f, "config: {msg}"),
        }
    }
}

impl std::error::Error for Error {}

// ---------------------------------------------------------------------------
// Decode errors
// ---------------------------------------------------------------------------

/// Hard decode failures. Attribute code/length mismatches are not errors;
/// the decoder logs them and carries on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeError {
    /// The buffer ended before a field could be read.
    Truncated { needed: usize, available: usize },
    /// The class byte names no decodable observation class.
    UnsupportedClass(u8),
    /// Bundles nest deeper than the decoder follows.
    NestedTooDeep(u8),
}

impl fmt::Display for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Truncated { needed, available } => {
                write!(f, "buffer truncated (needed {needed} bytes, {available} left)")
            }
            Self::UnsupportedClass(class) => write!(f, "unsupported observation class 0x{class:02x}"),
            Self::NestedTooDeep(depth) => write!(f, "bundle nesting exceeds {depth} levels"),
        }
    }
}

impl From<DecodeError> for Error {
    fn from(e: DecodeError) -> Self {
        Self::Decode(e)
    }
}

// ---------------------------------------------------------------------------
// Clock errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClockError {
    /// Fewer than the 8 timestamp bytes were written.
    Truncated,
    /// The write's tick/UTC/TZ/resolution bits differ from the configured flags.
    FlagMismatch { written: u8, configured: u8 },
}

impl fmt::Display for ClockError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Truncated => write!(f, "timestamp write truncated"),
            Self::FlagMismatch {
                written,
                configured,
            } => write!(
                f,
                "timestamp flags 0b{written:08b} do not match configured 0b{configured:08b}"
            ),
        }
    }
}

impl From<ClockError> for Error {
    fn from(e: ClockError) -> Self {
        Self::Clock(e)
    }
}

// ---------------------------------------------------------------------------
// Schedule errors
// ---------------------------------------------------------------------------

/// Every variant is a `VALUE_OUT_OF_RANGE`-class rejection on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScheduleError {
    /// The descriptor already pins a different observation type.
    TypeMismatch,
    /// Measurement period outside `[0, 60]` seconds.
    PeriodOutOfRange,
    /// Update interval outside `[1, 60]` seconds.
    IntervalOutOfRange,
    /// The descriptor write was shorter than type + period + interval.
    Truncated,
    /// No descriptor slot with that id.
    UnknownSlot,
}

impl fmt::Display for ScheduleError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TypeMismatch => write!(f, "observation type does not match descriptor"),
            Self::PeriodOutOfRange => write!(f, "measurement period out of range"),
            Self::IntervalOutOfRange => write!(f, "update interval out of range"),
            Self::Truncated => write!(f, "schedule write truncated"),
            Self::UnknownSlot => write!(f, "unknown schedule descriptor"),
        }
    }
}

impl From<ScheduleError> for Error {
    fn from(e: ScheduleError) -> Self {
        Self::Schedule(e)
    }
}

// ---------------------------------------------------------------------------
// Segment reassembly errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SegmentError {
    /// Zero-length write (no header byte).
    Empty,
    /// A continuation segment arrived with no message in progress.
    NoStart,
    /// The sequence number did not follow the previous segment.
    Sequence { expected: u8, got: u8 },
    /// The reassembled message would exceed the assembler's limit.
    Overflow,
}

impl fmt::Display for SegmentError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Empty => write!(f, "empty segment"),
            Self::NoStart => write!(f, "continuation without first segment"),
            Self::Sequence { expected, got } => {
                write!(f, "sequence error (expected {expected}, got {got})")
            }
            Self::Overflow => write!(f, "reassembly overflow"),
        }
    }
}

impl From<SegmentError> for Error {
    fn from(e: SegmentError) -> Self {
        Self::Segment(e)
    }
}

// ---------------------------------------------------------------------------
// GATT status codes returned to the transport
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum GattStatus {
    Success = 0x00,
    /// Also used as "command not supported" by the control point.
    InternalError = 0x81,
    /// The client characteristic configuration does not allow this write.
    CccdCfgError = 0xFD,
    ValueOutOfRange = 0xFF,
}

impl GattStatus {
    pub const COMMAND_NOT_SUPPORTED: Self = Self::InternalError;

    pub const fn code(self) -> u8 {
        self as u8
    }

    pub const fn is_success(self) -> bool {
        matches!(self, Self::Success)
    }
}

impl fmt::Display for GattStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Success => write!(f, "success"),
            Self::InternalError => write!(f, "internal error / command not supported"),
            Self::CccdCfgError => write!(f, "CCCD improperly configured"),
            Self::ValueOutOfRange => write!(f, "value out of range"),
        }
    }
}

impl From<ScheduleError> for GattStatus {
    fn from(_: ScheduleError) -> Self {
        Self::ValueOutOfRange
    }
}

impl From<ClockError> for GattStatus {
    fn from(_: ClockError) -> Self {
        Self::InternalError
    }
}

// ---------------------------------------------------------------------------
// Convenience Result alias
// ---------------------------------------------------------------------------

pub type Result<T> = core::result::Result<T, Error>;
