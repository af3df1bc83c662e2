//! Port traits: the hexagonal boundary between the protocol core and the
//! outside world.
//!
//! ```text
//!   Adapter ──▶ Port trait ──▶ GhsService (protocol core)
//! ```
//!
//! Driven adapters (GATT transport, user registry, clock source, event
//! output) implement these traits. [`GhsService`](super::service::GhsService)
//! takes them as `impl Trait` parameters at each call site, so the core
//! never touches a radio or a system clock directly.

use core::fmt;

use super::events::ServiceEvent;

// ───────────────────────────────────────────────────────────────
// Characteristics
// ───────────────────────────────────────────────────────────────

/// Every characteristic the service reads from or writes to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Characteristic {
    /// Live observations (segmented, legacy overhead).
    Observation,
    /// Stored-record transfers (segmented, send-handler overhead).
    StoredObservation,
    /// Live observation control point.
    ControlPoint,
    /// Record access control point.
    Racp,
    /// Observation schedule descriptor, one per lazily allocated slot.
    ScheduleDescriptor(u8),
    /// Elapsed time (clock) characteristic.
    ElapsedTime,
    /// GHS Features: enabled types plus device specializations.
    Features,
}

impl fmt::Display for Characteristic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Observation => write!(f, "observation"),
            Self::StoredObservation => write!(f, "stored-observation"),
            Self::ControlPoint => write!(f, "control-point"),
            Self::Racp => write!(f, "racp"),
            Self::ScheduleDescriptor(slot) => write!(f, "schedule[{slot}]"),
            Self::ElapsedTime => write!(f, "elapsed-time"),
            Self::Features => write!(f, "features"),
        }
    }
}

// ───────────────────────────────────────────────────────────────
// Transport port (driven adapter: domain ↔ GATT server)
// ───────────────────────────────────────────────────────────────

/// Outbound side of the GATT server. Inbound writes arrive through
/// [`GhsService::deliver_write`](super::service::GhsService::deliver_write).
pub trait Transport {
    /// Notify or indicate `bytes` on `characteristic` to every subscribed
    /// central. Returns `false` when nothing was sent.
    fn notify_or_indicate(&mut self, characteristic: Characteristic, bytes: &[u8]) -> bool;

    /// Negotiated MTU of every connected central. Empty when disconnected.
    fn connected_mtus(&self) -> Vec<u16>;

    /// Whether any central enabled notify or indicate on `characteristic`.
    fn is_notify_enabled(&self, characteristic: Characteristic) -> bool;
}

// ───────────────────────────────────────────────────────────────
// User context port
// ───────────────────────────────────────────────────────────────

/// User index reported when no user is selected.
pub const UNKNOWN_USER: u8 = 0xFF;

/// Who the current requests belong to. The core never creates users.
pub trait UserContext {
    fn current_user_index(&self) -> u8;
}

// ───────────────────────────────────────────────────────────────
// Time port
// ───────────────────────────────────────────────────────────────

/// Clock source consumed by [`Clock`](crate::clock::Clock).
pub trait TimePort {
    /// Monotonic milliseconds since some fixed point. Never goes backwards.
    fn monotonic_millis(&self) -> u64;

    /// Wall-clock Unix epoch milliseconds (UTC).
    fn system_utc_millis(&self) -> i64;

    /// Local timezone plus DST offset in milliseconds.
    fn local_offset_millis(&self) -> i64;
}

// ───────────────────────────────────────────────────────────────
// Event sink port (driven adapter: domain → logging / telemetry)
// ───────────────────────────────────────────────────────────────

/// The core emits structured [`ServiceEvent`]s through this port.
/// Adapters decide where they go.
pub trait EventSink {
    fn emit(&mut self, event: &ServiceEvent);
}
