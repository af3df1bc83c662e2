//! Inbound commands to the service.
//!
//! These represent actions requested by the operator side of the device
//! (simulator console, UI) that the [`GhsService`](super::service::GhsService)
//! interprets and acts upon. Client GATT writes do not go through here.

use crate::observation::ObservationType;

/// Commands that external adapters can send into the service core.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceCommand {
    /// Begin periodic emission.
    StartEmitter,

    /// Cancel periodic emission before its next tick.
    StopEmitter,

    /// Run one emission tick now.
    SingleShot,

    /// Generate one round of observations straight into the store.
    AddStoredObservation,

    /// Enable a type. Clears the store and seeds a 1 s / 1 s schedule.
    AddObservationType(ObservationType),

    /// Disable a type. Clears the store.
    RemoveObservationType(ObservationType),

    SetBundled(bool),

    ClearStore,

    SetClockToSystemTime,

    /// Shift the clock by this many milliseconds.
    AdjustClock(i64),
}
