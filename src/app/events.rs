//! Outbound service events.
//!
//! The [`GhsService`](super::service::GhsService) emits these through the
//! [`EventSink`](super::ports::EventSink) port. Adapters on the other side
//! decide what to do with them.

use std::time::Duration;

use crate::clock::TimeSource;
use crate::schedule::ScheduleEntry;

/// Structured events emitted by the service core.
#[derive(Debug, Clone, PartialEq)]
pub enum ServiceEvent {
    /// The control point switched to streaming.
    LiveObservationsStarted,

    /// The control point switched back to idle.
    LiveObservationsStopped,

    /// Live observations were notified.
    ObservationsSent { observations: usize, segments: usize },

    /// No central was connected; observations went to the store.
    ObservationsStored { user: u8, observations: usize },

    /// Connected but not streaming; observations were discarded.
    ObservationsDropped(usize),

    /// A schedule descriptor was (re)negotiated.
    ScheduleChanged(ScheduleEntry),

    /// The clock was written, adjusted or resynced.
    ClockChanged(TimeSource),

    StoredTransferStarted { user: u8, records: usize },

    StoredTransferComplete { sent: usize },

    StoredTransferAborted { sent: usize },

    EmitterStarted(Duration),

    /// The advertised type list changed; carries the new type count.
    FeaturesChanged(usize),

    EmitterStopped,
}
