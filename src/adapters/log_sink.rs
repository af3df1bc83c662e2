//! Log-based event sink adapter.
//!
//! Implements [`EventSink`] by writing structured service events through
//! the `log` facade. The simulator pairs it with a tracing subscriber; a
//! UI or telemetry adapter would implement the same trait.

use log::info;

use crate::app::events::ServiceEvent;
use crate::app::ports::EventSink;

/// Adapter that logs every [`ServiceEvent`] and counts them.
#[derive(Debug, Default)]
pub struct LogEventSink {
    emitted: usize,
}

impl LogEventSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Events logged so far.
    pub fn emitted(&self) -> usize {
        self.emitted
    }
}

impl EventSink for LogEventSink {
    fn emit(&mut self, event: &ServiceEvent) {
        self.emitted += 1;
        match event {
            ServiceEvent::LiveObservationsStarted => info!("LIVE  | streaming"),
            ServiceEvent::LiveObservationsStopped => info!("LIVE  | idle"),
            ServiceEvent::ObservationsSent {
                observations,
                segments,
            } => {
                info!("LIVE  | sent {} observations in {} segments", observations, segments);
            }
            ServiceEvent::ObservationsStored { user, observations } => {
                info!("STORE | user {} +{} observations", user, observations);
            }
            ServiceEvent::ObservationsDropped(n) => {
                info!("LIVE  | {} observations dropped (not streaming)", n);
            }
            ServiceEvent::ScheduleChanged(entry) => {
                info!(
                    "SCHED | {} period={}s interval={}s",
                    entry.kind, entry.measurement_period_secs, entry.update_interval_secs
                );
            }
            ServiceEvent::ClockChanged(source) => info!("CLOCK | changed, source={}", source),
            ServiceEvent::StoredTransferStarted { user, records } => {
                info!("RACP  | user {} transfer of {} records started", user, records);
            }
            ServiceEvent::StoredTransferComplete { sent } => {
                info!("RACP  | transfer complete, {} records", sent);
            }
            ServiceEvent::StoredTransferAborted { sent } => {
                info!("RACP  | transfer aborted after {} records", sent);
            }
            ServiceEvent::EmitterStarted(period) => {
                info!("EMIT  | started, period={}ms", period.as_millis());
            }
            ServiceEvent::EmitterStopped => info!("EMIT  | stopped"),
            ServiceEvent::FeaturesChanged(types) => info!("GHS   | features now list {} types", types),
        }
    }
}
