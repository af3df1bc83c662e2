//! GHS service: the hexagonal core.
//!
//! [`GhsService`] owns the clock, observation store, schedule negotiator,
//! control point, RACP engine and emitter. Every inbound GATT write and
//! every emission tick goes through it; all I/O flows through port traits
//! injected at call sites, so the whole service runs against mocks.
//!
//! ```text
//!  deliver_write ──▶ ┌──────────────────────────────┐ ──▶ Transport
//!  emit_tick     ──▶ │          GhsService           │ ──▶ EventSink
//!  pump_stored   ──▶ │ Clock · Store · Schedule      │
//!  handle_command──▶ │ ControlPoint · RACP · Emitter │ ◀── UserContext
//!                    └──────────────────────────────┘
//! ```
//!
//! Live observations use the legacy segment overhead and their own
//! sequence counter; stored-record transfers use the send-handler overhead
//! and a second counter. Both restart at 1 on disconnect.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use log::{debug, info, warn};

use crate::clock::Clock;
use crate::config::ServiceConfig;
use crate::control_point::ControlPoint;
use crate::emitter::ObservationEmitter;
use crate::error::GattStatus;
use crate::features;
use crate::observation::{Observation, encode_stored};
use crate::racp::{RacpAction, RacpEngine, TransferKind};
use crate::schedule::{ScheduleNegotiator, SlotId};
use crate::segment::{
    INITIAL_SEQUENCE, LEGACY_OVERHEAD, SEND_HANDLER_OVERHEAD, max_payload_for, segment,
};
use crate::store::{ObservationRecord, ObservationStore};

use super::commands::ServiceCommand;
use super::events::ServiceEvent;
use super::ports::{Characteristic, EventSink, TimePort, Transport, UserContext};

/// What the runtime's emitter task should do next.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmitterDirective {
    Start(Duration),
    Stop,
    Reschedule(Duration),
}

struct StoredTransfer {
    kind: TransferKind,
    user: u8,
    pending: VecDeque<ObservationRecord>,
    sent: usize,
}

// ───────────────────────────────────────────────────────────────
// GhsService
// ───────────────────────────────────────────────────────────────

pub struct GhsService<C: TimePort> {
    config: ServiceConfig,
    clock: Clock<C>,
    store: Arc<ObservationStore>,
    schedule: ScheduleNegotiator,
    control_point: ControlPoint,
    racp: RacpEngine,
    emitter: ObservationEmitter,
    emitter_running: bool,
    directive: Option<EmitterDirective>,
    live_sequence: u8,
    stored_sequence: u8,
    transfer: Option<StoredTransfer>,
}

impl<C: TimePort> GhsService<C> {
    /// Build the service. The store subscribes to clock changes here.
    pub fn new(config: ServiceConfig, time: C) -> Self {
        let mut clock = Clock::new(time, config.timestamp_flags, config.time_source);
        let store = Arc::new(ObservationStore::new());
        clock.add_listener(store.clone());

        let types = config.observation_types();
        let mut schedule = ScheduleNegotiator::new();
        for &kind in &types {
            schedule.descriptor_for(kind);
        }
        let emitter = ObservationEmitter::new(
            &types,
            config.bundle_observations,
            u64::from(config.emitter_period_ms),
        );

        info!(
            "GHS: service up, {} types, flags {}",
            types.len(),
            config.timestamp_flags
        );
        Self {
            racp: RacpEngine::new(Arc::clone(&store)),
            config,
            clock,
            store,
            schedule,
            control_point: ControlPoint::new(),
            emitter,
            emitter_running: false,
            directive: None,
            live_sequence: INITIAL_SEQUENCE,
            stored_sequence: INITIAL_SEQUENCE,
            transfer: None,
        }
    }

    // ── Inbound writes ────────────────────────────────────────

    /// Dispatch one client write and return the GATT status to answer with.
    pub fn deliver_write(
        &mut self,
        characteristic: Characteristic,
        bytes: &[u8],
        transport: &mut impl Transport,
        users: &impl UserContext,
        sink: &mut impl EventSink,
    ) -> GattStatus {
        debug!("GHS: write {} {:02x?}", characteristic, bytes);
        match characteristic {
            Characteristic::ControlPoint => self.write_control_point(bytes, transport, sink),
            Characteristic::ScheduleDescriptor(slot) => {
                self.write_schedule(slot, bytes, transport, sink)
            }
            Characteristic::Racp => self.write_racp(bytes, transport, users, sink),
            Characteristic::ElapsedTime => self.write_clock(bytes, sink),
            Characteristic::Observation
            | Characteristic::StoredObservation
            | Characteristic::Features => {
                warn!("GHS: {} is not writable", characteristic);
                GattStatus::COMMAND_NOT_SUPPORTED
            }
        }
    }

    /// Current value of a readable characteristic.
    pub fn read(&self, characteristic: Characteristic) -> Option<Vec<u8>> {
        match characteristic {
            Characteristic::ElapsedTime => Some(self.clock.encode(self.clock.flags()).to_vec()),
            Characteristic::ScheduleDescriptor(slot) => self.schedule.descriptor_bytes(slot),
            Characteristic::Features => Some(features::encode(self.emitter.types())),
            _ => None,
        }
    }

    fn write_control_point(
        &mut self,
        bytes: &[u8],
        transport: &mut impl Transport,
        sink: &mut impl EventSink,
    ) -> GattStatus {
        let live_enabled = transport.is_notify_enabled(Characteristic::Observation);
        let status = ControlPoint::write_status(bytes, live_enabled);
        if !status.is_success() {
            return status;
        }
        let was_streaming = self.control_point.transmit_enabled();
        if let Some(response) = self.control_point.handle(bytes) {
            transport.notify_or_indicate(Characteristic::ControlPoint, &response);
        }
        match (was_streaming, self.control_point.transmit_enabled()) {
            (false, true) => {
                self.live_sequence = INITIAL_SEQUENCE;
                sink.emit(&ServiceEvent::LiveObservationsStarted);
            }
            (true, false) => sink.emit(&ServiceEvent::LiveObservationsStopped),
            _ => {}
        }
        status
    }

    fn write_schedule(
        &mut self,
        slot: SlotId,
        bytes: &[u8],
        transport: &mut impl Transport,
        sink: &mut impl EventSink,
    ) -> GattStatus {
        match self.schedule.write_descriptor(slot, bytes) {
            Ok(entry) => {
                self.emitter
                    .set_update_interval(entry.kind, entry.update_interval_millis());
                self.reschedule();
                transport.notify_or_indicate(
                    Characteristic::ScheduleDescriptor(slot),
                    &entry.to_bytes(),
                );
                sink.emit(&ServiceEvent::ScheduleChanged(entry));
                GattStatus::Success
            }
            Err(e) => GattStatus::from(e),
        }
    }

    fn write_racp(
        &mut self,
        bytes: &[u8],
        transport: &mut impl Transport,
        users: &impl UserContext,
        sink: &mut impl EventSink,
    ) -> GattStatus {
        if !transport.is_notify_enabled(Characteristic::Racp) {
            return GattStatus::CccdCfgError;
        }
        let user = users.current_user_index();
        match self.racp.handle(user, bytes, self.transfer.is_some()) {
            RacpAction::Respond(response) => {
                transport.notify_or_indicate(Characteristic::Racp, &response);
            }
            RacpAction::StartTransfer { kind, records } => {
                sink.emit(&ServiceEvent::StoredTransferStarted {
                    user,
                    records: records.len(),
                });
                self.stored_sequence = INITIAL_SEQUENCE;
                self.transfer = Some(StoredTransfer {
                    kind,
                    user,
                    pending: records.into(),
                    sent: 0,
                });
            }
            RacpAction::Abort(response) => {
                self.abort_stored_transfer(sink);
                transport.notify_or_indicate(Characteristic::Racp, &response);
            }
            RacpAction::Ignore => {}
        }
        GattStatus::Success
    }

    fn write_clock(&mut self, bytes: &[u8], sink: &mut impl EventSink) -> GattStatus {
        match self.clock.write(bytes) {
            Ok(()) => {
                sink.emit(&ServiceEvent::ClockChanged(self.clock.state().time_source));
                GattStatus::Success
            }
            Err(e) => GattStatus::from(e),
        }
    }

    // ── Emission ──────────────────────────────────────────────

    /// One emission tick. Returns how many observations were generated.
    pub fn emit_tick(
        &mut self,
        transport: &mut impl Transport,
        users: &impl UserContext,
        sink: &mut impl EventSink,
    ) -> usize {
        let observations = self.emitter.generate(self.clock.timestamp());
        let count = observations.len();
        if count == 0 {
            return 0;
        }

        let mtus = transport.connected_mtus();
        if mtus.is_empty() {
            self.store_observations(observations, users, sink);
        } else if self.control_point.transmit_enabled()
            && transport.is_notify_enabled(Characteristic::Observation)
        {
            self.send_live(&observations, &mtus, transport, sink);
        } else {
            debug!("GHS: connected but not streaming, {} observations dropped", count);
            sink.emit(&ServiceEvent::ObservationsDropped(count));
        }
        count
    }

    fn store_observations(
        &mut self,
        observations: Vec<Observation>,
        users: &impl UserContext,
        sink: &mut impl EventSink,
    ) {
        let user = users.current_user_index();
        let count = observations.len();
        for obs in observations {
            self.store.add(user, obs);
        }
        sink.emit(&ServiceEvent::ObservationsStored {
            user,
            observations: count,
        });
    }

    fn send_live(
        &mut self,
        observations: &[Observation],
        mtus: &[u16],
        transport: &mut impl Transport,
        sink: &mut impl EventSink,
    ) {
        let max_payload = max_payload_for(mtus, LEGACY_OVERHEAD)
            .unwrap_or(usize::from(self.config.default_mtu).saturating_sub(LEGACY_OVERHEAD));
        let mut sent_segments = 0;
        for obs in observations {
            let (segments, next) = segment(&obs.to_bytes(), max_payload, self.live_sequence);
            self.live_sequence = next;
            for seg in &segments {
                if !transport.notify_or_indicate(Characteristic::Observation, &seg.to_bytes()) {
                    warn!("GHS: live segment {} not delivered", seg.sequence());
                }
            }
            sent_segments += segments.len();
        }
        sink.emit(&ServiceEvent::ObservationsSent {
            observations: observations.len(),
            segments: sent_segments,
        });
    }

    // ── Stored transfers ──────────────────────────────────────

    /// Send the next record of the in-flight transfer. Returns `true` while
    /// more work remains.
    pub fn pump_stored(&mut self, transport: &mut impl Transport, sink: &mut impl EventSink) -> bool {
        let Some(transfer) = self.transfer.as_mut() else {
            return false;
        };

        let mtus = transport.connected_mtus();
        if mtus.is_empty() {
            warn!("GHS: central gone during stored transfer");
            self.abort_stored_transfer(sink);
            return false;
        }

        if let Some(record) = transfer.pending.pop_front() {
            let bytes = encode_stored(record.record_number, &record.observation);
            let max_payload = max_payload_for(&mtus, SEND_HANDLER_OVERHEAD)
                .unwrap_or(usize::from(self.config.default_mtu).saturating_sub(SEND_HANDLER_OVERHEAD));
            let (segments, next) = segment(&bytes, max_payload, self.stored_sequence);
            self.stored_sequence = next;
            for seg in &segments {
                transport.notify_or_indicate(Characteristic::StoredObservation, &seg.to_bytes());
            }
            transfer.sent += 1;
            debug!(
                "GHS: user {} record {} sent ({} segments)",
                transfer.user,
                record.record_number,
                segments.len()
            );
            return true;
        }

        // Queue drained; close out with the RACP completion.
        let kind = transfer.kind;
        let sent = transfer.sent;
        self.transfer = None;
        transport.notify_or_indicate(Characteristic::Racp, &RacpEngine::completion(kind, sent));
        info!("GHS: stored transfer complete, {} records", sent);
        sink.emit(&ServiceEvent::StoredTransferComplete { sent });
        false
    }

    /// Cancel the in-flight stored transfer. Returns whether one was running.
    pub fn abort_stored_transfer(&mut self, sink: &mut impl EventSink) -> bool {
        match self.transfer.take() {
            Some(transfer) => {
                info!("GHS: stored transfer aborted after {} records", transfer.sent);
                sink.emit(&ServiceEvent::StoredTransferAborted {
                    sent: transfer.sent,
                });
                true
            }
            None => false,
        }
    }

    pub fn transfer_in_flight(&self) -> bool {
        self.transfer.is_some()
    }

    /// Every central disconnected.
    pub fn on_disconnected(&mut self, sink: &mut impl EventSink) {
        self.live_sequence = INITIAL_SEQUENCE;
        self.stored_sequence = INITIAL_SEQUENCE;
        if self.control_point.transmit_enabled() {
            self.control_point.reset();
            sink.emit(&ServiceEvent::LiveObservationsStopped);
        }
        self.abort_stored_transfer(sink);
    }

    // ── Command handling ──────────────────────────────────────

    /// Process an operator command.
    pub fn handle_command(
        &mut self,
        cmd: ServiceCommand,
        transport: &mut impl Transport,
        users: &impl UserContext,
        sink: &mut impl EventSink,
    ) {
        match cmd {
            ServiceCommand::StartEmitter => {
                let period = self.emitter.period();
                self.emitter_running = true;
                self.directive = Some(EmitterDirective::Start(period));
                sink.emit(&ServiceEvent::EmitterStarted(period));
            }
            ServiceCommand::StopEmitter => {
                self.emitter_running = false;
                self.directive = Some(EmitterDirective::Stop);
                sink.emit(&ServiceEvent::EmitterStopped);
            }
            ServiceCommand::SingleShot => {
                self.emit_tick(transport, users, sink);
            }
            ServiceCommand::AddStoredObservation => {
                let observations = self.emitter.generate(self.clock.timestamp());
                self.store_observations(observations, users, sink);
            }
            ServiceCommand::AddObservationType(kind) => {
                self.emitter.add_type(kind);
                self.store.clear();
                match self.schedule.configure(kind, 1.0, 1.0) {
                    Ok(entry) => {
                        self.emitter
                            .set_update_interval(kind, entry.update_interval_millis());
                        sink.emit(&ServiceEvent::ScheduleChanged(entry));
                    }
                    Err(e) => warn!("GHS: default schedule for {} rejected: {}", kind, e),
                }
                self.reschedule();
                self.indicate_features(transport, sink);
            }
            ServiceCommand::RemoveObservationType(kind) => {
                self.emitter.remove_type(kind);
                self.schedule.forget(kind);
                self.store.clear();
                self.reschedule();
                self.indicate_features(transport, sink);
            }
            ServiceCommand::SetBundled(bundled) => self.emitter.set_bundled(bundled),
            ServiceCommand::ClearStore => self.store.clear(),
            ServiceCommand::SetClockToSystemTime => {
                self.clock.set_to_system_time();
                sink.emit(&ServiceEvent::ClockChanged(self.clock.state().time_source));
            }
            ServiceCommand::AdjustClock(delta) => {
                self.clock.adjust_millis(delta);
                sink.emit(&ServiceEvent::ClockChanged(self.clock.state().time_source));
            }
        }
    }

    /// Pending instruction for the emitter task, if any.
    pub fn take_emitter_directive(&mut self) -> Option<EmitterDirective> {
        self.directive.take()
    }

    /// Push the refreshed Features value to subscribed centrals.
    fn indicate_features(&self, transport: &mut impl Transport, sink: &mut impl EventSink) {
        let types = self.emitter.types();
        if transport.is_notify_enabled(Characteristic::Features) {
            transport.notify_or_indicate(Characteristic::Features, &features::encode(types));
        }
        sink.emit(&ServiceEvent::FeaturesChanged(types.len()));
    }

    fn reschedule(&mut self) {
        if self.emitter_running {
            self.directive = Some(EmitterDirective::Reschedule(self.emitter.period()));
        }
    }

    // ── Queries ───────────────────────────────────────────────

    pub fn config(&self) -> &ServiceConfig {
        &self.config
    }

    pub fn clock(&self) -> &Clock<C> {
        &self.clock
    }

    pub fn clock_mut(&mut self) -> &mut Clock<C> {
        &mut self.clock
    }

    pub fn store(&self) -> &Arc<ObservationStore> {
        &self.store
    }

    pub fn schedule(&self) -> &ScheduleNegotiator {
        &self.schedule
    }

    pub fn control_point(&self) -> &ControlPoint {
        &self.control_point
    }

    pub fn emitter(&self) -> &ObservationEmitter {
        &self.emitter
    }

    pub fn is_emitter_running(&self) -> bool {
        self.emitter_running
    }

    pub fn emitter_period(&self) -> Duration {
        self.emitter.period()
    }
}
