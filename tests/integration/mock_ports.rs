//! Mock port adapters for integration tests.
//!
//! Records every notification and event so tests can assert on the full
//! history without a GATT server.

use std::collections::HashSet;

use ghs_peripheral::adapters::time::ManualTime;
use ghs_peripheral::app::events::ServiceEvent;
use ghs_peripheral::app::ports::{Characteristic, EventSink, Transport, UserContext};
use ghs_peripheral::app::service::GhsService;
use ghs_peripheral::clock::EPOCH_2000_UNIX_MILLIS;
use ghs_peripheral::config::ServiceConfig;
use ghs_peripheral::observation::{Observation, decode, decode_stored};
use ghs_peripheral::segment::SegmentAssembler;

/// One day past 2000-01-01.
pub const START_UTC_MILLIS: i64 = EPOCH_2000_UNIX_MILLIS + 86_400_000;

// ── MockTransport ─────────────────────────────────────────────

#[derive(Default)]
pub struct MockTransport {
    pub mtus: Vec<u16>,
    pub enabled: HashSet<Characteristic>,
    pub sent: Vec<(Characteristic, Vec<u8>)>,
}

#[allow(dead_code)]
impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Connected with `mtu` and every notifying characteristic enabled.
    pub fn connected(mtu: u16) -> Self {
        let mut t = Self::new();
        t.mtus.push(mtu);
        for c in [
            Characteristic::Observation,
            Characteristic::StoredObservation,
            Characteristic::ControlPoint,
            Characteristic::Racp,
        ] {
            t.enabled.insert(c);
        }
        t
    }

    pub fn on(&self, characteristic: Characteristic) -> Vec<Vec<u8>> {
        self.sent
            .iter()
            .filter(|(c, _)| *c == characteristic)
            .map(|(_, b)| b.clone())
            .collect()
    }

    pub fn last_on(&self, characteristic: Characteristic) -> Option<Vec<u8>> {
        self.on(characteristic).pop()
    }

    /// Reassemble and decode everything sent on the live characteristic.
    pub fn live_observations(&self) -> Vec<Observation> {
        let mut asm = SegmentAssembler::new();
        self.on(Characteristic::Observation)
            .iter()
            .filter_map(|seg| asm.feed(seg).unwrap())
            .map(|msg| decode(&msg).unwrap())
            .collect()
    }

    /// Reassemble and decode everything sent on the stored characteristic.
    pub fn stored_records(&self) -> Vec<(u32, Observation)> {
        let mut asm = SegmentAssembler::new();
        self.on(Characteristic::StoredObservation)
            .iter()
            .filter_map(|seg| asm.feed(seg).unwrap())
            .map(|msg| decode_stored(&msg).unwrap())
            .collect()
    }
}

impl Transport for MockTransport {
    fn notify_or_indicate(&mut self, characteristic: Characteristic, bytes: &[u8]) -> bool {
        if self.mtus.is_empty() || !self.enabled.contains(&characteristic) {
            return false;
        }
        self.sent.push((characteristic, bytes.to_vec()));
        true
    }

    fn connected_mtus(&self) -> Vec<u16> {
        self.mtus.clone()
    }

    fn is_notify_enabled(&self, characteristic: Characteristic) -> bool {
        self.enabled.contains(&characteristic)
    }
}

// ── FixedUser ─────────────────────────────────────────────────

pub struct FixedUser(pub u8);

impl UserContext for FixedUser {
    fn current_user_index(&self) -> u8 {
        self.0
    }
}

// ── RecordingSink ─────────────────────────────────────────────

#[derive(Default)]
pub struct RecordingSink {
    pub events: Vec<ServiceEvent>,
}

#[allow(dead_code)]
impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, event: &ServiceEvent) -> bool {
        self.events.contains(event)
    }
}

impl EventSink for RecordingSink {
    fn emit(&mut self, event: &ServiceEvent) {
        self.events.push(event.clone());
    }
}

// ── Service factory ───────────────────────────────────────────

#[allow(dead_code)]
pub fn make_service(config: ServiceConfig) -> (GhsService<ManualTime>, ManualTime) {
    let time = ManualTime::new(1_000, START_UTC_MILLIS, 0);
    (GhsService::new(config, time.clone()), time)
}
