//! Loopback GATT transport: an in-process stand-in for the radio.
//!
//! Records every notification the service sends and reassembles the
//! segmented observation streams the way a central would:
//!
//! ```text
//!  GhsService ──notify──▶ LoopbackTransport ──▶ log of (characteristic, bytes)
//!                               │
//!                               ├─ live assembler   ──▶ decoded observations
//!                               └─ stored assembler ──▶ decoded (record, observation)
//! ```
//!
//! Centrals are modelled only by their MTU; CCCD state is shared.

use std::collections::HashSet;

use log::{info, warn};

use crate::app::ports::{Characteristic, Transport};
use crate::observation::{Observation, decode, decode_stored};
use crate::segment::SegmentAssembler;

/// Notifications kept before the oldest are discarded.
const MAX_LOGGED_NOTIFICATIONS: usize = 4096;

#[derive(Debug, Default)]
pub struct LoopbackTransport {
    mtus: Vec<u16>,
    subscribed: HashSet<Characteristic>,
    notifications: Vec<(Characteristic, Vec<u8>)>,
    live: SegmentAssembler,
    stored: SegmentAssembler,
    observations: Vec<Observation>,
    stored_records: Vec<(u32, Observation)>,
    reassembly_errors: usize,
}

impl LoopbackTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// A central with this MTU connects.
    pub fn connect(&mut self, mtu: u16) {
        self.mtus.push(mtu);
        info!("LOOP: central connected (MTU={}), {} total", mtu, self.mtus.len());
    }

    /// Drop every central and its subscriptions.
    pub fn disconnect_all(&mut self) {
        self.mtus.clear();
        self.subscribed.clear();
        self.live.reset();
        self.stored.reset();
        info!("LOOP: all centrals disconnected");
    }

    pub fn is_connected(&self) -> bool {
        !self.mtus.is_empty()
    }

    /// Enable notify/indicate on `characteristic`.
    pub fn subscribe(&mut self, characteristic: Characteristic) {
        self.subscribed.insert(characteristic);
    }

    pub fn unsubscribe(&mut self, characteristic: Characteristic) {
        self.subscribed.remove(&characteristic);
    }

    /// Every raw notification, oldest first.
    pub fn notifications(&self) -> &[(Characteristic, Vec<u8>)] {
        &self.notifications
    }

    /// Raw notifications sent on one characteristic.
    pub fn sent_on(&self, characteristic: Characteristic) -> Vec<&[u8]> {
        self.notifications
            .iter()
            .filter(|(c, _)| *c == characteristic)
            .map(|(_, b)| b.as_slice())
            .collect()
    }

    /// Reassembled and decoded live observations.
    pub fn observations(&self) -> &[Observation] {
        &self.observations
    }

    /// Reassembled stored records with their record numbers.
    pub fn stored_records(&self) -> &[(u32, Observation)] {
        &self.stored_records
    }

    /// Segments that failed reassembly or decoding.
    pub fn reassembly_errors(&self) -> usize {
        self.reassembly_errors
    }

    /// Forget everything received so far. Connections stay up.
    pub fn clear(&mut self) {
        self.notifications.clear();
        self.observations.clear();
        self.stored_records.clear();
        self.reassembly_errors = 0;
    }

    fn receive_live(&mut self, bytes: &[u8]) {
        match self.live.feed(bytes) {
            Ok(Some(message)) => match decode(&message) {
                Ok(obs) => self.observations.push(obs),
                Err(e) => {
                    warn!("LOOP: live observation undecodable: {}", e);
                    self.reassembly_errors += 1;
                }
            },
            Ok(None) => {}
            Err(e) => {
                warn!("LOOP: live segment rejected: {}", e);
                self.reassembly_errors += 1;
            }
        }
    }

    fn receive_stored(&mut self, bytes: &[u8]) {
        match self.stored.feed(bytes) {
            Ok(Some(message)) => match decode_stored(&message) {
                Ok(record) => self.stored_records.push(record),
                Err(e) => {
                    warn!("LOOP: stored record undecodable: {}", e);
                    self.reassembly_errors += 1;
                }
            },
            Ok(None) => {}
            Err(e) => {
                warn!("LOOP: stored segment rejected: {}", e);
                self.reassembly_errors += 1;
            }
        }
    }
}

impl Transport for LoopbackTransport {
    fn notify_or_indicate(&mut self, characteristic: Characteristic, bytes: &[u8]) -> bool {
        if self.mtus.is_empty() || !self.subscribed.contains(&characteristic) {
            return false;
        }
        match characteristic {
            Characteristic::Observation => self.receive_live(bytes),
            Characteristic::StoredObservation => self.receive_stored(bytes),
            _ => {}
        }
        if self.notifications.len() >= MAX_LOGGED_NOTIFICATIONS {
            self.notifications.remove(0);
        }
        self.notifications.push((characteristic, bytes.to_vec()));
        true
    }

    fn connected_mtus(&self) -> Vec<u16> {
        self.mtus.clone()
    }

    fn is_notify_enabled(&self, characteristic: Characteristic) -> bool {
        self.subscribed.contains(&characteristic)
    }
}
