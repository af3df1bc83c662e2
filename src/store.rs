//! Per-user, record-numbered observation store.
//!
//! ```text
//!  Mutex ─┬─ user 0 ─ { next_record: 5, records: 2 → obs, 3 → obs, 4 → obs }
//!         └─ user 1 ─ { next_record: 1, records: 0 → obs }
//! ```
//!
//! Every read and write takes the one store-wide lock for the duration of
//! the map access. Record numbers are allocated under that lock, so they
//! are strictly increasing per user even when several threads add at once.
//! Listener notifications are collected under the lock and delivered after
//! it is released, so a listener may call back into the store.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use log::{debug, info};

use crate::clock::ClockListener;
use crate::observation::Observation;

/// Notified after store mutations.
pub trait StoreListener: Send + Sync {
    /// Records were added to or removed from `user`'s store.
    fn observation_store_changed(&self, user: u8);

    /// The set of users with stored records changed.
    fn observation_store_users_changed(&self);
}

#[derive(Debug, Clone, PartialEq)]
pub struct ObservationRecord {
    pub user_index: u8,
    pub record_number: u32,
    pub observation: Observation,
}

#[derive(Debug, Default)]
struct UserRecords {
    records: BTreeMap<u32, Observation>,
    next_record: u32,
}

#[derive(Debug, Clone, Copy)]
enum StoreEvent {
    Changed(u8),
    UsersChanged,
}

type Users = BTreeMap<u8, UserRecords>;

#[derive(Default)]
pub struct ObservationStore {
    users: Mutex<Users>,
    listeners: Mutex<Vec<Arc<dyn StoreListener>>>,
}

impl ObservationStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_listener(&self, listener: Arc<dyn StoreListener>) {
        self.listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(listener);
    }

    // ── Mutations ─────────────────────────────────────────────

    /// Store `obs` for `user`; returns its record number.
    pub fn add(&self, user: u8, obs: Observation) -> u32 {
        self.mutate(|users, events| {
            let entry = users.entry(user).or_default();
            let record_number = entry.next_record;
            entry.next_record = entry.next_record.wrapping_add(1);
            if entry.records.is_empty() {
                events.push(StoreEvent::UsersChanged);
            }
            entry.records.insert(record_number, obs);
            events.push(StoreEvent::Changed(user));
            debug!("STORE: user {} record {} added", user, record_number);
            record_number
        })
    }

    pub fn remove(&self, user: u8, record_number: u32) -> bool {
        self.remove_all(user, &[record_number]) == 1
    }

    /// Remove every listed record; returns how many existed.
    pub fn remove_all(&self, user: u8, record_numbers: &[u32]) -> usize {
        self.remove_where(user, |records| {
            record_numbers
                .iter()
                .filter(|rn| records.remove(rn).is_some())
                .count()
        })
    }

    /// Remove the lowest-numbered record.
    pub fn remove_first(&self, user: u8) -> Option<u32> {
        let mut removed = None;
        self.remove_where(user, |records| {
            removed = records.pop_first().map(|(rn, _)| rn);
            usize::from(removed.is_some())
        });
        removed
    }

    /// Remove the highest-numbered record.
    pub fn remove_last(&self, user: u8) -> Option<u32> {
        let mut removed = None;
        self.remove_where(user, |records| {
            removed = records.pop_last().map(|(rn, _)| rn);
            usize::from(removed.is_some())
        });
        removed
    }

    /// Remove every record numbered `min_record` or higher.
    pub fn remove_from(&self, user: u8, min_record: u32) -> usize {
        self.remove_where(user, |records| records.split_off(&min_record).len())
    }

    /// Wipe every user, counters included.
    pub fn clear(&self) {
        self.mutate(|users, events| {
            for (&user, entry) in users.iter() {
                if !entry.records.is_empty() {
                    events.push(StoreEvent::Changed(user));
                }
            }
            users.clear();
            events.push(StoreEvent::UsersChanged);
        });
        info!("STORE: cleared");
    }

    /// Wipe one user, counter included.
    pub fn clear_user(&self, user: u8) {
        self.mutate(|users, events| {
            users.remove(&user);
            events.push(StoreEvent::Changed(user));
            events.push(StoreEvent::UsersChanged);
        });
        info!("STORE: user {} cleared", user);
    }

    // ── Queries ───────────────────────────────────────────────

    /// Records numbered `min_record` or higher, in record order.
    pub fn query_from(&self, user: u8, min_record: u32) -> Vec<ObservationRecord> {
        let users = self.lock();
        users.get(&user).map_or_else(Vec::new, |entry| {
            entry
                .records
                .range(min_record..)
                .map(|(&record_number, obs)| ObservationRecord {
                    user_index: user,
                    record_number,
                    observation: obs.clone(),
                })
                .collect()
        })
    }

    pub fn count_from(&self, user: u8, min_record: u32) -> usize {
        self.lock()
            .get(&user)
            .map_or(0, |entry| entry.records.range(min_record..).count())
    }

    pub fn records(&self, user: u8) -> Vec<ObservationRecord> {
        self.query_from(user, 0)
    }

    pub fn count(&self, user: u8) -> usize {
        self.lock().get(&user).map_or(0, |entry| entry.records.len())
    }

    /// Users that currently have at least one record.
    pub fn users(&self) -> Vec<u8> {
        self.lock()
            .iter()
            .filter(|(_, entry)| !entry.records.is_empty())
            .map(|(&user, _)| user)
            .collect()
    }

    // ── Internal ──────────────────────────────────────────────

    fn lock(&self) -> MutexGuard<'_, Users> {
        self.users.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn mutate<R>(&self, f: impl FnOnce(&mut Users, &mut Vec<StoreEvent>) -> R) -> R {
        let mut events = Vec::new();
        let result = {
            let mut users = self.lock();
            f(&mut users, &mut events)
        };
        self.broadcast(&events);
        result
    }

    /// Run a removal against one user's records and raise the matching events.
    fn remove_where(
        &self,
        user: u8,
        f: impl FnOnce(&mut BTreeMap<u32, Observation>) -> usize,
    ) -> usize {
        self.mutate(|users, events| {
            let Some(entry) = users.get_mut(&user) else {
                return 0;
            };
            let had_records = !entry.records.is_empty();
            let removed = f(&mut entry.records);
            if removed > 0 {
                events.push(StoreEvent::Changed(user));
                if had_records && entry.records.is_empty() {
                    events.push(StoreEvent::UsersChanged);
                }
                debug!("STORE: user {} removed {} records", user, removed);
            }
            removed
        })
    }

    fn broadcast(&self, events: &[StoreEvent]) {
        if events.is_empty() {
            return;
        }
        let listeners = self
            .listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        for event in events {
            for listener in &listeners {
                match *event {
                    StoreEvent::Changed(user) => listener.observation_store_changed(user),
                    StoreEvent::UsersChanged => listener.observation_store_users_changed(),
                }
            }
        }
    }
}

impl ClockListener for ObservationStore {
    fn on_time_source_changed(&self) {
        let mut users = self.lock();
        let mut touched = 0usize;
        for entry in users.values_mut() {
            for obs in entry.records.values_mut() {
                obs.clear_current_timeline();
                touched += 1;
            }
        }
        if touched > 0 {
            info!("STORE: {} records moved off the current timeline", touched);
        }
    }
}

// ── Tests ────────────────────────────────────────────────────
