//! Record access control point (RACP) query engine.
//!
//! ```text
//!  request   [opcode][operator][operand …]
//!  count     [0x05][0x00][count u16]
//!  response  [0x06][0x00][request opcode][response code]
//!  combined  [0x08][0x00][count u32]
//! ```
//!
//! Selection is by record number order: `≤ n` picks the first `n`
//! records, `≥ n` the last `total - n + 1`. Ranges and time-based
//! filters are not supported.

use std::ops::Range;
use std::sync::Arc;

use log::{debug, info, warn};

use crate::store::{ObservationRecord, ObservationStore};

// ── Wire constants ───────────────────────────────────────────

pub mod opcode {
    pub const REPORT_STORED_RECORDS: u8 = 0x01;
    pub const DELETE_STORED_RECORDS: u8 = 0x02;
    pub const ABORT_OPERATION: u8 = 0x03;
    pub const NUMBER_STORED_RECORDS: u8 = 0x04;
    pub const RESPONSE_NUMBER_STORED_RECORDS: u8 = 0x05;
    pub const RESPONSE_CODE: u8 = 0x06;
    pub const COMBINED_REPORT: u8 = 0x07;
    pub const COMBINED_REPORT_RESPONSE: u8 = 0x08;
}

pub mod operator {
    pub const NULL: u8 = 0x00;
    pub const ALL: u8 = 0x01;
    pub const LESS_OR_EQUAL: u8 = 0x02;
    pub const GREATER_OR_EQUAL: u8 = 0x03;
    pub const RANGE: u8 = 0x04;
    pub const FIRST: u8 = 0x05;
    pub const LAST: u8 = 0x06;
}

pub mod response {
    pub const SUCCESS: u8 = 0x01;
    pub const OPCODE_UNSUPPORTED: u8 = 0x02;
    pub const INVALID_OPERATOR: u8 = 0x03;
    pub const UNSUPPORTED_OPERATOR: u8 = 0x04;
    pub const INVALID_OPERAND: u8 = 0x05;
    pub const NO_RECORDS: u8 = 0x06;
    pub const ABORT_UNSUCCESSFUL: u8 = 0x07;
    pub const PROCEDURE_NOT_COMPLETED: u8 = 0x08;
    pub const OPERAND_UNSUPPORTED: u8 = 0x09;
    pub const SERVER_BUSY: u8 = 0x0A;
}

/// Answer to a count request whose operator cannot be resolved.
pub const COUNT_FAILURE: [u8; 2] = [opcode::RESPONSE_CODE, response::INVALID_OPERATOR];

// ── Selection ────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Selection {
    All,
    LessOrEqual(u16),
    GreaterOrEqual(u16),
    First,
    Last,
}

impl Selection {
    /// Parse `[operator][operand …]`. The error is the response code to send.
    pub fn parse(operator: u8, operand: &[u8]) -> Result<Self, u8> {
        let value = || match operand {
            [lo, hi, ..] => Ok(u16::from_le_bytes([*lo, *hi])),
            _ => Err(response::INVALID_OPERAND),
        };
        match operator {
            operator::ALL => Ok(Self::All),
            operator::FIRST => Ok(Self::First),
            operator::LAST => Ok(Self::Last),
            operator::LESS_OR_EQUAL => value().map(Self::LessOrEqual),
            operator::GREATER_OR_EQUAL => value().map(Self::GreaterOrEqual),
            operator::RANGE => Err(response::UNSUPPORTED_OPERATOR),
            _ => Err(response::INVALID_OPERATOR),
        }
    }

    /// Index range selected out of `total` records in record order.
    pub fn range(self, total: usize) -> Range<usize> {
        match self {
            Self::All => 0..total,
            Self::First => 0..total.min(1),
            Self::Last => total.saturating_sub(1)..total,
            Self::LessOrEqual(n) => 0..total.min(usize::from(n)),
            Self::GreaterOrEqual(n) => {
                let count = (total + 1).saturating_sub(usize::from(n)).min(total);
                total - count..total
            }
        }
    }

    pub fn count(self, total: usize) -> usize {
        self.range(total).len()
    }
}

// ── Engine ───────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferKind {
    Report,
    Combined,
}

/// What the service must do with a RACP request.
#[derive(Debug, Clone, PartialEq)]
pub enum RacpAction {
    /// Indicate these bytes on the RACP characteristic.
    Respond(Vec<u8>),
    /// Send `records` on the stored observation characteristic, then
    /// indicate [`RacpEngine::completion`].
    StartTransfer {
        kind: TransferKind,
        records: Vec<ObservationRecord>,
    },
    /// Cancel the in-flight transfer, then indicate these bytes.
    Abort(Vec<u8>),
    /// Send nothing.
    Ignore,
}

pub struct RacpEngine {
    store: Arc<ObservationStore>,
}

impl RacpEngine {
    pub fn new(store: Arc<ObservationStore>) -> Self {
        Self { store }
    }

    /// `[0x06][0x00][request][code]`
    pub fn response_code(request: u8, code: u8) -> Vec<u8> {
        vec![opcode::RESPONSE_CODE, operator::NULL, request, code]
    }

    /// Final indication of a finished stored transfer.
    pub fn completion(kind: TransferKind, sent: usize) -> Vec<u8> {
        match kind {
            TransferKind::Report => {
                Self::response_code(opcode::REPORT_STORED_RECORDS, response::SUCCESS)
            }
            TransferKind::Combined => {
                let mut out = vec![opcode::COMBINED_REPORT_RESPONSE, operator::NULL];
                out.extend_from_slice(&(sent as u32).to_le_bytes());
                out
            }
        }
    }

    pub fn handle(&self, user: u8, request: &[u8], transfer_in_flight: bool) -> RacpAction {
        let Some(&op) = request.first() else {
            debug!("RACP: empty write ignored");
            return RacpAction::Ignore;
        };

        if op == opcode::ABORT_OPERATION {
            return self.abort(request);
        }
        if transfer_in_flight {
            warn!("RACP: opcode {} while a transfer is running", op);
            return RacpAction::Respond(Self::response_code(op, response::SERVER_BUSY));
        }

        match op {
            opcode::NUMBER_STORED_RECORDS => self
                .number_of_records(user, request)
                .map_or(RacpAction::Ignore, RacpAction::Respond),
            opcode::REPORT_STORED_RECORDS => self.report(user, request, TransferKind::Report),
            opcode::COMBINED_REPORT => self.report(user, request, TransferKind::Combined),
            opcode::DELETE_STORED_RECORDS => self.delete(user, request),
            other => {
                warn!("RACP: unsupported opcode 0x{:02X}", other);
                RacpAction::Respond(Self::response_code(other, response::OPCODE_UNSUPPORTED))
            }
        }
    }

    /// Count request. `None` means send nothing (short operand).
    pub fn number_of_records(&self, user: u8, request: &[u8]) -> Option<Vec<u8>> {
        let &op_operator = request.get(1)?;
        let total = self.store.count(user);

        let count = if total == 0 {
            0
        } else {
            let selection = match op_operator {
                operator::NULL => Ok(Selection::All),
                other => Selection::parse(other, &request[2..]),
            };
            match selection {
                Ok(selection) => selection.count(total),
                Err(response::INVALID_OPERAND) => {
                    debug!("RACP: count operand too short, no answer");
                    return None;
                }
                Err(_) => {
                    warn!("RACP: count operator 0x{:02X} unresolvable", op_operator);
                    return Some(COUNT_FAILURE.to_vec());
                }
            }
        };

        info!("RACP: user {} count -> {}", user, count);
        let count = u16::try_from(count).unwrap_or(u16::MAX);
        let mut out = vec![opcode::RESPONSE_NUMBER_STORED_RECORDS, operator::NULL];
        out.extend_from_slice(&count.to_le_bytes());
        Some(out)
    }

    fn selection(request: &[u8]) -> Result<Selection, u8> {
        match request {
            [_, op_operator, operand @ ..] => Selection::parse(*op_operator, operand),
            _ => Err(response::INVALID_OPERATOR),
        }
    }

    fn selected(&self, user: u8, selection: Selection) -> Vec<ObservationRecord> {
        let mut records = self.store.records(user);
        let range = selection.range(records.len());
        records.truncate(range.end);
        records.drain(..range.start);
        records
    }

    fn report(&self, user: u8, request: &[u8], kind: TransferKind) -> RacpAction {
        let op = request[0];
        let selection = match Self::selection(request) {
            Ok(s) => s,
            Err(code) => return RacpAction::Respond(Self::response_code(op, code)),
        };
        let records = self.selected(user, selection);
        if records.is_empty() {
            return RacpAction::Respond(Self::response_code(op, response::NO_RECORDS));
        }
        info!(
            "RACP: user {} {:?} of {} records ({:?})",
            user,
            kind,
            records.len(),
            selection
        );
        RacpAction::StartTransfer { kind, records }
    }

    fn delete(&self, user: u8, request: &[u8]) -> RacpAction {
        let op = opcode::DELETE_STORED_RECORDS;
        let selection = match Self::selection(request) {
            Ok(s) => s,
            Err(code) => return RacpAction::Respond(Self::response_code(op, code)),
        };
        let numbers: Vec<u32> = self
            .selected(user, selection)
            .iter()
            .map(|r| r.record_number)
            .collect();
        if numbers.is_empty() {
            return RacpAction::Respond(Self::response_code(op, response::NO_RECORDS));
        }
        let removed = self.store.remove_all(user, &numbers);
        info!("RACP: user {} deleted {} records", user, removed);
        RacpAction::Respond(Self::response_code(op, response::SUCCESS))
    }

    fn abort(&self, request: &[u8]) -> RacpAction {
        let op = opcode::ABORT_OPERATION;
        if request == [op, operator::NULL] {
            info!("RACP: abort");
            RacpAction::Abort(Self::response_code(op, response::SUCCESS))
        } else {
            RacpAction::Respond(Self::response_code(op, response::INVALID_OPERATOR))
        }
    }
}

// ── Tests ────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::Timestamp;
    use crate::observation::{Observation, ObservationType};

    fn engine_with(records: usize) -> (RacpEngine, Arc<ObservationStore>) {
        let store = Arc::new(ObservationStore::new());
        for i in 0..records {
            store.add(
                0,
                Observation::simple_numeric(
                    i as u16,
                    ObservationType::HeartRate,
                    60.0,
                    Timestamp::default(),
                ),
            );
        }
        (RacpEngine::new(Arc::clone(&store)), store)
    }

    fn count(engine: &RacpEngine, request: &[u8]) -> Option<Vec<u8>> {
        engine.number_of_records(0, request)
    }

    #[test]
    fn count_with_five_records() {
        let (e, _) = engine_with(5);
        assert_eq!(count(&e, &[4, operator::GREATER_OR_EQUAL, 3, 0]), Some(vec![5, 0, 3, 0]));
        assert_eq!(count(&e, &[4, operator::LESS_OR_EQUAL, 2, 0]), Some(vec![5, 0, 2, 0]));
        assert_eq!(count(&e, &[4, operator::ALL]), Some(vec![5, 0, 5, 0]));
        assert_eq!(count(&e, &[4, operator::NULL]), Some(vec![5, 0, 5, 0]));
        assert_eq!(count(&e, &[4, operator::FIRST]), Some(vec![5, 0, 1, 0]));
        assert_eq!(count(&e, &[4, operator::LAST]), Some(vec![5, 0, 1, 0]));
        assert_eq!(count(&e, &[4, operator::LESS_OR_EQUAL, 9, 0]), Some(vec![5, 0, 5, 0]));
        assert_eq!(count(&e, &[4, operator::GREATER_OR_EQUAL, 9, 0]), Some(vec![5, 0, 0, 0]));
    }

    #[test]
    fn count_on_empty_store_is_zero_for_any_operator() {
        let (e, _) = engine_with(0);
        for op in 0..=0x10 {
            assert_eq!(count(&e, &[4, op, 1, 0]), Some(vec![5, 0, 0, 0]));
        }
    }

    #[test]
    fn count_failures() {
        let (e, _) = engine_with(3);
        assert_eq!(count(&e, &[4, operator::RANGE, 1, 0, 2, 0]), Some(vec![6, 3]));
        assert_eq!(count(&e, &[4, 0x42]), Some(vec![6, 3]));
        // Short operand: no answer at all.
        assert_eq!(count(&e, &[4, operator::LESS_OR_EQUAL, 1]), None);
        assert_eq!(count(&e, &[4]), None);
        assert_eq!(e.handle(0, &[4, operator::GREATER_OR_EQUAL], false), RacpAction::Ignore);
    }

    #[test]
    fn report_selects_in_record_order() {
        let (e, _) = engine_with(5);
        let RacpAction::StartTransfer { kind, records } =
            e.handle(0, &[opcode::REPORT_STORED_RECORDS, operator::GREATER_OR_EQUAL, 4, 0], false)
        else {
            panic!("expected a transfer");
        };
        assert_eq!(kind, TransferKind::Report);
        let numbers: Vec<u32> = records.iter().map(|r| r.record_number).collect();
        assert_eq!(numbers, vec![3, 4]);
    }

    #[test]
    fn report_errors() {
        let (e, _) = engine_with(2);
        let op = opcode::REPORT_STORED_RECORDS;
        assert_eq!(
            e.handle(0, &[op, operator::RANGE, 0, 0, 1, 0], false),
            RacpAction::Respond(vec![6, 0, op, response::UNSUPPORTED_OPERATOR])
        );
        assert_eq!(
            e.handle(0, &[op, operator::NULL], false),
            RacpAction::Respond(vec![6, 0, op, response::INVALID_OPERATOR])
        );
        assert_eq!(
            e.handle(0, &[op, operator::LESS_OR_EQUAL], false),
            RacpAction::Respond(vec![6, 0, op, response::INVALID_OPERAND])
        );
        assert_eq!(
            e.handle(1, &[op, operator::ALL], false),
            RacpAction::Respond(vec![6, 0, op, response::NO_RECORDS])
        );
    }

    #[test]
    fn delete_selection_and_all() {
        let (e, store) = engine_with(5);
        let op = opcode::DELETE_STORED_RECORDS;
        assert_eq!(
            e.handle(0, &[op, operator::FIRST], false),
            RacpAction::Respond(vec![6, 0, op, response::SUCCESS])
        );
        assert_eq!(store.records(0)[0].record_number, 1);

        assert_eq!(
            e.handle(0, &[op, operator::ALL], false),
            RacpAction::Respond(vec![6, 0, op, response::SUCCESS])
        );
        assert_eq!(store.count(0), 0);
        assert_eq!(
            e.handle(0, &[op, operator::ALL], false),
            RacpAction::Respond(vec![6, 0, op, response::NO_RECORDS])
        );
    }

    #[test]
    fn busy_abort_and_unknown_opcodes() {
        let (e, _) = engine_with(1);
        assert_eq!(
            e.handle(0, &[opcode::NUMBER_STORED_RECORDS, operator::ALL], true),
            RacpAction::Respond(vec![6, 0, 4, response::SERVER_BUSY])
        );
        assert_eq!(
            e.handle(0, &[opcode::ABORT_OPERATION, operator::NULL], true),
            RacpAction::Abort(vec![6, 0, 3, response::SUCCESS])
        );
        assert_eq!(
            e.handle(0, &[opcode::ABORT_OPERATION, operator::ALL], false),
            RacpAction::Respond(vec![6, 0, 3, response::INVALID_OPERATOR])
        );
        assert_eq!(
            e.handle(0, &[0x09, 0x01], false),
            RacpAction::Respond(vec![6, 0, 9, response::OPCODE_UNSUPPORTED])
        );
        assert_eq!(e.handle(0, &[], false), RacpAction::Ignore);
    }

    #[test]
    fn completion_frames() {
        assert_eq!(RacpEngine::completion(TransferKind::Report, 3), vec![6, 0, 1, 1]);
        assert_eq!(
            RacpEngine::completion(TransferKind::Combined, 3),
            vec![8, 0, 3, 0, 0, 0]
        );
    }

    #[test]
    fn selection_ranges_match_counts() {
        assert_eq!(Selection::GreaterOrEqual(0).range(4), 0..4);
        assert_eq!(Selection::GreaterOrEqual(1).range(4), 0..4);
        assert_eq!(Selection::LessOrEqual(0).range(4), 0..0);
        assert_eq!(Selection::Last.range(0), 0..0);
    }
}
