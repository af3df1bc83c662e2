//! Integration tests for RACP queries and stored-record transfers.

use crate::mock_ports::{FixedUser, MockTransport, RecordingSink, make_service};

use ghs_peripheral::adapters::time::ManualTime;
use ghs_peripheral::app::events::ServiceEvent;
use ghs_peripheral::app::ports::Characteristic;
use ghs_peripheral::app::service::GhsService;
use ghs_peripheral::config::ServiceConfig;
use ghs_peripheral::error::GattStatus;
use ghs_peripheral::observation::ObservationType;
use ghs_peripheral::racp::{opcode, operator, response};

fn heart_rate_only() -> ServiceConfig {
    let mut config = ServiceConfig::default();
    config.observation_types.clear();
    config
        .observation_types
        .push(ObservationType::HeartRate.code())
        .unwrap();
    config
}

/// Service with `records` heart-rate records stored for `user`.
fn service_with(user: u8, records: usize) -> GhsService<ManualTime> {
    let (mut svc, _) = make_service(heart_rate_only());
    let mut offline = MockTransport::new();
    for _ in 0..records {
        svc.emit_tick(&mut offline, &FixedUser(user), &mut RecordingSink::new());
    }
    svc
}

fn racp(
    svc: &mut GhsService<ManualTime>,
    t: &mut MockTransport,
    sink: &mut RecordingSink,
    user: u8,
    request: &[u8],
) -> GattStatus {
    svc.deliver_write(Characteristic::Racp, request, t, &FixedUser(user), sink)
}

fn drain(svc: &mut GhsService<ManualTime>, t: &mut MockTransport, sink: &mut RecordingSink) -> usize {
    let mut rounds = 0;
    while svc.pump_stored(t, sink) {
        rounds += 1;
    }
    rounds
}

// ── Counting ──────────────────────────────────────────────────

#[test]
fn count_through_the_service() {
    let mut svc = service_with(0, 5);
    let mut t = MockTransport::connected(23);
    let mut sink = RecordingSink::new();

    racp(&mut svc, &mut t, &mut sink, 0, &[opcode::NUMBER_STORED_RECORDS, operator::GREATER_OR_EQUAL, 3, 0]);
    assert_eq!(t.last_on(Characteristic::Racp), Some(vec![5, 0, 3, 0]));

    racp(&mut svc, &mut t, &mut sink, 0, &[opcode::NUMBER_STORED_RECORDS, operator::LESS_OR_EQUAL, 2, 0]);
    assert_eq!(t.last_on(Characteristic::Racp), Some(vec![5, 0, 2, 0]));

    // Another user sees an empty store.
    racp(&mut svc, &mut t, &mut sink, 1, &[opcode::NUMBER_STORED_RECORDS, operator::ALL]);
    assert_eq!(t.last_on(Characteristic::Racp), Some(vec![5, 0, 0, 0]));
}

#[test]
fn short_count_operand_gets_no_answer() {
    let mut svc = service_with(0, 2);
    let mut t = MockTransport::connected(23);
    let status = racp(
        &mut svc,
        &mut t,
        &mut RecordingSink::new(),
        0,
        &[opcode::NUMBER_STORED_RECORDS, operator::LESS_OR_EQUAL, 1],
    );
    assert_eq!(status, GattStatus::Success);
    assert!(t.on(Characteristic::Racp).is_empty());
}

#[test]
fn racp_needs_indications() {
    let mut svc = service_with(0, 1);
    let mut t = MockTransport::connected(23);
    t.enabled.remove(&Characteristic::Racp);
    let status = racp(&mut svc, &mut t, &mut RecordingSink::new(), 0, &[opcode::NUMBER_STORED_RECORDS, operator::ALL]);
    assert_eq!(status, GattStatus::CccdCfgError);
}

// ── Transfers ─────────────────────────────────────────────────

#[test]
fn report_all_sends_every_record_then_success() {
    let mut svc = service_with(0, 3);
    let mut t = MockTransport::connected(23);
    let mut sink = RecordingSink::new();

    racp(&mut svc, &mut t, &mut sink, 0, &[opcode::REPORT_STORED_RECORDS, operator::ALL]);
    assert!(svc.transfer_in_flight());
    assert!(sink.contains(&ServiceEvent::StoredTransferStarted { user: 0, records: 3 }));

    assert_eq!(drain(&mut svc, &mut t, &mut sink), 3);

    let numbers: Vec<u32> = t.stored_records().iter().map(|(rn, _)| *rn).collect();
    assert_eq!(numbers, vec![0, 1, 2]);
    assert!(t
        .stored_records()
        .iter()
        .all(|(_, obs)| obs.kind == ObservationType::HeartRate));

    // Send-handler path: MTU 23 minus 5 bytes, plus the header byte.
    assert!(t.on(Characteristic::StoredObservation).iter().all(|s| s.len() <= 19));
    assert_eq!(
        t.last_on(Characteristic::Racp),
        Some(vec![opcode::RESPONSE_CODE, 0, opcode::REPORT_STORED_RECORDS, response::SUCCESS])
    );
    assert!(sink.contains(&ServiceEvent::StoredTransferComplete { sent: 3 }));
    assert!(!svc.transfer_in_flight());
    // Reports leave the store alone.
    assert_eq!(svc.store().count(0), 3);
}

#[test]
fn combined_report_of_last_record_answers_with_count() {
    let mut svc = service_with(0, 4);
    let mut t = MockTransport::connected(64);
    let mut sink = RecordingSink::new();

    racp(&mut svc, &mut t, &mut sink, 0, &[opcode::COMBINED_REPORT, operator::LAST]);
    drain(&mut svc, &mut t, &mut sink);

    let numbers: Vec<u32> = t.stored_records().iter().map(|(rn, _)| *rn).collect();
    assert_eq!(numbers, vec![3]);
    assert_eq!(
        t.last_on(Characteristic::Racp),
        Some(vec![opcode::COMBINED_REPORT_RESPONSE, 0, 1, 0, 0, 0])
    );
}

#[test]
fn report_on_empty_store_has_no_records() {
    let mut svc = service_with(0, 0);
    let mut t = MockTransport::connected(23);
    racp(&mut svc, &mut t, &mut RecordingSink::new(), 0, &[opcode::REPORT_STORED_RECORDS, operator::ALL]);
    assert_eq!(
        t.last_on(Characteristic::Racp),
        Some(vec![opcode::RESPONSE_CODE, 0, opcode::REPORT_STORED_RECORDS, response::NO_RECORDS])
    );
    assert!(!svc.transfer_in_flight());
}

#[test]
fn busy_while_transferring_and_abort_cancels() {
    let mut svc = service_with(0, 3);
    let mut t = MockTransport::connected(23);
    let mut sink = RecordingSink::new();

    racp(&mut svc, &mut t, &mut sink, 0, &[opcode::REPORT_STORED_RECORDS, operator::ALL]);
    assert!(svc.pump_stored(&mut t, &mut sink));

    racp(&mut svc, &mut t, &mut sink, 0, &[opcode::NUMBER_STORED_RECORDS, operator::ALL]);
    assert_eq!(
        t.last_on(Characteristic::Racp),
        Some(vec![opcode::RESPONSE_CODE, 0, opcode::NUMBER_STORED_RECORDS, response::SERVER_BUSY])
    );

    racp(&mut svc, &mut t, &mut sink, 0, &[opcode::ABORT_OPERATION, operator::NULL]);
    assert!(!svc.transfer_in_flight());
    assert_eq!(
        t.last_on(Characteristic::Racp),
        Some(vec![opcode::RESPONSE_CODE, 0, opcode::ABORT_OPERATION, response::SUCCESS])
    );
    assert!(sink.contains(&ServiceEvent::StoredTransferAborted { sent: 1 }));
    assert!(!svc.pump_stored(&mut t, &mut sink));
    assert_eq!(t.stored_records().len(), 1);
}

#[test]
fn disconnect_aborts_transfer() {
    let mut svc = service_with(0, 2);
    let mut t = MockTransport::connected(23);
    let mut sink = RecordingSink::new();

    racp(&mut svc, &mut t, &mut sink, 0, &[opcode::REPORT_STORED_RECORDS, operator::ALL]);
    svc.on_disconnected(&mut sink);
    assert!(!svc.transfer_in_flight());
    assert!(sink.contains(&ServiceEvent::StoredTransferAborted { sent: 0 }));
}

// ── Deletion ──────────────────────────────────────────────────

#[test]
fn delete_first_then_all() {
    let mut svc = service_with(2, 4);
    let mut t = MockTransport::connected(23);
    let mut sink = RecordingSink::new();

    racp(&mut svc, &mut t, &mut sink, 2, &[opcode::DELETE_STORED_RECORDS, operator::FIRST]);
    assert_eq!(
        t.last_on(Characteristic::Racp),
        Some(vec![opcode::RESPONSE_CODE, 0, opcode::DELETE_STORED_RECORDS, response::SUCCESS])
    );
    let remaining: Vec<u32> = svc.store().records(2).iter().map(|r| r.record_number).collect();
    assert_eq!(remaining, vec![1, 2, 3]);

    racp(&mut svc, &mut t, &mut sink, 2, &[opcode::DELETE_STORED_RECORDS, operator::ALL]);
    assert_eq!(svc.store().count(2), 0);

    racp(&mut svc, &mut t, &mut sink, 2, &[opcode::DELETE_STORED_RECORDS, operator::ALL]);
    assert_eq!(
        t.last_on(Characteristic::Racp),
        Some(vec![opcode::RESPONSE_CODE, 0, opcode::DELETE_STORED_RECORDS, response::NO_RECORDS])
    );
}

#[test]
fn malformed_requests_get_response_codes() {
    let mut svc = service_with(0, 2);
    let mut t = MockTransport::connected(23);
    let mut sink = RecordingSink::new();

    let cases: [(&[u8], u8); 4] = [
        (&[opcode::REPORT_STORED_RECORDS, operator::RANGE, 0, 0, 1, 0], response::UNSUPPORTED_OPERATOR),
        (&[opcode::REPORT_STORED_RECORDS, operator::NULL], response::INVALID_OPERATOR),
        (&[opcode::DELETE_STORED_RECORDS, operator::LESS_OR_EQUAL, 1], response::INVALID_OPERAND),
        (&[0x42, operator::ALL], response::OPCODE_UNSUPPORTED),
    ];
    for (request, code) in cases {
        racp(&mut svc, &mut t, &mut sink, 0, request);
        assert_eq!(
            t.last_on(Characteristic::Racp),
            Some(vec![opcode::RESPONSE_CODE, 0, request[0], code]),
            "{request:02x?}"
        );
    }
    assert_eq!(svc.store().count(0), 2);
}
