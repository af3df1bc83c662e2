//! Integration tests for the GhsService write/tick pipeline.
//!
//! Client writes go in through `deliver_write`, emission runs through
//! `emit_tick`, and everything the central would see is asserted on the
//! mock transport.

use crate::mock_ports::{FixedUser, MockTransport, RecordingSink, make_service};

use ghs_peripheral::app::commands::ServiceCommand;
use ghs_peripheral::app::events::ServiceEvent;
use ghs_peripheral::app::ports::Characteristic;
use ghs_peripheral::clock::{TimeSource, Timestamp, TimestampFlags};
use ghs_peripheral::config::ServiceConfig;
use ghs_peripheral::control_point::{ControlPointState, OP_START_SENDING, OP_STOP_SENDING};
use ghs_peripheral::error::GattStatus;
use ghs_peripheral::features::{BP_SPECIALIZATION, FLAG_DEVICE_SPECIALIZATIONS};
use ghs_peripheral::observation::ObservationType;
use ghs_peripheral::schedule::ScheduleEntry;
use ghs_peripheral::segment::FIRST_SEGMENT;

// ── Control point ─────────────────────────────────────────────

#[test]
fn start_sending_streams_and_answers_success() {
    let (mut svc, _) = make_service(ServiceConfig::default());
    let mut t = MockTransport::connected(23);
    let mut sink = RecordingSink::new();

    let status = svc.deliver_write(
        Characteristic::ControlPoint,
        &[OP_START_SENDING],
        &mut t,
        &FixedUser(0),
        &mut sink,
    );

    assert_eq!(status, GattStatus::Success);
    assert_eq!(svc.control_point().state(), ControlPointState::Streaming);
    assert_eq!(t.last_on(Characteristic::ControlPoint), Some(vec![0x80]));
    assert!(sink.contains(&ServiceEvent::LiveObservationsStarted));
}

#[test]
fn control_point_needs_live_notifications() {
    let (mut svc, _) = make_service(ServiceConfig::default());
    let mut t = MockTransport::connected(23);
    t.enabled.remove(&Characteristic::Observation);

    let status = svc.deliver_write(
        Characteristic::ControlPoint,
        &[OP_START_SENDING],
        &mut t,
        &FixedUser(0),
        &mut RecordingSink::new(),
    );

    assert_eq!(status, GattStatus::CccdCfgError);
    assert_eq!(status.code(), 0xFD);
    assert_eq!(svc.control_point().state(), ControlPointState::Idle);
    assert!(t.on(Characteristic::ControlPoint).is_empty());
}

#[test]
fn malformed_control_point_writes_are_not_supported() {
    let (mut svc, _) = make_service(ServiceConfig::default());
    let mut t = MockTransport::connected(23);
    for bytes in [&[][..], &[0x03], &[0x01, 0x01], &[0x00]] {
        let status = svc.deliver_write(
            Characteristic::ControlPoint,
            bytes,
            &mut t,
            &FixedUser(0),
            &mut RecordingSink::new(),
        );
        assert_eq!(status.code(), 0x81, "{bytes:?}");
    }
    assert_eq!(svc.control_point().state(), ControlPointState::Idle);
}

// ── Emission routing ──────────────────────────────────────────

#[test]
fn streaming_tick_segments_on_the_live_path() {
    let (mut svc, _) = make_service(ServiceConfig::default());
    let mut t = MockTransport::connected(23);
    let mut sink = RecordingSink::new();
    let user = FixedUser(0);

    svc.deliver_write(Characteristic::ControlPoint, &[OP_START_SENDING], &mut t, &user, &mut sink);
    let generated = svc.emit_tick(&mut t, &user, &mut sink);
    assert_eq!(generated, 3);

    let segments = t.on(Characteristic::Observation);
    // MTU 23 minus 4 bytes of overhead plus the header byte.
    assert!(segments.iter().all(|s| s.len() <= 20));
    assert_eq!(segments[0][0] >> 2, 1, "first live segment uses sequence 1");
    assert_ne!(segments[0][0] & FIRST_SEGMENT, 0);

    let kinds: Vec<ObservationType> = t.live_observations().iter().map(|o| o.kind).collect();
    assert_eq!(
        kinds,
        vec![
            ObservationType::HeartRate,
            ObservationType::SpO2,
            ObservationType::BodyTemperature
        ]
    );
    assert_eq!(svc.store().count(0), 0);
    assert!(sink.events.iter().any(|e| matches!(
        e,
        ServiceEvent::ObservationsSent { observations: 3, .. }
    )));
}

#[test]
fn connected_but_idle_drops_observations() {
    let (mut svc, _) = make_service(ServiceConfig::default());
    let mut t = MockTransport::connected(23);
    let mut sink = RecordingSink::new();

    svc.emit_tick(&mut t, &FixedUser(0), &mut sink);

    assert!(t.on(Characteristic::Observation).is_empty());
    assert_eq!(svc.store().count(0), 0);
    assert!(sink.contains(&ServiceEvent::ObservationsDropped(3)));
}

#[test]
fn disconnected_ticks_store_for_the_current_user() {
    let (mut svc, _) = make_service(ServiceConfig::default());
    let mut t = MockTransport::new();
    let mut sink = RecordingSink::new();

    svc.emit_tick(&mut t, &FixedUser(4), &mut sink);
    svc.emit_tick(&mut t, &FixedUser(4), &mut sink);

    assert_eq!(svc.store().count(4), 6);
    assert_eq!(svc.store().count(0), 0);
    assert!(t.sent.is_empty());
}

#[test]
fn stop_sending_returns_to_idle() {
    let (mut svc, _) = make_service(ServiceConfig::default());
    let mut t = MockTransport::connected(23);
    let mut sink = RecordingSink::new();
    let user = FixedUser(0);

    svc.deliver_write(Characteristic::ControlPoint, &[OP_START_SENDING], &mut t, &user, &mut sink);
    svc.deliver_write(Characteristic::ControlPoint, &[OP_STOP_SENDING], &mut t, &user, &mut sink);

    assert!(!svc.control_point().transmit_enabled());
    assert!(sink.contains(&ServiceEvent::LiveObservationsStopped));
    svc.emit_tick(&mut t, &user, &mut sink);
    assert!(t.on(Characteristic::Observation).is_empty());
}

#[test]
fn disconnect_restarts_the_live_sequence() {
    let (mut svc, _) = make_service(ServiceConfig::default());
    let mut t = MockTransport::connected(23);
    let mut sink = RecordingSink::new();
    let user = FixedUser(0);

    svc.deliver_write(Characteristic::ControlPoint, &[OP_START_SENDING], &mut t, &user, &mut sink);
    svc.emit_tick(&mut t, &user, &mut sink);
    svc.on_disconnected(&mut sink);
    assert!(!svc.control_point().transmit_enabled());

    let mut t = MockTransport::connected(23);
    svc.deliver_write(Characteristic::ControlPoint, &[OP_START_SENDING], &mut t, &user, &mut sink);
    svc.emit_tick(&mut t, &user, &mut sink);
    let first = &t.on(Characteristic::Observation)[0];
    assert_eq!(first[0] >> 2, 1);
    assert_ne!(first[0] & FIRST_SEGMENT, 0);
}

// ── Schedule descriptor ───────────────────────────────────────

#[test]
fn schedule_write_propagates_to_emitter() {
    let (mut svc, _) = make_service(ServiceConfig::default());
    let mut t = MockTransport::connected(23);
    t.enabled.insert(Characteristic::ScheduleDescriptor(0));
    let mut sink = RecordingSink::new();

    let slot = svc.schedule().slot_of(ObservationType::HeartRate).unwrap();
    let entry = ScheduleEntry::new(ObservationType::HeartRate, 2.0, 5.0).unwrap();
    let status = svc.deliver_write(
        Characteristic::ScheduleDescriptor(slot),
        &entry.to_bytes(),
        &mut t,
        &FixedUser(0),
        &mut sink,
    );

    assert_eq!(status, GattStatus::Success);
    assert_eq!(svc.schedule().entry(ObservationType::HeartRate), Some(entry));
    assert_eq!(svc.emitter_period().as_millis(), 5_000);
    assert_eq!(t.last_on(Characteristic::ScheduleDescriptor(slot)), Some(entry.to_bytes()));
    assert!(sink.contains(&ServiceEvent::ScheduleChanged(entry)));
}

#[test]
fn bad_schedule_writes_are_out_of_range() {
    let (mut svc, _) = make_service(ServiceConfig::default());
    let mut t = MockTransport::connected(23);
    let slot = svc.schedule().slot_of(ObservationType::HeartRate).unwrap();
    let before = svc.schedule().entry(ObservationType::HeartRate);

    let wrong_type = ScheduleEntry::new(ObservationType::SpO2, 1.0, 1.0).unwrap().to_bytes();
    let mut too_fast = ScheduleEntry::new(ObservationType::HeartRate, 1.0, 1.0).unwrap().to_bytes();
    // Interval FLOAT 0.5 with precision 3: mantissa 500, exponent -3.
    too_fast[8..12].copy_from_slice(&(500u32 | (0xFDu32 << 24)).to_le_bytes());

    for bytes in [wrong_type, too_fast, vec![0x82, 0x41]] {
        let status = svc.deliver_write(
            Characteristic::ScheduleDescriptor(slot),
            &bytes,
            &mut t,
            &FixedUser(0),
            &mut RecordingSink::new(),
        );
        assert_eq!(status.code(), 0xFF, "{bytes:02x?}");
    }
    assert_eq!(svc.schedule().entry(ObservationType::HeartRate), before);
}

// ── Clock ─────────────────────────────────────────────────────

#[test]
fn clock_write_with_matching_flags_is_applied() {
    let (mut svc, _) = make_service(ServiceConfig::default());
    let mut sink = RecordingSink::new();
    let flags = svc.config().timestamp_flags;

    let write = Timestamp {
        flags,
        value: 10_000_000,
        time_source: TimeSource::Ntp,
        offset_units: 4,
    };
    let status = svc.deliver_write(
        Characteristic::ElapsedTime,
        &write.to_bytes(),
        &mut MockTransport::new(),
        &FixedUser(0),
        &mut sink,
    );

    assert_eq!(status, GattStatus::Success);
    assert_eq!(svc.clock().current_epoch_millis(), 10_000_000 - 3_600_000);
    assert_eq!(svc.clock().state().time_source, TimeSource::Ntp);
    assert!(sink.contains(&ServiceEvent::ClockChanged(TimeSource::Ntp)));
}

#[test]
fn clock_write_with_other_flags_is_rejected() {
    let (mut svc, _) = make_service(ServiceConfig::default());
    let before = svc.clock().state();

    let write = Timestamp {
        flags: svc.config().timestamp_flags | TimestampFlags::UTC,
        value: 42,
        time_source: TimeSource::Gps,
        offset_units: 0,
    };
    let status = svc.deliver_write(
        Characteristic::ElapsedTime,
        &write.to_bytes(),
        &mut MockTransport::new(),
        &FixedUser(0),
        &mut RecordingSink::new(),
    );

    assert_eq!(status.code(), 0x81);
    assert_eq!(svc.clock().state(), before);
}

#[test]
fn clock_change_moves_stored_observations_off_the_timeline() {
    let (mut svc, _) = make_service(ServiceConfig::default());
    let mut sink = RecordingSink::new();
    svc.emit_tick(&mut MockTransport::new(), &FixedUser(0), &mut sink);
    assert!(svc.store().records(0).iter().all(|r| r.observation.timestamp.is_current_timeline()));

    svc.clock_mut().adjust_millis(60_000);

    assert!(svc.store().records(0).iter().all(|r| !r.observation.timestamp.is_current_timeline()));
}

#[test]
fn elapsed_time_read_uses_configured_flags() {
    let (svc, time) = make_service(ServiceConfig::default());
    time.advance(500);
    let bytes = svc.read(Characteristic::ElapsedTime).unwrap();
    let ts = Timestamp::from_bytes(&bytes).unwrap();
    assert_eq!(ts.flags, svc.config().timestamp_flags);
    assert_eq!(ts.time_source, TimeSource::Manual);
    assert_eq!(ts.millis(), 86_400_000 + 500);
}

// ── Features ──────────────────────────────────────────────────

#[test]
fn features_list_configured_types() {
    let (svc, _) = make_service(ServiceConfig::default());
    let bytes = svc.read(Characteristic::Features).unwrap();

    assert_eq!(bytes[0], 0);
    assert_eq!(bytes[1], 3);
    assert_eq!(bytes.len(), 2 + 3 * 4);
    assert_eq!(&bytes[2..6], &ObservationType::HeartRate.code().to_le_bytes());
    assert_eq!(&bytes[6..10], &ObservationType::SpO2.code().to_le_bytes());
    assert_eq!(&bytes[10..14], &ObservationType::BodyTemperature.code().to_le_bytes());
}

#[test]
fn features_are_indicated_when_types_change() {
    let (mut svc, _) = make_service(ServiceConfig::default());
    let mut t = MockTransport::connected(23);
    t.enabled.insert(Characteristic::Features);
    let mut sink = RecordingSink::new();

    svc.handle_command(
        ServiceCommand::AddObservationType(ObservationType::BloodPressureNonInvasive),
        &mut t,
        &FixedUser(0),
        &mut sink,
    );
    let added = t.last_on(Characteristic::Features).unwrap();
    assert_eq!(added[0], FLAG_DEVICE_SPECIALIZATIONS);
    assert_eq!(added[1], 4);
    assert_eq!(&added[14..18], &[0x04, 0x4A, 0x02, 0x00]);
    assert_eq!(&added[18..], &BP_SPECIALIZATION);
    assert_eq!(svc.read(Characteristic::Features), Some(added));
    assert!(sink.contains(&ServiceEvent::FeaturesChanged(4)));

    svc.handle_command(
        ServiceCommand::RemoveObservationType(ObservationType::BloodPressureNonInvasive),
        &mut t,
        &FixedUser(0),
        &mut sink,
    );
    let removed = t.last_on(Characteristic::Features).unwrap();
    assert_eq!(removed[0], 0);
    assert_eq!(removed[1], 3);
    assert_eq!(removed.len(), 2 + 3 * 4);
    assert_eq!(t.on(Characteristic::Features).len(), 2);
}

#[test]
fn features_are_read_only() {
    let (mut svc, _) = make_service(ServiceConfig::default());
    let status = svc.deliver_write(
        Characteristic::Features,
        &[0, 0],
        &mut MockTransport::connected(23),
        &FixedUser(0),
        &mut RecordingSink::new(),
    );
    assert_eq!(status, GattStatus::COMMAND_NOT_SUPPORTED);
}
