//! End-to-end: runtime tasks + loopback central + service core.

use std::time::Duration;

use ghs_peripheral::adapters::log_sink::LogEventSink;
use ghs_peripheral::adapters::loopback::LoopbackTransport;
use ghs_peripheral::adapters::time::ManualTime;
use ghs_peripheral::adapters::user::SelectedUser;
use ghs_peripheral::app::commands::ServiceCommand;
use ghs_peripheral::app::ports::Characteristic;
use ghs_peripheral::app::service::GhsService;
use ghs_peripheral::clock::EPOCH_2000_UNIX_MILLIS;
use ghs_peripheral::config::ServiceConfig;
use ghs_peripheral::control_point::{OP_START_SENDING, OP_STOP_SENDING};
use ghs_peripheral::error::GattStatus;
use ghs_peripheral::observation::ObservationType;
use ghs_peripheral::racp::{opcode, operator, response};
use ghs_peripheral::runtime::Runtime;

type Rt = Runtime<ManualTime, LoopbackTransport, SelectedUser, LogEventSink>;

fn runtime(period_ms: u32) -> Rt {
    let config = ServiceConfig {
        emitter_period_ms: period_ms,
        ..ServiceConfig::default()
    };
    let time = ManualTime::new(0, EPOCH_2000_UNIX_MILLIS, 0);
    Runtime::new(
        GhsService::new(config, time),
        LoopbackTransport::new(),
        SelectedUser::new(1),
        LogEventSink::new(),
    )
}

fn connect(rt: &Rt, mtu: u16) {
    rt.with_transport(|t| {
        t.connect(mtu);
        for c in [
            Characteristic::Observation,
            Characteristic::StoredObservation,
            Characteristic::ControlPoint,
            Characteristic::Racp,
        ] {
            t.subscribe(c);
        }
    });
}

async fn sleep(ms: u64) {
    async_io_mini::Timer::after(Duration::from_millis(ms)).await;
}

#[test]
fn offline_records_are_fetched_over_racp() {
    let rt = runtime(1_000);
    rt.command(ServiceCommand::SingleShot);
    rt.command(ServiceCommand::SingleShot);
    assert_eq!(rt.with_service(|s| s.store().count(1)), 6);

    connect(&rt, 23);
    rt.run(async {
        rt.submit_write(Characteristic::Racp, &[opcode::REPORT_STORED_RECORDS, operator::ALL]);
        sleep(10).await;
        while rt.with_service(|s| s.transfer_in_flight()) {
            sleep(10).await;
        }
    });

    rt.with_transport(|t| {
        assert_eq!(t.stored_records().len(), 6);
        assert_eq!(t.reassembly_errors(), 0);
        assert_eq!(
            t.sent_on(Characteristic::Racp).last().copied(),
            Some(&[opcode::RESPONSE_CODE, 0, opcode::REPORT_STORED_RECORDS, response::SUCCESS][..])
        );
    });
}

#[test]
fn emitter_streams_while_started() {
    let rt = runtime(1_000);
    connect(&rt, 23);
    rt.run(async {
        rt.submit_write(Characteristic::ControlPoint, &[OP_START_SENDING]);
        sleep(10).await;
        rt.command(ServiceCommand::StartEmitter);
        sleep(2_300).await;
        rt.command(ServiceCommand::StopEmitter);
        rt.submit_write(Characteristic::ControlPoint, &[OP_STOP_SENDING]);
        sleep(10).await;
    });

    assert_eq!(rt.last_status(), Some(GattStatus::Success));
    rt.with_transport(|t| {
        // Two periods elapsed, three types per tick.
        assert_eq!(t.observations().len(), 6);
        assert_eq!(t.observations()[0].kind, ObservationType::HeartRate);
        assert_eq!(t.reassembly_errors(), 0);
    });
}

#[test]
fn stopped_emitter_never_fires() {
    let rt = runtime(1_000);
    rt.run(async {
        rt.command(ServiceCommand::StartEmitter);
        sleep(500).await;
        rt.command(ServiceCommand::StopEmitter);
        sleep(1_000).await;
    });
    assert_eq!(rt.with_service(|s| s.store().count(1)), 0);
    assert!(!rt.with_service(|s| s.is_emitter_running()));
}
