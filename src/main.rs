//! GHS peripheral simulator: host entry point.
//!
//! Wires the protocol core to host adapters and plays one session
//! against an in-process central:
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────────┐
//! │                      Adapters (outer ring)                     │
//! │  LoopbackTransport  SelectedUser  SystemTimeAdapter            │
//! │  (Transport)        (UserContext) (TimePort)                   │
//! │  LogEventSink (EventSink)   tracing-subscriber (log backend)   │
//! │                                                                │
//! │  ──────────────── Port Trait Boundary ───────────────────      │
//! │                                                                │
//! │  ┌────────────────────────────────────────────────────────┐    │
//! │  │              GhsService (pure logic)                   │    │
//! │  │  Clock · Store · Schedule · Control point · RACP       │    │
//! │  └────────────────────────────────────────────────────────┘    │
//! │                                                                │
//! │  Runtime (edge-executor: write · emitter · stored pump)        │
//! └────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Session: observations are stored while no central is connected, a
//! central connects and fetches them over RACP, then live streaming runs
//! for a number of emitter periods.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use clap::Parser;
use log::{LevelFilter, info, warn};
use tracing_subscriber::EnvFilter;

use ghs_peripheral::adapters::log_sink::LogEventSink;
use ghs_peripheral::adapters::loopback::LoopbackTransport;
use ghs_peripheral::adapters::time::SystemTimeAdapter;
use ghs_peripheral::adapters::user::SelectedUser;
use ghs_peripheral::app::commands::ServiceCommand;
use ghs_peripheral::app::ports::{Characteristic, EventSink, TimePort, Transport, UserContext};
use ghs_peripheral::app::service::GhsService;
use ghs_peripheral::bytes::to_formatted_hex;
use ghs_peripheral::config::ServiceConfig;
use ghs_peripheral::control_point::{OP_START_SENDING, OP_STOP_SENDING};
use ghs_peripheral::racp::{opcode, operator};
use ghs_peripheral::runtime::Runtime;

/// Simulate a GHS peripheral talking to one in-process central.
#[derive(Parser)]
#[command(name = "ghs-sim", version, about)]
struct Args {
    /// JSON service configuration (defaults when omitted).
    #[arg(long)]
    config: Option<PathBuf>,

    /// Override the emitter period in milliseconds.
    #[arg(long)]
    period_ms: Option<u32>,

    /// Override the observation types (MDC codes, decimal or 0x-hex).
    #[arg(long, value_delimiter = ',', value_parser = parse_code)]
    types: Option<Vec<u32>>,

    /// Bundle the numeric observations of each tick.
    #[arg(long)]
    bundle: bool,

    /// MTU the simulated central negotiates.
    #[arg(long, default_value_t = 23)]
    mtu: u16,

    /// User index the session runs as.
    #[arg(long, default_value_t = 0)]
    user: u8,

    /// Observation rounds stored before the central connects.
    #[arg(long, default_value_t = 3)]
    stored: usize,

    /// Live emitter periods to stream.
    #[arg(long, default_value_t = 3)]
    ticks: u32,

    /// Log level (error, warn, info, debug, trace).
    #[arg(long, default_value = "info")]
    log_level: LevelFilter,
}

fn parse_code(text: &str) -> Result<u32, String> {
    let parsed = match text.strip_prefix("0x").or_else(|| text.strip_prefix("0X")) {
        Some(hex) => u32::from_str_radix(hex, 16),
        None => text.parse(),
    };
    parsed.map_err(|e| format!("invalid MDC code '{text}': {e}"))
}

/// Route `log` records into a `tracing` fmt subscriber on stderr.
/// `RUST_LOG` wins over `--log-level` when set.
fn init_logging(level: LevelFilter) -> Result<()> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level.to_string()));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|e| anyhow::anyhow!("installing log subscriber: {e}"))
}

fn load_config(args: &Args) -> Result<ServiceConfig> {
    let mut config = match &args.config {
        Some(path) => {
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("reading {}", path.display()))?;
            serde_json::from_str(&text).with_context(|| format!("parsing {}", path.display()))?
        }
        None => ServiceConfig::default(),
    };

    if let Some(ms) = args.period_ms {
        config.emitter_period_ms = ms;
    }
    if let Some(types) = &args.types {
        config.observation_types.clear();
        for &code in types {
            if config.observation_types.push(code).is_err() {
                bail!("at most {} observation types", ghs_peripheral::config::MAX_OBSERVATION_TYPES);
            }
        }
    }
    if args.bundle {
        config.bundle_observations = true;
    }
    config.validate()?;
    Ok(config)
}

async fn settle() {
    async_io_mini::Timer::after(Duration::from_millis(20)).await;
}

/// Online part of the session: fetch stored records, then stream live.
async fn session<C, T, U, S>(rt: &Runtime<C, T, U, S>, ticks: u32, period: Duration)
where
    C: TimePort,
    T: Transport,
    U: UserContext,
    S: EventSink,
{
    // ── RACP: count, then report everything ──────────────────
    rt.submit_write(Characteristic::Racp, &[opcode::NUMBER_STORED_RECORDS, operator::ALL]);
    settle().await;
    rt.submit_write(Characteristic::Racp, &[opcode::REPORT_STORED_RECORDS, operator::ALL]);
    settle().await;
    while rt.with_service(|s| s.transfer_in_flight()) {
        settle().await;
    }

    // ── Live streaming ───────────────────────────────────────
    rt.submit_write(Characteristic::ControlPoint, &[OP_START_SENDING]);
    rt.command(ServiceCommand::StartEmitter);
    async_io_mini::Timer::after(period * ticks + period / 2).await;
    rt.submit_write(Characteristic::ControlPoint, &[OP_STOP_SENDING]);
    rt.command(ServiceCommand::StopEmitter);
    settle().await;
}

fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(args.log_level)?;

    info!("GHS peripheral simulator v{}", env!("CARGO_PKG_VERSION"));

    let config = load_config(&args)?;
    let time = SystemTimeAdapter::new(config.tz_offset_millis());
    let service = GhsService::new(config, time);
    let period = service.emitter_period();

    let rt = Runtime::new(
        service,
        LoopbackTransport::new(),
        SelectedUser::new(args.user),
        LogEventSink::new(),
    );

    // ── Offline: observations go to the store ────────────────
    for _ in 0..args.stored {
        rt.command(ServiceCommand::SingleShot);
    }
    info!("SIM: central connects (MTU={})", args.mtu);
    rt.with_transport(|t| {
        t.connect(args.mtu);
        for c in [
            Characteristic::Observation,
            Characteristic::StoredObservation,
            Characteristic::ControlPoint,
            Characteristic::Racp,
            Characteristic::Features,
        ] {
            t.subscribe(c);
        }
    });

    rt.run(session(&rt, args.ticks, period));

    let (service, transport, sink) = rt.into_parts();
    if let Some(features) = service.read(Characteristic::Features) {
        info!("SIM: features {}", to_formatted_hex(&features));
    }
    for response in transport.sent_on(Characteristic::Racp) {
        info!("SIM: RACP response {}", to_formatted_hex(response));
    }
    info!(
        "SIM: {} stored records received, {} live observations received, {} events",
        transport.stored_records().len(),
        transport.observations().len(),
        sink.emitted()
    );
    if transport.reassembly_errors() > 0 {
        warn!("SIM: {} reassembly errors", transport.reassembly_errors());
    }
    info!(
        "SIM: store now holds {} records for user {}",
        service.store().count(args.user),
        args.user
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn logging_installs_once() {
        assert!(init_logging(LevelFilter::Debug).is_ok());
        log::debug!("SIM: routed through the subscriber");
        assert!(init_logging(LevelFilter::Info).is_err());
    }

    #[test]
    fn mdc_codes_parse_in_hex_and_decimal() {
        assert_eq!(parse_code("0x00024182"), Ok(0x0002_4182));
        assert_eq!(parse_code("147842"), Ok(147_842));
        assert!(parse_code("0xZZ").is_err());
    }
}
