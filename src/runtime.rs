//! Async runtime: one serialized context for every service interaction.
//!
//! All client writes, emission ticks and stored-record pumping run as
//! cooperative tasks on a single `edge-executor` thread, so the service
//! never sees two callbacks at once. Timers come from the `async-io-mini`
//! reactor; cross-task plumbing uses `embassy-sync` primitives.
//!
//! ```text
//!  ┌──────────────────────────────────────────────────────────────┐
//!  │  futures_lite::block_on                                      │
//!  │  ┌────────────────────────────────────────────────────────┐  │
//!  │  │  edge_executor::LocalExecutor                          │  │
//!  │  │                                                        │  │
//!  │  │  ┌────────────┐  ┌──────────────┐  ┌───────────────┐  │  │
//!  │  │  │ Write      │  │ Emitter      │  │ Stored pump   │  │  │
//!  │  │  │ wake-on-   │  │ signal ∨ ⏱   │  │ signal, then  │  │  │
//!  │  │  │ send       │  │ period       │  │ 5 ms ⏱ gaps   │  │  │
//!  │  │  └────────────┘  └──────────────┘  └───────────────┘  │  │
//!  │  └────────────────────────────────────────────────────────┘  │
//!  └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! The emitter task races its control signal against the period timer
//! with the signal polled first, so a Stop that lands before the timer is
//! observed always cancels the next fire.

use core::cell::RefCell;
use core::future::Future;
use core::time::Duration;

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::channel::Channel;
use embassy_sync::signal::Signal;
use log::{debug, info, warn};

use crate::app::commands::ServiceCommand;
use crate::app::ports::{Characteristic, EventSink, TimePort, Transport, UserContext};
use crate::app::service::{EmitterDirective, GhsService};
use crate::error::GattStatus;

/// Largest client write the queue carries.
pub const MAX_WRITE_LEN: usize = 512;

/// Queued client writes before new ones are refused.
const WRITE_DEPTH: usize = 8;

/// Pause between stored records so live traffic can interleave.
const STORED_RECORD_GAP: Duration = Duration::from_millis(5);

/// One inbound client write.
pub struct WriteRequest {
    pub characteristic: Characteristic,
    pub bytes: heapless::Vec<u8, MAX_WRITE_LEN>,
}

pub type WriteQueue = Channel<CriticalSectionRawMutex, WriteRequest, WRITE_DEPTH>;
pub type EmitterControl = Signal<CriticalSectionRawMutex, EmitterDirective>;

// ── Runtime ──────────────────────────────────────────────────

/// Owns the service and its adapters for the lifetime of the executor.
///
/// Borrows of the inner cells never cross an `.await`.
pub struct Runtime<C: TimePort, T: Transport, U: UserContext, S: EventSink> {
    service: RefCell<GhsService<C>>,
    transport: RefCell<T>,
    users: U,
    sink: RefCell<S>,
    writes: WriteQueue,
    emitter: EmitterControl,
    stored: Signal<CriticalSectionRawMutex, ()>,
    last_status: RefCell<Option<GattStatus>>,
}

impl<C: TimePort, T: Transport, U: UserContext, S: EventSink> Runtime<C, T, U, S> {
    pub fn new(service: GhsService<C>, transport: T, users: U, sink: S) -> Self {
        Self {
            service: RefCell::new(service),
            transport: RefCell::new(transport),
            users,
            sink: RefCell::new(sink),
            writes: Channel::new(),
            emitter: Signal::new(),
            stored: Signal::new(),
            last_status: RefCell::new(None),
        }
    }

    // ── Inbound ──────────────────────────────────────────────

    /// Queue a client write. Returns `false` when the queue is full or
    /// the write is larger than [`MAX_WRITE_LEN`].
    pub fn submit_write(&self, characteristic: Characteristic, bytes: &[u8]) -> bool {
        let mut buf = heapless::Vec::new();
        if buf.extend_from_slice(bytes).is_err() {
            warn!("RT: {} byte write to {} too large", bytes.len(), characteristic);
            return false;
        }
        let req = WriteRequest {
            characteristic,
            bytes: buf,
        };
        if self.writes.try_send(req).is_err() {
            warn!("RT: write queue full, dropping write to {}", characteristic);
            return false;
        }
        true
    }

    /// Run an operator command now and forward any resulting directive.
    pub fn command(&self, cmd: ServiceCommand) {
        {
            let mut svc = self.service.borrow_mut();
            svc.handle_command(
                cmd,
                &mut *self.transport.borrow_mut(),
                &self.users,
                &mut *self.sink.borrow_mut(),
            );
        }
        self.forward();
    }

    /// Every central went away.
    pub fn disconnected(&self) {
        self.service
            .borrow_mut()
            .on_disconnected(&mut *self.sink.borrow_mut());
    }

    /// GATT status of the most recently processed write.
    pub fn last_status(&self) -> Option<GattStatus> {
        *self.last_status.borrow()
    }

    // ── Accessors ────────────────────────────────────────────

    /// Borrow the service. Do not hold across an await point.
    pub fn with_service<R>(&self, f: impl FnOnce(&mut GhsService<C>) -> R) -> R {
        f(&mut self.service.borrow_mut())
    }

    /// Borrow the transport. Do not hold across an await point.
    pub fn with_transport<R>(&self, f: impl FnOnce(&mut T) -> R) -> R {
        f(&mut self.transport.borrow_mut())
    }

    pub fn users(&self) -> &U {
        &self.users
    }

    pub fn into_parts(self) -> (GhsService<C>, T, S) {
        (
            self.service.into_inner(),
            self.transport.into_inner(),
            self.sink.into_inner(),
        )
    }

    // ── Driving ──────────────────────────────────────────────

    /// Run the three tasks until `until` completes and return its output.
    pub fn run<F: Future>(&self, until: F) -> F::Output {
        let executor: edge_executor::LocalExecutor<'_, 8> = edge_executor::LocalExecutor::new();
        executor.spawn(self.write_loop()).detach();
        executor.spawn(self.emitter_loop()).detach();
        executor.spawn(self.stored_loop()).detach();

        info!("RT: executor started");
        futures_lite::future::block_on(executor.run(until))
    }

    /// Hand pending emitter directives and transfer starts to their tasks.
    fn forward(&self) {
        let (directive, transfer) = {
            let mut svc = self.service.borrow_mut();
            (svc.take_emitter_directive(), svc.transfer_in_flight())
        };
        if let Some(d) = directive {
            debug!("RT: emitter directive {:?}", d);
            self.emitter.signal(d);
        }
        if transfer {
            self.stored.signal(());
        }
    }

    fn deliver(&self, req: &WriteRequest) {
        let status = self.service.borrow_mut().deliver_write(
            req.characteristic,
            &req.bytes,
            &mut *self.transport.borrow_mut(),
            &self.users,
            &mut *self.sink.borrow_mut(),
        );
        if !status.is_success() {
            debug!("RT: write to {} answered {}", req.characteristic, status);
        }
        *self.last_status.borrow_mut() = Some(status);
        self.forward();
    }

    fn tick(&self) {
        self.service.borrow_mut().emit_tick(
            &mut *self.transport.borrow_mut(),
            &self.users,
            &mut *self.sink.borrow_mut(),
        );
    }

    fn pump(&self) -> bool {
        self.service
            .borrow_mut()
            .pump_stored(&mut *self.transport.borrow_mut(), &mut *self.sink.borrow_mut())
    }

    // ── Tasks ────────────────────────────────────────────────

    /// Write task: wakes when a write is queued.
    async fn write_loop(&self) {
        loop {
            let req = self.writes.receive().await;
            self.deliver(&req);
        }
    }

    /// Emitter task: idle until started, then ticks every period.
    async fn emitter_loop(&self) {
        let mut period: Option<Duration> = None;
        loop {
            let directive = match period {
                None => Some(self.emitter.wait().await),
                Some(p) => {
                    let signal = async { Some(self.emitter.wait().await) };
                    let timer = async {
                        async_io_mini::Timer::after(p).await;
                        None
                    };
                    futures_lite::future::or(signal, timer).await
                }
            };
            match directive {
                Some(EmitterDirective::Start(p) | EmitterDirective::Reschedule(p)) => {
                    period = Some(p);
                }
                Some(EmitterDirective::Stop) => period = None,
                None => self.tick(),
            }
        }
    }

    /// Stored pump task: sends one record per gap until the transfer ends.
    async fn stored_loop(&self) {
        loop {
            self.stored.wait().await;
            while self.pump() {
                async_io_mini::Timer::after(STORED_RECORD_GAP).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::log_sink::LogEventSink;
    use crate::adapters::loopback::LoopbackTransport;
    use crate::adapters::time::ManualTime;
    use crate::adapters::user::SelectedUser;
    use crate::config::ServiceConfig;

    fn runtime() -> Runtime<ManualTime, LoopbackTransport, SelectedUser, LogEventSink> {
        let svc = GhsService::new(ServiceConfig::default(), ManualTime::default());
        Runtime::new(svc, LoopbackTransport::new(), SelectedUser::new(0), LogEventSink::new())
    }

    #[test]
    fn queued_writes_are_delivered() {
        let rt = runtime();
        rt.with_transport(|t| {
            t.connect(23);
            t.subscribe(Characteristic::Observation);
            t.subscribe(Characteristic::ControlPoint);
        });
        assert!(rt.submit_write(Characteristic::ControlPoint, &[0x01]));
        rt.run(async_io_mini::Timer::after(Duration::from_millis(20)));
        assert_eq!(rt.last_status(), Some(GattStatus::Success));
        assert!(rt.with_service(|s| s.control_point().transmit_enabled()));
    }

    #[test]
    fn oversized_writes_are_refused() {
        let rt = runtime();
        assert!(!rt.submit_write(Characteristic::Racp, &[0u8; MAX_WRITE_LEN + 1]));
    }

    #[test]
    fn stop_cancels_pending_emission() {
        let rt = runtime();
        rt.command(ServiceCommand::StartEmitter);
        rt.command(ServiceCommand::StopEmitter);
        rt.run(async_io_mini::Timer::after(Duration::from_millis(20)));
        assert_eq!(rt.with_service(|s| s.store().count(0)), 0);
    }
}
