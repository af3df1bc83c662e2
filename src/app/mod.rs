//! Application core: protocol logic behind port traits, zero I/O.
//!
//! [`service::GhsService`] is the composition root: it owns the clock,
//! store, schedule negotiator, control point, RACP engine and emitter, and
//! reaches the transport, user context and event output only through the
//! traits in [`ports`].

pub mod commands;
pub mod events;
pub mod ports;
pub mod service;
