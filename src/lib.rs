//! Generic Health Sensor peripheral protocol engine.
//!
//! Pure protocol logic (observation codec, segmentation, control point,
//! schedule negotiation, RACP, store, clock and features) behind port traits, plus
//! host adapters and an async runtime for driving it.

#![deny(unused_must_use)]

pub mod adapters;
pub mod app;
pub mod bytes;
pub mod clock;
pub mod config;
pub mod control_point;
pub mod emitter;
pub mod error;
pub mod features;
pub mod observation;
pub mod racp;
pub mod runtime;
pub mod schedule;
pub mod segment;
pub mod store;
