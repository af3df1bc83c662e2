//! Integration test driver for `tests/integration/` submodule.
//!
//! Each `mod` below maps to a file that exercises a specific subsystem
//! against mock adapters. Everything runs on the host with no radio.

mod mock_ports;
mod racp_tests;
mod service_tests;
