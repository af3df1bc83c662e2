//! Adapters: concrete implementations of the hexagonal port traits.
//!
//! | Adapter       | Implements   | Connects to                   |
//! |---------------|--------------|-------------------------------|
//! | `log_sink`    | EventSink    | `log` facade                  |
//! | `loopback`    | Transport    | in-process central model      |
//! | `time`        | TimePort     | host clock / manual test time |
//! | `user`        | UserContext  | host-selected user index      |

pub mod log_sink;
pub mod loopback;
pub mod time;
pub mod user;
