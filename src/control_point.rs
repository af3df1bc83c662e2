//! Live observation control point.
//!
//! ```text
//!            START (0x01)
//!   Idle ─────────────────▶ Streaming
//!    ▲                          │
//!    └──────────────────────────┘
//!            STOP (0x02)
//! ```
//!
//! Both writes answer `[0x80]`. Anything else is refused at the GATT
//! status gate and never reaches [`ControlPoint::handle`].

use log::{debug, info};

use crate::error::GattStatus;

pub const OP_START_SENDING: u8 = 0x01;
pub const OP_STOP_SENDING: u8 = 0x02;
pub const RESPONSE_SUCCESS: u8 = 0x80;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ControlPointState {
    #[default]
    Idle,
    Streaming,
}

#[derive(Debug, Default)]
pub struct ControlPoint {
    state: ControlPointState,
}

impl ControlPoint {
    pub fn new() -> Self {
        Self::default()
    }

    /// A single START or STOP byte.
    pub fn is_write_valid(bytes: &[u8]) -> bool {
        matches!(bytes, [OP_START_SENDING | OP_STOP_SENDING])
    }

    /// GATT status for a write before it is handled.
    pub fn write_status(bytes: &[u8], live_notify_enabled: bool) -> GattStatus {
        if !Self::is_write_valid(bytes) {
            debug!("CP: rejected write {:02x?}", bytes);
            GattStatus::COMMAND_NOT_SUPPORTED
        } else if !live_notify_enabled {
            GattStatus::CccdCfgError
        } else {
            GattStatus::Success
        }
    }

    /// Apply a validated write. `None` when the write is not valid.
    pub fn handle(&mut self, bytes: &[u8]) -> Option<[u8; 1]> {
        let next = match bytes {
            [OP_START_SENDING] => ControlPointState::Streaming,
            [OP_STOP_SENDING] => ControlPointState::Idle,
            _ => return None,
        };
        if next != self.state {
            info!("CP: {:?} -> {:?}", self.state, next);
        }
        self.state = next;
        Some([RESPONSE_SUCCESS])
    }

    pub fn state(&self) -> ControlPointState {
        self.state
    }

    /// Whether live observations should be sent.
    pub fn transmit_enabled(&self) -> bool {
        self.state == ControlPointState::Streaming
    }

    /// Drop back to idle (disconnect, notifications disabled).
    pub fn reset(&mut self) {
        self.state = ControlPointState::Idle;
    }
}
