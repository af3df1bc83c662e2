//! Elapsed-tick counter for tick-counter timestamp mode.
//!
//! Tracks `offset = system_ticks - ticks` so that `current = system - offset`
//! keeps counting from whatever value a client last wrote.

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickCounter {
    offset: i64,
}

impl TickCounter {
    pub const fn new() -> Self {
        Self { offset: 0 }
    }

    /// Current tick count (milliseconds) given the monotonic system ticks.
    pub fn current(&self, system_ticks: u64) -> u64 {
        (system_ticks as i64).wrapping_sub(self.offset).max(0) as u64
    }

    /// Make the counter read `ticks` at `system_ticks`.
    pub fn set(&mut self, system_ticks: u64, ticks: u64) {
        self.offset = (system_ticks as i64).wrapping_sub(ticks as i64);
    }
}
