//! User context adapter.
//!
//! The core never creates users; it only asks whose request it is
//! serving. [`SelectedUser`] holds that answer and lets the host switch it.

use std::sync::atomic::{AtomicU8, Ordering};

use crate::app::ports::{UNKNOWN_USER, UserContext};

/// Currently selected user index. Starts as [`UNKNOWN_USER`].
#[derive(Debug)]
pub struct SelectedUser(AtomicU8);

impl Default for SelectedUser {
    fn default() -> Self {
        Self::new(UNKNOWN_USER)
    }
}

impl SelectedUser {
    pub const fn new(index: u8) -> Self {
        Self(AtomicU8::new(index))
    }

    pub fn select(&self, index: u8) {
        self.0.store(index, Ordering::Relaxed);
    }

    pub fn deselect(&self) {
        self.select(UNKNOWN_USER);
    }
}

impl UserContext for SelectedUser {
    fn current_user_index(&self) -> u8 {
        self.0.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn selection_switches_user() {
        let user = SelectedUser::default();
        assert_eq!(user.current_user_index(), UNKNOWN_USER);
        user.select(3);
        assert_eq!(user.current_user_index(), 3);
        user.deselect();
        assert_eq!(user.current_user_index(), UNKNOWN_USER);
    }
}
