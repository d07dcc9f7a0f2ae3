//! A single-slot latest-value mailbox.
//!
//! DMX is a refresh protocol, not a reliable stream: a reader that falls
//! behind should see the newest frame and nothing else. The mailbox holds
//! zero or one value; writing into a full slot replaces the stale value.

use parking_lot::{Condvar, Mutex};
use std::time::{Duration, Instant};

#[derive(Debug, Default)]
pub struct Mailbox<T> {
    slot: Mutex<Option<T>>,
    filled: Condvar,
}

impl<T> Mailbox<T> {
    #[must_use]
    pub fn new() -> Self {
        Self {
            slot: Mutex::new(None),
            filled: Condvar::new(),
        }
    }

    /// Puts `value` in the slot, replacing any stale value, and wakes one
    /// waiting reader. Never blocks.
    pub fn overwrite(&self, value: T) {
        *self.slot.lock() = Some(value);
        self.filled.notify_one();
    }

    /// Takes the current value, if any, without waiting.
    pub fn take(&self) -> Option<T> {
        self.slot.lock().take()
    }

    /// Takes the current value, waiting up to `timeout` for one to arrive.
    /// An empty return is steady-state behavior, not an error.
    pub fn take_timeout(&self, timeout: Duration) -> Option<T> {
        let deadline = Instant::now() + timeout;
        let mut slot = self.slot.lock();
        while slot.is_none() {
            if self.filled.wait_until(&mut slot, deadline).timed_out() {
                break;
            }
        }
        slot.take()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::{sync::Arc, thread};

    #[test]
    fn empty_take_is_none() {
        let mailbox: Mailbox<u8> = Mailbox::new();
        assert_eq!(mailbox.take(), None);
        assert_eq!(mailbox.take_timeout(Duration::from_millis(1)), None);
    }

    #[test]
    fn overwrite_keeps_only_the_latest() {
        let mailbox = Mailbox::new();
        mailbox.overwrite('a');
        mailbox.overwrite('b');
        assert_eq!(mailbox.take(), Some('b'));
        assert_eq!(mailbox.take(), None);
    }

    #[test]
    fn take_timeout_wakes_on_send() {
        let mailbox = Arc::new(Mailbox::new());
        let writer = {
            let mailbox = Arc::clone(&mailbox);
            thread::spawn(move || {
                thread::sleep(Duration::from_millis(10));
                mailbox.overwrite(42u32);
            })
        };
        assert_eq!(mailbox.take_timeout(Duration::from_secs(1)), Some(42));
        writer.join().unwrap();
    }
}
