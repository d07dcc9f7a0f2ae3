//! The per-endpoint frame interface.

use crate::{mailbox::Mailbox, packet::DmxPacket};
use std::time::Duration;

/// One logical endpoint's pair of single-slot mailboxes: `tx` carries
/// frames from the endpoint toward the switcher, `rx` carries frames from
/// the switcher toward the endpoint. Endpoints never talk to each other
/// directly; `send` and `receive` are the whole surface.
#[derive(Debug, Default)]
pub struct DmxInterface {
    pub(crate) tx: Mailbox<DmxPacket>,
    pub(crate) rx: Mailbox<DmxPacket>,
}

impl DmxInterface {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Offers a frame to the switcher. Non-blocking; a frame the switcher
    /// has not yet routed is replaced (latest wins).
    pub fn send(&self, packet: DmxPacket) {
        self.tx.overwrite(packet);
    }

    /// Pulls the next routed frame for this endpoint, waiting up to
    /// `timeout`.
    pub fn receive(&self, timeout: Duration) -> Option<DmxPacket> {
        self.rx.take_timeout(timeout)
    }
}
