//! Core of a DMX-512 bridge: one universe routed between a wired DMX
//! port, a LumenRadio TIMO RF transceiver, and a network (Art-Net/RPC)
//! endpoint.
//!
//! The [`switcher::DmxSwitcher`] owns a single-slot mailbox pair per
//! endpoint and moves at most one frame per dispatch cycle along the
//! active source→sink route. Endpoint tasks ([`tasks`]) feed their
//! hardware from those mailboxes; the TIMO endpoint drives the
//! transceiver through the register-level [`timo`] driver. Routing and
//! radio parameters live in a [`settings::SettingsStore`] that pushes
//! changes to subscribed components.

pub mod endpoint;
pub mod mailbox;
pub mod packet;
pub mod settings;
pub mod switcher;
pub mod tasks;

pub use endpoint::DmxInterface;
pub use packet::{DmxPacket, SourceSink, DMX_CHANNELS};
pub use settings::{Settings, SettingsObserver, SettingsStore};
pub use switcher::DmxSwitcher;
pub use timo;

use thiserror::Error as ThisError;

/// Errors from the bridge core itself. Driver-level failures carry
/// through unchanged.
#[derive(Debug, ThisError)]
pub enum Error {
    #[error("invalid argument: {0}")]
    InvalidArgument(&'static str),
    #[error("timed out acquiring the routing lock")]
    Timeout,
    #[error(transparent)]
    Driver(#[from] timo::Error),
}
