//! The DMX universe frame moved between endpoints.

/// The number of channels in a DMX-512 universe.
pub const DMX_CHANNELS: usize = 512;

/// A source or sink of DMX frames. `None` is a valid routing target meaning
/// "no endpoint"; a route through it is inactive, not an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SourceSink {
    #[default]
    None,
    /// The wireless transceiver module.
    Timo,
    /// The wired onboard DMX port.
    Onboard,
    /// The network (Art-Net/RPC) ingress.
    Artnet,
}

/// One universe frame: origin tag plus the 513-byte wire payload (start
/// code followed by exactly 512 channel values). Frames are value types,
/// copied between mailboxes and never shared by reference across tasks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DmxPacket {
    pub source: SourceSink,
    pub start_code: u8,
    pub channels: [u8; DMX_CHANNELS],
}

impl DmxPacket {
    /// Start code plus channel data.
    pub const PAYLOAD_LEN: usize = DMX_CHANNELS + 1;

    /// A null-start-code frame carrying `channels`.
    #[must_use]
    pub fn from_channels(source: SourceSink, channels: [u8; DMX_CHANNELS]) -> Self {
        Self {
            source,
            start_code: 0,
            channels,
        }
    }
}

impl Default for DmxPacket {
    fn default() -> Self {
        Self {
            source: SourceSink::None,
            start_code: 0,
            channels: [0; DMX_CHANNELS],
        }
    }
}
