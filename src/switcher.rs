//! The DMX switcher: one active source→sink route, serviced periodically.

use crate::{
    endpoint::DmxInterface,
    packet::{DmxPacket, SourceSink, DMX_CHANNELS},
    settings::{Settings, SettingsObserver},
    Error,
};
use parking_lot::Mutex;
use std::time::Duration;
use tracing::{error, trace, warn};

/// Shortest and longest useful dispatch periods. DMX refresh timing is
/// user-visible, so the routing task runs in this band.
pub const DISPATCH_PERIOD_MIN: Duration = Duration::from_millis(1);
pub const DISPATCH_PERIOD_MAX: Duration = Duration::from_millis(5);

/// Bound on routing-lock acquisition from the public setters. These calls
/// arrive from UI or settings callbacks that must stay responsive, so they
/// time out rather than block.
const ROUTE_LOCK_TIMEOUT: Duration = Duration::from_millis(2);

/// The active routing configuration; read as one snapshot per dispatch
/// cycle.
#[derive(Debug, Clone, Copy, Default)]
struct Routing {
    source: SourceSink,
    sink: SourceSink,
    output_enabled: bool,
}

/// Routes one DMX universe among the bridge's endpoints.
///
/// Owns the three endpoint interfaces for the process lifetime. Construct
/// one per process and share it as an `Arc`; the dispatch task and the
/// setters only contend on the small routing lock, never on frame data.
#[derive(Debug)]
pub struct DmxSwitcher {
    routing: Mutex<Routing>,
    timo: DmxInterface,
    onboard: DmxInterface,
    artnet: DmxInterface,
    /// Universe mutated one channel at a time over RPC, replayed in full
    /// through the artnet interface.
    rpc_universe: Mutex<[u8; DMX_CHANNELS]>,
}

impl Default for DmxSwitcher {
    fn default() -> Self {
        Self::new()
    }
}

impl DmxSwitcher {
    #[must_use]
    pub fn new() -> Self {
        Self {
            routing: Mutex::new(Routing::default()),
            timo: DmxInterface::new(),
            onboard: DmxInterface::new(),
            artnet: DmxInterface::new(),
            rpc_universe: Mutex::new([0; DMX_CHANNELS]),
        }
    }

    #[must_use]
    pub fn timo(&self) -> &DmxInterface {
        &self.timo
    }

    #[must_use]
    pub fn onboard(&self) -> &DmxInterface {
        &self.onboard
    }

    #[must_use]
    pub fn artnet(&self) -> &DmxInterface {
        &self.artnet
    }

    /// Atomically replaces the active source/sink pair.
    ///
    /// # Errors
    /// [`Error::Timeout`] if the routing lock cannot be taken within a few
    /// milliseconds.
    pub fn set_route(&self, source: SourceSink, sink: SourceSink) -> Result<(), Error> {
        let Some(mut routing) = self.routing.try_lock_for(ROUTE_LOCK_TIMEOUT) else {
            return Err(Error::Timeout);
        };
        routing.source = source;
        routing.sink = sink;
        Ok(())
    }

    /// # Errors
    /// [`Error::Timeout`] if the routing lock cannot be taken within a few
    /// milliseconds.
    pub fn set_output_enabled(&self, enabled: bool) -> Result<(), Error> {
        let Some(mut routing) = self.routing.try_lock_for(ROUTE_LOCK_TIMEOUT) else {
            return Err(Error::Timeout);
        };
        routing.output_enabled = enabled;
        Ok(())
    }

    #[must_use]
    pub fn route(&self) -> (SourceSink, SourceSink) {
        let routing = self.routing.lock();
        (routing.source, routing.sink)
    }

    #[must_use]
    pub fn output_enabled(&self) -> bool {
        self.routing.lock().output_enabled
    }

    /// One routing cycle: snapshot the configuration, then move at most one
    /// frame from the source's outbound mailbox to the sink's inbound
    /// mailbox.
    ///
    /// Runs once per scheduler period. Every failure mode here is
    /// per-cycle: a lock or receive timeout skips the cycle and the next
    /// one starts fresh.
    pub fn dispatch(&self) {
        let Some(routing) = self.routing.try_lock_for(DISPATCH_PERIOD_MAX) else {
            warn!("routing lock contended, skipping dispatch cycle");
            return;
        };
        let snapshot = *routing;
        drop(routing);

        let (Some(source), Some(sink)) = (
            self.interface_for(snapshot.source),
            self.interface_for(snapshot.sink),
        ) else {
            // An unconfigured route is inactive, not an error.
            return;
        };
        if !snapshot.output_enabled {
            return;
        }

        if let Some(packet) = source.tx.take_timeout(DISPATCH_PERIOD_MAX) {
            trace!(source = ?snapshot.source, sink = ?snapshot.sink, "frame routed");
            sink.rx.overwrite(packet);
        }
    }

    /// Pure endpoint resolution; `None` has no mailbox.
    fn interface_for(&self, endpoint: SourceSink) -> Option<&DmxInterface> {
        match endpoint {
            SourceSink::Timo => Some(&self.timo),
            SourceSink::Onboard => Some(&self.onboard),
            SourceSink::Artnet => Some(&self.artnet),
            SourceSink::None => None,
        }
    }

    /// RPC surface: sets one channel (1-based DMX address) of the shadow
    /// universe and forwards the whole universe as a network-origin frame.
    ///
    /// # Errors
    /// [`Error::InvalidArgument`] when the address is outside 1–512 or the
    /// value outside 0–255.
    pub fn set_channel(&self, address: u16, value: u16) -> Result<(), Error> {
        if address == 0 || address as usize > DMX_CHANNELS {
            return Err(Error::InvalidArgument("DMX address must be 1..=512"));
        }
        let Ok(value) = u8::try_from(value) else {
            return Err(Error::InvalidArgument("channel value must be 0..=255"));
        };

        let packet = {
            let mut universe = self.rpc_universe.lock();
            universe[address as usize - 1] = value;
            DmxPacket::from_channels(SourceSink::Artnet, *universe)
        };
        self.artnet.send(packet);
        Ok(())
    }
}

impl SettingsObserver for DmxSwitcher {
    /// Re-derives the route and output gate from pushed settings. Failures
    /// are logged; a settings push must never take down the dispatch task.
    fn settings_changed(&self, settings: &Settings) {
        if let Err(e) = self.set_route(settings.input, settings.output) {
            error!(error = %e, "failed to apply route from settings");
        }
        if let Err(e) = self.set_output_enabled(settings.output_enabled) {
            error!(error = %e, "failed to apply output enable from settings");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::SettingsStore;
    use std::sync::Arc;

    fn frame(source: SourceSink, first: u8) -> DmxPacket {
        let mut channels = [0u8; DMX_CHANNELS];
        channels[0] = first;
        DmxPacket::from_channels(source, channels)
    }

    #[test]
    fn initial_route_is_inactive() {
        let switcher = DmxSwitcher::new();
        assert_eq!(switcher.route(), (SourceSink::None, SourceSink::None));
        assert!(!switcher.output_enabled());
    }

    #[test]
    fn dispatch_with_no_route_does_nothing() {
        let switcher = DmxSwitcher::new();
        switcher.onboard().send(frame(SourceSink::Onboard, 1));
        switcher.dispatch();
        // The frame stays queued; nothing was pulled or delivered.
        assert!(switcher.onboard().tx.take().is_some());
        assert!(switcher.timo().rx.take().is_none());
    }

    #[test]
    fn dispatch_with_output_disabled_never_writes_the_sink() {
        let switcher = DmxSwitcher::new();
        switcher
            .set_route(SourceSink::Onboard, SourceSink::Timo)
            .unwrap();
        switcher.onboard().send(frame(SourceSink::Onboard, 7));
        switcher.dispatch();
        assert!(switcher.timo().rx.take().is_none());
    }

    #[test]
    fn dispatch_moves_one_frame_end_to_end() {
        let switcher = DmxSwitcher::new();
        switcher
            .set_route(SourceSink::Onboard, SourceSink::Timo)
            .unwrap();
        switcher.set_output_enabled(true).unwrap();

        let sent = frame(SourceSink::Onboard, 0xAA);
        switcher.onboard().send(sent);
        switcher.dispatch();

        let delivered = switcher.timo().rx.take().expect("frame routed to sink");
        assert_eq!(delivered, sent);
        // The source mailbox was drained.
        assert!(switcher.onboard().tx.take().is_none());
    }

    #[test]
    fn dispatch_delivers_only_the_newest_frame() {
        let switcher = DmxSwitcher::new();
        switcher
            .set_route(SourceSink::Artnet, SourceSink::Onboard)
            .unwrap();
        switcher.set_output_enabled(true).unwrap();

        switcher.artnet().send(frame(SourceSink::Artnet, 1));
        switcher.artnet().send(frame(SourceSink::Artnet, 2));
        switcher.dispatch();

        let delivered = switcher.onboard().rx.take().unwrap();
        assert_eq!(delivered.channels[0], 2);
    }

    #[test]
    fn set_channel_validates_bounds() {
        let switcher = DmxSwitcher::new();
        assert!(matches!(
            switcher.set_channel(0, 10),
            Err(Error::InvalidArgument(_))
        ));
        assert!(matches!(
            switcher.set_channel(513, 10),
            Err(Error::InvalidArgument(_))
        ));
        assert!(matches!(
            switcher.set_channel(1, 256),
            Err(Error::InvalidArgument(_))
        ));
    }

    #[test]
    fn set_channel_updates_one_byte_and_forwards_a_frame() {
        let switcher = DmxSwitcher::new();
        switcher.set_channel(1, 255).unwrap();

        let packet = switcher.artnet().tx.take().expect("frame forwarded");
        assert_eq!(packet.source, SourceSink::Artnet);
        assert_eq!(packet.start_code, 0);
        assert_eq!(packet.channels[0], 255);
        assert!(packet.channels[1..].iter().all(|&b| b == 0));

        // A later set replays the whole shadow universe.
        switcher.set_channel(512, 1).unwrap();
        let packet = switcher.artnet().tx.take().unwrap();
        assert_eq!(packet.channels[0], 255);
        assert_eq!(packet.channels[511], 1);
    }

    #[test]
    fn settings_push_reconfigures_the_route() {
        let store = SettingsStore::new(Settings::default());
        let switcher = Arc::new(DmxSwitcher::new());
        let observer: Arc<dyn SettingsObserver> = switcher.clone();
        store.subscribe(&observer);

        store.update(|s| {
            s.input = SourceSink::Onboard;
            s.output = SourceSink::Timo;
            s.output_enabled = true;
        });

        assert_eq!(switcher.route(), (SourceSink::Onboard, SourceSink::Timo));
        assert!(switcher.output_enabled());
    }
}
