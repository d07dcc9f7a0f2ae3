//! The periodic task loops that tie the switcher and the transceiver
//! driver together, expressed as spawnable threads with explicit stop
//! flags. On the device these run as fixed-priority scheduler tasks; the
//! loop bodies are identical.

use crate::{
    settings::{Settings, SettingsObserver, SettingsStore},
    switcher::{DmxSwitcher, DISPATCH_PERIOD_MAX},
};
use crossbeam_channel::{bounded, Receiver, Sender};
use std::{
    io,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    thread::{self, JoinHandle},
    time::Duration,
};
use timo::{Bus, DmxDataSource, SoftwareConfig, Timo};
use tracing::{error, info};

/// Derives the transceiver configuration from bridge settings. The device
/// generates its wireless stream from the SPI-fed buffer, so the internal
/// data source stays `NoData`.
#[must_use]
pub fn software_config_from_settings(settings: &Settings) -> SoftwareConfig {
    SoftwareConfig {
        radio_enabled: settings.timo_radio_enabled(),
        tx_rx_mode: settings.timo_tx_rx(),
        rf_protocol: settings.rf_protocol,
        rf_power: settings.rf_power,
        dmx_source: DmxDataSource::NoData,
        universe_color: settings.universe_color,
        device_name: settings.device_name.clone(),
        universe_name: settings.universe_name.clone(),
    }
}

/// A settings observer that coalesces change notifications into a depth-1
/// channel, waking a task that polls between frame transfers.
pub struct ChannelNotifier {
    tx: Sender<()>,
}

impl ChannelNotifier {
    #[must_use]
    pub fn new() -> (Arc<Self>, Receiver<()>) {
        let (tx, rx) = bounded(1);
        (Arc::new(Self { tx }), rx)
    }
}

impl SettingsObserver for ChannelNotifier {
    fn settings_changed(&self, _settings: &Settings) {
        // A full channel already carries a pending wakeup; dropping the
        // extra send coalesces bursts into one reconfiguration.
        let _ = self.tx.try_send(());
    }
}

/// Spawns the periodic routing task.
///
/// # Errors
/// Fails only if the OS refuses to spawn the thread.
pub fn spawn_switcher(
    switcher: Arc<DmxSwitcher>,
    period: Duration,
    running: Arc<AtomicBool>,
) -> io::Result<JoinHandle<()>> {
    thread::Builder::new()
        .name("dmx-switcher".into())
        .spawn(move || {
            info!("switcher task started");
            while running.load(Ordering::Relaxed) {
                switcher.dispatch();
                thread::sleep(period);
            }
        })
}

/// Spawns the transceiver endpoint task: initializes the driver, applies
/// the boot configuration, then feeds routed frames into the device and
/// reapplies configuration whenever the settings channel fires. Returns
/// the driver when stopped.
///
/// Settings are user-generated and therefore fallible; a failed
/// configuration push is logged and the task keeps running at the device's
/// last-known-good state.
///
/// # Errors
/// Fails only if the OS refuses to spawn the thread.
pub fn spawn_timo<B>(
    mut driver: Timo<B>,
    switcher: Arc<DmxSwitcher>,
    settings: Arc<SettingsStore>,
    changes: Receiver<()>,
    running: Arc<AtomicBool>,
) -> io::Result<JoinHandle<Timo<B>>>
where
    B: Bus + Send + 'static,
{
    thread::Builder::new().name("timo-dmx".into()).spawn(move || {
        if let Err(e) = driver.init() {
            error!(error = %e, "transceiver init failed");
            return driver;
        }

        let boot = software_config_from_settings(&settings.get());
        if let Err(e) = driver.apply_config(&boot) {
            error!(error = %e, "boot configuration failed, continuing unconfigured");
        }
        info!("transceiver task started");

        while running.load(Ordering::Relaxed) {
            if let Some(packet) = switcher.timo().receive(DISPATCH_PERIOD_MAX) {
                if let Err(e) = driver.write_dmx(&packet.channels) {
                    error!(error = %e, source = ?packet.source, "failed to write DMX universe");
                }
            }

            if changes.try_recv().is_ok() {
                let target = software_config_from_settings(&settings.get());
                if target != *driver.sw_config() {
                    if let Err(e) = driver.apply_config(&target) {
                        error!(error = %e, "failed to apply new configuration");
                    }
                }
            }
        }
        driver
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        packet::{DmxPacket, SourceSink, DMX_CHANNELS},
        switcher::DISPATCH_PERIOD_MIN,
    };
    use timo::mock::MockBus;

    #[test]
    fn notifier_coalesces_bursts() {
        let (notifier, rx) = ChannelNotifier::new();
        let settings = Settings::default();
        notifier.settings_changed(&settings);
        notifier.settings_changed(&settings);
        notifier.settings_changed(&settings);
        assert!(rx.try_recv().is_ok());
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn routed_frames_reach_the_transceiver() {
        let switcher = Arc::new(DmxSwitcher::new());
        let settings = Arc::new(SettingsStore::new(Settings {
            input: SourceSink::Onboard,
            output: SourceSink::Timo,
            output_enabled: true,
            ..Settings::default()
        }));
        let observer: Arc<dyn SettingsObserver> = switcher.clone();
        settings.subscribe(&observer);
        settings.notify_all();

        let (_notifier, changes) = ChannelNotifier::new();
        let running = Arc::new(AtomicBool::new(true));

        let switcher_task = spawn_switcher(
            Arc::clone(&switcher),
            DISPATCH_PERIOD_MIN,
            Arc::clone(&running),
        )
        .unwrap();
        let timo_task = spawn_timo(
            Timo::new(MockBus::new()),
            Arc::clone(&switcher),
            Arc::clone(&settings),
            changes,
            Arc::clone(&running),
        )
        .unwrap();

        // Let the boot configuration settle, then feed one wired frame.
        thread::sleep(Duration::from_millis(300));
        let mut channels = [0u8; DMX_CHANNELS];
        channels[0] = 0x55;
        switcher
            .onboard()
            .send(DmxPacket::from_channels(SourceSink::Onboard, channels));
        thread::sleep(Duration::from_millis(100));

        running.store(false, Ordering::Relaxed);
        switcher_task.join().unwrap();
        let driver = timo_task.join().unwrap();

        let blocks = &driver.bus().dmx_blocks;
        assert!(!blocks.is_empty(), "universe reached the device");
        assert_eq!(blocks.len() % 4, 0);
        assert_eq!(blocks[0][0], 0x55);
    }
}
