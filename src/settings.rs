//! Bridge settings and the change-notification contract.
//!
//! Persistence itself lives outside the core (the storage task writes
//! whatever backing store the platform has); this module holds the current
//! values and pushes change notifications to whoever subscribed. The
//! switcher and the transceiver task each re-derive only the fields
//! relevant to them.

use crate::packet::SourceSink;
use parking_lot::Mutex;
use std::sync::{Arc, Weak};
use timo::{Rgb, RfPower, RfProtocol, TxRxMode};
use tracing::debug;

/// The externally persisted configuration the core reacts to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub input: SourceSink,
    pub output: SourceSink,
    pub output_enabled: bool,
    pub rf_protocol: RfProtocol,
    pub rf_power: RfPower,
    pub universe_color: Rgb,
    pub device_name: String,
    pub universe_name: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            input: SourceSink::None,
            output: SourceSink::None,
            output_enabled: false,
            rf_protocol: RfProtocol::default(),
            rf_power: RfPower::default(),
            universe_color: Rgb::RED,
            device_name: "DMX Bridge".to_string(),
            universe_name: "Universe 1".to_string(),
        }
    }
}

impl Settings {
    /// The transceiver transmits when it is the active output, otherwise it
    /// listens.
    #[must_use]
    pub fn timo_tx_rx(&self) -> TxRxMode {
        if self.output == SourceSink::Timo {
            TxRxMode::Tx
        } else {
            TxRxMode::Rx
        }
    }

    /// The radio is only powered while output is enabled and the
    /// transceiver is part of the active route.
    #[must_use]
    pub fn timo_radio_enabled(&self) -> bool {
        self.output_enabled
            && (self.output == SourceSink::Timo || self.input == SourceSink::Timo)
    }
}

/// Implemented by components that need to react when persisted settings
/// change.
pub trait SettingsObserver: Send + Sync {
    fn settings_changed(&self, settings: &Settings);
}

/// Holds the current settings and the observer registry.
///
/// Observers are held weakly; one that has been dropped is pruned on the
/// next notification instead of keeping the component alive.
#[derive(Default)]
pub struct SettingsStore {
    current: Mutex<Settings>,
    observers: Mutex<Vec<Weak<dyn SettingsObserver>>>,
}

impl SettingsStore {
    #[must_use]
    pub fn new(initial: Settings) -> Self {
        Self {
            current: Mutex::new(initial),
            observers: Mutex::new(Vec::new()),
        }
    }

    /// A copy of the current settings.
    #[must_use]
    pub fn get(&self) -> Settings {
        self.current.lock().clone()
    }

    /// Registers an observer. Subscribing the same observer twice is a
    /// no-op.
    pub fn subscribe(&self, observer: &Arc<dyn SettingsObserver>) {
        let mut observers = self.observers.lock();
        if !observers
            .iter()
            .any(|existing| existing.as_ptr() == Arc::as_ptr(observer))
        {
            observers.push(Arc::downgrade(observer));
        }
    }

    pub fn unsubscribe(&self, observer: &Arc<dyn SettingsObserver>) {
        self.observers
            .lock()
            .retain(|existing| existing.as_ptr() != Arc::as_ptr(observer));
    }

    /// Mutates the settings in place and notifies observers, but only when
    /// the stored value actually changed.
    pub fn update(&self, mutate: impl FnOnce(&mut Settings)) {
        let snapshot = {
            let mut current = self.current.lock();
            let before = current.clone();
            mutate(&mut current);
            if *current == before {
                return;
            }
            current.clone()
        };
        debug!("settings changed, notifying observers");
        self.notify(&snapshot);
    }

    /// Pushes the current settings to every live observer, e.g. after the
    /// storage task has loaded persisted values at boot.
    pub fn notify_all(&self) {
        let snapshot = self.get();
        self.notify(&snapshot);
    }

    fn notify(&self, snapshot: &Settings) {
        let live: Vec<Arc<dyn SettingsObserver>> = {
            let mut observers = self.observers.lock();
            observers.retain(|observer| observer.strong_count() > 0);
            observers.iter().filter_map(Weak::upgrade).collect()
        };
        for observer in live {
            observer.settings_changed(snapshot);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Counter(AtomicUsize);

    impl SettingsObserver for Counter {
        fn settings_changed(&self, _settings: &Settings) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn update_notifies_only_on_change() {
        let store = SettingsStore::new(Settings::default());
        let counter = Arc::new(Counter(AtomicUsize::new(0)));
        let observer: Arc<dyn SettingsObserver> = counter.clone();
        store.subscribe(&observer);

        store.update(|s| s.output_enabled = true);
        assert_eq!(counter.0.load(Ordering::SeqCst), 1);

        // Writing the same value again is not a change.
        store.update(|s| s.output_enabled = true);
        assert_eq!(counter.0.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn unsubscribe_stops_notifications() {
        let store = SettingsStore::new(Settings::default());
        let counter = Arc::new(Counter(AtomicUsize::new(0)));
        let observer: Arc<dyn SettingsObserver> = counter.clone();
        store.subscribe(&observer);
        store.unsubscribe(&observer);

        store.update(|s| s.output_enabled = true);
        assert_eq!(counter.0.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn dropped_observers_are_pruned() {
        let store = SettingsStore::new(Settings::default());
        {
            let counter = Arc::new(Counter(AtomicUsize::new(0)));
            let observer: Arc<dyn SettingsObserver> = counter;
            store.subscribe(&observer);
        }
        store.update(|s| s.output_enabled = true);
        assert!(store.observers.lock().is_empty());
    }

    #[test]
    fn derived_radio_settings() {
        let mut s = Settings {
            input: SourceSink::Onboard,
            output: SourceSink::Timo,
            output_enabled: true,
            ..Settings::default()
        };
        assert_eq!(s.timo_tx_rx(), TxRxMode::Tx);
        assert!(s.timo_radio_enabled());

        s.output = SourceSink::Onboard;
        s.input = SourceSink::Timo;
        assert_eq!(s.timo_tx_rx(), TxRxMode::Rx);
        assert!(s.timo_radio_enabled());

        s.output_enabled = false;
        assert!(!s.timo_radio_enabled());
    }
}
