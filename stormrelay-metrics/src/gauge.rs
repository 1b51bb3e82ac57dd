use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::RwLock;

/// A gauge holding the last value that was set.
///
/// Setting and reading the value does not lock.
#[derive(Debug)]
pub struct SettableGauge {
    bits: AtomicU64,
}

impl SettableGauge {
    /// Creates a gauge with an initial value.
    pub fn new(value: f64) -> Self {
        Self {
            bits: AtomicU64::new(value.to_bits()),
        }
    }

    /// Replaces the current value.
    pub fn set(&self, value: f64) {
        self.bits.store(value.to_bits(), Ordering::Relaxed);
    }

    /// Returns the last value that was set.
    pub fn value(&self) -> f64 {
        f64::from_bits(self.bits.load(Ordering::Relaxed))
    }
}

impl Default for SettableGauge {
    fn default() -> Self {
        Self::new(0.0)
    }
}

/// A registry of named gauges shared by the processors of one relay.
///
/// The registry is created once at startup and handed to every processor that exposes metrics
/// for introspection or periodic export. Gauges are never removed.
#[derive(Debug, Default)]
pub struct GaugeRegistry {
    gauges: RwLock<BTreeMap<String, Arc<SettableGauge>>>,
}

impl GaugeRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the gauge `name` to `value`, registering it if it does not exist yet.
    pub fn set(&self, name: &str, value: f64) -> Arc<SettableGauge> {
        if let Some(gauge) = self.gauges.read().get(name) {
            gauge.set(value);
            return Arc::clone(gauge);
        }

        let mut gauges = self.gauges.write();
        // Another thread may have registered the gauge since the read lock was released.
        let gauge = gauges
            .entry(name.to_owned())
            .or_insert_with(|| Arc::new(SettableGauge::default()));
        gauge.set(value);
        Arc::clone(gauge)
    }

    /// Returns the gauge registered under `name`.
    pub fn get(&self, name: &str) -> Option<Arc<SettableGauge>> {
        self.gauges.read().get(name).cloned()
    }

    /// Returns the number of registered gauges.
    pub fn len(&self) -> usize {
        self.gauges.read().len()
    }

    /// Returns `true` if no gauge has been registered.
    pub fn is_empty(&self) -> bool {
        self.gauges.read().is_empty()
    }

    /// Returns the current values of all gauges, sorted by name.
    pub fn snapshot(&self) -> BTreeMap<String, f64> {
        self.gauges
            .read()
            .iter()
            .map(|(name, gauge)| (name.clone(), gauge.value()))
            .collect()
    }
}
