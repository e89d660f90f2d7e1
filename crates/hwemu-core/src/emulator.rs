//! Front-end API over all interface registries.
//!
//! An [`Emulator`] maps each configured [`InterfaceKind`] to its
//! [`InterfaceRegistry`].  The map is built once by [`EmulatorBuilder`] and is
//! immutable afterwards, so dispatch by kind needs no lock; every operation
//! then locks only the registry of the kind it touches.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, info, warn};

use crate::adapter::Adapter;
use crate::domain::device::TransferOutcome;
use crate::domain::interface::InterfaceKind;
use crate::domain::pair::PairSpec;
use crate::error::CoreError;
use crate::registry::{InterfaceRegistry, TraceOptions};

/// Summary of one scheduler tick across all kinds.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TickReport {
    /// Responses handed to adapters.
    pub fired: usize,
    /// Kinds whose lock was busy and which were skipped.
    pub skipped: Vec<InterfaceKind>,
}

/// Collects one adapter per interface kind.
#[derive(Default)]
pub struct EmulatorBuilder {
    adapters: BTreeMap<InterfaceKind, Arc<dyn Adapter>>,
    trace: TraceOptions,
}

impl EmulatorBuilder {
    /// Registers the adapter serving `kind`.  A later call for the same kind
    /// replaces the earlier adapter.
    pub fn adapter(mut self, kind: InterfaceKind, adapter: Arc<dyn Adapter>) -> Self {
        self.adapters.insert(kind, adapter);
        self
    }

    /// Sets request/response tracing for every registry.
    pub fn trace(mut self, trace: TraceOptions) -> Self {
        self.trace = trace;
        self
    }

    pub fn build(self) -> Emulator {
        let trace = self.trace;
        let registries = self
            .adapters
            .into_iter()
            .map(|(kind, adapter)| (kind, InterfaceRegistry::new(kind, adapter).with_trace(trace)))
            .collect();
        Emulator { registries }
    }
}

/// The emulator core: one registry per configured interface kind.
#[derive(Debug)]
pub struct Emulator {
    registries: BTreeMap<InterfaceKind, InterfaceRegistry>,
}

impl Emulator {
    pub fn builder() -> EmulatorBuilder {
        EmulatorBuilder::default()
    }

    /// Kinds that have an adapter, in registry order.
    pub fn kinds(&self) -> impl Iterator<Item = InterfaceKind> + '_ {
        self.registries.keys().copied()
    }

    /// The registry of `kind`.
    ///
    /// # Errors
    ///
    /// [`CoreError::NotFound`] if no adapter was registered for `kind`.
    pub fn registry(&self, kind: InterfaceKind) -> Result<&InterfaceRegistry, CoreError> {
        self.registries
            .get(&kind)
            .ok_or_else(|| CoreError::NotFound(format!("{kind} interface")))
    }

    // ── Devices ───────────────────────────────────────────────────────────────

    pub fn add_device(&self, kind: InterfaceKind) -> Result<usize, CoreError> {
        self.registry(kind)?.add_device()
    }

    pub fn delete_device(&self, kind: InterfaceKind, index: usize) -> Result<(), CoreError> {
        self.registry(kind)?.delete_device(index)
    }

    /// Live device indices of `kind` in insertion order.
    pub fn devices(&self, kind: InterfaceKind) -> Result<Vec<usize>, CoreError> {
        Ok(self.registry(kind)?.device_indices())
    }

    /// Resolves a device given by index (`3`) or by name (`tty3`).
    ///
    /// Returns `None` if the device does not exist.
    pub fn find_device(&self, kind: InterfaceKind, target: &str) -> Option<usize> {
        let registry = self.registry(kind).ok()?;
        match target.parse::<usize>() {
            Ok(index) => registry.contains(index).then_some(index),
            Err(_) => registry.find_device(target),
        }
    }

    // ── Pairs ─────────────────────────────────────────────────────────────────

    pub fn pair_count(&self, kind: InterfaceKind, index: usize) -> Result<usize, CoreError> {
        self.registry(kind)?.pair_count(index)
    }

    pub fn get_pair(
        &self,
        kind: InterfaceKind,
        index: usize,
        pair_index: usize,
    ) -> Result<String, CoreError> {
        self.registry(kind)?.get_pair(index, pair_index)
    }

    pub fn pairs(&self, kind: InterfaceKind, index: usize) -> Result<Vec<(usize, PairSpec)>, CoreError> {
        self.registry(kind)?.pairs(index)
    }

    pub fn add_pair(&self, kind: InterfaceKind, index: usize, spec: &str) -> Result<usize, CoreError> {
        self.registry(kind)?.add_pair(index, spec)
    }

    pub fn delete_pair(
        &self,
        kind: InterfaceKind,
        index: usize,
        pair_index: usize,
    ) -> Result<(), CoreError> {
        self.registry(kind)?.delete_pair(index, pair_index)
    }

    pub fn clear_pairs(&self, kind: InterfaceKind, index: usize) -> Result<(), CoreError> {
        self.registry(kind)?.clear_pairs(index)
    }

    /// Looks up the response mapped to `request` without staging it.
    pub fn match_request(
        &self,
        kind: InterfaceKind,
        index: usize,
        request: &[u8],
    ) -> Result<Option<Vec<u8>>, CoreError> {
        self.registry(kind)?.match_request(index, request)
    }

    // ── Data path ─────────────────────────────────────────────────────────────

    pub fn write(
        &self,
        kind: InterfaceKind,
        index: usize,
        request: &[u8],
    ) -> Result<TransferOutcome, CoreError> {
        self.registry(kind)?.write(index, request)
    }

    pub fn read(&self, kind: InterfaceKind, index: usize, max_len: usize) -> Result<Vec<u8>, CoreError> {
        self.registry(kind)?.read(index, max_len)
    }

    pub fn respond(
        &self,
        kind: InterfaceKind,
        index: usize,
        request: &[u8],
    ) -> Result<Option<Vec<u8>>, CoreError> {
        self.registry(kind)?.respond(index, request)
    }

    /// Matches `request` and reads up to `max_len` bytes in one locked step.
    pub fn write_read(
        &self,
        kind: InterfaceKind,
        index: usize,
        request: &[u8],
        max_len: usize,
    ) -> Result<Option<Vec<u8>>, CoreError> {
        self.registry(kind)?.write_read(index, request, max_len)
    }

    // ── Scheduling and teardown ───────────────────────────────────────────────

    /// Runs one scheduler pass at `now` over every kind.
    ///
    /// A kind whose lock is held is skipped and retried on the next tick.
    pub fn tick(&self, now: Instant) -> TickReport {
        let mut report = TickReport::default();
        for (kind, registry) in &self.registries {
            match registry.tick(now) {
                Ok(fired) => report.fired += fired,
                Err(CoreError::Busy) => {
                    debug!("{kind} interface busy, skipping tick");
                    report.skipped.push(*kind);
                }
                Err(e) => warn!("{kind} tick failed: {e}"),
            }
        }
        report
    }

    /// Deletes every device of every kind, last kind first.  Returns how many
    /// devices were deleted.
    pub fn shutdown(&self) -> usize {
        let deleted: usize = self
            .registries
            .values()
            .rev()
            .map(InterfaceRegistry::shutdown)
            .sum();
        if deleted > 0 {
            info!("deleted {deleted} device(s)");
        }
        deleted
    }
}

impl Drop for Emulator {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::adapter::{AdapterHandle, MockAdapter};

    fn adapter() -> Arc<dyn Adapter> {
        let mut mock = MockAdapter::new();
        mock.expect_create()
            .returning(|link| Ok(AdapterHandle::new(link.index() as u64)));
        mock.expect_destroy().returning(|_| ());
        mock.expect_async_receive().returning(|_, _| ());
        Arc::new(mock)
    }

    fn emulator() -> Emulator {
        Emulator::builder()
            .adapter(InterfaceKind::Tty, adapter())
            .adapter(InterfaceKind::I2c, adapter())
            .build()
    }

    #[test]
    fn test_kinds_are_independent() {
        let emu = emulator();
        assert_eq!(emu.add_device(InterfaceKind::Tty), Ok(0));
        assert_eq!(emu.add_device(InterfaceKind::I2c), Ok(0));
        assert_eq!(emu.add_device(InterfaceKind::Tty), Ok(1));
        assert_eq!(emu.devices(InterfaceKind::I2c), Ok(vec![0]));
    }

    #[test]
    fn test_unconfigured_kind_is_not_found() {
        let emu = emulator();
        assert_eq!(
            emu.add_device(InterfaceKind::Net),
            Err(CoreError::NotFound("net interface".to_string()))
        );
        assert_eq!(emu.find_device(InterfaceKind::Net, "0"), None);
    }

    #[test]
    fn test_find_device_accepts_index_or_name() {
        let emu = emulator();
        emu.add_device(InterfaceKind::Tty).unwrap();
        emu.add_device(InterfaceKind::Tty).unwrap();

        assert_eq!(emu.find_device(InterfaceKind::Tty, "1"), Some(1));
        assert_eq!(emu.find_device(InterfaceKind::Tty, "tty1"), Some(1));
        assert_eq!(emu.find_device(InterfaceKind::Tty, "tty9"), None);
        assert_eq!(emu.find_device(InterfaceKind::Tty, "i2c0"), None);
    }

    #[test]
    fn test_duplicate_request_allowed_on_other_device() {
        // Arrange
        let emu = emulator();
        let a = emu.add_device(InterfaceKind::Tty).unwrap();
        let b = emu.add_device(InterfaceKind::Tty).unwrap();
        emu.add_pair(InterfaceKind::Tty, a, "0102=03").unwrap();

        // Act
        let same_device = emu.add_pair(InterfaceKind::Tty, a, "0102=04");
        let other_device = emu.add_pair(InterfaceKind::Tty, b, "0102=04");

        // Assert
        assert_eq!(same_device, Err(CoreError::Duplicate { existing: 0 }));
        assert_eq!(other_device, Ok(0));
    }

    #[test]
    fn test_tick_reports_fired_and_skipped_kinds() {
        let emu = emulator();
        let dev = emu.add_device(InterfaceKind::I2c).unwrap();
        emu.add_pair(InterfaceKind::I2c, dev, "timer:1s=ff").unwrap();
        let t0 = Instant::now();

        assert_eq!(emu.tick(t0), TickReport::default());
        let report = emu.tick(t0 + Duration::from_secs(1));

        assert_eq!(report.fired, 1);
        assert!(report.skipped.is_empty());
    }

    #[test]
    fn test_shutdown_empties_every_registry() {
        let emu = emulator();
        emu.add_device(InterfaceKind::Tty).unwrap();
        emu.add_device(InterfaceKind::I2c).unwrap();
        emu.add_device(InterfaceKind::I2c).unwrap();

        assert_eq!(emu.shutdown(), 3);
        assert_eq!(emu.devices(InterfaceKind::I2c), Ok(vec![]));
        assert_eq!(emu.shutdown(), 0);
    }
}
