//! Per-kind interface registry.
//!
//! An [`InterfaceRegistry`] owns every device of one interface kind together
//! with the index allocator for those devices.  A single mutex guards the
//! device list and every pair store beneath it, so all operations on one kind
//! are linearised while different kinds proceed independently.
//!
//! # Locking (for adapter authors)
//!
//! The lock is not reentrant.  [`Adapter`] callbacks run while it is held and
//! must never call back into the registry of the same kind.  Data-path callers
//! that hold a [`DeviceLink`] should use the `*_linked` methods: they check
//! the link before locking and fail with [`CoreError::NotFound`] once the
//! device has started tearing down.

use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, TryLockError};
use std::time::Instant;

use tracing::{debug, error, info, warn};

use crate::adapter::{Adapter, DeviceLink};
use crate::domain::device::{Device, TransferOutcome};
use crate::domain::index::IndexAllocator;
use crate::domain::interface::InterfaceKind;
use crate::domain::pair::PairSpec;
use crate::error::CoreError;

/// Request/response tracing switches.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TraceOptions {
    /// Log every request handed to a device, with a hex dump.
    pub log_requests: bool,
    /// Log every response delivered by a device, with a hex dump.
    pub log_responses: bool,
}

/// State guarded by the registry lock.
#[derive(Debug)]
struct Devices {
    /// Live devices in insertion order.
    list: Vec<Device>,
    indices: IndexAllocator,
}

impl Devices {
    fn position(&self, index: usize) -> Option<usize> {
        self.list.iter().position(|d| d.index() == index)
    }

    fn get(&self, index: usize) -> Option<&Device> {
        self.list.iter().find(|d| d.index() == index)
    }

    fn get_mut(&mut self, index: usize) -> Option<&mut Device> {
        self.list.iter_mut().find(|d| d.index() == index)
    }
}

/// The devices of one interface kind and the adapter that backs them.
pub struct InterfaceRegistry {
    kind: InterfaceKind,
    adapter: Arc<dyn Adapter>,
    trace: TraceOptions,
    devices: Mutex<Devices>,
}

impl fmt::Debug for InterfaceRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InterfaceRegistry")
            .field("kind", &self.kind)
            .field("trace", &self.trace)
            .finish_non_exhaustive()
    }
}

impl InterfaceRegistry {
    /// Creates an empty registry for `kind` backed by `adapter`.
    pub fn new(kind: InterfaceKind, adapter: Arc<dyn Adapter>) -> Self {
        Self {
            kind,
            adapter,
            trace: TraceOptions::default(),
            devices: Mutex::new(Devices {
                list: Vec::new(),
                indices: IndexAllocator::new(kind.max_devices()),
            }),
        }
    }

    /// Sets the request/response tracing switches.
    pub fn with_trace(mut self, trace: TraceOptions) -> Self {
        self.trace = trace;
        self
    }

    pub fn kind(&self) -> InterfaceKind {
        self.kind
    }

    // A panic inside an adapter callback must not lock the kind out forever,
    // so poisoning is ignored.
    fn lock(&self) -> MutexGuard<'_, Devices> {
        self.devices.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn check_range(&self, index: usize) -> Result<(), CoreError> {
        let max = self.kind.max_devices();
        if index >= max {
            return Err(CoreError::OutOfRange { index, max });
        }
        Ok(())
    }

    fn missing(&self, index: usize) -> CoreError {
        CoreError::NotFound(self.kind.device_name(index))
    }

    // ── Device lifecycle ──────────────────────────────────────────────────────

    /// Creates a device at the lowest free index and returns that index.
    ///
    /// # Errors
    ///
    /// - [`CoreError::OutOfCapacity`] when every index is in use.
    /// - [`CoreError::OutOfMemory`] when the device list cannot grow.
    /// - [`CoreError::AdapterFailure`] when the adapter refuses the device; the
    ///   index stays free and nothing is linked.
    pub fn add_device(&self) -> Result<usize, CoreError> {
        let mut devices = self.lock();

        let index = devices
            .indices
            .lowest_free()
            .ok_or(CoreError::OutOfCapacity {
                max: self.kind.max_devices(),
            })?;
        devices
            .list
            .try_reserve(1)
            .map_err(|_| CoreError::OutOfMemory)?;

        let link = DeviceLink::new(self.kind, index);
        let handle = match self.adapter.create(&link) {
            Ok(handle) => handle,
            Err(e) => {
                link.retire();
                error!("{}: {e}", link.name());
                return Err(CoreError::AdapterFailure(e.to_string()));
            }
        };

        devices.indices.take(index);
        devices.list.push(Device::new(link, handle));
        debug!("{} created", self.kind.device_name(index));
        Ok(index)
    }

    /// Deletes a device: retires its link, destroys the adapter backend,
    /// clears its pairs, unlinks it and frees its index, in that order.
    ///
    /// # Errors
    ///
    /// [`CoreError::OutOfRange`] or [`CoreError::NotFound`].
    pub fn delete_device(&self, index: usize) -> Result<(), CoreError> {
        self.check_range(index)?;
        let mut devices = self.lock();
        let pos = devices.position(index).ok_or_else(|| self.missing(index))?;
        self.destroy_at(&mut devices, pos);
        Ok(())
    }

    fn destroy_at(&self, devices: &mut Devices, pos: usize) {
        let device = &mut devices.list[pos];
        device.link().retire();
        self.adapter.destroy(device.handle());
        device.pairs_mut().clear();

        let device = devices.list.remove(pos);
        devices.indices.release(device.index());
        debug!("{} deleted", device.name());
    }

    /// Deletes every device, most recently added first.  Returns how many
    /// devices were deleted.
    pub fn shutdown(&self) -> usize {
        let mut devices = self.lock();
        let count = devices.list.len();
        while let Some(pos) = devices.list.len().checked_sub(1) {
            self.destroy_at(&mut devices, pos);
        }
        count
    }

    // ── Lookup ────────────────────────────────────────────────────────────────

    /// Number of live devices.
    pub fn len(&self) -> usize {
        self.lock().list.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, index: usize) -> bool {
        self.lock().get(index).is_some()
    }

    /// Indices of live devices in insertion order.
    pub fn device_indices(&self) -> Vec<usize> {
        self.lock().list.iter().map(Device::index).collect()
    }

    /// Resolves a device name such as `tty0` to the index of a live device.
    pub fn find_device(&self, name: &str) -> Option<usize> {
        let index = self.kind.parse_device_name(name)?;
        self.contains(index).then_some(index)
    }

    /// Visits every device in insertion order with the lock held.
    pub fn for_each_device(&self, mut f: impl FnMut(&Device)) {
        self.lock().list.iter().for_each(|d| f(d));
    }

    /// Runs `f` on the device at `index` with the lock held.
    ///
    /// # Errors
    ///
    /// [`CoreError::OutOfRange`] or [`CoreError::NotFound`].
    pub fn with_device<R>(&self, index: usize, f: impl FnOnce(&Device) -> R) -> Result<R, CoreError> {
        self.check_range(index)?;
        let devices = self.lock();
        let device = devices.get(index).ok_or_else(|| self.missing(index))?;
        Ok(f(device))
    }

    /// Mutable variant of [`with_device`](Self::with_device).
    pub fn with_device_mut<R>(
        &self,
        index: usize,
        f: impl FnOnce(&mut Device) -> R,
    ) -> Result<R, CoreError> {
        self.check_range(index)?;
        let mut devices = self.lock();
        let device = devices.get_mut(index).ok_or_else(|| self.missing(index))?;
        Ok(f(device))
    }

    // ── Pairs ─────────────────────────────────────────────────────────────────

    /// Parses `spec` and adds it to the device.  Returns the pair index.
    ///
    /// The text is parsed before the lock is taken.
    pub fn add_pair(&self, index: usize, spec: &str) -> Result<usize, CoreError> {
        let spec: PairSpec = spec.parse()?;
        self.add_pair_spec(index, spec)
    }

    /// Adds an already parsed pair to the device.
    pub fn add_pair_spec(&self, index: usize, spec: PairSpec) -> Result<usize, CoreError> {
        self.with_device_mut(index, |d| d.pairs_mut().add(spec))?
    }

    pub fn delete_pair(&self, index: usize, pair_index: usize) -> Result<(), CoreError> {
        self.with_device_mut(index, |d| d.pairs_mut().remove(pair_index).map(drop))?
    }

    pub fn clear_pairs(&self, index: usize) -> Result<(), CoreError> {
        self.with_device_mut(index, |d| d.pairs_mut().clear())
    }

    pub fn pair_count(&self, index: usize) -> Result<usize, CoreError> {
        self.with_device(index, |d| d.pairs().len())
    }

    /// The canonical text of one pair.
    pub fn get_pair(&self, index: usize, pair_index: usize) -> Result<String, CoreError> {
        self.with_device(index, |d| {
            d.pairs().get(pair_index).map(|p| p.spec().to_string())
        })?
    }

    /// Every pair of the device with its index, in index order.
    pub fn pairs(&self, index: usize) -> Result<Vec<(usize, PairSpec)>, CoreError> {
        self.with_device(index, |d| {
            d.pairs()
                .iter()
                .map(|p| (p.index(), p.spec().clone()))
                .collect()
        })
    }

    /// Looks up the response mapped to `request` without staging it.
    pub fn match_request(&self, index: usize, request: &[u8]) -> Result<Option<Vec<u8>>, CoreError> {
        self.with_device(index, |d| d.pairs().find_response(request).map(<[u8]>::to_vec))
    }

    // ── Data path ─────────────────────────────────────────────────────────────

    /// Hands `request` to the device, staging the matched response.
    pub fn write(&self, index: usize, request: &[u8]) -> Result<TransferOutcome, CoreError> {
        self.with_device_mut(index, |d| self.transfer(d, request))
    }

    /// Reads up to `max_len` bytes of the staged response.  Empty when
    /// nothing is staged.
    pub fn read(&self, index: usize, max_len: usize) -> Result<Vec<u8>, CoreError> {
        self.with_device_mut(index, |d| self.deliver(d, max_len))
    }

    /// Serial-line style exchange: match `request` and return the whole
    /// response in one locked step.
    pub fn respond(&self, index: usize, request: &[u8]) -> Result<Option<Vec<u8>>, CoreError> {
        self.with_device_mut(index, |d| self.exchange(d, request, usize::MAX))
    }

    /// [`write`](Self::write) followed by [`read`](Self::read) of up to
    /// `max_len` bytes, under one lock.  `None` when nothing matched.
    pub fn write_read(
        &self,
        index: usize,
        request: &[u8],
        max_len: usize,
    ) -> Result<Option<Vec<u8>>, CoreError> {
        self.with_device_mut(index, |d| self.exchange(d, request, max_len))
    }

    /// [`write`](Self::write) for a caller holding the device's link.
    pub fn write_linked(&self, link: &DeviceLink, request: &[u8]) -> Result<TransferOutcome, CoreError> {
        self.with_linked(link, |d| self.transfer(d, request))
    }

    /// [`read`](Self::read) for a caller holding the device's link.
    pub fn read_linked(&self, link: &DeviceLink, max_len: usize) -> Result<Vec<u8>, CoreError> {
        self.with_linked(link, |d| self.deliver(d, max_len))
    }

    /// [`respond`](Self::respond) for a caller holding the device's link.
    pub fn respond_linked(
        &self,
        link: &DeviceLink,
        request: &[u8],
    ) -> Result<Option<Vec<u8>>, CoreError> {
        self.with_linked(link, |d| self.exchange(d, request, usize::MAX))
    }

    fn with_linked<R>(&self, link: &DeviceLink, f: impl FnOnce(&mut Device) -> R) -> Result<R, CoreError> {
        if !link.is_live() || link.kind() != self.kind {
            return Err(CoreError::NotFound(link.name()));
        }
        let mut devices = self.lock();
        let device = devices
            .get_mut(link.index())
            .filter(|d| d.link().same_device(link))
            .ok_or_else(|| CoreError::NotFound(link.name()))?;
        Ok(f(device))
    }

    fn transfer(&self, device: &mut Device, request: &[u8]) -> TransferOutcome {
        let outcome = device.transfer(request);
        if outcome.data_loss {
            warn!(
                "{}: new request arrived while previous one is pending; possible data loss",
                device.name()
            );
        }
        if self.trace.log_requests {
            info!(
                "{} <-- {} byte(s) (response {}available) {}",
                device.name(),
                request.len(),
                if outcome.matched { "" } else { "not " },
                hex::encode(request)
            );
        }
        outcome
    }

    fn deliver(&self, device: &mut Device, max_len: usize) -> Vec<u8> {
        let chunk = device.read(max_len);
        if self.trace.log_responses && !chunk.is_empty() {
            info!("{} --> {} byte(s) {}", device.name(), chunk.len(), hex::encode(&chunk));
        }
        chunk
    }

    fn exchange(&self, device: &mut Device, request: &[u8], max_len: usize) -> Option<Vec<u8>> {
        self.transfer(device, request)
            .matched
            .then(|| self.deliver(device, max_len))
    }

    // ── Scheduling ────────────────────────────────────────────────────────────

    /// Fires every periodic pair that is due at `now`.
    ///
    /// Never blocks: if the lock is held elsewhere the tick is skipped with
    /// [`CoreError::Busy`] and the pairs are reconsidered on the next tick.
    /// Returns the number of responses delivered to the adapter.
    pub fn tick(&self, now: Instant) -> Result<usize, CoreError> {
        let mut devices = match self.devices.try_lock() {
            Ok(guard) => guard,
            Err(TryLockError::Poisoned(poisoned)) => poisoned.into_inner(),
            Err(TryLockError::WouldBlock) => return Err(CoreError::Busy),
        };

        let mut fired = 0;
        for device in devices.list.iter_mut() {
            let handle = device.handle();
            let index = device.index();
            for pair in device.pairs_mut().iter_mut() {
                if !pair.poll_due(now) {
                    continue;
                }
                fired += 1;
                let response = pair.spec().response();
                if self.trace.log_responses {
                    info!(
                        "{} --> {} byte(s) {} (async)",
                        self.kind.device_name(index),
                        response.len(),
                        hex::encode(response)
                    );
                }
                let delivered = panic::catch_unwind(AssertUnwindSafe(|| {
                    self.adapter.async_receive(handle, response)
                }));
                if delivered.is_err() {
                    error!(
                        "{}: adapter panicked while receiving async response of pair {}",
                        self.kind.device_name(index),
                        pair.index()
                    );
                }
            }
        }
        Ok(fired)
    }
}
