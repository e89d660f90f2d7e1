//! Contract between the core and the per-kind protocol adapters.
//!
//! An adapter turns transport-specific traffic (a serial write, an I2C
//! transfer, a network frame) into calls against the registry, and turns
//! periodic responses from the scheduler back into transport traffic.  The
//! core never looks inside an [`AdapterHandle`]; it only stores it and hands
//! it back.
//!
//! # Locking rules
//!
//! [`Adapter::create`], [`Adapter::destroy`] and [`Adapter::async_receive`]
//! are all called while the kind's registry lock is held.  Implementations
//! must not call back into the same registry from these methods and must
//! return quickly.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use thiserror::Error;

use crate::domain::interface::InterfaceKind;

/// Errors reported by an adapter while creating a device backend.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AdapterError {
    /// The host-side resource could not be set up.
    #[error("cannot create backend for {device}: {reason}")]
    CreateFailed { device: String, reason: String },

    /// The adapter has been shut down and accepts no new devices.
    #[error("adapter closed")]
    Closed,
}

/// Opaque token identifying an adapter-side device backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AdapterHandle(u64);

impl AdapterHandle {
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    pub const fn raw(self) -> u64 {
        self.0
    }
}

#[derive(Debug)]
struct LinkState {
    kind: InterfaceKind,
    index: usize,
    live: AtomicBool,
}

/// Shared liveness flag of one device.
///
/// Adapters keep a clone so their data path can tell whether the device
/// still exists *before* taking the registry lock.  Deletion clears the flag
/// before any adapter resource is released, so a transfer racing with the
/// deletion sees "device gone" instead of a stale backend.
#[derive(Debug, Clone)]
pub struct DeviceLink(Arc<LinkState>);

impl DeviceLink {
    pub(crate) fn new(kind: InterfaceKind, index: usize) -> Self {
        Self(Arc::new(LinkState {
            kind,
            index,
            live: AtomicBool::new(true),
        }))
    }

    pub fn kind(&self) -> InterfaceKind {
        self.0.kind
    }

    pub fn index(&self) -> usize {
        self.0.index
    }

    /// Device name, e.g. `spi2`.
    pub fn name(&self) -> String {
        self.0.kind.device_name(self.0.index)
    }

    /// `false` once the device has started tearing down.
    pub fn is_live(&self) -> bool {
        self.0.live.load(Ordering::Acquire)
    }

    /// `true` if both links belong to the same device instance, even when a
    /// later device reuses the index.
    pub fn same_device(&self, other: &DeviceLink) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    pub(crate) fn retire(&self) {
        self.0.live.store(false, Ordering::Release);
    }
}

/// One protocol adapter, serving every device of a single interface kind.
#[cfg_attr(test, mockall::automock)]
pub trait Adapter: Send + Sync {
    /// Creates the backend for a newly added device.
    ///
    /// # Errors
    ///
    /// Any [`AdapterError`] rolls back the device creation; the registry
    /// reports it as [`CoreError::AdapterFailure`](crate::CoreError::AdapterFailure).
    fn create(&self, link: &DeviceLink) -> Result<AdapterHandle, AdapterError>;

    /// Releases the backend of a device being deleted.
    fn destroy(&self, handle: AdapterHandle);

    /// Delivers an unsolicited response produced by a periodic pair.
    ///
    /// Must not block.  A panic is caught and logged by the scheduler.
    fn async_receive(&self, handle: AdapterHandle, response: &[u8]);
}
