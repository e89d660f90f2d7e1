//! In-process channel adapters.
//!
//! Each [`ChannelAdapter`] serves one interface kind.  Backends are plain
//! bookkeeping entries; unsolicited responses from periodic pairs are
//! forwarded as [`AsyncFrame`]s to a bounded tokio channel shared by all kinds.
//!
//! # Why a bounded channel? (for beginners)
//!
//! `async_receive` runs on the scheduler thread while the registry lock is
//! held, so it must never wait.  `try_send` either queues the frame
//! immediately or fails; on a full queue the frame is dropped with a warning
//! instead of stalling every device of the kind.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{debug, warn};

use hwemu_core::{
    Adapter, AdapterError, AdapterHandle, DeviceLink, Emulator, InterfaceKind, TraceOptions,
};

/// Default capacity of the async frame channel.
pub const DEFAULT_FRAME_CAPACITY: usize = 256;

/// One unsolicited response produced by a periodic pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AsyncFrame {
    pub kind: InterfaceKind,
    pub index: usize,
    pub bytes: Vec<u8>,
}

impl AsyncFrame {
    pub fn device_name(&self) -> String {
        self.kind.device_name(self.index)
    }
}

/// Adapter forwarding async responses of one kind into a channel.
#[derive(Debug)]
pub struct ChannelAdapter {
    kind: InterfaceKind,
    tx: mpsc::Sender<AsyncFrame>,
    backends: Mutex<HashMap<AdapterHandle, DeviceLink>>,
    next_handle: AtomicU64,
}

impl ChannelAdapter {
    pub fn new(kind: InterfaceKind, tx: mpsc::Sender<AsyncFrame>) -> Self {
        Self {
            kind,
            tx,
            backends: Mutex::new(HashMap::new()),
            next_handle: AtomicU64::new(1),
        }
    }

    /// Number of backends currently alive.
    pub fn backend_count(&self) -> usize {
        self.backends().len()
    }

    fn backends(&self) -> std::sync::MutexGuard<'_, HashMap<AdapterHandle, DeviceLink>> {
        self.backends.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Adapter for ChannelAdapter {
    fn create(&self, link: &DeviceLink) -> Result<AdapterHandle, AdapterError> {
        if link.kind() != self.kind {
            return Err(AdapterError::CreateFailed {
                device: link.name(),
                reason: format!("adapter serves {} devices only", self.kind),
            });
        }
        if self.tx.is_closed() {
            return Err(AdapterError::Closed);
        }

        let handle = AdapterHandle::new(self.next_handle.fetch_add(1, Ordering::Relaxed));
        self.backends().insert(handle, link.clone());
        debug!("{}: backend {} created", link.name(), handle.raw());
        Ok(handle)
    }

    fn destroy(&self, handle: AdapterHandle) {
        match self.backends().remove(&handle) {
            Some(link) => debug!("{}: backend {} destroyed", link.name(), handle.raw()),
            None => warn!("{} adapter: destroy of unknown backend {}", self.kind, handle.raw()),
        }
    }

    fn async_receive(&self, handle: AdapterHandle, response: &[u8]) {
        let Some(link) = self.backends().get(&handle).cloned() else {
            warn!("{} adapter: response for unknown backend {}", self.kind, handle.raw());
            return;
        };
        if !link.is_live() {
            return;
        }

        let frame = AsyncFrame {
            kind: link.kind(),
            index: link.index(),
            bytes: response.to_vec(),
        };
        match self.tx.try_send(frame) {
            Ok(()) => {}
            Err(TrySendError::Full(frame)) => warn!(
                "{}: async channel full, dropping {} byte(s)",
                frame.device_name(),
                frame.bytes.len()
            ),
            Err(TrySendError::Closed(_)) => {
                debug!("{}: async channel closed", link.name());
            }
        }
    }
}

/// Builds an emulator with a [`ChannelAdapter`] for every kind, all sharing
/// one frame channel of `capacity` entries.
pub fn channel_emulator(
    trace: TraceOptions,
    capacity: usize,
) -> (Emulator, mpsc::Receiver<AsyncFrame>) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    let builder = InterfaceKind::ALL
        .into_iter()
        .fold(Emulator::builder().trace(trace), |builder, kind| {
            builder.adapter(kind, Arc::new(ChannelAdapter::new(kind, tx.clone())))
        });
    (builder.build(), rx)
}
