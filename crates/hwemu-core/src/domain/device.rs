//! One emulated endpoint and its staged response buffer.

use crate::adapter::{AdapterHandle, DeviceLink};
use crate::domain::interface::InterfaceKind;
use crate::domain::store::PairStore;

/// Result of handing a request to a device.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TransferOutcome {
    /// A synchronous pair matched and its response is now staged.
    pub matched: bool,
    /// An earlier response had not been fully read and was discarded.
    pub data_loss: bool,
}

/// Response bytes waiting to be read, possibly over several reads.
#[derive(Debug, Clone, Default)]
pub struct StagedResponse {
    bytes: Vec<u8>,
    offset: usize,
}

impl StagedResponse {
    /// Replaces the staged response.  Returns `true` if unread bytes were
    /// overwritten.
    pub fn stage(&mut self, response: &[u8]) -> bool {
        let lost = self.pending() > 0;
        self.bytes.clear();
        self.bytes.extend_from_slice(response);
        self.offset = 0;
        lost
    }

    /// Consumes up to `max_len` bytes from the front of the staged response.
    pub fn read(&mut self, max_len: usize) -> Vec<u8> {
        let end = self.bytes.len().min(self.offset.saturating_add(max_len));
        let chunk = self.bytes[self.offset..end].to_vec();
        self.offset = end;
        if self.offset == self.bytes.len() {
            self.clear();
        }
        chunk
    }

    /// Number of staged bytes not yet read.
    pub fn pending(&self) -> usize {
        self.bytes.len() - self.offset
    }

    pub fn clear(&mut self) {
        self.bytes.clear();
        self.offset = 0;
    }
}

/// A live device of some interface kind.
#[derive(Debug)]
pub struct Device {
    kind: InterfaceKind,
    index: usize,
    pairs: PairStore,
    handle: AdapterHandle,
    link: DeviceLink,
    staged: StagedResponse,
}

impl Device {
    pub(crate) fn new(link: DeviceLink, handle: AdapterHandle) -> Self {
        let kind = link.kind();
        Self {
            kind,
            index: link.index(),
            pairs: PairStore::new(kind.max_pairs()),
            handle,
            link,
            staged: StagedResponse::default(),
        }
    }

    pub fn kind(&self) -> InterfaceKind {
        self.kind
    }

    pub fn index(&self) -> usize {
        self.index
    }

    /// `<kind><index>`, e.g. `tty0`.
    pub fn name(&self) -> String {
        self.kind.device_name(self.index)
    }

    pub fn pairs(&self) -> &PairStore {
        &self.pairs
    }

    pub fn pairs_mut(&mut self) -> &mut PairStore {
        &mut self.pairs
    }

    pub fn handle(&self) -> AdapterHandle {
        self.handle
    }

    pub fn link(&self) -> &DeviceLink {
        &self.link
    }

    /// Matches `request` and stages the response for [`read`](Self::read).
    ///
    /// A request that matches nothing discards any staged response.
    pub fn transfer(&mut self, request: &[u8]) -> TransferOutcome {
        let data_loss = self.staged.pending() > 0;
        let matched = match self.pairs.find_response(request) {
            Some(response) => {
                self.staged.stage(response);
                true
            }
            None => {
                self.staged.clear();
                false
            }
        };
        TransferOutcome { matched, data_loss }
    }

    /// Reads the next chunk of the staged response.
    pub fn read(&mut self, max_len: usize) -> Vec<u8> {
        self.staged.read(max_len)
    }

    /// Bytes of the staged response not yet read.
    pub fn pending(&self) -> usize {
        self.staged.pending()
    }
}
