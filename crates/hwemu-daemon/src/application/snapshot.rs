//! Point-in-time view of every device and pair.

use serde::{Deserialize, Serialize};

use hwemu_core::{Emulator, InterfaceKind};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    pub interfaces: Vec<InterfaceSnapshot>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InterfaceSnapshot {
    pub kind: InterfaceKind,
    pub devices: Vec<DeviceSnapshot>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceSnapshot {
    pub name: String,
    pub index: usize,
    /// Bytes staged and not yet read.
    pub pending: usize,
    pub pairs: Vec<PairSnapshot>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PairSnapshot {
    pub index: usize,
    /// Canonical text form, e.g. `timer:2s=01`.
    pub spec: String,
}

impl Snapshot {
    /// Compact single-line JSON.
    pub fn to_json(&self) -> String {
        // Serializing plain strings and integers cannot fail.
        serde_json::to_string(self).unwrap_or_else(|_| "{}".to_string())
    }
}

/// Captures every configured kind, locking one registry at a time.
///
/// Kinds are visited in registry order; the view is consistent per kind but
/// not across kinds.
pub fn capture(emulator: &Emulator) -> Snapshot {
    let interfaces = emulator
        .kinds()
        .filter_map(|kind| emulator.registry(kind).ok())
        .map(|registry| {
            let mut devices = Vec::new();
            registry.for_each_device(|device| {
                devices.push(DeviceSnapshot {
                    name: device.name(),
                    index: device.index(),
                    pending: device.pending(),
                    pairs: device
                        .pairs()
                        .iter()
                        .map(|pair| PairSnapshot {
                            index: pair.index(),
                            spec: pair.spec().to_string(),
                        })
                        .collect(),
                });
            });
            InterfaceSnapshot {
                kind: registry.kind(),
                devices,
            }
        })
        .collect();
    Snapshot { interfaces }
}
