//! Startup provisioning from the `[[devices]]` config entries.
//!
//! Entries are applied in file order.  The first failure stops provisioning;
//! devices created before it are left in place for the caller to tear down.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

use hwemu_core::{CoreError, Emulator, InterfaceKind};

/// One device to create, with its initial pairs in text form.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DeviceSpec {
    pub kind: InterfaceKind,
    #[serde(default)]
    pub pairs: Vec<String>,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ProvisionError {
    /// The device of entry `entry` (zero-based) could not be created.
    #[error("devices[{entry}]: cannot create {kind} device: {source}")]
    Device {
        entry: usize,
        kind: InterfaceKind,
        #[source]
        source: CoreError,
    },

    /// A pair of entry `entry` was rejected.
    #[error("devices[{entry}] ({device}): pair '{pair}': {source}")]
    Pair {
        entry: usize,
        device: String,
        pair: String,
        #[source]
        source: CoreError,
    },
}

/// Result of a successful provisioning run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Provisioned {
    /// Created devices in creation order.
    pub devices: Vec<(InterfaceKind, usize)>,
    pub pairs: usize,
}

/// Creates every device in `specs` and adds its pairs.
///
/// # Errors
///
/// The first [`ProvisionError`] encountered.
pub fn provision(emulator: &Emulator, specs: &[DeviceSpec]) -> Result<Provisioned, ProvisionError> {
    let mut done = Provisioned::default();

    for (entry, spec) in specs.iter().enumerate() {
        let index = emulator
            .add_device(spec.kind)
            .map_err(|source| ProvisionError::Device {
                entry,
                kind: spec.kind,
                source,
            })?;
        let device = spec.kind.device_name(index);

        for pair in &spec.pairs {
            emulator
                .add_pair(spec.kind, index, pair)
                .map_err(|source| ProvisionError::Pair {
                    entry,
                    device: device.clone(),
                    pair: pair.clone(),
                    source,
                })?;
        }
        debug!("provisioned {device} with {} pair(s)", spec.pairs.len());

        done.devices.push((spec.kind, index));
        done.pairs += spec.pairs.len();
    }

    if !done.devices.is_empty() {
        info!(
            "provisioned {} device(s), {} pair(s)",
            done.devices.len(),
            done.pairs
        );
    }
    Ok(done)
}
