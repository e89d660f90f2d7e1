//! Interface kinds and their compile-time limits.
//!
//! Every emulated endpoint belongs to exactly one [`InterfaceKind`].  The set
//! of kinds is closed: adding a new kind means adding a variant here and an
//! adapter implementation for it.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Maximum number of devices per interface kind.
///
/// Some host infrastructures (e.g. the SPI character device layer) cap the
/// number of minors at 256.
pub const MAX_DEVICES: usize = 256;

/// Maximum number of request-response pairs per device.
pub const MAX_PAIRS: usize = 1000;

/// Maximum length of a request in bytes.
pub const MAX_REQUEST: usize = (4096 - 1) / 4;

/// Maximum length of a response in bytes.
pub const MAX_RESPONSE: usize = (4096 - 1) / 4;

/// The category of an emulated endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InterfaceKind {
    /// Serial line.
    Tty,
    /// Two-wire bus.
    I2c,
    /// Synchronous serial bus.
    Spi,
    /// Network interface.
    Net,
}

impl InterfaceKind {
    /// All kinds, in registry order.
    pub const ALL: [InterfaceKind; 4] = [
        InterfaceKind::Tty,
        InterfaceKind::I2c,
        InterfaceKind::Spi,
        InterfaceKind::Net,
    ];

    /// Lower-case name used in device names and the control language.
    pub fn as_str(self) -> &'static str {
        match self {
            InterfaceKind::Tty => "tty",
            InterfaceKind::I2c => "i2c",
            InterfaceKind::Spi => "spi",
            InterfaceKind::Net => "net",
        }
    }

    /// Maximum number of live devices of this kind.
    pub fn max_devices(self) -> usize {
        MAX_DEVICES
    }

    /// Maximum number of pairs on a single device of this kind.
    pub fn max_pairs(self) -> usize {
        MAX_PAIRS
    }

    /// Builds the canonical device name, e.g. `tty0`.
    pub fn device_name(self, index: usize) -> String {
        format!("{}{index}", self.as_str())
    }

    /// Splits a device name such as `i2c12` into its index.
    ///
    /// Returns `None` if the name does not start with this kind's prefix or
    /// the remainder is not a decimal number.
    pub fn parse_device_name(self, name: &str) -> Option<usize> {
        let digits = name.strip_prefix(self.as_str())?;
        if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        digits.parse().ok()
    }
}

impl fmt::Display for InterfaceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Returned when a string does not name a known interface kind.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("unsupported interface: {0}")]
pub struct UnknownInterface(pub String);

impl FromStr for InterfaceKind {
    type Err = UnknownInterface;

    /// Accepts both the lower-case and upper-case spelling (`tty`, `TTY`).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        InterfaceKind::ALL
            .into_iter()
            .find(|k| s == k.as_str() || s == k.as_str().to_ascii_uppercase())
            .ok_or_else(|| UnknownInterface(s.to_string()))
    }
}
