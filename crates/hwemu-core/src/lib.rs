//! # hwemu-core
//!
//! Core of the hwemu peripheral emulator: a registry of emulated devices per
//! interface kind, the request-response pairs programmed into each device,
//! and the scheduler that emits periodic responses.
//!
//! This crate does no network or file-system I/O.  Protocol adapters and
//! control front ends live in the daemon crate and talk to the core through
//! [`Emulator`] and the [`Adapter`] trait.
//!
//! # Architecture overview (for beginners)
//!
//! A test harness attaches fake peripherals (a serial line, an I2C or SPI bus
//! device, a network interface) to a host and scripts their answers.  Each
//! fake peripheral is a **device**.  Each device holds a table of **pairs**:
//!
//! - a *synchronous* pair `deadbeef=cafe` answers `CA FE` whenever exactly
//!   `DE AD BE EF` is received;
//! - a *periodic* pair `timer:2s=01` emits `01` every two seconds unprompted.
//!
//! The modules, leaves first:
//!
//! - **`codec`** – text form of pairs, `hex=hex` and `timer:<period>=hex`.
//! - **`domain`** – interface kinds, pairs, the per-device pair store and the
//!   device itself.  No locks, no logging.
//! - **`registry`** – one [`InterfaceRegistry`] per kind: owns the devices,
//!   allocates their indices and serialises every access with one lock.
//! - **`emulator`** – maps kinds to registries; the API front ends call.
//! - **`scheduler`** – background thread that fires periodic pairs.

pub mod adapter;
pub mod codec;
pub mod domain;
pub mod emulator;
pub mod error;
pub mod registry;
pub mod scheduler;

pub use adapter::{Adapter, AdapterError, AdapterHandle, DeviceLink};
pub use codec::{format_pair, parse_pair, CodecError, DurationError};
pub use domain::device::{Device, TransferOutcome};
pub use domain::interface::{
    InterfaceKind, UnknownInterface, MAX_DEVICES, MAX_PAIRS, MAX_REQUEST, MAX_RESPONSE,
};
pub use domain::pair::{Pair, PairSpec};
pub use emulator::{Emulator, EmulatorBuilder, TickReport};
pub use error::CoreError;
pub use registry::{InterfaceRegistry, TraceOptions};
pub use scheduler::SchedulerHandle;
