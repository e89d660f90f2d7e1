//! Application layer use cases for the daemon.
//!
//! Everything here works against an [`hwemu_core::Emulator`] and plain
//! values.  No sockets, no files: those live in `infrastructure`.
//!
//! # Sub-modules
//!
//! - **`control`**   – Parses control lines (`add-pair tty 0 01=02`), runs
//!   them against the emulator and renders one reply line.
//!
//! - **`provision`** – Creates the devices and pairs listed in the config file
//!   at startup.
//!
//! - **`snapshot`**  – Serializable view of every device and pair, returned by
//!   the `snapshot` control command.

pub mod control;
pub mod provision;
pub mod snapshot;
