//! Infrastructure layer for the daemon.
//!
//! Contains OS-facing pieces: config file storage, the in-process channel
//! adapters, the TCP control server and the control client connection.
//!
//! **Dependency rule**: this layer may depend on `application` and
//! `hwemu_core`, but MUST NOT be imported by the `application` layer.

pub mod adapters;
pub mod client;
pub mod control_server;
pub mod storage;
