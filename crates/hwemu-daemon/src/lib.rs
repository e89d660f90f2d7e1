//! hwemu-daemon library entry point.
//!
//! Re-exports all public modules so that integration tests in `tests/`
//! and both binaries (`hwemud`, `hwemu-ctl`) share the same module tree.

pub mod application;
pub mod infrastructure;
