//! Domain entities: interface kinds, pairs, pair stores and devices.
//!
//! Nothing in here locks, logs or talks to an adapter.  The registry wraps
//! these types with the per-kind lock and the adapter lifecycle.

pub mod device;
pub mod index;
pub mod interface;
pub mod pair;
pub mod store;
