//! # Yorun
//!
//! The guest-module sandbox host: loads a compiled wasm artifact, exposes the
//! fixed host capability set (HTTP egress, SQL access, data emit, tag
//! routing) through a bit-exact pointer/length ABI, and dispatches inbound
//! data frames to guest handlers.
//!
//! ## Guest contract
//!
//! Required exports: `memory`, `yomo_alloc(size: u32) -> u32`,
//! `yomo_handler()`. Optional: `yomo_init()` (runs once after
//! instantiation), `yomo_data_tags() -> u64` (`ptr << 32 | byte_len` of a
//! packed little-endian `u32` list). Imports are exactly the `env` module
//! installed by [`host`].
//!
//! ## Isolation
//!
//! One linear memory per instance, one call at a time per instance, host
//! functions synchronous on the guest's calling thread. A trapped instance
//! is discarded and rebuilt on demand; the participant stays healthy.

pub mod host;

mod context;
mod dispatcher;
mod loader;
mod memory;

#[cfg(test)]
mod tests;

pub use context::GuestContext;
pub use dispatcher::Dispatcher;
pub use loader::GuestInstance;
pub use loader::Loader;
