//! # Host capability set
//!
//! The imported functions a guest may call, all under the `env` module.
//! Each takes u32 slots and returns one u32 status: 0 is success, nonzero a
//! kind-specific code. The code space is frozen — adding codes is allowed,
//! changing existing ones is a breaking change.
//!
//! A host function never panics the host; every failure folds into a status.

mod http;
mod sql;
mod context;

use anyhow::Result;
use wasmtime::Linker;

use crate::context::GuestContext;

/// Installs the full `env` capability set on a linker.
pub fn link(linker: &mut Linker<GuestContext>) -> Result<()> {
    http::link(linker)?;
    sql::link(linker)?;
    context::link(linker)?;
    Ok(())
}
