//! # Context and emit host functions
//!
//! The guest reads the frame being handled through `yomo_context_tag` and
//! `yomo_context_data`, registers tags with `yomo_observe_datatag`, and
//! emits outbound data with `yomo_write`.

use anyhow::Result;
use wasmtime::Caller;
use wasmtime::Linker;

use crate::context::GuestContext;
use crate::memory::alloc_buffer;
use crate::memory::read_buffer;

pub(crate) fn link(linker: &mut Linker<GuestContext>) -> Result<()> {
    linker.func_wrap("env", "yomo_observe_datatag", observe_datatag)?;
    linker.func_wrap("env", "yomo_context_tag", context_tag)?;
    linker.func_wrap("env", "yomo_context_data", context_data)?;
    linker.func_wrap("env", "yomo_write", write)?;
    Ok(())
}

/// Adds a tag to the instance's observed set. Always 0.
fn observe_datatag(mut caller: Caller<'_, GuestContext>, tag: u32) -> u32 {
    caller.data_mut().observed.insert(tag);
    0
}

/// Returns the tag of the data frame currently being handled.
fn context_tag(caller: Caller<'_, GuestContext>) -> u32 {
    caller.data().tag
}

/// Hands the current payload to the guest through the allocator protocol.
/// Codes: 0 ok, 1 memory write error.
fn context_data(mut caller: Caller<'_, GuestContext>, out_ptr_cell: u32, out_size_cell: u32) -> u32 {
    let payload = caller.data().data.clone();
    if let Err(err) = alloc_buffer(&mut caller, out_ptr_cell, out_size_cell, &payload) {
        tracing::error!(err = %err, "context data: allocate buffer error");
        return 1;
    }
    0
}

/// Queues one `(tag, payload)` for transmission after the handler returns.
/// Codes: 0 ok, 1 payload read error.
fn write(mut caller: Caller<'_, GuestContext>, tag: u32, payload_ptr: u32, payload_len: u32) -> u32 {
    let payload = match read_buffer(&mut caller, payload_ptr, payload_len) {
        Ok(payload) => payload,
        Err(err) => {
            tracing::error!(tag, err = %err, "write: read payload error");
            return 1;
        }
    };
    caller.data_mut().emits.push((tag, payload));
    0
}
