//! Linear-memory primitives shared by every host function.
//!
//! The guest's linear memory is the sole backing store for all host↔guest
//! byte buffers. Buffers returned to the guest go through the allocator
//! protocol: the pointer always comes from the guest's own `yomo_alloc`, and
//! the size is written verbatim into the caller-supplied size cell.

use anyhow::Context;
use anyhow::Result;
use anyhow::anyhow;
use anyhow::bail;
use wasmtime::Caller;
use wasmtime::Memory;

use crate::context::GuestContext;

fn exported_memory(caller: &mut Caller<'_, GuestContext>) -> Result<Memory> {
    caller
        .get_export("memory")
        .and_then(|ext| ext.into_memory())
        .ok_or_else(|| anyhow!("guest does not export `memory`"))
}

/// Copies `len` bytes at `ptr` out of the guest's linear memory.
pub(crate) fn read_buffer(
    caller: &mut Caller<'_, GuestContext>,
    ptr: u32,
    len: u32,
) -> Result<Vec<u8>> {
    let memory = exported_memory(caller)?;
    let data = memory.data(&caller);
    let start = ptr as usize;
    let end = start
        .checked_add(len as usize)
        .ok_or_else(|| anyhow!("memory read ({}, {}) overflows", ptr, len))?;
    if end > data.len() {
        bail!("memory read ({}, {}) out of range", ptr, len);
    }
    Ok(data[start..end].to_vec())
}

/// Hands `bytes` to the guest through its allocator.
///
/// Calls the guest's `yomo_alloc(len)`, writes the returned pointer as a
/// little-endian u32 at `out_ptr_cell`, the length at `out_size_cell`, and
/// copies the bytes to the allocation.
pub(crate) fn alloc_buffer(
    caller: &mut Caller<'_, GuestContext>,
    out_ptr_cell: u32,
    out_size_cell: u32,
    bytes: &[u8],
) -> Result<()> {
    let memory = exported_memory(caller)?;
    let alloc = caller
        .get_export("yomo_alloc")
        .and_then(|ext| ext.into_func())
        .ok_or_else(|| anyhow!("guest does not export `yomo_alloc`"))?
        .typed::<u32, u32>(&*caller)
        .context("`yomo_alloc` has the wrong signature")?;

    let len = bytes.len() as u32;
    let alloc_ptr = alloc.call(&mut *caller, len).context("`yomo_alloc` call failed")?;

    memory
        .write(&mut *caller, out_ptr_cell as usize, &alloc_ptr.to_le_bytes())
        .context("memory write `out_ptr_cell` error")?;
    memory
        .write(&mut *caller, out_size_cell as usize, &len.to_le_bytes())
        .context("memory write `out_size_cell` error")?;
    memory
        .write(&mut *caller, alloc_ptr as usize, bytes)
        .context("memory write `buffer` error")?;
    Ok(())
}
