//! Compiling and instantiating guest modules.

use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use anyhow::Result;
use anyhow::bail;
use wasmtime::Engine;
use wasmtime::Instance;
use wasmtime::Linker;
use wasmtime::Module;
use wasmtime::Store;
use wasmtime::TypedFunc;

use yoframe::Tag;

use crate::context::GuestContext;
use crate::host;

/// Compiles a wasm artifact once; instantiates it any number of times.
///
/// Cheap to clone; clones share the compiled module.
#[derive(Clone)]
pub struct Loader {
    engine: Engine,
    module: Arc<Module>,
}

impl Loader {
    /// Compiles the artifact at `path`.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let engine = Engine::default();
        let module = Module::from_file(&engine, path.as_ref())
            .with_context(|| format!("compile wasm artifact {}", path.as_ref().display()))?;
        Ok(Self { engine, module: Arc::new(module) })
    }

    /// Compiles an in-memory artifact (binary wasm or wat text).
    pub fn from_bytes(bytes: impl AsRef<[u8]>) -> Result<Self> {
        let engine = Engine::default();
        let module = Module::new(&engine, bytes.as_ref()).context("compile wasm artifact")?;
        Ok(Self { engine, module: Arc::new(module) })
    }

    /// Builds a fresh instance with the host functions bound and its
    /// observed-tag set resolved.
    ///
    /// Runs the guest's optional `yomo_init` once, then unions the tags it
    /// registered through `yomo_observe_datatag` with the list returned by
    /// the optional `yomo_data_tags` export.
    pub fn instantiate(&self) -> Result<GuestInstance> {
        let mut linker: Linker<GuestContext> = Linker::new(&self.engine);
        host::link(&mut linker)?;

        let mut store = Store::new(&self.engine, GuestContext::new());
        let instance = linker
            .instantiate(&mut store, &self.module)
            .context("instantiate guest module")?;

        if instance.get_memory(&mut store, "memory").is_none() {
            bail!("guest does not export `memory`");
        }
        instance
            .get_typed_func::<u32, u32>(&mut store, "yomo_alloc")
            .context("guest does not export `yomo_alloc(u32) -> u32`")?;
        let handler = instance
            .get_typed_func::<(), ()>(&mut store, "yomo_handler")
            .context("guest does not export `yomo_handler()`")?;

        if let Ok(init) = instance.get_typed_func::<(), ()>(&mut store, "yomo_init") {
            init.call(&mut store, ()).context("guest `yomo_init` trapped")?;
        }

        let mut observed: HashSet<Tag> = store.data().observed.clone();
        observed.extend(declared_data_tags(&mut store, &instance)?);

        Ok(GuestInstance { store, handler, observed })
    }
}

/// Reads the guest's `yomo_data_tags` list: a packed `u64` of
/// `ptr << 32 | byte_len` pointing at little-endian u32s.
fn declared_data_tags(
    store: &mut Store<GuestContext>,
    instance: &Instance,
) -> Result<Vec<Tag>> {
    let Ok(data_tags) = instance.get_typed_func::<(), u64>(&mut *store, "yomo_data_tags") else {
        return Ok(Vec::new());
    };
    let packed = data_tags.call(&mut *store, ()).context("guest `yomo_data_tags` trapped")?;
    let ptr = (packed >> 32) as usize;
    let byte_len = packed as u32 as usize;
    if byte_len == 0 {
        return Ok(Vec::new());
    }
    if byte_len % 4 != 0 {
        bail!("`yomo_data_tags` list of {} bytes is not a packed u32 list", byte_len);
    }

    let memory = instance
        .get_memory(&mut *store, "memory")
        .context("guest does not export `memory`")?;
    let data = memory.data(&*store);
    let end = ptr.checked_add(byte_len).context("`yomo_data_tags` list overflows")?;
    if end > data.len() {
        bail!("`yomo_data_tags` list ({}, {}) out of range", ptr, byte_len);
    }
    Ok(data[ptr..end]
        .chunks_exact(4)
        .map(|c| u32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect())
}

/// One live guest: a store, its linear memory, and its handler entry point.
///
/// Not thread-safe by design — the dispatcher serializes calls through its
/// slot. Distinct instances run in parallel.
pub struct GuestInstance {
    store: Store<GuestContext>,
    handler: TypedFunc<(), ()>,
    observed: HashSet<Tag>,
}

impl std::fmt::Debug for GuestInstance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GuestInstance")
            .field("observed", &self.observed)
            .finish_non_exhaustive()
    }
}

impl GuestInstance {
    /// The tags this guest declared, resolved at instantiation.
    pub fn observed_tags(&self) -> &HashSet<Tag> {
        &self.observed
    }

    /// Runs the guest handler over one data frame and returns what it
    /// emitted. A trap leaves the instance unusable; callers discard it.
    pub fn handle(&mut self, tag: Tag, payload: &[u8]) -> Result<Vec<(Tag, Vec<u8>)>> {
        {
            let ctx = self.store.data_mut();
            ctx.tag = tag;
            ctx.data = payload.to_vec();
            ctx.emits.clear();
        }
        self.handler.call(&mut self.store, ()).context("guest handler trapped")?;
        Ok(std::mem::take(&mut self.store.data_mut().emits))
    }
}
