//! Routing inbound data frames to the guest.

use std::sync::Arc;
use std::sync::Mutex;

use anyhow::Context;
use anyhow::Result;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use yoframe::DataFrame;
use yoframe::Frame;
use yoframe::Tag;

use yocore::Client;

use crate::loader::GuestInstance;
use crate::loader::Loader;

/// Owns one guest slot and routes data frames through it.
///
/// The slot is the single-writer gate: at most one guest call is in progress
/// per instance. A trap drops the instance; the next dispatch rebuilds it
/// from the shared loader.
#[derive(Clone)]
pub struct Dispatcher {
    loader: Loader,
    slot: Arc<Mutex<Option<GuestInstance>>>,
}

impl Dispatcher {
    pub fn new(loader: Loader) -> Self {
        Self { loader, slot: Arc::new(Mutex::new(None)) }
    }

    /// The guest's declared tag set; instantiates on demand to read it.
    /// These are the tags a stream function puts in its handshake.
    pub async fn observed_tags(&self) -> Result<Vec<Tag>> {
        let loader = self.loader.clone();
        let slot = self.slot.clone();
        tokio::task::spawn_blocking(move || {
            let mut slot = slot.lock().expect("guest slot poisoned");
            let instance = ensure_instance(&mut slot, &loader)?;
            let mut tags: Vec<Tag> = instance.observed_tags().iter().copied().collect();
            tags.sort_unstable();
            Ok(tags)
        })
        .await
        .context("guest task failed")?
    }

    /// Runs the guest handler over one frame and returns its emitted
    /// `(tag, payload)` pairs. Unobserved tags are ignored and return empty.
    ///
    /// Guest execution happens on a blocking thread; host functions the
    /// guest calls (HTTP, SQL) block that thread, not the runtime.
    pub async fn dispatch(&self, tag: Tag, payload: Vec<u8>) -> Result<Vec<(Tag, Vec<u8>)>> {
        let loader = self.loader.clone();
        let slot = self.slot.clone();
        tokio::task::spawn_blocking(move || {
            let mut slot = slot.lock().expect("guest slot poisoned");
            let instance = ensure_instance(&mut slot, &loader)?;
            if !instance.observed_tags().contains(&tag) {
                return Ok(Vec::new());
            }
            match instance.handle(tag, &payload) {
                Ok(emits) => Ok(emits),
                Err(trap) => {
                    // The instance is poisoned; a fresh one is built on demand.
                    tracing::error!(tag, err = %trap, "guest trapped, discarding instance");
                    *slot = None;
                    Err(trap)
                }
            }
        })
        .await
        .context("guest task failed")?
    }

    /// Wires a client's data observer into this dispatcher and spawns the
    /// pump: inbound data frames run the guest, and everything the guest
    /// emits goes back out through the client's write queue.
    pub fn attach(&self, client: &Client) -> JoinHandle<()> {
        let (inbound_tx, mut inbound_rx) = mpsc::unbounded_channel::<DataFrame>();
        client.set_data_frame_observer(move |frame| {
            let _ = inbound_tx.send(frame);
        });

        let dispatcher = self.clone();
        let client = client.clone();
        tokio::spawn(async move {
            while let Some(frame) = inbound_rx.recv().await {
                let emits = match dispatcher.dispatch(frame.tag, frame.payload).await {
                    Ok(emits) => emits,
                    Err(err) => {
                        tracing::error!(err = %err, "guest dispatch failed");
                        continue;
                    }
                };
                for (tag, payload) in emits {
                    let outbound = Frame::Data(DataFrame { tag, metadata: None, payload });
                    if let Err(err) = client.write_frame(outbound).await {
                        tracing::error!(tag, err = %err, "failed to forward guest write");
                    }
                }
            }
        })
    }
}

fn ensure_instance<'a>(
    slot: &'a mut Option<GuestInstance>,
    loader: &Loader,
) -> Result<&'a mut GuestInstance> {
    if slot.is_none() {
        *slot = Some(loader.instantiate()?);
    }
    Ok(slot.as_mut().expect("just filled"))
}
