//! Cancellation with a cause.
//!
//! A participant carries one `Lifecycle`; the first `cancel` wins and its
//! cause is what every pending and future observer reads.

use std::sync::Arc;

use tokio::sync::watch;

#[derive(Clone)]
pub struct Lifecycle {
    tx: Arc<watch::Sender<Option<Arc<str>>>>,
    rx: watch::Receiver<Option<Arc<str>>>,
}

impl Lifecycle {
    pub fn new() -> Self {
        let (tx, rx) = watch::channel(None);
        Self { tx: Arc::new(tx), rx }
    }

    /// Cancels with `cause`. Later causes are dropped.
    pub fn cancel(&self, cause: impl Into<String>) {
        self.tx.send_if_modified(|state| {
            if state.is_some() {
                return false;
            }
            *state = Some(Arc::from(cause.into()));
            true
        });
    }

    /// Returns the cancellation cause, if cancelled.
    pub fn cause(&self) -> Option<Arc<str>> {
        self.rx.borrow().clone()
    }

    pub fn is_cancelled(&self) -> bool {
        self.rx.borrow().is_some()
    }

    /// Resolves once cancelled, yielding the cause.
    pub async fn cancelled(&self) -> Arc<str> {
        let mut rx = self.rx.clone();
        // The sender half lives as long as self, so wait_for cannot fail.
        let state = rx
            .wait_for(|state| state.is_some())
            .await
            .expect("lifecycle sender dropped");
        state.clone().expect("checked by wait_for")
    }
}

impl Default for Lifecycle {
    fn default() -> Self {
        Self::new()
    }
}
