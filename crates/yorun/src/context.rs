//! Per-instance host state.

use std::collections::HashSet;

use yoframe::Tag;

/// The host-side state of one guest instance; lives as the wasmtime store
/// data, so every host function reaches it through the calling store.
///
/// All of it is per-instance by construction: the database handle a guest
/// opens belongs to that guest alone and dies with it.
pub struct GuestContext {
    /// Tag of the data frame currently being handled.
    pub(crate) tag: Tag,
    /// Payload of the data frame currently being handled.
    pub(crate) data: Vec<u8>,
    /// `(tag, payload)` pairs emitted via `yomo_write` during the current
    /// handler call; drained by the dispatcher.
    pub(crate) emits: Vec<(Tag, Vec<u8>)>,
    /// Tags registered via `yomo_observe_datatag`.
    pub(crate) observed: HashSet<Tag>,
    /// Database handle owned by this instance; opened by `yomo_sql_open`,
    /// dropped by `yomo_sql_close` or on teardown.
    pub(crate) sql: Option<rusqlite::Connection>,
    /// HTTP client, built lazily on the first `yomo_http_get` so it is only
    /// ever constructed on a blocking thread.
    pub(crate) http: Option<reqwest::blocking::Client>,
}

impl GuestContext {
    pub(crate) fn new() -> Self {
        Self {
            tag: 0,
            data: Vec::new(),
            emits: Vec::new(),
            observed: HashSet::new(),
            sql: None,
            http: None,
        }
    }
}
