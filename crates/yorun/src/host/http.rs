//! # HTTP egress host functions
//!
//! `yomo_http_get(urlPtr, urlLen) -> status`
//! Status codes: 0 ok, 1 memory read error, 2 request build or transport
//! error, 3 body read error. The body is fetched and logged, not returned to
//! the guest.

use anyhow::Result;
use wasmtime::Caller;
use wasmtime::Linker;

use crate::context::GuestContext;
use crate::memory::read_buffer;

pub(crate) fn link(linker: &mut Linker<GuestContext>) -> Result<()> {
    linker.func_wrap("env", "yomo_http_get", http_get)?;
    Ok(())
}

fn http_get(mut caller: Caller<'_, GuestContext>, url_ptr: u32, url_len: u32) -> u32 {
    let url_bytes = match read_buffer(&mut caller, url_ptr, url_len) {
        Ok(bytes) => bytes,
        Err(err) => {
            tracing::error!(ptr = url_ptr, len = url_len, err = %err, "http get: read url error");
            return 1;
        }
    };
    let url = String::from_utf8_lossy(&url_bytes).into_owned();

    // Blocking by contract: the guest's slot waits, other instances do not.
    let client = caller
        .data_mut()
        .http
        .get_or_insert_with(reqwest::blocking::Client::new)
        .clone();

    let response = match client.get(url.as_str()).send() {
        Ok(response) => response,
        Err(err) => {
            tracing::error!(url = %url, err = %err, "http get: request error");
            return 2;
        }
    };

    match response.bytes() {
        Ok(body) => {
            tracing::info!(url = %url, bytes = body.len(), "http get: success");
            0
        }
        Err(err) => {
            tracing::error!(url = %url, err = %err, "http get: body read error");
            3
        }
    }
}
