//! # In-process multiplexed network
//!
//! A transport implementation over `tokio::io::duplex` pipes: a process-wide
//! address book, listeners, and connections whose substreams are cheap
//! channel handoffs. Embedded zippers and the test suite drive the supervisor
//! through this module; a network binding implements the same traits.
//!
//! Closure semantics mirror a QUIC-class transport:
//! - a substream whose writer shuts down cleanly yields end-of-stream;
//! - an abruptly closed *connection* surfaces errors on all of its
//!   substreams, pending reads included.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;
use std::task::Context;
use std::task::Poll;

use parking_lot::Mutex;
use tokio::io::AsyncRead;
use tokio::io::AsyncWrite;
use tokio::io::DuplexStream;
use tokio::io::ReadBuf;
use tokio::sync::mpsc;
use tokio::sync::watch;

use crate::transport::ByteStream;
use crate::transport::Connection;
use crate::transport::Dialer;
use crate::transport::Result;
use crate::transport::TransportError;

const STREAM_BUFFER: usize = 64 * 1024;

/// Process-wide address book. Cloning shares the underlying registry.
#[derive(Clone, Default)]
pub struct MemNetwork {
    bindings: Arc<Mutex<HashMap<String, mpsc::UnboundedSender<MemConnection>>>>,
    next_port: Arc<AtomicU64>,
}

impl MemNetwork {
    pub fn new() -> Self {
        Self::default()
    }

    /// Binds `addr`, replacing any previous listener at that address.
    pub fn bind(&self, addr: &str) -> MemListener {
        let (tx, rx) = mpsc::unbounded_channel();
        self.bindings.lock().insert(addr.to_string(), tx);
        MemListener { rx }
    }

    /// Returns a dialer into this network.
    pub fn dialer(&self) -> MemDialer {
        MemDialer { network: self.clone() }
    }
}

/// Accepts connections dialed to one bound address.
pub struct MemListener {
    rx: mpsc::UnboundedReceiver<MemConnection>,
}

impl MemListener {
    /// Returns the next inbound connection, or `None` once the address is
    /// rebound or the network is gone.
    pub async fn accept(&mut self) -> Option<MemConnection> {
        self.rx.recv().await
    }
}

/// Dials connections through a [`MemNetwork`].
pub struct MemDialer {
    network: MemNetwork,
}

#[async_trait::async_trait]
impl Dialer for MemDialer {
    async fn dial(&self, addr: &str) -> Result<Box<dyn Connection>> {
        let listener_tx = self
            .network
            .bindings
            .lock()
            .get(addr)
            .cloned()
            .ok_or_else(|| TransportError::DialFailed(format!("no listener at {}", addr)))?;

        let port = self.network.next_port.fetch_add(1, Ordering::Relaxed);
        let local = format!("mem://dial-{}", port);
        let (dial_side, accept_side) = MemConnection::pair(local, addr.to_string());

        listener_tx
            .send(accept_side)
            .map_err(|_| TransportError::DialFailed(format!("listener at {} is gone", addr)))?;
        Ok(Box::new(dial_side))
    }
}

/// One side of an in-process multiplexed connection.
pub struct MemConnection {
    open_tx: mpsc::UnboundedSender<DuplexStream>,
    accept_rx: tokio::sync::Mutex<mpsc::UnboundedReceiver<DuplexStream>>,
    closed_tx: Arc<watch::Sender<bool>>,
    closed_rx: watch::Receiver<bool>,
    local_addr: String,
    remote_addr: String,
}

impl MemConnection {
    /// Builds both ends of a connection. Either end's `close` breaks every
    /// substream of both.
    pub fn pair(addr_a: String, addr_b: String) -> (Self, Self) {
        let (a_open_tx, b_accept_rx) = mpsc::unbounded_channel();
        let (b_open_tx, a_accept_rx) = mpsc::unbounded_channel();
        let (closed_tx, closed_rx) = watch::channel(false);
        let closed_tx = Arc::new(closed_tx);

        let a = Self {
            open_tx: a_open_tx,
            accept_rx: tokio::sync::Mutex::new(a_accept_rx),
            closed_tx: closed_tx.clone(),
            closed_rx: closed_rx.clone(),
            local_addr: addr_a.clone(),
            remote_addr: addr_b.clone(),
        };
        let b = Self {
            open_tx: b_open_tx,
            accept_rx: tokio::sync::Mutex::new(b_accept_rx),
            closed_tx,
            closed_rx,
            local_addr: addr_b,
            remote_addr: addr_a,
        };
        (a, b)
    }

    fn is_closed(&self) -> bool {
        *self.closed_rx.borrow()
    }
}

#[async_trait::async_trait]
impl Connection for MemConnection {
    async fn open_stream(&self) -> Result<Box<dyn ByteStream>> {
        if self.is_closed() {
            return Err(TransportError::ConnectionLost("connection closed".into()));
        }
        let (local_half, remote_half) = tokio::io::duplex(STREAM_BUFFER);
        self.open_tx
            .send(remote_half)
            .map_err(|_| TransportError::StreamRefused("peer is gone".into()))?;
        Ok(Box::new(MemStream::new(local_half, self.closed_rx.clone())))
    }

    async fn accept_stream(&self) -> Result<Box<dyn ByteStream>> {
        let mut accept_rx = self.accept_rx.lock().await;
        let mut closed_rx = self.closed_rx.clone();
        tokio::select! {
            _ = closed_rx.wait_for(|closed| *closed) => {
                Err(TransportError::ConnectionLost("connection closed".into()))
            }
            inbound = accept_rx.recv() => match inbound {
                Some(half) => Ok(Box::new(MemStream::new(half, self.closed_rx.clone())) as Box<dyn ByteStream>),
                None => Err(TransportError::ConnectionLost("peer is gone".into())),
            }
        }
    }

    fn local_addr(&self) -> String {
        self.local_addr.clone()
    }

    fn remote_addr(&self) -> String {
        self.remote_addr.clone()
    }

    async fn close(&self) {
        let _ = self.closed_tx.send_replace(true);
    }
}

/// A substream half fused to the connection's closed signal.
struct MemStream {
    inner: DuplexStream,
    broken: bool,
    closed: Pin<Box<dyn Future<Output = ()> + Send>>,
}

impl MemStream {
    fn new(inner: DuplexStream, closed_rx: watch::Receiver<bool>) -> Self {
        let closed = Box::pin(async move {
            let mut rx = closed_rx;
            // A dropped sender also counts as the connection being gone.
            let _ = rx.wait_for(|closed| *closed).await;
        });
        Self { inner, broken: false, closed }
    }

    fn poll_broken(&mut self, cx: &mut Context<'_>) -> bool {
        if self.broken {
            return true;
        }
        if self.closed.as_mut().poll(cx).is_ready() {
            self.broken = true;
        }
        self.broken
    }

    fn reset_error() -> std::io::Error {
        std::io::Error::new(std::io::ErrorKind::ConnectionReset, "connection closed")
    }
}

impl AsyncRead for MemStream {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<std::io::Result<()>> {
        if self.poll_broken(cx) {
            return Poll::Ready(Err(Self::reset_error()));
        }
        Pin::new(&mut self.inner).poll_read(cx, buf)
    }
}

impl AsyncWrite for MemStream {
    fn poll_write(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<std::io::Result<usize>> {
        if self.poll_broken(cx) {
            return Poll::Ready(Err(Self::reset_error()));
        }
        Pin::new(&mut self.inner).poll_write(cx, buf)
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        if self.poll_broken(cx) {
            return Poll::Ready(Err(Self::reset_error()));
        }
        Pin::new(&mut self.inner).poll_flush(cx)
    }

    fn poll_shutdown(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        // Shutting down an already-broken stream is a no-op, not an error.
        if self.poll_broken(cx) {
            return Poll::Ready(Ok(()));
        }
        Pin::new(&mut self.inner).poll_shutdown(cx)
    }
}
