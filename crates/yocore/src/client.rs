//! # Client supervisor
//!
//! The lifecycle of one named participant: handshake, background read loop,
//! write queue, reconnection, cancellation.
//!
//! ## Task model
//!
//! One *reader* task per live framed stream and one *selector* task per
//! participant. The selector owns all connection state transitions; it
//! selects over cancellation, the write queue, and a coalesced reconnect
//! signal. The reader never touches the connection — on failure it signals
//! the selector and exits.
//!
//! ## Invariants
//!
//! - `connect` returns `Ok` only after the server acknowledged the handshake.
//! - An authentication failure is terminal; no reconnect attempt follows it.
//! - The `(connection, stream)` pair is published atomically; observers see
//!   the previous pair or the new pair, never a torn combination.

use std::panic::AssertUnwindSafe;
use std::panic::catch_unwind;
use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;
use std::time::Duration;

use parking_lot::Mutex;
use parking_lot::RwLock;
use tokio::io::AsyncRead;
use tokio::io::AsyncWriteExt;
use tokio::sync::mpsc;
use tracing::Instrument;

use yoframe::BackflowFrame;
use yoframe::DataFrame;
use yoframe::Frame;
use yoframe::HandshakeFrame;
use yoframe::Tag;

use crate::error::ClientError;
use crate::error::Result;
use crate::error::StreamError;
use crate::frame_stream;
use crate::frame_stream::FrameStream;
use crate::lifecycle::Lifecycle;
use crate::options::ClientOptions;
use crate::options::ClientType;
use crate::options::WriteMode;
use crate::transport::Connection;

/// Fixed backoff between reconnect attempts.
const RECONNECT_DELAY: Duration = Duration::from_secs(1);

type DataObserver = Arc<dyn Fn(DataFrame) + Send + Sync>;
type BackflowObserver = Arc<dyn Fn(BackflowFrame) + Send + Sync>;
type ErrorHandler = Arc<dyn Fn(&ClientError) + Send + Sync>;

/// The one active `(connection, framed stream)` pair, swapped as a unit.
#[derive(Clone)]
struct ActivePair {
    conn: Arc<dyn Connection>,
    stream: Arc<FrameStream>,
}

struct Callbacks {
    processor: RwLock<DataObserver>,
    receiver: RwLock<BackflowObserver>,
    errorfn: RwLock<ErrorHandler>,
}

struct ClientInner {
    name: String,
    id: String,
    client_type: ClientType,
    options: ClientOptions,
    observed_tags: RwLock<Vec<Tag>>,
    callbacks: Callbacks,
    lifecycle: Lifecycle,
    write_tx: mpsc::Sender<Frame>,
    write_rx: Mutex<Option<mpsc::Receiver<Frame>>>,
    /// True while the selector is parked and able to take a frame; cleared
    /// while it is blocked inside a write or a reconnect.
    drain_gate: AtomicBool,
    active: RwLock<Option<ActivePair>>,
    span: tracing::Span,
}

/// A participant endpoint: Source, StreamFunction, or UpstreamPeer.
///
/// Cheap to clone; all clones drive the same participant.
#[derive(Clone)]
pub struct Client {
    inner: Arc<ClientInner>,
}

impl Client {
    /// Creates a participant with a fresh stable id. The id survives
    /// reconnects; a new `Client` is a new identity.
    pub fn new(name: impl Into<String>, client_type: ClientType, options: ClientOptions) -> Self {
        let name = name.into();
        let id = uuid::Uuid::new_v4().to_string();
        let span = tracing::info_span!(
            "client",
            component = %client_type,
            client_id = %id,
            client_name = %name,
        );

        if options.credential.name() != "none" {
            span.in_scope(|| {
                tracing::info!(credential_name = %options.credential.name(), "use credential");
            });
        }

        let (write_tx, write_rx) = mpsc::channel(1);

        let observed_tags = options.observe_data_tags.clone();
        Self {
            inner: Arc::new(ClientInner {
                name,
                id,
                client_type,
                options,
                observed_tags: RwLock::new(observed_tags),
                callbacks: Callbacks {
                    processor: RwLock::new(Arc::new(|_| {
                        tracing::warn!("the data frame observer has not been set");
                    })),
                    receiver: RwLock::new(Arc::new(|_| {
                        tracing::warn!("the backflow frame observer has not been set");
                    })),
                    errorfn: RwLock::new(Arc::new(|err| {
                        tracing::error!(err = %err, "client err");
                    })),
                },
                lifecycle: Lifecycle::new(),
                write_tx,
                write_rx: Mutex::new(Some(write_rx)),
                drain_gate: AtomicBool::new(false),
                active: RwLock::new(None),
                span,
            }),
        }
    }

    /// Connects and handshakes. Returns only after the server acknowledged
    /// the handshake, or with a terminal error.
    ///
    /// With `connect_until_succeed`, transport failures retry after a one
    /// second delay; authentication failures always return immediately.
    pub async fn connect(&self, addr: &str) -> Result<()> {
        let inner = &self.inner;

        if inner.client_type == ClientType::StreamFunction
            && inner.observed_tags.read().is_empty()
        {
            return Err(ClientError::Configuration(
                "stream function cannot observe data because the required tag has not been set"
                    .into(),
            ));
        }

        let write_rx = inner
            .write_rx
            .lock()
            .take()
            .ok_or_else(|| ClientError::Configuration("client already connected".into()))?;

        let pair = loop {
            match inner.connect_once(addr).await {
                Ok(pair) => break pair,
                Err(err) if err.is_authentication() || !inner.options.connect_until_succeed => {
                    inner.span.in_scope(|| {
                        tracing::error!(zipper_addr = addr, err = %err, "can not connect to zipper");
                    });
                    // A later connect may try again.
                    *inner.write_rx.lock() = Some(write_rx);
                    return Err(err);
                }
                Err(err) => {
                    inner.span.in_scope(|| {
                        tracing::error!(
                            zipper_addr = addr,
                            err = %err,
                            "failed to connect to zipper, trying to reconnect",
                        );
                    });
                    tokio::time::sleep(RECONNECT_DELAY).await;
                }
            }
        };

        inner.span.in_scope(|| {
            tracing::info!(
                zipper_addr = addr,
                local_addr = %pair.conn.local_addr(),
                "connected to zipper",
            );
        });

        inner.publish(pair.clone());
        inner.drain_gate.store(true, Ordering::Release);

        let background = ClientInner::run_background(inner.clone(), addr.to_string(), pair, write_rx);
        tokio::spawn(background.instrument(inner.span.clone()));

        Ok(())
    }

    /// Enqueues a frame for transmission.
    ///
    /// Blocking mode waits for the queue or for cancellation; drop-on-full
    /// mode returns [`ClientError::Disconnected`] when no drainer is active.
    pub async fn write_frame(&self, frame: Frame) -> Result<()> {
        match self.inner.options.write_mode {
            WriteMode::Block => self.block_write_frame(frame).await,
            WriteMode::Drop => self.non_block_write_frame(frame),
        }
    }

    /// Writes in block mode, guaranteeing the frame is not locally dropped.
    async fn block_write_frame(&self, frame: Frame) -> Result<()> {
        let inner = &self.inner;
        if let Some(cause) = inner.lifecycle.cause() {
            return Err(ClientError::Cancelled(cause.to_string()));
        }
        tokio::select! {
            cause = inner.lifecycle.cancelled() => Err(ClientError::Cancelled(cause.to_string())),
            sent = inner.write_tx.send(frame) => sent.map_err(|_| ClientError::Disconnected),
        }
    }

    /// Writes in drop-on-full mode, without guaranteeing delivery.
    fn non_block_write_frame(&self, frame: Frame) -> Result<()> {
        let inner = &self.inner;
        if let Some(cause) = inner.lifecycle.cause() {
            return Err(ClientError::Cancelled(cause.to_string()));
        }
        if !inner.drain_gate.load(Ordering::Acquire) {
            return Err(ClientError::Disconnected);
        }
        inner.write_tx.try_send(frame).map_err(|err| {
            inner.span.in_scope(|| {
                tracing::debug!(err = %err, "failed to write frame");
            });
            ClientError::Disconnected
        })
    }

    /// Initiates local shutdown; `wait` unblocks.
    pub fn close(&self) {
        self.inner
            .lifecycle
            .cancel(format!("{}: local shutdown", self.inner.client_type));
    }

    /// Blocks until the participant is terminated, returning the cause.
    pub async fn wait(&self) -> String {
        self.inner.lifecycle.cancelled().await.to_string()
    }

    /// Rebinds the data frame observer. Invoked from the reader task.
    pub fn set_data_frame_observer(&self, observer: impl Fn(DataFrame) + Send + Sync + 'static) {
        *self.inner.callbacks.processor.write() = Arc::new(observer);
    }

    /// Rebinds the backflow frame observer. Invoked from the reader task.
    pub fn set_backflow_frame_observer(
        &self,
        observer: impl Fn(BackflowFrame) + Send + Sync + 'static,
    ) {
        *self.inner.callbacks.receiver.write() = Arc::new(observer);
    }

    /// Rebinds the error handler. Invoked at most once per error event.
    pub fn set_error_handler(&self, handler: impl Fn(&ClientError) + Send + Sync + 'static) {
        *self.inner.callbacks.errorfn.write() = Arc::new(handler);
        self.inner.span.in_scope(|| tracing::debug!("the error handler has been set"));
    }

    /// Replaces the observed tag set used by subsequent handshakes.
    pub fn set_observed_tags(&self, tags: Vec<Tag>) {
        *self.inner.observed_tags.write() = tags;
    }

    /// Snapshot of the current connection, if any. Coherent with the framed
    /// stream: both are swapped under one publication.
    pub fn connection(&self) -> Option<Arc<dyn Connection>> {
        self.inner.active.read().as_ref().map(|pair| pair.conn.clone())
    }

    pub fn client_id(&self) -> &str {
        &self.inner.id
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Pipes `reader` into the auxiliary substream announced for
    /// `data_stream_id`.
    ///
    /// Accepts substreams off the current connection; each one announces
    /// itself with a `Stream` frame. Mismatched ids are closed and the accept
    /// loop continues; on a match, bytes are copied from `reader` until
    /// end-of-input, then the substream is shut down.
    pub async fn pipe_stream<R>(&self, data_stream_id: &str, mut reader: R) -> Result<()>
    where
        R: AsyncRead + Unpin + Send,
    {
        let inner = &self.inner;
        let conn = self.connection().ok_or(ClientError::Disconnected)?;

        loop {
            let mut substream = conn.accept_stream().await.map_err(|err| {
                inner.span.in_scope(|| {
                    tracing::error!(err = %err, "client accept data stream error");
                });
                ClientError::from(err)
            })?;

            let frame = frame_stream::read_frame_from(&mut substream).await?;
            let announced = match frame {
                Frame::Stream(sf) => sf,
                other => {
                    inner.span.in_scope(|| {
                        tracing::error!(frame_type = %other.kind(), "unexpected frame on auxiliary stream");
                    });
                    return Err(ClientError::Stream(StreamError::Transport(std::io::Error::new(
                        std::io::ErrorKind::InvalidData,
                        "unexpected frame on auxiliary stream",
                    ))));
                }
            };

            if announced.id != data_stream_id {
                inner.span.in_scope(|| {
                    tracing::debug!(
                        datastream_id = data_stream_id,
                        received_id = %announced.id,
                        tag = announced.tag,
                        "stream id mismatch, accepting again",
                    );
                });
                continue;
            }

            inner.span.in_scope(|| {
                tracing::info!(
                    remote_addr = %conn.remote_addr(),
                    datastream_id = %announced.id,
                    tag = announced.tag,
                    "pipe stream is ready",
                );
            });

            let copied = tokio::io::copy(&mut reader, &mut substream)
                .await
                .map_err(|e| ClientError::Stream(StreamError::Transport(e)))?;
            let _ = substream.shutdown().await;

            inner.span.in_scope(|| {
                tracing::info!(datastream_id = %announced.id, bytes = copied, "pipe stream done");
            });
            return Ok(());
        }
    }
}

impl ClientInner {
    /// One dial + handshake attempt.
    async fn connect_once(&self, addr: &str) -> Result<ActivePair> {
        let conn: Arc<dyn Connection> = Arc::from(self.options.dialer.dial(addr).await?);
        let control = conn.open_stream().await?;
        let stream = FrameStream::new(control);

        let handshake = HandshakeFrame {
            name: self.name.clone(),
            id: self.id.clone(),
            client_type: self.client_type as u8,
            observe_data_tags: self.observed_tags.read().clone(),
            auth_name: self.options.credential.name().to_string(),
            auth_payload: self.options.credential.payload().to_string(),
        };
        stream.write_frame(&Frame::Handshake(handshake)).await?;

        match stream.read_frame().await? {
            Frame::HandshakeAck => Ok(ActivePair { conn, stream: Arc::new(stream) }),
            Frame::Rejected(rejected) => Err(ClientError::AuthenticationFailed(rejected.message)),
            other => Err(ClientError::AuthenticationFailed(format!(
                "authentication failed: read unexpected frame, frame read: {}",
                other.kind(),
            ))),
        }
    }

    /// Atomically publishes a new `(connection, stream)` pair.
    fn publish(&self, pair: ActivePair) {
        *self.active.write() = Some(pair);
    }

    /// The selector task: sole owner of connection state transitions.
    async fn run_background(
        inner: Arc<ClientInner>,
        addr: String,
        mut pair: ActivePair,
        mut write_rx: mpsc::Receiver<Frame>,
    ) {
        // Capacity one: a pending signal absorbs duplicates.
        let (reconnect_tx, mut reconnect_rx) = mpsc::channel::<()>(1);

        tokio::spawn(
            ClientInner::read_frames(inner.clone(), pair.stream.clone(), reconnect_tx.clone())
                .instrument(inner.span.clone()),
        );

        loop {
            tokio::select! {
                cause = inner.lifecycle.cancelled() => {
                    tracing::debug!(cause = %cause, "client terminated");
                    pair.stream.close().await;
                    return;
                }
                outbound = write_rx.recv() => {
                    let Some(frame) = outbound else { return };
                    inner.drain_gate.store(false, Ordering::Release);
                    if let Err(err) = pair.stream.write_frame(&frame).await {
                        inner.handle_frame_error(err.into(), &reconnect_tx);
                    }
                    inner.drain_gate.store(true, Ordering::Release);
                }
                _ = reconnect_rx.recv() => {
                    inner.drain_gate.store(false, Ordering::Release);
                    match ClientInner::reconnect(&inner, &addr, &reconnect_tx).await {
                        Some(fresh) => {
                            pair = fresh;
                            // Signals raised against the torn-down stream are
                            // stale now; the fresh reader raises its own.
                            while reconnect_rx.try_recv().is_ok() {}
                            inner.drain_gate.store(true, Ordering::Release);
                        }
                        None => return,
                    }
                }
            }
        }
    }

    /// Redials until success or termination. `None` means the participant is
    /// done (cancelled, or the server refused the credential).
    async fn reconnect(
        inner: &Arc<ClientInner>,
        addr: &str,
        reconnect_tx: &mpsc::Sender<()>,
    ) -> Option<ActivePair> {
        loop {
            if inner.lifecycle.is_cancelled() {
                return None;
            }
            match inner.connect_once(addr).await {
                Ok(pair) => {
                    inner.publish(pair.clone());
                    tokio::spawn(
                        ClientInner::read_frames(
                            inner.clone(),
                            pair.stream.clone(),
                            reconnect_tx.clone(),
                        )
                        .instrument(inner.span.clone()),
                    );
                    tracing::info!(zipper_addr = addr, "reconnected to zipper");
                    return Some(pair);
                }
                Err(err) if err.is_authentication() => {
                    tracing::error!(err = %err, "reconnect rejected, terminating");
                    inner.lifecycle.cancel(err.to_string());
                    return None;
                }
                Err(err) => {
                    tracing::error!(err = %err, "reconnect to zipper error");
                    tokio::select! {
                        _ = inner.lifecycle.cancelled() => return None,
                        _ = tokio::time::sleep(RECONNECT_DELAY) => {}
                    }
                }
            }
        }
    }

    /// The reader task: one per live stream.
    async fn read_frames(
        inner: Arc<ClientInner>,
        stream: Arc<FrameStream>,
        reconnect_tx: mpsc::Sender<()>,
    ) {
        loop {
            let frame = match stream.read_frame().await {
                Ok(frame) => frame,
                Err(err) => {
                    inner.handle_frame_error(err.into(), &reconnect_tx);
                    return;
                }
            };

            // An observer fault is isolated from the reader task.
            if let Err(panic) = catch_unwind(AssertUnwindSafe(|| inner.handle_frame(frame))) {
                let message = panic_message(panic);
                tracing::error!(err = %message, "frame handler panic");
                let errorfn = inner.callbacks.errorfn.read().clone();
                errorfn(&ClientError::HandlerPanic(message));
            }
        }
    }

    /// Routes one read/write failure: report it, then either terminate
    /// (clean remote end) or signal reconnection (everything else). A signal
    /// already pending absorbs the new one.
    fn handle_frame_error(&self, err: ClientError, reconnect_tx: &mpsc::Sender<()>) {
        let errorfn = self.callbacks.errorfn.read().clone();
        errorfn(&err);

        if matches!(err, ClientError::Stream(StreamError::EndOfStream)) {
            self.lifecycle.cancel(format!("{}: remote shutdown", self.client_type));
            return;
        }

        let _ = reconnect_tx.try_send(());
    }

    /// Classifies one inbound frame. Runs on the reader task.
    fn handle_frame(&self, frame: Frame) {
        match frame {
            Frame::Rejected(rejected) => {
                tracing::error!(err = %rejected.message, "rejected error");
                self.lifecycle.cancel(rejected.message);
            }
            Frame::Goaway(goaway) => {
                tracing::error!(err = %goaway.message, "goaway from server");
                self.lifecycle.cancel(goaway.message);
            }
            Frame::Data(data) => {
                let processor = self.callbacks.processor.read().clone();
                processor(data);
            }
            Frame::Backflow(backflow) => {
                let receiver = self.callbacks.receiver.read().clone();
                receiver(backflow);
            }
            Frame::Stream(stream) => {
                tracing::debug!(
                    stream_id = %stream.id,
                    conn_id = %stream.client_id,
                    tag = stream.tag,
                    "receive stream frame",
                );
            }
            other => {
                tracing::error!(frame_type = %other.kind(), "received unexpected frame");
            }
        }
    }
}

fn panic_message(panic: Box<dyn std::any::Any + Send>) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
