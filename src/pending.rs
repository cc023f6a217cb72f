//! Pending connections
//!
//! A [`PendingConn`] wraps a negotiated client stream and holds back every
//! read and write until the tunnel behind it is ready. The release happens
//! once, through [`Gate::start`] or [`Gate::close`], whichever comes first,
//! and wakes every waiter at the same time. A close that comes later still
//! reaches I/O parked on the raw stream, which then shuts the raw stream
//! down and fails with `NotConnected`.

use std::fmt;
use std::future::Future;
use std::io;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};
use std::task::{Context, Poll, ready};
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt, ReadBuf};
use tokio::sync::watch;

const PENDING: u8 = 0;
const STARTED: u8 = 1;
const CLOSED: u8 = 2;

type Signal = Pin<Box<dyn Future<Output = ()> + Send>>;

/// Gate is the shareable control side of a pending connection
#[derive(Clone)]
pub struct Gate {
    inner: Arc<GateInner>,
}

struct GateInner {
    state: AtomicU8,
    // Mirrors `state` for waiters, only ever moves forward
    signal: watch::Sender<u8>,
}

/// Gate implementation block
impl Gate {
    /// new is a constructor for an unreleased Gate
    pub fn new() -> Self {
        let (signal, _) = watch::channel(PENDING);
        Self {
            inner: Arc::new(GateInner {
                state: AtomicU8::new(PENDING),
                signal,
            }),
        }
    }

    /// start releases all current and future waiters. Returns true only for
    /// the call that performed the release
    pub fn start(&self) -> bool {
        let released = self
            .inner
            .state
            .compare_exchange(PENDING, STARTED, Ordering::AcqRel, Ordering::Acquire)
            .is_ok();
        if released {
            self.publish(STARTED);
        }
        released
    }

    /// close marks the connection closed, releasing waiters if nobody has yet
    /// and waking any I/O parked on the started stream. Returns true only
    /// when this call performed the release
    pub fn close(&self) -> bool {
        // swap hands PENDING to exactly one caller, racing start() included
        let previous = self.inner.state.swap(CLOSED, Ordering::AcqRel);
        if previous != CLOSED {
            self.publish(CLOSED);
        }
        previous == PENDING
    }

    fn publish(&self, state: u8) {
        // A late STARTED must not overwrite CLOSED
        self.inner.signal.send_if_modified(|current| {
            if *current < state {
                *current = state;
                true
            } else {
                false
            }
        });
    }

    /// is_released tells whether start or close has happened
    pub fn is_released(&self) -> bool {
        self.inner.state.load(Ordering::Acquire) != PENDING
    }

    /// is_closed tells whether close has happened
    pub fn is_closed(&self) -> bool {
        self.inner.state.load(Ordering::Acquire) == CLOSED
    }

    /// released resolves once the gate has been started or closed
    pub fn released(&self) -> impl Future<Output = ()> + Send + use<> {
        self.reached(STARTED)
    }

    /// closed resolves once the gate has been closed
    pub fn closed(&self) -> impl Future<Output = ()> + Send + use<> {
        self.reached(CLOSED)
    }

    fn reached(&self, state: u8) -> impl Future<Output = ()> + Send + use<> {
        let mut rx = self.inner.signal.subscribe();
        async move {
            // Err means every Gate is gone, nothing is left to wait for
            let _ = rx.wait_for(|current| *current >= state).await;
        }
    }
}

impl Default for Gate {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Gate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = match self.inner.state.load(Ordering::Acquire) {
            PENDING => "pending",
            STARTED => "started",
            _ => "closed",
        };
        f.debug_struct("Gate").field("state", &state).finish()
    }
}

/// Waiter tracks one direction of a PendingConn against its gate
#[derive(Default)]
struct Waiter {
    released: Option<Signal>,
    closed: Option<Signal>,
}

impl Waiter {
    /// Pending until the gate is released, then Ready(true) once it is
    /// closed. Ready(false) leaves the task registered for the close
    fn poll_gate(&mut self, gate: &Gate, cx: &mut Context<'_>) -> Poll<bool> {
        if !gate.is_released() {
            let wait = self.released.get_or_insert_with(|| Box::pin(gate.released()));
            ready!(wait.as_mut().poll(cx));
        }
        self.released = None;

        if gate.is_closed() {
            self.closed = None;
            return Poll::Ready(true);
        }

        let closed = self.closed.get_or_insert_with(|| Box::pin(gate.closed()));
        match closed.as_mut().poll(cx) {
            Poll::Ready(()) => {
                self.closed = None;
                Poll::Ready(true)
            }
            Poll::Pending => Poll::Ready(false),
        }
    }
}

/// PendingConn is a duplex stream whose reads and writes wait on a [`Gate`]
pub struct PendingConn<S> {
    raw: S,
    gate: Gate,
    read_wait: Waiter,
    write_wait: Waiter,
    shut_down: bool,
}

/// PendingConn implementation block
impl<S> PendingConn<S> {
    /// new wraps `raw` behind a fresh, unreleased gate
    pub fn new(raw: S) -> Self {
        Self {
            raw,
            gate: Gate::new(),
            read_wait: Waiter::default(),
            write_wait: Waiter::default(),
            shut_down: false,
        }
    }

    /// gate hands out a control handle that can start or close this
    /// connection from elsewhere
    pub fn gate(&self) -> Gate {
        self.gate.clone()
    }

    /// start lets reads and writes through
    pub fn start(&self) -> bool {
        self.gate.start()
    }

    pub fn is_started(&self) -> bool {
        self.gate.is_released() && !self.gate.is_closed()
    }
}

impl<S> PendingConn<S>
where
    S: AsyncWrite + Unpin,
{
    /// close releases any waiters and shuts the raw stream down. Only the
    /// first call touches the raw stream
    pub async fn close(&mut self) -> io::Result<()> {
        self.shutdown().await
    }

    fn poll_shutdown_raw(&mut self, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        if self.shut_down {
            return Poll::Ready(Ok(()));
        }

        let result = ready!(Pin::new(&mut self.raw).poll_shutdown(cx));
        self.shut_down = true;
        Poll::Ready(result)
    }
}

impl<S> fmt::Debug for PendingConn<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PendingConn")
            .field("gate", &self.gate)
            .field("shut_down", &self.shut_down)
            .finish()
    }
}

fn closed_error() -> io::Error {
    io::Error::new(io::ErrorKind::NotConnected, "pending connection closed")
}

impl<S> AsyncRead for PendingConn<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        if ready!(this.read_wait.poll_gate(&this.gate, cx)) {
            ready!(this.poll_shutdown_raw(cx))?;
            return Poll::Ready(Err(closed_error()));
        }
        Pin::new(&mut this.raw).poll_read(cx, buf)
    }
}

impl<S> AsyncWrite for PendingConn<S>
where
    S: AsyncWrite + Unpin,
{
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        let this = self.get_mut();
        if ready!(this.write_wait.poll_gate(&this.gate, cx)) {
            ready!(this.poll_shutdown_raw(cx))?;
            return Poll::Ready(Err(closed_error()));
        }
        Pin::new(&mut this.raw).poll_write(cx, buf)
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        if ready!(this.write_wait.poll_gate(&this.gate, cx)) {
            return this.poll_shutdown_raw(cx);
        }
        Pin::new(&mut this.raw).poll_flush(cx)
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        this.gate.close();
        this.poll_shutdown_raw(cx)
    }
}
