use crate::address::Target;
use crate::pending::PendingConn;
use anyhow::Result;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::{
    io::{AsyncRead, AsyncWrite, copy_bidirectional},
    net::TcpStream,
};
use tracing::{debug, info};

/// Dialer takes over a negotiated connection and builds the remote leg for it.
///
/// It is called once per handshaken client, after the success reply has been
/// written, and may be called from many connection tasks at once. The
/// implementation owns `conn` from then on and must eventually start it (once
/// the remote side is ready) or close it. The returned id names the session.
pub trait Dialer<S>: Send + Sync + 'static {
    fn dial(
        &self,
        target: Target,
        conn: PendingConn<S>,
    ) -> impl Future<Output = Result<u64>> + Send;
}

impl<S, F, Fut> Dialer<S> for F
where
    F: Fn(Target, PendingConn<S>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<u64>> + Send,
{
    fn dial(
        &self,
        target: Target,
        conn: PendingConn<S>,
    ) -> impl Future<Output = Result<u64>> + Send {
        self(target, conn)
    }
}

/// DirectDialer connects straight to the requested target and relays bytes
/// between it and the client
#[derive(Debug, Default)]
pub struct DirectDialer {
    next_session: AtomicU64,
}

/// DirectDialer implementation block
impl DirectDialer {
    /// new is a constructor for the DirectDialer type
    pub fn new() -> Self {
        Self::default()
    }
}

impl<S> Dialer<S> for DirectDialer
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    fn dial(
        &self,
        target: Target,
        conn: PendingConn<S>,
    ) -> impl Future<Output = Result<u64>> + Send {
        let session = self.next_session.fetch_add(1, Ordering::Relaxed) + 1;
        async move {
            // The remote leg comes up in the background, the client waits on the gate
            tokio::spawn(relay(session, target, conn));
            Ok(session)
        }
    }
}

/// relay connects to the target, then opens the gate and copies in both
/// directions until either side is done
async fn relay<S>(session: u64, target: Target, mut conn: PendingConn<S>)
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let gate = conn.gate();
    let connected = tokio::select! {
        connected = TcpStream::connect(target.to_string()) => connected,
        _ = gate.closed() => {
            debug!("session {} closed while dialing {}", session, target);
            return;
        }
    };

    let mut outbound = match connected {
        Ok(outbound) => outbound,
        Err(e) => {
            debug!("session {} dial to {} failed: {}", session, target, e);
            if let Err(e) = conn.close().await {
                debug!("session {} close failed: {}", session, e);
            }
            return;
        }
    };

    conn.start();
    debug!("session {} connected to {}", session, target);

    match copy_bidirectional(&mut conn, &mut outbound).await {
        Ok((from_client, from_server)) => info!(
            "session {} closed: {} bytes from client, {} bytes from server",
            session, from_client, from_server
        ),
        Err(e) => debug!("session {} relay to {} ended with {}", session, target, e),
    }
}
