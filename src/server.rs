use crate::{
    auth,
    commands,
    dialer::Dialer,
    error::HandshakeError,
    pending::PendingConn,
    protocol::HANDSHAKE_BUF_SIZE,
};
use anyhow::{Result, bail};
use std::{net::SocketAddr, sync::Arc};
use tokio::{
    io::{AsyncRead, AsyncWrite},
    net::{TcpListener, TcpStream},
};
use tracing::{debug, info};

/// Socks5Server represents a SOCKS5 front end and houses related
/// configuration data along with the dialer that negotiated connections
/// are handed to
pub struct Socks5Server<D> {
    pub listen_addr: String,
    dialer: Arc<D>,
    listener: Option<TcpListener>,
}

/// Socks5Server implementation block
impl<D> Socks5Server<D>
where
    D: Dialer<TcpStream>,
{
    /// new is a constructor for the Socks5Server type
    pub fn new(listen_addr: impl Into<String>, dialer: D) -> Self {
        Self {
            listen_addr: listen_addr.into(),
            dialer: Arc::new(dialer),
            listener: None,
        }
    }

    /// bind to the listen address ahead of run, returning the bound address
    pub async fn bind(&mut self) -> Result<SocketAddr> {
        if self.listener.is_some() {
            bail!("{} is already bound", self.listen_addr);
        }

        // Instantiate tokio listener
        let listener = TcpListener::bind(&self.listen_addr).await?;
        let addr = listener.local_addr()?;

        info!("SOCKS5 proxy listening on {:?}", addr);

        self.listener = Some(listener);
        Ok(addr)
    }

    /// run accepts connections until the listener fails, handling each one
    /// on its own task
    pub async fn run(&mut self) -> Result<()> {
        let listener = match self.listener.take() {
            Some(listener) => listener,
            None => {
                self.bind().await?;
                match self.listener.take() {
                    Some(listener) => listener,
                    None => bail!("listener missing after bind"),
                }
            }
        };

        loop {
            // Accept errors end the loop, per-connection errors never do
            let (inbound, peer_addr) = listener.accept().await?;

            // Clone for this connection
            let dialer = Arc::clone(&self.dialer);

            tokio::spawn(async move {
                debug!("new client: {}", peer_addr);

                match handle_connection(inbound, peer_addr, dialer.as_ref()).await {
                    Ok(_) => {}
                    // The dialer owns the stream by now, this only reports
                    Err(HandshakeError::Dialer { target, source }) => {
                        info!("dial to {} for {} failed: {}", target, peer_addr, source);
                    }
                    Err(e) if e.is_protocol() => {
                        info!("rejected client {}: {}", peer_addr, e);
                    }
                    Err(e) => debug!("connection from {} closed: {}", peer_addr, e),
                }
            });
        }
    }
}

/// handle_connection runs the greeting and request phases on `stream` and
/// then hands it, gated, to `dialer`. On a handshake error the stream is
/// dropped, which closes it
pub async fn handle_connection<S, D>(
    mut stream: S,
    peer_addr: SocketAddr,
    dialer: &D,
) -> Result<u64, HandshakeError>
where
    S: AsyncRead + AsyncWrite + Unpin,
    D: Dialer<S>,
{
    // One scratch buffer serves every phase of this connection
    let mut buf = vec![0u8; HANDSHAKE_BUF_SIZE];

    auth::negotiate_auth(&mut stream, &mut buf).await?;
    let target = commands::handle_socks_request(&mut stream, &mut buf).await?;
    drop(buf);

    debug!("dialing {} for {}", target, peer_addr);

    // The client already holds a success reply, so a dial failure is
    // only reported here
    let uri = target.to_string();
    match dialer.dial(target, PendingConn::new(stream)).await {
        Ok(session) => {
            debug!("session {} handed {} for {}", session, uri, peer_addr);
            Ok(session)
        }
        Err(e) => Err(HandshakeError::Dialer {
            target: uri,
            source: e.into(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::address::Target;
    use std::sync::Mutex;
    use tokio::io::{AsyncReadExt, AsyncWriteExt, DuplexStream, duplex};

    fn peer() -> SocketAddr {
        "127.0.0.1:50000".parse().unwrap()
    }

    /// Runs a whole connection over a pipe, returning what the dialer saw and
    /// everything written back to the client
    async fn converse(input: &[u8]) -> (Result<u64, HandshakeError>, Option<String>, Vec<u8>) {
        let seen = Arc::new(Mutex::new(None));
        let dialer = {
            let seen = Arc::clone(&seen);
            move |target: Target, conn: PendingConn<DuplexStream>| {
                let seen = Arc::clone(&seen);
                async move {
                    *seen.lock().unwrap() = Some(target.to_string());
                    drop(conn);
                    Ok::<_, anyhow::Error>(42)
                }
            }
        };

        let (mut client, server) = duplex(1024);
        client.write_all(input).await.unwrap();
        // EOF after the input, so short messages fail instead of hanging
        client.shutdown().await.unwrap();

        let result = handle_connection(server, peer(), &dialer).await;

        let mut reply = Vec::new();
        client.read_to_end(&mut reply).await.unwrap();
        let target = seen.lock().unwrap().take();
        (result, target, reply)
    }

    #[tokio::test]
    async fn ipv4_connect_is_handed_off() {
        let (result, target, reply) = converse(&[
            0x05, 0x01, 0x00, // greeting
            0x05, 0x01, 0x00, 0x01, 0x7f, 0x00, 0x00, 0x01, 0x00, 0x50,
        ])
        .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(target.as_deref(), Some("127.0.0.1:80"));
        assert_eq!(reply, [0x05, 0x00, 0x05, 0x00, 0x00, 0x01, 0, 0, 0, 0, 0, 0]);
    }

    #[tokio::test]
    async fn domain_connect_is_handed_off() {
        let (result, target, reply) = converse(&[
            0x05, 0x01, 0x00, // greeting
            0x05, 0x01, 0x00, 0x03, 0x03, 0x77, 0x77, 0x77, 0x00, 0x50,
        ])
        .await;

        assert!(result.is_ok());
        assert_eq!(target.as_deref(), Some("www:80"));
        assert_eq!(reply.len(), 12);
    }

    #[tokio::test]
    async fn bad_greeting_version_writes_nothing() {
        let (result, target, reply) = converse(&[0x04, 0x01, 0x00]).await;

        assert!(matches!(result, Err(HandshakeError::ProtocolVersion(0x04))));
        assert!(target.is_none());
        assert!(reply.is_empty());
    }

    #[tokio::test]
    async fn ipv6_request_stops_after_method_reply() {
        let mut input = vec![0x05, 0x01, 0x00, 0x05, 0x01, 0x00, 0x04];
        input.extend_from_slice(&[0u8; 18]);
        let (result, target, reply) = converse(&input).await;

        assert!(matches!(result, Err(HandshakeError::UnsupportedAddressType(0x04))));
        assert!(target.is_none());
        assert_eq!(reply, [0x05, 0x00]);
    }

    #[tokio::test]
    async fn dialer_errors_come_back_after_the_reply() {
        let dialer = |_: Target, conn: PendingConn<DuplexStream>| async move {
            drop(conn);
            Err::<u64, _>(anyhow::anyhow!("no route"))
        };

        let (mut client, server) = duplex(1024);
        client
            .write_all(&[0x05, 0x01, 0x00, 0x05, 0x01, 0x00, 0x01, 10, 0, 0, 9, 0x01, 0xbb])
            .await
            .unwrap();

        let err = handle_connection(server, peer(), &dialer).await.unwrap_err();
        assert!(matches!(err, HandshakeError::Dialer { ref target, .. } if target == "10.0.0.9:443"));

        let mut reply = Vec::new();
        client.read_to_end(&mut reply).await.unwrap();
        assert_eq!(reply.len(), 12);
        assert_eq!(&reply[2..4], &[0x05, 0x00]);
    }
}
