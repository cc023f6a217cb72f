use crate::error::HandshakeError;
use crate::exact::read_full;
use crate::protocol::{AuthMethod, Version};
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tracing::debug;

/// negotiate_auth handles the method negotiation between the SOCKS server and
/// client. The offered methods are read but never inspected: no-auth is
/// always selected
pub async fn negotiate_auth<S>(stream: &mut S, buf: &mut [u8]) -> Result<(), HandshakeError>
where
    S: AsyncRead + AsyncWrite + Unpin + ?Sized,
{
    // ClientHello format
    // +----+----------+----------+
    // |VER | NMETHODS | METHODS  |
    // +----+----------+----------+
    // | 1  |    1     | 0 to 255 |
    // +----+----------+----------+

    read_full(stream, buf, 2, None).await?;

    // Ensure version is 0x05 -> SOCKS5
    if buf[0] != Version::SOCKS5 as u8 {
        return Err(HandshakeError::ProtocolVersion(buf[0]));
    }

    // Drain the method list after the header
    let n_methods = buf[1] as usize;
    read_full(stream, &mut buf[2..], n_methods, None).await?;
    debug!("client offered {} auth method(s)", n_methods);

    // ServerChoice method selection reply format
    // +----+--------+
    // |VER | METHOD |
    // +----+--------+
    // | 1  |   1    |
    // +----+--------+

    stream
        .write_all(&[Version::SOCKS5 as u8, AuthMethod::NoAuth as u8])
        .await?;

    Ok(())
}
