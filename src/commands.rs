use crate::address::Target;
use crate::error::HandshakeError;
use crate::exact::read_full;
use crate::protocol::{AddressType, Command, SUCCESS_REPLY, Version};
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tracing::debug;

/// handle_socks_request reads the client's request, decodes the destination
/// and answers with the fixed success reply. The reply goes out before any
/// attempt to reach the target is made
pub async fn handle_socks_request<S>(
    stream: &mut S,
    buf: &mut [u8],
) -> Result<Target, HandshakeError>
where
    S: AsyncRead + AsyncWrite + Unpin + ?Sized,
{
    // SOCKS5 request format
    // +----+-----+-------+------+----------+----------+
    // |VER | CMD |  RSV  | ATYP | DST.ADDR | DST.PORT |
    // +----+-----+-------+------+----------+----------+
    // | 1  |  1  | X'00' |  1   | Variable |    2     |
    // +----+-----+-------+------+----------+----------+

    // Header plus the first address byte
    read_full(stream, buf, 5, None).await?;

    // Ensure version is 0x05 -> SOCKS5
    if buf[0] != Version::SOCKS5 as u8 {
        return Err(HandshakeError::ProtocolVersion(buf[0]));
    }

    // CMD is not validated, everything is served as CONNECT
    if Command::from_byte(buf[1]) != Some(Command::Connect) {
        debug!("treating command {:#04x} as CONNECT", buf[1]);
    }

    let addr_type =
        AddressType::from_byte(buf[3]).ok_or(HandshakeError::UnsupportedAddressType(buf[3]))?;

    // Rest of DST.ADDR and DST.PORT land right after the first address byte
    let remaining = Target::remaining_len(addr_type, buf[4]);
    read_full(stream, &mut buf[5..], remaining, None).await?;

    let target = Target::decode(addr_type, &buf[4..5 + remaining])?;

    // SOCKS5 reply format
    // +----+-----+-------+------+----------+----------+
    // |VER | REP |  RSV  | ATYP | BND.ADDR | BND.PORT |
    // +----+-----+-------+------+----------+----------+
    // | 1  |  1  | X'00' |  1   |  0.0.0.0 |    0     |
    // +----+-----+-------+------+----------+----------+

    stream.write_all(&SUCCESS_REPLY).await?;

    Ok(target)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::HANDSHAKE_BUF_SIZE;
    use tokio::io::{AsyncReadExt, duplex};

    async fn request(bytes: Vec<u8>) -> (Result<Target, HandshakeError>, Vec<u8>) {
        let (mut client, mut server) = duplex(1024);
        client.write_all(&bytes).await.unwrap();
        // EOF after the input, so short messages fail instead of hanging
        client.shutdown().await.unwrap();

        let mut buf = vec![0u8; HANDSHAKE_BUF_SIZE];
        let result = handle_socks_request(&mut server, &mut buf).await;
        drop(server);

        let mut reply = Vec::new();
        client.read_to_end(&mut reply).await.unwrap();
        (result, reply)
    }

    #[tokio::test]
    async fn connect_ipv4() {
        let (result, reply) =
            request(vec![0x05, 0x01, 0x00, 0x01, 0x7f, 0x00, 0x00, 0x01, 0x00, 0x50]).await;
        assert_eq!(result.unwrap().to_string(), "127.0.0.1:80");
        assert_eq!(reply, [0x05, 0x00, 0x00, 0x01, 0, 0, 0, 0, 0, 0]);
    }

    #[tokio::test]
    async fn connect_domain() {
        let (result, reply) = request(vec![
            0x05, 0x01, 0x00, 0x03, 0x03, 0x77, 0x77, 0x77, 0x00, 0x50,
        ])
        .await;
        assert_eq!(result.unwrap().to_string(), "www:80");
        assert_eq!(reply, SUCCESS_REPLY);
    }

    #[tokio::test]
    async fn domain_consumes_exactly_len_plus_two() {
        for len in [0usize, 1, 63, 255] {
            let (mut client, mut server) = duplex(1024);
            let mut bytes = vec![0x05, 0x01, 0x00, 0x03, len as u8];
            bytes.extend(std::iter::repeat_n(b'x', len));
            bytes.extend_from_slice(&[0x12, 0x34]);
            // Trailing payload must be left on the stream
            bytes.extend_from_slice(b"tail");
            client.write_all(&bytes).await.unwrap();

            let mut buf = vec![0u8; HANDSHAKE_BUF_SIZE];
            let target = handle_socks_request(&mut server, &mut buf).await.unwrap();
            assert_eq!(target.host, "x".repeat(len));
            assert_eq!(target.port, 0x1234);

            let mut tail = [0u8; 4];
            server.read_exact(&mut tail).await.unwrap();
            assert_eq!(&tail, b"tail");
        }
    }

    #[tokio::test]
    async fn command_byte_is_ignored() {
        let (result, reply) =
            request(vec![0x05, 0x02, 0x00, 0x01, 0x0a, 0x00, 0x00, 0x01, 0x01, 0xbb]).await;
        assert_eq!(result.unwrap(), Target::new("10.0.0.1", 443));
        assert_eq!(reply, SUCCESS_REPLY);
    }

    #[tokio::test]
    async fn wrong_version_gets_no_reply() {
        let (result, reply) =
            request(vec![0x04, 0x01, 0x00, 0x01, 0x7f, 0x00, 0x00, 0x01, 0x00, 0x50]).await;
        assert!(matches!(result, Err(HandshakeError::ProtocolVersion(0x04))));
        assert!(reply.is_empty());
    }

    #[tokio::test]
    async fn unsupported_address_types_get_no_reply() {
        for atyp in [0x00u8, 0x02, 0x04, 0xff] {
            let mut bytes = vec![0x05, 0x01, 0x00, atyp];
            bytes.extend_from_slice(&[0u8; 18]);
            let (result, reply) = request(bytes).await;
            assert!(
                matches!(result, Err(HandshakeError::UnsupportedAddressType(a)) if a == atyp),
                "atyp {atyp:#04x}"
            );
            assert!(reply.is_empty());
        }
    }

    #[tokio::test]
    async fn truncated_address_gets_no_reply() {
        let (result, reply) = request(vec![0x05, 0x01, 0x00, 0x01, 0x7f, 0x00]).await;
        assert!(matches!(result, Err(HandshakeError::Transport(_))));
        assert!(reply.is_empty());
    }
}
