//! Error types for the SOCKS5 handshake
//!
//! Every variant aborts the connection it was raised on. None of them are
//! answered with a SOCKS reply and none reach the accept loop.

use std::io;

use thiserror::Error;

/// Errors raised while negotiating a single client connection
#[derive(Debug, Error)]
pub enum HandshakeError {
    /// Greeting or request did not start with 0x05
    #[error("only ver 0x05 is supported, but {0:#04x}")]
    ProtocolVersion(u8),

    /// ATYP was neither IPv4 (0x01) nor domain name (0x03)
    #[error("ATYP {0:#04x} is not supported")]
    UnsupportedAddressType(u8),

    /// Reading from or writing to the client failed
    #[error("transport error: {0}")]
    Transport(#[from] io::Error),

    /// The dialer rejected the handed-off connection
    #[error("dial to {target} failed: {source}")]
    Dialer {
        target: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}

impl HandshakeError {
    /// is_protocol tells whether the peer sent something this server
    /// refuses to speak, as opposed to the stream failing underneath
    pub fn is_protocol(&self) -> bool {
        matches!(
            self,
            HandshakeError::ProtocolVersion(_) | HandshakeError::UnsupportedAddressType(_)
        )
    }
}
