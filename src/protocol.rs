// RSV: Fields marked RESERVED (RSV) must be set to X'00'.
pub const RSV: u8 = 0x00;

/// HANDSHAKE_BUF_SIZE is the per-connection scratch buffer used for both
/// the greeting and the request phase
pub const HANDSHAKE_BUF_SIZE: usize = 64 * 1024;

/// SUCCESS_REPLY is the fixed reply sent once a request has been parsed:
/// succeeded, bound to 0.0.0.0:0
pub const SUCCESS_REPLY: [u8; 10] = [
    Version::SOCKS5 as u8,
    ReplyCode::Succeeded as u8,
    RSV,
    AddressType::IPv4 as u8,
    0x00,
    0x00,
    0x00,
    0x00,
    0x00,
    0x00,
];

/// Version represents available SOCKS proxy versions.
/// Only SOCKS5 is spoken here
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Version {
    SOCKS5 = 0x05,
}

/// AuthMethod represents available SOCKS5
/// authentication methods
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum AuthMethod {
    NoAuth = 0x00,
    // Gssapi = 0x01, not supported
    // UserPass = 0x02, not supported
    // 0x03 - 0x7f: IANA reserved
    // 0x80 - 0xFE: private methods
}

/// Command represents SOCKS5 protocol commands
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Command {
    Connect = 0x01,
    Bind = 0x02,
    UdpAssociate = 0x03,
}

/// Command implementation block
impl Command {
    /// from_byte converts a byte to its related SOCKS5 protocol command
    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            0x01 => Some(Command::Connect),
            0x02 => Some(Command::Bind),
            0x03 => Some(Command::UdpAssociate),
            _ => None,
        }
    }
}

/// AddressType represents the SOCKS5 address types this server decodes:
/// IPv4 and Domain Name
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum AddressType {
    IPv4 = 0x01,
    DomainName = 0x03,
    // IPv6 = 0x04, not supported
}

/// AddressType implementation block
impl AddressType {
    /// from_byte converts a byte to its related network address type
    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            0x01 => Some(AddressType::IPv4),
            0x03 => Some(AddressType::DomainName),
            _ => None,
        }
    }
}

#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ReplyCode {
    Succeeded = 0x00,
    // Failure codes are never sent: the reply is optimistic and
    // unsupported address types close the connection silently.
    // 0x01 - 0x08: failures
    // 0x09 - 0xFF: unassigned
}
