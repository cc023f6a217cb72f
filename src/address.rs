use crate::protocol::AddressType;
use std::fmt;
use std::io;
use std::net::Ipv4Addr;

/// Target is the destination a client asked to CONNECT to
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Target {
    pub host: String,
    pub port: u16,
}

/// Target implementation block
impl Target {
    /// new is a constructor for the Target type
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    /// remaining_len returns how many bytes of DST.ADDR and DST.PORT are still
    /// to be read once ATYP and the first address byte are in the buffer
    pub fn remaining_len(addr_type: AddressType, first: u8) -> usize {
        match addr_type {
            // 3 more address bytes + 2 port bytes
            AddressType::IPv4 => 5,
            // first byte is the domain length
            AddressType::DomainName => first as usize + 2,
        }
    }

    /// decode builds a Target from DST.ADDR + DST.PORT, starting at the first
    /// address byte
    pub fn decode(addr_type: AddressType, data: &[u8]) -> io::Result<Self> {
        let mut offset = 0;
        match addr_type {
            AddressType::IPv4 => parse_ipv4_address(data, &mut offset),
            AddressType::DomainName => parse_domain_address(data, &mut offset),
        }
    }

    /// encode appends ATYP, DST.ADDR and DST.PORT in wire order. Hosts that
    /// parse as IPv4 literals are written as ATYP 0x01, anything else as a
    /// domain name
    pub fn encode(&self, out: &mut Vec<u8>) -> io::Result<()> {
        match self.host.parse::<Ipv4Addr>() {
            Ok(ip) => {
                out.push(AddressType::IPv4 as u8);
                out.extend_from_slice(&ip.octets());
            }
            Err(_) => {
                let len = u8::try_from(self.host.len()).map_err(|_| {
                    io::Error::new(
                        io::ErrorKind::InvalidInput,
                        format!("domain name too long: {} bytes", self.host.len()),
                    )
                })?;
                out.push(AddressType::DomainName as u8);
                out.push(len);
                out.extend_from_slice(self.host.as_bytes());
            }
        }
        out.extend_from_slice(&self.port.to_be_bytes());
        Ok(())
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// parse_ipv4_address parses an IPv4 address and port from a byte slice
pub fn parse_ipv4_address(data: &[u8], offset: &mut usize) -> io::Result<Target> {
    // Ensure we have enough data for an IPv4 address + port (6 bytes)
    if *offset + 6 > data.len() {
        return Err(short_data("not enough data for IPv4 address and port"));
    }

    // Grab IP bytes
    let ip = Ipv4Addr::new(
        data[*offset],
        data[*offset + 1],
        data[*offset + 2],
        data[*offset + 3],
    );
    *offset += 4;

    // Grab port -> BigEndian (network order)
    let port = u16::from_be_bytes([data[*offset], data[*offset + 1]]);
    *offset += 2;

    Ok(Target::new(ip.to_string(), port))
}

/// parse_domain_address parses a length-prefixed domain and port from a byte slice
pub fn parse_domain_address(data: &[u8], offset: &mut usize) -> io::Result<Target> {
    // Ensure there are bytes to read
    if *offset + 1 > data.len() {
        return Err(short_data("not enough data to read domain length"));
    }

    // First octet holds the number of domain octets to follow
    let domain_len = data[*offset] as usize;

    if *offset + 1 + domain_len + 2 > data.len() {
        return Err(short_data("not enough data for domain and port"));
    }
    *offset += 1;

    // Hosts are taken as sent; bytes that aren't UTF-8 are replaced
    let domain = String::from_utf8_lossy(&data[*offset..*offset + domain_len]).into_owned();
    *offset += domain_len;

    let port = u16::from_be_bytes([data[*offset], data[*offset + 1]]);
    *offset += 2;

    Ok(Target::new(domain, port))
}

fn short_data(msg: &'static str) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, msg)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_ipv4_dotted_decimal() {
        let target = Target::decode(AddressType::IPv4, &[127, 0, 0, 1, 0x00, 0x50]).unwrap();
        assert_eq!(target, Target::new("127.0.0.1", 80));
        assert_eq!(target.to_string(), "127.0.0.1:80");

        let target = Target::decode(AddressType::IPv4, &[10, 200, 3, 255, 0xff, 0xfe]).unwrap();
        assert_eq!(target.to_string(), "10.200.3.255:65534");
    }

    #[test]
    fn decodes_domain_with_port() {
        let target = Target::decode(AddressType::DomainName, &[3, b'w', b'w', b'w', 0x00, 0x50])
            .unwrap();
        assert_eq!(target.to_string(), "www:80");
    }

    #[test]
    fn decodes_empty_and_maximal_domains() {
        let target = Target::decode(AddressType::DomainName, &[0, 0x01, 0xbb]).unwrap();
        assert_eq!(target, Target::new("", 443));

        let mut data = vec![255u8];
        data.extend(std::iter::repeat_n(b'a', 255));
        data.extend_from_slice(&[0x1f, 0x90]);
        let target = Target::decode(AddressType::DomainName, &data).unwrap();
        assert_eq!(target.host.len(), 255);
        assert_eq!(target.port, 8080);
    }

    #[test]
    fn remaining_len_matches_wire_layout() {
        assert_eq!(Target::remaining_len(AddressType::IPv4, 127), 5);
        assert_eq!(Target::remaining_len(AddressType::DomainName, 0), 2);
        assert_eq!(Target::remaining_len(AddressType::DomainName, 255), 257);
    }

    #[test]
    fn short_input_is_rejected() {
        assert!(Target::decode(AddressType::IPv4, &[1, 2, 3, 4, 5]).is_err());
        assert!(Target::decode(AddressType::DomainName, &[4, b'a', b'b', 0]).is_err());
        assert!(Target::decode(AddressType::DomainName, &[]).is_err());
    }

    #[test]
    fn encode_then_decode_recovers_target() {
        for target in [Target::new("192.168.1.20", 1080), Target::new("example.org", 443)] {
            let mut wire = Vec::new();
            target.encode(&mut wire).unwrap();

            let addr_type = AddressType::from_byte(wire[0]).unwrap();
            assert_eq!(Target::decode(addr_type, &wire[1..]).unwrap(), target);
        }
    }

    #[test]
    fn encode_rejects_overlong_domain() {
        let target = Target::new("a".repeat(256), 80);
        assert!(target.encode(&mut Vec::new()).is_err());
    }
}
