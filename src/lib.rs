//! A SOCKS5 front end that hands negotiated connections to a dialer
//!
//! ## SOCKS5 Implementation
//!
//! - Features:
//!     - CONNECT to IPv4 and domain name targets
//!     - No Authentication
//!     - Optimistic success reply, the remote leg is built after handoff
//!     - Pending connections: client I/O is held until the dialer's tunnel is up
//!     - Async using tokio, one task per client
//! - [SOCKS5 (RFC 1928)](https://datatracker.ietf.org/doc/html/rfc1928)
//!
//! # Example
//! ```no_run
//! use socksgate::{DirectDialer, Socks5Server};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let mut server = Socks5Server::new("127.0.0.1:1080", DirectDialer::new());
//!     server.run().await
//! }
//! ```

pub mod address;
pub mod auth;
pub mod commands;
pub mod dialer;
pub mod error;
pub mod exact;
pub mod pending;
pub mod protocol;
pub mod server;
pub mod supervisor;
pub mod sysproxy;

// Re-export main types at crate root for convenience
pub use address::Target;
pub use dialer::{Dialer, DirectDialer};
pub use error::HandshakeError;
pub use pending::{Gate, PendingConn};
pub use protocol::{AddressType, AuthMethod, Command, ReplyCode, Version};
pub use server::Socks5Server;
pub use supervisor::ChildSupervisor;
pub use sysproxy::{ProxyMode, SystemProxy};
