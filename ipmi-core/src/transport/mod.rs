//! Transport abstraction — moving raw frames to and from the BMC.
//!
//! A transport owns its connection exclusively and moves opaque byte
//! frames; all framing, session, and codec knowledge lives above it.
//! The LAN/RMCP+ path uses [`UdpTransport`]; system interfaces (KCS,
//! BT, SMIC, SSIF) would plug in at the same seam. [`MockTransport`]
//! is the scripted stand-in used by the test suite.

pub mod mock;
pub mod udp;

pub use mock::{MockReply, MockTransport};
pub use udp::UdpTransport;

use std::time::Duration;

use async_trait::async_trait;

use crate::error::IpmiError;

/// A raw frame transport. Send and receive are split so the dispatcher
/// can keep waiting for a matching reply after dropping a stray frame.
#[async_trait]
pub trait Transport: Send {
    /// Transmit one complete frame.
    async fn send(&mut self, frame: &[u8]) -> Result<(), IpmiError>;

    /// Await the next inbound frame, up to `timeout`.
    async fn recv(&mut self, timeout: Duration) -> Result<Vec<u8>, IpmiError>;

    /// Release the underlying connection.
    async fn close(&mut self) -> Result<(), IpmiError>;
}
