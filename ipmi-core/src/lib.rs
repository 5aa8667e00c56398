//! # ipmi-core
//!
//! Wire-level IPMI client core: a protocol engine that issues
//! management commands to Baseboard Management Controllers over LAN
//! (RMCP / RMCP+) and parses their responses.
//!
//! This crate contains:
//! - **Wire primitives**: bounds-checked unpack helpers and bit manipulation
//! - **Codec**: per-command `Request` / `Response` contracts
//! - **Commands**: the typed command catalog (chassis, app, sensor, DCMI, PEF)
//! - **Transport**: `Transport` seam with UDP and scripted-mock implementations
//! - **Session**: RMCP framing, RAKP authentication, AES-CBC confidentiality,
//!   HMAC integrity, replay protection, and the establishment state machine
//! - **Client**: `connect → exchange* → close` dispatcher with retries,
//!   timeouts, and cancellation
//! - **Error**: `IpmiError` — typed, `thiserror`-based error hierarchy

pub mod client;
pub mod codec;
pub mod commands;
pub mod error;
pub mod message;
pub mod session;
pub mod transport;
pub mod wire;

// ── Re-exports for ergonomic usage ───────────────────────────────

pub use client::{Client, ClientConfig};
pub use codec::{GROUP_EXTENSION_DCMI, Request, Response};
pub use error::IpmiError;
pub use message::{CC_OK, CommandId, Message, NetFn, PrivilegeLevel, completion_code_description};
pub use session::{ReplayWindow, Session, SessionKeys, SessionPhase};
pub use session::crypto::CipherSuite;
pub use transport::{MockTransport, Transport, UdpTransport};
