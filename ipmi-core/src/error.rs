//! Domain-specific error types for the IPMI client core.
//!
//! All fallible operations return `Result<T, IpmiError>`.
//! No panics on invalid input — every error is typed and recoverable.

use std::time::Duration;
use thiserror::Error;

/// The canonical error type for the IPMI client core.
#[derive(Debug, Error)]
pub enum IpmiError {
    // ── Codec Errors ─────────────────────────────────────────────
    /// A response body was shorter than the minimum documented length.
    #[error("unpacked data too short: got {got} bytes, need {need}")]
    InsufficientData { got: usize, need: usize },

    /// A group-extension response did not start with the expected
    /// identifier byte (DCMI = 0xDC).
    #[error("group extension mismatch: got {got:#04x}, expected {expected:#04x}")]
    GroupExtensionMismatch { got: u8, expected: u8 },

    /// A numeric value did not map to any known enum variant.
    #[error("unknown {type_name} value: {value:#x}")]
    UnknownVariant { type_name: &'static str, value: u64 },

    // ── Protocol Errors ──────────────────────────────────────────
    /// The BMC returned a non-zero completion code.
    #[error("completion code {cc:#04x}: {description}")]
    CompletionCode { cc: u8, description: &'static str },

    /// A reply's sequence number or command id did not match the
    /// outstanding request. The dispatcher drops the datagram and
    /// keeps waiting; this variant surfaces only in decode helpers.
    #[error("reply sequence/command does not match outstanding request")]
    SequenceMismatch,

    /// A frame violated RMCP or IPMI framing rules.
    #[error("protocol violation: {0}")]
    ProtocolViolation(&'static str),

    // ── Session Errors ───────────────────────────────────────────
    /// RAKP mutual authentication failed; the session is torn down.
    #[error("authentication failure: {0}")]
    AuthenticationFailure(&'static str),

    /// A session AuthCode did not verify or a payload failed to
    /// decrypt; the session is torn down.
    #[error("integrity failure: {0}")]
    IntegrityFailure(&'static str),

    // ── Transport Errors ─────────────────────────────────────────
    /// The socket layer reported an error.
    #[error("transport error: {0}")]
    Transport(#[from] std::io::Error),

    /// No response arrived within the deadline.
    #[error("timeout after {0:?}")]
    Timeout(Duration),

    /// The client has no open connection.
    #[error("client is not connected")]
    NotConnected,

    // ── Dispatcher Errors ────────────────────────────────────────
    /// The caller cancelled the exchange.
    #[error("exchange cancelled")]
    Cancelled,

    /// A concurrent exchange was attempted on the same client.
    #[error("client busy: another exchange is in progress")]
    Busy,
}

impl IpmiError {
    /// Whether the dispatcher may retry the attempt after this error.
    ///
    /// Only socket-level failures and timeouts are transient; codec,
    /// protocol, and session errors surface to the caller unaltered.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transport(_) | Self::Timeout(_))
    }
}
