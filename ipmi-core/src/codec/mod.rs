//! Per-command codec contracts.
//!
//! Every catalog entry is a Request/Response pair. The request knows its
//! [`CommandId`] and packs its body exactly as it appears on the wire;
//! the response unpacks a completion-code-stripped body and may carry a
//! table of command-specific completion codes layered over the generic
//! set. The dispatcher is written purely against these two traits.

use crate::error::IpmiError;
use crate::message::CommandId;

/// A typed IPMI request body.
pub trait Request {
    /// The network function and command number this request targets.
    fn command(&self) -> CommandId;

    /// The body bytes exactly as they appear on the wire. Commands with
    /// no request data return an empty vector.
    fn pack(&self) -> Vec<u8>;
}

/// A typed IPMI response body.
///
/// `unpack` receives the data tail *after* the completion code has been
/// stripped, and must succeed for every well-formed body of the
/// documented length(s) — variable-tail responses decode progressively
/// on length thresholds and never fail on a valid shorter form.
pub trait Response {
    fn unpack(&mut self, msg: &[u8]) -> Result<(), IpmiError>;

    /// Completion codes this command defines over and above the generic
    /// table, as `(code, description)` pairs.
    fn completion_codes(&self) -> &'static [(u8, &'static str)] {
        &[]
    }
}

// ── Group extensions ─────────────────────────────────────────────

/// Defining-body identifier for DCMI group-extension commands.
pub const GROUP_EXTENSION_DCMI: u8 = 0xDC;

/// Validate the group-extension identifier at the head of `msg` and
/// return the offset of the first payload byte behind it.
pub fn check_group_extension(msg: &[u8], expected: u8) -> Result<usize, IpmiError> {
    if msg.is_empty() {
        return Err(IpmiError::InsufficientData { got: 0, need: 1 });
    }
    if msg[0] != expected {
        return Err(IpmiError::GroupExtensionMismatch {
            got: msg[0],
            expected,
        });
    }
    Ok(1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn group_extension_accepts_dcmi() {
        assert_eq!(check_group_extension(&[0xDC, 0x01], GROUP_EXTENSION_DCMI).unwrap(), 1);
    }

    #[test]
    fn group_extension_mismatch() {
        let err = check_group_extension(&[0x12, 0x01], GROUP_EXTENSION_DCMI).unwrap_err();
        assert!(matches!(
            err,
            IpmiError::GroupExtensionMismatch {
                got: 0x12,
                expected: 0xDC
            }
        ));
    }

    #[test]
    fn group_extension_empty_body() {
        let err = check_group_extension(&[], GROUP_EXTENSION_DCMI).unwrap_err();
        assert!(matches!(err, IpmiError::InsufficientData { got: 0, need: 1 }));
    }
}
