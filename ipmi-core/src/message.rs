//! Core message model — network functions, command identifiers, and the
//! raw message unit exchanged with a transport.
//!
//! An IPMI message is the triple (network function, command id, data).
//! The network function is a 6-bit family code whose LSB distinguishes
//! request (even) from response (odd); requests and responses share the
//! command id, and responses carry a one-byte completion code ahead of
//! the data tail.

// ── NetFn ────────────────────────────────────────────────────────

/// Network function — the 6-bit command family code.
///
/// Values are the *request* (even) codes; the paired response code is
/// `request | 1`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum NetFn {
    Chassis = 0x00,
    Bridge = 0x02,
    SensorEvent = 0x04,
    App = 0x06,
    Firmware = 0x08,
    Storage = 0x0A,
    Transport = 0x0C,
    /// Group-extension commands (DCMI and friends), prefixed on the
    /// wire with a defining-body identifier byte.
    GroupExtension = 0x2C,
}

impl NetFn {
    /// The even on-wire code used in requests.
    pub const fn request_value(self) -> u8 {
        self as u8
    }

    /// The odd on-wire code carried by the matching response.
    pub const fn response_value(self) -> u8 {
        self as u8 | 1
    }
}

// ── CommandId ────────────────────────────────────────────────────

/// Pairs a command's family with its 8-bit command number.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommandId {
    pub netfn: NetFn,
    pub cmd: u8,
}

impl CommandId {
    pub const fn new(netfn: NetFn, cmd: u8) -> Self {
        Self { netfn, cmd }
    }
}

impl std::fmt::Display for CommandId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}/{:#04x}", self.netfn, self.cmd)
    }
}

// ── Message ──────────────────────────────────────────────────────

/// The raw unit handed to a transport: a netfn byte, a command byte,
/// and the body. For responses `data` starts with the completion code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub netfn: u8,
    pub cmd: u8,
    pub data: Vec<u8>,
}

impl Message {
    /// Build a request message for `command` with the packed `data` body.
    pub fn request(command: CommandId, data: Vec<u8>) -> Self {
        Self {
            netfn: command.netfn.request_value(),
            cmd: command.cmd,
            data,
        }
    }
}

// ── PrivilegeLevel ───────────────────────────────────────────────

/// Session privilege level requested by the console and granted by the
/// BMC. Reserved values decode to [`PrivilegeLevel::Unspecified`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PrivilegeLevel {
    #[default]
    Unspecified,
    Callback,
    User,
    Operator,
    Administrator,
    Oem,
}

impl PrivilegeLevel {
    /// The 4-bit on-wire value.
    pub const fn value(self) -> u8 {
        match self {
            Self::Unspecified => 0,
            Self::Callback => 1,
            Self::User => 2,
            Self::Operator => 3,
            Self::Administrator => 4,
            Self::Oem => 5,
        }
    }
}

impl From<u8> for PrivilegeLevel {
    fn from(value: u8) -> Self {
        match value & 0x0F {
            1 => Self::Callback,
            2 => Self::User,
            3 => Self::Operator,
            4 => Self::Administrator,
            5 => Self::Oem,
            _ => Self::Unspecified,
        }
    }
}

impl std::fmt::Display for PrivilegeLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Unspecified => write!(f, "Unspecified"),
            Self::Callback => write!(f, "Callback"),
            Self::User => write!(f, "User"),
            Self::Operator => write!(f, "Operator"),
            Self::Administrator => write!(f, "Administrator"),
            Self::Oem => write!(f, "OEM"),
        }
    }
}

// ── Completion codes ─────────────────────────────────────────────

/// Completion code signalling success.
pub const CC_OK: u8 = 0x00;

/// The generic completion-code table (IPMI table 5-2). Commands layer
/// their own table on top via
/// [`Response::completion_codes`](crate::codec::Response::completion_codes).
pub fn completion_code_description(cc: u8) -> &'static str {
    match cc {
        0x00 => "command completed normally",
        0xC0 => "node busy",
        0xC1 => "invalid command",
        0xC2 => "command invalid for given LUN",
        0xC3 => "timeout while processing command",
        0xC4 => "out of space",
        0xC5 => "reservation cancelled or invalid reservation ID",
        0xC6 => "request data truncated",
        0xC7 => "request data length invalid",
        0xC8 => "request data field length limit exceeded",
        0xC9 => "parameter out of range",
        0xCA => "cannot return number of requested data bytes",
        0xCB => "requested sensor, data, or record not present",
        0xCC => "invalid data field in request",
        0xCD => "command illegal for specified sensor or record type",
        0xCE => "command response could not be provided",
        0xCF => "cannot execute duplicated request",
        0xD0 => "SDR repository in update mode",
        0xD1 => "device in firmware update mode",
        0xD2 => "BMC initialization in progress",
        0xD3 => "destination unavailable",
        0xD4 => "insufficient privilege level",
        0xD5 => "command not supported in present state",
        0xD6 => "sub-function disabled or unavailable",
        0xFF => "unspecified error",
        _ => "unknown completion code",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn netfn_request_response_pairing() {
        assert_eq!(NetFn::Chassis.request_value(), 0x00);
        assert_eq!(NetFn::Chassis.response_value(), 0x01);
        assert_eq!(NetFn::App.request_value(), 0x06);
        assert_eq!(NetFn::App.response_value(), 0x07);
        assert_eq!(NetFn::GroupExtension.response_value(), 0x2D);
    }

    #[test]
    fn request_message_uses_even_netfn() {
        let msg = Message::request(CommandId::new(NetFn::SensorEvent, 0x2A), vec![0x07, 0x00]);
        assert_eq!(msg.netfn, 0x04);
        assert_eq!(msg.cmd, 0x2A);
        assert_eq!(msg.data, vec![0x07, 0x00]);
    }

    #[test]
    fn privilege_level_reserved_values() {
        assert_eq!(PrivilegeLevel::from(4), PrivilegeLevel::Administrator);
        assert_eq!(PrivilegeLevel::from(0x0B), PrivilegeLevel::Unspecified);
        assert_eq!(PrivilegeLevel::from(0x14), PrivilegeLevel::Administrator); // high nibble masked
    }

    #[test]
    fn generic_completion_codes() {
        assert_eq!(completion_code_description(0xC0), "node busy");
        assert_eq!(completion_code_description(0xC1), "invalid command");
        assert_eq!(completion_code_description(0xFF), "unspecified error");
        assert_eq!(completion_code_description(0x42), "unknown completion code");
    }
}
