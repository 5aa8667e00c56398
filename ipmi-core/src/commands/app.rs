//! App (netfn 0x06) commands — device identity, interface capabilities,
//! and session management.

use bitflags::bitflags;
use bytes::BufMut;

use crate::codec::{Request, Response};
use crate::error::IpmiError;
use crate::message::{CommandId, NetFn, PrivilegeLevel};
use crate::wire::{is_bit_set, unpack_bytes, unpack_u8, unpack_u16_le, unpack_u32_be};

// ── Get Device ID ────────────────────────────────────────────────

/// Get Device ID request (IPMI 20.1) — empty body.
#[derive(Debug, Clone, Copy, Default)]
pub struct GetDeviceIdRequest;

impl Request for GetDeviceIdRequest {
    fn command(&self) -> CommandId {
        CommandId::new(NetFn::App, 0x01)
    }

    fn pack(&self) -> Vec<u8> {
        Vec::new()
    }
}

/// Get Device ID response — 11 bytes, or 15 with the optional
/// auxiliary firmware revision.
#[derive(Debug, Clone, Default)]
pub struct GetDeviceIdResponse {
    pub device_id: u8,
    pub provides_device_sdrs: bool,
    pub device_revision: u8,
    pub device_available: bool,
    pub firmware_major: u8,
    /// BCD-encoded minor revision.
    pub firmware_minor: u8,
    /// BCD-encoded IPMI version (0x02 = IPMI 2.0).
    pub ipmi_version: u8,
    pub additional_device_support: u8,
    pub manufacturer_id: u32,
    pub product_id: u16,
    pub aux_firmware_revision: Option<[u8; 4]>,
}

impl Response for GetDeviceIdResponse {
    fn unpack(&mut self, msg: &[u8]) -> Result<(), IpmiError> {
        if msg.len() < 11 {
            return Err(IpmiError::InsufficientData {
                got: msg.len(),
                need: 11,
            });
        }

        let (b0, _) = unpack_u8(msg, 0)?;
        self.device_id = b0;
        let (b1, _) = unpack_u8(msg, 1)?;
        self.provides_device_sdrs = is_bit_set(b1, 7);
        self.device_revision = b1 & 0x0F;
        let (b2, _) = unpack_u8(msg, 2)?;
        // 0 = normal operation, 1 = firmware/SDR update in progress
        self.device_available = !is_bit_set(b2, 7);
        self.firmware_major = b2 & 0x7F;
        (self.firmware_minor, _) = unpack_u8(msg, 3)?;
        (self.ipmi_version, _) = unpack_u8(msg, 4)?;
        (self.additional_device_support, _) = unpack_u8(msg, 5)?;

        let (mfg, off) = unpack_bytes(msg, 6, 3)?;
        self.manufacturer_id = u32::from_le_bytes([mfg[0], mfg[1], mfg[2], 0]);
        (self.product_id, _) = unpack_u16_le(msg, off)?;

        if msg.len() >= 15 {
            let (aux, _) = unpack_bytes(msg, 11, 4)?;
            self.aux_firmware_revision = Some([aux[0], aux[1], aux[2], aux[3]]);
        }
        Ok(())
    }
}

// ── Get BT Interface Capabilities ────────────────────────────────

/// Get BT Interface Capabilities request (IPMI 22.10) — empty body.
#[derive(Debug, Clone, Copy, Default)]
pub struct GetBtInterfaceCapabilitiesRequest;

impl Request for GetBtInterfaceCapabilitiesRequest {
    fn command(&self) -> CommandId {
        CommandId::new(NetFn::App, 0x36)
    }

    fn pack(&self) -> Vec<u8> {
        Vec::new()
    }
}

/// Get BT Interface Capabilities response — exactly 5 bytes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GetBtInterfaceCapabilitiesResponse {
    pub outstanding_requests_supported: u8,
    pub input_buffer_size: u8,
    pub output_buffer_size: u8,
    /// BMC request-to-response time, in seconds.
    pub bmc_response_time_secs: u8,
    pub recommended_retries: u8,
}

impl Response for GetBtInterfaceCapabilitiesResponse {
    fn unpack(&mut self, msg: &[u8]) -> Result<(), IpmiError> {
        if msg.len() < 5 {
            return Err(IpmiError::InsufficientData {
                got: msg.len(),
                need: 5,
            });
        }
        (self.outstanding_requests_supported, _) = unpack_u8(msg, 0)?;
        (self.input_buffer_size, _) = unpack_u8(msg, 1)?;
        (self.output_buffer_size, _) = unpack_u8(msg, 2)?;
        (self.bmc_response_time_secs, _) = unpack_u8(msg, 3)?;
        (self.recommended_retries, _) = unpack_u8(msg, 4)?;
        Ok(())
    }
}

// ── Get Channel Authentication Capabilities ──────────────────────

/// The channel the command it was received over.
pub const CHANNEL_CURRENT: u8 = 0x0E;

bitflags! {
    /// IPMI v1.5 authentication types advertised by a channel.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct AuthTypeSupport: u8 {
        const NONE = 1 << 0;
        const MD2 = 1 << 1;
        const MD5 = 1 << 2;
        const STRAIGHT_PASSWORD = 1 << 4;
        const OEM = 1 << 5;
    }
}

/// Get Channel Authentication Capabilities request (IPMI 22.13).
///
/// Setting `request_v2_data` asks the BMC to report IPMI v2.0/RMCP+
/// extended capabilities; it is the first message of every LAN session
/// establishment and is always sent outside a session.
#[derive(Debug, Clone, Copy)]
pub struct GetChannelAuthCapsRequest {
    pub channel: u8,
    pub request_v2_data: bool,
    pub privilege_level: PrivilegeLevel,
}

impl Default for GetChannelAuthCapsRequest {
    fn default() -> Self {
        Self {
            channel: CHANNEL_CURRENT,
            request_v2_data: true,
            privilege_level: PrivilegeLevel::Administrator,
        }
    }
}

impl Request for GetChannelAuthCapsRequest {
    fn command(&self) -> CommandId {
        CommandId::new(NetFn::App, 0x38)
    }

    fn pack(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(2);
        let mut b0 = self.channel & 0x0F;
        if self.request_v2_data {
            b0 |= 0x80;
        }
        out.put_u8(b0);
        out.put_u8(self.privilege_level.value());
        out
    }
}

/// Get Channel Authentication Capabilities response — 8 bytes.
#[derive(Debug, Clone, Default)]
pub struct GetChannelAuthCapsResponse {
    pub channel: u8,
    pub extended_capabilities: bool,
    pub auth_types: AuthTypeSupport,
    pub kg_set_to_non_default: bool,
    pub per_message_auth_disabled: bool,
    pub user_level_auth_disabled: bool,
    pub non_null_usernames_enabled: bool,
    pub null_usernames_enabled: bool,
    pub anonymous_login_enabled: bool,
    pub ipmi_v2_supported: bool,
    pub ipmi_v15_supported: bool,
    pub oem_id: u32,
    pub oem_aux: u8,
}

impl Response for GetChannelAuthCapsResponse {
    fn unpack(&mut self, msg: &[u8]) -> Result<(), IpmiError> {
        if msg.len() < 8 {
            return Err(IpmiError::InsufficientData {
                got: msg.len(),
                need: 8,
            });
        }

        (self.channel, _) = unpack_u8(msg, 0)?;
        let (b1, _) = unpack_u8(msg, 1)?;
        self.extended_capabilities = is_bit_set(b1, 7);
        self.auth_types = AuthTypeSupport::from_bits_truncate(b1 & 0x3F);

        let (b2, _) = unpack_u8(msg, 2)?;
        self.kg_set_to_non_default = is_bit_set(b2, 5);
        self.per_message_auth_disabled = is_bit_set(b2, 4);
        self.user_level_auth_disabled = is_bit_set(b2, 3);
        self.non_null_usernames_enabled = is_bit_set(b2, 2);
        self.null_usernames_enabled = is_bit_set(b2, 1);
        self.anonymous_login_enabled = is_bit_set(b2, 0);

        let (b3, _) = unpack_u8(msg, 3)?;
        self.ipmi_v2_supported = is_bit_set(b3, 1);
        self.ipmi_v15_supported = is_bit_set(b3, 0);

        let (oem, _) = unpack_bytes(msg, 4, 3)?;
        self.oem_id = u32::from_le_bytes([oem[0], oem[1], oem[2], 0]);
        (self.oem_aux, _) = unpack_u8(msg, 7)?;
        Ok(())
    }
}

// ── Get Session Info ─────────────────────────────────────────────

/// Which session Get Session Info (IPMI 22.20) should look up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionIndex {
    /// The session this command was received over.
    #[default]
    Current,
    /// The Nth active session (1-based).
    Nth(u8),
    /// Look up by session handle (selector 0xFE).
    ByHandle(u8),
    /// Look up by session id (selector 0xFF).
    ById(u32),
}

/// Get Session Info request — 1, 2, or 5 bytes depending on selector.
#[derive(Debug, Clone, Copy, Default)]
pub struct GetSessionInfoRequest {
    pub index: SessionIndex,
}

impl Request for GetSessionInfoRequest {
    fn command(&self) -> CommandId {
        CommandId::new(NetFn::App, 0x3D)
    }

    fn pack(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(5);
        match self.index {
            SessionIndex::Current => out.put_u8(0x00),
            SessionIndex::Nth(n) => out.put_u8(n),
            SessionIndex::ByHandle(handle) => {
                out.put_u8(0xFE);
                out.put_u8(handle);
            }
            SessionIndex::ById(id) => {
                out.put_u8(0xFF);
                out.put_u32_le(id);
            }
        }
        out
    }
}

/// Trailing layout when the looked-up session rides an 802.3 LAN
/// channel (response length ≥ 18).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LanSessionInfo {
    /// Remote console IPv4 address, MS-byte first on the wire.
    pub console_ip: [u8; 4],
    /// Remote console MAC address, MS-byte first on the wire.
    pub console_mac: [u8; 6],
    /// Remote console UDP port, LS-byte first on the wire.
    pub console_port: u16,
}

/// Trailing layout for asynchronous serial/modem channels (response
/// length ≥ 14 but below the LAN threshold).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SerialSessionInfo {
    pub activity_type: u8,
    pub destination_selector: u8,
    /// Remote console address for PPP connections, MS-byte first;
    /// zero otherwise.
    pub console_ip_ppp: u32,
    pub console_port_ppp: u16,
}

/// Get Session Info response, decoded progressively on length
/// thresholds: 3-byte prefix, +3 user/privilege/channel bytes, then a
/// channel-dependent tail.
#[derive(Debug, Clone, Default)]
pub struct GetSessionInfoResponse {
    pub session_handle: u8,
    pub possible_active_sessions: u8,
    pub current_active_sessions: u8,

    pub user_id: Option<u8>,
    pub privilege_level: Option<PrivilegeLevel>,
    /// Session protocol auxiliary data (0 = IPMI v1.5, 1 = RMCP+ on
    /// 802.3 LAN channels), the high nibble of the sixth byte.
    pub auxiliary_data: Option<u8>,
    pub channel_number: Option<u8>,

    pub lan: Option<LanSessionInfo>,
    pub serial: Option<SerialSessionInfo>,
}

impl Response for GetSessionInfoResponse {
    fn unpack(&mut self, msg: &[u8]) -> Result<(), IpmiError> {
        if msg.len() < 3 {
            return Err(IpmiError::InsufficientData {
                got: msg.len(),
                need: 3,
            });
        }
        (self.session_handle, _) = unpack_u8(msg, 0)?;
        (self.possible_active_sessions, _) = unpack_u8(msg, 1)?;
        (self.current_active_sessions, _) = unpack_u8(msg, 2)?;

        if msg.len() == 3 {
            return Ok(());
        }

        // Anything beyond the prefix requires the full second group.
        if msg.len() < 6 {
            return Err(IpmiError::InsufficientData {
                got: msg.len(),
                need: 6,
            });
        }
        let (user, _) = unpack_u8(msg, 3)?;
        self.user_id = Some(user & 0x3F);
        let (b4, _) = unpack_u8(msg, 4)?;
        self.privilege_level = Some(PrivilegeLevel::from(b4));
        let (b5, _) = unpack_u8(msg, 5)?;
        self.auxiliary_data = Some(b5 >> 4);
        self.channel_number = Some(b5 & 0x0F);

        // The channel-dependent tail is selected on length alone: the
        // LAN layout needs 12 trailing bytes, the serial layout 8. The
        // aux/channel byte would only disambiguate if both forms could
        // arrive at the same length, which they cannot.
        if msg.len() >= 18 {
            let (ip, off) = unpack_bytes(msg, 6, 4)?;
            let (mac, off) = unpack_bytes(msg, off, 6)?;
            let (port, _) = unpack_u16_le(msg, off)?;
            self.lan = Some(LanSessionInfo {
                console_ip: [ip[0], ip[1], ip[2], ip[3]],
                console_mac: [mac[0], mac[1], mac[2], mac[3], mac[4], mac[5]],
                console_port: port,
            });
        } else if msg.len() >= 14 {
            let (activity_type, off) = unpack_u8(msg, 6)?;
            let (destination_selector, off) = unpack_u8(msg, off)?;
            let (ip, off) = unpack_u32_be(msg, off)?;
            let (port, _) = unpack_u16_le(msg, off)?;
            self.serial = Some(SerialSessionInfo {
                activity_type,
                destination_selector,
                console_ip_ppp: ip,
                console_port_ppp: port,
            });
        }
        Ok(())
    }
}

// ── Set Session Privilege Level ──────────────────────────────────

/// Set Session Privilege Level request (IPMI 22.18) — one level byte.
#[derive(Debug, Clone, Copy)]
pub struct SetSessionPrivilegeLevelRequest {
    pub privilege_level: PrivilegeLevel,
}

impl Request for SetSessionPrivilegeLevelRequest {
    fn command(&self) -> CommandId {
        CommandId::new(NetFn::App, 0x3B)
    }

    fn pack(&self) -> Vec<u8> {
        vec![self.privilege_level.value()]
    }
}

/// Set Session Privilege Level response — the granted level.
#[derive(Debug, Clone, Copy, Default)]
pub struct SetSessionPrivilegeLevelResponse {
    pub privilege_level: PrivilegeLevel,
}

impl Response for SetSessionPrivilegeLevelResponse {
    fn unpack(&mut self, msg: &[u8]) -> Result<(), IpmiError> {
        let (level, _) = unpack_u8(msg, 0)?;
        self.privilege_level = PrivilegeLevel::from(level);
        Ok(())
    }

    fn completion_codes(&self) -> &'static [(u8, &'static str)] {
        &[
            (0x80, "requested level not available for this user"),
            (
                0x81,
                "requested level exceeds channel and/or user privilege limit",
            ),
            (0x82, "cannot disable user level authentication"),
        ]
    }
}

// ── Close Session ────────────────────────────────────────────────

/// Close Session request (IPMI 22.19) — the 4-byte session id.
#[derive(Debug, Clone, Copy)]
pub struct CloseSessionRequest {
    pub session_id: u32,
}

impl Request for CloseSessionRequest {
    fn command(&self) -> CommandId {
        CommandId::new(NetFn::App, 0x3C)
    }

    fn pack(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(4);
        out.put_u32_le(self.session_id);
        out
    }
}

/// Close Session response — empty body.
#[derive(Debug, Clone, Copy, Default)]
pub struct CloseSessionResponse;

impl Response for CloseSessionResponse {
    fn unpack(&mut self, _msg: &[u8]) -> Result<(), IpmiError> {
        Ok(())
    }

    fn completion_codes(&self) -> &'static [(u8, &'static str)] {
        &[
            (0x87, "invalid session ID in request"),
            (0x88, "invalid session handle in request"),
        ]
    }
}
