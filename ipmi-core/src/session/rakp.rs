//! RMCP+ Open Session and RAKP handshake payloads (IPMI 13.17-13.24).
//!
//! These are session-establishment payloads, not commands: they ride in
//! RMCP+ wrappers with their own payload types and are packed and
//! parsed here as plain structs.

use bytes::BufMut;

use crate::error::IpmiError;
use crate::message::PrivilegeLevel;
use crate::session::crypto::CipherSuite;
use crate::wire::{unpack_bytes, unpack_u8, unpack_u32_le};

/// RMCP+ status codes carried in Open Session Response and RAKP 2-4.
pub fn rakp_status_description(status: u8) -> &'static str {
    match status {
        0x00 => "no errors",
        0x01 => "insufficient resources to create a session",
        0x02 => "invalid session ID",
        0x03 => "invalid payload type",
        0x04 => "invalid authentication algorithm",
        0x05 => "invalid integrity algorithm",
        0x06 => "no matching authentication payload",
        0x07 => "no matching integrity payload",
        0x08 => "inactive session ID",
        0x09 => "invalid role",
        0x0A => "unauthorized role or privilege level requested",
        0x0B => "insufficient resources to create a session at the requested role",
        0x0C => "invalid name length",
        0x0D => "unauthorized name",
        0x0E => "unauthorized GUID",
        0x0F => "invalid integrity check value",
        0x10 => "invalid confidentiality algorithm",
        0x11 => "no cipher suite match with proposed security algorithms",
        0x12 => "illegal or unrecognized parameter",
        _ => "unknown RMCP+ status code",
    }
}

/// The requested-role byte sent in RAKP 1 and bound into the SIK:
/// name-only lookup plus the maximum requested privilege level.
pub fn role_byte(privilege: PrivilegeLevel) -> u8 {
    0x10 | privilege.value()
}

// ── Open Session ─────────────────────────────────────────────────

fn put_algorithm_payload(out: &mut Vec<u8>, payload_type: u8, algorithm: u8) {
    out.put_u8(payload_type);
    out.put_u16(0); // reserved
    out.put_u8(0x08); // payload length
    out.put_u8(algorithm);
    out.put_slice(&[0u8; 3]);
}

/// RMCP+ Open Session Request — 32 bytes.
#[derive(Debug, Clone, Copy)]
pub struct OpenSessionRequest {
    pub message_tag: u8,
    pub requested_privilege: PrivilegeLevel,
    pub console_session_id: u32,
    pub cipher_suite: CipherSuite,
}

impl OpenSessionRequest {
    pub fn pack(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(32);
        out.put_u8(self.message_tag);
        out.put_u8(self.requested_privilege.value());
        out.put_u16(0); // reserved
        out.put_u32_le(self.console_session_id);
        put_algorithm_payload(&mut out, 0x00, self.cipher_suite.auth.value());
        put_algorithm_payload(&mut out, 0x01, self.cipher_suite.integrity.value());
        put_algorithm_payload(&mut out, 0x02, self.cipher_suite.confidentiality.value());
        out
    }
}

/// RMCP+ Open Session Response — 36 bytes on success.
#[derive(Debug, Clone, Copy)]
pub struct OpenSessionResponse {
    pub message_tag: u8,
    pub status: u8,
    pub maximum_privilege: PrivilegeLevel,
    pub console_session_id: u32,
    pub bmc_session_id: u32,
    pub auth_algorithm: u8,
    pub integrity_algorithm: u8,
    pub confidentiality_algorithm: u8,
}

impl OpenSessionResponse {
    pub fn unpack(msg: &[u8]) -> Result<Self, IpmiError> {
        let (message_tag, off) = unpack_u8(msg, 0)?;
        let (status, off) = unpack_u8(msg, off)?;
        if status != 0x00 {
            // Error forms stop after the header fields.
            return Ok(Self {
                message_tag,
                status,
                maximum_privilege: PrivilegeLevel::Unspecified,
                console_session_id: 0,
                bmc_session_id: 0,
                auth_algorithm: 0,
                integrity_algorithm: 0,
                confidentiality_algorithm: 0,
            });
        }

        let (max_priv, off) = unpack_u8(msg, off)?;
        let (_, off) = unpack_u8(msg, off)?; // reserved
        let (console_session_id, off) = unpack_u32_le(msg, off)?;
        let (bmc_session_id, off) = unpack_u32_le(msg, off)?;

        // Three echoed 8-byte algorithm payloads; byte 4 of each holds
        // the selected algorithm.
        let (auth_payload, off) = unpack_bytes(msg, off, 8)?;
        let (integ_payload, off) = unpack_bytes(msg, off, 8)?;
        let (conf_payload, _) = unpack_bytes(msg, off, 8)?;

        Ok(Self {
            message_tag,
            status,
            maximum_privilege: PrivilegeLevel::from(max_priv),
            console_session_id,
            bmc_session_id,
            auth_algorithm: auth_payload[4],
            integrity_algorithm: integ_payload[4],
            confidentiality_algorithm: conf_payload[4],
        })
    }

    /// Whether the BMC selected exactly the algorithms we proposed.
    pub fn matches_suite(&self, suite: &CipherSuite) -> bool {
        self.auth_algorithm == suite.auth.value()
            && self.integrity_algorithm == suite.integrity.value()
            && self.confidentiality_algorithm == suite.confidentiality.value()
    }
}

// ── RAKP 1 / 2 ───────────────────────────────────────────────────

/// RAKP Message 1 — console nonce and identity.
#[derive(Debug, Clone)]
pub struct Rakp1 {
    pub message_tag: u8,
    pub bmc_session_id: u32,
    pub console_random: [u8; 16],
    pub role: u8,
    pub username: Vec<u8>,
}

impl Rakp1 {
    pub fn pack(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(28 + self.username.len());
        out.put_u8(self.message_tag);
        out.put_slice(&[0u8; 3]); // reserved
        out.put_u32_le(self.bmc_session_id);
        out.put_slice(&self.console_random);
        out.put_u8(self.role);
        out.put_u16(0); // reserved
        out.put_u8(self.username.len() as u8);
        out.put_slice(&self.username);
        out
    }
}

/// RAKP Message 2 — BMC nonce, GUID, and key-exchange authentication
/// code.
#[derive(Debug, Clone)]
pub struct Rakp2 {
    pub message_tag: u8,
    pub status: u8,
    pub console_session_id: u32,
    pub bmc_random: [u8; 16],
    pub bmc_guid: [u8; 16],
    /// HMAC over the session ids, nonces, GUID, and identity; empty
    /// for the RAKP-none authentication algorithm.
    pub key_exchange_auth_code: Vec<u8>,
}

impl Rakp2 {
    pub fn unpack(msg: &[u8]) -> Result<Self, IpmiError> {
        let (message_tag, off) = unpack_u8(msg, 0)?;
        let (status, off) = unpack_u8(msg, off)?;
        if status != 0x00 {
            return Ok(Self {
                message_tag,
                status,
                console_session_id: 0,
                bmc_random: [0; 16],
                bmc_guid: [0; 16],
                key_exchange_auth_code: Vec::new(),
            });
        }
        let (_, off) = unpack_bytes(msg, off, 2)?; // reserved
        let (console_session_id, off) = unpack_u32_le(msg, off)?;
        let (random, off) = unpack_bytes(msg, off, 16)?;
        let mut bmc_random = [0u8; 16];
        bmc_random.copy_from_slice(random);
        let (guid, off) = unpack_bytes(msg, off, 16)?;
        let mut bmc_guid = [0u8; 16];
        bmc_guid.copy_from_slice(guid);

        Ok(Self {
            message_tag,
            status,
            console_session_id,
            bmc_random,
            bmc_guid,
            key_exchange_auth_code: msg[off..].to_vec(),
        })
    }
}

// ── RAKP 3 / 4 ───────────────────────────────────────────────────

/// RAKP Message 3 — console's proof of the user key.
#[derive(Debug, Clone)]
pub struct Rakp3 {
    pub message_tag: u8,
    pub status: u8,
    pub bmc_session_id: u32,
    pub key_exchange_auth_code: Vec<u8>,
}

impl Rakp3 {
    pub fn pack(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(8 + self.key_exchange_auth_code.len());
        out.put_u8(self.message_tag);
        out.put_u8(self.status);
        out.put_u16(0); // reserved
        out.put_u32_le(self.bmc_session_id);
        out.put_slice(&self.key_exchange_auth_code);
        out
    }
}

/// RAKP Message 4 — BMC's integrity check value under the freshly
/// derived SIK.
#[derive(Debug, Clone)]
pub struct Rakp4 {
    pub message_tag: u8,
    pub status: u8,
    pub console_session_id: u32,
    pub integrity_check_value: Vec<u8>,
}

impl Rakp4 {
    pub fn unpack(msg: &[u8]) -> Result<Self, IpmiError> {
        let (message_tag, off) = unpack_u8(msg, 0)?;
        let (status, off) = unpack_u8(msg, off)?;
        if status != 0x00 {
            return Ok(Self {
                message_tag,
                status,
                console_session_id: 0,
                integrity_check_value: Vec::new(),
            });
        }
        let (_, off) = unpack_bytes(msg, off, 2)?; // reserved
        let (console_session_id, off) = unpack_u32_le(msg, off)?;
        Ok(Self {
            message_tag,
            status,
            console_session_id,
            integrity_check_value: msg[off..].to_vec(),
        })
    }
}

// ── HMAC input assembly ──────────────────────────────────────────

/// Input for verifying the RAKP 2 key-exchange code:
/// SID_M, SID_C, R_M, R_C, GUID_C, role, username.
pub fn rakp2_hmac_input(
    console_session_id: u32,
    bmc_session_id: u32,
    console_random: &[u8; 16],
    bmc_random: &[u8; 16],
    bmc_guid: &[u8; 16],
    role: u8,
    username: &[u8],
) -> Vec<u8> {
    let mut input = Vec::with_capacity(58 + username.len());
    input.put_u32_le(console_session_id);
    input.put_u32_le(bmc_session_id);
    input.put_slice(console_random);
    input.put_slice(bmc_random);
    input.put_slice(bmc_guid);
    input.put_u8(role);
    input.put_u8(username.len() as u8);
    input.put_slice(username);
    input
}

/// Input for the RAKP 3 key-exchange code: R_C, SID_M, role, username.
pub fn rakp3_hmac_input(
    bmc_random: &[u8; 16],
    console_session_id: u32,
    role: u8,
    username: &[u8],
) -> Vec<u8> {
    let mut input = Vec::with_capacity(22 + username.len());
    input.put_slice(bmc_random);
    input.put_u32_le(console_session_id);
    input.put_u8(role);
    input.put_u8(username.len() as u8);
    input.put_slice(username);
    input
}

/// Input for the RAKP 4 integrity check value: R_M, SID_C, GUID_C.
pub fn rakp4_hmac_input(
    console_random: &[u8; 16],
    bmc_session_id: u32,
    bmc_guid: &[u8; 16],
) -> Vec<u8> {
    let mut input = Vec::with_capacity(36);
    input.put_slice(console_random);
    input.put_u32_le(bmc_session_id);
    input.put_slice(bmc_guid);
    input
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::crypto::{AuthAlgorithm, auth_hmac};

    #[test]
    fn open_session_request_is_32_bytes() {
        let req = OpenSessionRequest {
            message_tag: 0x00,
            requested_privilege: PrivilegeLevel::Administrator,
            console_session_id: 0xA0A1A2A3,
            cipher_suite: CipherSuite::from_id(3).unwrap(),
        };
        let out = req.pack();
        assert_eq!(out.len(), 32);
        assert_eq!(out[1], 0x04);
        assert_eq!(&out[4..8], &[0xA3, 0xA2, 0xA1, 0xA0]);
        // auth payload
        assert_eq!(out[8], 0x00);
        assert_eq!(out[12], 0x01); // HMAC-SHA1
        // integrity payload
        assert_eq!(out[16], 0x01);
        assert_eq!(out[20], 0x01); // HMAC-SHA1-96
        // confidentiality payload
        assert_eq!(out[24], 0x02);
        assert_eq!(out[28], 0x01); // AES-CBC-128
    }

    #[test]
    fn open_session_response_roundtrip() {
        let suite = CipherSuite::from_id(3).unwrap();
        let mut msg = Vec::new();
        msg.put_u8(0x00); // tag
        msg.put_u8(0x00); // status
        msg.put_u8(0x04); // max privilege
        msg.put_u8(0x00);
        msg.put_u32_le(0xA0A1A2A3); // console sid
        msg.put_u32_le(0x01020304); // bmc sid
        put_algorithm_payload(&mut msg, 0x00, 0x01);
        put_algorithm_payload(&mut msg, 0x01, 0x01);
        put_algorithm_payload(&mut msg, 0x02, 0x01);

        let res = OpenSessionResponse::unpack(&msg).unwrap();
        assert_eq!(res.status, 0x00);
        assert_eq!(res.maximum_privilege, PrivilegeLevel::Administrator);
        assert_eq!(res.console_session_id, 0xA0A1A2A3);
        assert_eq!(res.bmc_session_id, 0x01020304);
        assert!(res.matches_suite(&suite));
    }

    #[test]
    fn open_session_response_error_form() {
        let res = OpenSessionResponse::unpack(&[0x00, 0x11]).unwrap();
        assert_eq!(res.status, 0x11);
        assert_eq!(
            rakp_status_description(res.status),
            "no cipher suite match with proposed security algorithms"
        );
    }

    #[test]
    fn rakp1_layout() {
        let rakp1 = Rakp1 {
            message_tag: 0x01,
            bmc_session_id: 0x01020304,
            console_random: [0xAB; 16],
            role: role_byte(PrivilegeLevel::Administrator),
            username: b"admin".to_vec(),
        };
        let out = rakp1.pack();
        assert_eq!(out.len(), 33);
        assert_eq!(&out[4..8], &[0x04, 0x03, 0x02, 0x01]);
        assert_eq!(&out[8..24], &[0xAB; 16]);
        assert_eq!(out[24], 0x14);
        assert_eq!(out[27], 5);
        assert_eq!(&out[28..], b"admin");
    }

    #[test]
    fn rakp2_roundtrip_with_valid_hmac() {
        let console_random = [0x11u8; 16];
        let bmc_random = [0x22u8; 16];
        let bmc_guid = [0x33u8; 16];
        let role = role_byte(PrivilegeLevel::Administrator);
        let code = auth_hmac(
            AuthAlgorithm::HmacSha1,
            b"password",
            &rakp2_hmac_input(
                0xA0A1A2A3, 0x01020304, &console_random, &bmc_random, &bmc_guid, role, b"admin",
            ),
        );

        let mut msg = Vec::new();
        msg.put_u8(0x01);
        msg.put_u8(0x00);
        msg.put_u16(0);
        msg.put_u32_le(0xA0A1A2A3);
        msg.put_slice(&bmc_random);
        msg.put_slice(&bmc_guid);
        msg.put_slice(&code);

        let rakp2 = Rakp2::unpack(&msg).unwrap();
        assert_eq!(rakp2.console_session_id, 0xA0A1A2A3);
        assert_eq!(rakp2.bmc_random, bmc_random);
        assert_eq!(rakp2.key_exchange_auth_code, code);
    }

    #[test]
    fn rakp2_error_status_short_form() {
        let rakp2 = Rakp2::unpack(&[0x01, 0x0D]).unwrap();
        assert_eq!(rakp2.status, 0x0D);
        assert_eq!(rakp_status_description(0x0D), "unauthorized name");
    }

    #[test]
    fn rakp4_parse() {
        let mut msg = Vec::new();
        msg.put_u8(0x02);
        msg.put_u8(0x00);
        msg.put_u16(0);
        msg.put_u32_le(0xA0A1A2A3);
        msg.put_slice(&[0xCD; 12]);

        let rakp4 = Rakp4::unpack(&msg).unwrap();
        assert_eq!(rakp4.console_session_id, 0xA0A1A2A3);
        assert_eq!(rakp4.integrity_check_value, vec![0xCD; 12]);
    }
}
