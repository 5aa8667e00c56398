//! Session layer — RMCP+ framing, keys, replay protection, and the
//! establishment state machine.
//!
//! ```text
//!  Closed ──ping──► PresenceDetected ──auth caps──► AuthCapsKnown
//!    ▲                                                   │
//!    │                                             open session
//!    │                                                   ▼
//!    │            Rakp2Verified ◄──verify──── OpenSessionAcked
//!    │                  │
//!    │               RAKP 3
//!    │                  ▼
//!    └──error/close── Rakp3Sent ──RAKP 4 verified──► Active
//! ```
//!
//! Transitions are validated and return `Result` instead of panicking;
//! any error forces the phase back to `Closed`.

pub mod crypto;
pub mod rakp;
pub mod rmcp;

use std::time::Instant;

use bytes::BufMut;
use log::trace;

use crate::error::IpmiError;
use crate::message::PrivilegeLevel;
use crate::session::crypto::{
    CipherSuite, ConfidentialityAlgorithm, IntegrityAlgorithm, decrypt_aes_cbc, encrypt_aes_cbc,
    integrity_mac, verify_integrity,
};
use crate::wire::{unpack_bytes, unpack_u8, unpack_u16_le, unpack_u32_le};

// ── Payload types ────────────────────────────────────────────────

/// RMCP+ payload type carried in bits 5:0 of the second header byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PayloadType {
    IpmiMessage,
    OpenSessionRequest,
    OpenSessionResponse,
    Rakp1,
    Rakp2,
    Rakp3,
    Rakp4,
}

impl PayloadType {
    pub const fn value(self) -> u8 {
        match self {
            Self::IpmiMessage => 0x00,
            Self::OpenSessionRequest => 0x10,
            Self::OpenSessionResponse => 0x11,
            Self::Rakp1 => 0x12,
            Self::Rakp2 => 0x13,
            Self::Rakp3 => 0x14,
            Self::Rakp4 => 0x15,
        }
    }

    pub fn from_value(value: u8) -> Result<Self, IpmiError> {
        match value {
            0x00 => Ok(Self::IpmiMessage),
            0x10 => Ok(Self::OpenSessionRequest),
            0x11 => Ok(Self::OpenSessionResponse),
            0x12 => Ok(Self::Rakp1),
            0x13 => Ok(Self::Rakp2),
            0x14 => Ok(Self::Rakp3),
            0x15 => Ok(Self::Rakp4),
            other => Err(IpmiError::UnknownVariant {
                type_name: "PayloadType",
                value: other as u64,
            }),
        }
    }
}

// ── SessionPhase ─────────────────────────────────────────────────

/// Lifecycle phase of a LAN/RMCP+ session.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum SessionPhase {
    /// No session. Initial / terminal state.
    #[default]
    Closed,
    /// The BMC answered an ASF Presence Ping.
    PresenceDetected,
    /// Channel authentication capabilities discovered.
    AuthCapsKnown,
    /// Open Session Response accepted our proposed cipher suite.
    OpenSessionAcked,
    /// RAKP 2 received and its key-exchange code verified.
    Rakp2Verified,
    /// RAKP 3 transmitted; awaiting the BMC's RAKP 4.
    Rakp3Sent,
    /// Mutual authentication complete; keys derived.
    Active { since: Instant },
}

impl std::fmt::Display for SessionPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Closed => write!(f, "Closed"),
            Self::PresenceDetected => write!(f, "PresenceDetected"),
            Self::AuthCapsKnown => write!(f, "AuthCapsKnown"),
            Self::OpenSessionAcked => write!(f, "OpenSessionAcked"),
            Self::Rakp2Verified => write!(f, "Rakp2Verified"),
            Self::Rakp3Sent => write!(f, "Rakp3Sent"),
            Self::Active { .. } => write!(f, "Active"),
        }
    }
}

impl SessionPhase {
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Active { .. })
    }

    pub fn is_closed(&self) -> bool {
        matches!(self, Self::Closed)
    }

    // ── Transitions ──────────────────────────────────────────────

    /// Valid from: `Closed`.
    pub fn detect_presence(&mut self) -> Result<(), IpmiError> {
        match self {
            Self::Closed => {
                *self = Self::PresenceDetected;
                Ok(())
            }
            _ => Err(IpmiError::ProtocolViolation(
                "presence ping outside Closed state",
            )),
        }
    }

    /// Valid from: `PresenceDetected`.
    pub fn learn_auth_caps(&mut self) -> Result<(), IpmiError> {
        match self {
            Self::PresenceDetected => {
                *self = Self::AuthCapsKnown;
                Ok(())
            }
            _ => Err(IpmiError::ProtocolViolation(
                "auth caps outside PresenceDetected state",
            )),
        }
    }

    /// Valid from: `AuthCapsKnown`.
    pub fn ack_open_session(&mut self) -> Result<(), IpmiError> {
        match self {
            Self::AuthCapsKnown => {
                *self = Self::OpenSessionAcked;
                Ok(())
            }
            _ => Err(IpmiError::ProtocolViolation(
                "open session outside AuthCapsKnown state",
            )),
        }
    }

    /// Valid from: `OpenSessionAcked`.
    pub fn verify_rakp2(&mut self) -> Result<(), IpmiError> {
        match self {
            Self::OpenSessionAcked => {
                *self = Self::Rakp2Verified;
                Ok(())
            }
            _ => Err(IpmiError::ProtocolViolation(
                "RAKP 2 outside OpenSessionAcked state",
            )),
        }
    }

    /// Valid from: `Rakp2Verified`.
    pub fn send_rakp3(&mut self) -> Result<(), IpmiError> {
        match self {
            Self::Rakp2Verified => {
                *self = Self::Rakp3Sent;
                Ok(())
            }
            _ => Err(IpmiError::ProtocolViolation(
                "RAKP 3 outside Rakp2Verified state",
            )),
        }
    }

    /// Valid from: `Rakp3Sent` (after the RAKP 4 ICV verified).
    pub fn activate(&mut self) -> Result<(), IpmiError> {
        match self {
            Self::Rakp3Sent => {
                *self = Self::Active {
                    since: Instant::now(),
                };
                Ok(())
            }
            _ => Err(IpmiError::ProtocolViolation(
                "activation outside Rakp3Sent state",
            )),
        }
    }

    /// Force-close from any state (error or deliberate teardown).
    pub fn close(&mut self) {
        *self = Self::Closed;
    }
}

// ── Replay window ────────────────────────────────────────────────

/// 16-entry sliding window over inbound session sequence numbers.
/// Duplicates and sequences older than the window are rejected.
#[derive(Debug, Default)]
pub struct ReplayWindow {
    highest: u32,
    /// Bit i records receipt of `highest - i`.
    mask: u16,
    primed: bool,
}

impl ReplayWindow {
    const SIZE: u32 = 16;

    /// Record `seq` if it is acceptable; `false` means drop the frame.
    pub fn accept(&mut self, seq: u32) -> bool {
        if !self.primed {
            self.primed = true;
            self.highest = seq;
            self.mask = 1;
            return true;
        }
        if seq > self.highest {
            let shift = seq - self.highest;
            self.mask = if shift >= Self::SIZE as u32 {
                0
            } else {
                self.mask << shift
            };
            self.mask |= 1;
            self.highest = seq;
            return true;
        }
        let offset = self.highest - seq;
        if offset >= Self::SIZE as u32 {
            return false;
        }
        let bit = 1u16 << offset;
        if self.mask & bit != 0 {
            return false;
        }
        self.mask |= bit;
        true
    }
}

// ── Session keys ─────────────────────────────────────────────────

/// RAKP-derived key material. Zeroised on drop and on explicit close.
#[derive(Debug, Default)]
pub struct SessionKeys {
    pub sik: Vec<u8>,
    pub k1: Vec<u8>,
    pub k2: Vec<u8>,
}

impl SessionKeys {
    pub fn zeroise(&mut self) {
        for b in self
            .sik
            .iter_mut()
            .chain(self.k1.iter_mut())
            .chain(self.k2.iter_mut())
        {
            *b = 0;
        }
    }
}

impl Drop for SessionKeys {
    fn drop(&mut self) {
        self.zeroise();
    }
}

// ── RMCP+ framing helpers ────────────────────────────────────────

/// Auth-type byte marking a session wrapper as RMCP+ format.
pub const AUTH_TYPE_RMCP_PLUS: u8 = 0x06;

/// Wrap a handshake payload in a session-less RMCP+ header (session id
/// and sequence zero, no integrity, no confidentiality).
pub fn pack_rmcp_plus_sessionless(payload_type: PayloadType, payload: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(12 + payload.len());
    out.put_u8(AUTH_TYPE_RMCP_PLUS);
    out.put_u8(payload_type.value());
    out.put_u32_le(0);
    out.put_u32_le(0);
    out.put_u16_le(payload.len() as u16);
    out.put_slice(payload);
    out
}

/// A parsed RMCP+ session wrapper, before integrity verification or
/// decryption.
#[derive(Debug, Clone)]
pub struct RmcpPlusFrame {
    pub payload_type: PayloadType,
    pub encrypted: bool,
    pub authenticated: bool,
    pub session_id: u32,
    pub sequence: u32,
    pub payload: Vec<u8>,
}

/// Parse an RMCP+ session wrapper (the bytes behind the RMCP header).
pub fn unpack_rmcp_plus(session_bytes: &[u8]) -> Result<RmcpPlusFrame, IpmiError> {
    let (auth_type, off) = unpack_u8(session_bytes, 0)?;
    if auth_type != AUTH_TYPE_RMCP_PLUS {
        return Err(IpmiError::ProtocolViolation("not an RMCP+ session wrapper"));
    }
    let (ptype, off) = unpack_u8(session_bytes, off)?;
    let (session_id, off) = unpack_u32_le(session_bytes, off)?;
    let (sequence, off) = unpack_u32_le(session_bytes, off)?;
    let (payload_len, off) = unpack_u16_le(session_bytes, off)?;
    let (payload, _) = unpack_bytes(session_bytes, off, payload_len as usize)?;

    Ok(RmcpPlusFrame {
        payload_type: PayloadType::from_value(ptype & 0x3F)?,
        encrypted: ptype & 0x80 != 0,
        authenticated: ptype & 0x40 != 0,
        session_id,
        sequence,
        payload: payload.to_vec(),
    })
}

// ── Active session ───────────────────────────────────────────────

/// An established RMCP+ session: ids, negotiated suite, derived keys,
/// and sequence state for both directions.
#[derive(Debug)]
pub struct Session {
    pub console_session_id: u32,
    pub bmc_session_id: u32,
    pub cipher_suite: CipherSuite,
    pub privilege: PrivilegeLevel,
    keys: SessionKeys,
    /// Next outbound sequence number; starts at 1.
    outbound_seq: u32,
    replay: ReplayWindow,
}

impl Session {
    pub fn new(
        console_session_id: u32,
        bmc_session_id: u32,
        cipher_suite: CipherSuite,
        privilege: PrivilegeLevel,
        keys: SessionKeys,
    ) -> Self {
        Self {
            console_session_id,
            bmc_session_id,
            cipher_suite,
            privilege,
            keys,
            outbound_seq: 1,
            replay: ReplayWindow::default(),
        }
    }

    /// Overwrite all derived key material with zeros.
    pub fn zeroise_keys(&mut self) {
        self.keys.zeroise();
    }

    /// Wrap an IPMB message for transmission: encrypt and authenticate
    /// per the negotiated suite, consuming one outbound sequence
    /// number.
    pub fn encode_ipmi(&mut self, ipmb: &[u8]) -> Result<Vec<u8>, IpmiError> {
        let seq = self.outbound_seq;
        self.outbound_seq = self.outbound_seq.wrapping_add(1);

        let encrypted = self.cipher_suite.confidentiality != ConfidentialityAlgorithm::None;
        let authenticated = self.cipher_suite.integrity != IntegrityAlgorithm::None;

        let payload = if encrypted {
            encrypt_aes_cbc(&self.keys.k2, ipmb)?
        } else {
            ipmb.to_vec()
        };

        let mut ptype = PayloadType::IpmiMessage.value();
        if encrypted {
            ptype |= 0x80;
        }
        if authenticated {
            ptype |= 0x40;
        }

        let mut out = Vec::with_capacity(12 + payload.len() + 32);
        out.put_u8(AUTH_TYPE_RMCP_PLUS);
        out.put_u8(ptype);
        out.put_u32_le(self.bmc_session_id);
        out.put_u32_le(seq);
        out.put_u16_le(payload.len() as u16);
        out.put_slice(&payload);

        if authenticated {
            // Integrity pad brings everything ahead of the AuthCode to
            // a multiple of four bytes.
            let pad = (4 - ((out.len() + 2) % 4)) % 4;
            for _ in 0..pad {
                out.put_u8(0xFF);
            }
            out.put_u8(pad as u8);
            out.put_u8(0x07); // next header
            let mac = integrity_mac(self.cipher_suite.integrity, &self.keys.k1, &out);
            out.put_slice(&mac);
        }
        trace!("session seq {seq} encoded ({} bytes)", out.len());
        Ok(out)
    }

    /// Verify, decrypt, and replay-check an inbound session wrapper,
    /// returning the IPMB payload.
    ///
    /// [`IpmiError::SequenceMismatch`] marks frames to drop silently
    /// (replays, foreign session ids); integrity failures are fatal to
    /// the session.
    pub fn decode(&mut self, session_bytes: &[u8]) -> Result<Vec<u8>, IpmiError> {
        let frame = unpack_rmcp_plus(session_bytes)?;
        if frame.payload_type != PayloadType::IpmiMessage {
            return Err(IpmiError::ProtocolViolation(
                "non-IPMI payload in active session",
            ));
        }
        if frame.session_id != self.console_session_id {
            trace!(
                "drop frame for session {:#x} (ours {:#x})",
                frame.session_id, self.console_session_id
            );
            return Err(IpmiError::SequenceMismatch);
        }

        if self.cipher_suite.integrity != IntegrityAlgorithm::None {
            if !frame.authenticated {
                return Err(IpmiError::IntegrityFailure(
                    "unauthenticated frame in protected session",
                ));
            }
            let mac_len = self.cipher_suite.integrity.mac_len();
            if session_bytes.len() < 12 + frame.payload.len() + 2 + mac_len {
                return Err(IpmiError::InsufficientData {
                    got: session_bytes.len(),
                    need: 12 + frame.payload.len() + 2 + mac_len,
                });
            }
            let split = session_bytes.len() - mac_len;
            verify_integrity(
                self.cipher_suite.integrity,
                &self.keys.k1,
                &session_bytes[..split],
                &session_bytes[split..],
            )?;
        }

        if !self.replay.accept(frame.sequence) {
            trace!("drop replayed sequence {}", frame.sequence);
            return Err(IpmiError::SequenceMismatch);
        }

        if self.cipher_suite.confidentiality != ConfidentialityAlgorithm::None {
            if !frame.encrypted {
                return Err(IpmiError::IntegrityFailure(
                    "plaintext frame in confidential session",
                ));
            }
            return decrypt_aes_cbc(&self.keys.k2, &frame.payload);
        }
        Ok(frame.payload)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::crypto::{AuthAlgorithm, derive_k, derive_sik};

    fn test_session(suite_id: u8) -> Session {
        let suite = CipherSuite::from_id(suite_id).unwrap();
        let sik = derive_sik(
            AuthAlgorithm::HmacSha1,
            b"password",
            &[0x11; 16],
            &[0x22; 16],
            0x14,
            b"admin",
        );
        let keys = SessionKeys {
            k1: derive_k(AuthAlgorithm::HmacSha1, &sik, 0x01),
            k2: derive_k(AuthAlgorithm::HmacSha1, &sik, 0x02),
            sik,
        };
        Session::new(0xA0A1A2A3, 0x01020304, suite, PrivilegeLevel::Administrator, keys)
    }

    /// Re-frame a console-encoded wrapper as if the BMC had produced it
    /// for the console session id.
    fn bmc_frame(session: &mut Session, ipmb: &[u8], seq: u32) -> Vec<u8> {
        let mut frame = session.encode_ipmi(ipmb).unwrap();
        frame[2..6].copy_from_slice(&session.console_session_id.to_le_bytes());
        frame[6..10].copy_from_slice(&seq.to_le_bytes());
        if session.cipher_suite.integrity != IntegrityAlgorithm::None {
            let mac_len = session.cipher_suite.integrity.mac_len();
            let split = frame.len() - mac_len;
            let mac = integrity_mac(session.cipher_suite.integrity, &session.keys.k1, &frame[..split]);
            frame[split..].copy_from_slice(&mac);
        }
        frame
    }

    // ── Phase machine ────────────────────────────────────────────

    #[test]
    fn happy_path_lifecycle() {
        let mut phase = SessionPhase::default();
        assert!(phase.is_closed());

        phase.detect_presence().unwrap();
        phase.learn_auth_caps().unwrap();
        phase.ack_open_session().unwrap();
        phase.verify_rakp2().unwrap();
        phase.send_rakp3().unwrap();
        phase.activate().unwrap();
        assert!(phase.is_active());

        phase.close();
        assert!(phase.is_closed());
    }

    #[test]
    fn invalid_transitions_rejected() {
        let mut phase = SessionPhase::Closed;
        assert!(phase.learn_auth_caps().is_err());
        assert!(phase.activate().is_err());

        let mut phase = SessionPhase::AuthCapsKnown;
        assert!(phase.detect_presence().is_err());
        assert!(phase.verify_rakp2().is_err());
    }

    #[test]
    fn close_from_any_state() {
        let mut phase = SessionPhase::Rakp3Sent;
        phase.close();
        assert!(phase.is_closed());
    }

    // ── Replay window ────────────────────────────────────────────

    #[test]
    fn replay_window_accepts_monotonic() {
        let mut window = ReplayWindow::default();
        for seq in 1..=100 {
            assert!(window.accept(seq), "seq {seq}");
        }
    }

    #[test]
    fn replay_window_rejects_duplicates() {
        let mut window = ReplayWindow::default();
        assert!(window.accept(5));
        assert!(!window.accept(5));
    }

    #[test]
    fn replay_window_accepts_reordered_within_window() {
        let mut window = ReplayWindow::default();
        assert!(window.accept(10));
        assert!(window.accept(8));
        assert!(!window.accept(8));
        assert!(window.accept(9));
    }

    #[test]
    fn replay_window_rejects_stale() {
        let mut window = ReplayWindow::default();
        assert!(window.accept(1));
        assert!(window.accept(40));
        // 40 - 16 = 24 is the oldest acceptable offset boundary
        assert!(!window.accept(24));
        assert!(window.accept(25));
    }

    // ── Session-less framing ─────────────────────────────────────

    #[test]
    fn sessionless_roundtrip() {
        let wrapped = pack_rmcp_plus_sessionless(PayloadType::Rakp1, &[0xAA, 0xBB]);
        let frame = unpack_rmcp_plus(&wrapped).unwrap();
        assert_eq!(frame.payload_type, PayloadType::Rakp1);
        assert!(!frame.encrypted);
        assert!(!frame.authenticated);
        assert_eq!(frame.session_id, 0);
        assert_eq!(frame.sequence, 0);
        assert_eq!(frame.payload, vec![0xAA, 0xBB]);
    }

    // ── Active session encode/decode ─────────────────────────────

    #[test]
    fn encode_suite0_is_plain() {
        let mut session = test_session(0);
        let frame = session.encode_ipmi(&[0x01, 0x02, 0x03]).unwrap();
        assert_eq!(frame[1], 0x00); // no encryption / auth bits
        assert_eq!(&frame[12..], &[0x01, 0x02, 0x03]);
    }

    #[test]
    fn encode_suite3_roundtrips_through_decode() {
        let mut session = test_session(3);
        let ipmb = vec![0x20, 0x18, 0xC8, 0x81, 0x04, 0x01, 0x99];

        let frame = bmc_frame(&mut session, &ipmb, 1);
        assert_eq!(frame[1], 0x80 | 0x40);
        // frame ahead of the AuthCode is 4-byte aligned
        assert_eq!((frame.len() - 12) % 4, 0);

        let opened = session.decode(&frame).unwrap();
        assert_eq!(opened, ipmb);
    }

    #[test]
    fn decode_rejects_tampered_authcode() {
        let mut session = test_session(3);
        let mut frame = bmc_frame(&mut session, &[0xAB; 9], 1);
        let last = frame.len() - 1;
        frame[last] ^= 0x01;
        assert!(matches!(
            session.decode(&frame),
            Err(IpmiError::IntegrityFailure(_))
        ));
    }

    #[test]
    fn decode_rejects_replay() {
        let mut session = test_session(3);
        let frame = bmc_frame(&mut session, &[0xAB; 9], 7);
        session.decode(&frame).unwrap();
        assert!(matches!(
            session.decode(&frame),
            Err(IpmiError::SequenceMismatch)
        ));
    }

    #[test]
    fn decode_drops_foreign_session_id() {
        let mut session = test_session(3);
        let mut frame = bmc_frame(&mut session, &[0xAB; 9], 1);
        frame[2] ^= 0xFF;
        assert!(matches!(
            session.decode(&frame),
            Err(IpmiError::SequenceMismatch | IpmiError::IntegrityFailure(_))
        ));
    }

    #[test]
    fn outbound_sequence_increments() {
        let mut session = test_session(0);
        let f1 = session.encode_ipmi(&[0x01]).unwrap();
        let f2 = session.encode_ipmi(&[0x01]).unwrap();
        assert_eq!(u32::from_le_bytes(f1[6..10].try_into().unwrap()), 1);
        assert_eq!(u32::from_le_bytes(f2[6..10].try_into().unwrap()), 2);
    }

    #[test]
    fn keys_zeroise() {
        let mut keys = SessionKeys {
            sik: vec![0xAA; 20],
            k1: vec![0xBB; 20],
            k2: vec![0xCC; 20],
        };
        keys.zeroise();
        assert!(keys.sik.iter().all(|&b| b == 0));
        assert!(keys.k1.iter().all(|&b| b == 0));
        assert!(keys.k2.iter().all(|&b| b == 0));
    }
}
