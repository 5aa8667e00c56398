//! Sensor/Event commands — Re-arm Sensor Events and Get Sensor Reading.
//!
//! Re-arm Sensor Events (IPMI 35.12) request layout:
//!
//! ```text
//! Byte 0  sensor number
//! Byte 1  [7] 0 = re-arm all event status, 1 = selective re-arm
//! Bytes 2..=5 (selective only) assert/deassert bitmaps; the bit
//! assignment differs between threshold and discrete sensors.
//! ```

use crate::codec::{Request, Response};
use crate::error::IpmiError;
use crate::message::{CommandId, NetFn};
use crate::wire::{is_bit_set, set_or_clear_bit, unpack_u8};

// ── Re-arm Sensor Events ─────────────────────────────────────────

/// Per-threshold re-arm selection for threshold-based sensors.
///
/// Field order mirrors the wire bitmap: byte 2 carries the non-critical
/// and non-recoverable assertion bits, byte 3 the upper-recoverable /
/// upper-critical ones, bytes 4 and 5 the matching deassertions.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ThresholdEventFlags {
    pub unc_high_assert: bool,
    pub unc_low_assert: bool,
    pub lnr_high_assert: bool,
    pub lnr_low_assert: bool,
    pub lcr_high_assert: bool,
    pub lcr_low_assert: bool,
    pub lnc_high_assert: bool,
    pub lnc_low_assert: bool,
    pub unr_high_assert: bool,
    pub unr_low_assert: bool,
    pub ucr_high_assert: bool,
    pub ucr_low_assert: bool,

    pub unc_high_deassert: bool,
    pub unc_low_deassert: bool,
    pub lnr_high_deassert: bool,
    pub lnr_low_deassert: bool,
    pub lcr_high_deassert: bool,
    pub lcr_low_deassert: bool,
    pub lnc_high_deassert: bool,
    pub lnc_low_deassert: bool,
    pub unr_high_deassert: bool,
    pub unr_low_deassert: bool,
    pub ucr_high_deassert: bool,
    pub ucr_low_deassert: bool,
}

impl ThresholdEventFlags {
    fn pack(&self) -> [u8; 4] {
        let mut b2 = 0u8;
        b2 = set_or_clear_bit(b2, 7, self.unc_high_assert);
        b2 = set_or_clear_bit(b2, 6, self.unc_low_assert);
        b2 = set_or_clear_bit(b2, 5, self.lnr_high_assert);
        b2 = set_or_clear_bit(b2, 4, self.lnr_low_assert);
        b2 = set_or_clear_bit(b2, 3, self.lcr_high_assert);
        b2 = set_or_clear_bit(b2, 2, self.lcr_low_assert);
        b2 = set_or_clear_bit(b2, 1, self.lnc_high_assert);
        b2 = set_or_clear_bit(b2, 0, self.lnc_low_assert);

        let mut b3 = 0u8;
        b3 = set_or_clear_bit(b3, 3, self.unr_high_assert);
        b3 = set_or_clear_bit(b3, 2, self.unr_low_assert);
        b3 = set_or_clear_bit(b3, 1, self.ucr_high_assert);
        b3 = set_or_clear_bit(b3, 0, self.ucr_low_assert);

        let mut b4 = 0u8;
        b4 = set_or_clear_bit(b4, 7, self.unc_high_deassert);
        b4 = set_or_clear_bit(b4, 6, self.unc_low_deassert);
        b4 = set_or_clear_bit(b4, 5, self.lnr_high_deassert);
        b4 = set_or_clear_bit(b4, 4, self.lnr_low_deassert);
        b4 = set_or_clear_bit(b4, 3, self.lcr_high_deassert);
        b4 = set_or_clear_bit(b4, 2, self.lcr_low_deassert);
        b4 = set_or_clear_bit(b4, 1, self.lnc_high_deassert);
        b4 = set_or_clear_bit(b4, 0, self.lnc_low_deassert);

        let mut b5 = 0u8;
        b5 = set_or_clear_bit(b5, 3, self.unr_high_deassert);
        b5 = set_or_clear_bit(b5, 2, self.unr_low_deassert);
        b5 = set_or_clear_bit(b5, 1, self.ucr_high_deassert);
        b5 = set_or_clear_bit(b5, 0, self.ucr_low_deassert);

        [b2, b3, b4, b5]
    }
}

/// Per-state re-arm selection for discrete sensors; index i covers
/// sensor-specific state i (0..=14).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DiscreteEventFlags {
    pub assert: [bool; 15],
    pub deassert: [bool; 15],
}

impl DiscreteEventFlags {
    fn pack(&self) -> [u8; 4] {
        let mut b2 = 0u8;
        let mut b3 = 0u8;
        let mut b4 = 0u8;
        let mut b5 = 0u8;
        for i in 0..8u8 {
            b2 = set_or_clear_bit(b2, i, self.assert[i as usize]);
            b4 = set_or_clear_bit(b4, i, self.deassert[i as usize]);
        }
        for i in 0..7u8 {
            b3 = set_or_clear_bit(b3, i, self.assert[i as usize + 8]);
            b5 = set_or_clear_bit(b5, i, self.deassert[i as usize + 8]);
        }
        [b2, b3, b4, b5]
    }
}

/// What to re-arm on the sensor.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum RearmEvents {
    /// Re-arm all event status from the sensor (2-byte request form).
    #[default]
    All,
    /// Selective re-arm of threshold events (6-byte form).
    Threshold(ThresholdEventFlags),
    /// Selective re-arm of discrete states (6-byte form).
    Discrete(DiscreteEventFlags),
}

/// Re-arm Sensor Events request.
#[derive(Debug, Clone, Copy, Default)]
pub struct RearmSensorEventsRequest {
    pub sensor_number: u8,
    pub events: RearmEvents,
}

impl Request for RearmSensorEventsRequest {
    fn command(&self) -> CommandId {
        CommandId::new(NetFn::SensorEvent, 0x2A)
    }

    fn pack(&self) -> Vec<u8> {
        let mut out = vec![self.sensor_number, 0u8];
        let bitmaps = match self.events {
            RearmEvents::All => return out,
            RearmEvents::Threshold(flags) => flags.pack(),
            RearmEvents::Discrete(flags) => flags.pack(),
        };
        out[1] = set_or_clear_bit(out[1], 7, true);
        out.extend_from_slice(&bitmaps);
        out
    }
}

/// Re-arm Sensor Events response — empty body.
#[derive(Debug, Clone, Copy, Default)]
pub struct RearmSensorEventsResponse;

impl Response for RearmSensorEventsResponse {
    fn unpack(&mut self, _msg: &[u8]) -> Result<(), IpmiError> {
        Ok(())
    }
}

// ── Get Sensor Reading ───────────────────────────────────────────

/// Get Sensor Reading request (IPMI 35.14) — the sensor number.
#[derive(Debug, Clone, Copy, Default)]
pub struct GetSensorReadingRequest {
    pub sensor_number: u8,
}

impl Request for GetSensorReadingRequest {
    fn command(&self) -> CommandId {
        CommandId::new(NetFn::SensorEvent, 0x2D)
    }

    fn pack(&self) -> Vec<u8> {
        vec![self.sensor_number]
    }
}

/// Get Sensor Reading response — reading byte, status byte, and up to
/// two optional state bytes decoded progressively.
#[derive(Debug, Clone, Copy, Default)]
pub struct GetSensorReadingResponse {
    pub reading: u8,
    pub event_messages_enabled: bool,
    pub scanning_enabled: bool,
    pub reading_unavailable: bool,
    /// Threshold comparison status, or discrete states 0..=7.
    pub state_1: Option<u8>,
    /// Discrete states 8..=14.
    pub state_2: Option<u8>,
}

impl Response for GetSensorReadingResponse {
    fn unpack(&mut self, msg: &[u8]) -> Result<(), IpmiError> {
        if msg.len() < 2 {
            return Err(IpmiError::InsufficientData {
                got: msg.len(),
                need: 2,
            });
        }
        (self.reading, _) = unpack_u8(msg, 0)?;
        let (b1, _) = unpack_u8(msg, 1)?;
        self.event_messages_enabled = is_bit_set(b1, 7);
        self.scanning_enabled = is_bit_set(b1, 6);
        self.reading_unavailable = is_bit_set(b1, 5);

        if msg.len() >= 3 {
            self.state_1 = Some(msg[2]);
        }
        if msg.len() >= 4 {
            self.state_2 = Some(msg[3]);
        }
        Ok(())
    }
}
