//! Platform Event Filtering configuration commands.

use bytes::BufMut;

use crate::codec::{Request, Response};
use crate::error::IpmiError;
use crate::message::{CommandId, NetFn};
use crate::wire::unpack_u8;

// ── Set PEF Configuration Parameters ─────────────────────────────

/// Set PEF Configuration Parameters request (IPMI 30.3) — a parameter
/// selector followed by opaque parameter data.
#[derive(Debug, Clone, Default)]
pub struct SetPefConfigParamRequest {
    pub selector: u8,
    pub data: Vec<u8>,
}

impl Request for SetPefConfigParamRequest {
    fn command(&self) -> CommandId {
        CommandId::new(NetFn::SensorEvent, 0x12)
    }

    fn pack(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(1 + self.data.len());
        out.put_u8(self.selector & 0x7F);
        out.put_slice(&self.data);
        out
    }
}

/// Set PEF Configuration Parameters response — empty body.
#[derive(Debug, Clone, Copy, Default)]
pub struct SetPefConfigParamResponse;

impl Response for SetPefConfigParamResponse {
    fn unpack(&mut self, _msg: &[u8]) -> Result<(), IpmiError> {
        Ok(())
    }

    fn completion_codes(&self) -> &'static [(u8, &'static str)] {
        &[
            (0x80, "parameter not supported"),
            (
                0x81,
                "attempt to set the 'set in progress' value (in parameter #0) when not in the 'set complete' state",
            ),
            (0x82, "attempt to write read-only parameter"),
            (0x83, "attempt to read write-only parameter"),
        ]
    }
}

// ── Get PEF Configuration Parameters ─────────────────────────────

/// Get PEF Configuration Parameters request (IPMI 30.4).
#[derive(Debug, Clone, Copy, Default)]
pub struct GetPefConfigParamRequest {
    pub selector: u8,
    /// Request only the parameter revision, not the data.
    pub revision_only: bool,
    pub set_selector: u8,
    pub block_selector: u8,
}

impl Request for GetPefConfigParamRequest {
    fn command(&self) -> CommandId {
        CommandId::new(NetFn::SensorEvent, 0x13)
    }

    fn pack(&self) -> Vec<u8> {
        let mut b0 = self.selector & 0x7F;
        if self.revision_only {
            b0 |= 0x80;
        }
        vec![b0, self.set_selector, self.block_selector]
    }
}

/// Get PEF Configuration Parameters response — the parameter revision
/// and, unless revision-only was requested, the parameter data.
#[derive(Debug, Clone, Default)]
pub struct GetPefConfigParamResponse {
    pub parameter_revision: u8,
    pub data: Vec<u8>,
}

impl Response for GetPefConfigParamResponse {
    fn unpack(&mut self, msg: &[u8]) -> Result<(), IpmiError> {
        let (revision, off) = unpack_u8(msg, 0)?;
        self.parameter_revision = revision;
        self.data = msg[off..].to_vec();
        Ok(())
    }

    fn completion_codes(&self) -> &'static [(u8, &'static str)] {
        &[(0x80, "parameter not supported")]
    }
}
