//! Chassis commands — Get Chassis Status and Chassis Control.
//!
//! Get Chassis Status (IPMI 28.2) response layout:
//!
//! ```text
//! Byte 0  current power state
//!   [7]    reserved
//!   [6:5]  power restore policy
//!   [4]    power control fault
//!   [3]    power fault
//!   [2]    interlock
//!   [1]    power overload
//!   [0]    power is on
//! Byte 1  last power event
//! Byte 2  misc. chassis state / identify
//! Byte 3  front panel button capabilities (optional)
//! ```

use crate::codec::{Request, Response};
use crate::error::IpmiError;
use crate::message::{CommandId, NetFn};
use crate::wire::{is_bit_set, unpack_u8};

// ── Get Chassis Status ───────────────────────────────────────────

/// Get Chassis Status request — empty body.
#[derive(Debug, Clone, Copy, Default)]
pub struct GetChassisStatusRequest;

impl Request for GetChassisStatusRequest {
    fn command(&self) -> CommandId {
        CommandId::new(NetFn::Chassis, 0x01)
    }

    fn pack(&self) -> Vec<u8> {
        Vec::new()
    }
}

/// Policy applied when AC/mains power returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PowerRestorePolicy {
    #[default]
    AlwaysOff,
    Previous,
    AlwaysOn,
    Unknown,
}

impl From<u8> for PowerRestorePolicy {
    fn from(value: u8) -> Self {
        match value & 0b11 {
            0 => Self::AlwaysOff,
            1 => Self::Previous,
            2 => Self::AlwaysOn,
            _ => Self::Unknown,
        }
    }
}

/// Chassis identify (locator LED) state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ChassisIdentifyState {
    #[default]
    Off,
    TemporaryOn,
    IndefiniteOn,
    Reserved,
}

impl From<u8> for ChassisIdentifyState {
    fn from(value: u8) -> Self {
        match value & 0b11 {
            0 => Self::Off,
            1 => Self::TemporaryOn,
            2 => Self::IndefiniteOn,
            _ => Self::Reserved,
        }
    }
}

/// Front-panel button capability and disable state, present only when
/// the BMC returns the optional fourth status byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FrontPanelButtonState {
    pub sleep_button_disable_allowed: bool,
    pub diagnostic_button_disable_allowed: bool,
    pub reset_button_disable_allowed: bool,
    pub poweroff_button_disable_allowed: bool,
    pub sleep_button_disabled: bool,
    pub diagnostic_button_disabled: bool,
    pub reset_button_disabled: bool,
    pub poweroff_button_disabled: bool,
}

/// Get Chassis Status response — 3 bytes, or 4 with the optional
/// front-panel byte.
#[derive(Debug, Clone, Default)]
pub struct GetChassisStatusResponse {
    // Current power state
    pub power_restore_policy: PowerRestorePolicy,
    pub power_control_fault: bool,
    pub power_fault: bool,
    pub interlock: bool,
    pub power_overload: bool,
    pub power_is_on: bool,

    // Last power event
    pub last_power_on_by_command: bool,
    pub last_power_down_by_power_fault: bool,
    pub last_power_down_by_interlock: bool,
    pub last_power_down_by_overload: bool,
    pub ac_failed: bool,

    // Misc. chassis state
    pub chassis_identify_supported: bool,
    pub chassis_identify_state: ChassisIdentifyState,
    pub cooling_fan_fault: bool,
    pub drive_fault: bool,
    pub front_panel_lockout_active: bool,
    pub chassis_intrusion_active: bool,

    pub front_panel: Option<FrontPanelButtonState>,
}

impl Response for GetChassisStatusResponse {
    fn unpack(&mut self, msg: &[u8]) -> Result<(), IpmiError> {
        if msg.len() < 3 {
            return Err(IpmiError::InsufficientData {
                got: msg.len(),
                need: 3,
            });
        }

        let (b0, _) = unpack_u8(msg, 0)?;
        // clear the reserved bit 7, then shift the 2-bit policy down
        self.power_restore_policy = PowerRestorePolicy::from((b0 & 0x7F) >> 5);
        self.power_control_fault = is_bit_set(b0, 4);
        self.power_fault = is_bit_set(b0, 3);
        self.interlock = is_bit_set(b0, 2);
        self.power_overload = is_bit_set(b0, 1);
        self.power_is_on = is_bit_set(b0, 0);

        let (b1, _) = unpack_u8(msg, 1)?;
        self.last_power_on_by_command = is_bit_set(b1, 4);
        self.last_power_down_by_power_fault = is_bit_set(b1, 3);
        self.last_power_down_by_interlock = is_bit_set(b1, 2);
        self.last_power_down_by_overload = is_bit_set(b1, 1);
        self.ac_failed = is_bit_set(b1, 0);

        let (b2, _) = unpack_u8(msg, 2)?;
        self.chassis_identify_supported = is_bit_set(b2, 6);
        self.chassis_identify_state = ChassisIdentifyState::from((b2 & 0x30) >> 4);
        self.cooling_fan_fault = is_bit_set(b2, 3);
        self.drive_fault = is_bit_set(b2, 2);
        self.front_panel_lockout_active = is_bit_set(b2, 1);
        self.chassis_intrusion_active = is_bit_set(b2, 0);

        if msg.len() >= 4 {
            let (b3, _) = unpack_u8(msg, 3)?;
            self.front_panel = Some(FrontPanelButtonState {
                sleep_button_disable_allowed: is_bit_set(b3, 7),
                diagnostic_button_disable_allowed: is_bit_set(b3, 6),
                reset_button_disable_allowed: is_bit_set(b3, 5),
                poweroff_button_disable_allowed: is_bit_set(b3, 4),
                sleep_button_disabled: is_bit_set(b3, 3),
                diagnostic_button_disabled: is_bit_set(b3, 2),
                reset_button_disabled: is_bit_set(b3, 1),
                poweroff_button_disabled: is_bit_set(b3, 0),
            });
        }
        Ok(())
    }
}

// ── Chassis Control ──────────────────────────────────────────────

/// Power action requested through Chassis Control (IPMI 28.3).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChassisControlAction {
    PowerDown,
    PowerUp,
    PowerCycle,
    HardReset,
    DiagnosticInterrupt,
    SoftShutdown,
}

impl ChassisControlAction {
    const fn value(self) -> u8 {
        match self {
            Self::PowerDown => 0x00,
            Self::PowerUp => 0x01,
            Self::PowerCycle => 0x02,
            Self::HardReset => 0x03,
            Self::DiagnosticInterrupt => 0x04,
            Self::SoftShutdown => 0x05,
        }
    }
}

/// Chassis Control request — a single control byte.
#[derive(Debug, Clone, Copy)]
pub struct ChassisControlRequest {
    pub action: ChassisControlAction,
}

impl Request for ChassisControlRequest {
    fn command(&self) -> CommandId {
        CommandId::new(NetFn::Chassis, 0x02)
    }

    fn pack(&self) -> Vec<u8> {
        vec![self.action.value()]
    }
}

/// Chassis Control response — empty body.
#[derive(Debug, Clone, Copy, Default)]
pub struct ChassisControlResponse;

impl Response for ChassisControlResponse {
    fn unpack(&mut self, _msg: &[u8]) -> Result<(), IpmiError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chassis_status_short_form() {
        // bits6-5 = 01 => Previous; bit0 => power on
        let mut res = GetChassisStatusResponse::default();
        res.unpack(&[0x21, 0x10, 0x40]).unwrap();

        assert_eq!(res.power_restore_policy, PowerRestorePolicy::Previous);
        assert!(res.power_is_on);
        assert!(!res.power_overload);
        assert!(res.last_power_on_by_command);
        assert!(res.chassis_identify_supported);
        assert_eq!(res.chassis_identify_state, ChassisIdentifyState::Off);
        assert!(res.front_panel.is_none());
    }

    #[test]
    fn chassis_status_with_front_panel_byte() {
        let mut res = GetChassisStatusResponse::default();
        res.unpack(&[0x41, 0x00, 0x00, 0b1010_0101]).unwrap();

        assert_eq!(res.power_restore_policy, PowerRestorePolicy::AlwaysOn);
        let fp = res.front_panel.expect("fourth byte present");
        assert!(fp.sleep_button_disable_allowed);
        assert!(!fp.diagnostic_button_disable_allowed);
        assert!(fp.reset_button_disable_allowed);
        assert!(!fp.poweroff_button_disable_allowed);
        assert!(!fp.sleep_button_disabled);
        assert!(fp.diagnostic_button_disabled);
        assert!(!fp.reset_button_disabled);
        assert!(fp.poweroff_button_disabled);
    }

    #[test]
    fn chassis_status_too_short() {
        let mut res = GetChassisStatusResponse::default();
        let err = res.unpack(&[0x21, 0x10]).unwrap_err();
        assert!(matches!(err, IpmiError::InsufficientData { got: 2, need: 3 }));
    }

    #[test]
    fn chassis_status_request_is_empty() {
        let req = GetChassisStatusRequest;
        assert!(req.pack().is_empty());
        assert_eq!(req.command(), CommandId::new(NetFn::Chassis, 0x01));
    }

    #[test]
    fn chassis_control_packs_one_byte() {
        let req = ChassisControlRequest {
            action: ChassisControlAction::PowerCycle,
        };
        assert_eq!(req.pack(), vec![0x02]);
    }
}
