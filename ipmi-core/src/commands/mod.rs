//! The command catalog.
//!
//! Each sub-module defines the typed Request/Response pairs for one
//! command family, implementing the [`Request`] and [`Response`] codec
//! contracts. Bodies are packed by hand, byte for byte, against the
//! IPMI/DCMI tables — there is no derive or reflection layer.
//!
//! [`Request`]: crate::codec::Request
//! [`Response`]: crate::codec::Response

pub mod app;
pub mod chassis;
pub mod dcmi;
pub mod pef;
pub mod sensor;

// Re-export the most commonly used types at the catalog level.
pub use app::{
    CloseSessionRequest, CloseSessionResponse, GetBtInterfaceCapabilitiesRequest,
    GetBtInterfaceCapabilitiesResponse, GetChannelAuthCapsRequest, GetChannelAuthCapsResponse,
    GetDeviceIdRequest, GetDeviceIdResponse, GetSessionInfoRequest, GetSessionInfoResponse,
    SessionIndex, SetSessionPrivilegeLevelRequest, SetSessionPrivilegeLevelResponse,
};
pub use chassis::{
    ChassisControlAction, ChassisControlRequest, ChassisControlResponse, GetChassisStatusRequest,
    GetChassisStatusResponse,
};
pub use dcmi::{
    GetDcmiCapabilitiesRequest, GetDcmiCapabilitiesResponse, GetDcmiPowerReadingRequest,
    GetDcmiPowerReadingResponse,
};
pub use pef::{
    GetPefConfigParamRequest, GetPefConfigParamResponse, SetPefConfigParamRequest,
    SetPefConfigParamResponse,
};
pub use sensor::{
    DiscreteEventFlags, GetSensorReadingRequest, GetSensorReadingResponse, RearmEvents,
    RearmSensorEventsRequest, RearmSensorEventsResponse, ThresholdEventFlags,
};
