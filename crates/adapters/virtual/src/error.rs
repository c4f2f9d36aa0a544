//! Virtual adapter error types.

use hkhub_domain::error::{ProtocolError, ProtocolOperation};
use hkhub_domain::id::{AccessoryId, DeviceId, InstanceId};

/// Errors specific to the simulated accessory protocol.
#[derive(Debug, thiserror::Error)]
pub enum VirtualError {
    #[error("unknown device {0}")]
    UnknownDevice(DeviceId),

    #[error("no characteristic {aid}.{iid}")]
    UnknownCharacteristic { aid: AccessoryId, iid: InstanceId },

    #[error("device {0} is not paired")]
    NotPaired(DeviceId),

    #[error("no session with device {0}")]
    NoSession(DeviceId),

    #[error("setup code rejected")]
    SetupCodeRejected,

    #[error("verification rejected")]
    VerifyRejected,

    #[error("write rejected")]
    WriteRejected,
}

impl VirtualError {
    /// Wrap as the failure of one protocol step, for propagation across the
    /// port boundary.
    #[must_use]
    pub fn into_protocol(self, operation: ProtocolOperation) -> ProtocolError {
        ProtocolError::new(operation, self)
    }
}
