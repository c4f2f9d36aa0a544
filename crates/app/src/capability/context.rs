//! Shared plumbing for the concrete controllers.

use std::sync::Arc;

use hkhub_domain::accessory::{Characteristic, CharacteristicType, Service, ServiceType};
use hkhub_domain::error::{HubError, UnsupportedError, ValidationError};
use hkhub_domain::id::{AccessoryId, DeviceId, InstanceId};
use hkhub_domain::topic::Topic;
use hkhub_domain::value::CharacteristicValue;

use crate::ports::AccessoryProtocol;
use crate::value_bus::ValueChangeBus;

/// Everything a controller needs to talk to one service.
pub(crate) struct ControllerContext<P> {
    pub(crate) protocol: Arc<P>,
    pub(crate) bus: Arc<ValueChangeBus>,
    pub(crate) device_id: DeviceId,
    pub(crate) aid: AccessoryId,
    pub(crate) service: Service,
}

impl<P: AccessoryProtocol> ControllerContext<P> {
    pub(crate) fn service_type(&self) -> &ServiceType {
        &self.service.service_type
    }

    pub(crate) fn topic(&self, iid: InstanceId) -> Topic {
        Topic::new(self.device_id.clone(), self.aid, iid)
    }

    /// # Errors
    ///
    /// [`UnsupportedError::MissingCharacteristic`] when the service lacks `kind`.
    pub(crate) fn required(&self, kind: CharacteristicType) -> Result<Characteristic, HubError> {
        self.optional(&kind).ok_or_else(|| self.missing(kind))
    }

    pub(crate) fn optional(&self, kind: &CharacteristicType) -> Option<Characteristic> {
        self.service.characteristic(kind).cloned()
    }

    pub(crate) fn missing(&self, kind: CharacteristicType) -> HubError {
        UnsupportedError::MissingCharacteristic {
            service: self.service.service_type.clone(),
            characteristic: kind,
        }
        .into()
    }

    /// Read the live value, falling back to the value cached in the service
    /// description when the read fails.
    pub(crate) async fn current_value(
        &self,
        characteristic: &Characteristic,
    ) -> Option<CharacteristicValue> {
        match self
            .protocol
            .get_characteristic(&self.device_id, self.aid, characteristic.iid)
            .await
        {
            Ok(value) => Some(value),
            Err(err) => {
                tracing::debug!(
                    device_id = %self.device_id,
                    aid = %self.aid,
                    iid = %characteristic.iid,
                    error = %err,
                    "read failed, using cached value"
                );
                characteristic.value.clone()
            }
        }
    }

    /// Send a value to the protocol and, once confirmed, broadcast it to
    /// every other controller watching the same characteristic.
    pub(crate) async fn write(
        &self,
        iid: InstanceId,
        value: CharacteristicValue,
    ) -> Result<(), HubError> {
        if let Err(err) = self
            .protocol
            .put_characteristic(&self.device_id, self.aid, iid, value.clone())
            .await
        {
            tracing::warn!(
                device_id = %self.device_id,
                aid = %self.aid,
                %iid,
                error = %err,
                "write rejected"
            );
            return Err(err.into());
        }
        let reached = self.bus.publish(&self.topic(iid), value);
        tracing::debug!(device_id = %self.device_id, aid = %self.aid, %iid, reached, "write confirmed");
        Ok(())
    }
}

/// # Errors
///
/// [`ValidationError::OutOfRange`] when `value` is outside `min..=max` or NaN.
pub(crate) fn check_range(value: f64, min: f64, max: f64) -> Result<f64, HubError> {
    if (min..=max).contains(&value) {
        Ok(value)
    } else {
        Err(ValidationError::OutOfRange { value, min, max }.into())
    }
}
