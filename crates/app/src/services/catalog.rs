//! Accessory catalog: the accessory-level view over verified devices.

use hkhub_domain::accessory::Accessory;
use hkhub_domain::error::{HubError, NotFoundError};
use hkhub_domain::id::{AccessoryId, DeviceId};

use crate::capability::{CapabilityRegistry, Controller};
use crate::pairing::PairingCoordinator;
use crate::ports::AccessoryProtocol;

/// One accessory together with the device that exposes it.
#[derive(Debug, Clone, PartialEq)]
pub struct AccessoryEntry {
    pub device_id: DeviceId,
    pub accessory: Accessory,
}

/// Application service for browsing and acting on accessories.
pub struct AccessoryCatalog<P> {
    coordinator: PairingCoordinator<P>,
    registry: CapabilityRegistry<P>,
}

impl<P: AccessoryProtocol> AccessoryCatalog<P> {
    #[must_use]
    pub fn new(coordinator: PairingCoordinator<P>, registry: CapabilityRegistry<P>) -> Self {
        Self {
            coordinator,
            registry,
        }
    }

    /// Every cached accessory of every verified device, ordered by device
    /// id then accessory order.
    #[must_use]
    pub fn list_accessories(&self) -> Vec<AccessoryEntry> {
        self.coordinator
            .roster()
            .get_verified_devices()
            .into_iter()
            .flat_map(|device| {
                let device_id = device.id;
                device
                    .accessories
                    .into_iter()
                    .map(move |accessory| AccessoryEntry {
                        device_id: device_id.clone(),
                        accessory,
                    })
            })
            .collect()
    }

    /// Re-fetch the accessory list of one device.
    ///
    /// # Errors
    ///
    /// Returns [`HubError::NotFound`] for an unknown device, otherwise the
    /// protocol or timeout error of the fetch.
    pub async fn refresh(&self, device: &DeviceId) -> Result<Vec<Accessory>, HubError> {
        self.coordinator.roster().get_device(device)?;
        self.coordinator.fetch_accessories(device).await
    }

    /// # Errors
    ///
    /// Returns [`HubError::NotFound`] if the device or the accessory is
    /// unknown.
    pub fn get_accessory(&self, device: &DeviceId, aid: AccessoryId) -> Result<Accessory, HubError> {
        self.coordinator
            .roster()
            .get_device(device)?
            .accessories
            .into_iter()
            .find(|accessory| accessory.id == aid)
            .ok_or_else(|| {
                NotFoundError {
                    entity: "Accessory",
                    id: format!("{device}/{aid}"),
                }
                .into()
            })
    }

    /// One controller per service of the accessory, unsupported services
    /// degrading to a label-only controller.
    ///
    /// # Errors
    ///
    /// Returns [`HubError::NotFound`] if the device or the accessory is
    /// unknown.
    pub async fn controllers(
        &self,
        device: &DeviceId,
        aid: AccessoryId,
    ) -> Result<Vec<Controller<P>>, HubError> {
        let accessory = self.get_accessory(device, aid)?;
        Ok(self.registry.build_all(&accessory, device).await)
    }

    /// Toggle the accessory's primary service.
    ///
    /// # Errors
    ///
    /// Returns [`HubError::NotFound`] for an unknown accessory,
    /// [`HubError::Unsupported`] when there is no quick action, or the
    /// error of the write.
    #[tracing::instrument(skip(self, device), fields(device_id = %device))]
    pub async fn quick_action(&self, device: &DeviceId, aid: AccessoryId) -> Result<(), HubError> {
        let accessory = self.get_accessory(device, aid)?;
        let controller = self.registry.build_quick_action(&accessory, device).await?;
        controller.trigger_quick_action().await
    }
}
