//! Reacts to roster lifecycle events: pairs new devices when a setup code
//! is configured, and keeps one set of subscribed controllers per verified
//! device.

use std::collections::HashMap;

use hkhub_app::capability::Controller;
use hkhub_app::pairing::PairingCoordinator;
use hkhub_app::ports::AccessoryProtocol;
use hkhub_app::services::AccessoryCatalog;
use hkhub_domain::device::{Device, DeviceState};
use hkhub_domain::event::{LifecycleEvent, LifecycleKind};
use hkhub_domain::id::DeviceId;
use hkhub_domain::setup_code::SetupCode;

pub struct Supervisor<P> {
    coordinator: PairingCoordinator<P>,
    catalog: AccessoryCatalog<P>,
    auto_pair: Option<SetupCode>,
    live: HashMap<DeviceId, Vec<Controller<P>>>,
}

impl<P: AccessoryProtocol> Supervisor<P> {
    #[must_use]
    pub fn new(
        coordinator: PairingCoordinator<P>,
        catalog: AccessoryCatalog<P>,
        auto_pair: Option<SetupCode>,
    ) -> Self {
        Self {
            coordinator,
            catalog,
            auto_pair,
            live: HashMap::new(),
        }
    }

    pub async fn handle(&mut self, event: &LifecycleEvent) {
        let device = &event.device;
        tracing::info!(device_id = %device.id, kind = %event.kind, "lifecycle event");
        match event.kind {
            LifecycleKind::Discovered => self.maybe_pair(device),
            LifecycleKind::AccessoriesUpdated => self.attach(device).await,
            LifecycleKind::Closed | LifecycleKind::Lost => self.detach(&device.id).await,
            LifecycleKind::Paired | LifecycleKind::Verified => {}
        }
    }

    /// Number of controllers currently held for `id`.
    #[cfg(test)]
    fn controller_count(&self, id: &DeviceId) -> usize {
        self.live.get(id).map_or(0, Vec::len)
    }

    /// Unsubscribe every controller.
    pub async fn shutdown(&mut self) {
        let ids: Vec<DeviceId> = self.live.keys().cloned().collect();
        for id in ids {
            self.detach(&id).await;
        }
    }

    fn maybe_pair(&self, device: &Device) {
        // a failed attempt stays closed until someone pairs by hand
        if device.state() != DeviceState::Discovered {
            return;
        }
        if let Some(code) = &self.auto_pair {
            tracing::info!(device_id = %device.id, "pairing with configured setup code");
            self.coordinator
                .request_pairing(device.id.clone(), code.clone());
        }
    }

    async fn attach(&mut self, device: &Device) {
        self.detach(&device.id).await;
        let mut controllers = Vec::new();
        for accessory in &device.accessories {
            match self.catalog.controllers(&device.id, accessory.id).await {
                Ok(built) => controllers.extend(built),
                Err(err) => {
                    tracing::warn!(device_id = %device.id, aid = %accessory.id, error = %err, "cannot build controllers");
                }
            }
        }
        for controller in controllers
            .iter_mut()
            .filter(|controller| controller.is_subscribable())
        {
            if let Err(err) = controller.subscribe_to_events().await {
                tracing::warn!(
                    device_id = %device.id,
                    label = controller.label(),
                    error = %err,
                    "cannot subscribe to events"
                );
            }
        }
        tracing::info!(device_id = %device.id, count = controllers.len(), "controllers ready");
        self.live.insert(device.id.clone(), controllers);
    }

    async fn detach(&mut self, id: &DeviceId) {
        let Some(mut controllers) = self.live.remove(id) else {
            return;
        };
        for controller in &mut controllers {
            controller.unsubscribe_from_events().await;
        }
        tracing::debug!(device_id = %id, count = controllers.len(), "controllers released");
    }
}
