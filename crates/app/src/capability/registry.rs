//! Service-type dispatch to concrete controllers.

use std::sync::Arc;

use hkhub_domain::accessory::{Accessory, Service, ServiceType};
use hkhub_domain::error::{HubError, UnsupportedError};
use hkhub_domain::id::DeviceId;

use super::context::ControllerContext;
use super::{
    AccessoryInfoController, Controller, GenericController, LightBulbController,
    SwitchController, ThermostatController,
};
use crate::ports::AccessoryProtocol;
use crate::value_bus::ValueChangeBus;

/// Builds controllers that share one protocol and one value bus.
pub struct CapabilityRegistry<P> {
    protocol: Arc<P>,
    bus: Arc<ValueChangeBus>,
}

impl<P> Clone for CapabilityRegistry<P> {
    fn clone(&self) -> Self {
        Self {
            protocol: Arc::clone(&self.protocol),
            bus: Arc::clone(&self.bus),
        }
    }
}

impl<P: AccessoryProtocol> CapabilityRegistry<P> {
    #[must_use]
    pub fn new(protocol: Arc<P>, bus: Arc<ValueChangeBus>) -> Self {
        Self { protocol, bus }
    }

    #[must_use]
    pub fn bus(&self) -> &Arc<ValueChangeBus> {
        &self.bus
    }

    /// Build the controller matching `service.service_type`.
    ///
    /// Initial state is read from the device, falling back to the values
    /// cached in the service description.
    ///
    /// # Errors
    ///
    /// [`UnsupportedError::ServiceType`] for service types without a
    /// controller, [`UnsupportedError::MissingCharacteristic`] when a
    /// required characteristic is absent.
    #[tracing::instrument(
        skip_all,
        fields(device_id = %device, aid = %accessory.id, service = %service.service_type)
    )]
    pub async fn build_controller(
        &self,
        accessory: &Accessory,
        device: &DeviceId,
        service: &Service,
    ) -> Result<Controller<P>, HubError> {
        let label = label_for(accessory);
        let ctx = ControllerContext {
            protocol: Arc::clone(&self.protocol),
            bus: Arc::clone(&self.bus),
            device_id: device.clone(),
            aid: accessory.id,
            service: service.clone(),
        };
        let controller = match &service.service_type {
            ServiceType::Switch | ServiceType::Outlet => {
                Controller::Switch(SwitchController::build(ctx, label).await?)
            }
            ServiceType::LightBulb => {
                Controller::LightBulb(LightBulbController::build(ctx, label).await?)
            }
            ServiceType::Thermostat => {
                Controller::Thermostat(ThermostatController::build(ctx, label).await?)
            }
            ServiceType::AccessoryInformation => {
                Controller::AccessoryInfo(AccessoryInfoController::build(ctx, label).await)
            }
            other => return Err(UnsupportedError::ServiceType(other.clone()).into()),
        };
        Ok(controller)
    }

    /// Like [`Self::build_controller`], degrading to a label-only
    /// [`GenericController`] instead of failing.
    pub async fn build_or_fallback(
        &self,
        accessory: &Accessory,
        device: &DeviceId,
        service: &Service,
    ) -> Controller<P> {
        match self.build_controller(accessory, device, service).await {
            Ok(controller) => controller,
            Err(err) => {
                tracing::debug!(
                    device_id = %device,
                    aid = %accessory.id,
                    service = %service.service_type,
                    error = %err,
                    "falling back to generic controller"
                );
                Controller::Generic(GenericController::new(
                    label_for(accessory),
                    service.service_type.clone(),
                ))
            }
        }
    }

    /// One controller per service, in stored order.
    pub async fn build_all(&self, accessory: &Accessory, device: &DeviceId) -> Vec<Controller<P>> {
        let mut controllers = Vec::with_capacity(accessory.services.len());
        for service in &accessory.services {
            controllers.push(self.build_or_fallback(accessory, device, service).await);
        }
        controllers
    }

    /// Controller for the accessory's primary service, if it has a quick
    /// action.
    ///
    /// # Errors
    ///
    /// [`UnsupportedError::NoPrimaryService`] when the accessory only
    /// carries accessory-information, [`UnsupportedError::QuickAction`]
    /// when the primary service has no quick action, or any error from
    /// [`Self::build_controller`].
    pub async fn build_quick_action(
        &self,
        accessory: &Accessory,
        device: &DeviceId,
    ) -> Result<Controller<P>, HubError> {
        let service = accessory
            .primary_service()
            .ok_or(UnsupportedError::NoPrimaryService)?;
        let controller = self.build_controller(accessory, device, service).await?;
        if controller.quick_action_supported() {
            Ok(controller)
        } else {
            Err(UnsupportedError::QuickAction(service.service_type.clone()).into())
        }
    }
}

fn label_for(accessory: &Accessory) -> String {
    accessory
        .name()
        .map_or_else(|| format!("Accessory {}", accessory.id), ToString::to_string)
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::Ordering;
    use std::time::Duration;

    use hkhub_domain::accessory::{Characteristic, CharacteristicType};
    use hkhub_domain::error::ValidationError;
    use hkhub_domain::id::{AccessoryId, InstanceId};
    use hkhub_domain::topic::Topic;
    use hkhub_domain::value::CharacteristicValue;

    use super::*;
    use crate::capability::{HeatingCoolingMode, Subscribable, TemperatureUnit};
    use crate::testing::{
        FakeProtocol, info_service, light_accessory, switch_accessory, thermostat_accessory,
    };

    fn registry(accessory: &Accessory) -> (CapabilityRegistry<FakeProtocol>, Arc<FakeProtocol>) {
        let protocol = Arc::new(FakeProtocol::with_accessories(vec![accessory.clone()]));
        let registry = CapabilityRegistry::new(Arc::clone(&protocol), Arc::new(ValueChangeBus::new()));
        (registry, protocol)
    }

    fn dev() -> DeviceId {
        DeviceId::from("AA:BB:CC:DD:EE:FF")
    }

    async fn build(
        registry: &CapabilityRegistry<FakeProtocol>,
        accessory: &Accessory,
        service_type: &ServiceType,
    ) -> Controller<FakeProtocol> {
        let service = accessory.service(service_type).unwrap();
        registry
            .build_controller(accessory, &dev(), service)
            .await
            .unwrap()
    }

    async fn switch(
        registry: &CapabilityRegistry<FakeProtocol>,
        accessory: &Accessory,
    ) -> SwitchController<FakeProtocol> {
        match build(registry, accessory, &ServiceType::Switch).await {
            Controller::Switch(inner) => inner,
            _ => panic!("expected a switch controller"),
        }
    }

    #[tokio::test]
    async fn should_dispatch_by_service_type() {
        let accessory = thermostat_accessory(1);
        let (registry, _) = registry(&accessory);

        let controllers = registry.build_all(&accessory, &dev()).await;

        assert!(matches!(controllers[0], Controller::AccessoryInfo(_)));
        assert!(matches!(controllers[1], Controller::Thermostat(_)));
        assert_eq!(controllers[1].label(), "Hallway");
    }

    #[tokio::test]
    async fn should_fail_with_unsupported_for_unknown_service_type() {
        let accessory = Accessory::new(1).with_service(Service::new(
            10,
            ServiceType::from_code("0000FFFF-0000-1000-8000-0026BB765291"),
        ));
        let (registry, _) = registry(&accessory);

        let err = registry
            .build_controller(&accessory, &dev(), &accessory.services[0])
            .await
            .err()
            .unwrap();
        assert!(matches!(
            err,
            HubError::Unsupported(UnsupportedError::ServiceType(_))
        ));

        let fallback = registry
            .build_or_fallback(&accessory, &dev(), &accessory.services[0])
            .await;
        assert!(matches!(fallback, Controller::Generic(_)));
        assert_eq!(fallback.label(), "Accessory 1");
    }

    #[tokio::test]
    async fn should_fall_back_when_required_characteristic_is_missing() {
        let accessory = Accessory::new(1).with_service(
            Service::new(10, ServiceType::Thermostat).with_characteristic(Characteristic::new(
                11,
                CharacteristicType::CurrentTemperature,
                20.0,
            )),
        );
        let (registry, _) = registry(&accessory);

        let err = registry
            .build_controller(&accessory, &dev(), &accessory.services[0])
            .await
            .err()
            .unwrap();
        assert!(matches!(
            err,
            HubError::Unsupported(UnsupportedError::MissingCharacteristic { .. })
        ));
        assert!(matches!(
            registry
                .build_or_fallback(&accessory, &dev(), &accessory.services[0])
                .await,
            Controller::Generic(_)
        ));
    }

    #[tokio::test]
    async fn should_coerce_numeric_on_value_to_bool() {
        let accessory = light_accessory(1);
        let (registry, _) = registry(&accessory);

        let Controller::LightBulb(light) = build(&registry, &accessory, &ServiceType::LightBulb).await
        else {
            panic!("expected a light bulb controller");
        };

        let state = light.state();
        assert!(state.on);
        assert_eq!(state.brightness, Some(40.0));
        assert_eq!(state.hue, None);
    }

    #[tokio::test]
    async fn should_use_cached_values_when_reads_fail() {
        let accessory = thermostat_accessory(1);
        let (registry, protocol) = registry(&accessory);
        protocol.set(1, 14, CharacteristicValue::Float(25.0));
        protocol.fail_reads.store(true, Ordering::SeqCst);

        let Controller::Thermostat(thermostat) =
            build(&registry, &accessory, &ServiceType::Thermostat).await
        else {
            panic!("expected a thermostat controller");
        };

        let state = thermostat.state();
        assert_eq!(state.target_temperature, 21.0);
        assert_eq!(state.current_mode, HeatingCoolingMode::Heat);
        assert_eq!(state.target_mode, HeatingCoolingMode::Auto);
        assert_eq!(state.units, TemperatureUnit::Celsius);
        assert_eq!(state.current_humidity, Some(45.0));
        assert_eq!(state.cooling_threshold, None);
    }

    #[tokio::test]
    async fn should_pick_first_primary_service_for_quick_action() {
        let accessory = Accessory::new(1)
            .with_service(info_service("Combo"))
            .with_service(
                Service::new(10, ServiceType::Switch)
                    .with_characteristic(Characteristic::new(11, CharacteristicType::On, false)),
            )
            .with_service(
                Service::new(20, ServiceType::LightBulb)
                    .primary(true)
                    .with_characteristic(Characteristic::new(21, CharacteristicType::On, false)),
            );
        let (registry, protocol) = registry(&accessory);

        let controller = registry.build_quick_action(&accessory, &dev()).await.unwrap();
        controller.trigger_quick_action().await.unwrap();

        assert!(matches!(controller, Controller::LightBulb(_)));
        assert_eq!(
            protocol.writes(),
            vec![(
                (AccessoryId(1), InstanceId(21)),
                CharacteristicValue::Bool(true)
            )]
        );
    }

    #[tokio::test]
    async fn should_report_no_primary_for_info_only_accessory() {
        let accessory = Accessory::new(1).with_service(info_service("Bridge"));
        let (registry, _) = registry(&accessory);

        let err = registry
            .build_quick_action(&accessory, &dev())
            .await
            .err()
            .unwrap();
        assert!(matches!(
            err,
            HubError::Unsupported(UnsupportedError::NoPrimaryService)
        ));
    }

    #[tokio::test]
    async fn should_reject_quick_action_for_thermostat() {
        let accessory = thermostat_accessory(1);
        let (registry, _) = registry(&accessory);

        let err = registry
            .build_quick_action(&accessory, &dev())
            .await
            .err()
            .unwrap();
        assert!(matches!(
            err,
            HubError::Unsupported(UnsupportedError::QuickAction(ServiceType::Thermostat))
        ));

        let thermostat = build(&registry, &accessory, &ServiceType::Thermostat).await;
        assert!(!thermostat.quick_action_supported());
        assert!(thermostat.trigger_quick_action().await.is_err());
    }

    #[tokio::test]
    async fn should_converge_other_controller_after_local_write() {
        let accessory = switch_accessory(1);
        let (registry, _) = registry(&accessory);
        let writer = switch(&registry, &accessory).await;
        let mut observer = switch(&registry, &accessory).await;
        observer.subscribe_to_events().await.unwrap();
        let mut watch = observer.watch();

        writer.set_on(true).await.unwrap();

        tokio::time::timeout(Duration::from_secs(1), watch.wait_for(|s| s.on))
            .await
            .unwrap()
            .unwrap();
        assert!(writer.state().on);
    }

    #[tokio::test]
    async fn should_keep_state_and_skip_broadcast_when_write_fails() {
        let accessory = switch_accessory(1);
        let (registry, protocol) = registry(&accessory);
        let writer = switch(&registry, &accessory).await;
        let topic = Topic::new(dev(), AccessoryId(1), InstanceId(11));
        let mut spy = registry.bus().subscribe(&topic);
        protocol.fail_writes.store(true, Ordering::SeqCst);

        let err = writer.set_on(true).await.unwrap_err();

        assert!(matches!(err, HubError::Protocol(_)));
        assert!(!writer.state().on);
        assert!(spy.try_recv().is_none());
    }

    #[tokio::test]
    async fn should_apply_remote_notifications() {
        let accessory = thermostat_accessory(1);
        let (registry, protocol) = registry(&accessory);
        let Controller::Thermostat(mut thermostat) =
            build(&registry, &accessory, &ServiceType::Thermostat).await
        else {
            panic!("expected a thermostat controller");
        };
        thermostat.subscribe_to_events().await.unwrap();
        let mut watch = thermostat.watch();

        protocol.notify(1, 13, CharacteristicValue::Int(23));
        protocol.notify(1, 16, CharacteristicValue::Float(52.5));

        tokio::time::timeout(
            Duration::from_secs(1),
            watch.wait_for(|s| s.current_temperature == 23.0 && s.current_humidity == Some(52.5)),
        )
        .await
        .unwrap()
        .unwrap();
    }

    #[tokio::test]
    async fn should_validate_target_temperature_before_writing() {
        let accessory = thermostat_accessory(1);
        let (registry, protocol) = registry(&accessory);
        let Controller::Thermostat(thermostat) =
            build(&registry, &accessory, &ServiceType::Thermostat).await
        else {
            panic!("expected a thermostat controller");
        };

        let err = thermostat.set_target_temperature(42.0).await.unwrap_err();
        assert!(matches!(
            err,
            HubError::Validation(ValidationError::OutOfRange { .. })
        ));
        assert!(protocol.writes().is_empty());

        thermostat.set_target_temperature(22.5).await.unwrap();
        thermostat.set_target_mode(HeatingCoolingMode::Cool).await.unwrap();
        let state = thermostat.state();
        assert_eq!(state.target_temperature, 22.5);
        assert_eq!(state.target_mode, HeatingCoolingMode::Cool);
    }

    #[tokio::test]
    async fn should_reject_write_to_absent_optional_characteristic() {
        let accessory = light_accessory(1);
        let (registry, _) = registry(&accessory);
        let Controller::LightBulb(light) = build(&registry, &accessory, &ServiceType::LightBulb).await
        else {
            panic!("expected a light bulb controller");
        };

        assert!(matches!(
            light.set_hue(120.0).await.unwrap_err(),
            HubError::Unsupported(UnsupportedError::MissingCharacteristic { .. })
        ));
        light.set_brightness(75.4).await.unwrap();
        assert_eq!(light.state().brightness, Some(75.0));
    }

    #[tokio::test]
    async fn should_release_every_registration_on_unsubscribe() {
        let accessory = light_accessory(1);
        let (registry, protocol) = registry(&accessory);
        let mut light = build(&registry, &accessory, &ServiceType::LightBulb).await;

        light.subscribe_to_events().await.unwrap();
        light.subscribe_to_events().await.unwrap();
        assert!(light.is_subscribed());
        assert_eq!(protocol.listener_count(), 2);
        assert_eq!(registry.bus().topic_count(), 2);

        light.unsubscribe_from_events().await;
        light.unsubscribe_from_events().await;

        assert!(!light.is_subscribed());
        assert_eq!(protocol.listener_count(), 0);
        assert_eq!(registry.bus().topic_count(), 0);
    }

    #[tokio::test]
    async fn should_roll_back_partial_subscription() {
        let accessory = light_accessory(1);
        let (registry, protocol) = registry(&accessory);
        *protocol.fail_subscribe.lock().unwrap() = Some(InstanceId(12));
        let mut light = build(&registry, &accessory, &ServiceType::LightBulb).await;

        assert!(light.subscribe_to_events().await.is_err());

        assert!(!light.is_subscribed());
        assert_eq!(protocol.listener_count(), 0);
        assert_eq!(registry.bus().topic_count(), 0);
    }

    #[tokio::test]
    async fn should_release_bus_registrations_when_dropped() {
        let accessory = switch_accessory(1);
        let (registry, protocol) = registry(&accessory);
        let mut controller = switch(&registry, &accessory).await;
        controller.subscribe_to_events().await.unwrap();
        assert_eq!(registry.bus().topic_count(), 1);
        assert_eq!(protocol.listener_count(), 1);

        drop(controller);
        // let the aborted pump release its receiver
        tokio::task::yield_now().await;

        assert_eq!(registry.bus().topic_count(), 0);
        assert_eq!(protocol.listener_count(), 0);
        protocol.notify(1, 11, CharacteristicValue::Bool(true));
        assert_eq!(protocol.registration_count(), 0);
    }

    #[tokio::test]
    async fn should_read_accessory_information() {
        let accessory = switch_accessory(1);
        let (registry, _) = registry(&accessory);

        let Controller::AccessoryInfo(info) =
            build(&registry, &accessory, &ServiceType::AccessoryInformation).await
        else {
            panic!("expected an accessory-information controller");
        };

        assert_eq!(info.info().name.as_deref(), Some("Desk Switch"));
        assert_eq!(info.info().manufacturer.as_deref(), Some("Acme"));
        assert_eq!(info.info().model, None);
    }
}
