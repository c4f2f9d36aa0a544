//! Capability dispatch: typed controllers built from service descriptions.
//!
//! [`CapabilityRegistry`] picks a controller from the service type. Every
//! controller variant declares statically which optional capabilities it
//! has: [`Subscribable`] for live updates and [`QuickAction`] for a
//! single-tap toggle.

mod accessory_info;
mod context;
mod generic;
mod light_bulb;
mod pump;
mod registry;
mod switch;
mod thermostat;

use std::future::Future;

use hkhub_domain::accessory::ServiceType;
use hkhub_domain::error::{HubError, UnsupportedError};

pub use accessory_info::{AccessoryInfoController, AccessoryInformation};
pub use generic::GenericController;
pub use light_bulb::{LightBulbController, LightBulbState};
pub use registry::CapabilityRegistry;
pub use switch::{SwitchController, SwitchState};
pub use thermostat::{
    HeatingCoolingMode, MAX_TARGET_TEMPERATURE, MIN_TARGET_TEMPERATURE, TemperatureUnit,
    ThermostatController, ThermostatState,
};

use crate::ports::AccessoryProtocol;

/// Live wiring to remote notifications and local changes.
///
/// Subscribing twice is a no-op, as is unsubscribing when not subscribed.
pub trait Subscribable {
    fn subscribe_to_events(&mut self) -> impl Future<Output = Result<(), HubError>> + Send;

    fn unsubscribe_from_events(&mut self) -> impl Future<Output = ()> + Send;

    fn is_subscribed(&self) -> bool;
}

/// Single-tap action shown in summary views.
pub trait QuickAction {
    fn trigger_quick_action(&self) -> impl Future<Output = Result<(), HubError>> + Send;
}

/// A controller for one service.
pub enum Controller<P> {
    /// Switches and outlets.
    Switch(SwitchController<P>),
    LightBulb(LightBulbController<P>),
    Thermostat(ThermostatController<P>),
    AccessoryInfo(AccessoryInfoController),
    /// Fallback display for anything else.
    Generic(GenericController),
}

impl<P: AccessoryProtocol> Controller<P> {
    #[must_use]
    pub fn label(&self) -> &str {
        match self {
            Self::Switch(inner) => inner.label(),
            Self::LightBulb(inner) => inner.label(),
            Self::Thermostat(inner) => inner.label(),
            Self::AccessoryInfo(inner) => inner.label(),
            Self::Generic(inner) => inner.label(),
        }
    }

    #[must_use]
    pub fn service_type(&self) -> &ServiceType {
        match self {
            Self::Switch(inner) => inner.service_type(),
            Self::LightBulb(inner) => inner.service_type(),
            Self::Thermostat(inner) => inner.service_type(),
            Self::AccessoryInfo(inner) => inner.service_type(),
            Self::Generic(inner) => inner.service_type(),
        }
    }

    #[must_use]
    pub fn quick_action_supported(&self) -> bool {
        matches!(self, Self::Switch(_) | Self::LightBulb(_))
    }

    /// # Errors
    ///
    /// [`UnsupportedError::QuickAction`] for variants without one, otherwise
    /// the error of the underlying write.
    pub async fn trigger_quick_action(&self) -> Result<(), HubError> {
        match self {
            Self::Switch(inner) => inner.trigger_quick_action().await,
            Self::LightBulb(inner) => inner.trigger_quick_action().await,
            _ => Err(UnsupportedError::QuickAction(self.service_type().clone()).into()),
        }
    }

    #[must_use]
    pub fn is_subscribable(&self) -> bool {
        matches!(
            self,
            Self::Switch(_) | Self::LightBulb(_) | Self::Thermostat(_)
        )
    }

    /// Wire the controller to live updates. Static variants have nothing to
    /// wire and succeed immediately.
    ///
    /// # Errors
    ///
    /// Returns the protocol error of the first registration that failed;
    /// nothing stays registered in that case.
    pub async fn subscribe_to_events(&mut self) -> Result<(), HubError> {
        match self {
            Self::Switch(inner) => inner.subscribe_to_events().await,
            Self::LightBulb(inner) => inner.subscribe_to_events().await,
            Self::Thermostat(inner) => inner.subscribe_to_events().await,
            Self::AccessoryInfo(_) | Self::Generic(_) => Ok(()),
        }
    }

    pub async fn unsubscribe_from_events(&mut self) {
        match self {
            Self::Switch(inner) => inner.unsubscribe_from_events().await,
            Self::LightBulb(inner) => inner.unsubscribe_from_events().await,
            Self::Thermostat(inner) => inner.unsubscribe_from_events().await,
            Self::AccessoryInfo(_) | Self::Generic(_) => {}
        }
    }

    #[must_use]
    pub fn is_subscribed(&self) -> bool {
        match self {
            Self::Switch(inner) => inner.is_subscribed(),
            Self::LightBulb(inner) => inner.is_subscribed(),
            Self::Thermostat(inner) => inner.is_subscribed(),
            Self::AccessoryInfo(_) | Self::Generic(_) => false,
        }
    }
}
