//! Thermostat controller.
//!
//! Current/target heating-cooling state, current/target temperature and
//! display units are required. Threshold temperatures and humidity are
//! picked up when present.

use std::fmt;
use std::sync::Arc;

use hkhub_domain::accessory::{Characteristic, CharacteristicType, ServiceType};
use hkhub_domain::error::HubError;
use hkhub_domain::id::InstanceId;
use hkhub_domain::value::CharacteristicValue;
use tokio::sync::watch;

use super::Subscribable;
use super::context::{ControllerContext, check_range};
use super::pump::{Binding, EventWiring, assign, bind};
use crate::ports::AccessoryProtocol;

/// Lowest target temperature accepted on writes, in °C.
pub const MIN_TARGET_TEMPERATURE: f64 = 10.0;
/// Highest target temperature accepted on writes, in °C.
pub const MAX_TARGET_TEMPERATURE: f64 = 38.0;

/// Heating-cooling state. `Auto` only appears as a target.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum HeatingCoolingMode {
    #[default]
    Off,
    Heat,
    Cool,
    Auto,
}

impl HeatingCoolingMode {
    /// Decode the wire value `0..=3`.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn from_value(value: &CharacteristicValue) -> Option<Self> {
        match value.coerce_number()?.round() as i64 {
            0 => Some(Self::Off),
            1 => Some(Self::Heat),
            2 => Some(Self::Cool),
            3 => Some(Self::Auto),
            _ => None,
        }
    }

    #[must_use]
    pub fn code(self) -> i64 {
        match self {
            Self::Off => 0,
            Self::Heat => 1,
            Self::Cool => 2,
            Self::Auto => 3,
        }
    }
}

impl fmt::Display for HeatingCoolingMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Off => "off",
            Self::Heat => "heat",
            Self::Cool => "cool",
            Self::Auto => "auto",
        })
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum TemperatureUnit {
    #[default]
    Celsius,
    Fahrenheit,
}

impl TemperatureUnit {
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn from_value(value: &CharacteristicValue) -> Option<Self> {
        match value.coerce_number()?.round() as i64 {
            0 => Some(Self::Celsius),
            1 => Some(Self::Fahrenheit),
            _ => None,
        }
    }

    #[must_use]
    pub fn code(self) -> i64 {
        match self {
            Self::Celsius => 0,
            Self::Fahrenheit => 1,
        }
    }
}

/// Temperatures are always °C on the wire; `units` only says how the
/// accessory itself displays them.
#[derive(Debug, Clone, PartialEq)]
pub struct ThermostatState {
    pub current_mode: HeatingCoolingMode,
    pub target_mode: HeatingCoolingMode,
    pub current_temperature: f64,
    pub target_temperature: f64,
    pub units: TemperatureUnit,
    pub cooling_threshold: Option<f64>,
    pub heating_threshold: Option<f64>,
    pub current_humidity: Option<f64>,
    pub target_humidity: Option<f64>,
}

type OptionalField = fn(&mut ThermostatState) -> &mut Option<f64>;

pub struct ThermostatController<P> {
    ctx: ControllerContext<P>,
    label: String,
    current_mode: InstanceId,
    target_mode: InstanceId,
    current_temperature: InstanceId,
    target_temperature: InstanceId,
    units: InstanceId,
    optional: Vec<(InstanceId, OptionalField)>,
    state: Arc<watch::Sender<ThermostatState>>,
    wiring: EventWiring,
}

impl<P: AccessoryProtocol> ThermostatController<P> {
    pub(crate) async fn build(ctx: ControllerContext<P>, label: String) -> Result<Self, HubError> {
        let current_mode = ctx.required(CharacteristicType::CurrentHeatingCoolingState)?;
        let target_mode = ctx.required(CharacteristicType::TargetHeatingCoolingState)?;
        let current_temperature = ctx.required(CharacteristicType::CurrentTemperature)?;
        let target_temperature = ctx.required(CharacteristicType::TargetTemperature)?;
        let units = ctx.required(CharacteristicType::TemperatureDisplayUnits)?;

        let mut state = ThermostatState {
            current_mode: read(&ctx, &current_mode, HeatingCoolingMode::from_value)
                .await
                .unwrap_or_default(),
            target_mode: read(&ctx, &target_mode, HeatingCoolingMode::from_value)
                .await
                .unwrap_or_default(),
            current_temperature: read(&ctx, &current_temperature, CharacteristicValue::coerce_number)
                .await
                .unwrap_or_default(),
            target_temperature: read(&ctx, &target_temperature, CharacteristicValue::coerce_number)
                .await
                .unwrap_or(MIN_TARGET_TEMPERATURE),
            units: read(&ctx, &units, TemperatureUnit::from_value)
                .await
                .unwrap_or_default(),
            cooling_threshold: None,
            heating_threshold: None,
            current_humidity: None,
            target_humidity: None,
        };

        let candidates: [(CharacteristicType, OptionalField); 4] = [
            (CharacteristicType::CoolingThresholdTemperature, |s| {
                &mut s.cooling_threshold
            }),
            (CharacteristicType::HeatingThresholdTemperature, |s| {
                &mut s.heating_threshold
            }),
            (CharacteristicType::CurrentRelativeHumidity, |s| {
                &mut s.current_humidity
            }),
            (CharacteristicType::TargetRelativeHumidity, |s| {
                &mut s.target_humidity
            }),
        ];
        let mut optional = Vec::new();
        for (kind, field) in candidates {
            if let Some(characteristic) = ctx.optional(&kind) {
                let value = read(&ctx, &characteristic, CharacteristicValue::coerce_number).await;
                *field(&mut state) = value;
                optional.push((characteristic.iid, field));
            }
        }

        let (state, _) = watch::channel(state);
        Ok(Self {
            ctx,
            label,
            current_mode: current_mode.iid,
            target_mode: target_mode.iid,
            current_temperature: current_temperature.iid,
            target_temperature: target_temperature.iid,
            units: units.iid,
            optional,
            state: Arc::new(state),
            wiring: EventWiring::default(),
        })
    }

    #[must_use]
    pub fn label(&self) -> &str {
        &self.label
    }

    #[must_use]
    pub fn service_type(&self) -> &ServiceType {
        self.ctx.service_type()
    }

    #[must_use]
    pub fn state(&self) -> ThermostatState {
        self.state.borrow().clone()
    }

    #[must_use]
    pub fn watch(&self) -> watch::Receiver<ThermostatState> {
        self.state.subscribe()
    }

    /// # Errors
    ///
    /// Returns the protocol error if the write is rejected.
    pub async fn set_target_mode(&self, mode: HeatingCoolingMode) -> Result<(), HubError> {
        self.ctx
            .write(self.target_mode, CharacteristicValue::Int(mode.code()))
            .await?;
        assign(&self.state, |s| &mut s.target_mode, mode);
        Ok(())
    }

    /// Target temperature in °C, within
    /// [`MIN_TARGET_TEMPERATURE`]`..=`[`MAX_TARGET_TEMPERATURE`].
    ///
    /// # Errors
    ///
    /// Returns [`hkhub_domain::error::ValidationError::OutOfRange`] before
    /// touching the protocol, or the protocol error if the write is
    /// rejected.
    pub async fn set_target_temperature(&self, celsius: f64) -> Result<(), HubError> {
        let celsius = check_range(celsius, MIN_TARGET_TEMPERATURE, MAX_TARGET_TEMPERATURE)?;
        self.ctx
            .write(self.target_temperature, CharacteristicValue::Float(celsius))
            .await?;
        assign(&self.state, |s| &mut s.target_temperature, celsius);
        Ok(())
    }

    /// # Errors
    ///
    /// Returns the protocol error if the write is rejected.
    pub async fn set_units(&self, units: TemperatureUnit) -> Result<(), HubError> {
        self.ctx
            .write(self.units, CharacteristicValue::Int(units.code()))
            .await?;
        assign(&self.state, |s| &mut s.units, units);
        Ok(())
    }

    fn bindings(&self) -> Vec<Binding> {
        let mut bindings = vec![
            bind(
                self.current_mode,
                &self.state,
                HeatingCoolingMode::from_value,
                |s| &mut s.current_mode,
            ),
            bind(
                self.target_mode,
                &self.state,
                HeatingCoolingMode::from_value,
                |s| &mut s.target_mode,
            ),
            bind(
                self.current_temperature,
                &self.state,
                CharacteristicValue::coerce_number,
                |s| &mut s.current_temperature,
            ),
            bind(
                self.target_temperature,
                &self.state,
                CharacteristicValue::coerce_number,
                |s| &mut s.target_temperature,
            ),
            bind(
                self.units,
                &self.state,
                TemperatureUnit::from_value,
                |s| &mut s.units,
            ),
        ];
        for (iid, field) in &self.optional {
            bindings.push(bind(
                *iid,
                &self.state,
                |value| value.coerce_number().map(Some),
                *field,
            ));
        }
        bindings
    }
}

impl<P: AccessoryProtocol> Subscribable for ThermostatController<P> {
    async fn subscribe_to_events(&mut self) -> Result<(), HubError> {
        let bindings = self.bindings();
        self.wiring.start(&self.ctx, bindings).await
    }

    async fn unsubscribe_from_events(&mut self) {
        self.wiring.stop(&self.ctx).await;
    }

    fn is_subscribed(&self) -> bool {
        self.wiring.is_active()
    }
}

async fn read<P: AccessoryProtocol, T>(
    ctx: &ControllerContext<P>,
    characteristic: &Characteristic,
    convert: fn(&CharacteristicValue) -> Option<T>,
) -> Option<T> {
    ctx.current_value(characteristic)
        .await
        .and_then(|value| convert(&value))
}
