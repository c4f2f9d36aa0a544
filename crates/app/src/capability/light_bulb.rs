//! Light bulb controller: on/off plus whichever of brightness, hue,
//! saturation and color temperature the service exposes.

use std::sync::Arc;

use hkhub_domain::accessory::{Characteristic, CharacteristicType, ServiceType};
use hkhub_domain::error::HubError;
use hkhub_domain::id::InstanceId;
use hkhub_domain::value::CharacteristicValue;
use tokio::sync::watch;

use super::context::{ControllerContext, check_range};
use super::pump::{Binding, EventWiring, assign, bind};
use super::{QuickAction, Subscribable};
use crate::ports::AccessoryProtocol;

/// Brightness and saturation are percentages, hue is in degrees and color
/// temperature in mireds. Absent characteristics stay `None`.
#[derive(Debug, Clone, PartialEq)]
pub struct LightBulbState {
    pub on: bool,
    pub brightness: Option<f64>,
    pub hue: Option<f64>,
    pub saturation: Option<f64>,
    pub color_temperature: Option<f64>,
}

pub struct LightBulbController<P> {
    ctx: ControllerContext<P>,
    label: String,
    on: InstanceId,
    brightness: Option<InstanceId>,
    hue: Option<InstanceId>,
    saturation: Option<InstanceId>,
    color_temperature: Option<InstanceId>,
    state: Arc<watch::Sender<LightBulbState>>,
    wiring: EventWiring,
}

impl<P: AccessoryProtocol> LightBulbController<P> {
    pub(crate) async fn build(ctx: ControllerContext<P>, label: String) -> Result<Self, HubError> {
        let on = ctx.required(CharacteristicType::On)?;
        let brightness = ctx.optional(&CharacteristicType::Brightness);
        let hue = ctx.optional(&CharacteristicType::Hue);
        let saturation = ctx.optional(&CharacteristicType::Saturation);
        let color_temperature = ctx.optional(&CharacteristicType::ColorTemperature);

        let initial = LightBulbState {
            on: ctx
                .current_value(&on)
                .await
                .and_then(|value| value.coerce_bool())
                .unwrap_or(false),
            brightness: read_number(&ctx, brightness.as_ref()).await,
            hue: read_number(&ctx, hue.as_ref()).await,
            saturation: read_number(&ctx, saturation.as_ref()).await,
            color_temperature: read_number(&ctx, color_temperature.as_ref()).await,
        };
        let (state, _) = watch::channel(initial);

        Ok(Self {
            ctx,
            label,
            on: on.iid,
            brightness: brightness.map(|c| c.iid),
            hue: hue.map(|c| c.iid),
            saturation: saturation.map(|c| c.iid),
            color_temperature: color_temperature.map(|c| c.iid),
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
    pub fn state(&self) -> LightBulbState {
        self.state.borrow().clone()
    }

    #[must_use]
    pub fn watch(&self) -> watch::Receiver<LightBulbState> {
        self.state.subscribe()
    }

    /// # Errors
    ///
    /// Returns the protocol error if the write is rejected.
    pub async fn set_on(&self, on: bool) -> Result<(), HubError> {
        self.ctx.write(self.on, CharacteristicValue::Bool(on)).await?;
        assign(&self.state, |s| &mut s.on, on);
        Ok(())
    }

    /// Brightness in percent, `0..=100`.
    ///
    /// # Errors
    ///
    /// Fails when out of range, when the bulb has no brightness, or when the
    /// write is rejected.
    pub async fn set_brightness(&self, percent: f64) -> Result<(), HubError> {
        let iid = self.supported(self.brightness, CharacteristicType::Brightness)?;
        let percent = check_range(percent, 0.0, 100.0)?.round();
        self.write_number(iid, int_value(percent), percent, |s| &mut s.brightness)
            .await
    }

    /// Hue in degrees, `0..=360`.
    ///
    /// # Errors
    ///
    /// Fails when out of range, when the bulb has no hue, or when the write
    /// is rejected.
    pub async fn set_hue(&self, degrees: f64) -> Result<(), HubError> {
        let iid = self.supported(self.hue, CharacteristicType::Hue)?;
        let degrees = check_range(degrees, 0.0, 360.0)?;
        self.write_number(iid, CharacteristicValue::Float(degrees), degrees, |s| {
            &mut s.hue
        })
        .await
    }

    /// Saturation in percent, `0..=100`.
    ///
    /// # Errors
    ///
    /// Fails when out of range, when the bulb has no saturation, or when the
    /// write is rejected.
    pub async fn set_saturation(&self, percent: f64) -> Result<(), HubError> {
        let iid = self.supported(self.saturation, CharacteristicType::Saturation)?;
        let percent = check_range(percent, 0.0, 100.0)?;
        self.write_number(iid, CharacteristicValue::Float(percent), percent, |s| {
            &mut s.saturation
        })
        .await
    }

    /// Color temperature in mireds, `140..=500`.
    ///
    /// # Errors
    ///
    /// Fails when out of range, when the bulb has no color temperature, or
    /// when the write is rejected.
    pub async fn set_color_temperature(&self, mireds: f64) -> Result<(), HubError> {
        let iid = self.supported(self.color_temperature, CharacteristicType::ColorTemperature)?;
        let mireds = check_range(mireds, 140.0, 500.0)?.round();
        self.write_number(iid, int_value(mireds), mireds, |s| &mut s.color_temperature)
            .await
    }

    fn supported(
        &self,
        iid: Option<InstanceId>,
        kind: CharacteristicType,
    ) -> Result<InstanceId, HubError> {
        iid.ok_or_else(|| self.ctx.missing(kind))
    }

    async fn write_number(
        &self,
        iid: InstanceId,
        wire: CharacteristicValue,
        value: f64,
        field: fn(&mut LightBulbState) -> &mut Option<f64>,
    ) -> Result<(), HubError> {
        self.ctx.write(iid, wire).await?;
        assign(&self.state, field, Some(value));
        Ok(())
    }
}

impl<P: AccessoryProtocol> Subscribable for LightBulbController<P> {
    async fn subscribe_to_events(&mut self) -> Result<(), HubError> {
        let mut bindings = vec![bind(
            self.on,
            &self.state,
            CharacteristicValue::coerce_bool,
            |s| &mut s.on,
        )];
        let optional: [(Option<InstanceId>, fn(&mut LightBulbState) -> &mut Option<f64>); 4] = [
            (self.brightness, |s| &mut s.brightness),
            (self.hue, |s| &mut s.hue),
            (self.saturation, |s| &mut s.saturation),
            (self.color_temperature, |s| &mut s.color_temperature),
        ];
        bindings.extend(
            optional
                .into_iter()
                .filter_map(|(iid, field)| iid.map(|iid| number_binding(iid, &self.state, field))),
        );
        self.wiring.start(&self.ctx, bindings).await
    }

    async fn unsubscribe_from_events(&mut self) {
        self.wiring.stop(&self.ctx).await;
    }

    fn is_subscribed(&self) -> bool {
        self.wiring.is_active()
    }
}

impl<P: AccessoryProtocol> QuickAction for LightBulbController<P> {
    async fn trigger_quick_action(&self) -> Result<(), HubError> {
        let on = self.state().on;
        self.set_on(!on).await
    }
}

fn number_binding(
    iid: InstanceId,
    state: &Arc<watch::Sender<LightBulbState>>,
    field: fn(&mut LightBulbState) -> &mut Option<f64>,
) -> Binding {
    bind(iid, state, |value| value.coerce_number().map(Some), field)
}

async fn read_number<P: AccessoryProtocol>(
    ctx: &ControllerContext<P>,
    characteristic: Option<&Characteristic>,
) -> Option<f64> {
    ctx.current_value(characteristic?)
        .await
        .and_then(|value| value.coerce_number())
}

// Already range-checked, so the cast is exact.
#[allow(clippy::cast_possible_truncation)]
fn int_value(value: f64) -> CharacteristicValue {
    CharacteristicValue::Int(value as i64)
}
