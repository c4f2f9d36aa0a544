//! On/off controller for switches and outlets.

use std::sync::Arc;

use hkhub_domain::accessory::{CharacteristicType, ServiceType};
use hkhub_domain::error::HubError;
use hkhub_domain::id::InstanceId;
use hkhub_domain::value::CharacteristicValue;
use tokio::sync::watch;

use super::context::ControllerContext;
use super::pump::{EventWiring, assign, bind};
use super::{QuickAction, Subscribable};
use crate::ports::AccessoryProtocol;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SwitchState {
    pub on: bool,
}

pub struct SwitchController<P> {
    ctx: ControllerContext<P>,
    label: String,
    on: InstanceId,
    state: Arc<watch::Sender<SwitchState>>,
    wiring: EventWiring,
}

impl<P: AccessoryProtocol> SwitchController<P> {
    pub(crate) async fn build(ctx: ControllerContext<P>, label: String) -> Result<Self, HubError> {
        let on = ctx.required(CharacteristicType::On)?;
        let initial = ctx
            .current_value(&on)
            .await
            .and_then(|value| value.coerce_bool())
            .unwrap_or(false);
        let (state, _) = watch::channel(SwitchState { on: initial });
        Ok(Self {
            ctx,
            label,
            on: on.iid,
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
    pub fn state(&self) -> SwitchState {
        self.state.borrow().clone()
    }

    #[must_use]
    pub fn watch(&self) -> watch::Receiver<SwitchState> {
        self.state.subscribe()
    }

    /// # Errors
    ///
    /// Returns the protocol error if the write is rejected; the state is
    /// left untouched in that case.
    pub async fn set_on(&self, on: bool) -> Result<(), HubError> {
        self.ctx.write(self.on, CharacteristicValue::Bool(on)).await?;
        assign(&self.state, |s| &mut s.on, on);
        Ok(())
    }
}

impl<P: AccessoryProtocol> Subscribable for SwitchController<P> {
    async fn subscribe_to_events(&mut self) -> Result<(), HubError> {
        let bindings = vec![bind(
            self.on,
            &self.state,
            CharacteristicValue::coerce_bool,
            |s| &mut s.on,
        )];
        self.wiring.start(&self.ctx, bindings).await
    }

    async fn unsubscribe_from_events(&mut self) {
        self.wiring.stop(&self.ctx).await;
    }

    fn is_subscribed(&self) -> bool {
        self.wiring.is_active()
    }
}

impl<P: AccessoryProtocol> QuickAction for SwitchController<P> {
    async fn trigger_quick_action(&self) -> Result<(), HubError> {
        let on = self.state().on;
        self.set_on(!on).await
    }
}
