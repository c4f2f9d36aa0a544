//! Event wiring: feeds remote notifications and local bus changes into a
//! controller's state.
//!
//! One [`EventPump`] serves one characteristic. It owns both registrations
//! and the task that drains them, so stopping the pump ends delivery.
//! Dropping it cannot await the protocol: the notification receiver goes
//! away with the aborted task, and adapters prune closed senders on their
//! next delivery.

use std::sync::Arc;

use hkhub_domain::error::HubError;
use hkhub_domain::id::{InstanceId, SubscriptionId};
use hkhub_domain::topic::Topic;
use hkhub_domain::value::CharacteristicValue;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use super::context::ControllerContext;
use crate::ports::{AccessoryProtocol, Notifications};
use crate::value_bus::ValueChangeBus;

pub(crate) type Apply = Box<dyn Fn(&CharacteristicValue) + Send + Sync + 'static>;

/// What to do with incoming values for one characteristic.
pub(crate) struct Binding {
    pub(crate) iid: InstanceId,
    pub(crate) apply: Apply,
}

/// Bind `iid` to one field of a watched state. Values that do not convert
/// are ignored.
pub(crate) fn bind<S, T>(
    iid: InstanceId,
    state: &Arc<watch::Sender<S>>,
    convert: fn(&CharacteristicValue) -> Option<T>,
    field: fn(&mut S) -> &mut T,
) -> Binding
where
    S: Send + Sync + 'static,
    T: PartialEq + Send + 'static,
{
    let state = Arc::clone(state);
    Binding {
        iid,
        apply: Box::new(move |value| {
            if let Some(converted) = convert(value) {
                assign(&state, field, converted);
            }
        }),
    }
}

/// Store `value` and notify watchers only if it actually changed.
pub(crate) fn assign<S, T: PartialEq>(
    state: &watch::Sender<S>,
    field: fn(&mut S) -> &mut T,
    value: T,
) -> bool {
    state.send_if_modified(|current| {
        let slot = field(current);
        if *slot == value {
            false
        } else {
            *slot = value;
            true
        }
    })
}

pub(crate) struct EventPump {
    bus: Arc<ValueChangeBus>,
    topic: Topic,
    bus_subscription: SubscriptionId,
    protocol_subscription: SubscriptionId,
    task: JoinHandle<()>,
}

impl EventPump {
    async fn start<P: AccessoryProtocol>(
        ctx: &ControllerContext<P>,
        binding: Binding,
    ) -> Result<Self, HubError> {
        let topic = ctx.topic(binding.iid);
        let Notifications {
            id: protocol_subscription,
            receiver: mut remote,
        } = ctx
            .protocol
            .subscribe_to_events(&ctx.device_id, ctx.aid, binding.iid)
            .await?;
        let mut local = ctx.bus.subscribe(&topic);
        let bus_subscription = local.id();
        let apply = binding.apply;

        let task = tokio::spawn(async move {
            let mut remote_open = true;
            let mut local_open = true;
            loop {
                tokio::select! {
                    value = remote.recv(), if remote_open => match value {
                        Some(value) => apply(&value),
                        None => remote_open = false,
                    },
                    change = local.recv(), if local_open => match change {
                        Some(change) => apply(&change.value),
                        None => local_open = false,
                    },
                    else => break,
                }
            }
        });
        tracing::debug!(topic = %topic, "event pump started");

        Ok(Self {
            bus: Arc::clone(&ctx.bus),
            topic,
            bus_subscription,
            protocol_subscription,
            task,
        })
    }

    async fn stop<P: AccessoryProtocol>(self, ctx: &ControllerContext<P>) {
        ctx.protocol
            .unsubscribe_from_events(
                &ctx.device_id,
                ctx.aid,
                self.topic.iid,
                self.protocol_subscription,
            )
            .await;
        tracing::debug!(topic = %self.topic, "event pump stopped");
    }
}

impl Drop for EventPump {
    fn drop(&mut self) {
        self.bus.unsubscribe(&self.topic, self.bus_subscription);
        self.task.abort();
    }
}

/// The set of pumps owned by one controller.
#[derive(Default)]
pub(crate) struct EventWiring {
    pumps: Vec<EventPump>,
}

impl EventWiring {
    pub(crate) fn is_active(&self) -> bool {
        !self.pumps.is_empty()
    }

    /// Start one pump per binding. Already active wiring is left as is.
    /// If any registration fails, the ones already made are torn down.
    pub(crate) async fn start<P: AccessoryProtocol>(
        &mut self,
        ctx: &ControllerContext<P>,
        bindings: Vec<Binding>,
    ) -> Result<(), HubError> {
        if self.is_active() {
            return Ok(());
        }
        for binding in bindings {
            match EventPump::start(ctx, binding).await {
                Ok(pump) => self.pumps.push(pump),
                Err(err) => {
                    self.stop(ctx).await;
                    return Err(err);
                }
            }
        }
        Ok(())
    }

    pub(crate) async fn stop<P: AccessoryProtocol>(&mut self, ctx: &ControllerContext<P>) {
        for pump in self.pumps.drain(..) {
            pump.stop(ctx).await;
        }
    }
}
