//! Accessory protocol port: everything the core needs from the wire.
//!
//! The encrypted transport, session keys and service discovery all live
//! behind this trait. Implementations only report failures as
//! [`ProtocolError`]; deadlines are enforced by the caller.

use std::future::Future;

use hkhub_domain::accessory::Accessory;
use hkhub_domain::error::ProtocolError;
use hkhub_domain::id::{AccessoryId, DeviceId, InstanceId, SubscriptionId};
use hkhub_domain::setup_code::SetupCode;
use hkhub_domain::value::CharacteristicValue;
use tokio::sync::mpsc;

/// Presence change reported by the protocol's network browser.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DiscoveryEvent {
    /// The device was seen on the network. `paired` reflects the protocol's
    /// persisted pairing store.
    Discovered { id: DeviceId, paired: bool },
    /// The device dropped off the network.
    Lost { id: DeviceId },
}

/// Remote value notifications for one characteristic.
///
/// `id` is needed to cancel the registration with
/// [`AccessoryProtocol::unsubscribe_from_events`].
#[derive(Debug)]
pub struct Notifications {
    pub id: SubscriptionId,
    pub receiver: mpsc::UnboundedReceiver<CharacteristicValue>,
}

/// Port for the accessory protocol collaborator.
pub trait AccessoryProtocol: Send + Sync + 'static {
    /// Start browsing the network. Discovery events flow through the returned
    /// channel until the protocol shuts down.
    fn start_discovery(
        &self,
    ) -> impl Future<Output = Result<mpsc::UnboundedReceiver<DiscoveryEvent>, ProtocolError>> + Send;

    /// Exchange the setup code and persist long-term keys.
    fn pair_setup(
        &self,
        device: &DeviceId,
        code: &SetupCode,
    ) -> impl Future<Output = Result<(), ProtocolError>> + Send;

    /// Establish a session with an already paired device.
    fn pair_verify(&self, device: &DeviceId)
    -> impl Future<Output = Result<(), ProtocolError>> + Send;

    /// Forget the device's keys and tear down any session.
    fn unpair(&self, device: &DeviceId) -> impl Future<Output = Result<(), ProtocolError>> + Send;

    /// List the accessory tree exposed by a verified device.
    fn accessories(
        &self,
        device: &DeviceId,
    ) -> impl Future<Output = Result<Vec<Accessory>, ProtocolError>> + Send;

    fn get_characteristic(
        &self,
        device: &DeviceId,
        aid: AccessoryId,
        iid: InstanceId,
    ) -> impl Future<Output = Result<CharacteristicValue, ProtocolError>> + Send;

    fn put_characteristic(
        &self,
        device: &DeviceId,
        aid: AccessoryId,
        iid: InstanceId,
        value: CharacteristicValue,
    ) -> impl Future<Output = Result<(), ProtocolError>> + Send;

    /// Register for remote change notifications on one characteristic.
    fn subscribe_to_events(
        &self,
        device: &DeviceId,
        aid: AccessoryId,
        iid: InstanceId,
    ) -> impl Future<Output = Result<Notifications, ProtocolError>> + Send;

    /// Cancel a registration. Unknown ids are ignored.
    fn unsubscribe_from_events(
        &self,
        device: &DeviceId,
        aid: AccessoryId,
        iid: InstanceId,
        subscription: SubscriptionId,
    ) -> impl Future<Output = ()> + Send;
}
