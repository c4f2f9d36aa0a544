//! Tag store port: persistence for per-accessory labels.

use std::future::Future;

use hkhub_domain::error::HubError;
use hkhub_domain::id::{AccessoryId, DeviceId};
use hkhub_domain::tags::Tags;

/// Keyed by [`hkhub_domain::tags::tag_key`]. Missing entries load as empty.
pub trait TagStore: Send + Sync {
    fn load(
        &self,
        device: &DeviceId,
        aid: AccessoryId,
    ) -> impl Future<Output = Result<Tags, HubError>> + Send;

    fn save(
        &self,
        device: &DeviceId,
        aid: AccessoryId,
        tags: &Tags,
    ) -> impl Future<Output = Result<(), HubError>> + Send;
}
