//! Tag service: labels such as rooms attached to accessories.

use hkhub_domain::error::HubError;
use hkhub_domain::id::{AccessoryId, DeviceId};
use hkhub_domain::tags::Tags;

use crate::ports::TagStore;

/// Application service for accessory tags.
pub struct TagService<S> {
    store: S,
}

impl<S: TagStore> TagService<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// # Errors
    ///
    /// Returns a storage error propagated from the store.
    pub async fn tags(&self, device: &DeviceId, aid: AccessoryId) -> Result<Tags, HubError> {
        self.store.load(device, aid).await
    }

    /// Add a tag and persist the set. Adding an existing tag does not write.
    ///
    /// # Errors
    ///
    /// Returns [`HubError::Validation`] for a blank tag, or a storage error.
    #[tracing::instrument(skip(self, device), fields(device_id = %device))]
    pub async fn add_tag(
        &self,
        device: &DeviceId,
        aid: AccessoryId,
        tag: &str,
    ) -> Result<Tags, HubError> {
        let mut tags = self.store.load(device, aid).await?;
        if tags.insert(tag)? {
            self.store.save(device, aid, &tags).await?;
        }
        Ok(tags)
    }

    /// Remove a tag and persist the set. Removing a missing tag does not
    /// write.
    ///
    /// # Errors
    ///
    /// Returns a storage error propagated from the store.
    #[tracing::instrument(skip(self, device), fields(device_id = %device))]
    pub async fn remove_tag(
        &self,
        device: &DeviceId,
        aid: AccessoryId,
        tag: &str,
    ) -> Result<Tags, HubError> {
        let mut tags = self.store.load(device, aid).await?;
        if tags.remove(tag) {
            self.store.save(device, aid, &tags).await?;
        }
        Ok(tags)
    }
}
