//! In-memory [`TagStore`] keyed by [`tag_key`].

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Mutex, PoisonError};

use hkhub_app::ports::TagStore;
use hkhub_domain::error::HubError;
use hkhub_domain::id::{AccessoryId, DeviceId};
use hkhub_domain::tags::{Tags, tag_key};

#[derive(Debug, Default)]
pub struct InMemoryTagStore {
    entries: Mutex<HashMap<String, Tags>>,
}

impl InMemoryTagStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl TagStore for InMemoryTagStore {
    fn load(
        &self,
        device: &DeviceId,
        aid: AccessoryId,
    ) -> impl Future<Output = Result<Tags, HubError>> + Send {
        let tags = self
            .entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&tag_key(device, aid))
            .cloned()
            .unwrap_or_default();
        async { Ok(tags) }
    }

    fn save(
        &self,
        device: &DeviceId,
        aid: AccessoryId,
        tags: &Tags,
    ) -> impl Future<Output = Result<(), HubError>> + Send {
        let key = tag_key(device, aid);
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        if tags.is_empty() {
            entries.remove(&key);
        } else {
            entries.insert(key, tags.clone());
        }
        async { Ok(()) }
    }
}
