//! Tags: free-form labels (room, floor, …) attached to an accessory.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::error::{HubError, ValidationError};
use crate::id::{AccessoryId, DeviceId};

/// Ordered, de-duplicated set of labels for one accessory.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Tags(BTreeSet<String>);

impl Tags {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a tag; surrounding whitespace is trimmed. Returns `true` if it was new.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::EmptyTag`] for blank input.
    pub fn insert(&mut self, tag: &str) -> Result<bool, HubError> {
        let tag = tag.trim();
        if tag.is_empty() {
            return Err(ValidationError::EmptyTag.into());
        }
        Ok(self.0.insert(tag.to_string()))
    }

    pub fn remove(&mut self, tag: &str) -> bool {
        self.0.remove(tag.trim())
    }

    #[must_use]
    pub fn contains(&self, tag: &str) -> bool {
        self.0.contains(tag)
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Storage key for an accessory's tags: device id with every character
/// outside `[A-Za-z0-9_-]` replaced by `_`, then the accessory id.
#[must_use]
pub fn tag_key(device_id: &DeviceId, aid: AccessoryId) -> String {
    let sanitized: String = device_id
        .as_str()
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect();
    format!("{sanitized}_{aid}")
}
