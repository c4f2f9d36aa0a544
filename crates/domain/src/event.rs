//! Lifecycle events: records of device roster transitions.
//!
//! Each event carries the device snapshot taken right after the transition.
//! Streams of different kinds are not ordered relative to each other;
//! consumers re-query the roster rather than replay events.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::device::Device;
use crate::id::EventId;

/// UTC timestamp attached to lifecycle events.
pub type Timestamp = DateTime<Utc>;

/// Return the current UTC time.
#[must_use]
pub fn now() -> Timestamp {
    Utc::now()
}

/// Which transition happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleKind {
    Discovered,
    Lost,
    Paired,
    Verified,
    Closed,
    AccessoriesUpdated,
}

impl fmt::Display for LifecycleKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Discovered => "discovered",
            Self::Lost => "lost",
            Self::Paired => "paired",
            Self::Verified => "verified",
            Self::Closed => "closed",
            Self::AccessoriesUpdated => "accessories_updated",
        })
    }
}

/// An immutable record of one roster transition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LifecycleEvent {
    pub id: EventId,
    pub kind: LifecycleKind,
    pub device: Device,
    pub at: Timestamp,
}

impl LifecycleEvent {
    #[must_use]
    pub fn new(kind: LifecycleKind, device: Device) -> Self {
        Self {
            id: EventId::new(),
            kind,
            device,
            at: now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::id::DeviceId;

    #[test]
    fn should_stamp_event_with_current_time() {
        let before = Utc::now();
        let event = LifecycleEvent::new(
            LifecycleKind::Discovered,
            Device::discovered(DeviceId::from("d"), false),
        );
        assert!(event.at >= before);
        assert!(event.at <= Utc::now());
    }

    #[test]
    fn should_serialize_kind_as_snake_case() {
        let json = serde_json::to_string(&LifecycleKind::AccessoriesUpdated).unwrap();
        assert_eq!(json, "\"accessories_updated\"");
        assert_eq!(LifecycleKind::Verified.to_string(), "verified");
    }
}
