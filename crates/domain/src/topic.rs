//! Topic: the key of one value-change stream.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::id::{AccessoryId, DeviceId, InstanceId};

/// `(device, accessory, characteristic)` identifying one value-change stream.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Topic {
    pub device_id: DeviceId,
    pub aid: AccessoryId,
    pub iid: InstanceId,
}

impl Topic {
    #[must_use]
    pub fn new(device_id: DeviceId, aid: AccessoryId, iid: InstanceId) -> Self {
        Self {
            device_id,
            aid,
            iid,
        }
    }

    /// Serialized single-string form, `value_<device>_<aid>_<iid>`.
    #[must_use]
    pub fn key(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "value_{}_{}_{}", self.device_id, self.aid, self.iid)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn should_serialize_to_single_key() {
        let topic = Topic::new(DeviceId::from("AA:BB"), AccessoryId(1), InstanceId(10));
        assert_eq!(topic.key(), "value_AA:BB_1_10");
    }

    #[test]
    fn should_differ_when_iid_differs() {
        let a = Topic::new(DeviceId::from("d"), AccessoryId(1), InstanceId(10));
        let b = Topic::new(DeviceId::from("d"), AccessoryId(1), InstanceId(11));
        assert_ne!(a.key(), b.key());
    }
}
