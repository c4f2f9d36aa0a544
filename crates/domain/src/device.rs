//! Device: a remote endpoint found by discovery, and its pairing lifecycle.
//!
//! A [`Device`] is a plain snapshot. The roster in the app layer owns the
//! live records and is the only place that mutates them.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::accessory::Accessory;
use crate::id::DeviceId;

/// Why a device's session ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "reason", content = "detail", rename_all = "snake_case")]
pub enum CloseReason {
    /// The pairing was removed on request.
    Unpaired,
    /// Pair-setup failed; the detail is the collaborator's message.
    PairingFailed(String),
    /// Pair-verify failed; the detail is the collaborator's message.
    VerifyFailed(String),
    /// A pairing step exceeded its deadline.
    TimedOut,
}

impl CloseReason {
    /// Whether the session ended because something went wrong.
    #[must_use]
    pub fn is_failure(&self) -> bool {
        !matches!(self, Self::Unpaired)
    }
}

impl fmt::Display for CloseReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unpaired => f.write_str("unpaired"),
            Self::PairingFailed(detail) => write!(f, "pairing failed: {detail}"),
            Self::VerifyFailed(detail) => write!(f, "verification failed: {detail}"),
            Self::TimedOut => f.write_str("timed out"),
        }
    }
}

/// Pairing lifecycle position derived from a [`Device`]'s flags.
///
/// Reachability is orthogonal: any paired state may also be "lost"
/// (see [`Device::discovered`]).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceState {
    Discovered,
    PairedUnverified,
    Verifying,
    Verified,
    /// Unpaired after a failure; still eligible for a new pairing attempt.
    Closed(CloseReason),
}

/// Snapshot of one known device.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Device {
    pub id: DeviceId,
    /// Currently visible to discovery.
    pub discovered: bool,
    /// A long-term pairing exists in the persisted pairing store.
    pub paired: bool,
    /// An encrypted session is established for this process.
    pub verified: bool,
    /// A pair-verify attempt is in flight.
    pub verifying: bool,
    pub close_reason: Option<CloseReason>,
    /// Last fetched accessory list, replaced wholesale on each fetch.
    #[serde(default)]
    pub accessories: Vec<Accessory>,
}

impl Device {
    /// A freshly discovered device.
    #[must_use]
    pub fn discovered(id: DeviceId, paired: bool) -> Self {
        Self {
            id,
            discovered: true,
            paired,
            verified: false,
            verifying: false,
            close_reason: None,
            accessories: Vec::new(),
        }
    }

    #[must_use]
    pub fn state(&self) -> DeviceState {
        if self.verifying {
            return DeviceState::Verifying;
        }
        match (self.paired, self.verified, &self.close_reason) {
            (true, true, _) => DeviceState::Verified,
            (true, false, _) => DeviceState::PairedUnverified,
            (false, _, Some(reason)) if reason.is_failure() => DeviceState::Closed(reason.clone()),
            (false, _, _) => DeviceState::Discovered,
        }
    }

    /// Paired from a previous session but no session yet, nor one in flight.
    #[must_use]
    pub fn needs_verify(&self) -> bool {
        self.paired && !self.verified && !self.verifying
    }

    #[must_use]
    pub fn is_verified(&self) -> bool {
        self.paired && self.verified
    }
}
