//! Common error types used across the workspace.
//!
//! Each layer defines its own typed errors and converts into [`HubError`]
//! via `#[from]`. Adapter errors are boxed into a [`ProtocolError`] together
//! with the operation that failed.

use std::fmt;
use std::time::Duration;

use crate::accessory::{CharacteristicType, ServiceType};

/// Top-level error for every fallible hkhub operation.
#[derive(Debug, thiserror::Error)]
pub enum HubError {
    #[error("not found")]
    NotFound(#[from] NotFoundError),

    #[error("unsupported")]
    Unsupported(#[from] UnsupportedError),

    #[error("protocol error")]
    Protocol(#[from] ProtocolError),

    #[error("operation timed out")]
    Timeout(#[from] TimeoutError),

    #[error("validation error")]
    Validation(#[from] ValidationError),

    #[error("storage error")]
    Storage(#[source] Box<dyn std::error::Error + Send + Sync>),
}

/// A lookup by id found nothing.
#[derive(Debug, thiserror::Error)]
#[error("{entity} {id} not found")]
pub struct NotFoundError {
    pub entity: &'static str,
    pub id: String,
}

/// The requested capability is not available for a service or accessory.
#[derive(Debug, thiserror::Error)]
pub enum UnsupportedError {
    #[error("no controller for service type {0}")]
    ServiceType(ServiceType),

    #[error("service {service} is missing required characteristic {characteristic}")]
    MissingCharacteristic {
        service: ServiceType,
        characteristic: CharacteristicType,
    },

    #[error("accessory has no primary service")]
    NoPrimaryService,

    #[error("service type {0} has no quick action")]
    QuickAction(ServiceType),
}

/// The step of the accessory protocol that failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProtocolOperation {
    Discovery,
    PairSetup,
    PairVerify,
    Unpair,
    ListAccessories,
    ReadCharacteristic,
    WriteCharacteristic,
    Subscribe,
}

impl fmt::Display for ProtocolOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Discovery => "discovery",
            Self::PairSetup => "pair-setup",
            Self::PairVerify => "pair-verify",
            Self::Unpair => "unpair",
            Self::ListAccessories => "list accessories",
            Self::ReadCharacteristic => "read characteristic",
            Self::WriteCharacteristic => "write characteristic",
            Self::Subscribe => "subscribe",
        })
    }
}

/// Wrapped failure reported by the accessory protocol collaborator.
#[derive(Debug, thiserror::Error)]
#[error("{operation} failed")]
pub struct ProtocolError {
    pub operation: ProtocolOperation,
    #[source]
    pub source: Box<dyn std::error::Error + Send + Sync>,
}

impl ProtocolError {
    /// Wrap any error as a failure of `operation`.
    pub fn new(
        operation: ProtocolOperation,
        source: impl Into<Box<dyn std::error::Error + Send + Sync>>,
    ) -> Self {
        Self {
            operation,
            source: source.into(),
        }
    }
}

/// A bounded protocol operation exceeded its deadline.
#[derive(Debug, thiserror::Error)]
#[error("{operation} did not complete within {after:?}")]
pub struct TimeoutError {
    pub operation: ProtocolOperation,
    pub after: Duration,
}

/// Input rejected before reaching the protocol.
#[derive(Debug, thiserror::Error)]
pub enum ValidationError {
    #[error("setup code must have the form XXX-XX-XXX")]
    InvalidSetupCode,

    #[error("value {value} is outside {min}..={max}")]
    OutOfRange { value: f64, min: f64, max: f64 },

    #[error("tag must not be empty")]
    EmptyTag,
}
