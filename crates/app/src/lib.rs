//! # hkhub-app
//!
//! Application layer: the controller core sitting on top of the accessory
//! protocol.
//!
//! ## Responsibilities
//! - Define **port traits** that adapters must implement:
//!   - `AccessoryProtocol`: discovery, pairing, accessory listing,
//!     characteristic reads/writes and notifications
//!   - `TagStore`: per-accessory label persistence
//! - Keep the **device roster** and drive the pairing lifecycle
//!   (`DeviceRoster`, `PairingCoordinator`)
//! - Fan local value changes out to every interested controller
//!   (`ValueChangeBus`)
//! - Turn service descriptions into typed controllers
//!   (`CapabilityRegistry`)
//! - Offer accessory-level use-cases (`AccessoryCatalog`, `TagService`)
//!
//! ## Dependency rule
//! Depends on `hkhub-domain` only (plus `tokio` for channels, tasks and
//! timers). Never imports adapter crates. Adapters depend on *this* crate,
//! not the reverse.

pub mod capability;
pub mod pairing;
pub mod ports;
pub mod roster;
pub mod services;
pub mod value_bus;

#[cfg(test)]
pub(crate) mod testing;
