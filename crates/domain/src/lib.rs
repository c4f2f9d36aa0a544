//! # hkhub-domain
//!
//! Pure domain model for the hkhub accessory controller.
//!
//! ## Responsibilities
//! - Foundational types: typed identifiers, error taxonomy, timestamps
//! - The accessory capability model (**accessories**, **services**,
//!   **characteristics**) and primary-service selection
//! - Characteristic **values** and the one place their wire representation
//!   is coerced
//! - **Device** snapshots and the pairing lifecycle they derive
//! - **Topics** keying value-change streams, **lifecycle events**, **tags**
//!
//! ## Dependency rule
//! This crate has **no internal dependencies**.
//! It must never import anything from `app`, adapters, or an async runtime.
//! All IO boundaries are expressed as traits in the `app` crate (ports).

pub mod error;
pub mod id;

pub mod accessory;
pub mod device;
pub mod event;
pub mod setup_code;
pub mod tags;
pub mod topic;
pub mod value;
