//! Application services: use-cases built on top of the ports.
//!
//! Each service struct accepts port trait implementations via generic parameters
//! (constructor injection), keeping this layer decoupled from concrete adapters.

pub mod catalog;
pub mod tags;

pub use catalog::{AccessoryCatalog, AccessoryEntry};
pub use tags::TagService;
