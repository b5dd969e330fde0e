//! Domain Layer
//!
//! Entities, value objects, events and the ports the replication core
//! depends on. Nothing here touches I/O.

pub mod entities;
pub mod error;
pub mod events;
pub mod ports;
pub mod services;
pub mod value_objects;
