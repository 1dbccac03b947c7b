//! Canonical payment model, raw source shapes, and the ports the core talks through.

pub mod ports;
pub mod raw;
pub mod record;
pub mod resolution;
pub mod transition;
