//! Adapters between the core and the outside world: file formats, display
//! formatting and user notifications.

pub mod csv;
pub mod currency;
pub mod json;
pub mod notify;
