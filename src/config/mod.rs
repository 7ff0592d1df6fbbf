//! Configuration for pod access control.

mod settings;

pub use settings::*;
