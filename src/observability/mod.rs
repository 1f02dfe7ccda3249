//! Logging setup for the relay.

pub mod logging;
