//! REST surface for the issue lifecycle engine.

pub mod config;
pub mod server;
