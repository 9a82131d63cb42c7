// ABOUTME: Library root for slipway - blue-green site deploys and editing sessions.
// ABOUTME: The main binary is in main.rs.

pub mod config;
pub mod deploy;
pub mod error;
pub mod git;
pub mod output;
pub mod ports;
pub mod proxy;
pub mod runtime;
pub mod session;
pub mod store;
pub mod types;
