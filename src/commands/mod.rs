// ABOUTME: Command module aggregator for the slipway CLI.
// ABOUTME: Re-exports the app wiring plus site and session command handlers.

mod app;
mod deploy;
mod session;

pub use app::App;
pub use deploy::{deploy, status, stop};
pub use session::{serve, session, sweep};
