// Library exports for the mailtriage crate
// This allows the binary and the integration tests to use the modules

pub mod classifier;
pub mod clock;
pub mod config;
pub mod email;
pub mod filters;
pub mod garbage;
pub mod gmail_client;
pub mod model;
pub mod orchestrator;
pub mod rate_limiter;
pub mod reply;
pub mod settings;
pub mod watermark;
