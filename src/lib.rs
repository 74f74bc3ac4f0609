//! Faultline - fault-injecting HTTP test origin
//!
//! A deliberately misbehaving origin server for exercising a reverse proxy's
//! timeout, half-close and error-mapping behavior. Query parameters on each
//! request tell it where to stall or hang up.

pub mod config;
pub mod http;
pub mod server;

pub use config::Config;
pub use server::{Server, ServerHandle, StopHandle, StopSignal};
