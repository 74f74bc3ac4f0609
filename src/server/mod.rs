//! The multiplexed event loop.

pub mod listener;
pub mod signal;

pub use listener::{Server, ServerHandle, StopHandle};
pub use signal::StopSignal;
