//! Subscriber-side client for the subscription service.

mod client;
mod config;
pub use client::*;
pub use config::*;
