//! Live, filtered views of cluster resource state for many remote subscribers.
//!
//! A subscriber opens a link to a resource domain (for example
//! `v1/addresses`) with an optional label/annotation filter. Links that share
//! a domain and filter share one observer of the backing [`store`], and every
//! distinct snapshot is fanned out to all of them.

mod config;
mod errors;

pub mod client;
pub mod metrics;
pub mod network;
pub mod plugin;
pub mod proto;
pub mod service;
pub mod store;
pub mod subscription;

pub use client::*;
pub use config::*;
pub use errors::*;
pub use service::*;

//-----------------------------------------------------------
// Test utils

#[cfg(test)]
pub mod test_utils;
//-----------------------------------------------------------
// Autometrics
/// autometrics: https://docs.autometrics.dev/rust/adding-alerts-and-slos
use autometrics::objectives::Objective;
use autometrics::objectives::ObjectiveLatency;
use autometrics::objectives::ObjectivePercentile;
const API_SLO: Objective = Objective::new("api")
    .success_rate(ObjectivePercentile::P99_9)
    .latency(ObjectiveLatency::Ms10, ObjectivePercentile::P99);
