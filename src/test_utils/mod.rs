//! the test_utils folder here shares fixtures between unit tests
mod common;
mod subscriber;

pub use common::*;
pub(crate) use subscriber::*;
