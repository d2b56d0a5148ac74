//! Resource observation and subscription fan-out.
//!
//! For one `(domain, SubscriptionKey)` a single [`Observer`] task watches the
//! resource store and a single [`SubscriptionManager`] task broadcasts
//! deduplicated snapshots to every subscriber sharing that key. The
//! [`ResourceDatabase`] creates these pairs lazily and hands out
//! [`SubscriptionGuard`]s that unregister the subscriber when dropped.
//!
//! ```text
//!   ResourceStore --list/watch--> Observer --full set--> Manager --payload--> Subscriber (per link)
//! ```

mod database;
mod entry;
mod key;
mod manager;
mod observer;
mod subscriber;
pub use database::*;
pub use entry::*;
pub use key::*;
pub use manager::*;
pub use observer::*;
pub use subscriber::*;

#[cfg(test)]
mod subscriber_test;
