//! Hierarchical stats engine: a concurrent key/value store with
//! subscription-based event streaming, modeled on Icecast's `stats.c`.
//!
//! The engine has no knowledge of sockets or HTTP; `stats-server` drains
//! [`subscriber::Subscriber`] queues onto the wire and drives
//! [`housekeeping`] on a timer.

pub mod config;
pub mod engine;
pub mod error;
pub mod event;
pub mod flags;
pub mod frame;
pub mod handle;
pub mod housekeeping;
pub mod node;
pub mod ports;
pub mod processing;
pub mod snapshot;
pub mod source;
pub mod store;
pub mod streamlist;
pub mod subscriber;

pub use config::IdentityConfig;
pub use engine::StatsEngine;
pub use error::{StatsError, StatsResult};
pub use event::Action;
pub use flags::StatFlags;
pub use handle::Handle;
pub use node::Node;
pub use ports::{
    ConnectionCounters, FallbackDirectory, ListenerDirectory, ListenerInfo, NullConnectionCounters,
    NullFallbackDirectory, NullListenerDirectory,
};
pub use snapshot::SnapshotFilter;
pub use source::Source;
pub use store::{GlobalStore, SourceStore};
pub use subscriber::{Subscriber, SubscriberId, SubscriberRegistry};
