//! Versus sync - shared match state for two remote players.
//!
//! # Architecture
//!
//! - **Store**: [`ConditionalStore`] compare-and-swap on an integer
//!   version; [`MemoryStore`] and [`SqliteStore`] implement it
//! - **Channel**: [`PushChannel`] full-row change events per match;
//!   [`LocalHub`] turns any store into a store plus channel
//! - **Monitor**: [`ChannelMonitor`] connection status state machine
//! - **Engine**: [`SyncEngine`] optimistic moves, conflict re-fetch and
//!   push reconciliation, observed through [`MatchView`]
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use versus_sync::{LocalHub, MemoryStore, SyncContext, SyncEngine, SyncOptions};
//! use versus_tictactoe::Mark;
//!
//! # async fn example() -> Result<(), versus_sync::SyncError> {
//! let hub = Arc::new(LocalHub::new(MemoryStore::new()));
//! let alice = SyncEngine::new(SyncContext::from_hub(hub.clone(), SyncOptions::default()));
//! let bob = SyncEngine::new(SyncContext::from_hub(hub, SyncOptions::default()));
//!
//! let created = alice.create_match("Alice").await?;
//! bob.join_match(created.id.clone(), "Bob").await?;
//! alice.submit_move(4, Mark::X).await?;
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![forbid(unsafe_code)]

mod channel;
mod config;
mod context;
mod db;
mod engine;
mod error;
mod monitor;
mod store;

pub use channel::{
    ChannelEvent, LocalHub, PushChannel, Subscription, SubscriptionEvents, SubscriptionLease,
};
pub use config::{ConfigError, VersusConfig};
pub use context::{SyncContext, SyncOptions};
pub use db::SqliteStore;
pub use engine::{MatchView, SyncEngine};
pub use error::{SyncError, SyncErrorKind};
pub use monitor::{ChannelMonitor, ChannelSignal, ConnectionStatus, MonitorAction, transition};
pub use store::{
    ConditionalStore, JoinOutcome, MatchPatch, MemoryStore, StoreError, UpdateOutcome,
};
