//! Explicitly constructed dependencies handed to each engine.

use std::sync::Arc;
use std::time::Duration;

use derive_getters::Getters;
use derive_setters::Setters;
use tracing::instrument;

use crate::{ConditionalStore, LocalHub, PushChannel};

/// Engine tuning.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Setters)]
#[setters(prefix = "with_")]
pub struct SyncOptions {
    /// Upper bound on a single store call; exceeding it is a transport error.
    pub submit_timeout: Option<Duration>,
}

/// Store and channel an engine talks to.
///
/// Cheap to clone; tests build one over fakes, applications build one per
/// process and pass it down.
#[derive(Clone, Getters)]
pub struct SyncContext {
    store: Arc<dyn ConditionalStore>,
    channel: Arc<dyn PushChannel>,
    options: SyncOptions,
}

impl SyncContext {
    /// Creates a context from separate store and channel handles.
    #[instrument(skip(store, channel))]
    pub fn new(
        store: Arc<dyn ConditionalStore>,
        channel: Arc<dyn PushChannel>,
        options: SyncOptions,
    ) -> Self {
        Self {
            store,
            channel,
            options,
        }
    }

    /// Creates a context whose store and channel are the same hub.
    #[instrument(skip(hub))]
    pub fn from_hub<S>(hub: Arc<LocalHub<S>>, options: SyncOptions) -> Self
    where
        S: ConditionalStore + 'static,
    {
        let store: Arc<dyn ConditionalStore> = hub.clone();
        let channel: Arc<dyn PushChannel> = hub;
        Self::new(store, channel, options)
    }
}

impl std::fmt::Debug for SyncContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncContext")
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}
