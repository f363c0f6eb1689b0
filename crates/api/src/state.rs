//! Shared application state.

use std::sync::Arc;

use booking_store::BookingStore;
use domain::{AllocationEngine, AllocationPolicy, GenreCatalog, StallCatalog, UserDirectory};
use notifications::{NotificationDispatcher, Notifier, RetryPolicy};
use tokio::task::JoinHandle;

/// Services shared by every handler.
pub struct AppState<S: BookingStore> {
    pub engine: AllocationEngine<S, NotificationDispatcher>,
    pub catalog: StallCatalog<S>,
    pub genres: GenreCatalog<S>,
    pub dispatcher: NotificationDispatcher,
    pub directory: Arc<dyn UserDirectory>,
}

impl<S: BookingStore + Clone> AppState<S> {
    /// Wires the engine, catalogs and confirmation worker over one store.
    ///
    /// Returns the state together with the worker's handle. Must be called
    /// from within a tokio runtime.
    pub fn new(
        store: S,
        directory: Arc<dyn UserDirectory>,
        notifier: Arc<dyn Notifier>,
        allocation: AllocationPolicy,
        retry: RetryPolicy,
        queue_capacity: usize,
    ) -> (Self, JoinHandle<()>) {
        let (dispatcher, worker) =
            NotificationDispatcher::spawn(directory.clone(), notifier, retry, queue_capacity);
        let engine =
            AllocationEngine::with_sink(store.clone(), dispatcher.clone()).with_policy(allocation);
        let state = Self {
            engine,
            catalog: StallCatalog::new(store.clone()),
            genres: GenreCatalog::new(store),
            dispatcher,
            directory,
        };
        (state, worker)
    }
}
