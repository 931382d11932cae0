use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info, warn};

use crate::api::ApiError;
use crate::filter::{FilterEngine, ProductFilter};
use crate::models::Product;
use crate::store::CatalogStore;
use crate::utils::lock::MutexExt;

use super::CatalogError;

// ============================================================================
// Source, State and Events
// ============================================================================

/// Where the product list comes from.
#[async_trait]
pub trait ProductSource: Send + Sync {
    async fn fetch_products(&self) -> Result<Vec<Product>, ApiError>;
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum LoadState {
    #[default]
    Idle,
    Loading,
    Loaded,
    /// Last load failed with this user-presentable message.
    Failed(String),
}

impl LoadState {
    pub fn is_loading(&self) -> bool {
        matches!(self, LoadState::Loading)
    }
}

/// Changes a presentation layer reacts to, delivered in order on one channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CatalogEvent {
    LoadingChanged(bool),
    /// The in-memory product list was replaced; carries its new length.
    ProductsUpdated(usize),
    Error(String),
}

/// Puts the previous state back if a load is abandoned mid-flight.
struct LoadGuard<'a> {
    orchestrator: &'a CatalogOrchestrator,
    previous: Option<LoadState>,
}

impl LoadGuard<'_> {
    fn finish(mut self, next: LoadState) {
        self.previous = None;
        self.orchestrator.state.send_replace(next);
        self.orchestrator.emit(CatalogEvent::LoadingChanged(false));
    }
}

impl Drop for LoadGuard<'_> {
    fn drop(&mut self) {
        if let Some(previous) = self.previous.take() {
            warn!("Catalog load cancelled");
            self.orchestrator.state.send_replace(previous);
            self.orchestrator.emit(CatalogEvent::LoadingChanged(false));
        }
    }
}

// ============================================================================
// Orchestrator
// ============================================================================

pub struct CatalogOrchestrator {
    source: Arc<dyn ProductSource>,
    store: CatalogStore,
    engine: Mutex<FilterEngine>,
    state: watch::Sender<LoadState>,
    events: mpsc::UnboundedSender<CatalogEvent>,
}

impl CatalogOrchestrator {
    /// Build an orchestrator and the receiving end of its event channel.
    pub fn new(
        source: Arc<dyn ProductSource>,
        store: CatalogStore,
    ) -> (Self, mpsc::UnboundedReceiver<CatalogEvent>) {
        let (events, rx) = mpsc::unbounded_channel();
        let (state, _) = watch::channel(LoadState::Idle);
        let orchestrator = Self {
            source,
            store,
            engine: Mutex::new(FilterEngine::default()),
            state,
            events,
        };
        (orchestrator, rx)
    }

    pub fn store(&self) -> &CatalogStore {
        &self.store
    }

    pub fn load_state(&self) -> LoadState {
        self.state.borrow().clone()
    }

    pub fn subscribe_state(&self) -> watch::Receiver<LoadState> {
        self.state.subscribe()
    }

    /// Queue an event for the consumer. A load emits at most four, so the
    /// queue stays small even when nobody is draining it.
    fn emit(&self, event: CatalogEvent) {
        if let Err(e) = self.events.send(event) {
            error!(event = ?e.0, "Failed to send catalog event - channel closed");
        }
    }

    fn publish(&self, products: Vec<Product>) -> usize {
        let count = products.len();
        self.engine.lock_or_recover("publish").set_products(products);
        self.emit(CatalogEvent::ProductsUpdated(count));
        count
    }

    /// Fetch the remote catalog, merge it into the store and publish it.
    ///
    /// Only one load runs at a time; a second call while loading returns
    /// [`CatalogError::LoadInProgress`]. A failed fetch writes nothing.
    /// Dropping the returned future restores the state it started from.
    pub async fn trigger_load(&self) -> Result<usize, CatalogError> {
        let mut previous = None;
        let started = self.state.send_if_modified(|state| {
            if state.is_loading() {
                return false;
            }
            previous = Some(std::mem::replace(state, LoadState::Loading));
            true
        });
        if !started {
            debug!("Catalog load already in progress");
            return Err(CatalogError::LoadInProgress);
        }

        let guard = LoadGuard {
            orchestrator: self,
            previous,
        };
        self.emit(CatalogEvent::LoadingChanged(true));
        info!("Loading catalog");

        let products = match self.source.fetch_products().await {
            Ok(products) => products,
            Err(e) => {
                error!(error = %e, "Catalog fetch failed");
                let message = e.to_string();
                self.emit(CatalogEvent::Error(message.clone()));
                guard.finish(LoadState::Failed(message));
                return Err(CatalogError::Fetch(e));
            }
        };

        let batch = products.clone();
        if let Err(e) = self
            .store
            .with_blocking(move |store| store.upsert_products(&batch))
            .await
        {
            error!(error = %e, "Catalog store update failed");
            let message = e.to_string();
            self.emit(CatalogEvent::Error(message.clone()));
            guard.finish(LoadState::Failed(message));
            return Err(CatalogError::Store(e));
        }

        let count = self.publish(products);
        guard.finish(LoadState::Loaded);
        info!(count, "Catalog loaded");
        Ok(count)
    }

    /// Publish whatever the store already holds, without touching the network.
    pub async fn load_cached(&self) -> Result<usize, CatalogError> {
        let products = self.store.with_blocking(|store| store.all_products()).await?;
        debug!(count = products.len(), "Loaded cached catalog");
        Ok(self.publish(products))
    }

    // ===== Derived views =====

    pub fn search(&self, text: &str) -> Vec<Product> {
        self.engine.lock_or_recover("search").search(text).to_vec()
    }

    pub fn apply_filter(&self, filter: ProductFilter) -> Vec<Product> {
        self.engine.lock_or_recover("apply_filter").apply_filter(filter).to_vec()
    }

    pub fn clear_filter(&self) -> Vec<Product> {
        self.engine.lock_or_recover("clear_filter").clear_filter().to_vec()
    }

    pub fn visible_products(&self) -> Vec<Product> {
        self.engine.lock_or_recover("visible_products").visible().to_vec()
    }

    pub fn products(&self) -> Vec<Product> {
        self.engine.lock_or_recover("products").products().to_vec()
    }

    pub fn search_text(&self) -> String {
        self.engine.lock_or_recover("search_text").search_text().to_string()
    }

    pub fn last_filter(&self) -> Option<ProductFilter> {
        self.engine.lock_or_recover("last_filter").last_filter().cloned()
    }

    /// Favorited products from the in-memory list, in list order.
    pub fn favorited_products(&self) -> Vec<Product> {
        let products = self.products();
        self.store.favorited_subset(&products)
    }
}
