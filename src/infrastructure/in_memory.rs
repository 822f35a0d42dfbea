use crate::domain::catalog::{BackendConfig, ProductDefinition, ProductType};
use crate::domain::ports::{
    BillingBackend, ExtensionProvider, ProcessingResult, RestoreCallback, StoreController,
    StoreExtension, StoreFamily, StoreListener,
};
use crate::domain::purchase::{
    InitializationFailureReason, PurchaseFailure, StoreProduct, SubscriptionInfo,
};
use crate::error::BackendError;
use rust_decimal::Decimal;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

#[derive(Default)]
struct StoreState {
    seeded: Vec<StoreProduct>,
    products: Vec<StoreProduct>,
    listener: Option<Arc<dyn StoreListener>>,
    initialize_calls: usize,
    initiated: Vec<String>,
    confirmed: Vec<String>,
    finished: Vec<String>,
    pending_restore: Option<RestoreCallback>,
    restore_requests: usize,
    subscriptions: HashMap<String, SubscriptionInfo>,
    missing_extensions: HashSet<StoreFamily>,
}

/// An in-memory billing backend whose callbacks are driven by hand.
///
/// Nothing happens on its own: tests and the CLI decide when initialization
/// completes, which purchases are approved or declined and how restores end.
/// Every call the orchestrator makes is recorded for inspection.
///
/// Products named in the backend configuration but never seeded are created
/// on initialization at 0.99 USD.
#[derive(Default, Clone)]
pub struct InMemoryStore {
    state: Arc<Mutex<StoreState>>,
}

fn lock(state: &Mutex<StoreState>) -> MutexGuard<'_, StoreState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Stand-in for a product the store was never configured with.
fn unlisted_product(product_id: &str) -> StoreProduct {
    default_product(&ProductDefinition {
        id: product_id.to_string(),
        product_type: ProductType::Consumable,
        store_specific_id: None,
    })
}

fn default_product(definition: &ProductDefinition) -> StoreProduct {
    let mut product = StoreProduct::new(
        definition.id.clone(),
        definition.product_type,
        Decimal::new(99, 2),
        "USD",
    );
    product.store_specific_id = definition.store_specific_id.clone();
    product
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds a product the store will expose once initialized.
    pub fn with_product(self, product: StoreProduct) -> Self {
        lock(&self.state).seeded.push(product);
        self
    }

    pub fn with_subscription(self, info: SubscriptionInfo) -> Self {
        lock(&self.state)
            .subscriptions
            .insert(info.product_id.clone(), info);
        self
    }

    /// Makes the extension for `store` unavailable.
    pub fn without_extension(self, store: StoreFamily) -> Self {
        lock(&self.state).missing_extensions.insert(store);
        self
    }

    fn listener(&self) -> Option<Arc<dyn StoreListener>> {
        lock(&self.state).listener.clone()
    }

    /// Reports successful initialization. Returns false if `initialize` was never called.
    pub fn complete_initialization(&self) -> bool {
        let Some(listener) = self.listener() else {
            return false;
        };
        let controller = InMemoryController {
            state: self.state.clone(),
        };
        let extensions = InMemoryExtensions {
            state: self.state.clone(),
        };
        listener.on_initialized(Box::new(controller), Arc::new(extensions));
        true
    }

    pub fn fail_initialization(
        &self,
        reason: InitializationFailureReason,
        message: Option<String>,
    ) -> bool {
        let Some(listener) = self.listener() else {
            return false;
        };
        listener.on_initialize_failed(reason, message);
        true
    }

    /// Completes a transaction for `product_id`, whether or not anyone asked for it.
    ///
    /// If the listener answers [`ProcessingResult::Complete`] the store
    /// finishes the transaction itself, as a real storefront would.
    pub fn approve(
        &self,
        product_id: &str,
        transaction_id: &str,
        receipt: &str,
    ) -> Option<ProcessingResult> {
        let (listener, product) = {
            let mut state = lock(&self.state);
            let listener = state.listener.clone()?;
            let product = match state.products.iter_mut().find(|p| p.id == product_id) {
                Some(product) => {
                    product.transaction_id = Some(transaction_id.to_string());
                    product.receipt = Some(receipt.to_string());
                    product.clone()
                }
                None => {
                    let mut product = unlisted_product(product_id);
                    product.transaction_id = Some(transaction_id.to_string());
                    product.receipt = Some(receipt.to_string());
                    product
                }
            };
            (listener, product)
        };
        let result = listener.process_purchase(&product);
        if result == ProcessingResult::Complete {
            lock(&self.state).finished.push(product.id);
        }
        Some(result)
    }

    pub fn decline(&self, product_id: &str, failure: PurchaseFailure) -> bool {
        let (listener, product) = {
            let state = lock(&self.state);
            let Some(listener) = state.listener.clone() else {
                return false;
            };
            let product = state
                .products
                .iter()
                .find(|p| p.id == product_id)
                .cloned()
                .unwrap_or_else(|| unlisted_product(product_id));
            (listener, product)
        };
        listener.on_purchase_failed(&product, failure);
        true
    }

    /// Ends the outstanding restore. Returns false if none was started.
    pub fn finish_restore(&self, success: bool, message: Option<String>) -> bool {
        let callback = lock(&self.state).pending_restore.take();
        match callback {
            Some(callback) => {
                callback(success, message);
                true
            }
            None => false,
        }
    }

    pub fn set_available(&self, product_id: &str, available: bool) {
        let mut state = lock(&self.state);
        if let Some(product) = state.products.iter_mut().find(|p| p.id == product_id) {
            product.available_to_purchase = available;
        }
    }

    pub fn initialize_calls(&self) -> usize {
        lock(&self.state).initialize_calls
    }

    /// Product ids passed to `initiate_purchase`, in call order.
    pub fn initiated_purchases(&self) -> Vec<String> {
        lock(&self.state).initiated.clone()
    }

    /// Product ids passed to `confirm_pending_purchase`, in call order.
    pub fn confirmed_purchases(&self) -> Vec<String> {
        lock(&self.state).confirmed.clone()
    }

    /// Product ids whose transactions the store finished without confirmation.
    pub fn finished_purchases(&self) -> Vec<String> {
        lock(&self.state).finished.clone()
    }

    pub fn restore_requests(&self) -> usize {
        lock(&self.state).restore_requests
    }
}

impl BillingBackend for InMemoryStore {
    fn initialize(&self, config: BackendConfig, listener: Box<dyn StoreListener>) {
        let mut state = lock(&self.state);
        state.initialize_calls += 1;
        let products: Vec<StoreProduct> = config
            .products
            .iter()
            .map(|definition| {
                state
                    .seeded
                    .iter()
                    .find(|p| p.id == definition.id)
                    .cloned()
                    .unwrap_or_else(|| default_product(definition))
            })
            .collect();
        state.products = products;
        state.listener = Some(Arc::from(listener));
        tracing::debug!(products = state.products.len(), "In-memory store initializing");
    }
}

struct InMemoryController {
    state: Arc<Mutex<StoreState>>,
}

impl StoreController for InMemoryController {
    fn products(&self) -> Vec<StoreProduct> {
        lock(&self.state).products.clone()
    }

    fn initiate_purchase(&self, product_id: &str) {
        lock(&self.state).initiated.push(product_id.to_string());
    }

    fn confirm_pending_purchase(&self, product_id: &str) {
        lock(&self.state).confirmed.push(product_id.to_string());
    }

    fn subscription_info(&self, product: &StoreProduct) -> Result<SubscriptionInfo, BackendError> {
        if !product.has_receipt() {
            return Err(BackendError::NoReceipt(product.id.clone()));
        }
        lock(&self.state)
            .subscriptions
            .get(&product.id)
            .cloned()
            .ok_or_else(|| BackendError::InvalidReceipt(product.id.clone()))
    }
}

struct InMemoryExtensions {
    state: Arc<Mutex<StoreState>>,
}

impl ExtensionProvider for InMemoryExtensions {
    fn extension(&self, store: StoreFamily) -> Option<Arc<dyn StoreExtension>> {
        if lock(&self.state).missing_extensions.contains(&store) {
            return None;
        }
        Some(Arc::new(InMemoryRestoreExtension {
            state: self.state.clone(),
        }))
    }
}

struct InMemoryRestoreExtension {
    state: Arc<Mutex<StoreState>>,
}

impl StoreExtension for InMemoryRestoreExtension {
    fn restore_transactions(&self, callback: RestoreCallback) {
        let mut state = lock(&self.state);
        state.restore_requests += 1;
        state.pending_restore = Some(callback);
    }
}
