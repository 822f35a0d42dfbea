//! Boundary traits for the billing backend and restore mechanisms.
//!
//! The backend is callback based: it reports through a [`StoreListener`]
//! supplied at initialization, and hands out its controller and extension
//! handles only once initialization succeeded.

use super::catalog::{BackendConfig, Platform};
use super::purchase::{
    InitializationFailureReason, PurchaseFailure, StoreProduct, SubscriptionInfo,
};
use crate::error::BackendError;
use std::sync::Arc;

/// Callback invoked once with `(success, message)` when a restore finishes.
pub type RestoreCallback = Box<dyn FnOnce(bool, Option<String>) + Send>;

/// What the listener tells the backend after a successful purchase callback.
///
/// The orchestrator's listener always answers `Pending` and confirms on its
/// own terms. Backends must still honor `Complete` from other listeners.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum ProcessingResult {
    /// The transaction stays open until confirmed.
    Pending,
    /// The backend finishes the transaction itself, no confirmation follows.
    Complete,
}

/// The storefront billing service.
pub trait BillingBackend: Send + Sync {
    /// Starts asynchronous initialization. Exactly one of
    /// `on_initialized` / `on_initialize_failed` is eventually called.
    fn initialize(&self, config: BackendConfig, listener: Box<dyn StoreListener>);
}

pub trait StoreListener: Send + Sync {
    fn on_initialized(&self, controller: Box<dyn StoreController>, extensions: Arc<dyn ExtensionProvider>);
    fn on_initialize_failed(&self, reason: InitializationFailureReason, message: Option<String>);
    fn process_purchase(&self, product: &StoreProduct) -> ProcessingResult;
    fn on_purchase_failed(&self, product: &StoreProduct, failure: PurchaseFailure);
}

/// Live handle to an initialized backend.
pub trait StoreController: Send + Sync {
    fn products(&self) -> Vec<StoreProduct>;

    fn product(&self, product_id: &str) -> Option<StoreProduct> {
        self.products().into_iter().find(|p| p.id == product_id)
    }

    fn initiate_purchase(&self, product_id: &str);

    fn confirm_pending_purchase(&self, product_id: &str);

    fn subscription_info(&self, product: &StoreProduct) -> Result<SubscriptionInfo, BackendError>;
}

#[derive(Debug, PartialEq, Eq, Hash, Clone, Copy)]
pub enum StoreFamily {
    AppleAppStore,
    GooglePlay,
}

/// Store-specific functionality beyond the common controller surface.
pub trait StoreExtension: Send + Sync {
    fn restore_transactions(&self, callback: RestoreCallback);
}

pub trait ExtensionProvider: Send + Sync {
    fn extension(&self, store: StoreFamily) -> Option<Arc<dyn StoreExtension>>;
}

/// A platform-specific way to restore earlier purchases.
pub trait RestoreStrategy: Send + Sync {
    fn name(&self) -> &'static str;

    fn is_available(&self, platform: Platform) -> bool;

    fn restore(&self, extensions: &dyn ExtensionProvider, callback: RestoreCallback);
}
