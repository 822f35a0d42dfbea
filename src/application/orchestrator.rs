use crate::domain::catalog::{Platform, ProductCatalog};
use crate::domain::events::{BackendEvent, ServiceEvent};
use crate::domain::ports::{ExtensionProvider, StoreController};
use crate::domain::purchase::{
    round_price, PurchaseFailure, PurchaseOutcome, PurchaseReceipt, PurchaseRequest,
    SubscriptionInfo, UntrackedPurchase,
};
use crate::error::{IapError, Result};
use crate::infrastructure::adapter::BackendAdapter;
use crate::infrastructure::restore::RestoreSelector;
use rust_decimal::Decimal;
use std::collections::{HashSet, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::Instant;

/// Failure message given to queued requests when the orchestrator is disposed.
pub const SERVICE_DISPOSED: &str = "service disposed";
/// Failure message given to an in-flight request whose deadline passed.
pub const PURCHASE_TIMED_OUT: &str = "purchase timed out";

#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Platform used to resolve store ids and pick a restore strategy.
    pub platform: Platform,
    /// Fail the in-flight purchase if the backend has not answered in time.
    pub purchase_timeout: Option<Duration>,
    /// Confirm successful transactions that match no request.
    pub acknowledge_untracked: bool,
    /// Keep the purchase slot closed this long after a restore finishes, so
    /// restored transactions the backend delivers late stay untracked.
    pub restore_grace: Option<Duration>,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            platform: Platform::current(),
            purchase_timeout: None,
            acknowledge_untracked: false,
            restore_grace: None,
        }
    }
}

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum ServiceState {
    Uninitialized,
    Initializing,
    Initialized,
    Disposed,
}

/// Backend handles, held only between initialization and disposal.
struct Session {
    controller: Box<dyn StoreController>,
    extensions: Arc<dyn ExtensionProvider>,
}

enum Lifecycle {
    Uninitialized,
    Initializing,
    Ready(Session),
    Disposed,
}

struct PendingPurchase {
    request: PurchaseRequest,
    outcome: PurchaseOutcome,
}

struct InFlight {
    purchase: PendingPurchase,
    deadline: Option<Instant>,
    /// Transaction the store already held for the product at submission.
    owned_transaction: Option<String>,
}

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
enum RestoreState {
    Idle,
    /// Requested while a purchase was in flight; starts once the slot frees.
    Deferred,
    Running,
    /// Finished, but the slot stays closed until the grace deadline.
    Settling(Instant),
}

/// Serializes purchases against the billing backend and correlates its
/// asynchronous results with the requests that caused them.
///
/// At most one transaction is outstanding at a time. Requests wait in a FIFO
/// queue and each gets exactly one terminal outcome, published on the
/// notification channel. Restores share the same slot: no purchase is
/// submitted while a restore runs, and a restore requested during a purchase
/// waits for it to finish.
///
/// Every method expects to run on a single owner; backend callbacks reach
/// the orchestrator as [`BackendEvent`]s through [`handle_backend_event`].
///
/// [`handle_backend_event`]: PurchaseOrchestrator::handle_backend_event
pub struct PurchaseOrchestrator {
    adapter: BackendAdapter,
    restore_selector: RestoreSelector,
    config: OrchestratorConfig,
    notifier: mpsc::UnboundedSender<ServiceEvent>,
    lifecycle: Lifecycle,
    catalog: ProductCatalog,
    pending: VecDeque<PendingPurchase>,
    in_flight: Option<InFlight>,
    restore: RestoreState,
    /// Transaction ids already reported, tracked or not.
    seen_transactions: HashSet<String>,
    next_request_id: u64,
}

impl PurchaseOrchestrator {
    /// Creates an orchestrator that has not started initialization yet.
    ///
    /// # Arguments
    ///
    /// * `adapter` - The billing backend, wrapped so its callbacks arrive as
    ///   [`BackendEvent`]s on the adapter's channel.
    /// * `restore_selector` - Restore strategies, tried in registration order.
    /// * `config` - Platform, timeout and untracked-purchase settings.
    /// * `notifier` - Where caller notifications are published.
    pub fn new(
        adapter: BackendAdapter,
        restore_selector: RestoreSelector,
        config: OrchestratorConfig,
        notifier: mpsc::UnboundedSender<ServiceEvent>,
    ) -> Self {
        Self {
            adapter,
            restore_selector,
            config,
            notifier,
            lifecycle: Lifecycle::Uninitialized,
            catalog: ProductCatalog::default(),
            pending: VecDeque::new(),
            in_flight: None,
            restore: RestoreState::Idle,
            seen_transactions: HashSet::new(),
            next_request_id: 0,
        }
    }

    pub fn state(&self) -> ServiceState {
        match self.lifecycle {
            Lifecycle::Uninitialized => ServiceState::Uninitialized,
            Lifecycle::Initializing => ServiceState::Initializing,
            Lifecycle::Ready(_) => ServiceState::Initialized,
            Lifecycle::Disposed => ServiceState::Disposed,
        }
    }

    pub fn is_initialized(&self) -> bool {
        self.session().is_some()
    }

    pub fn purchase_in_flight(&self) -> bool {
        self.in_flight.is_some()
    }

    /// Requests accepted but not yet submitted to the backend.
    pub fn queued(&self) -> usize {
        self.pending.len()
    }

    pub fn restore_running(&self) -> bool {
        self.restore == RestoreState::Running
    }

    fn slot_held_by_restore(&self) -> bool {
        matches!(self.restore, RestoreState::Running | RestoreState::Settling(_))
    }

    fn session(&self) -> Option<&Session> {
        match &self.lifecycle {
            Lifecycle::Ready(session) => Some(session),
            _ => None,
        }
    }

    fn notify(&self, event: ServiceEvent) {
        if self.notifier.send(event).is_err() {
            tracing::debug!("No one is listening for purchase notifications");
        }
    }

    /// Starts backend initialization with the products of `catalog`.
    ///
    /// Does nothing if initialization already happened or is under way.
    pub fn initialize(&mut self, catalog: ProductCatalog) -> Result<()> {
        match self.lifecycle {
            Lifecycle::Ready(_) | Lifecycle::Initializing => {
                tracing::debug!("Purchasing already initialized or initializing");
                return Ok(());
            }
            Lifecycle::Disposed => {
                tracing::warn!("Initialize called after dispose");
                return Err(IapError::Disposed);
            }
            Lifecycle::Uninitialized => {}
        }

        if catalog.is_empty() {
            tracing::warn!("Cannot initialize purchasing with an empty catalog");
            return Err(IapError::EmptyCatalog);
        }

        let config = catalog.backend_config(self.config.platform);
        for product in &config.products {
            tracing::debug!(
                product_id = %product.id,
                store_id = ?product.store_specific_id,
                "Product added"
            );
        }
        self.catalog = catalog;
        self.lifecycle = Lifecycle::Initializing;
        tracing::info!(products = config.products.len(), "Begin initialize purchasing");
        self.adapter.initialize(config);
        Ok(())
    }

    /// Queues a purchase and returns its request id.
    ///
    /// Rejected requests are neither queued nor notified.
    pub fn purchase(&mut self, product_id: &str, auto_confirm: bool) -> Result<u64> {
        let Some(session) = self.session() else {
            tracing::warn!(product_id, "Purchase rejected, purchasing not initialized");
            return Err(IapError::NotInitialized);
        };
        if !self.catalog.contains(product_id) {
            tracing::warn!(product_id, "Purchase rejected, product not in catalog");
            return Err(IapError::UnknownProduct(product_id.to_string()));
        }
        let Some(product) = session.controller.product(product_id) else {
            tracing::warn!(product_id, "Purchase rejected, product unknown to the store");
            return Err(IapError::UnknownProduct(product_id.to_string()));
        };
        if !product.available_to_purchase {
            tracing::warn!(product_id, "Purchase rejected, product not available");
            return Err(IapError::NotPurchasable(product_id.to_string()));
        }

        self.next_request_id += 1;
        let request = PurchaseRequest {
            request_id: self.next_request_id,
            product_id: product_id.to_string(),
            auto_confirm,
        };
        let outcome = PurchaseOutcome::processing(&request);
        tracing::debug!(
            request_id = request.request_id,
            product_id,
            auto_confirm,
            queued = self.pending.len() + 1,
            "Purchase queued"
        );
        self.pending.push_back(PendingPurchase { request, outcome });
        self.try_advance_queue();
        Ok(self.next_request_id)
    }

    /// Moves the slot forward once it is idle: a deferred restore first,
    /// otherwise the head of the queue.
    fn try_advance_queue(&mut self) {
        if self.in_flight.is_some() || self.slot_held_by_restore() {
            return;
        }
        if self.restore == RestoreState::Deferred {
            if self.start_restore().is_ok() {
                return;
            }
            self.restore = RestoreState::Idle;
        }
        if self.session().is_none() {
            return;
        }
        let Some(next) = self.pending.pop_front() else {
            return;
        };

        let product_id = next.request.product_id.clone();
        tracing::debug!(
            request_id = next.request.request_id,
            product_id = %product_id,
            "Submitting purchase"
        );
        let owned_transaction = self
            .session()
            .and_then(|session| session.controller.product(&product_id))
            .and_then(|product| product.transaction_id);
        self.in_flight = Some(InFlight {
            purchase: next,
            deadline: self.config.purchase_timeout.map(|t| Instant::now() + t),
            owned_transaction,
        });
        if let Some(session) = self.session() {
            session.controller.initiate_purchase(&product_id);
        }
    }

    /// The store's localized price rounded to cents, or `None` when the
    /// product is unknown or purchasing is not initialized.
    pub fn price(&self, product_id: &str) -> Option<Decimal> {
        let product = self.session()?.controller.product(product_id)?;
        Some(round_price(product.metadata.localized_price))
    }

    /// The ISO 4217 code of the product's price, or `None` if unavailable.
    pub fn currency_code(&self, product_id: &str) -> Option<String> {
        let product = self.session()?.controller.product(product_id)?;
        Some(product.metadata.iso_currency_code)
    }

    /// Acknowledges a delivered purchase to the backend.
    pub fn confirm_pending_purchase(&self, outcome: &PurchaseOutcome) -> Result<()> {
        let session = self.session().ok_or(IapError::NotInitialized)?;
        tracing::debug!(
            request_id = outcome.request_id(),
            product_id = outcome.product_id(),
            "Confirming pending purchase"
        );
        session
            .controller
            .confirm_pending_purchase(outcome.product_id());
        Ok(())
    }

    /// Subscription metadata for the first owned product with a receipt.
    pub fn subscription_info(&self, product_id: &str) -> Option<SubscriptionInfo> {
        let session = self.session()?;
        for product in session.controller.products() {
            if product.id != product_id || !product.has_receipt() {
                continue;
            }
            match session.controller.subscription_info(&product) {
                Ok(info) => return Some(info),
                Err(err) => {
                    tracing::error!(product_id, error = %err, "Subscription info unavailable");
                }
            }
        }
        None
    }

    /// Restores earlier purchases through the platform's restore strategy.
    ///
    /// The result arrives later as [`ServiceEvent::PurchasesRestored`].
    pub fn restore_purchases(&mut self) -> Result<()> {
        if !self.is_initialized() {
            tracing::warn!("Restore rejected, purchasing not initialized");
            return Err(IapError::NotInitialized);
        }
        if matches!(self.restore, RestoreState::Deferred | RestoreState::Running) {
            tracing::warn!("Restore rejected, one is already pending");
            return Err(IapError::RestoreInProgress);
        }
        if self.restore_selector.select(self.config.platform).is_none() {
            tracing::warn!(platform = %self.config.platform, "No restore strategy for platform");
            return Err(IapError::NoRestoreStrategy(self.config.platform));
        }
        if self.in_flight.is_some() {
            tracing::info!("Restore deferred until the in-flight purchase completes");
            self.restore = RestoreState::Deferred;
            return Ok(());
        }
        self.start_restore()
    }

    fn start_restore(&mut self) -> Result<()> {
        let Lifecycle::Ready(session) = &self.lifecycle else {
            return Err(IapError::NotInitialized);
        };
        let platform = self.config.platform;
        let strategy = self
            .restore_selector
            .select(platform)
            .ok_or(IapError::NoRestoreStrategy(platform))?;
        self.restore = RestoreState::Running;
        tracing::info!(strategy = strategy.name(), "Restoring purchases");
        strategy.restore(session.extensions.as_ref(), self.adapter.restore_callback());
        Ok(())
    }

    /// Tears the orchestrator down.
    ///
    /// Queued requests receive a `service disposed` failure; the in-flight
    /// request and any running restore are abandoned without notification.
    pub fn dispose(&mut self) {
        if !self.is_initialized() {
            return;
        }

        for PendingPurchase { request, mut outcome } in std::mem::take(&mut self.pending) {
            tracing::debug!(request_id = request.request_id, "Failing queued purchase on dispose");
            outcome.fail(SERVICE_DISPOSED);
            self.notify(ServiceEvent::PurchaseFailed(outcome));
        }
        if let Some(abandoned) = self.in_flight.take() {
            tracing::warn!(
                request_id = abandoned.purchase.request.request_id,
                product_id = %abandoned.purchase.request.product_id,
                "Abandoning in-flight purchase on dispose"
            );
        }
        self.restore = RestoreState::Idle;
        self.lifecycle = Lifecycle::Disposed;
        tracing::info!("Purchasing disposed");
    }

    /// Applies one backend notification.
    pub fn handle_backend_event(&mut self, event: BackendEvent) {
        match event {
            BackendEvent::Initialized {
                controller,
                extensions,
            } => self.on_initialized(Session {
                controller,
                extensions,
            }),
            BackendEvent::InitializeFailed { reason, message } => {
                if !matches!(self.lifecycle, Lifecycle::Initializing) {
                    tracing::warn!(%reason, "Ignoring initialization failure outside initialization");
                    return;
                }
                tracing::error!(%reason, message = ?message, "Purchasing initialization failed");
                self.lifecycle = Lifecycle::Uninitialized;
                self.notify(ServiceEvent::InitializeFailed(reason));
            }
            BackendEvent::PurchaseResult { product_id, result } => {
                self.on_purchase_result(product_id, result)
            }
            BackendEvent::RestoreResult { success, message } => {
                self.on_restore_result(success, message)
            }
        }
    }

    fn on_initialized(&mut self, session: Session) {
        if !matches!(self.lifecycle, Lifecycle::Initializing) {
            tracing::warn!(state = ?self.state(), "Ignoring initialization outside initialization");
            return;
        }
        self.lifecycle = Lifecycle::Ready(session);
        tracing::info!("Purchasing initialized");
        self.notify(ServiceEvent::Initialized);
    }

    fn on_purchase_result(
        &mut self,
        product_id: String,
        result: std::result::Result<PurchaseReceipt, PurchaseFailure>,
    ) {
        if !self.is_initialized() {
            tracing::warn!(%product_id, "Dropping purchase result, purchasing not initialized");
            return;
        }
        let correlated = self.in_flight.as_ref().is_some_and(|f| {
            f.purchase.request.product_id == product_id
                && !result.as_ref().is_ok_and(|receipt| self.is_stale(f, receipt))
        });
        if !correlated {
            self.on_untracked_result(product_id, result);
            return;
        }
        let Some(InFlight { purchase, .. }) = self.in_flight.take() else {
            return;
        };
        let PendingPurchase { request, mut outcome } = purchase;

        match result {
            Ok(receipt) => {
                self.seen_transactions.insert(receipt.transaction_id.clone());
                outcome.succeed(receipt);
                if request.auto_confirm
                    && let Some(session) = self.session()
                {
                    session.controller.confirm_pending_purchase(&request.product_id);
                }
                tracing::info!(
                    request_id = request.request_id,
                    product_id = %request.product_id,
                    transaction_id = ?outcome.transaction_id(),
                    "Purchase succeeded"
                );
                self.notify(ServiceEvent::Purchased(outcome));
            }
            Err(failure) => {
                tracing::error!(
                    request_id = request.request_id,
                    product_id = %request.product_id,
                    reason = %failure.reason,
                    message = ?failure.message,
                    "Purchase failed"
                );
                outcome.fail(failure.describe());
                self.notify(ServiceEvent::PurchaseFailed(outcome));
            }
        }
        self.try_advance_queue();
    }

    /// A success that carries a transaction reported before, or the one the
    /// store already held when the request was submitted, is a redelivery.
    fn is_stale(&self, in_flight: &InFlight, receipt: &PurchaseReceipt) -> bool {
        self.seen_transactions.contains(&receipt.transaction_id)
            || in_flight.owned_transaction.as_deref() == Some(receipt.transaction_id.as_str())
    }

    fn on_untracked_result(
        &mut self,
        product_id: String,
        result: std::result::Result<PurchaseReceipt, PurchaseFailure>,
    ) {
        match result {
            Ok(receipt) => {
                tracing::warn!(
                    %product_id,
                    transaction_id = %receipt.transaction_id,
                    "Purchase result matches no request"
                );
                self.seen_transactions.insert(receipt.transaction_id.clone());
                if self.config.acknowledge_untracked
                    && let Some(session) = self.session()
                {
                    session.controller.confirm_pending_purchase(&product_id);
                }
                self.notify(ServiceEvent::UntrackedPurchase(UntrackedPurchase {
                    product_id,
                    transaction_id: receipt.transaction_id,
                    receipt: receipt.receipt,
                }));
            }
            Err(failure) => {
                tracing::warn!(
                    %product_id,
                    reason = %failure.reason,
                    "Discarding failure that matches no request"
                );
            }
        }
    }

    fn on_restore_result(&mut self, success: bool, message: Option<String>) {
        if self.restore != RestoreState::Running {
            tracing::warn!(success, "Ignoring restore result, no restore running");
            return;
        }
        self.restore = match self.config.restore_grace {
            Some(grace) => RestoreState::Settling(Instant::now() + grace),
            None => RestoreState::Idle,
        };
        if success {
            tracing::info!("Restoring successful");
        } else {
            tracing::error!(message = ?message, "Restoring failed");
        }
        self.notify(ServiceEvent::PurchasesRestored { success, message });
        self.try_advance_queue();
    }

    /// The earliest moment [`expire`](Self::expire) has work to do.
    pub fn next_deadline(&self) -> Option<Instant> {
        match (self.purchase_deadline(), self.restore_grace_deadline()) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }
    }

    /// Applies every deadline at or before `now`.
    pub fn expire(&mut self, now: Instant) {
        self.end_restore_grace(now);
        self.expire_in_flight(now);
    }

    /// When the slot reopens after a finished restore, if a grace is running.
    pub fn restore_grace_deadline(&self) -> Option<Instant> {
        match self.restore {
            RestoreState::Settling(deadline) => Some(deadline),
            _ => None,
        }
    }

    fn end_restore_grace(&mut self, now: Instant) {
        if self.restore_grace_deadline().is_some_and(|deadline| now >= deadline) {
            tracing::debug!("Restore grace over, reopening the purchase slot");
            self.restore = RestoreState::Idle;
            self.try_advance_queue();
        }
    }

    /// When the in-flight purchase must be failed, if a timeout is configured.
    pub fn purchase_deadline(&self) -> Option<Instant> {
        self.in_flight.as_ref().and_then(|f| f.deadline)
    }

    /// Fails the in-flight purchase if its deadline is at or before `now`.
    pub fn expire_in_flight(&mut self, now: Instant) {
        let expired = self.purchase_deadline().is_some_and(|deadline| now >= deadline);
        if !expired {
            return;
        }
        let Some(InFlight { purchase, .. }) = self.in_flight.take() else {
            return;
        };
        let PendingPurchase { request, mut outcome } = purchase;
        tracing::warn!(
            request_id = request.request_id,
            product_id = %request.product_id,
            "Purchase timed out"
        );
        outcome.fail(PURCHASE_TIMED_OUT);
        self.notify(ServiceEvent::PurchaseFailed(outcome));
        self.try_advance_queue();
    }
}
