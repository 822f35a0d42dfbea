use crate::domain::catalog::BackendConfig;
use crate::domain::events::BackendEvent;
use crate::domain::ports::{
    BillingBackend, ExtensionProvider, ProcessingResult, RestoreCallback, StoreController,
    StoreListener,
};
use crate::domain::purchase::{
    InitializationFailureReason, PurchaseFailure, PurchaseReceipt, StoreProduct,
};
use std::sync::Arc;
use tokio::sync::mpsc;

/// Wraps the billing backend and turns its callbacks into [`BackendEvent`]s
/// on a single channel.
///
/// Whoever owns the receiving half applies the events one at a time, so the
/// backend may call back from any thread without touching orchestrator state.
pub struct BackendAdapter {
    backend: Arc<dyn BillingBackend>,
    events: mpsc::UnboundedSender<BackendEvent>,
}

impl BackendAdapter {
    pub fn new(backend: Arc<dyn BillingBackend>, events: mpsc::UnboundedSender<BackendEvent>) -> Self {
        Self { backend, events }
    }

    /// Creates an adapter together with the receiver its events arrive on.
    pub fn channel(backend: Arc<dyn BillingBackend>) -> (Self, mpsc::UnboundedReceiver<BackendEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self::new(backend, tx), rx)
    }

    pub fn initialize(&self, config: BackendConfig) {
        let listener = ChannelListener {
            events: self.events.clone(),
        };
        self.backend.initialize(config, Box::new(listener));
    }

    /// A restore callback that reports through the same event channel.
    pub fn restore_callback(&self) -> RestoreCallback {
        let events = self.events.clone();
        Box::new(move |success, message| {
            forward(&events, BackendEvent::RestoreResult { success, message });
        })
    }
}

struct ChannelListener {
    events: mpsc::UnboundedSender<BackendEvent>,
}

fn forward(events: &mpsc::UnboundedSender<BackendEvent>, event: BackendEvent) {
    if let Err(err) = events.send(event) {
        tracing::debug!(event = ?err.0, "Backend event dropped, orchestrator is gone");
    }
}

impl StoreListener for ChannelListener {
    fn on_initialized(&self, controller: Box<dyn StoreController>, extensions: Arc<dyn ExtensionProvider>) {
        forward(&self.events, BackendEvent::Initialized { controller, extensions });
    }

    fn on_initialize_failed(&self, reason: InitializationFailureReason, message: Option<String>) {
        forward(&self.events, BackendEvent::InitializeFailed { reason, message });
    }

    fn process_purchase(&self, product: &StoreProduct) -> ProcessingResult {
        let receipt = PurchaseReceipt {
            transaction_id: product.transaction_id.clone().unwrap_or_default(),
            receipt: product.receipt.clone().unwrap_or_default(),
        };
        forward(
            &self.events,
            BackendEvent::PurchaseResult {
                product_id: product.id.clone(),
                result: Ok(receipt),
            },
        );
        // Confirmation is decided once the result is correlated.
        ProcessingResult::Pending
    }

    fn on_purchase_failed(&self, product: &StoreProduct, failure: PurchaseFailure) {
        forward(
            &self.events,
            BackendEvent::PurchaseResult {
                product_id: product.id.clone(),
                result: Err(failure),
            },
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::purchase::PurchaseFailureReason;
    use crate::infrastructure::in_memory::InMemoryStore;

    #[test]
    fn test_initialize_reaches_backend_with_config() {
        let store = InMemoryStore::new();
        let (adapter, _rx) = BackendAdapter::channel(Arc::new(store.clone()));

        adapter.initialize(BackendConfig::default());
        assert_eq!(store.initialize_calls(), 1);
    }

    #[test]
    fn test_callbacks_become_events() {
        let store = InMemoryStore::new();
        let (adapter, mut rx) = BackendAdapter::channel(Arc::new(store.clone()));
        adapter.initialize(BackendConfig::default());

        store.fail_initialization(InitializationFailureReason::AppNotKnown, None);
        assert_eq!(
            store.approve("coin_100", "T1", "R1"),
            Some(ProcessingResult::Pending)
        );
        assert!(store.finished_purchases().is_empty());
        store.decline(
            "coin_100",
            PurchaseFailure {
                reason: PurchaseFailureReason::UserCancelled,
                message: None,
            },
        );

        assert!(matches!(
            rx.try_recv(),
            Ok(BackendEvent::InitializeFailed {
                reason: InitializationFailureReason::AppNotKnown,
                ..
            })
        ));
        match rx.try_recv() {
            Ok(BackendEvent::PurchaseResult { product_id, result }) => {
                assert_eq!(product_id, "coin_100");
                let receipt = result.unwrap();
                assert_eq!(receipt.transaction_id, "T1");
                assert_eq!(receipt.receipt, "R1");
            }
            other => panic!("unexpected event: {other:?}"),
        }
        assert!(matches!(
            rx.try_recv(),
            Ok(BackendEvent::PurchaseResult { result: Err(_), .. })
        ));
    }

    #[test]
    fn test_restore_callback_reports_result() {
        let (adapter, mut rx) = BackendAdapter::channel(Arc::new(InMemoryStore::new()));
        let callback = adapter.restore_callback();
        callback(false, Some("network".to_string()));

        match rx.try_recv() {
            Ok(BackendEvent::RestoreResult { success, message }) => {
                assert!(!success);
                assert_eq!(message.as_deref(), Some("network"));
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn test_closed_channel_does_not_panic() {
        let (adapter, rx) = BackendAdapter::channel(Arc::new(InMemoryStore::new()));
        drop(rx);
        let callback = adapter.restore_callback();
        callback(true, None);
    }
}
