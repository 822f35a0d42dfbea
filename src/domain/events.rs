use super::ports::{ExtensionProvider, StoreController};
use super::purchase::{
    InitializationFailureReason, PurchaseFailure, PurchaseOutcome, PurchaseReceipt,
    UntrackedPurchase,
};
use std::fmt;
use std::sync::Arc;

/// Normalized backend notification, consumed by the orchestrator in arrival order.
pub enum BackendEvent {
    Initialized {
        controller: Box<dyn StoreController>,
        extensions: Arc<dyn ExtensionProvider>,
    },
    InitializeFailed {
        reason: InitializationFailureReason,
        message: Option<String>,
    },
    PurchaseResult {
        product_id: String,
        result: Result<PurchaseReceipt, PurchaseFailure>,
    },
    RestoreResult {
        success: bool,
        message: Option<String>,
    },
}

impl fmt::Debug for BackendEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackendEvent::Initialized { .. } => f.write_str("Initialized"),
            BackendEvent::InitializeFailed { reason, message } => f
                .debug_struct("InitializeFailed")
                .field("reason", reason)
                .field("message", message)
                .finish(),
            BackendEvent::PurchaseResult { product_id, result } => f
                .debug_struct("PurchaseResult")
                .field("product_id", product_id)
                .field("result", result)
                .finish(),
            BackendEvent::RestoreResult { success, message } => f
                .debug_struct("RestoreResult")
                .field("success", success)
                .field("message", message)
                .finish(),
        }
    }
}

/// Caller-observable notification.
#[derive(Debug, PartialEq, Clone)]
pub enum ServiceEvent {
    Initialized,
    InitializeFailed(InitializationFailureReason),
    Purchased(PurchaseOutcome),
    PurchaseFailed(PurchaseOutcome),
    PurchasesRestored { success: bool, message: Option<String> },
    UntrackedPurchase(UntrackedPurchase),
}
