use crate::domain::catalog::ProductType;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use std::fmt;

/// A caller's intent to buy one product.
#[derive(Debug, PartialEq, Clone)]
pub struct PurchaseRequest {
    pub request_id: u64,
    pub product_id: String,
    pub auto_confirm: bool,
}

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum PurchaseStatus {
    Processing,
    Success,
    Failure,
}

impl fmt::Display for PurchaseStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            PurchaseStatus::Processing => "processing",
            PurchaseStatus::Success => "success",
            PurchaseStatus::Failure => "failure",
        };
        f.write_str(s)
    }
}

/// The record handed back to the caller for a purchase request.
///
/// Starts as `Processing` when the request is queued and is completed exactly
/// once. Only completed outcomes leave the orchestrator, so callers always see
/// a terminal, immutable value.
#[derive(Debug, PartialEq, Clone)]
pub struct PurchaseOutcome {
    request_id: u64,
    product_id: String,
    transaction_id: Option<String>,
    receipt: Option<String>,
    status: PurchaseStatus,
    error_message: Option<String>,
    auto_confirm: bool,
}

impl PurchaseOutcome {
    pub(crate) fn processing(request: &PurchaseRequest) -> Self {
        Self {
            request_id: request.request_id,
            product_id: request.product_id.clone(),
            transaction_id: None,
            receipt: None,
            status: PurchaseStatus::Processing,
            error_message: None,
            auto_confirm: request.auto_confirm,
        }
    }

    pub(crate) fn succeed(&mut self, receipt: PurchaseReceipt) {
        self.transaction_id = Some(receipt.transaction_id);
        self.receipt = Some(receipt.receipt);
        self.status = PurchaseStatus::Success;
    }

    pub(crate) fn fail(&mut self, message: impl Into<String>) {
        self.error_message = Some(message.into());
        self.status = PurchaseStatus::Failure;
    }

    pub fn request_id(&self) -> u64 {
        self.request_id
    }

    pub fn product_id(&self) -> &str {
        &self.product_id
    }

    pub fn transaction_id(&self) -> Option<&str> {
        self.transaction_id.as_deref()
    }

    pub fn receipt(&self) -> Option<&str> {
        self.receipt.as_deref()
    }

    pub fn status(&self) -> PurchaseStatus {
        self.status
    }

    pub fn error_message(&self) -> Option<&str> {
        self.error_message.as_deref()
    }

    pub fn auto_confirm(&self) -> bool {
        self.auto_confirm
    }
}

/// Backend-side data for a completed transaction.
#[derive(Debug, PartialEq, Clone)]
pub struct PurchaseReceipt {
    pub transaction_id: String,
    pub receipt: String,
}

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum InitializationFailureReason {
    PurchasingUnavailable,
    NoProductsAvailable,
    AppNotKnown,
}

impl fmt::Display for InitializationFailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{self:?}")
    }
}

impl std::str::FromStr for InitializationFailureReason {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "PurchasingUnavailable" => Self::PurchasingUnavailable,
            "NoProductsAvailable" => Self::NoProductsAvailable,
            "AppNotKnown" => Self::AppNotKnown,
            other => return Err(format!("unknown initialization failure reason '{other}'")),
        })
    }
}

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum PurchaseFailureReason {
    PurchasingUnavailable,
    ExistingPurchasePending,
    ProductUnavailable,
    SignatureInvalid,
    UserCancelled,
    PaymentDeclined,
    DuplicateTransaction,
    Unknown,
}

impl fmt::Display for PurchaseFailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{self:?}")
    }
}

impl std::str::FromStr for PurchaseFailureReason {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "PurchasingUnavailable" => Self::PurchasingUnavailable,
            "ExistingPurchasePending" => Self::ExistingPurchasePending,
            "ProductUnavailable" => Self::ProductUnavailable,
            "SignatureInvalid" => Self::SignatureInvalid,
            "UserCancelled" => Self::UserCancelled,
            "PaymentDeclined" => Self::PaymentDeclined,
            "DuplicateTransaction" => Self::DuplicateTransaction,
            "Unknown" => Self::Unknown,
            other => return Err(format!("unknown purchase failure reason '{other}'")),
        })
    }
}

#[derive(Debug, PartialEq, Clone)]
pub struct PurchaseFailure {
    pub reason: PurchaseFailureReason,
    /// Detailed message, when the backend supplies one.
    pub message: Option<String>,
}

impl PurchaseFailure {
    /// Text placed in the Failure outcome: the detailed message if any,
    /// otherwise the reason name.
    pub fn describe(&self) -> String {
        match &self.message {
            Some(message) => message.clone(),
            None => self.reason.to_string(),
        }
    }
}

/// Localized store metadata.
#[derive(Debug, PartialEq, Clone)]
pub struct ProductMetadata {
    pub localized_price: Decimal,
    pub iso_currency_code: String,
    pub localized_title: String,
    pub localized_description: String,
}

/// A product as the backend sees it after initialization.
#[derive(Debug, PartialEq, Clone)]
pub struct StoreProduct {
    pub id: String,
    pub store_specific_id: Option<String>,
    pub product_type: ProductType,
    pub available_to_purchase: bool,
    pub metadata: ProductMetadata,
    pub transaction_id: Option<String>,
    pub receipt: Option<String>,
}

impl StoreProduct {
    /// A purchasable product without store id, receipt or descriptive text.
    pub fn new(
        id: impl Into<String>,
        product_type: ProductType,
        price: Decimal,
        currency: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            store_specific_id: None,
            product_type,
            available_to_purchase: true,
            metadata: ProductMetadata {
                localized_price: price,
                iso_currency_code: currency.into(),
                localized_title: String::new(),
                localized_description: String::new(),
            },
            transaction_id: None,
            receipt: None,
        }
    }

    pub fn has_receipt(&self) -> bool {
        self.receipt.as_deref().is_some_and(|r| !r.is_empty())
    }
}

#[derive(Debug, PartialEq, Clone)]
pub struct SubscriptionInfo {
    pub product_id: String,
    pub purchase_date: DateTime<Utc>,
    pub expire_date: Option<DateTime<Utc>>,
    pub is_subscribed: bool,
    pub is_expired: bool,
    pub is_cancelled: bool,
    pub is_free_trial: bool,
    pub is_auto_renewing: bool,
}

/// A successful transaction the backend delivered without a matching request,
/// e.g. a pending purchase from an earlier session or a restored one.
#[derive(Debug, PartialEq, Clone)]
pub struct UntrackedPurchase {
    pub product_id: String,
    pub transaction_id: String,
    pub receipt: String,
}

/// Rounds a backend price to cents, matching how prices are displayed.
pub fn round_price(price: Decimal) -> Decimal {
    price.round_dp(2)
}
