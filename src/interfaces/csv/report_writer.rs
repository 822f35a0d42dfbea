use crate::domain::events::ServiceEvent;
use crate::domain::purchase::PurchaseOutcome;
use crate::error::{IapError, Result};
use rust_decimal::Decimal;
use serde::Serialize;
use std::io::Write;

const HEADER: [&str; 7] = [
    "event",
    "request",
    "product",
    "status",
    "transaction",
    "receipt",
    "message",
];

#[derive(Debug, Default, Serialize)]
struct ReportRow<'a> {
    event: &'a str,
    request: Option<u64>,
    product: Option<&'a str>,
    status: Option<String>,
    transaction: Option<&'a str>,
    receipt: Option<&'a str>,
    message: Option<String>,
}

impl<'a> ReportRow<'a> {
    fn outcome(event: &'a str, outcome: &'a PurchaseOutcome) -> Self {
        Self {
            event,
            request: Some(outcome.request_id()),
            product: Some(outcome.product_id()),
            status: Some(outcome.status().to_string()),
            transaction: outcome.transaction_id(),
            receipt: outcome.receipt(),
            message: outcome.error_message().map(str::to_string),
        }
    }
}

/// Writes caller notifications and query answers as CSV report rows.
pub struct ReportWriter<W: Write> {
    writer: csv::Writer<W>,
}

impl<W: Write> ReportWriter<W> {
    pub fn new(sink: W) -> Result<Self> {
        let mut writer = csv::WriterBuilder::new()
            .has_headers(false)
            .from_writer(sink);
        writer.write_record(HEADER)?;
        Ok(Self { writer })
    }

    pub fn write_event(&mut self, event: &ServiceEvent) -> Result<()> {
        let row = match event {
            ServiceEvent::Initialized => ReportRow {
                event: "initialized",
                ..Default::default()
            },
            ServiceEvent::InitializeFailed(reason) => ReportRow {
                event: "initialize_failed",
                message: Some(format!("{reason:?}")),
                ..Default::default()
            },
            ServiceEvent::Purchased(outcome) => ReportRow::outcome("purchased", outcome),
            ServiceEvent::PurchaseFailed(outcome) => ReportRow::outcome("purchase_failed", outcome),
            ServiceEvent::PurchasesRestored { success, message } => ReportRow {
                event: "restored",
                status: Some(if *success { "success" } else { "failure" }.to_string()),
                message: message.clone(),
                ..Default::default()
            },
            ServiceEvent::UntrackedPurchase(untracked) => ReportRow {
                event: "untracked",
                product: Some(&untracked.product_id),
                transaction: Some(&untracked.transaction_id),
                receipt: Some(&untracked.receipt),
                ..Default::default()
            },
        };
        self.serialize(row)
    }

    /// Records a caller request that was refused without a notification.
    pub fn write_rejection(&mut self, product: Option<&str>, error: &IapError) -> Result<()> {
        self.serialize(ReportRow {
            event: "rejected",
            product,
            message: Some(error.to_string()),
            ..Default::default()
        })
    }

    pub fn write_price(&mut self, product: &str, price: Option<Decimal>) -> Result<()> {
        self.serialize(ReportRow {
            event: "price",
            product: Some(product),
            message: Some(price.map_or_else(|| "unavailable".to_string(), |p| p.to_string())),
            ..Default::default()
        })
    }

    pub fn write_currency(&mut self, product: &str, currency: Option<&str>) -> Result<()> {
        self.serialize(ReportRow {
            event: "currency",
            product: Some(product),
            message: Some(currency.unwrap_or("unavailable").to_string()),
            ..Default::default()
        })
    }

    pub fn flush(&mut self) -> Result<()> {
        self.writer.flush()?;
        Ok(())
    }

    fn serialize(&mut self, row: ReportRow<'_>) -> Result<()> {
        self.writer.serialize(row)?;
        Ok(())
    }
}
