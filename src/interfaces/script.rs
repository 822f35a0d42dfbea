//! Drives a [`PurchaseService`] over an [`InMemoryStore`] from a scenario script.
//!
//! Caller steps go through the service; store steps play the backend's part.
//! After every step the runner waits for the service to settle and writes the
//! notifications it produced, so the report follows script order.

use crate::application::service::{InAppService, PurchaseService};
use crate::domain::catalog::ProductCatalog;
use crate::domain::events::ServiceEvent;
use crate::domain::purchase::{InitializationFailureReason, PurchaseFailure, PurchaseFailureReason};
use crate::error::{IapError, Result};
use crate::infrastructure::in_memory::InMemoryStore;
use crate::interfaces::csv::report_writer::ReportWriter;
use crate::interfaces::csv::script_reader::{Action, ScriptReader, ScriptStep};
use std::io::{Read, Write};
use std::time::Duration;
use tokio::sync::mpsc::UnboundedReceiver;

pub struct ScriptRunner<W: Write> {
    service: PurchaseService,
    events: UnboundedReceiver<ServiceEvent>,
    store: InMemoryStore,
    catalog: ProductCatalog,
    writer: ReportWriter<W>,
}

impl<W: Write> ScriptRunner<W> {
    /// Creates a runner over an already spawned service.
    ///
    /// # Arguments
    ///
    /// * `service` - The purchase service under test, shut down by [`run`](Self::run).
    /// * `events` - The notification receiver returned with `service`.
    /// * `store` - The in-memory backend `service` was spawned with; store
    ///   steps drive its callbacks.
    /// * `catalog` - Products passed to `initialize` steps.
    /// * `writer` - Destination of the report.
    pub fn new(
        service: PurchaseService,
        events: UnboundedReceiver<ServiceEvent>,
        store: InMemoryStore,
        catalog: ProductCatalog,
        writer: ReportWriter<W>,
    ) -> Self {
        Self {
            service,
            events,
            store,
            catalog,
            writer,
        }
    }

    /// Runs every step, then shuts the service down and reports what is left.
    ///
    /// Unreadable or malformed steps are logged and skipped. Only report
    /// output failures and a stopped service abort the run.
    pub async fn run<R: Read>(mut self, script: ScriptReader<R>) -> Result<()> {
        for step in script.steps() {
            match step {
                Ok(step) => self.step(&step).await?,
                Err(e) => tracing::error!(error = %e, "Error reading script step"),
            }
            self.service.settle().await?;
            self.drain()?;
        }
        self.service.shutdown().await?;
        while let Some(event) = self.events.recv().await {
            self.writer.write_event(&event)?;
        }
        self.writer.flush()
    }

    fn drain(&mut self) -> Result<()> {
        while let Ok(event) = self.events.try_recv() {
            self.writer.write_event(&event)?;
        }
        Ok(())
    }

    async fn step(&mut self, step: &ScriptStep) -> Result<()> {
        match self.execute(step).await {
            Ok(()) => Ok(()),
            Err(IapError::ServiceStopped) => Err(IapError::ServiceStopped),
            Err(IapError::ScriptError(message)) => {
                tracing::error!(action = ?step.action, %message, "Skipping script step");
                Ok(())
            }
            Err(e) => self.writer.write_rejection(step.product.as_deref(), &e),
        }
    }

    async fn execute(&mut self, step: &ScriptStep) -> Result<()> {
        match step.action {
            Action::Initialize => self.service.initialize(self.catalog.clone()).await,
            Action::InitOk => store_driven(self.store.complete_initialization()),
            Action::InitFail => {
                let reason = match step.detail.as_deref() {
                    Some(detail) => detail
                        .parse::<InitializationFailureReason>()
                        .map_err(IapError::ScriptError)?,
                    None => InitializationFailureReason::PurchasingUnavailable,
                };
                store_driven(self.store.fail_initialization(reason, None))
            }
            Action::Purchase => {
                let product = step.require_product()?;
                let auto_confirm = step.detail.as_deref() == Some("auto");
                self.service.purchase(product, auto_confirm).await.map(|_| ())
            }
            Action::Approve => {
                let product = step.require_product()?;
                let transaction_id = step.require_detail()?;
                let receipt = format!("receipt-{transaction_id}");
                store_driven(
                    self.store
                        .approve(product, transaction_id, &receipt)
                        .is_some(),
                )
            }
            Action::Decline => {
                let product = step.require_product()?;
                let reason = match step.detail.as_deref() {
                    Some(detail) => detail
                        .parse::<PurchaseFailureReason>()
                        .map_err(IapError::ScriptError)?,
                    None => PurchaseFailureReason::Unknown,
                };
                let failure = PurchaseFailure {
                    reason,
                    message: None,
                };
                store_driven(self.store.decline(product, failure))
            }
            Action::Restore => self.service.restore_purchases().await,
            Action::RestoreOk => {
                store_driven(self.store.finish_restore(true, step.detail.clone()))
            }
            Action::RestoreFail => {
                store_driven(self.store.finish_restore(false, step.detail.clone()))
            }
            Action::Price => {
                let product = step.require_product()?;
                let price = self.service.price(product).await?;
                self.writer.write_price(product, price)
            }
            Action::Currency => {
                let product = step.require_product()?;
                let currency = self.service.currency_code(product).await?;
                self.writer.write_currency(product, currency.as_deref())
            }
            Action::Dispose => self.service.dispose().await,
            Action::Wait => {
                let millis = step
                    .require_detail()?
                    .parse::<u64>()
                    .map_err(|e| IapError::ScriptError(format!("invalid wait: {e}")))?;
                tokio::time::sleep(Duration::from_millis(millis)).await;
                Ok(())
            }
        }
    }
}

fn store_driven(delivered: bool) -> Result<()> {
    if delivered {
        Ok(())
    } else {
        Err(IapError::ScriptError(
            "store has nothing to deliver this to".to_string(),
        ))
    }
}
