use super::orchestrator::{OrchestratorConfig, PurchaseOrchestrator, ServiceState};
use crate::domain::catalog::ProductCatalog;
use crate::domain::events::{BackendEvent, ServiceEvent};
use crate::domain::ports::BillingBackend;
use crate::domain::purchase::{PurchaseOutcome, SubscriptionInfo};
use crate::error::{IapError, Result};
use crate::infrastructure::adapter::BackendAdapter;
use crate::infrastructure::restore::RestoreSelector;
use async_trait::async_trait;
use rust_decimal::Decimal;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{Instant, sleep_until};

/// The public purchasing contract.
///
/// Every call is answered once the orchestrator has applied it. Purchase
/// results and restore results arrive later, as [`ServiceEvent`]s on the
/// receiver handed out with the service. Calls the orchestrator refuses
/// (not initialized, unknown product, restore already pending) return an
/// error and produce no event. [`IapError::ServiceStopped`] means the
/// service task is gone.
#[async_trait]
pub trait InAppService: Send + Sync {
    async fn initialize(&self, catalog: ProductCatalog) -> Result<()>;
    async fn is_initialized(&self) -> Result<bool>;
    async fn purchase(&self, product_id: &str, auto_confirm: bool) -> Result<u64>;
    async fn price(&self, product_id: &str) -> Result<Option<Decimal>>;
    async fn currency_code(&self, product_id: &str) -> Result<Option<String>>;
    async fn confirm_pending_purchase(&self, outcome: &PurchaseOutcome) -> Result<()>;
    async fn subscription_info(&self, product_id: &str) -> Result<Option<SubscriptionInfo>>;
    async fn restore_purchases(&self) -> Result<()>;
    async fn dispose(&self) -> Result<()>;
}

enum Command {
    Initialize {
        catalog: ProductCatalog,
        reply: oneshot::Sender<Result<()>>,
    },
    State {
        reply: oneshot::Sender<ServiceState>,
    },
    Purchase {
        product_id: String,
        auto_confirm: bool,
        reply: oneshot::Sender<Result<u64>>,
    },
    Price {
        product_id: String,
        reply: oneshot::Sender<Option<Decimal>>,
    },
    CurrencyCode {
        product_id: String,
        reply: oneshot::Sender<Option<String>>,
    },
    Confirm {
        outcome: PurchaseOutcome,
        reply: oneshot::Sender<Result<()>>,
    },
    SubscriptionInfo {
        product_id: String,
        reply: oneshot::Sender<Option<SubscriptionInfo>>,
    },
    Restore {
        reply: oneshot::Sender<Result<()>>,
    },
    Dispose {
        reply: oneshot::Sender<()>,
    },
    Settle {
        reply: oneshot::Sender<()>,
    },
}

/// Handle to a purchase orchestrator running on its own task.
///
/// Backend events are applied before caller commands whenever both are
/// ready. Dropping the handle or calling [`shutdown`](Self::shutdown) disposes
/// the orchestrator and stops the task.
pub struct PurchaseService {
    commands: mpsc::UnboundedSender<Command>,
    task: JoinHandle<()>,
}

impl PurchaseService {
    /// Spawns the service task. Must be called inside a tokio runtime.
    ///
    /// # Arguments
    ///
    /// * `backend` - The billing backend the orchestrator drives.
    /// * `restore_selector` - Restore strategies, tried in registration order.
    /// * `config` - Platform, timeout and restore settings.
    ///
    /// Returns the handle and the receiver for caller notifications.
    pub fn spawn(
        backend: Arc<dyn BillingBackend>,
        restore_selector: RestoreSelector,
        config: OrchestratorConfig,
    ) -> (Self, mpsc::UnboundedReceiver<ServiceEvent>) {
        let (adapter, backend_events) = BackendAdapter::channel(backend);
        let (notifier, notifications) = mpsc::unbounded_channel();
        let (commands, command_rx) = mpsc::unbounded_channel();
        let orchestrator = PurchaseOrchestrator::new(adapter, restore_selector, config, notifier);
        let task = tokio::spawn(run(orchestrator, command_rx, backend_events));
        (Self { commands, task }, notifications)
    }

    async fn request<T>(&self, command: Command, reply: oneshot::Receiver<T>) -> Result<T> {
        self.commands
            .send(command)
            .map_err(|_| IapError::ServiceStopped)?;
        reply.await.map_err(|_| IapError::ServiceStopped)
    }

    /// Resolves once every backend event delivered before this call has been applied.
    pub async fn settle(&self) -> Result<()> {
        let (reply, rx) = oneshot::channel();
        self.request(Command::Settle { reply }, rx).await
    }

    pub async fn state(&self) -> Result<ServiceState> {
        let (reply, rx) = oneshot::channel();
        self.request(Command::State { reply }, rx).await
    }

    /// Disposes the orchestrator and waits for the task to finish.
    pub async fn shutdown(self) -> Result<()> {
        drop(self.commands);
        self.task.await.map_err(|err| {
            tracing::error!(error = %err, "Purchase service task failed");
            IapError::ServiceStopped
        })
    }
}

#[async_trait]
impl InAppService for PurchaseService {
    async fn initialize(&self, catalog: ProductCatalog) -> Result<()> {
        let (reply, rx) = oneshot::channel();
        self.request(Command::Initialize { catalog, reply }, rx).await?
    }

    async fn is_initialized(&self) -> Result<bool> {
        Ok(self.state().await? == ServiceState::Initialized)
    }

    async fn purchase(&self, product_id: &str, auto_confirm: bool) -> Result<u64> {
        let (reply, rx) = oneshot::channel();
        let command = Command::Purchase {
            product_id: product_id.to_string(),
            auto_confirm,
            reply,
        };
        self.request(command, rx).await?
    }

    async fn price(&self, product_id: &str) -> Result<Option<Decimal>> {
        let (reply, rx) = oneshot::channel();
        let product_id = product_id.to_string();
        self.request(Command::Price { product_id, reply }, rx).await
    }

    async fn currency_code(&self, product_id: &str) -> Result<Option<String>> {
        let (reply, rx) = oneshot::channel();
        let product_id = product_id.to_string();
        self.request(Command::CurrencyCode { product_id, reply }, rx).await
    }

    async fn confirm_pending_purchase(&self, outcome: &PurchaseOutcome) -> Result<()> {
        let (reply, rx) = oneshot::channel();
        let outcome = outcome.clone();
        self.request(Command::Confirm { outcome, reply }, rx).await?
    }

    async fn subscription_info(&self, product_id: &str) -> Result<Option<SubscriptionInfo>> {
        let (reply, rx) = oneshot::channel();
        let product_id = product_id.to_string();
        self.request(Command::SubscriptionInfo { product_id, reply }, rx)
            .await
    }

    async fn restore_purchases(&self) -> Result<()> {
        let (reply, rx) = oneshot::channel();
        self.request(Command::Restore { reply }, rx).await?
    }

    async fn dispose(&self) -> Result<()> {
        let (reply, rx) = oneshot::channel();
        self.request(Command::Dispose { reply }, rx).await
    }
}

async fn run(
    mut orchestrator: PurchaseOrchestrator,
    mut commands: mpsc::UnboundedReceiver<Command>,
    mut backend_events: mpsc::UnboundedReceiver<BackendEvent>,
) {
    tracing::info!("Purchase service started");
    loop {
        let deadline = orchestrator.next_deadline();
        tokio::select! {
            biased;
            Some(event) = backend_events.recv() => orchestrator.handle_backend_event(event),
            _ = sleep_until(deadline.unwrap_or_else(Instant::now)), if deadline.is_some() => {
                orchestrator.expire(Instant::now());
            }
            command = commands.recv() => match command {
                Some(command) => apply(&mut orchestrator, command),
                None => break,
            },
        }
    }
    orchestrator.dispose();
    tracing::info!("Purchase service stopped");
}

// A dropped reply receiver only means the caller stopped waiting.
fn apply(orchestrator: &mut PurchaseOrchestrator, command: Command) {
    match command {
        Command::Initialize { catalog, reply } => {
            let _ = reply.send(orchestrator.initialize(catalog));
        }
        Command::State { reply } => {
            let _ = reply.send(orchestrator.state());
        }
        Command::Purchase {
            product_id,
            auto_confirm,
            reply,
        } => {
            let _ = reply.send(orchestrator.purchase(&product_id, auto_confirm));
        }
        Command::Price { product_id, reply } => {
            let _ = reply.send(orchestrator.price(&product_id));
        }
        Command::CurrencyCode { product_id, reply } => {
            let _ = reply.send(orchestrator.currency_code(&product_id));
        }
        Command::Confirm { outcome, reply } => {
            let _ = reply.send(orchestrator.confirm_pending_purchase(&outcome));
        }
        Command::SubscriptionInfo { product_id, reply } => {
            let _ = reply.send(orchestrator.subscription_info(&product_id));
        }
        Command::Restore { reply } => {
            let _ = reply.send(orchestrator.restore_purchases());
        }
        Command::Dispose { reply } => {
            orchestrator.dispose();
            let _ = reply.send(());
        }
        Command::Settle { reply } => {
            let _ = reply.send(());
        }
    }
}
