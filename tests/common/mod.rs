#![allow(dead_code)]

use purchase_flow::application::orchestrator::OrchestratorConfig;
use purchase_flow::application::service::PurchaseService;
use purchase_flow::domain::catalog::{Platform, ProductCatalog, ProductDescriptor, ProductType};
use purchase_flow::domain::events::ServiceEvent;
use purchase_flow::infrastructure::in_memory::InMemoryStore;
use purchase_flow::infrastructure::restore::RestoreSelector;
use std::io::{Error, Write};
use std::sync::Arc;
use tempfile::NamedTempFile;
use tokio::sync::mpsc::UnboundedReceiver;

pub const CATALOG_CSV: &str = "id,type,platform,store_id\n\
                               coin_100,consumable,android,gp.coin_100\n\
                               gems,consumable,,\n\
                               no_ads,non_consumable,,\n\
                               vip,subscription,android,gp.vip\n";

pub fn catalog() -> ProductCatalog {
    ProductCatalog::new(vec![
        ProductDescriptor::new("coin_100", ProductType::Consumable),
        ProductDescriptor::new("gems", ProductType::Consumable),
        ProductDescriptor::new("no_ads", ProductType::NonConsumable),
        ProductDescriptor::new("vip", ProductType::Subscription),
    ])
    .unwrap()
}

pub fn android_config() -> OrchestratorConfig {
    OrchestratorConfig {
        platform: Platform::Android,
        ..Default::default()
    }
}

pub fn spawn(
    store: &InMemoryStore,
    config: OrchestratorConfig,
) -> (PurchaseService, UnboundedReceiver<ServiceEvent>) {
    PurchaseService::spawn(
        Arc::new(store.clone()),
        RestoreSelector::platform_defaults(),
        config,
    )
}

/// Everything the service has notified so far.
pub fn drain(events: &mut UnboundedReceiver<ServiceEvent>) -> Vec<ServiceEvent> {
    let mut drained = Vec::new();
    while let Ok(event) = events.try_recv() {
        drained.push(event);
    }
    drained
}

pub fn write_file(contents: &str) -> Result<NamedTempFile, Error> {
    let mut file = NamedTempFile::new()?;
    file.write_all(contents.as_bytes())?;
    file.flush()?;
    Ok(file)
}

/// A script with the given steps after the `initialize, init_ok` preamble.
pub fn write_script(steps: &[&str]) -> Result<NamedTempFile, Error> {
    let mut contents = String::from("action,product,detail\ninitialize,,\ninit_ok,,\n");
    for step in steps {
        contents.push_str(step);
        contents.push('\n');
    }
    write_file(&contents)
}
