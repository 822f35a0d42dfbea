use clap::Parser;
use miette::{IntoDiagnostic, Result};
use purchase_flow::application::orchestrator::OrchestratorConfig;
use purchase_flow::application::service::PurchaseService;
use purchase_flow::domain::catalog::Platform;
use purchase_flow::infrastructure::in_memory::InMemoryStore;
use purchase_flow::infrastructure::restore::RestoreSelector;
use purchase_flow::interfaces::csv::catalog_reader::CatalogReader;
use purchase_flow::interfaces::csv::report_writer::ReportWriter;
use purchase_flow::interfaces::csv::script_reader::ScriptReader;
use purchase_flow::interfaces::script::ScriptRunner;
use std::fs::File;
use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Product catalog CSV file (id, type, platform, store_id)
    catalog: PathBuf,

    /// Scenario script CSV file (action, product, detail)
    script: PathBuf,

    /// Platform whose store ids and restore strategy are used
    #[arg(long, default_value_t = Platform::current())]
    platform: Platform,

    /// Fail an in-flight purchase that gets no result within this many milliseconds
    #[arg(long)]
    purchase_timeout_ms: Option<u64>,

    /// Confirm successful purchases that match no request
    #[arg(long)]
    acknowledge_untracked: bool,

    /// Hold queued purchases this many milliseconds after a restore finishes
    #[arg(long)]
    restore_grace_ms: Option<u64>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_writer(io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| "purchase_flow=info".into()),
        )
        .init();

    let cli = Cli::parse();

    let catalog = CatalogReader::new(File::open(&cli.catalog).into_diagnostic()?)
        .read()
        .into_diagnostic()?;
    let script = ScriptReader::new(File::open(&cli.script).into_diagnostic()?);

    let config = OrchestratorConfig {
        platform: cli.platform,
        purchase_timeout: cli.purchase_timeout_ms.map(Duration::from_millis),
        acknowledge_untracked: cli.acknowledge_untracked,
        restore_grace: cli.restore_grace_ms.map(Duration::from_millis),
    };
    let store = InMemoryStore::new();
    let (service, events) = PurchaseService::spawn(
        Arc::new(store.clone()),
        RestoreSelector::platform_defaults(),
        config,
    );

    let stdout = io::stdout();
    let writer = ReportWriter::new(stdout.lock()).into_diagnostic()?;
    ScriptRunner::new(service, events, store, catalog, writer)
        .run(script)
        .await
        .into_diagnostic()?;

    Ok(())
}
