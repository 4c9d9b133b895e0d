use clap::Parser;
use lkm_topup::application::engine::{EnginePorts, TopupEngine};
use lkm_topup::application::gateways::GatewayRegistry;
use lkm_topup::config::{EngineSettings, SettingsArgs};
use lkm_topup::domain::config::TopupConfig;
use lkm_topup::domain::ports::{ConfigStoreRef, TopupRepositoryRef, WalletLedgerRef};
use lkm_topup::infrastructure::clock::SystemClock;
use lkm_topup::infrastructure::gateways::{JsonWebhookAdapter, ManualAdapter};
use lkm_topup::infrastructure::in_memory::{
    InMemoryConfigStore, InMemoryTopupRepository, InMemoryWalletLedger,
};
use lkm_topup::interfaces::csv::topup_writer::TopupWriter;
use lkm_topup::interfaces::script::command_reader::CommandReader;
use lkm_topup::interfaces::script::runner::ScriptRunner;
use miette::{IntoDiagnostic, Result};
use std::fs::File;
use std::io::{self, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::oneshot;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Command script, one JSON operation per line
    script: PathBuf,

    /// Top-up configuration (JSON). Replaces the stored configuration on startup.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Path to persistent database (optional). If provided, uses RocksDB.
    #[arg(long)]
    db_path: Option<PathBuf>,

    /// Write a CSV report of all top-ups here after the script finishes
    #[arg(long)]
    report: Option<PathBuf>,

    /// Base URL for gateway checkout redirects
    #[arg(
        long,
        env = "LKM_CHECKOUT_BASE_URL",
        default_value = "https://pay.example.com"
    )]
    checkout_base_url: String,

    #[command(flatten)]
    settings: SettingsArgs,
}

struct Stores {
    repository: TopupRepositoryRef,
    config_store: ConfigStoreRef,
    ledger: WalletLedgerRef,
}

#[cfg(feature = "storage-rocksdb")]
fn persistent_stores(db_path: &Path) -> Result<Stores> {
    use lkm_topup::infrastructure::rocksdb::RocksDBStore;

    let store = RocksDBStore::open(db_path).into_diagnostic()?;
    info!(path = %db_path.display(), "Using RocksDB storage");
    Ok(Stores {
        repository: Arc::new(store.clone()),
        config_store: Arc::new(store.clone()),
        ledger: Arc::new(store),
    })
}

#[cfg(not(feature = "storage-rocksdb"))]
fn persistent_stores(db_path: &Path) -> Result<Stores> {
    tracing::warn!(
        path = %db_path.display(),
        "Built without the storage-rocksdb feature; falling back to in-memory storage"
    );
    Ok(in_memory_stores())
}

fn in_memory_stores() -> Stores {
    Stores {
        repository: Arc::new(InMemoryTopupRepository::new()),
        config_store: Arc::new(InMemoryConfigStore::new()),
        ledger: Arc::new(InMemoryWalletLedger::new()),
    }
}

fn load_config(path: &Path) -> Result<TopupConfig> {
    let file = File::open(path).into_diagnostic()?;
    serde_json::from_reader(BufReader::new(file)).into_diagnostic()
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();
    let settings = EngineSettings::from(cli.settings);

    let stores = match &cli.db_path {
        Some(db_path) => persistent_stores(db_path)?,
        None => in_memory_stores(),
    };
    if let Some(path) = &cli.config {
        let config = load_config(path)?;
        stores.config_store.save(&config).await.into_diagnostic()?;
        info!(path = %path.display(), "Loaded top-up configuration");
    }

    let gateways = GatewayRegistry::new()
        .with(Arc::new(JsonWebhookAdapter::new("yookassa", &cli.checkout_base_url)))
        .with(Arc::new(JsonWebhookAdapter::new("stripe", &cli.checkout_base_url)))
        .with(Arc::new(ManualAdapter));

    let engine = TopupEngine::new(
        EnginePorts {
            repository: stores.repository,
            config_store: stores.config_store,
            ledger: stores.ledger,
            gateways,
            clock: Arc::new(SystemClock),
        },
        settings,
    );

    let (stop, stopped) = oneshot::channel::<()>();
    let sweeper = tokio::spawn(engine.sweeper().run(async move {
        let _ = stopped.await;
    }));

    // Process commands
    let file = File::open(&cli.script).into_diagnostic()?;
    let reader = CommandReader::new(BufReader::new(file));
    let mut runner = ScriptRunner::new(&engine);
    let stdout = io::stdout();
    let mut out = stdout.lock();
    for line in reader.lines() {
        match line {
            Ok(script_line) => {
                let outcome = runner.run_line(script_line).await;
                serde_json::to_writer(&mut out, &outcome).into_diagnostic()?;
                writeln!(out).into_diagnostic()?;
            }
            Err(e) => {
                eprintln!("Error reading command: {}", e);
            }
        }
    }
    out.flush().into_diagnostic()?;

    let _ = stop.send(());
    sweeper.await.into_diagnostic()?;

    if let Some(path) = &cli.report {
        let topups = engine.export_topups().await.into_diagnostic()?;
        let file = File::create(path).into_diagnostic()?;
        TopupWriter::new(file)
            .write_topups(&topups)
            .into_diagnostic()?;
        info!(path = %path.display(), count = topups.len(), "Wrote top-up report");
    }

    Ok(())
}
