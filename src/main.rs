use std::sync::Arc;

use parcel_watch::carriers::CarrierRegistry;
use parcel_watch::classify::CandidateClassifier;
use parcel_watch::config::{ExtractionConfig, JmapConfig, RegistryConfig, SubmitConfig};
use parcel_watch::extraction::HttpExtractor;
use parcel_watch::jmap::{JmapClient, JmapMailSource, spawn_listener};
use parcel_watch::pipeline::DeliveryPipeline;
use parcel_watch::store::{LibSqlStore, Store};
use parcel_watch::submit::{ParcelClient, SubmissionGate};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let jmap_config = JmapConfig::from_env().unwrap_or_else(|| {
        eprintln!("Error: PARCEL_WATCH_JMAP_SESSION_URL not set");
        std::process::exit(1);
    });
    let submit_config = SubmitConfig::from_env().unwrap_or_else(|| {
        eprintln!("Error: PARCEL_WATCH_PARCEL_API_KEY not set");
        std::process::exit(1);
    });
    let extraction_config = ExtractionConfig::from_env().unwrap_or_else(|| {
        eprintln!("Error: PARCEL_WATCH_EXTRACTOR_URL not set");
        std::process::exit(1);
    });
    let registry_config = RegistryConfig::from_env();

    eprintln!("📦 Parcel Watch v{}", env!("CARGO_PKG_VERSION"));

    // ── Database ────────────────────────────────────────────────────
    let db_path = std::env::var("PARCEL_WATCH_DB_PATH")
        .unwrap_or_else(|_| "./data/parcel-watch.db".to_string());
    let store: Arc<dyn Store> = Arc::new(
        LibSqlStore::new_local(std::path::Path::new(&db_path))
            .await
            .unwrap_or_else(|e| {
                eprintln!("Error: Failed to open database at {db_path}: {e}");
                std::process::exit(1);
            }),
    );
    eprintln!("   Database: {db_path}");

    // One HTTP client for every outbound call; timeouts are set
    // per-request (the event stream must stay open indefinitely).
    let http = reqwest::Client::new();

    // ── Mail access ─────────────────────────────────────────────────
    let jmap = Arc::new(JmapClient::connect(http.clone(), &jmap_config).await?);
    let mail = Arc::new(JmapMailSource::new(Arc::clone(&jmap)));

    // ── Pipeline components ─────────────────────────────────────────
    let registry = Arc::new(CarrierRegistry::new(http.clone(), &registry_config));
    let classifier = CandidateClassifier::new(Arc::clone(&registry));
    let extractor = Arc::new(HttpExtractor::new(http.clone(), extraction_config));
    let parcel_api = Arc::new(ParcelClient::new(http.clone(), submit_config));
    let gate = SubmissionGate::new(
        Arc::clone(&store),
        Arc::clone(&registry),
        parcel_api,
    );

    let pipeline = Arc::new(DeliveryPipeline::new(
        mail,
        store,
        classifier,
        extractor,
        registry,
        gate,
    ));

    // ── Event listener ──────────────────────────────────────────────
    // The callback must not block: spawn the pass and return. Overlapping
    // triggers are dropped by the pipeline's own re-entrancy guard.
    let trigger_pipeline = Arc::clone(&pipeline);
    let listener = spawn_listener(jmap, move |_account_id| {
        let pipeline = Arc::clone(&trigger_pipeline);
        tokio::spawn(async move {
            pipeline.on_mail_state_change().await;
        });
    });

    // Process anything that arrived while we were down.
    pipeline.on_mail_state_change().await;

    tokio::signal::ctrl_c().await?;
    listener.close();
    Ok(())
}
