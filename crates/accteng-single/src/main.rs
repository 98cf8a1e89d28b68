use std::sync::Arc;

use accteng_blob_fs::FsBlobStore;
use accteng_core::EventStore;
use accteng_core::config::EngineConfig;
use accteng_server::{EngineState, build_router};
use accteng_storage_sqlite::{
    SqliteAccountStore, SqliteEventStore, SqliteOAuthStore, SqliteRepoStore,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt().pretty().init();

    let config_path =
        std::env::var("CONFIG_PATH").unwrap_or_else(|_| "config/single.toml".to_string());
    let config = EngineConfig::load(&config_path)?;

    // Ensure the data directory exists
    std::fs::create_dir_all("data")?;

    // Connect real storage backends
    let account_store = SqliteAccountStore::connect(&config.database_url).await?;
    let repo_store = SqliteRepoStore::connect(&config.database_url).await?;
    let event_store = SqliteEventStore::connect(&config.database_url).await?;
    let oauth_store = SqliteOAuthStore::connect(&config.database_url).await?;

    let blobs_path = config.blobs.as_deref().unwrap_or("data/blobs");
    let blob_store = FsBlobStore::new(blobs_path)?;

    let addr = format!("0.0.0.0:{}", config.port);

    // Extract TLS config before moving config into Arc
    let tls_config = config.tls.clone();
    let pds_hostname = config.pds_hostname.clone();

    // Resume sequencer from the last persisted event sequence number.
    let max_seq = event_store.get_max_seq().await?;
    let sequencer = accteng_server::Sequencer::new(max_seq + 1, 1024);
    let relay_notifier = None; // No relay configured by default

    let event_store: Arc<dyn EventStore> = Arc::new(event_store);

    let mut state = EngineState::new(
        Arc::new(account_store),
        Arc::new(repo_store),
        Arc::new(blob_store),
        Arc::new(oauth_store),
        Arc::new(config),
    );
    state.sequencer = Some(sequencer);
    state.relay_notifier = relay_notifier;
    state.event_store = Some(event_store);

    accteng_server::ensure_account(&state).await?;

    let cleanup_interval =
        std::time::Duration::from_secs(state.config.oauth.cleanup_interval_secs);
    let cleanup_worker =
        accteng_oauth::CleanupWorker::new(state.oauth_store.clone(), cleanup_interval);
    tokio::spawn(cleanup_worker.run());

    let router = build_router(state);

    if let Some(tls_config) = tls_config {
        use futures::StreamExt;
        use rustls_acme::{AcmeConfig, caches::DirCache};

        std::fs::create_dir_all(&tls_config.cert_cache)?;

        let mut acme_state = AcmeConfig::new(tls_config.domains)
            .contact([format!("mailto:{}", tls_config.contact_email)])
            .cache(DirCache::new(tls_config.cert_cache))
            .directory_lets_encrypt(tls_config.production)
            .state();
        let acceptor = acme_state.axum_acceptor(acme_state.default_rustls_config());
        tokio::spawn(async move {
            loop {
                acme_state.next().await;
            }
        });

        // HTTP -> HTTPS redirect on port 80
        tokio::spawn(http_redirect_server(pds_hostname));

        tracing::info!("accteng-single starting HTTPS on {}", addr);
        let sock_addr: std::net::SocketAddr = addr.parse()?;
        axum_server::bind(sock_addr)
            .acceptor(acceptor)
            .serve(router.into_make_service())
            .await?;
    } else {
        tracing::info!("accteng-single starting on {}", addr);
        let listener = tokio::net::TcpListener::bind(&addr).await?;
        axum::serve(listener, router).await?;
    }

    Ok(())
}

async fn http_redirect_server(pds_hostname: String) {
    let app = axum::Router::new().fallback(move |req: axum::extract::Request| {
        let host = pds_hostname.clone();
        async move {
            let target = format!("https://{}{}", host, req.uri());
            axum::response::Redirect::permanent(&target)
        }
    });
    let Ok(listener) = tokio::net::TcpListener::bind("0.0.0.0:80").await else {
        tracing::warn!("Could not bind port 80 for HTTP redirect");
        return;
    };
    tracing::info!("HTTP redirect listening on 0.0.0.0:80");
    let _ = axum::serve(listener, app).await;
}
