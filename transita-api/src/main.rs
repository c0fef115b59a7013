use anyhow::Context;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use transita_api::{app, state::AuthConfig, AppState};
use transita_booking::notifier::ChangeNotifier;
use transita_booking::repository::BookingStore;
use transita_booking::view::SessionCaches;
use transita_booking::{BookingPresenter, LifecycleEngine, PaymentReconciler};
use transita_booking::reconcile::MockGateway;
use transita_core::notify::LogSink;
use transita_core::payment::GatewayKind;
use transita_inventory::ReferenceDirectory;
use transita_store::{BookingFeed, DbClient, MemoryStore, PgStore};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "transita_api=debug,tower_http=debug,axum::rejection=trace".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = transita_store::app_config::Config::load().context("Failed to load config")?;
    tracing::info!("Starting Transita API on port {}", config.server.port);

    let (store, directory): (Arc<dyn BookingStore>, Arc<dyn ReferenceDirectory>) =
        match &config.database.url {
            Some(url) => {
                let db = DbClient::new(url).await.context("Failed to connect to Postgres")?;
                db.migrate().await.context("Failed to run migrations")?;
                let pg = Arc::new(PgStore::new(
                    &db,
                    BookingFeed::new(config.business_rules.feed_capacity),
                ));
                (pg.clone(), pg)
            }
            None => {
                tracing::warn!("No database configured; using the in-memory store");
                let mem = Arc::new(MemoryStore::new());
                (mem.clone(), mem)
            }
        };

    let caches = Arc::new(SessionCaches::new());
    let engine = Arc::new(LifecycleEngine::new(
        store.clone(),
        caches.schedules.clone(),
        config.business_rules.service_fee,
    ));
    // Real gateway adapters are configured per deployment; the mock keeps
    // the full flow exercisable out of the box.
    let reconciler = Arc::new(
        PaymentReconciler::new(store.clone(), directory.clone(), engine.clone())
            .with_gateway(Arc::new(MockGateway::new(GatewayKind::Stripe)))
            .with_gateway(Arc::new(MockGateway::new(GatewayKind::Fonepay))),
    );
    let presenter = Arc::new(BookingPresenter::new(
        store.clone(),
        directory.clone(),
        caches.clone(),
    ));

    // Change notifier: consumes the record-changed feed, pushes user events.
    let (notify_tx, _) = tokio::sync::broadcast::channel(256);
    let notifier = ChangeNotifier::new(Arc::new(LogSink), notify_tx.clone());
    let feed = store.watch();
    tokio::spawn(notifier.run(feed));

    let app_state = AppState {
        store,
        directory,
        engine,
        reconciler,
        presenter,
        caches,
        notify_tx,
        auth: AuthConfig {
            secret: config.auth.jwt_secret.clone(),
            expiration: config.auth.jwt_expiration_seconds,
        },
    };

    let app = app(app_state);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.server.port));
    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await.context("Failed to bind")?;
    axum::serve(listener, app).await.context("Server error")?;
    Ok(())
}
