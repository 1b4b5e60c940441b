use anyhow::Context;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tourbook_api::{app, AppState};
use tourbook_booking::{GatewayRegistry, InMemorySessionStore, PaymentServices, SessionStore};
use tourbook_catalog::{DepositPolicy, OccupancyBlocker, OccupancyLedger, StaticCatalog, Tour, TourCatalog};
use tourbook_core::{
    BookingEventPublisher, InMemoryReservationRepository, LogEventPublisher, ReservationRepository,
};
use tourbook_store::app_config::{Config, EventsBackend, SessionBackend, StorageBackend};
use tourbook_store::{
    DbClient, KafkaEventPublisher, PgReservationRepository, PgTourCatalog, RedisSessionStore,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "tourbook_api=debug,tourbook_booking=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::load().context("Failed to load config")?;
    config.validate().context("Invalid config")?;
    tracing::info!("Starting Tourbook API on port {}", config.server.port);

    let state = build_state(&config).await?;
    let app = app(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.server.port));
    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

async fn build_state(config: &Config) -> anyhow::Result<AppState> {
    let mut business_rules = config.business_rules.clone();

    let (reservations, catalog, occupancy): (
        Arc<dyn ReservationRepository>,
        Arc<dyn TourCatalog>,
        Arc<dyn OccupancyLedger>,
    ) = match config.storage.backend {
        StorageBackend::Postgres => {
            let url = &config
                .database
                .as_ref()
                .context("database.url is required for postgres storage")?
                .url;
            let db = DbClient::new(url).await.context("Failed to connect to Postgres")?;
            db.migrate().await.context("Failed to run migrations")?;
            business_rules = db
                .fetch_business_rules(business_rules)
                .await
                .context("Failed to load business rules")?;
            let tours = Arc::new(PgTourCatalog::new(db.pool.clone()));
            (
                Arc::new(PgReservationRepository::new(db.pool.clone())),
                tours.clone(),
                tours,
            )
        }
        StorageBackend::Memory => {
            tracing::warn!("Using in-memory reservation storage; bookings do not survive a restart");
            let tours = match &config.storage.tours_file {
                Some(path) => load_tours(path)?,
                None => Vec::new(),
            };
            tracing::info!("Catalog seeded with {} tours", tours.len());
            let tours = Arc::new(StaticCatalog::new(tours));
            (
                Arc::new(InMemoryReservationRepository::new()),
                tours.clone(),
                tours,
            )
        }
    };

    let sessions: Arc<dyn SessionStore> = match config.sessions.backend {
        SessionBackend::Redis => {
            let url = &config
                .redis
                .as_ref()
                .context("redis.url is required for redis sessions")?
                .url;
            Arc::new(
                RedisSessionStore::new(
                    url,
                    business_rules.session_ttl_seconds,
                    business_rules.session_lock_seconds,
                )
                .context("Failed to create Redis client")?,
            )
        }
        SessionBackend::Memory => Arc::new(InMemorySessionStore::with_lock_ttl(Duration::from_secs(
            business_rules.session_lock_seconds,
        ))),
    };

    let events: Arc<dyn BookingEventPublisher> = match config.events.backend {
        EventsBackend::Kafka => {
            let brokers = &config
                .kafka
                .as_ref()
                .context("kafka.brokers is required for kafka events")?
                .brokers;
            Arc::new(KafkaEventPublisher::new(brokers).context("Failed to create Kafka producer")?)
        }
        EventsBackend::Log => Arc::new(LogEventPublisher),
    };
    let events: Arc<dyn BookingEventPublisher> = Arc::new(OccupancyBlocker::new(occupancy, events));

    let gateways = GatewayRegistry::from_config(&config.payments)
        .context("Failed to configure payment gateways")?;
    let deposit_policy = DepositPolicy::new(business_rules.deposit_ratio_bps)
        .context("Invalid deposit ratio")?;
    tracing::info!(
        deposit_ratio_bps = deposit_policy.ratio_bps(),
        currency = %business_rules.currency,
        "Business rules loaded"
    );

    let services = Arc::new(PaymentServices {
        reservations,
        catalog,
        gateways: Arc::new(gateways),
        events,
        deposit_policy,
        default_currency: business_rules.currency,
    });

    Ok(AppState::new(services, sessions))
}

fn load_tours(path: &str) -> anyhow::Result<Vec<Tour>> {
    let raw = std::fs::read_to_string(path).with_context(|| format!("Failed to read {}", path))?;
    serde_json::from_str(&raw).with_context(|| format!("Failed to parse tours from {}", path))
}
