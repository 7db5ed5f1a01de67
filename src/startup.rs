//! Application Startup
//!
//! Wiring of the three processes: gateway, archiver and bot worker. Each
//! process connects its dependencies, starts its bus subscriptions and shuts
//! them down again when stopped.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use axum::extract::FromRef;
use axum::Router;
use sqlx::PgPool;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

use crate::application::services::{
    register_bot_worker, register_storage_consumer, ArchiveService, BotWorker, ChannelService,
    ChannelServiceImpl,
};
use crate::config::Settings;
use crate::domain::MessageRepository;
use crate::infrastructure::archive_client::{ArchiveClient, HttpArchiveClient};
use crate::infrastructure::bus::{MessageBus, RedisStreamBus, Subscription};
use crate::infrastructure::database;
use crate::infrastructure::quote::{HttpQuoteSource, QuoteSource};
use crate::infrastructure::repositories::{PgChannelRepository, PgMessageRepository};
use crate::presentation::http::{archiver_router, gateway_router};
use crate::presentation::http::handlers::health;
use crate::presentation::middleware::JwtVerifier;
use crate::presentation::websocket::{
    register_fanout_consumers, spawn_presence_logger, ConnectionRegistry, FanoutConsumer,
    HistoryBridge,
};

/// Gateway state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub settings: Arc<Settings>,
    pub registry: Arc<ConnectionRegistry>,
    pub bus: Arc<dyn MessageBus>,
    pub channels: Arc<dyn ChannelService>,
    pub history: HistoryBridge,
    pub jwt: Arc<JwtVerifier>,
}

impl AppState {
    pub fn new(
        settings: Settings,
        bus: Arc<dyn MessageBus>,
        channels: Arc<dyn ChannelService>,
        archive: Arc<dyn ArchiveClient>,
    ) -> Self {
        let registry = Arc::new(ConnectionRegistry::new());
        let history = HistoryBridge::new(archive, Arc::clone(&registry), settings.history.limit);
        let jwt = Arc::new(JwtVerifier::new(&settings.jwt.secret));
        Self {
            settings: Arc::new(settings),
            registry,
            bus,
            channels,
            history,
            jwt,
        }
    }
}

impl FromRef<AppState> for Arc<JwtVerifier> {
    fn from_ref(state: &AppState) -> Self {
        Arc::clone(&state.jwt)
    }
}

/// Archiver state shared across handlers
#[derive(Clone)]
pub struct ArchiverState {
    pub archive: Arc<ArchiveService<dyn MessageRepository>>,
    /// Pool pinged by the health check, absent when running without Postgres
    pub db: Option<PgPool>,
}

async fn connect_bus(settings: &Settings) -> Result<Arc<dyn MessageBus>> {
    let bus = RedisStreamBus::connect(&settings.redis, settings.bus.clone()).await?;
    tracing::info!("Message bus connected");
    Ok(Arc::new(bus))
}

async fn connect_database(settings: &Settings) -> Result<PgPool> {
    let db = database::create_pool(&settings.database).await?;
    tracing::info!("Database connection pool created");
    if settings.database.run_migrations {
        database::run_migrations(&db).await?;
        tracing::info!("Database migrations applied");
    }
    Ok(db)
}

async fn shutdown_subscriptions(subscriptions: Vec<Subscription>) {
    for subscription in subscriptions {
        tracing::debug!(routing_key = %subscription.routing_key(), "Stopping consumer");
        subscription.shutdown().await;
    }
}

/// Gateway process
pub struct Gateway {
    listener: TcpListener,
    router: Router,
    state: AppState,
    subscriptions: Vec<Subscription>,
    presence: JoinHandle<()>,
}

impl Gateway {
    /// Build the gateway from settings
    pub async fn build(settings: Settings) -> Result<Self> {
        settings.jwt.validate()?;

        let db = connect_database(&settings).await?;
        let bus = connect_bus(&settings).await?;
        let channels: Arc<dyn ChannelService> = Arc::new(ChannelServiceImpl::new(
            Arc::new(PgChannelRepository::new(db)),
            Arc::clone(&bus),
        ));
        let archive: Arc<dyn ArchiveClient> = Arc::new(HttpArchiveClient::new(&settings.archiver)?);

        Self::with_dependencies(settings, bus, channels, archive).await
    }

    /// Build the gateway around already constructed dependencies
    pub async fn with_dependencies(
        settings: Settings,
        bus: Arc<dyn MessageBus>,
        channels: Arc<dyn ChannelService>,
        archive: Arc<dyn ArchiveClient>,
    ) -> Result<Self> {
        health::init_server_start();

        let addr = settings.server_addr();
        let presence_interval = Duration::from_secs(settings.websocket.presence_log_interval_secs);
        let state = AppState::new(settings, Arc::clone(&bus), Arc::clone(&channels), archive);

        let fanout = Arc::new(FanoutConsumer::new(Arc::clone(&state.registry), channels));
        let subscriptions = register_fanout_consumers(bus.as_ref(), fanout).await?;
        tracing::info!(subscriptions = subscriptions.len(), "Fan-out consumers started");

        let presence = spawn_presence_logger(Arc::clone(&state.registry), presence_interval);

        let listener = TcpListener::bind(&addr).await?;
        tracing::info!(addr = %listener.local_addr()?, "Gateway listening");

        Ok(Self {
            listener,
            router: gateway_router(state.clone()),
            state,
            subscriptions,
            presence,
        })
    }

    pub fn state(&self) -> &AppState {
        &self.state
    }

    /// Get the bound address
    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Serve until `shutdown` completes, then stop the consumers
    pub async fn run_until_stopped<F>(self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        axum::serve(self.listener, self.router)
            .with_graceful_shutdown(shutdown)
            .await?;

        self.presence.abort();
        shutdown_subscriptions(self.subscriptions).await;
        tracing::info!("Gateway stopped");
        Ok(())
    }
}

/// Archiver process
pub struct Archiver {
    listener: TcpListener,
    router: Router,
    subscription: Subscription,
}

impl Archiver {
    /// Build the archiver from settings
    pub async fn build(settings: Settings) -> Result<Self> {
        let db = connect_database(&settings).await?;
        let bus = connect_bus(&settings).await?;
        let repo: Arc<dyn MessageRepository> = Arc::new(PgMessageRepository::new(db.clone()));

        Self::with_dependencies(&settings, bus, repo, Some(db)).await
    }

    /// Build the archiver around already constructed dependencies
    pub async fn with_dependencies(
        settings: &Settings,
        bus: Arc<dyn MessageBus>,
        repo: Arc<dyn MessageRepository>,
        db: Option<PgPool>,
    ) -> Result<Self> {
        health::init_server_start();

        let archive: Arc<ArchiveService<dyn MessageRepository>> = Arc::new(ArchiveService::new(repo));
        let subscription = register_storage_consumer(bus.as_ref(), Arc::clone(&archive)).await?;
        tracing::info!(queue = %subscription.queue().label(), "Storage consumer started");

        let listener = TcpListener::bind(settings.archiver_addr()).await?;
        tracing::info!(addr = %listener.local_addr()?, "Archiver listening");

        Ok(Self {
            listener,
            router: archiver_router(ArchiverState { archive, db }),
            subscription,
        })
    }

    /// Get the bound address
    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Serve until `shutdown` completes, then stop the consumer
    pub async fn run_until_stopped<F>(self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        axum::serve(self.listener, self.router)
            .with_graceful_shutdown(shutdown)
            .await?;

        self.subscription.shutdown().await;
        tracing::info!("Archiver stopped");
        Ok(())
    }
}

/// Bot worker process
pub struct BotProcess {
    subscription: Subscription,
}

impl BotProcess {
    /// Build the bot worker from settings
    pub async fn build(settings: Settings) -> Result<Self> {
        let bus = connect_bus(&settings).await?;
        let quotes: Arc<dyn QuoteSource> = Arc::new(HttpQuoteSource::new(&settings.quote)?);
        Self::with_dependencies(bus, quotes).await
    }

    /// Build the bot worker around already constructed dependencies
    pub async fn with_dependencies(
        bus: Arc<dyn MessageBus>,
        quotes: Arc<dyn QuoteSource>,
    ) -> Result<Self> {
        let worker = Arc::new(BotWorker::new(quotes, Arc::clone(&bus)));
        let subscription = register_bot_worker(bus.as_ref(), worker).await?;
        tracing::info!(queue = %subscription.queue().label(), "Bot worker started");
        Ok(Self { subscription })
    }

    /// Consume bot requests until `shutdown` completes
    pub async fn run_until_stopped<F>(self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()> + Send,
    {
        shutdown.await;
        self.subscription.shutdown().await;
        tracing::info!("Bot worker stopped");
        Ok(())
    }
}

/// Resolves on ctrl-c.
pub async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
