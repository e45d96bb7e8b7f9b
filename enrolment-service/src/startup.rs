//! Application startup and lifecycle management.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::middleware::from_fn;
use axum::{routing::get, Router};
use mongodb::{options::ClientOptions, Client};
use secrecy::ExposeSecret;
use service_core::error::AppError;
use service_core::middleware::{
    metrics::metrics_middleware,
    tracing::{http_request_span, request_id_middleware},
};
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;

use crate::config::EnrolmentConfig;
use crate::handlers;
use crate::ports::{AuditSink, EnrolmentHost, PaymentLedger, TransactionVerifier};
use crate::services::{
    EnrolmentFinalizer, EnrolmentRepository, IpaymuClient, LogMailer, Mailer,
    NotificationDispatcher, SmtpMailer,
};

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub config: EnrolmentConfig,
    pub verifier: Arc<dyn TransactionVerifier>,
    pub finalizer: Arc<EnrolmentFinalizer>,
    pub notifier: Arc<NotificationDispatcher>,
}

/// Collaborators the callback flow runs against.
#[derive(Clone)]
pub struct Ports {
    pub host: Arc<dyn EnrolmentHost>,
    pub ledger: Arc<dyn PaymentLedger>,
    pub audit: Arc<dyn AuditSink>,
    pub verifier: Arc<dyn TransactionVerifier>,
    pub mailer: Arc<dyn Mailer>,
}

impl AppState {
    pub fn new(config: EnrolmentConfig, ports: Ports) -> Self {
        let finalizer = EnrolmentFinalizer::new(
            ports.host.clone(),
            ports.ledger,
            ports.audit,
            config.enrol.method.clone(),
        );
        let notifier = NotificationDispatcher::new(ports.host, ports.mailer, config.mail.clone());

        Self {
            config,
            verifier: ports.verifier,
            finalizer: Arc::new(finalizer),
            notifier: Arc::new(notifier),
        }
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handlers::health_check))
        .route("/ready", get(handlers::readiness_check))
        .route("/metrics", get(handlers::metrics_endpoint))
        .route(
            "/callback",
            get(handlers::callback::ipaymu_callback).post(handlers::callback::ipaymu_callback),
        )
        .layer(from_fn(metrics_middleware))
        .layer(from_fn(request_id_middleware))
        .layer(TraceLayer::new_for_http().make_span_with(http_request_span))
        .with_state(state)
}

/// Application container for managing server lifecycle.
pub struct Application {
    port: u16,
    listener: TcpListener,
    router: Router,
}

impl Application {
    /// Build against MongoDB, the iPaymu API and SMTP from configuration.
    pub async fn build(config: EnrolmentConfig) -> Result<Self, AppError> {
        let mut client_options = ClientOptions::parse(config.database.url.expose_secret())
            .await
            .map_err(|e| {
                tracing::error!("Failed to parse MongoDB connection string: {}", e);
                AppError::DatabaseError(e.into())
            })?;
        client_options.app_name = Some(config.service_name.clone());
        client_options.server_selection_timeout = Some(Duration::from_secs(5));

        let client = Client::with_options(client_options).map_err(|e| {
            tracing::error!("Failed to create MongoDB client: {}", e);
            AppError::DatabaseError(e.into())
        })?;
        let db = client.database(&config.database.db_name);

        let repository = Arc::new(EnrolmentRepository::new(&db));
        repository.init_indexes().await.map_err(|e| {
            tracing::error!("Failed to initialize database indexes: {}", e);
            AppError::DatabaseError(e)
        })?;

        let ipaymu = IpaymuClient::new(config.ipaymu.clone())?;
        if ipaymu.is_configured() {
            tracing::info!(base_url = %config.ipaymu.api_base_url, "iPaymu client initialized");
        } else {
            tracing::warn!("iPaymu credentials not configured - every callback will fail verification");
        }

        let mailer: Arc<dyn Mailer> = if config.smtp.enabled {
            let smtp = SmtpMailer::new(config.smtp.clone())
                .map_err(|e| AppError::ConfigError(anyhow::anyhow!(e)))?;
            tracing::info!(host = %config.smtp.host, "SMTP mailer initialized");
            Arc::new(smtp)
        } else {
            tracing::warn!("SMTP disabled - enrolment emails will only be logged");
            Arc::new(LogMailer)
        };

        let ports = Ports {
            host: repository.clone(),
            ledger: repository.clone(),
            audit: repository,
            verifier: Arc::new(ipaymu),
            mailer,
        };

        Self::build_with_ports(config, ports).await
    }

    /// Build with caller-supplied collaborators. Port 0 binds a random port.
    pub async fn build_with_ports(config: EnrolmentConfig, ports: Ports) -> Result<Self, AppError> {
        let addr = SocketAddr::from(([0, 0, 0, 0], config.common.port));
        let listener = TcpListener::bind(addr).await.map_err(|e| {
            tracing::error!("Failed to bind HTTP listener to {}: {}", addr, e);
            AppError::from(e)
        })?;
        let port = listener.local_addr()?.port();

        let router = router(AppState::new(config, ports));

        tracing::info!("Enrolment service: HTTP on port {}", port);

        Ok(Self {
            port,
            listener,
            router,
        })
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub async fn run_until_stopped(self) -> std::io::Result<()> {
        axum::serve(self.listener, self.router).await
    }
}
