use anyhow::Context;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use jiwani_api::mailer::{LogMailer, Mailer, SmtpMailer};
use jiwani_api::state::{AppState, AuthConfig, Backends, UploadSettings};
use jiwani_api::app;
use jiwani_core::payment::PaymentGateway;
use jiwani_order::MockPaymentGateway;
use jiwani_store::app_config::Config;
use jiwani_store::{
    DbClient, MidtransGateway, PgUnitOfWork, StoreMemberRepository, StoreMenuRepository, StoreOrderRepository,
    StoreTopUpRepository,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "jiwani_api=debug,tower_http=debug,axum::rejection=trace".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::load().context("Failed to load config")?;
    tracing::info!("Starting Jiwani API on port {}", config.server.port);

    // Database
    let db = DbClient::new(&config.database).await.context("Failed to connect to Postgres")?;
    db.migrate().await.context("Failed to run migrations")?;
    let pool = db.pool.clone();

    // Payment gateway
    let gateway: Arc<dyn PaymentGateway> = if config.payment.mock {
        tracing::warn!("Using the mock payment gateway");
        Arc::new(MockPaymentGateway::new(config.payment.server_key.clone()))
    } else {
        Arc::new(MidtransGateway::new(&config.payment).context("Failed to build gateway client")?)
    };

    // Mail
    let mailer: Arc<dyn Mailer> = match SmtpMailer::from_config(&config.mail) {
        Some(smtp) => Arc::new(smtp),
        None => {
            tracing::warn!("No SMTP relay configured, mail will only be logged");
            Arc::new(LogMailer::new())
        }
    };

    let backends = Backends {
        menu_repo: Arc::new(StoreMenuRepository::new(pool.clone())),
        member_repo: Arc::new(StoreMemberRepository::new(pool.clone())),
        order_repo: Arc::new(StoreOrderRepository::new(pool.clone())),
        top_up_repo: Arc::new(StoreTopUpRepository::new(pool.clone())),
        uow: Arc::new(PgUnitOfWork::new(pool)),
    };

    let app_state = AppState::new(
        backends,
        gateway,
        mailer,
        AuthConfig {
            secret: config.auth.jwt_secret.clone(),
            expiration: config.auth.jwt_expiration_seconds,
            bcrypt_cost: config.auth.bcrypt_cost,
        },
        UploadSettings {
            dir: PathBuf::from(&config.uploads.dir),
            max_bytes: config.uploads.max_bytes,
        },
        config.server.public_url.clone(),
    );

    let app = app(app_state);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.server.port));
    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await.context("Failed to bind listener")?;
    axum::serve(listener, app).await.context("Server error")?;
    Ok(())
}
