use std::net::SocketAddr;
use std::sync::Arc;

use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use tokio::signal;
use tracing_subscriber::EnvFilter;

use braincheck::analysis::{ImageAnalyzer, OpenRouterVision, VisionAnalyzer};
use braincheck::auth::password;
use braincheck::config::{Config, FirstSuperuser};
use braincheck::db;
use braincheck::db::users::NewUser;
use braincheck::email::{Mailer, SystemMailer};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    let config = Config::from_env().expect("Failed to load configuration");

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(&config.log_level)
        }))
        .init();

    tracing::info!("Starting brainCHECK");

    let pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(&config.database_url)
        .await
        .expect("Failed to connect to database");

    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .expect("Failed to run migrations");

    tracing::info!("Migrations applied");

    if let Some(ref first) = config.first_superuser {
        seed_superuser(&pool, first).await?;
    }

    if config.analysis.api_key.is_empty() {
        tracing::warn!("ANALYSIS_API_KEY is empty, analysis requests will likely be rejected");
    }
    let vision = OpenRouterVision::new(&config.analysis)?;
    let analyzer: Arc<dyn ImageAnalyzer> = Arc::new(VisionAnalyzer::new(vision));

    let mailer: Option<Arc<dyn Mailer>> = config.smtp.as_ref().and_then(|smtp| {
        match SystemMailer::new(smtp) {
            Ok(mailer) => {
                tracing::info!("SMTP configured");
                Some(Arc::new(mailer) as Arc<dyn Mailer>)
            }
            Err(e) => {
                tracing::warn!("SMTP not available: {e}");
                None
            }
        }
    });

    let addr = SocketAddr::new(config.host, config.port);
    let app = braincheck::build_app(pool, config, analyzer, mailer);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("Listening on {addr}");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

/// Create the configured superuser unless an account with that email exists.
async fn seed_superuser(pool: &PgPool, first: &FirstSuperuser) -> Result<(), Box<dyn std::error::Error>> {
    if db::users::find_by_email(pool, &first.email).await?.is_some() {
        return Ok(());
    }

    let pw_hash = password::hash(&first.password)?;
    let user = db::users::create(
        pool,
        &NewUser {
            email: &first.email,
            password_hash: Some(&pw_hash),
            full_name: None,
            is_active: true,
            is_superuser: true,
        },
    )
    .await?;

    tracing::info!(user_id = %user.id, "Seeded first superuser {}", user.email);
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received, starting graceful shutdown");
}
