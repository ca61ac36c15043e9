use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use diesel::PgConnection;
use diesel::r2d2::{ConnectionManager, Pool};
use diesel_migrations::{EmbeddedMigrations, MigrationHarness, embed_migrations};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use ressenti::auth::AdminConfig;
use ressenti::email::EmailService;
use ressenti::metrics::init_metrics;
use ressenti::stripe_client::StripeConfig;
use ressenti::web::{AppState, PgPool, start_web_server};

#[cfg(not(target_env = "msvc"))]
use tikv_jemallocator::Jemalloc;

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: Jemalloc = Jemalloc;

// Embed migrations into the binary
const MIGRATIONS: EmbeddedMigrations = embed_migrations!("migrations");

#[derive(Parser)]
#[command(
    name = "ressenti",
    about = "Backend for the Ressenti written-consultation service",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run pending migrations and start the web server
    Serve {
        /// Interface to bind
        #[arg(long, default_value = "0.0.0.0")]
        interface: String,
        /// Port to listen on
        #[arg(long, default_value_t = 8080)]
        port: u16,
    },
    /// Run pending database migrations and exit
    Migrate,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables from .env file
    dotenvy::dotenv().ok();

    let _sentry_guard = std::env::var("SENTRY_DSN").ok().map(|dsn| {
        sentry::init((
            dsn,
            sentry::ClientOptions {
                release: sentry::release_name!(),
                ..Default::default()
            },
        ))
    });

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,ressenti=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .with(sentry_tracing::layer())
        .init();

    let cli = Cli::parse();

    let database_url = std::env::var("DATABASE_URL").context("DATABASE_URL must be set")?;
    let manager = ConnectionManager::<PgConnection>::new(&database_url);
    let pool = Pool::builder()
        .max_size(10)
        .build(manager)
        .context("Failed to create database connection pool")?;
    info!("Database connection pool created");

    run_migrations(&pool).await?;

    match cli.command {
        Commands::Serve { interface, port } => {
            let stripe = StripeConfig::from_env()?;
            let admin = AdminConfig::from_env()?;
            let email = EmailService::new()?;
            let metrics_handle = init_metrics();

            let state = AppState::new(pool, stripe, admin, email, metrics_handle);
            start_web_server(interface, port, state).await?;
        }
        Commands::Migrate => {
            info!("Migrations up to date");
        }
    }

    Ok(())
}

async fn run_migrations(pool: &PgPool) -> Result<()> {
    let pool = pool.clone();
    tokio::task::spawn_blocking(move || {
        let mut conn = pool.get()?;

        let applied = conn
            .run_pending_migrations(MIGRATIONS)
            .map_err(|e| anyhow::anyhow!("Failed to run migrations: {e}"))?;
        for migration in &applied {
            info!("Applied migration {}", migration);
        }

        Ok::<(), anyhow::Error>(())
    })
    .await??;

    Ok(())
}
