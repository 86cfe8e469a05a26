mod admission;
mod api;
mod auth;
mod errors;
mod models;
mod notifications;
mod schema;
mod store;
#[cfg(test)]
mod test_utils;

use diesel_migrations::{embed_migrations, EmbeddedMigrations, MigrationHarness};
use diesel::PgConnection;

const MIGRATIONS: EmbeddedMigrations = embed_migrations!("migrations");

use anyhow::Result;
use chrono::Duration;
use clap::{Parser, Subcommand};
use diesel::Connection;
use rdkafka::config::ClientConfig;
use rdkafka::producer::FutureProducer;
use shared::AvailabilityWindow;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crate::admission::{AdmissionEngine, BookingSettings};
use crate::auth::AuthSettings;
use crate::models::{NewUser, UserChanges};
use crate::notifications::{KafkaNotifier, LogNotifier, NotificationDispatcher, Notifier};
use crate::store::{MemoryStore, PgStore, Store};

#[derive(Parser)]
#[command(name = "booking-service")]
struct Args {
    /// Postgres connection string; without it everything lives in memory
    #[arg(long, env = "DATABASE_URL")]
    database_url: Option<String>,

    /// Kafka bootstrap servers; without them push notifications are only logged
    #[arg(long, env = "KAFKA_BROKERS")]
    kafka_brokers: Option<String>,

    #[arg(long, default_value = "push-notifications")]
    notification_topic: String,

    #[arg(long, env = "PORT", default_value = "3000")]
    port: u16,

    #[arg(long, env = "JWT_SECRET")]
    jwt_secret: String,

    #[arg(long, default_value = "168")]
    jwt_expiry_hours: i64,

    #[arg(long, env = "COOKIE_SECURE")]
    cookie_secure: bool,

    /// Refuse new requests that overlap an already approved reservation
    #[arg(long)]
    reject_conflicting_requests: bool,

    /// Upcoming reservations shown per resource in the resource list
    #[arg(long, default_value = "3")]
    future_preview_limit: usize,

    #[arg(long, default_value = "365")]
    past_window_days: i64,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Create or promote an approved admin and print a session token for it
    CreateAdmin {
        #[arg(long)]
        email: String,
        #[arg(long)]
        name: String,
    },
}

impl Args {
    fn booking_settings(&self) -> BookingSettings {
        let past_window = Duration::days(self.past_window_days);
        BookingSettings {
            reject_conflicting_requests: self.reject_conflicting_requests,
            list_window: AvailabilityWindow {
                future_limit: Some(self.future_preview_limit),
                past_window,
            },
            detail_window: AvailabilityWindow {
                future_limit: None,
                past_window,
            },
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();
    let args = Args::parse();

    let store: Arc<dyn Store> = match &args.database_url {
        Some(database_url) => {
            // Run migrations first
            info!("Running database migrations...");
            let mut conn = PgConnection::establish(database_url)?;
            conn.run_pending_migrations(MIGRATIONS)
                .map_err(|e| anyhow::anyhow!("Migration error: {}", e))?;
            info!("Migrations completed successfully");

            Arc::new(PgStore::connect(database_url).await?)
        }
        None => {
            warn!("DATABASE_URL is not set, data will not survive a restart");
            Arc::new(MemoryStore::new())
        }
    };

    let auth = Arc::new(AuthSettings::new(
        args.jwt_secret.clone(),
        Duration::hours(args.jwt_expiry_hours),
        args.cookie_secure,
    ));

    if let Some(Command::CreateAdmin { email, name }) = &args.command {
        return create_admin(store.as_ref(), &auth, email, name).await;
    }

    let notifier: Arc<dyn Notifier> = match &args.kafka_brokers {
        Some(brokers) => {
            let producer: FutureProducer = ClientConfig::new()
                .set("bootstrap.servers", brokers)
                .set("message.timeout.ms", "5000")
                .create()?;
            info!("Publishing push notifications to {}", args.notification_topic);
            Arc::new(KafkaNotifier::new(producer, args.notification_topic.clone()))
        }
        None => {
            warn!("KAFKA_BROKERS is not set, push notifications will only be logged");
            Arc::new(LogNotifier)
        }
    };

    let notifications = NotificationDispatcher::new(store.clone(), notifier);
    let engine = AdmissionEngine::new(store.clone(), notifications, args.booking_settings());

    // Start the web server
    let app_state = api::AppState { store, engine, auth };

    let app = api::create_router(app_state);
    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", args.port)).await?;

    info!("Booking service web server started on port {}", args.port);

    axum::serve(listener, app).await?;

    Ok(())
}

async fn create_admin(store: &dyn Store, auth: &AuthSettings, email: &str, name: &str) -> Result<()> {
    let email = api::normalize_email(email)?;

    let user = match store.find_user_by_email(&email).await? {
        Some(existing) => {
            let changes = UserChanges {
                is_admin: Some(true),
                is_approved: Some(true),
                ..Default::default()
            };
            store
                .update_user(existing.id, changes)
                .await?
                .ok_or_else(|| anyhow::anyhow!("User {} disappeared during update", existing.id))?
        }
        None => {
            store
                .insert_user(NewUser {
                    name: name.to_string(),
                    email,
                    is_admin: true,
                    is_approved: true,
                })
                .await?
        }
    };

    let token = auth::issue_token(&user, auth)?;
    info!("Admin {} ({}) is ready", user.email, user.id);
    println!("{token}");
    Ok(())
}
