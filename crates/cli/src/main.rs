//! EV Charge CLI - find, book and manage charging-station slots.
//!
//! # Usage
//!
//! ```bash
//! # Sign in (password from --password or EVCHARGE_PASSWORD)
//! evcharge login -e driver@example.com
//!
//! # Stations free at a given time
//! evcharge stations free --at 2024-05-01T09:30:00Z
//!
//! # Book and list reservations
//! evcharge reservations book --title "North Lot" --start 2024-05-01T09:30:00Z --minutes 90
//! evcharge reservations list
//!
//! # Admin station management
//! evcharge admin stations add --title "Depot" --connectors 4 --lat 52.52 --lng 13.40
//! ```
//!
//! Every run restores the session from the persisted refresh token first.

#![cfg_attr(not(test), forbid(unsafe_code))]

use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use evcharge_client::{ClientConfig, EvChargeClient, SessionStore};
use evcharge_core::{ReservationId, StationId};
use sentry::integrations::tracing as sentry_tracing;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod commands;
mod error;
mod output;

use error::CliError;

#[derive(Parser)]
#[command(name = "evcharge")]
#[command(author, version, about = "EV charging-station booking")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Sign in and persist the session
    Login {
        /// Account email
        #[arg(short, long)]
        email: String,

        /// Account password
        #[arg(short, long, env = "EVCHARGE_PASSWORD", hide_env_values = true)]
        password: String,
    },
    /// Create an account and sign in
    Register {
        /// Account email
        #[arg(short, long)]
        email: String,

        /// Display name
        #[arg(short, long)]
        username: String,

        /// Account password
        #[arg(short, long, env = "EVCHARGE_PASSWORD", hide_env_values = true)]
        password: String,
    },
    /// Sign out and forget the persisted session
    Logout,
    /// Show the signed-in account
    Whoami,
    /// Email a password-reset link
    ForgotPassword {
        /// Account email
        #[arg(short, long)]
        email: String,
    },
    /// Change profile settings
    Profile {
        #[command(subcommand)]
        action: ProfileAction,
    },
    /// Search and book stations
    Stations {
        #[command(subcommand)]
        action: StationsAction,
    },
    /// Manage reservations
    Reservations {
        #[command(subcommand)]
        action: ReservationsAction,
    },
    /// Station administration (admin role required)
    Admin {
        #[command(subcommand)]
        action: AdminAction,
    },
}

#[derive(Subcommand)]
enum ProfileAction {
    /// Change the display name
    SetUsername {
        /// New display name
        username: String,
    },
    /// Change the password
    SetPassword {
        /// New password
        #[arg(long, env = "EVCHARGE_NEW_PASSWORD", hide_env_values = true)]
        password: String,
    },
}

#[derive(Subcommand)]
enum StationsAction {
    /// List stations free at a time (default: now)
    Free {
        /// RFC 3339 time, e.g. `2024-05-01T09:30:00Z`
        #[arg(long)]
        at: Option<DateTime<Utc>>,
    },
    /// Book a station directly
    Book {
        /// Station ID
        #[arg(long)]
        station_id: StationId,

        /// RFC 3339 start time
        #[arg(long)]
        start: DateTime<Utc>,
    },
}

#[derive(Subcommand)]
enum ReservationsAction {
    /// Show booking history
    List,
    /// Reserve a charging slot
    Book {
        /// Station title
        #[arg(long)]
        title: String,

        /// Connector sequence number
        #[arg(long, default_value_t = 1)]
        seq_num: u32,

        /// RFC 3339 start time
        #[arg(long)]
        start: DateTime<Utc>,

        /// Slot length in minutes
        #[arg(long)]
        minutes: u32,
    },
    /// Cancel a reservation
    Cancel {
        /// Reservation ID
        id: ReservationId,
    },
}

#[derive(Subcommand)]
enum AdminAction {
    /// Manage stations
    Stations {
        #[command(subcommand)]
        action: AdminStationsAction,
    },
}

#[derive(Subcommand)]
enum AdminStationsAction {
    /// List all stations
    List,
    /// Add a station
    Add {
        /// Station title
        #[arg(long)]
        title: String,

        /// Number of connectors
        #[arg(long)]
        connectors: u32,

        /// Latitude in degrees
        #[arg(long, allow_negative_numbers = true)]
        lat: f64,

        /// Longitude in degrees
        #[arg(long, allow_negative_numbers = true)]
        lng: f64,
    },
    /// Delete a station by name
    Delete {
        /// Station name
        name: String,
    },
}

/// Initialize Sentry error tracking and return guard that must be kept alive.
fn init_sentry() -> Option<sentry::ClientInitGuard> {
    let dsn = std::env::var("SENTRY_DSN").ok().filter(|d| !d.is_empty())?;

    let guard = sentry::init((
        dsn,
        sentry::ClientOptions {
            release: sentry::release_name!(),
            environment: std::env::var("SENTRY_ENVIRONMENT")
                .ok()
                .map(std::borrow::Cow::Owned),
            attach_stacktrace: true,
            ..Default::default()
        },
    ));

    tracing::info!("Sentry initialized");
    Some(guard)
}

/// Filter tracing events to Sentry event types.
fn sentry_event_filter(metadata: &tracing::Metadata<'_>) -> sentry_tracing::EventFilter {
    match *metadata.level() {
        tracing::Level::ERROR | tracing::Level::WARN => sentry_tracing::EventFilter::Event,
        tracing::Level::INFO | tracing::Level::DEBUG => sentry_tracing::EventFilter::Breadcrumb,
        _ => sentry_tracing::EventFilter::Ignore,
    }
}

/// Keep the Sentry user in step with the session.
fn track_sentry_user(session: &SessionStore) {
    let mut changes = session.subscribe();
    tokio::spawn(async move {
        loop {
            let user = changes.borrow_and_update().user.clone();
            sentry::configure_scope(|scope| {
                scope.set_user(user.map(|u| sentry::User {
                    id: Some(u.id.to_string()),
                    email: Some(u.email),
                    ..Default::default()
                }));
            });
            if changes.changed().await.is_err() {
                break;
            }
        }
    });
}

#[tokio::main]
async fn main() {
    // Load .env before anything reads the environment
    let _ = dotenvy::dotenv();

    // Initialize Sentry (must be done before tracing subscriber)
    let sentry_guard = init_sentry();

    // Logs go to stderr so command output on stdout stays clean
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "evcharge_client=info,evcharge_cli=info".into());

    let json_logs = std::env::var("EVCHARGE_LOG_FORMAT").is_ok_and(|f| f == "json");
    let json_layer = json_logs.then(|| {
        tracing_subscriber::fmt::layer()
            .json()
            .flatten_event(true)
            .with_writer(std::io::stderr)
    });
    let text_layer =
        (!json_logs).then(|| tracing_subscriber::fmt::layer().with_writer(std::io::stderr));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(json_layer)
        .with(text_layer)
        .with(sentry_tracing::layer().event_filter(sentry_event_filter))
        .init();

    let cli = Cli::parse();

    if let Err(e) = run(cli, sentry_guard.is_some()).await {
        tracing::error!("Command failed: {e}");
        drop(sentry_guard);
        std::process::exit(1);
    }
}

async fn run(cli: Cli, sentry_enabled: bool) -> Result<(), CliError> {
    let config = ClientConfig::from_env()?;
    let client = EvChargeClient::new(&config)?;

    if sentry_enabled {
        track_sentry_user(client.session());
    }
    client.start().await;

    match cli.command {
        Commands::Login { email, password } => {
            commands::auth::login(&client, &email, password).await?;
        }
        Commands::Register {
            email,
            username,
            password,
        } => commands::auth::register(&client, &email, &username, password).await?,
        Commands::Logout => commands::auth::logout(&client),
        Commands::Whoami => commands::auth::whoami(&client)?,
        Commands::ForgotPassword { email } => {
            commands::auth::forgot_password(&client, &email).await?;
        }
        Commands::Profile { action } => match action {
            ProfileAction::SetUsername { username } => {
                commands::profile::set_username(&client, &username).await?;
            }
            ProfileAction::SetPassword { password } => {
                commands::profile::set_password(&client, password).await?;
            }
        },
        Commands::Stations { action } => match action {
            StationsAction::Free { at } => {
                commands::stations::free(&client, at.unwrap_or_else(Utc::now)).await?;
            }
            StationsAction::Book { station_id, start } => {
                commands::stations::book(&client, station_id, start).await?;
            }
        },
        Commands::Reservations { action } => match action {
            ReservationsAction::List => commands::reservations::list(&client).await?,
            ReservationsAction::Book {
                title,
                seq_num,
                start,
                minutes,
            } => commands::reservations::book(&client, title, seq_num, start, minutes).await?,
            ReservationsAction::Cancel { id } => {
                commands::reservations::cancel(&client, id).await?;
            }
        },
        Commands::Admin { action } => match action {
            AdminAction::Stations { action } => match action {
                AdminStationsAction::List => commands::admin::list_stations(&client).await?,
                AdminStationsAction::Add {
                    title,
                    connectors,
                    lat,
                    lng,
                } => commands::admin::add_station(&client, title, connectors, lat, lng).await?,
                AdminStationsAction::Delete { name } => {
                    commands::admin::delete_station(&client, &name).await?;
                }
            },
        },
    }
    Ok(())
}
