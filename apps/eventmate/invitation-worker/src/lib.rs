//! Invitation Worker Service
//!
//! ## Architecture
//!
//! ```text
//! Redis Stream (events:invitations)
//!   ↓ (Consumer Group: invitation_notifiers)
//! TriggerWorker<InvitationCreated, InvitationNotifier>
//!   ↓ (one 120s invocation per created invitation)
//! Firestore (events/{id})  +  Identity Toolkit (accounts:lookup)
//!   ↓
//! SMTP relay (one email or none)
//! ```

use core_config::{
    Environment, FromEnv, firebase::FirebaseConfig, redis::RedisConfig, smtp::SmtpConfig,
};
use domain_invitations::{
    FirebaseAccountDirectory, FirestoreEventStore, InvitationCreated, InvitationNotifier,
    InvitationStream, MailTransport, NotifierConfig, SmtpMailer,
};
use eyre::{Result, WrapErr};
use std::sync::Arc;
use stream_worker::{TriggerWorker, WorkerConfig};
use tokio::signal;
use tokio::sync::watch;
use tracing::{error, info, warn};

/// Run the invitation worker until SIGINT or SIGTERM.
///
/// # Errors
///
/// Returns an error if configuration is missing or invalid, if the SMTP
/// transport or HTTP client cannot be built, or if Redis is unreachable at
/// startup. Failures inside an invocation never surface here.
pub async fn run() -> Result<()> {
    core_config::tracing::install_color_eyre();
    let environment = Environment::from_env();
    core_config::tracing::init_tracing(&environment);

    info!(
        name = env!("CARGO_PKG_NAME"),
        version = env!("CARGO_PKG_VERSION"),
        environment = ?environment,
        "Starting invitation worker"
    );

    let smtp_config = SmtpConfig::from_env().wrap_err("Failed to load SMTP configuration")?;
    let firebase_config =
        FirebaseConfig::from_env().wrap_err("Failed to load Firebase configuration")?;
    let redis_config = RedisConfig::from_env().wrap_err("Failed to load Redis configuration")?;
    let notifier_config =
        NotifierConfig::from_env().wrap_err("Failed to load notifier configuration")?;
    let worker_config = WorkerConfig::from_stream_def::<InvitationStream>()
        .with_env_overrides()
        .wrap_err("Failed to load worker configuration")?;

    // One transport for the whole process, checked once. A failed check is
    // reported but does not stop the worker.
    let mailer =
        Arc::new(SmtpMailer::new(&smtp_config).wrap_err("Failed to build SMTP transport")?);
    match mailer.verify().await {
        Ok(()) => info!(
            host = %smtp_config.host,
            port = smtp_config.port,
            sender = %mailer.sender(),
            "Mail transport configured successfully"
        ),
        Err(e) => error!(
            host = %smtp_config.host,
            port = smtp_config.port,
            error = %e,
            "Mail transport configuration error"
        ),
    }

    let http = reqwest::Client::builder()
        .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
        .build()
        .wrap_err("Failed to build HTTP client")?;
    if firebase_config.access_token.is_none() {
        warn!("FIREBASE_ACCESS_TOKEN is not set, requests are sent unauthenticated");
    }
    let store = FirestoreEventStore::new(http.clone(), firebase_config.clone());
    let directory = FirebaseAccountDirectory::new(http, firebase_config);

    let notifier = InvitationNotifier::new(store, directory, mailer, notifier_config)
        .wrap_err("Failed to build invitation notifier")?;

    info!("Connecting to Redis...");
    let redis = stream_worker::connect(&redis_config.url)
        .await
        .wrap_err("Failed to connect to Redis")?;
    info!("Connected to Redis successfully");

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        if let Err(e) = shutdown_signal().await {
            error!(error = %e, "Error waiting for shutdown signal");
        }
        let _ = shutdown_tx.send(true);
    });

    let worker = TriggerWorker::<InvitationCreated, _>::new(redis, notifier, worker_config);
    let result = worker.run(shutdown_rx).await;

    // Last owner of the notifier: dropping it closes the SMTP pool.
    drop(worker);
    info!("Mail transport released");

    result.wrap_err("Trigger worker failed")?;
    info!("Invitation worker stopped");
    Ok(())
}

/// Wait for a shutdown signal (SIGINT or SIGTERM)
async fn shutdown_signal() -> Result<()> {
    let ctrl_c = async {
        signal::ctrl_c().await.wrap_err("Failed to install Ctrl+C handler")
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .wrap_err("Failed to install SIGTERM handler")?
            .recv()
            .await;
        Ok::<(), eyre::Report>(())
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<Result<()>>();

    tokio::select! {
        res = ctrl_c => {
            res?;
            info!("Received Ctrl+C, initiating shutdown...");
        },
        res = terminate => {
            res?;
            info!("Received SIGTERM, initiating shutdown...");
        },
    }

    Ok(())
}
