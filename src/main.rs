use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use sqlx::postgres::PgPoolOptions;
use tokio::sync::{mpsc, watch};
use tracing::info;

use achgate::achclient::AchServiceClient;
use achgate::config::AppConfig;
use achgate::controller::{Controller, ControllerConfig};
use achgate::depository::{DepositoryRepository, SqlDepositoryRepository};
use achgate::logging::init_logging;
use achgate::repository::{FileTransferRepository, SqlRepository, StaticRepository};
use achgate::transfers::{SqlTransferRepository, TransferRepository};

#[tokio::main]
async fn main() -> Result<()> {
    let env = std::env::var("ACHGATE_ENV").unwrap_or_else(|_| "dev".to_string());
    let config = AppConfig::load(&env)?;
    let _guard = init_logging(&config);
    info!(env = %env, "achgate starting");

    let ach = Arc::new(AchServiceClient::new(&config.ach_service_url)?);

    let controller_config = ControllerConfig {
        root_dir: PathBuf::from(&config.root_dir),
        interval: Duration::from_secs(config.interval_minutes * 60),
        batch_size: config.batch_size,
        keep_files: config.keep_files,
    };

    let postgres_url = config
        .postgres_url
        .as_deref()
        .context("postgres_url is required")?;
    let pool = PgPoolOptions::new()
        .max_connections(8)
        .connect(postgres_url)
        .await
        .context("connecting to PostgreSQL")?;

    let repo: Box<dyn FileTransferRepository> = if config.use_static_odfi {
        info!("using static ODFI repository (local development)");
        Box::new(StaticRepository::default())
    } else {
        Box::new(SqlRepository::new(pool.clone()))
    };
    let dep_repo: Arc<dyn DepositoryRepository> =
        Arc::new(SqlDepositoryRepository::new(pool.clone()));
    let transfer_repo: Arc<dyn TransferRepository> =
        Arc::new(SqlTransferRepository::new(pool));

    let controller = Controller::new(controller_config, repo.as_ref(), ach).await?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let (flush_incoming_tx, flush_incoming_rx) = mpsc::channel::<()>(1);
    let (flush_outgoing_tx, flush_outgoing_rx) = mpsc::channel::<()>(1);

    // operator flush hooks: SIGUSR1 flushes incoming, SIGUSR2 outgoing
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut usr1 = signal(SignalKind::user_defined1())?;
        let flush = flush_incoming_tx.clone();
        tokio::spawn(async move {
            while usr1.recv().await.is_some() {
                let _ = flush.try_send(());
            }
        });
        let mut usr2 = signal(SignalKind::user_defined2())?;
        let flush = flush_outgoing_tx.clone();
        tokio::spawn(async move {
            while usr2.recv().await.is_some() {
                let _ = flush.try_send(());
            }
        });
    }

    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("shutdown requested");
            let _ = shutdown_tx.send(true);
        }
    });

    controller
        .start_periodic_operations(
            shutdown_rx,
            flush_incoming_rx,
            flush_outgoing_rx,
            dep_repo,
            transfer_repo,
        )
        .await;

    drop((flush_incoming_tx, flush_outgoing_tx));
    info!("achgate stopped");
    Ok(())
}
