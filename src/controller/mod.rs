//! File Transfer Controller
//!
//! Owns the periodic ACH cycle: download and process inbound/return files,
//! merge pending transfers and micro-deposits into mergable files, and
//! upload files whose cutoff falls within the next tick. Runs as a single
//! cooperative loop with two operator flush channels and a shutdown signal;
//! phases never overlap within a tick.

pub mod cutoffs;
pub mod error;
pub mod inbound;
pub mod merge;
pub mod returns;
pub mod upload;

pub use cutoffs::files_near_cutoff;
pub use error::ControllerError;
pub use merge::{group_transfers, merge_groupable_transfer, merge_micro_deposit, merge_transfer};
pub use returns::{process_return_entry, update_depositories_from_return_code, ReturnCode};

use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{error, info, warn};

use crate::achclient::AchFileSource;
use crate::agent::{AgentError, FileTransferAgent, FtpAgent, SftpAgent};
use crate::depository::DepositoryRepository;
use crate::metrics::ControllerMetrics;
use crate::repository::{
    CutoffTime, FileTransferConfig, FileTransferRepository, FtpConfig, SftpConfig,
};
use crate::store::MergableFile;
use crate::transfers::TransferRepository;

/// Builds agents for a transport config. Swapped out in tests.
pub trait TransportFactory: Send + Sync {
    fn connect_ftp(
        &self,
        cfg: &FtpConfig,
        conf: FileTransferConfig,
    ) -> Result<Box<dyn FileTransferAgent>, AgentError>;

    fn connect_sftp(
        &self,
        cfg: &SftpConfig,
        conf: FileTransferConfig,
    ) -> Result<Box<dyn FileTransferAgent>, AgentError>;
}

pub struct DefaultTransportFactory;

impl TransportFactory for DefaultTransportFactory {
    fn connect_ftp(
        &self,
        cfg: &FtpConfig,
        conf: FileTransferConfig,
    ) -> Result<Box<dyn FileTransferAgent>, AgentError> {
        Ok(Box::new(FtpAgent::connect(cfg, conf)?))
    }

    fn connect_sftp(
        &self,
        cfg: &SftpConfig,
        conf: FileTransferConfig,
    ) -> Result<Box<dyn FileTransferAgent>, AgentError> {
        Ok(Box::new(SftpAgent::connect(cfg, conf)?))
    }
}

#[derive(Debug, Clone)]
pub struct ControllerConfig {
    /// Working directory for merged and downloaded files.
    pub root_dir: PathBuf,
    /// Time between periodic ticks.
    pub interval: Duration,
    /// Cursor batch size for pending transfers and micro-deposits.
    pub batch_size: usize,
    /// Keep local files after a tick even when an ODFI asks for cleanup.
    pub keep_files: bool,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            root_dir: PathBuf::from("./storage"),
            interval: Duration::from_secs(10 * 60),
            batch_size: 100,
            keep_files: false,
        }
    }
}

pub struct Controller {
    root_dir: PathBuf,
    interval: Duration,
    batch_size: usize,
    keep_files: bool,
    cutoff_times: Vec<CutoffTime>,
    file_transfer_configs: Vec<FileTransferConfig>,
    ftp_configs: Vec<FtpConfig>,
    sftp_configs: Vec<SftpConfig>,
    ach: Arc<dyn AchFileSource>,
    transports: Arc<dyn TransportFactory>,
    metrics: Arc<ControllerMetrics>,
}

impl Controller {
    /// Load the per-ODFI configuration once and set up the working
    /// directory. Configuration is immutable for the controller's lifetime.
    pub async fn new(
        cfg: ControllerConfig,
        repo: &dyn FileTransferRepository,
        ach: Arc<dyn AchFileSource>,
    ) -> Result<Self, ControllerError> {
        Self::with_transports(cfg, repo, ach, Arc::new(DefaultTransportFactory)).await
    }

    pub async fn with_transports(
        cfg: ControllerConfig,
        repo: &dyn FileTransferRepository,
        ach: Arc<dyn AchFileSource>,
        transports: Arc<dyn TransportFactory>,
    ) -> Result<Self, ControllerError> {
        fs::create_dir_all(&cfg.root_dir)?;
        let cutoff_times = repo.get_cutoff_times().await?;
        let file_transfer_configs = repo.get_file_transfer_configs().await?;
        let ftp_configs = repo.get_ftp_configs().await?;
        let sftp_configs = repo.get_sftp_configs().await?;
        info!(
            cutoffs = cutoff_times.len(),
            configs = file_transfer_configs.len(),
            ftp = ftp_configs.len(),
            sftp = sftp_configs.len(),
            root_dir = %cfg.root_dir.display(),
            "file transfer controller ready"
        );
        Ok(Self {
            root_dir: cfg.root_dir,
            interval: cfg.interval,
            batch_size: cfg.batch_size,
            keep_files: cfg.keep_files,
            cutoff_times,
            file_transfer_configs,
            ftp_configs,
            sftp_configs,
            ach,
            transports,
            metrics: Arc::new(ControllerMetrics::new()),
        })
    }

    pub fn metrics(&self) -> Arc<ControllerMetrics> {
        self.metrics.clone()
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    pub fn cutoff_times(&self) -> &[CutoffTime] {
        &self.cutoff_times
    }

    /// "ftp" when an FTP config exists for the routing number, else "sftp",
    /// else "unknown". FTP wins when both are configured.
    pub fn find_transfer_type(&self, routing_number: &str) -> &'static str {
        if self
            .ftp_configs
            .iter()
            .any(|c| c.routing_number == routing_number)
        {
            return "ftp";
        }
        if self
            .sftp_configs
            .iter()
            .any(|c| c.routing_number == routing_number)
        {
            return "sftp";
        }
        "unknown"
    }

    pub fn find_file_transfer_config(
        &self,
        routing_number: &str,
    ) -> Option<&FileTransferConfig> {
        self.file_transfer_configs
            .iter()
            .find(|c| c.routing_number == routing_number)
    }

    /// Open an agent for the routing number's configured transport.
    fn connect(
        &self,
        routing_number: &str,
        conf: FileTransferConfig,
    ) -> Result<Box<dyn FileTransferAgent>, ControllerError> {
        if let Some(cfg) = self
            .ftp_configs
            .iter()
            .find(|c| c.routing_number == routing_number)
        {
            return Ok(self.transports.connect_ftp(cfg, conf)?);
        }
        if let Some(cfg) = self
            .sftp_configs
            .iter()
            .find(|c| c.routing_number == routing_number)
        {
            return Ok(self.transports.connect_sftp(cfg, conf)?);
        }
        Err(ControllerError::MissingConfig(routing_number.to_string()))
    }

    /// Run the periodic loop until shutdown flips or every flush sender is
    /// dropped. Signals arriving mid-tick coalesce in the capacity-1 flush
    /// channels; shutdown takes effect between ticks, never mid-phase.
    pub async fn start_periodic_operations(
        &self,
        mut shutdown: watch::Receiver<bool>,
        mut flush_incoming: mpsc::Receiver<()>,
        mut flush_outgoing: mpsc::Receiver<()>,
        dep_repo: Arc<dyn DepositoryRepository>,
        transfer_repo: Arc<dyn TransferRepository>,
    ) {
        info!(
            interval_secs = self.interval.as_secs(),
            batch_size = self.batch_size,
            "starting periodic file operations"
        );

        let mut ticker = interval_at(Instant::now() + self.interval, self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.run_tick(dep_repo.as_ref(), transfer_repo.as_ref()).await;
                }
                flush = flush_incoming.recv() => {
                    if flush.is_none() {
                        break;
                    }
                    info!("manual flush: incoming");
                    self.run_incoming(dep_repo.as_ref(), transfer_repo.as_ref()).await;
                }
                flush = flush_outgoing.recv() => {
                    if flush.is_none() {
                        break;
                    }
                    info!("manual flush: outgoing");
                    self.run_outgoing(dep_repo.as_ref(), transfer_repo.as_ref()).await;
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
        info!("periodic file operations stopped");
    }

    /// One full tick: inbound processing, then merge + upload, then local
    /// cleanup. Phases run strictly in order.
    pub async fn run_tick(
        &self,
        dep_repo: &dyn DepositoryRepository,
        transfer_repo: &dyn TransferRepository,
    ) {
        self.run_incoming(dep_repo, transfer_repo).await;
        self.run_outgoing(dep_repo, transfer_repo).await;
        self.cleanup_local_directories();

        let snap = self.metrics.snapshot();
        info!(
            files_downloaded = snap.files_downloaded,
            files_uploaded = snap.files_uploaded,
            return_entries = snap.return_entries_processed,
            "tick complete"
        );
    }

    async fn run_incoming(
        &self,
        dep_repo: &dyn DepositoryRepository,
        transfer_repo: &dyn TransferRepository,
    ) {
        if let Err(err) = self.download_and_process_files(dep_repo, transfer_repo).await {
            error!(kind = err.kind().as_str(), error = %err, "inbound phase failed");
            self.metrics.add_error(err.kind());
        }
    }

    async fn run_outgoing(
        &self,
        dep_repo: &dyn DepositoryRepository,
        transfer_repo: &dyn TransferRepository,
    ) {
        if let Err(err) = self.merge_and_upload_files(dep_repo, transfer_repo).await {
            error!(kind = err.kind().as_str(), error = %err, "outgoing phase failed");
            self.metrics.add_error(err.kind());
        }
    }

    /// Merge every pending transfer and micro-deposit, then upload files
    /// whose cutoff is within one tick. Merge errors abort only their
    /// routing number; a directory scan failure aborts the whole upload
    /// phase so nothing partial ships.
    async fn merge_and_upload_files(
        &self,
        dep_repo: &dyn DepositoryRepository,
        transfer_repo: &dyn TransferRepository,
    ) -> Result<(), ControllerError> {
        let mut to_upload: Vec<MergableFile> = Vec::new();

        loop {
            let pending = transfer_repo.get_pending_ready(self.batch_size).await?;
            if pending.is_empty() {
                break;
            }
            for group in group_transfers(pending) {
                let routing = group[0].origin.clone();
                for transfer in &group {
                    match merge_groupable_transfer(
                        &self.root_dir,
                        transfer,
                        self.ach.as_ref(),
                        transfer_repo,
                    )
                    .await
                    {
                        Ok(Some(file)) => to_upload.push(file),
                        Ok(None) => {}
                        Err(err) => {
                            error!(
                                routing_number = %routing,
                                transfer_id = %transfer.transfer_id,
                                kind = err.kind().as_str(),
                                error = %err,
                                "merging transfers aborted for this routing number"
                            );
                            self.metrics.add_error(err.kind());
                            break;
                        }
                    }
                }
            }
        }

        loop {
            let pending = dep_repo.get_micro_deposits_ready(self.batch_size).await?;
            if pending.is_empty() {
                break;
            }
            for micro in &pending {
                match merge_micro_deposit(&self.root_dir, micro, self.ach.as_ref(), dep_repo)
                    .await
                {
                    Ok(Some(file)) => to_upload.push(file),
                    Ok(None) => {}
                    Err(err) => {
                        error!(
                            depository_id = %micro.depository_id,
                            kind = err.kind().as_str(),
                            error = %err,
                            "merging micro-deposit failed"
                        );
                        self.metrics.add_error(err.kind());
                    }
                }
            }
        }

        let interval_minutes = (self.interval.as_secs() / 60) as i64;
        let near = tokio::task::block_in_place(|| {
            files_near_cutoff(&self.cutoff_times, &self.root_dir, interval_minutes)
        })?;
        for file in near {
            if !to_upload.iter().any(|f| f.filepath == file.filepath) {
                to_upload.push(file);
            }
        }
        if to_upload.is_empty() {
            return Ok(());
        }
        tokio::task::block_in_place(|| self.start_upload(to_upload))
    }

    /// End-of-tick local cleanup for ODFIs that asked for it. `keep_files`
    /// (a debugging aid set at construction) suppresses all deletion.
    fn cleanup_local_directories(&self) {
        if self.keep_files {
            return;
        }
        for conf in &self.file_transfer_configs {
            if !conf.cleanup_local_directory {
                continue;
            }
            let dir = self.root_dir.join(&conf.routing_number);
            match fs::remove_dir_all(&dir) {
                Ok(()) => {}
                Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
                Err(err) => {
                    warn!(
                        routing_number = %conf.routing_number,
                        error = %err,
                        "failed cleaning local directory"
                    );
                }
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod testutil {
    use super::*;
    use crate::achclient::mock::MockAchFileSource;
    use crate::agent::mock::MockAgent;
    use crate::repository::RepositoryError;
    use async_trait::async_trait;
    use std::path::Path;

    /// Hands out clones of one shared mock agent for every transport.
    #[derive(Clone)]
    pub struct MockTransportFactory {
        pub agent: MockAgent,
    }

    impl MockTransportFactory {
        pub fn new() -> Self {
            Self {
                agent: MockAgent::new(),
            }
        }
    }

    impl TransportFactory for MockTransportFactory {
        fn connect_ftp(
            &self,
            _cfg: &FtpConfig,
            _conf: FileTransferConfig,
        ) -> Result<Box<dyn FileTransferAgent>, AgentError> {
            Ok(Box::new(self.agent.clone()))
        }

        fn connect_sftp(
            &self,
            _cfg: &SftpConfig,
            _conf: FileTransferConfig,
        ) -> Result<Box<dyn FileTransferAgent>, AgentError> {
            Ok(Box::new(self.agent.clone()))
        }
    }

    /// Repository with one FTP-backed ODFI whose cutoff is far away.
    pub struct TestRepository {
        pub routing_number: String,
    }

    #[async_trait]
    impl FileTransferRepository for TestRepository {
        async fn get_cutoff_times(&self) -> Result<Vec<CutoffTime>, RepositoryError> {
            Ok(vec![CutoffTime::new(
                &self.routing_number,
                1700,
                "America/New_York",
            )?])
        }

        async fn get_file_transfer_configs(
            &self,
        ) -> Result<Vec<FileTransferConfig>, RepositoryError> {
            Ok(vec![FileTransferConfig {
                routing_number: self.routing_number.clone(),
                inbound_path: "inbound/".to_string(),
                outbound_path: "outbound/".to_string(),
                return_path: "return/".to_string(),
                outbound_filename_template: None,
                allowed_ips: None,
                cleanup_local_directory: false,
                keep_remote_files: false,
            }])
        }

        async fn get_ftp_configs(&self) -> Result<Vec<FtpConfig>, RepositoryError> {
            Ok(vec![FtpConfig {
                routing_number: self.routing_number.clone(),
                hostname: "ftp.test.example.com".to_string(),
                username: "achgate".to_string(),
                password: "secret-password".to_string(),
            }])
        }

        async fn get_sftp_configs(&self) -> Result<Vec<SftpConfig>, RepositoryError> {
            Ok(Vec::new())
        }
    }

    pub async fn test_controller(
        root: &Path,
        routing_number: &str,
        transports: MockTransportFactory,
    ) -> Controller {
        let repo = TestRepository {
            routing_number: routing_number.to_string(),
        };
        let ach = Arc::new(MockAchFileSource::new(String::new()));
        Controller::with_transports(
            ControllerConfig {
                root_dir: root.to_path_buf(),
                interval: Duration::from_secs(600),
                batch_size: 100,
                keep_files: false,
            },
            &repo,
            ach,
            Arc::new(transports),
        )
        .await
        .unwrap()
    }
}

#[cfg(test)]
mod tests {
    use super::testutil::{test_controller, MockTransportFactory, TestRepository};
    use super::*;
    use crate::achclient::mock::MockAchFileSource;
    use crate::depository::mock::MockDepositoryRepository;
    use crate::repository::StaticRepository;
    use crate::transfers::mock::MockTransferRepository;

    #[tokio::test]
    async fn test_controller_construction() {
        let dir = tempfile::tempdir().unwrap();
        let repo = StaticRepository::default();
        let ach = Arc::new(MockAchFileSource::new(String::new()));
        let controller = Controller::new(
            ControllerConfig {
                root_dir: dir.path().to_path_buf(),
                ..Default::default()
            },
            &repo,
            ach,
        )
        .await
        .unwrap();

        assert_eq!(controller.interval(), Duration::from_secs(600));
        assert_eq!(controller.batch_size(), 100);
        assert_eq!(controller.cutoff_times().len(), 1);
        assert!(dir.path().exists());
    }

    #[tokio::test]
    async fn test_find_transfer_type_tiebreak() {
        let dir = tempfile::tempdir().unwrap();
        let repo = TestRepository {
            routing_number: "987654320".to_string(),
        };
        let ach = Arc::new(MockAchFileSource::new(String::new()));
        let mut controller = Controller::new(
            ControllerConfig {
                root_dir: dir.path().to_path_buf(),
                ..Default::default()
            },
            &repo,
            ach,
        )
        .await
        .unwrap();

        assert_eq!(controller.find_transfer_type(""), "unknown");
        assert_eq!(controller.find_transfer_type("123456780"), "unknown");
        assert_eq!(controller.find_transfer_type("987654320"), "ftp");

        // sftp alone
        controller.ftp_configs.clear();
        controller.sftp_configs.push(SftpConfig {
            routing_number: "987654320".to_string(),
            hostname: "sftp.test.example.com".to_string(),
            username: "achgate".to_string(),
            password: Some("pw".to_string()),
            client_private_key: None,
            host_public_key: None,
        });
        assert_eq!(controller.find_transfer_type("987654320"), "sftp");

        // ftp wins over sftp when both exist
        controller.ftp_configs.push(FtpConfig {
            routing_number: "987654320".to_string(),
            hostname: "ftp.test.example.com".to_string(),
            username: "achgate".to_string(),
            password: "pw".to_string(),
        });
        assert_eq!(controller.find_transfer_type("987654320"), "ftp");
    }

    #[tokio::test]
    async fn test_find_file_transfer_config() {
        let dir = tempfile::tempdir().unwrap();
        let repo = TestRepository {
            routing_number: "987654320".to_string(),
        };
        let ach = Arc::new(MockAchFileSource::new(String::new()));
        let controller = Controller::new(
            ControllerConfig {
                root_dir: dir.path().to_path_buf(),
                ..Default::default()
            },
            &repo,
            ach,
        )
        .await
        .unwrap();

        assert!(controller.find_file_transfer_config("987654320").is_some());
        assert!(controller.find_file_transfer_config("123456780").is_none());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_upload_phase_aborts_on_malformed_outbound() {
        let dir = tempfile::tempdir().unwrap();
        let factory = MockTransportFactory::new();
        let controller = test_controller(dir.path(), "987654320", factory.clone()).await;

        // a malformed file sits in the outbound working directory
        std::fs::write(dir.path().join("invalid.ach"), "invalid ACH file contents")
            .unwrap();

        let dep_repo = MockDepositoryRepository::default();
        let transfer_repo = MockTransferRepository::default();
        let err = controller
            .merge_and_upload_files(&dep_repo, &transfer_repo)
            .await
            .unwrap_err();

        assert!(matches!(err, ControllerError::Malformed(_)));
        // no agent upload was invoked
        assert!(factory.agent.state.lock().unwrap().uploaded.is_empty());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_flush_channels_and_shutdown() {
        let dir = tempfile::tempdir().unwrap();
        let factory = MockTransportFactory::new();
        let controller =
            Arc::new(test_controller(dir.path(), "987654320", factory.clone()).await);

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let (flush_in_tx, flush_in_rx) = mpsc::channel(1);
        let (flush_out_tx, flush_out_rx) = mpsc::channel(1);

        let dep_repo: Arc<dyn DepositoryRepository> =
            Arc::new(MockDepositoryRepository::default());
        let transfer_repo: Arc<dyn TransferRepository> =
            Arc::new(MockTransferRepository::default());

        let handle = {
            let controller = controller.clone();
            tokio::spawn(async move {
                controller
                    .start_periodic_operations(
                        shutdown_rx,
                        flush_in_rx,
                        flush_out_rx,
                        dep_repo,
                        transfer_repo,
                    )
                    .await;
            })
        };

        flush_in_tx.send(()).await.unwrap();
        flush_out_tx.send(()).await.unwrap();
        tokio::time::sleep(Duration::from_millis(250)).await;

        shutdown_tx.send(true).unwrap();
        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .expect("loop exits after shutdown")
            .unwrap();

        // the incoming flush polled the (empty) remote directories
        assert_eq!(controller.metrics().snapshot().files_downloaded, 0);
    }
}
