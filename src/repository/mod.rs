//! File Transfer Repository
//!
//! Read-only lookup of the per-ODFI configuration the controller runs on:
//! cutoff times, remote path layouts, and FTP/SFTP credentials, all keyed by
//! routing number. Two backends: a static in-memory repository for local
//! development and a SQL-backed one for production.

pub mod sql;

pub use sql::SqlRepository;

use std::fmt;

use async_trait::async_trait;
use chrono_tz::Tz;
use thiserror::Error;

use crate::store::DEFAULT_FILENAME_TEMPLATE;

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Unknown timezone: {0}")]
    UnknownTimezone(String),

    #[error("Cutoff {0} is not a valid HHMM time")]
    InvalidCutoff(i32),
}

/// Wall-clock upload deadline for one routing number, as `HH*100 + MM` in
/// an IANA timezone.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CutoffTime {
    pub routing_number: String,
    pub cutoff: u16,
    pub loc: Tz,
}

impl CutoffTime {
    pub fn new(routing_number: &str, cutoff: i32, tz: &str) -> Result<Self, RepositoryError> {
        if !(0..=2359).contains(&cutoff) || cutoff % 100 >= 60 {
            return Err(RepositoryError::InvalidCutoff(cutoff));
        }
        let loc: Tz = tz
            .parse()
            .map_err(|_| RepositoryError::UnknownTimezone(tz.to_string()))?;
        Ok(Self {
            routing_number: routing_number.to_string(),
            cutoff: cutoff as u16,
            loc,
        })
    }
}

/// Remote path layout and storage policy for one ODFI.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileTransferConfig {
    pub routing_number: String,
    pub inbound_path: String,
    pub outbound_path: String,
    pub return_path: String,
    pub outbound_filename_template: Option<String>,
    /// Comma separated addresses and CIDR ranges allowed to be dialed.
    pub allowed_ips: Option<String>,
    /// Delete the local per-routing download directory after a tick.
    pub cleanup_local_directory: bool,
    /// Leave processed files on the remote server instead of deleting them.
    pub keep_remote_files: bool,
}

impl FileTransferConfig {
    pub fn filename_template(&self) -> &str {
        match self.outbound_filename_template.as_deref() {
            Some(t) if !t.is_empty() => t,
            _ => DEFAULT_FILENAME_TEMPLATE,
        }
    }

    pub fn split_allowed_ips(&self) -> Vec<String> {
        match self.allowed_ips.as_deref() {
            Some(ips) if !ips.is_empty() => {
                ips.split(',').map(|s| s.trim().to_string()).collect()
            }
            _ => Vec::new(),
        }
    }
}

fn mask_password(password: &str) -> String {
    if password.len() < 5 {
        "**".to_string()
    } else {
        format!("**{}", &password[password.len() - 4..])
    }
}

/// FTP credentials for one routing number. `Debug` masks the password.
#[derive(Clone, PartialEq, Eq)]
pub struct FtpConfig {
    pub routing_number: String,
    pub hostname: String,
    pub username: String,
    pub password: String,
}

impl fmt::Debug for FtpConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FtpConfig")
            .field("routing_number", &self.routing_number)
            .field("hostname", &self.hostname)
            .field("username", &self.username)
            .field("password", &mask_password(&self.password))
            .finish()
    }
}

/// SFTP credentials for one routing number: password and/or client private
/// key, plus an optional pinned host public key. `Debug` masks secrets.
#[derive(Clone, PartialEq, Eq)]
pub struct SftpConfig {
    pub routing_number: String,
    pub hostname: String,
    pub username: String,
    pub password: Option<String>,
    pub client_private_key: Option<String>,
    pub host_public_key: Option<String>,
}

impl fmt::Debug for SftpConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SftpConfig")
            .field("routing_number", &self.routing_number)
            .field("hostname", &self.hostname)
            .field("username", &self.username)
            .field(
                "password",
                &self.password.as_deref().map(mask_password),
            )
            .field("client_private_key", &self.client_private_key.is_some())
            .field("host_public_key", &self.host_public_key.is_some())
            .finish()
    }
}

/// Read-only configuration lookup, keyed by routing number.
#[async_trait]
pub trait FileTransferRepository: Send + Sync {
    async fn get_cutoff_times(&self) -> Result<Vec<CutoffTime>, RepositoryError>;
    async fn get_file_transfer_configs(&self)
        -> Result<Vec<FileTransferConfig>, RepositoryError>;
    async fn get_ftp_configs(&self) -> Result<Vec<FtpConfig>, RepositoryError>;
    async fn get_sftp_configs(&self) -> Result<Vec<SftpConfig>, RepositoryError>;
}

/// Development repository: one local ODFI with a 17:00 New York cutoff and
/// no remote transports configured.
pub struct StaticRepository {
    pub routing_number: String,
}

impl Default for StaticRepository {
    fn default() -> Self {
        Self {
            routing_number: "121042882".to_string(),
        }
    }
}

#[async_trait]
impl FileTransferRepository for StaticRepository {
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
        Ok(Vec::new())
    }

    async fn get_sftp_configs(&self) -> Result<Vec<SftpConfig>, RepositoryError> {
        Ok(Vec::new())
    }
}
