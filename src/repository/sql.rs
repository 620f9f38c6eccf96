//! SQL-backed configuration repository.

use async_trait::async_trait;
use sqlx::{PgPool, Row};

use super::{
    CutoffTime, FileTransferConfig, FileTransferRepository, FtpConfig, RepositoryError,
    SftpConfig,
};

pub struct SqlRepository {
    pool: PgPool,
}

impl SqlRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl FileTransferRepository for SqlRepository {
    async fn get_cutoff_times(&self) -> Result<Vec<CutoffTime>, RepositoryError> {
        let rows = sqlx::query(
            r#"SELECT routing_number, cutoff, location
               FROM cutoff_times WHERE deleted_at IS NULL"#,
        )
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|r| {
                CutoffTime::new(
                    r.get::<String, _>("routing_number").as_str(),
                    r.get::<i32, _>("cutoff"),
                    r.get::<String, _>("location").as_str(),
                )
            })
            .collect()
    }

    async fn get_file_transfer_configs(
        &self,
    ) -> Result<Vec<FileTransferConfig>, RepositoryError> {
        let rows = sqlx::query(
            r#"SELECT routing_number, inbound_path, outbound_path, return_path,
                      outbound_filename_template, allowed_ips,
                      cleanup_local_directory, keep_remote_files
               FROM file_transfer_configs WHERE deleted_at IS NULL"#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .iter()
            .map(|r| FileTransferConfig {
                routing_number: r.get("routing_number"),
                inbound_path: r.get("inbound_path"),
                outbound_path: r.get("outbound_path"),
                return_path: r.get("return_path"),
                outbound_filename_template: r.get("outbound_filename_template"),
                allowed_ips: r.get("allowed_ips"),
                cleanup_local_directory: r.get("cleanup_local_directory"),
                keep_remote_files: r.get("keep_remote_files"),
            })
            .collect())
    }

    async fn get_ftp_configs(&self) -> Result<Vec<FtpConfig>, RepositoryError> {
        let rows = sqlx::query(
            r#"SELECT routing_number, hostname, username, password
               FROM ftp_configs WHERE deleted_at IS NULL"#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .iter()
            .map(|r| FtpConfig {
                routing_number: r.get("routing_number"),
                hostname: r.get("hostname"),
                username: r.get("username"),
                password: r.get("password"),
            })
            .collect())
    }

    async fn get_sftp_configs(&self) -> Result<Vec<SftpConfig>, RepositoryError> {
        let rows = sqlx::query(
            r#"SELECT routing_number, hostname, username, password,
                      client_private_key, host_public_key
               FROM sftp_configs WHERE deleted_at IS NULL"#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .iter()
            .map(|r| SftpConfig {
                routing_number: r.get("routing_number"),
                hostname: r.get("hostname"),
                username: r.get("username"),
                password: r.get("password"),
                client_private_key: r.get("client_private_key"),
                host_public_key: r.get("host_public_key"),
            })
            .collect())
    }
}
