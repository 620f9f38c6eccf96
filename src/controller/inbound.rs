//! Inbound phase: download files from each ODFI and process return entries.

use std::fs;
use std::io::Read;
use std::path::Path;

use tracing::{debug, error, info, warn};

use super::error::ControllerError;
use super::returns::process_return_entry;
use super::Controller;
use crate::agent::{File, FileTransferAgent};
use crate::depository::DepositoryRepository;
use crate::metrics::ControllerMetrics;
use crate::store::parse_ach_filepath;
use crate::transfers::TransferRepository;

impl Controller {
    /// Download inbound and return files for every configured ODFI, then
    /// feed return entries through the state machine. Failures are isolated
    /// per routing number and per file.
    pub(super) async fn download_and_process_files(
        &self,
        dep_repo: &dyn DepositoryRepository,
        transfer_repo: &dyn TransferRepository,
    ) -> Result<(), ControllerError> {
        for cutoff in &self.cutoff_times {
            let routing = cutoff.routing_number.clone();
            let dir = self.root_dir.join(&routing);

            let saved =
                tokio::task::block_in_place(|| self.save_remote_files(&routing, &dir));
            let (inbound_path, return_path) = match saved {
                Ok(paths) => paths,
                Err(err) => {
                    error!(
                        routing_number = %routing,
                        kind = err.kind().as_str(),
                        error = %err,
                        "downloading remote files failed"
                    );
                    self.metrics.add_error(err.kind());
                    continue;
                }
            };

            self.process_inbound_files(&dir.join(&inbound_path));
            self.process_return_files(&dir.join(&return_path), dep_repo, transfer_repo)
                .await;
        }
        Ok(())
    }

    /// Fetch everything from the agent's inbound and return prefixes into
    /// the local per-routing directory. Returns the two local sub-paths.
    fn save_remote_files(
        &self,
        routing_number: &str,
        dir: &Path,
    ) -> Result<(String, String), ControllerError> {
        let conf = self
            .find_file_transfer_config(routing_number)
            .ok_or_else(|| ControllerError::MissingConfig(routing_number.to_string()))?
            .clone();
        let keep_remote = conf.keep_remote_files;
        let mut agent = self.connect(routing_number, conf)?;

        let inbound_path = agent.inbound_path().to_string();
        let return_path = agent.return_path().to_string();

        let files = agent.get_inbound_files()?;
        let count = write_files(
            agent.as_mut(),
            files,
            &dir.join(&inbound_path),
            &inbound_path,
            keep_remote,
            &self.metrics,
        )?;
        let files = agent.get_return_files()?;
        let count = count
            + write_files(
                agent.as_mut(),
                files,
                &dir.join(&return_path),
                &return_path,
                keep_remote,
                &self.metrics,
            )?;
        let _ = agent.close();

        debug!(
            routing_number = %routing_number,
            files = count,
            "saved remote files"
        );
        Ok((inbound_path, return_path))
    }

    /// Inbound files carry prenotes and corrections handled elsewhere; here
    /// they are parsed so garbage gets surfaced early, and logged.
    fn process_inbound_files(&self, dir: &Path) {
        for path in list_ach_files(dir) {
            match parse_ach_filepath(&path) {
                Ok(file) => {
                    for batch in &file.batches {
                        info!(
                            filename = %path.display(),
                            sec_code = %batch.header.standard_entry_class_code,
                            entries = batch.entries.len(),
                            "processed inbound batch"
                        );
                    }
                }
                Err(err) => {
                    warn!(
                        filename = %path.display(),
                        kind = "malformed",
                        error = %err,
                        "skipping unparseable inbound file"
                    );
                    self.metrics.add_error(crate::metrics::ErrorKind::Malformed);
                }
            }
        }
    }

    async fn process_return_files(
        &self,
        dir: &Path,
        dep_repo: &dyn DepositoryRepository,
        transfer_repo: &dyn TransferRepository,
    ) {
        for path in list_ach_files(dir) {
            let file = match parse_ach_filepath(&path) {
                Ok(file) => file,
                Err(err) => {
                    warn!(
                        filename = %path.display(),
                        kind = "malformed",
                        error = %err,
                        "skipping unparseable return file"
                    );
                    self.metrics.add_error(crate::metrics::ErrorKind::Malformed);
                    continue;
                }
            };

            for batch in &file.batches {
                for entry in &batch.entries {
                    if entry.addenda99().is_none() {
                        continue;
                    }
                    if let Err(err) = process_return_entry(
                        &file.header,
                        &batch.header,
                        entry,
                        dep_repo,
                        transfer_repo,
                        &self.metrics,
                    )
                    .await
                    {
                        error!(
                            filename = %path.display(),
                            trace_number = %entry.trace_number,
                            kind = err.kind().as_str(),
                            error = %err,
                            "return entry failed"
                        );
                        self.metrics.add_error(err.kind());
                    }
                }
            }
        }
    }
}

/// Write fetched files under `local_dir`, draining each reader, then delete
/// them remotely unless the ODFI's storage policy keeps them.
fn write_files(
    agent: &mut dyn FileTransferAgent,
    files: Vec<File>,
    local_dir: &Path,
    remote_prefix: &str,
    keep_remote_files: bool,
    metrics: &ControllerMetrics,
) -> Result<usize, ControllerError> {
    fs::create_dir_all(local_dir)?;
    let mut count = 0;
    for mut file in files {
        let mut contents = Vec::new();
        file.contents.read_to_end(&mut contents)?;
        fs::write(local_dir.join(&file.filename), &contents)?;
        metrics.add_file_downloaded();
        count += 1;

        if !keep_remote_files {
            let remote = format!("{}{}", remote_prefix, file.filename);
            if let Err(err) = agent.delete(&remote) {
                warn!(filename = %remote, error = %err, "failed deleting remote file");
            }
        }
    }
    Ok(count)
}

fn list_ach_files(dir: &Path) -> Vec<std::path::PathBuf> {
    let mut out = Vec::new();
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(_) => return out,
    };
    for entry in entries.flatten() {
        let path = entry.path();
        if path.is_file() && path.extension().map(|e| e == "ach").unwrap_or(false) {
            out.push(path);
        }
    }
    out.sort();
    out
}
