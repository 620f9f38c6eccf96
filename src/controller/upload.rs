//! Upload phase: push near-cutoff files to their ODFIs.

use std::fs;

use tracing::{error, info, warn};

use super::error::ControllerError;
use super::Controller;
use crate::agent::File;
use crate::metrics::ErrorKind;
use crate::store::{parse_filename, render_filename, MergableFile};

impl Controller {
    /// Upload each file over its routing number's transport. Files without
    /// a transport or config are skipped with a warning; a failed upload
    /// leaves the file in place for the next tick.
    pub(super) fn start_upload(&self, files: Vec<MergableFile>) -> Result<(), ControllerError> {
        for mergable in files {
            let filename = mergable.filename();
            let parsed = match parse_filename(&filename)? {
                Some(p) => p,
                None => {
                    warn!(filename = %filename, "unconventional filename in outbound set, skipping");
                    continue;
                }
            };

            let transfer_type = self.find_transfer_type(&parsed.routing_number);
            if transfer_type == "unknown" {
                warn!(
                    routing_number = %parsed.routing_number,
                    filename = %filename,
                    "no transport configured, skipping upload"
                );
                self.metrics.add_error(ErrorKind::MissingConfig);
                continue;
            }

            let conf = match self.find_file_transfer_config(&parsed.routing_number) {
                Some(conf) => conf.clone(),
                None => {
                    warn!(
                        routing_number = %parsed.routing_number,
                        filename = %filename,
                        "no file transfer config, skipping upload"
                    );
                    self.metrics.add_error(ErrorKind::MissingConfig);
                    continue;
                }
            };

            if let Err(err) = self.upload_file(&mergable, parsed.seq, parsed.gpg, &conf) {
                error!(
                    routing_number = %parsed.routing_number,
                    filename = %filename,
                    kind = err.kind().as_str(),
                    error = %err,
                    "upload failed, leaving file for next tick"
                );
                self.metrics.add_error(err.kind());
            }
        }
        Ok(())
    }

    fn upload_file(
        &self,
        mergable: &MergableFile,
        seq: u8,
        gpg: bool,
        conf: &crate::repository::FileTransferConfig,
    ) -> Result<(), ControllerError> {
        let mut agent = self.connect(&conf.routing_number, conf.clone())?;
        let remote_name =
            render_filename(conf.filename_template(), &conf.routing_number, seq, gpg)?;
        let fd = fs::File::open(&mergable.filepath)?;
        let outcome = agent.upload_file(File::new(remote_name.clone(), Box::new(fd)));
        let _ = agent.close();
        outcome?;

        self.metrics.add_file_uploaded();
        info!(
            routing_number = %conf.routing_number,
            filename = %remote_name,
            "uploaded file"
        );
        Ok(())
    }
}
