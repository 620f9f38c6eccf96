//! Cutoff Scheduling
//!
//! Decides which merged files are close enough to their ODFI's cutoff time
//! to upload this tick. Comparison happens in wall-clock `HH*100 + MM`
//! form, in each cutoff's own timezone.

use std::path::Path;

use chrono::{Timelike, Utc};
use tracing::debug;

use super::error::ControllerError;
use crate::repository::CutoffTime;
use crate::store::{grab_all, parse_filename, MergableFile};

/// Files in `dir` whose routing number has a cutoff within the next
/// `interval_minutes`. The whole directory must parse: a malformed file
/// aborts the call so the upload phase never ships partial batches.
pub fn files_near_cutoff(
    cutoffs: &[CutoffTime],
    dir: &Path,
    interval_minutes: i64,
) -> Result<Vec<MergableFile>, ControllerError> {
    let files = grab_all(dir)?;
    let mut out = Vec::new();

    for file in files {
        let parsed = match parse_filename(&file.filename())? {
            Some(p) => p,
            None => continue,
        };
        for cutoff in cutoffs {
            if cutoff.routing_number != parsed.routing_number {
                continue;
            }
            let now = Utc::now().with_timezone(&cutoff.loc);
            let now_hhmm = (now.hour() * 100 + now.minute()) as i64;
            let delta = cutoff.cutoff as i64 - now_hhmm;
            if delta >= 0 && delta <= interval_minutes {
                debug!(
                    filename = %file.filename(),
                    routing_number = %parsed.routing_number,
                    cutoff = cutoff.cutoff,
                    "file is near its cutoff"
                );
                out.push(file);
                break;
            }
        }
    }
    Ok(out)
}
