//! Merging pending work into mergable files.
//!
//! Each pending transfer or micro-deposit references a fully-built ACH file
//! held by the upstream ACH service. Its batches fold into the current
//! mergable file for the destination routing number, rolling to the next
//! sequence when the Nacha line limit would be exceeded.

use std::path::Path;

use tracing::{debug, info};

use super::error::ControllerError;
use crate::ach::{AchFile, Batch};
use crate::achclient::AchFileSource;
use crate::depository::{DepositoryRepository, PendingMicroDeposit};
use crate::store::{ach_filename, latest_merged, MergableFile};
use crate::transfers::{PendingTransfer, TransferRepository};

/// Nacha's maximum record count for one transmitted file.
const LINE_LIMIT: usize = 10_000;

/// What a merge did: which file the batches landed in, and a full file to
/// upload right away when the merge rolled the sequence.
#[derive(Debug)]
pub struct MergeOutcome {
    pub merged_into: String,
    pub to_upload: Option<MergableFile>,
}

/// Fold `incoming`'s batches into `current`.
///
/// Every batch whose batch number is not already present is added first.
/// Only then is the line limit checked: when the serialized form exceeds
/// it, the last-added batch moves into a freshly created next-sequence
/// file, both files are written, and the full one is returned for upload.
/// Otherwise `current` is written in place and nothing is ready to ship.
pub fn merge_transfer(
    incoming: &AchFile,
    current: &mut MergableFile,
) -> Result<MergeOutcome, ControllerError> {
    let mut last_added: Option<Batch> = None;
    for batch in &incoming.batches {
        let exists = current
            .file
            .batches
            .iter()
            .any(|b| b.header.batch_number == batch.header.batch_number);
        if exists {
            debug!(
                batch_number = batch.header.batch_number,
                filename = %current.filename(),
                "batch already merged, skipping"
            );
            continue;
        }
        current.file.add_batch(batch.clone());
        current.file.create()?;
        last_added = Some(batch.clone());
    }

    if current.file.line_count() > LINE_LIMIT {
        if let Some(displaced) = last_added {
            current.file.remove_batch(&displaced.header);
            current.file.create()?;
            current.write()?;

            let dir = current
                .filepath
                .parent()
                .map(Path::to_path_buf)
                .unwrap_or_default();
            let seq = current.seq()? + 1;
            let filename =
                ach_filename(&current.file.header.immediate_destination, seq)?;
            let mut next = MergableFile {
                filepath: dir.join(&filename),
                file: AchFile::new(current.file.header.clone()),
            };
            next.file.add_batch(displaced);
            next.file.create()?;
            next.write()?;

            info!(
                filename = %current.filename(),
                next = %filename,
                "mergable file filled, rolling to next sequence"
            );
            let to_upload = current.clone();
            return Ok(MergeOutcome {
                merged_into: filename,
                to_upload: Some(to_upload),
            });
        }
    }

    current.write()?;
    Ok(MergeOutcome {
        merged_into: current.filename(),
        to_upload: None,
    })
}

/// Merge one pending transfer. Records the mergable filename back onto the
/// transfer so replays of the same pending item become no-ops.
pub async fn merge_groupable_transfer(
    dir: &Path,
    pending: &PendingTransfer,
    ach: &dyn AchFileSource,
    transfer_repo: &dyn TransferRepository,
) -> Result<Option<MergableFile>, ControllerError> {
    let contents = ach.get_file_contents(&pending.file_id).await?;
    let file = AchFile::parse(contents.as_bytes())?;
    file.validate()?;

    let mut current = latest_merged(&pending.origin, Some(&file), dir)?.ok_or_else(|| {
        ControllerError::Validation(format!(
            "no mergable file for routing {}",
            pending.origin
        ))
    })?;
    let outcome = merge_transfer(&file, &mut current)?;

    transfer_repo
        .set_merged_filename(&pending.transfer_id, &outcome.merged_into)
        .await?;
    debug!(
        transfer_id = %pending.transfer_id,
        filename = %outcome.merged_into,
        "merged transfer"
    );
    Ok(outcome.to_upload)
}

/// Merge one pending micro-deposit, keyed by the depository's routing
/// number. The merged-filename pointer lives on the micro-deposit row.
pub async fn merge_micro_deposit(
    dir: &Path,
    pending: &PendingMicroDeposit,
    ach: &dyn AchFileSource,
    dep_repo: &dyn DepositoryRepository,
) -> Result<Option<MergableFile>, ControllerError> {
    let already = dep_repo
        .read_merged_filename(&pending.depository_id, &pending.amount)
        .await?;
    if let Some(filename) = already {
        debug!(
            depository_id = %pending.depository_id,
            filename = %filename,
            "micro-deposit already merged"
        );
        return Ok(None);
    }

    let dep = dep_repo
        .get(&pending.depository_id)
        .await?
        .ok_or_else(|| ControllerError::MissingDepository(pending.depository_id.clone()))?;

    let contents = ach.get_file_contents(&pending.file_id).await?;
    let file = AchFile::parse(contents.as_bytes())?;
    file.validate()?;

    let mut current = latest_merged(&dep.routing_number, Some(&file), dir)?.ok_or_else(|| {
        ControllerError::Validation(format!(
            "no mergable file for routing {}",
            dep.routing_number
        ))
    })?;
    let outcome = merge_transfer(&file, &mut current)?;

    dep_repo
        .set_micro_deposit_merged(&pending.depository_id, &pending.amount, &outcome.merged_into)
        .await?;
    debug!(
        depository_id = %pending.depository_id,
        filename = %outcome.merged_into,
        "merged micro-deposit"
    );
    Ok(outcome.to_upload)
}

/// Group a cursor batch of pending transfers by origin routing number,
/// preserving insertion order within each group.
pub fn group_transfers(pending: Vec<PendingTransfer>) -> Vec<Vec<PendingTransfer>> {
    let mut groups: Vec<Vec<PendingTransfer>> = Vec::new();
    for transfer in pending {
        match groups
            .iter_mut()
            .find(|g| g[0].origin == transfer.origin)
        {
            Some(group) => group.push(transfer),
            None => groups.push(vec![transfer]),
        }
    }
    groups
}
