//! Return Entry Processing
//!
//! Applies RDFI return codes back onto the entities that originated the
//! entry: the two depositories involved and, when one matches, the transfer
//! record. Micro-deposit returns carry the code on the depository itself.

use tracing::{info, warn};

use super::error::ControllerError;
use crate::ach::{BatchHeader, EntryDetail, FileHeader};
use crate::depository::{Depository, DepositoryRepository, DepositoryStatus};
use crate::metrics::ControllerMetrics;
use crate::money::Amount;
use crate::transfers::{TransferRepository, TransferStatus};

/// Return codes the state machine understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReturnCode {
    /// account closed
    R02,
    /// no account / unable to locate account
    R03,
    /// invalid account number
    R04,
    /// improper debit to consumer account
    R05,
    /// authorization revoked by customer
    R07,
    /// customer advises not authorized
    R10,
    /// representative payee deceased
    R14,
    /// beneficiary or account holder deceased
    R15,
    /// account frozen
    R16,
    /// non-transaction account
    R20,
}

impl ReturnCode {
    pub fn from_code(code: &str) -> Option<Self> {
        match code {
            "R02" => Some(ReturnCode::R02),
            "R03" => Some(ReturnCode::R03),
            "R04" => Some(ReturnCode::R04),
            "R05" => Some(ReturnCode::R05),
            "R07" => Some(ReturnCode::R07),
            "R10" => Some(ReturnCode::R10),
            "R14" => Some(ReturnCode::R14),
            "R15" => Some(ReturnCode::R15),
            "R16" => Some(ReturnCode::R16),
            "R20" => Some(ReturnCode::R20),
            _ => None,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            ReturnCode::R02 => "R02",
            ReturnCode::R03 => "R03",
            ReturnCode::R04 => "R04",
            ReturnCode::R05 => "R05",
            ReturnCode::R07 => "R07",
            ReturnCode::R10 => "R10",
            ReturnCode::R14 => "R14",
            ReturnCode::R15 => "R15",
            ReturnCode::R16 => "R16",
            ReturnCode::R20 => "R20",
        }
    }

    pub fn reason(&self) -> &'static str {
        match self {
            ReturnCode::R02 => "account closed",
            ReturnCode::R03 => "no account",
            ReturnCode::R04 => "invalid account number",
            ReturnCode::R05 => "improper debit",
            ReturnCode::R07 => "authorization revoked",
            ReturnCode::R10 => "customer advises unauthorized",
            ReturnCode::R14 => "representative payee deceased",
            ReturnCode::R15 => "account holder deceased",
            ReturnCode::R16 => "account frozen",
            ReturnCode::R20 => "non-transaction account",
        }
    }

    /// The deceased codes also reject the originating account.
    fn rejects_origin(&self) -> bool {
        matches!(self, ReturnCode::R14 | ReturnCode::R15)
    }
}

/// Apply the return-code table to both depositories. The receiver is always
/// rejected; the origin only for the deceased codes, and is otherwise left
/// untouched so its record writes back verbatim.
pub fn update_depositories_from_return_code(
    code: ReturnCode,
    orig_dep: &mut Depository,
    rec_dep: &mut Depository,
) {
    if code.rejects_origin() {
        orig_dep.status = DepositoryStatus::Rejected;
    }
    rec_dep.status = DepositoryStatus::Rejected;
}

/// Handle one return entry from a downloaded return file.
pub async fn process_return_entry(
    file_header: &FileHeader,
    batch_header: &BatchHeader,
    entry: &EntryDetail,
    dep_repo: &dyn DepositoryRepository,
    transfer_repo: &dyn TransferRepository,
    metrics: &ControllerMetrics,
) -> Result<(), ControllerError> {
    let addenda = entry.addenda99().ok_or_else(|| {
        ControllerError::Validation(format!(
            "entry {} has no return addenda",
            entry.trace_number
        ))
    })?;
    let code = ReturnCode::from_code(&addenda.return_code).ok_or_else(|| {
        ControllerError::Validation(format!(
            "unsupported return code {:?}",
            addenda.return_code
        ))
    })?;

    let mut orig_dep = dep_repo
        .get_by_routing_account(
            &file_header.immediate_origin,
            &batch_header.company_identification,
        )
        .await?
        .ok_or_else(|| {
            ControllerError::MissingDepository(format!(
                "origin depository for routing {}",
                file_header.immediate_origin
            ))
        })?;
    let mut rec_dep = dep_repo
        .get_by_routing_account(&file_header.immediate_destination, &entry.dfi_account_number)
        .await?
        .ok_or_else(|| {
            ControllerError::MissingDepository(format!(
                "receiver depository for routing {}",
                file_header.immediate_destination
            ))
        })?;

    let amount = Amount::from_cents(entry.amount);
    let trace = Some(addenda.original_trace.as_str()).filter(|t| !t.is_empty());
    if trace.is_none() {
        metrics.add_trace_fallback();
    }

    let transfer = transfer_repo
        .get_by_trace_amount(trace, &amount, &rec_dep.user_id)
        .await?;

    match transfer {
        Some(transfer) => {
            update_depositories_from_return_code(code, &mut orig_dep, &mut rec_dep);
            dep_repo.upsert(&orig_dep.user_id, &orig_dep).await?;
            dep_repo.upsert(&rec_dep.user_id, &rec_dep).await?;
            transfer_repo.set_return_code(&transfer.id, code.code()).await?;
            transfer_repo
                .set_status(&transfer.id, TransferStatus::Reclaimed)
                .await?;
            info!(
                transfer_id = %transfer.id,
                return_code = code.code(),
                reason = code.reason(),
                "applied return to transfer"
            );
        }
        None => {
            // No transfer matched; this may be a returned micro-deposit.
            match dep_repo.find_micro_deposit(&rec_dep.id, &amount).await? {
                Some(_) => {
                    update_depositories_from_return_code(code, &mut orig_dep, &mut rec_dep);
                    dep_repo.upsert(&orig_dep.user_id, &orig_dep).await?;
                    dep_repo.upsert(&rec_dep.user_id, &rec_dep).await?;
                    dep_repo.set_return_code(&rec_dep.id, code.code()).await?;
                    info!(
                        depository_id = %rec_dep.id,
                        return_code = code.code(),
                        "applied return to micro-deposit depository"
                    );
                }
                None => {
                    warn!(
                        amount = %amount,
                        return_code = code.code(),
                        "return entry matched no transfer or micro-deposit"
                    );
                    return Err(ControllerError::Validation(format!(
                        "no transfer or micro-deposit for {} return",
                        amount
                    )));
                }
            }
        }
    }

    metrics.add_return_entry_processed();
    Ok(())
}
