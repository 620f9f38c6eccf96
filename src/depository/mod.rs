//! Depositories
//!
//! A depository is a customer bank account under verification. The file
//! transfer controller reads them to resolve return entries and pending
//! micro-deposits, and writes status/return-code updates back.

pub mod sql;

pub use sql::SqlDepositoryRepository;

use std::fmt;

use async_trait::async_trait;
use thiserror::Error;

use crate::money::Amount;

#[derive(Debug, Error)]
pub enum DepositoryError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Depository not found: {0}")]
    NotFound(String),
}

impl From<sqlx::Error> for DepositoryError {
    fn from(e: sqlx::Error) -> Self {
        DepositoryError::Database(e.to_string())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DepositoryStatus {
    Unverified,
    Verified,
    Rejected,
}

impl DepositoryStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DepositoryStatus::Unverified => "unverified",
            DepositoryStatus::Verified => "verified",
            DepositoryStatus::Rejected => "rejected",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "unverified" => Some(DepositoryStatus::Unverified),
            "verified" => Some(DepositoryStatus::Verified),
            "rejected" => Some(DepositoryStatus::Rejected),
            _ => None,
        }
    }
}

impl fmt::Display for DepositoryStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Depository {
    pub id: String,
    pub user_id: String,
    pub routing_number: String,
    pub account_number: String,
    pub status: DepositoryStatus,
    pub return_code: Option<String>,
}

/// One initiated micro-deposit row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MicroDeposit {
    pub amount: Amount,
    pub file_id: String,
}

/// A micro-deposit ready to be merged into an outbound file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingMicroDeposit {
    pub depository_id: String,
    pub user_id: String,
    pub amount: Amount,
    pub file_id: String,
}

#[async_trait]
pub trait DepositoryRepository: Send + Sync {
    async fn get(&self, id: &str) -> Result<Option<Depository>, DepositoryError>;

    async fn get_by_routing_account(
        &self,
        routing_number: &str,
        account_number: &str,
    ) -> Result<Option<Depository>, DepositoryError>;

    async fn upsert(&self, user_id: &str, dep: &Depository) -> Result<(), DepositoryError>;

    /// Stamp a return code onto the depository itself (micro-deposit
    /// returns have no transfer record to carry it).
    async fn set_return_code(&self, id: &str, code: &str) -> Result<(), DepositoryError>;

    /// Cursor over micro-deposits not yet merged into a file, in insertion
    /// order. Each call returns the next batch; an empty batch means the
    /// cursor is drained for this tick.
    async fn get_micro_deposits_ready(
        &self,
        batch_size: usize,
    ) -> Result<Vec<PendingMicroDeposit>, DepositoryError>;

    async fn find_micro_deposit(
        &self,
        depository_id: &str,
        amount: &Amount,
    ) -> Result<Option<MicroDeposit>, DepositoryError>;

    async fn set_micro_deposit_merged(
        &self,
        depository_id: &str,
        amount: &Amount,
        filename: &str,
    ) -> Result<(), DepositoryError>;

    async fn read_merged_filename(
        &self,
        depository_id: &str,
        amount: &Amount,
    ) -> Result<Option<String>, DepositoryError>;
}

#[cfg(test)]
pub mod mock {
    use std::sync::Mutex;

    use super::*;

    /// Scriptable in-memory depository repository.
    #[derive(Default)]
    pub struct MockDepositoryRepository {
        pub depositories: Vec<Depository>,
        pub micro_deposits: Vec<MicroDeposit>,
        pub pending: Mutex<Vec<PendingMicroDeposit>>,
        pub upserted: Mutex<Vec<Depository>>,
        pub return_codes: Mutex<Vec<(String, String)>>,
        pub merged: Mutex<Vec<(String, Amount, String)>>,
        pub err: Option<String>,
    }

    impl MockDepositoryRepository {
        fn check_err(&self) -> Result<(), DepositoryError> {
            match &self.err {
                Some(msg) => Err(DepositoryError::Database(msg.clone())),
                None => Ok(()),
            }
        }

        /// The status the mock last recorded for the given depository.
        pub fn upserted_status(&self, id: &str) -> Option<DepositoryStatus> {
            self.upserted
                .lock()
                .unwrap()
                .iter()
                .rev()
                .find(|d| d.id == id)
                .map(|d| d.status)
        }
    }

    #[async_trait]
    impl DepositoryRepository for MockDepositoryRepository {
        async fn get(&self, id: &str) -> Result<Option<Depository>, DepositoryError> {
            self.check_err()?;
            Ok(self.depositories.iter().find(|d| d.id == id).cloned())
        }

        async fn get_by_routing_account(
            &self,
            routing_number: &str,
            account_number: &str,
        ) -> Result<Option<Depository>, DepositoryError> {
            self.check_err()?;
            Ok(self
                .depositories
                .iter()
                .find(|d| {
                    d.routing_number == routing_number && d.account_number == account_number
                })
                .cloned())
        }

        async fn upsert(
            &self,
            _user_id: &str,
            dep: &Depository,
        ) -> Result<(), DepositoryError> {
            self.check_err()?;
            self.upserted.lock().unwrap().push(dep.clone());
            Ok(())
        }

        async fn set_return_code(
            &self,
            id: &str,
            code: &str,
        ) -> Result<(), DepositoryError> {
            self.check_err()?;
            self.return_codes
                .lock()
                .unwrap()
                .push((id.to_string(), code.to_string()));
            Ok(())
        }

        async fn get_micro_deposits_ready(
            &self,
            batch_size: usize,
        ) -> Result<Vec<PendingMicroDeposit>, DepositoryError> {
            self.check_err()?;
            let mut pending = self.pending.lock().unwrap();
            let take = batch_size.min(pending.len());
            Ok(pending.drain(..take).collect())
        }

        async fn find_micro_deposit(
            &self,
            _depository_id: &str,
            amount: &Amount,
        ) -> Result<Option<MicroDeposit>, DepositoryError> {
            self.check_err()?;
            Ok(self
                .micro_deposits
                .iter()
                .find(|m| &m.amount == amount)
                .cloned())
        }

        async fn set_micro_deposit_merged(
            &self,
            depository_id: &str,
            amount: &Amount,
            filename: &str,
        ) -> Result<(), DepositoryError> {
            self.check_err()?;
            self.merged.lock().unwrap().push((
                depository_id.to_string(),
                amount.clone(),
                filename.to_string(),
            ));
            Ok(())
        }

        async fn read_merged_filename(
            &self,
            depository_id: &str,
            amount: &Amount,
        ) -> Result<Option<String>, DepositoryError> {
            self.check_err()?;
            Ok(self
                .merged
                .lock()
                .unwrap()
                .iter()
                .find(|(id, amt, _)| id == depository_id && amt == amount)
                .map(|(_, _, filename)| filename.clone()))
        }
    }
}
