//! Transfers
//!
//! Money-movement records owned by the surrounding gateway. The controller
//! pulls pending transfers through a cursor for merging, and writes status,
//! return-code, and merged-filename updates back when returns arrive.

pub mod sql;

pub use sql::SqlTransferRepository;

use std::fmt;

use async_trait::async_trait;
use thiserror::Error;

use crate::money::Amount;

#[derive(Debug, Error)]
pub enum TransferError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Transfer not found: {0}")]
    NotFound(String),
}

impl From<sqlx::Error> for TransferError {
    fn from(e: sqlx::Error) -> Self {
        TransferError::Database(e.to_string())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferStatus {
    Pending,
    Processed,
    Canceled,
    Reclaimed,
    Failed,
}

impl TransferStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransferStatus::Pending => "pending",
            TransferStatus::Processed => "processed",
            TransferStatus::Canceled => "canceled",
            TransferStatus::Reclaimed => "reclaimed",
            TransferStatus::Failed => "failed",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(TransferStatus::Pending),
            "processed" => Some(TransferStatus::Processed),
            "canceled" => Some(TransferStatus::Canceled),
            "reclaimed" => Some(TransferStatus::Reclaimed),
            "failed" => Some(TransferStatus::Failed),
            _ => None,
        }
    }
}

impl fmt::Display for TransferStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transfer {
    pub id: String,
    pub user_id: String,
    pub amount: Amount,
    pub status: TransferStatus,
    pub return_code: Option<String>,
}

/// A transfer ready to be merged into an outbound file. The built ACH file
/// is held by the upstream ACH service, addressed by `file_id`; `origin` is
/// the routing number whose mergable file the batches fold into.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingTransfer {
    pub transfer_id: String,
    pub user_id: String,
    pub origin: String,
    pub file_id: String,
}

#[async_trait]
pub trait TransferRepository: Send + Sync {
    /// Cursor over transfers not yet merged, in insertion order. An empty
    /// batch means the cursor is drained for this tick.
    async fn get_pending_ready(
        &self,
        batch_size: usize,
    ) -> Result<Vec<PendingTransfer>, TransferError>;

    /// Find the transfer a return entry refers to. `trace` is the return's
    /// original entry trace number; pass `None` to fall back to matching on
    /// amount and user alone.
    async fn get_by_trace_amount(
        &self,
        trace: Option<&str>,
        amount: &Amount,
        user_id: &str,
    ) -> Result<Option<Transfer>, TransferError>;

    async fn set_return_code(&self, id: &str, code: &str) -> Result<(), TransferError>;

    async fn set_status(&self, id: &str, status: TransferStatus)
        -> Result<(), TransferError>;

    async fn set_merged_filename(
        &self,
        id: &str,
        filename: &str,
    ) -> Result<(), TransferError>;
}

#[cfg(test)]
pub mod mock {
    use std::sync::Mutex;

    use super::*;

    /// Scriptable in-memory transfer repository.
    #[derive(Default)]
    pub struct MockTransferRepository {
        pub transfer: Option<Transfer>,
        pub pending: Mutex<Vec<PendingTransfer>>,
        pub statuses: Mutex<Vec<(String, TransferStatus)>>,
        pub return_codes: Mutex<Vec<(String, String)>>,
        pub merged: Mutex<Vec<(String, String)>>,
        pub err: Option<String>,
    }

    impl MockTransferRepository {
        fn check_err(&self) -> Result<(), TransferError> {
            match &self.err {
                Some(msg) => Err(TransferError::Database(msg.clone())),
                None => Ok(()),
            }
        }

        pub fn last_status(&self) -> Option<TransferStatus> {
            self.statuses.lock().unwrap().last().map(|(_, s)| *s)
        }

        pub fn last_return_code(&self) -> Option<String> {
            self.return_codes
                .lock()
                .unwrap()
                .last()
                .map(|(_, c)| c.clone())
        }
    }

    #[async_trait]
    impl TransferRepository for MockTransferRepository {
        async fn get_pending_ready(
            &self,
            batch_size: usize,
        ) -> Result<Vec<PendingTransfer>, TransferError> {
            self.check_err()?;
            let mut pending = self.pending.lock().unwrap();
            let take = batch_size.min(pending.len());
            Ok(pending.drain(..take).collect())
        }

        async fn get_by_trace_amount(
            &self,
            _trace: Option<&str>,
            amount: &Amount,
            _user_id: &str,
        ) -> Result<Option<Transfer>, TransferError> {
            self.check_err()?;
            Ok(self
                .transfer
                .as_ref()
                .filter(|t| &t.amount == amount)
                .cloned())
        }

        async fn set_return_code(&self, id: &str, code: &str) -> Result<(), TransferError> {
            self.check_err()?;
            self.return_codes
                .lock()
                .unwrap()
                .push((id.to_string(), code.to_string()));
            Ok(())
        }

        async fn set_status(
            &self,
            id: &str,
            status: TransferStatus,
        ) -> Result<(), TransferError> {
            self.check_err()?;
            self.statuses.lock().unwrap().push((id.to_string(), status));
            Ok(())
        }

        async fn set_merged_filename(
            &self,
            id: &str,
            filename: &str,
        ) -> Result<(), TransferError> {
            self.check_err()?;
            self.merged
                .lock()
                .unwrap()
                .push((id.to_string(), filename.to_string()));
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::mock::MockTransferRepository;
    use super::*;

    #[test]
    fn test_status_roundtrip() {
        for status in [
            TransferStatus::Pending,
            TransferStatus::Processed,
            TransferStatus::Canceled,
            TransferStatus::Reclaimed,
            TransferStatus::Failed,
        ] {
            assert_eq!(TransferStatus::from_str(status.as_str()), Some(status));
        }
        assert_eq!(TransferStatus::from_str("bogus"), None);
    }

    #[tokio::test]
    async fn test_mock_lookup_by_amount() {
        let repo = MockTransferRepository {
            transfer: Some(Transfer {
                id: "xfer-1".to_string(),
                user_id: "user-1".to_string(),
                amount: Amount::new("USD", "52.12").unwrap(),
                status: TransferStatus::Processed,
                return_code: None,
            }),
            ..Default::default()
        };

        let hit = repo
            .get_by_trace_amount(None, &Amount::new("USD", "52.12").unwrap(), "user-1")
            .await
            .unwrap();
        assert!(hit.is_some());

        let miss = repo
            .get_by_trace_amount(None, &Amount::new("USD", "0.22").unwrap(), "user-1")
            .await
            .unwrap();
        assert!(miss.is_none());
    }
}
