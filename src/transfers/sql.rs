//! SQL-backed transfer repository.

use std::sync::Mutex;

use async_trait::async_trait;
use sqlx::{PgPool, Row};

use super::{PendingTransfer, Transfer, TransferError, TransferRepository, TransferStatus};
use crate::money::Amount;

pub struct SqlTransferRepository {
    pool: PgPool,
    cursor: Mutex<i64>,
}

impl SqlTransferRepository {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            cursor: Mutex::new(0),
        }
    }
}

#[async_trait]
impl TransferRepository for SqlTransferRepository {
    async fn get_pending_ready(
        &self,
        batch_size: usize,
    ) -> Result<Vec<PendingTransfer>, TransferError> {
        let after = *self.cursor.lock().unwrap();
        let rows = sqlx::query(
            r#"SELECT row_id, transfer_id, user_id, origin_routing_number, file_id
               FROM transfers
               WHERE row_id > $1 AND status = 'pending'
                 AND merged_filename IS NULL AND deleted_at IS NULL
               ORDER BY row_id ASC
               LIMIT $2"#,
        )
        .bind(after)
        .bind(batch_size as i64)
        .fetch_all(&self.pool)
        .await?;

        let mut cursor = self.cursor.lock().unwrap();
        if rows.is_empty() {
            *cursor = 0;
            return Ok(Vec::new());
        }
        *cursor = rows.last().map(|r| r.get::<i64, _>("row_id")).unwrap_or(0);

        Ok(rows
            .iter()
            .map(|r| PendingTransfer {
                transfer_id: r.get("transfer_id"),
                user_id: r.get("user_id"),
                origin: r.get("origin_routing_number"),
                file_id: r.get("file_id"),
            })
            .collect())
    }

    async fn get_by_trace_amount(
        &self,
        trace: Option<&str>,
        amount: &Amount,
        user_id: &str,
    ) -> Result<Option<Transfer>, TransferError> {
        let row = match trace {
            Some(trace) => {
                sqlx::query(
                    r#"SELECT transfer_id, user_id, amount_cents, status, return_code
                       FROM transfers
                       WHERE trace_number = $1 AND amount_cents = $2 AND user_id = $3
                         AND deleted_at IS NULL"#,
                )
                .bind(trace)
                .bind(amount.to_cents() as i64)
                .bind(user_id)
                .fetch_optional(&self.pool)
                .await?
            }
            None => {
                sqlx::query(
                    r#"SELECT transfer_id, user_id, amount_cents, status, return_code
                       FROM transfers
                       WHERE amount_cents = $1 AND user_id = $2 AND deleted_at IS NULL"#,
                )
                .bind(amount.to_cents() as i64)
                .bind(user_id)
                .fetch_optional(&self.pool)
                .await?
            }
        };

        row.map(|r| {
            let status: String = r.get("status");
            let status = TransferStatus::from_str(&status).ok_or_else(|| {
                TransferError::Database(format!("unknown status {:?}", status))
            })?;
            Ok(Transfer {
                id: r.get("transfer_id"),
                user_id: r.get("user_id"),
                amount: Amount::from_cents(r.get::<i64, _>("amount_cents") as u64),
                status,
                return_code: r.get("return_code"),
            })
        })
        .transpose()
    }

    async fn set_return_code(&self, id: &str, code: &str) -> Result<(), TransferError> {
        sqlx::query(r#"UPDATE transfers SET return_code = $2 WHERE transfer_id = $1"#)
            .bind(id)
            .bind(code)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn set_status(
        &self,
        id: &str,
        status: TransferStatus,
    ) -> Result<(), TransferError> {
        sqlx::query(r#"UPDATE transfers SET status = $2 WHERE transfer_id = $1"#)
            .bind(id)
            .bind(status.as_str())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn set_merged_filename(
        &self,
        id: &str,
        filename: &str,
    ) -> Result<(), TransferError> {
        sqlx::query(r#"UPDATE transfers SET merged_filename = $2 WHERE transfer_id = $1"#)
            .bind(id)
            .bind(filename)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
