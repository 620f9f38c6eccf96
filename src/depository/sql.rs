//! SQL-backed depository repository.

use std::sync::Mutex;

use async_trait::async_trait;
use sqlx::{PgPool, Row};

use super::{
    Depository, DepositoryError, DepositoryRepository, DepositoryStatus, MicroDeposit,
    PendingMicroDeposit,
};
use crate::money::Amount;

pub struct SqlDepositoryRepository {
    pool: PgPool,
    /// Cursor position for `get_micro_deposits_ready`, in row insertion
    /// order. Reset when the cursor drains so the next tick starts over.
    cursor: Mutex<i64>,
}

impl SqlDepositoryRepository {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            cursor: Mutex::new(0),
        }
    }
}

fn row_to_depository(row: &sqlx::postgres::PgRow) -> Result<Depository, DepositoryError> {
    let status: String = row.get("status");
    let status = DepositoryStatus::from_str(&status)
        .ok_or_else(|| DepositoryError::Database(format!("unknown status {:?}", status)))?;
    Ok(Depository {
        id: row.get("depository_id"),
        user_id: row.get("user_id"),
        routing_number: row.get("routing_number"),
        account_number: row.get("account_number"),
        status,
        return_code: row.get("return_code"),
    })
}

#[async_trait]
impl DepositoryRepository for SqlDepositoryRepository {
    async fn get(&self, id: &str) -> Result<Option<Depository>, DepositoryError> {
        let row = sqlx::query(
            r#"SELECT depository_id, user_id, routing_number, account_number, status, return_code
               FROM depositories WHERE depository_id = $1 AND deleted_at IS NULL"#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(row_to_depository).transpose()
    }

    async fn get_by_routing_account(
        &self,
        routing_number: &str,
        account_number: &str,
    ) -> Result<Option<Depository>, DepositoryError> {
        let row = sqlx::query(
            r#"SELECT depository_id, user_id, routing_number, account_number, status, return_code
               FROM depositories
               WHERE routing_number = $1 AND account_number = $2 AND deleted_at IS NULL"#,
        )
        .bind(routing_number)
        .bind(account_number)
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(row_to_depository).transpose()
    }

    async fn upsert(&self, user_id: &str, dep: &Depository) -> Result<(), DepositoryError> {
        sqlx::query(
            r#"INSERT INTO depositories
                 (depository_id, user_id, routing_number, account_number, status, return_code, last_updated_at)
               VALUES ($1, $2, $3, $4, $5, $6, NOW())
               ON CONFLICT (depository_id) DO UPDATE
               SET routing_number = EXCLUDED.routing_number,
                   account_number = EXCLUDED.account_number,
                   status = EXCLUDED.status,
                   return_code = EXCLUDED.return_code,
                   last_updated_at = NOW()"#,
        )
        .bind(&dep.id)
        .bind(user_id)
        .bind(&dep.routing_number)
        .bind(&dep.account_number)
        .bind(dep.status.as_str())
        .bind(&dep.return_code)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn set_return_code(&self, id: &str, code: &str) -> Result<(), DepositoryError> {
        sqlx::query(
            r#"UPDATE depositories
               SET return_code = $2, status = 'rejected', last_updated_at = NOW()
               WHERE depository_id = $1"#,
        )
        .bind(id)
        .bind(code)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_micro_deposits_ready(
        &self,
        batch_size: usize,
    ) -> Result<Vec<PendingMicroDeposit>, DepositoryError> {
        let after = *self.cursor.lock().unwrap();
        let rows = sqlx::query(
            r#"SELECT row_id, depository_id, user_id, amount_cents, file_id
               FROM micro_deposits
               WHERE row_id > $1 AND merged_filename IS NULL AND deleted_at IS NULL
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
            .map(|r| PendingMicroDeposit {
                depository_id: r.get("depository_id"),
                user_id: r.get("user_id"),
                amount: Amount::from_cents(r.get::<i64, _>("amount_cents") as u64),
                file_id: r.get("file_id"),
            })
            .collect())
    }

    async fn find_micro_deposit(
        &self,
        depository_id: &str,
        amount: &Amount,
    ) -> Result<Option<MicroDeposit>, DepositoryError> {
        let row = sqlx::query(
            r#"SELECT amount_cents, file_id FROM micro_deposits
               WHERE depository_id = $1 AND amount_cents = $2 AND deleted_at IS NULL"#,
        )
        .bind(depository_id)
        .bind(amount.to_cents() as i64)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(|r| MicroDeposit {
            amount: Amount::from_cents(r.get::<i64, _>("amount_cents") as u64),
            file_id: r.get("file_id"),
        }))
    }

    async fn set_micro_deposit_merged(
        &self,
        depository_id: &str,
        amount: &Amount,
        filename: &str,
    ) -> Result<(), DepositoryError> {
        sqlx::query(
            r#"UPDATE micro_deposits SET merged_filename = $3
               WHERE depository_id = $1 AND amount_cents = $2"#,
        )
        .bind(depository_id)
        .bind(amount.to_cents() as i64)
        .bind(filename)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn read_merged_filename(
        &self,
        depository_id: &str,
        amount: &Amount,
    ) -> Result<Option<String>, DepositoryError> {
        let row = sqlx::query(
            r#"SELECT merged_filename FROM micro_deposits
               WHERE depository_id = $1 AND amount_cents = $2 AND deleted_at IS NULL"#,
        )
        .bind(depository_id)
        .bind(amount.to_cents() as i64)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.and_then(|r| r.get("merged_filename")))
    }
}
