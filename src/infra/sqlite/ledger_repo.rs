use {
    crate::domain::{
        error::ReconcileError,
        id::{OrderId, UserId},
    },
    chrono::Utc,
    sqlx::{Row, SqlitePool},
    uuid::Uuid,
};

/// Balance read. A user with no ledger row has never been granted anything
/// and reads as zero.
pub async fn get_balance(pool: &SqlitePool, user_id: &UserId) -> Result<i64, ReconcileError> {
    let row = sqlx::query("SELECT balance FROM credit_ledger WHERE user_id = ?")
        .bind(user_id.as_str())
        .fetch_optional(pool)
        .await?;

    Ok(row.map(|r| r.get::<i64, _>("balance")).unwrap_or(0))
}

/// Grant credits inside an existing transaction. The caller pairs this with
/// the order's `credits_added` flip so both land or neither does.
pub async fn add(
    tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
    user_id: &UserId,
    amount: i64,
    reason: &str,
    order_id: Option<&OrderId>,
    actor: &str,
) -> Result<i64, ReconcileError> {
    if amount <= 0 {
        return Err(ReconcileError::InvalidAmount(amount));
    }

    let now = Utc::now();
    let row = sqlx::query(
        r#"
INSERT INTO credit_ledger (user_id, balance, updated_at)
VALUES (?, ?, ?)
ON CONFLICT (user_id) DO UPDATE SET
    balance = balance + excluded.balance,
    updated_at = excluded.updated_at
RETURNING balance
"#,
    )
    .bind(user_id.as_str())
    .bind(amount)
    .bind(now)
    .fetch_one(&mut **tx)
    .await?;

    let new_balance: i64 = row.get("balance");
    insert_event(tx, user_id, order_id, amount, new_balance, reason, actor).await?;

    Ok(new_balance)
}

/// Spend credits. A single conditional UPDATE keeps the balance from ever
/// going negative; a shortfall is `InsufficientCredits`, not a partial write.
pub async fn deduct(
    pool: &SqlitePool,
    user_id: &UserId,
    amount: i64,
    reason: &str,
    actor: &str,
) -> Result<i64, ReconcileError> {
    if amount <= 0 {
        return Err(ReconcileError::InvalidAmount(amount));
    }

    let mut tx = pool.begin().await?;

    let row = sqlx::query(
        r#"
UPDATE credit_ledger
SET balance = balance - ?, updated_at = ?
WHERE user_id = ? AND balance >= ?
RETURNING balance
"#,
    )
    .bind(amount)
    .bind(Utc::now())
    .bind(user_id.as_str())
    .bind(amount)
    .fetch_optional(&mut *tx)
    .await?;

    let Some(row) = row else {
        let available = sqlx::query("SELECT balance FROM credit_ledger WHERE user_id = ?")
            .bind(user_id.as_str())
            .fetch_optional(&mut *tx)
            .await?
            .map(|r| r.get::<i64, _>("balance"))
            .unwrap_or(0);
        tx.rollback().await?;
        return Err(ReconcileError::InsufficientCredits {
            available,
            requested: amount,
        });
    };

    let new_balance: i64 = row.get("balance");
    insert_event(&mut tx, user_id, None, -amount, new_balance, reason, actor).await?;
    tx.commit().await?;

    Ok(new_balance)
}

/// Append-only history row, written in the same transaction as the balance
/// change it describes.
async fn insert_event(
    tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
    user_id: &UserId,
    order_id: Option<&OrderId>,
    delta: i64,
    balance_after: i64,
    reason: &str,
    actor: &str,
) -> Result<(), ReconcileError> {
    sqlx::query(
        r#"
INSERT INTO ledger_events (id, user_id, order_id, delta, balance_after, reason, actor, created_at)
VALUES (?, ?, ?, ?, ?, ?, ?, ?)
"#,
    )
    .bind(Uuid::now_v7().to_string())
    .bind(user_id.as_str())
    .bind(order_id.map(|id| id.as_str()))
    .bind(delta)
    .bind(balance_after)
    .bind(reason)
    .bind(actor)
    .bind(Utc::now())
    .execute(&mut **tx)
    .await?;

    Ok(())
}

pub struct LedgerEvent {
    pub order_id: Option<String>,
    pub delta: i64,
    pub balance_after: i64,
    pub reason: String,
    pub actor: String,
}

/// Recent history for a user, newest first.
pub async fn history(
    pool: &SqlitePool,
    user_id: &UserId,
    limit: i64,
) -> Result<Vec<LedgerEvent>, ReconcileError> {
    let rows = sqlx::query(
        r#"
SELECT order_id, delta, balance_after, reason, actor
FROM ledger_events
WHERE user_id = ?
ORDER BY created_at DESC, id DESC
LIMIT ?
"#,
    )
    .bind(user_id.as_str())
    .bind(limit)
    .fetch_all(pool)
    .await?;

    Ok(rows
        .into_iter()
        .map(|r| LedgerEvent {
            order_id: r.get("order_id"),
            delta: r.get("delta"),
            balance_after: r.get("balance_after"),
            reason: r.get("reason"),
            actor: r.get("actor"),
        })
        .collect())
}
