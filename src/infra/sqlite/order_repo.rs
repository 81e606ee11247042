use {
    crate::domain::{
        error::ReconcileError,
        id::{OrderId, UserId},
        money::{Currency, Money, MoneyAmount},
        order::{NewOrder, Order, OrderParams, OrderStatus},
    },
    chrono::{DateTime, Utc},
    sqlx::{Row, SqlitePool, sqlite::SqliteRow},
};

/// Disposition of a conditional mark-as-paid write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarkPaid {
    /// This call won the pending -> paid transition.
    Applied,
    /// Order was already paid; repeat call, no-op success.
    AlreadyPaid,
    /// Order is terminally failed; paid is unreachable from here.
    WasFailed,
    NotFound,
}

/// Disposition of a conditional mark-as-failed write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarkFailed {
    Applied,
    AlreadyFailed,
    /// Paid is never demoted.
    WasPaid,
    NotFound,
}

pub async fn create(pool: &SqlitePool, order: &NewOrder) -> Result<(), ReconcileError> {
    let now = Utc::now();
    sqlx::query(
        r#"
INSERT INTO orders
    (id, order_number, user_id, package_id, amount_cents, currency,
     credits_purchased, status, payment_ref, credits_added, created_at, updated_at)
VALUES (?, ?, ?, ?, ?, ?, ?, 'pending', ?, 0, ?, ?)
"#,
    )
    .bind(order.id().as_str())
    .bind(order.order_number())
    .bind(order.user_id().as_str())
    .bind(order.package_id())
    .bind(order.money().amount().cents())
    .bind(order.money().currency().as_str())
    .bind(order.credits_purchased())
    .bind(order.payment_ref())
    .bind(now)
    .bind(now)
    .execute(pool)
    .await?;

    Ok(())
}

pub async fn find_by_id(
    pool: &SqlitePool,
    id: &OrderId,
) -> Result<Option<Order>, ReconcileError> {
    let row = sqlx::query(
        r#"
SELECT id, order_number, user_id, package_id, amount_cents, currency,
       credits_purchased, status, payment_ref, transaction_id, credits_added,
       created_at, updated_at
FROM orders
WHERE id = ?
"#,
    )
    .bind(id.as_str())
    .fetch_optional(pool)
    .await?;

    match row {
        Some(r) => Ok(Some(row_to_order(&r)?)),
        None => Ok(None),
    }
}

/// Record the stored payment reference as soon as a callback surfaces one,
/// without touching status. No-op when the order already has a reference.
pub async fn record_payment_ref(
    pool: &SqlitePool,
    id: &OrderId,
    payment_ref: &str,
) -> Result<(), ReconcileError> {
    sqlx::query(
        "UPDATE orders SET payment_ref = ?, updated_at = ? WHERE id = ? AND payment_ref IS NULL",
    )
    .bind(payment_ref)
    .bind(Utc::now())
    .bind(id.as_str())
    .execute(pool)
    .await?;

    Ok(())
}

/// Compare-and-set pending -> paid, recording the payment reference and the
/// provider transaction id used. Safe to call twice: the second call reports
/// `AlreadyPaid` and changes nothing.
pub async fn mark_paid(
    pool: &SqlitePool,
    id: &OrderId,
    payment_ref: Option<&str>,
    transaction_id: Option<&str>,
) -> Result<MarkPaid, ReconcileError> {
    let result = sqlx::query(
        r#"
UPDATE orders
SET status = 'paid',
    payment_ref = COALESCE(?, payment_ref),
    transaction_id = COALESCE(?, transaction_id),
    updated_at = ?
WHERE id = ? AND status = 'pending'
"#,
    )
    .bind(payment_ref)
    .bind(transaction_id)
    .bind(Utc::now())
    .bind(id.as_str())
    .execute(pool)
    .await?;

    if result.rows_affected() == 1 {
        return Ok(MarkPaid::Applied);
    }

    match current_status(pool, id).await? {
        Some(OrderStatus::Paid) => Ok(MarkPaid::AlreadyPaid),
        Some(OrderStatus::Failed) => Ok(MarkPaid::WasFailed),
        Some(OrderStatus::Pending) => {
            // Lost a race after the read; the winner holds the per-order lock,
            // so this is unreachable in practice.
            Ok(MarkPaid::AlreadyPaid)
        }
        None => Ok(MarkPaid::NotFound),
    }
}

/// Compare-and-set pending -> failed. Never demotes a paid order.
pub async fn mark_failed(pool: &SqlitePool, id: &OrderId) -> Result<MarkFailed, ReconcileError> {
    let result = sqlx::query(
        "UPDATE orders SET status = 'failed', updated_at = ? WHERE id = ? AND status = 'pending'",
    )
    .bind(Utc::now())
    .bind(id.as_str())
    .execute(pool)
    .await?;

    if result.rows_affected() == 1 {
        return Ok(MarkFailed::Applied);
    }

    match current_status(pool, id).await? {
        Some(OrderStatus::Failed) => Ok(MarkFailed::AlreadyFailed),
        Some(OrderStatus::Paid) => Ok(MarkFailed::WasPaid),
        Some(OrderStatus::Pending) => Ok(MarkFailed::AlreadyFailed),
        None => Ok(MarkFailed::NotFound),
    }
}

/// Claim the idempotence guard. Returns `true` when this call flipped the
/// flag, `false` when the order is not paid or the grant already landed.
/// Run inside the grant transaction, before the ledger write: a `false`
/// here is what makes a duplicate grant impossible even across processes.
pub async fn set_credits_added(
    tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
    id: &OrderId,
) -> Result<bool, ReconcileError> {
    let result = sqlx::query(
        r#"
UPDATE orders
SET credits_added = 1, updated_at = ?
WHERE id = ? AND status = 'paid' AND credits_added = 0
"#,
    )
    .bind(Utc::now())
    .bind(id.as_str())
    .execute(&mut **tx)
    .await?;

    Ok(result.rows_affected() == 1)
}

/// Orders whose payment landed but whose grant did not: the sweep predicate.
pub async fn find_unfinished_grants(
    pool: &SqlitePool,
    limit: i64,
) -> Result<Vec<Order>, ReconcileError> {
    let rows = sqlx::query(
        r#"
SELECT id, order_number, user_id, package_id, amount_cents, currency,
       credits_purchased, status, payment_ref, transaction_id, credits_added,
       created_at, updated_at
FROM orders
WHERE status = 'paid' AND credits_added = 0
ORDER BY updated_at
LIMIT ?
"#,
    )
    .bind(limit)
    .fetch_all(pool)
    .await?;

    let mut out = Vec::with_capacity(rows.len());
    for r in &rows {
        match row_to_order(r) {
            Ok(o) => out.push(o),
            Err(e) => {
                // poison-row resilience: skip but don't fail the sweep
                tracing::warn!(error = %e, "skipping malformed order row");
            }
        }
    }

    Ok(out)
}

async fn current_status(
    pool: &SqlitePool,
    id: &OrderId,
) -> Result<Option<OrderStatus>, ReconcileError> {
    let row = sqlx::query("SELECT status FROM orders WHERE id = ?")
        .bind(id.as_str())
        .fetch_optional(pool)
        .await?;

    match row {
        Some(r) => {
            let status: String = r.get("status");
            Ok(Some(OrderStatus::try_from(status.as_str())?))
        }
        None => Ok(None),
    }
}

fn row_to_order(r: &SqliteRow) -> Result<Order, ReconcileError> {
    let status: String = r.get("status");
    let currency: String = r.get("currency");
    let amount = MoneyAmount::new(r.get::<i64, _>("amount_cents"))?;

    Ok(Order::new(OrderParams {
        id: OrderId::new(r.get::<String, _>("id"))?,
        order_number: r.get::<String, _>("order_number"),
        user_id: UserId::new(r.get::<String, _>("user_id"))?,
        package_id: r.get::<String, _>("package_id"),
        money: Money::new(amount, Currency::try_from(currency.as_str())?),
        credits_purchased: r.get::<i64, _>("credits_purchased"),
        status: OrderStatus::try_from(status.as_str())?,
        payment_ref: r.get::<Option<String>, _>("payment_ref"),
        transaction_id: r.get::<Option<String>, _>("transaction_id"),
        credits_added: r.get::<i64, _>("credits_added") != 0,
        created_at: r.get::<DateTime<Utc>, _>("created_at"),
        updated_at: r.get::<DateTime<Utc>, _>("updated_at"),
    }))
}
