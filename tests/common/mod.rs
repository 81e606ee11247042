#![allow(dead_code)]

use credit_sync::domain::error::ReconcileError;
use credit_sync::domain::id::{OrderId, UserId};
use credit_sync::domain::oracle::{OracleReport, OracleStatus, PaymentOracle, VerifyKey};
use credit_sync::domain::order::NewOrder;
use credit_sync::domain::package;
use credit_sync::domain::policy::UnverifiedRedirectPolicy;
use credit_sync::infra::mirror::MirrorHandle;
use credit_sync::infra::sqlite::{ledger_repo, order_repo};
use credit_sync::services::reconcile::Reconciler;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Row, SqlitePool};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tempfile::TempDir;

/// A file-backed database in a temp dir. File-backed rather than in-memory
/// so every pool connection sees the same data, which the concurrency tests
/// depend on. Keep the struct alive for the duration of the test.
pub struct TestDb {
    pub pool: SqlitePool,
    _dir: TempDir,
}

pub async fn setup_db() -> TestDb {
    let dir = TempDir::new().expect("failed to create temp dir");
    let path = dir.path().join("credit_sync_test.db");

    let opts = SqliteConnectOptions::new()
        .filename(&path)
        .create_if_missing(true)
        .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
        .busy_timeout(Duration::from_secs(5));

    let pool = SqlitePoolOptions::new()
        .max_connections(8)
        .connect_with(opts)
        .await
        .expect("failed to open test db");

    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .expect("failed to run migrations");

    TestDb { pool, _dir: dir }
}

// ── Stub oracle ────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub enum StubReply {
    Paid(Option<&'static str>),
    Pending,
    Failed,
    Cancelled,
    Error,
}

/// Fixed-reply oracle that counts how often it is consulted. The counter is
/// what lets tests assert the idempotence short-circuit never reaches the
/// provider.
pub struct StubOracle {
    reply: StubReply,
    calls: AtomicUsize,
}

impl StubOracle {
    pub fn new(reply: StubReply) -> Arc<Self> {
        Arc::new(Self {
            reply,
            calls: AtomicUsize::new(0),
        })
    }

    pub fn paid(transaction_id: &'static str) -> Arc<Self> {
        Self::new(StubReply::Paid(Some(transaction_id)))
    }

    pub fn failed() -> Arc<Self> {
        Self::new(StubReply::Failed)
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl PaymentOracle for StubOracle {
    fn check_status(
        &self,
        _key: &VerifyKey,
    ) -> std::pin::Pin<
        Box<dyn std::future::Future<Output = Result<OracleReport, ReconcileError>> + Send + '_>,
    > {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let reply = self.reply.clone();
        Box::pin(async move {
            match reply {
                StubReply::Paid(txid) => Ok(OracleReport {
                    status: OracleStatus::Paid,
                    transaction_id: txid.map(String::from),
                }),
                StubReply::Pending => Ok(OracleReport {
                    status: OracleStatus::Pending,
                    transaction_id: None,
                }),
                StubReply::Failed => Ok(OracleReport {
                    status: OracleStatus::Failed,
                    transaction_id: Some("tx-failed".into()),
                }),
                StubReply::Cancelled => Ok(OracleReport {
                    status: OracleStatus::Cancelled,
                    transaction_id: None,
                }),
                StubReply::Error => Err(ReconcileError::Oracle("stub oracle down".into())),
            }
        })
    }
}

pub fn make_reconciler(
    pool: &SqlitePool,
    oracle: Arc<dyn PaymentOracle>,
    policy: UnverifiedRedirectPolicy,
) -> Arc<Reconciler> {
    Arc::new(Reconciler::new(
        pool.clone(),
        oracle,
        policy,
        MirrorHandle::disabled(),
    ))
}

// ── Seed helpers ───────────────────────────────────────────────────────────

pub fn user(n: &str) -> UserId {
    UserId::new(format!("usr_{n}")).unwrap()
}

/// Create a pending order for the given catalog package. Returns its id.
pub async fn seed_order(pool: &SqlitePool, user_id: &UserId, package_id: &str) -> OrderId {
    let package = package::find(package_id).expect("unknown test package");
    let order = NewOrder::from_package(user_id.clone(), package);
    order_repo::create(pool, &order).await.expect("seed order");
    order.id().clone()
}

/// Same, with a stored payment reference from session initiation.
pub async fn seed_order_with_ref(
    pool: &SqlitePool,
    user_id: &UserId,
    package_id: &str,
    payment_ref: &str,
) -> OrderId {
    let package = package::find(package_id).expect("unknown test package");
    let order = NewOrder::from_package(user_id.clone(), package).with_payment_ref(payment_ref);
    order_repo::create(pool, &order).await.expect("seed order");
    order.id().clone()
}

/// Raw row insert for states the public API cannot produce, e.g. an order
/// crashed between mark-paid and the grant.
pub async fn seed_raw_order(
    pool: &SqlitePool,
    id: &str,
    user_id: &UserId,
    credits: i64,
    status: &str,
    credits_added: bool,
) {
    sqlx::query(
        r#"
INSERT INTO orders
    (id, order_number, user_id, package_id, amount_cents, currency,
     credits_purchased, status, credits_added, created_at, updated_at)
VALUES (?, ?, ?, 'explorer', 1299, 'usd', ?, ?, ?, ?, ?)
"#,
    )
    .bind(id)
    .bind(format!("TLW-RAW-{id}"))
    .bind(user_id.as_str())
    .bind(credits)
    .bind(status)
    .bind(credits_added)
    .bind(chrono::Utc::now())
    .bind(chrono::Utc::now())
    .execute(pool)
    .await
    .expect("seed raw order");
}

/// Grant credits directly, bypassing reconciliation. For ledger tests.
pub async fn grant_direct(pool: &SqlitePool, user_id: &UserId, amount: i64) -> i64 {
    let mut tx = pool.begin().await.expect("begin");
    let balance = ledger_repo::add(&mut tx, user_id, amount, "test_grant", None, "test")
        .await
        .expect("grant");
    tx.commit().await.expect("commit");
    balance
}

// ── Query helpers ──────────────────────────────────────────────────────────

pub struct OrderRow {
    pub status: String,
    pub credits_added: bool,
    pub payment_ref: Option<String>,
    pub transaction_id: Option<String>,
}

pub async fn get_order_row(pool: &SqlitePool, id: &OrderId) -> OrderRow {
    let r = sqlx::query(
        "SELECT status, credits_added, payment_ref, transaction_id FROM orders WHERE id = ?",
    )
    .bind(id.as_str())
    .fetch_one(pool)
    .await
    .expect("order row");

    OrderRow {
        status: r.get("status"),
        credits_added: r.get::<i64, _>("credits_added") != 0,
        payment_ref: r.get("payment_ref"),
        transaction_id: r.get("transaction_id"),
    }
}

pub async fn balance(pool: &SqlitePool, user_id: &UserId) -> i64 {
    ledger_repo::get_balance(pool, user_id)
        .await
        .expect("balance")
}

pub async fn count_ledger_events(pool: &SqlitePool, user_id: &UserId) -> i64 {
    sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM ledger_events WHERE user_id = ?")
        .bind(user_id.as_str())
        .fetch_one(pool)
        .await
        .expect("count failed")
}
