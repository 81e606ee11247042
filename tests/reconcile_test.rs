mod common;

use common::*;
use credit_sync::domain::error::ReconcileError;
use credit_sync::domain::id::OrderId;
use credit_sync::domain::order::PaymentEvidence;
use credit_sync::domain::outcome::Outcome;
use credit_sync::domain::policy::UnverifiedRedirectPolicy;

// ── 1. trusted_redirect_with_no_identifiers ────────────────────────────────
// The provider bounced the user back with nothing attached. Under the trust
// policy that alone settles the order, without ever consulting the oracle.

#[tokio::test]
async fn trusted_redirect_with_no_identifiers() {
    let db = setup_db().await;
    let u = user("u1");
    let order_id = seed_order(&db.pool, &u, "explorer").await;

    let oracle = StubOracle::new(StubReply::Error);
    let rec = make_reconciler(&db.pool, oracle.clone(), UnverifiedRedirectPolicy::TrustAsPaid);

    let outcome = rec
        .reconcile(&order_id, &PaymentEvidence::none(), "callback:gateway")
        .await
        .unwrap();

    assert!(matches!(outcome, Outcome::Granted { credits: 66, .. }));
    let row = get_order_row(&db.pool, &order_id).await;
    assert_eq!(row.status, "paid");
    assert!(row.credits_added);
    assert_eq!(balance(&db.pool, &u).await, 66);
    assert_eq!(oracle.calls(), 0, "no key resolvable, oracle must not be consulted");
}

// ── 2. explicit_paid_evidence ──────────────────────────────────────────────

#[tokio::test]
async fn explicit_paid_evidence() {
    let db = setup_db().await;
    let u = user("u2");
    let order_id = seed_order(&db.pool, &u, "explorer").await;

    let oracle = StubOracle::paid("tx-42");
    let rec = make_reconciler(&db.pool, oracle.clone(), UnverifiedRedirectPolicy::TrustAsPaid);

    let outcome = rec
        .reconcile(&order_id, &PaymentEvidence::invoice("INV-42"), "webhook:gateway")
        .await
        .unwrap();

    assert!(matches!(outcome, Outcome::Granted { credits: 66, .. }));
    assert_eq!(oracle.calls(), 1);

    let row = get_order_row(&db.pool, &order_id).await;
    assert_eq!(row.status, "paid");
    assert_eq!(row.payment_ref.as_deref(), Some("INV-42"));
    assert_eq!(row.transaction_id.as_deref(), Some("tx-42"));
    assert_eq!(balance(&db.pool, &u).await, 66);
}

// ── 3. explicit_failed_evidence ────────────────────────────────────────────

#[tokio::test]
async fn explicit_failed_evidence() {
    let db = setup_db().await;
    let u = user("u3");
    let order_id = seed_order(&db.pool, &u, "explorer").await;

    let rec = make_reconciler(&db.pool, StubOracle::failed(), UnverifiedRedirectPolicy::TrustAsPaid);

    let outcome = rec
        .reconcile(&order_id, &PaymentEvidence::invoice("INV-declined"), "webhook:gateway")
        .await
        .unwrap();

    assert!(matches!(outcome, Outcome::Failed));
    let row = get_order_row(&db.pool, &order_id).await;
    assert_eq!(row.status, "failed");
    assert!(!row.credits_added);
    assert_eq!(balance(&db.pool, &u).await, 0);
}

// ── 4. replay_after_success ────────────────────────────────────────────────
// Repeat webhook delivery for a settled order: cheap, side-effect-free, and
// no second oracle round-trip.

#[tokio::test]
async fn replay_after_success() {
    let db = setup_db().await;
    let u = user("u4");
    let order_id = seed_order(&db.pool, &u, "explorer").await;

    let oracle = StubOracle::paid("tx-1");
    let rec = make_reconciler(&db.pool, oracle.clone(), UnverifiedRedirectPolicy::TrustAsPaid);

    let first = rec
        .reconcile(&order_id, &PaymentEvidence::invoice("INV-1"), "webhook:gateway")
        .await
        .unwrap();
    assert!(matches!(first, Outcome::Granted { .. }));

    let second = rec
        .reconcile(&order_id, &PaymentEvidence::invoice("INV-1"), "webhook:gateway")
        .await
        .unwrap();
    assert!(matches!(second, Outcome::AlreadyProcessed { credits: 66, .. }));

    assert_eq!(balance(&db.pool, &u).await, 66, "not incremented again");
    assert_eq!(count_ledger_events(&db.pool, &u).await, 1);
    assert_eq!(oracle.calls(), 1, "short-circuit must precede the oracle call");
}

// ── 5. failed_is_terminal ──────────────────────────────────────────────────
// Once declined, later calls with Paid evidence do not resurrect the order.

#[tokio::test]
async fn failed_is_terminal() {
    let db = setup_db().await;
    let u = user("u5");
    let order_id = seed_order(&db.pool, &u, "explorer").await;

    let rec = make_reconciler(&db.pool, StubOracle::failed(), UnverifiedRedirectPolicy::TrustAsPaid);
    let outcome = rec
        .reconcile(&order_id, &PaymentEvidence::invoice("INV-x"), "webhook:gateway")
        .await
        .unwrap();
    assert!(matches!(outcome, Outcome::Failed));

    let rec = make_reconciler(&db.pool, StubOracle::paid("tx-late"), UnverifiedRedirectPolicy::TrustAsPaid);
    let outcome = rec
        .reconcile(&order_id, &PaymentEvidence::invoice("INV-x"), "client:verify")
        .await
        .unwrap();

    assert!(matches!(outcome, Outcome::Failed));
    assert_eq!(get_order_row(&db.pool, &order_id).await.status, "failed");
    assert_eq!(balance(&db.pool, &u).await, 0);
}

// ── 6. cancelled_collapses_to_failed ───────────────────────────────────────

#[tokio::test]
async fn cancelled_collapses_to_failed() {
    let db = setup_db().await;
    let u = user("u6");
    let order_id = seed_order(&db.pool, &u, "explorer").await;

    let rec = make_reconciler(
        &db.pool,
        StubOracle::new(StubReply::Cancelled),
        UnverifiedRedirectPolicy::TrustAsPaid,
    );

    let outcome = rec
        .reconcile(&order_id, &PaymentEvidence::payment("p-1"), "callback:gateway")
        .await
        .unwrap();

    assert!(matches!(outcome, Outcome::Failed));
    assert_eq!(get_order_row(&db.pool, &order_id).await.status, "failed");
}

// ── 7. mock_marker_on_sandbox_package ──────────────────────────────────────

#[tokio::test]
async fn mock_marker_on_sandbox_package() {
    let db = setup_db().await;
    let u = user("u7");
    let order_id = seed_order(&db.pool, &u, "test").await;

    let oracle = StubOracle::new(StubReply::Error);
    let rec = make_reconciler(&db.pool, oracle.clone(), UnverifiedRedirectPolicy::RequireOracle);

    let outcome = rec
        .reconcile(&order_id, &PaymentEvidence::payment("mock_abc123"), "callback:gateway")
        .await
        .unwrap();

    assert!(matches!(outcome, Outcome::Granted { credits: 1, .. }));
    assert_eq!(oracle.calls(), 0, "mock bypass must not hit the provider");
    assert_eq!(balance(&db.pool, &u).await, 1);
}

// ── 8. mock_marker_on_real_package_is_ignored ──────────────────────────────

#[tokio::test]
async fn mock_marker_on_real_package_is_ignored() {
    let db = setup_db().await;
    let u = user("u8");
    let order_id = seed_order(&db.pool, &u, "explorer").await;

    let rec = make_reconciler(
        &db.pool,
        StubOracle::paid("tx-should-not-matter"),
        UnverifiedRedirectPolicy::TrustAsPaid,
    );

    let outcome = rec
        .reconcile(&order_id, &PaymentEvidence::payment("mock_probe"), "callback:gateway")
        .await
        .unwrap();

    assert!(matches!(outcome, Outcome::Pending));
    let row = get_order_row(&db.pool, &order_id).await;
    assert_eq!(row.status, "pending");
    assert_eq!(balance(&db.pool, &u).await, 0);
}

// ── 9. pending_policy_keeps_order_pending_until_oracle_confirms ────────────

#[tokio::test]
async fn pending_policy_keeps_order_pending_until_oracle_confirms() {
    let db = setup_db().await;
    let u = user("u9");
    let order_id = seed_order(&db.pool, &u, "explorer").await;

    let rec = make_reconciler(
        &db.pool,
        StubOracle::new(StubReply::Error),
        UnverifiedRedirectPolicy::TreatAsPending,
    );
    let outcome = rec
        .reconcile(&order_id, &PaymentEvidence::none(), "callback:gateway")
        .await
        .unwrap();
    assert!(matches!(outcome, Outcome::Pending));
    assert_eq!(get_order_row(&db.pool, &order_id).await.status, "pending");

    // The client polls again once the provider settles.
    let rec = make_reconciler(
        &db.pool,
        StubOracle::paid("tx-settled"),
        UnverifiedRedirectPolicy::TreatAsPending,
    );
    let outcome = rec
        .reconcile(&order_id, &PaymentEvidence::invoice("INV-9"), "client:verify")
        .await
        .unwrap();
    assert!(matches!(outcome, Outcome::Granted { .. }));
    assert_eq!(balance(&db.pool, &u).await, 66);
}

// ── 10. oracle_pending_collapses_to_paid_under_trust ───────────────────────

#[tokio::test]
async fn oracle_pending_collapses_to_paid_under_trust() {
    let db = setup_db().await;
    let u = user("u10");
    let order_id = seed_order(&db.pool, &u, "explorer").await;

    let rec = make_reconciler(
        &db.pool,
        StubOracle::new(StubReply::Pending),
        UnverifiedRedirectPolicy::TrustAsPaid,
    );

    let outcome = rec
        .reconcile(&order_id, &PaymentEvidence::invoice("INV-10"), "callback:gateway")
        .await
        .unwrap();

    assert!(matches!(outcome, Outcome::Granted { .. }));
    assert_eq!(balance(&db.pool, &u).await, 66);
}

// ── 11. require_oracle_policy_propagates_oracle_errors ─────────────────────

#[tokio::test]
async fn require_oracle_policy_propagates_oracle_errors() {
    let db = setup_db().await;
    let u = user("u11");
    let order_id = seed_order(&db.pool, &u, "explorer").await;

    let rec = make_reconciler(
        &db.pool,
        StubOracle::new(StubReply::Error),
        UnverifiedRedirectPolicy::RequireOracle,
    );

    let err = rec
        .reconcile(&order_id, &PaymentEvidence::invoice("INV-11"), "webhook:gateway")
        .await
        .unwrap_err();

    assert!(matches!(err, ReconcileError::Oracle(_)));
    assert_eq!(get_order_row(&db.pool, &order_id).await.status, "pending");
    assert_eq!(balance(&db.pool, &u).await, 0);
}

// ── 12. stored_payment_ref_is_the_fallback_key ─────────────────────────────
// Session initiation recorded an invoice id; the redirect arrives bare. The
// core verifies through the stored reference instead of trusting blindly.

#[tokio::test]
async fn stored_payment_ref_is_the_fallback_key() {
    let db = setup_db().await;
    let u = user("u12");
    let order_id = seed_order_with_ref(&db.pool, &u, "explorer", "120055").await;

    let oracle = StubOracle::paid("tx-from-stored-key");
    let rec = make_reconciler(&db.pool, oracle.clone(), UnverifiedRedirectPolicy::RequireOracle);

    let outcome = rec
        .reconcile(&order_id, &PaymentEvidence::none(), "callback:gateway")
        .await
        .unwrap();

    assert!(matches!(outcome, Outcome::Granted { .. }));
    assert_eq!(oracle.calls(), 1);
    let row = get_order_row(&db.pool, &order_id).await;
    assert_eq!(row.transaction_id.as_deref(), Some("tx-from-stored-key"));
}

// ── 13. unknown_order_is_a_hard_error ──────────────────────────────────────

#[tokio::test]
async fn unknown_order_is_a_hard_error() {
    let db = setup_db().await;

    let rec = make_reconciler(
        &db.pool,
        StubOracle::paid("tx"),
        UnverifiedRedirectPolicy::TrustAsPaid,
    );

    let missing = OrderId::new("ord_does_not_exist").unwrap();
    let err = rec
        .reconcile(&missing, &PaymentEvidence::none(), "callback:gateway")
        .await
        .unwrap_err();

    assert!(matches!(err, ReconcileError::OrderNotFound(_)));
}

// ── 14. grant_failure_yields_partial_failure ───────────────────────────────
// A zero-credit order row makes the ledger write fail after mark-paid: the
// order must stay durably paid with the guard unset, and the caller gets a
// soft success, not an error.

#[tokio::test]
async fn grant_failure_yields_partial_failure() {
    let db = setup_db().await;
    let u = user("u14");
    seed_raw_order(&db.pool, "ord_zero", &u, 0, "pending", false).await;
    let order_id = OrderId::new("ord_zero").unwrap();

    let rec = make_reconciler(
        &db.pool,
        StubOracle::paid("tx-zero"),
        UnverifiedRedirectPolicy::TrustAsPaid,
    );

    let outcome = rec
        .reconcile(&order_id, &PaymentEvidence::invoice("INV-14"), "webhook:gateway")
        .await
        .unwrap();

    assert!(matches!(outcome, Outcome::PartialFailure { .. }));
    let row = get_order_row(&db.pool, &order_id).await;
    assert_eq!(row.status, "paid");
    assert!(!row.credits_added, "guard must stay unset for the sweep");
    assert_eq!(balance(&db.pool, &u).await, 0);
}
