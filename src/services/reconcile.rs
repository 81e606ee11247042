use {
    crate::domain::{
        error::ReconcileError,
        id::OrderId,
        oracle::{OracleStatus, PaymentOracle},
        order::{Order, OrderStatus, PaymentEvidence},
        outcome::Outcome,
        policy::UnverifiedRedirectPolicy,
    },
    crate::infra::mirror::{MirrorEvent, MirrorHandle},
    crate::infra::sqlite::{ledger_repo, order_repo},
    crate::services::locks::OrderLocks,
    sqlx::SqlitePool,
    std::sync::Arc,
};

/// What the evidence plus the oracle plus the policy add up to.
#[derive(Debug)]
enum Classified {
    Paid { transaction_id: Option<String> },
    Failed { transaction_id: Option<String> },
    Undetermined,
}

/// The reconciliation core. Every adapter (GET callback, POST webhook,
/// client verify poll, sweeper) funnels into [`Reconciler::reconcile`],
/// which decides the true payment outcome and grants credits at most once
/// per order no matter how many times or how concurrently it is invoked.
pub struct Reconciler {
    pool: SqlitePool,
    oracle: Arc<dyn PaymentOracle>,
    locks: OrderLocks,
    policy: UnverifiedRedirectPolicy,
    mirror: MirrorHandle,
}

impl Reconciler {
    pub fn new(
        pool: SqlitePool,
        oracle: Arc<dyn PaymentOracle>,
        policy: UnverifiedRedirectPolicy,
        mirror: MirrorHandle,
    ) -> Self {
        Self {
            pool,
            oracle,
            locks: OrderLocks::new(),
            policy,
            mirror,
        }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Decide the payment outcome for an order and, if and only if it is
    /// paid, run the commit sequence: mark paid first, then grant.
    ///
    /// The order's mutex is held from the status read through the last
    /// write, so repeat deliveries either short-circuit on a terminal
    /// status or queue behind the call doing the work.
    pub async fn reconcile(
        &self,
        order_id: &OrderId,
        evidence: &PaymentEvidence,
        actor: &str,
    ) -> Result<Outcome, ReconcileError> {
        let _guard = self.locks.acquire(order_id).await;

        let order = order_repo::find_by_id(&self.pool, order_id)
            .await?
            .ok_or_else(|| ReconcileError::OrderNotFound(order_id.to_string()))?;

        match order.status() {
            OrderStatus::Paid => {
                if !order.credits_added() {
                    // A previous call crashed between mark-paid and grant.
                    // Close the gap before answering.
                    return self.finish_grant(&order, actor).await;
                }
                tracing::info!(order_id = %order_id, actor, "repeat delivery for settled order");
                return Ok(Outcome::AlreadyProcessed {
                    money: order.money(),
                    credits: order.credits_purchased(),
                });
            }
            OrderStatus::Failed => {
                // Terminal. Stronger evidence on a later call does not
                // resurrect a failed order.
                return Ok(Outcome::Failed);
            }
            OrderStatus::Pending => {}
        }

        if let Some(pid) = &evidence.payment_id {
            order_repo::record_payment_ref(&self.pool, order_id, pid).await?;
        }

        match self.classify(&order, evidence).await? {
            Classified::Failed { transaction_id } => {
                let disposition = order_repo::mark_failed(&self.pool, order_id).await?;
                tracing::info!(
                    order_id = %order_id,
                    ?disposition,
                    transaction_id = transaction_id.as_deref(),
                    actor,
                    "payment declined"
                );
                self.mirror_order(&order, OrderStatus::Failed, false);
                Ok(Outcome::Failed)
            }
            Classified::Undetermined => {
                tracing::info!(order_id = %order_id, policy = %self.policy, actor, "payment undetermined, order left pending");
                Ok(Outcome::Pending)
            }
            Classified::Paid { transaction_id } => {
                self.commit_paid(&order, evidence, transaction_id.as_deref(), actor)
                    .await
            }
        }
    }

    /// Retry the grant for an order stuck at `paid && !credits_added`.
    /// Returns `true` if this call granted. Never touches the paid mark.
    pub async fn retry_grant(&self, order_id: &OrderId) -> Result<bool, ReconcileError> {
        let _guard = self.locks.acquire(order_id).await;

        let order = order_repo::find_by_id(&self.pool, order_id)
            .await?
            .ok_or_else(|| ReconcileError::OrderNotFound(order_id.to_string()))?;

        if order.status() != OrderStatus::Paid || order.credits_added() {
            return Ok(false);
        }

        let granted = self.grant(&order, "sweep").await?.is_some();
        Ok(granted)
    }

    /// Resolve a verification key and turn the oracle's answer, or the lack
    /// of one, into a decision under the configured redirect policy.
    async fn classify(
        &self,
        order: &Order,
        evidence: &PaymentEvidence,
    ) -> Result<Classified, ReconcileError> {
        if evidence.is_mock() {
            if let Some(pkg) = crate::domain::package::find(order.package_id()) {
                if pkg.is_sandbox() {
                    tracing::info!(order_id = %order.id(), "mock payment marker on sandbox package");
                    return Ok(Classified::Paid {
                        transaction_id: evidence.payment_id.clone(),
                    });
                }
            }
            // A mock marker on a real package is someone probing.
            tracing::warn!(order_id = %order.id(), "mock payment marker on non-sandbox package, ignoring");
            return Ok(Classified::Undetermined);
        }

        let key = evidence.verify_key().or_else(|| order.stored_key());

        let Some(key) = key else {
            return Ok(match self.policy {
                UnverifiedRedirectPolicy::TrustAsPaid => {
                    tracing::info!(order_id = %order.id(), "no verification key, trusting redirect");
                    Classified::Paid {
                        transaction_id: None,
                    }
                }
                UnverifiedRedirectPolicy::TreatAsPending
                | UnverifiedRedirectPolicy::RequireOracle => Classified::Undetermined,
            });
        };

        match self.oracle.check_status(&key).await {
            Ok(report) => Ok(match report.status {
                OracleStatus::Paid => Classified::Paid {
                    transaction_id: report.transaction_id,
                },
                OracleStatus::Failed | OracleStatus::Cancelled => Classified::Failed {
                    transaction_id: report.transaction_id,
                },
                OracleStatus::Pending => match self.policy {
                    UnverifiedRedirectPolicy::TrustAsPaid => Classified::Paid {
                        transaction_id: report.transaction_id,
                    },
                    _ => Classified::Undetermined,
                },
            }),
            Err(e) => match self.policy {
                UnverifiedRedirectPolicy::TrustAsPaid => {
                    tracing::warn!(order_id = %order.id(), key = %key, error = %e, "oracle unavailable, trusting redirect");
                    Ok(Classified::Paid {
                        transaction_id: None,
                    })
                }
                UnverifiedRedirectPolicy::TreatAsPending => {
                    tracing::warn!(order_id = %order.id(), key = %key, error = %e, "oracle unavailable, leaving pending");
                    Ok(Classified::Undetermined)
                }
                UnverifiedRedirectPolicy::RequireOracle => Err(e),
            },
        }
    }

    /// The commit sequence. Mark-paid goes first so a crash here leaves a
    /// `paid && !credits_added` order the sweep can finish, never a paid
    /// customer with no durable record of it.
    async fn commit_paid(
        &self,
        order: &Order,
        evidence: &PaymentEvidence,
        transaction_id: Option<&str>,
        actor: &str,
    ) -> Result<Outcome, ReconcileError> {
        let payment_ref = evidence
            .payment_id
            .as_deref()
            .or(evidence.invoice_id.as_deref());

        match order_repo::mark_paid(&self.pool, order.id(), payment_ref, transaction_id).await? {
            order_repo::MarkPaid::Applied | order_repo::MarkPaid::AlreadyPaid => {}
            order_repo::MarkPaid::WasFailed => {
                tracing::warn!(order_id = %order.id(), "paid evidence for terminally failed order, keeping failed");
                return Ok(Outcome::Failed);
            }
            order_repo::MarkPaid::NotFound => {
                return Err(ReconcileError::OrderNotFound(order.id().to_string()));
            }
        }
        self.mirror_order(order, OrderStatus::Paid, false);

        self.finish_grant(order, actor).await
    }

    /// Grant step shared by the fresh-commit path and the gap-closing path
    /// for orders found at `paid && !credits_added`.
    async fn finish_grant(&self, order: &Order, actor: &str) -> Result<Outcome, ReconcileError> {
        match self.grant(order, actor).await {
            Ok(Some(_)) => Ok(Outcome::Granted {
                money: order.money(),
                credits: order.credits_purchased(),
            }),
            Ok(None) => Ok(Outcome::AlreadyProcessed {
                money: order.money(),
                credits: order.credits_purchased(),
            }),
            Err(e) => {
                // The payment itself went through. Surface a soft success,
                // leave the order at paid && !credits_added for the sweep,
                // and make noise for the operator.
                tracing::error!(
                    order_id = %order.id(),
                    user_id = %order.user_id(),
                    credits = order.credits_purchased(),
                    error = %e,
                    "credit grant failed after mark-paid, sweep will retry"
                );
                Ok(Outcome::PartialFailure {
                    money: order.money(),
                    credits: order.credits_purchased(),
                })
            }
        }
    }

    /// Grant the order's credits exactly once. The `credits_added` claim and
    /// the ledger increment commit atomically; whichever caller claims the
    /// flag does the write, everyone else gets `None`.
    async fn grant(&self, order: &Order, actor: &str) -> Result<Option<i64>, ReconcileError> {
        let mut tx = self.pool.begin().await?;

        if !order_repo::set_credits_added(&mut tx, order.id()).await? {
            tx.rollback().await?;
            return Ok(None);
        }

        let balance = ledger_repo::add(
            &mut tx,
            order.user_id(),
            order.credits_purchased(),
            "credit_purchase",
            Some(order.id()),
            actor,
        )
        .await?;

        tx.commit().await?;

        tracing::info!(
            order_id = %order.id(),
            user_id = %order.user_id(),
            credits = order.credits_purchased(),
            balance,
            actor,
            "credits granted"
        );

        self.mirror_order(order, OrderStatus::Paid, true);
        self.mirror.record(MirrorEvent::CreditChanged {
            user_id: order.user_id().as_str().to_string(),
            delta: order.credits_purchased(),
            balance_after: balance,
            reason: "credit_purchase".to_string(),
        });

        Ok(Some(balance))
    }

    fn mirror_order(&self, order: &Order, status: OrderStatus, credits_added: bool) {
        self.mirror.record(MirrorEvent::OrderUpdated {
            order_id: order.id().as_str().to_string(),
            user_id: order.user_id().as_str().to_string(),
            status: status.as_str().to_string(),
            credits_added,
        });
    }
}
