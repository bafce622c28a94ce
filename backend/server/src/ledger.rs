//! Donation ledger — the donation lifecycle core.
//!
//! Owns donation and campaign-aggregate state: creation with payment-order
//! issuance, client-driven verification, provider webhooks, and refunds.
//! Every success transition is compare-and-set on the expected pre-state and
//! commits in the same transaction as the campaign-aggregate increment, so
//! concurrent or replayed confirmations credit a campaign exactly once.

use std::path::PathBuf;
use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use serde_json::Value;
use sqlx::SqlitePool;
use tracing::{info, warn};
use uuid::Uuid;

use crate::auth::Principal;
use crate::config::Config;
use crate::db;
use crate::errors::{AppError, Result};
use crate::gateway::{PaymentGateway, PaymentOrder};
use crate::models::{
    AttemptStatus, CreateDonationRequest, Donation, DonationStatus, DonationType, Payer,
    PaymentAttempt, RefundRequest, VerifyRequest, validate_80g,
};
use crate::notify::Notifier;
use crate::receipts;

/// Shared application state: one pool, one gateway, one notifier.
pub struct AppState {
    pub pool: SqlitePool,
    pub gateway: Arc<dyn PaymentGateway>,
    pub config: Config,
    pub notifier: Notifier,
}

impl AppState {
    pub fn storage_dir(&self) -> PathBuf {
        PathBuf::from(&self.config.storage_dir)
    }
}

// ─────────────────────────────────────────────────────────
// Creation
// ─────────────────────────────────────────────────────────

/// Create a donation in `pending` together with its payment order.
///
/// Order creation comes first: if the gateway rejects or times out, nothing
/// is persisted, so no orphan donation is ever left behind without an order.
pub async fn create_donation(
    state: &AppState,
    principal: &Principal,
    req: CreateDonationRequest,
) -> Result<(Donation, PaymentOrder)> {
    if req.amount <= 0.0 {
        return Err(AppError::InvalidRequest(
            "donation amount must be positive".to_string(),
        ));
    }
    validate_80g(req.want_80g, req.pan.as_deref(), req.legal_name.as_deref())?;

    if let Some(campaign_id) = &req.campaign_id {
        db::get_campaign(&state.pool, campaign_id)
            .await?
            .ok_or(AppError::NotFound("campaign"))?;
    }

    let user = db::get_user(&state.pool, &principal.user_id)
        .await?
        .ok_or(AppError::NotFound("user"))?;

    let donation_type = req.donation_type.unwrap_or(if req.campaign_id.is_some() {
        DonationType::Campaign
    } else {
        DonationType::General
    });

    let donation_id = Uuid::new_v4().to_string();
    let order = state
        .gateway
        .create_order(req.amount, &req.currency, &donation_id, &user.email)
        .await?;

    let now = Utc::now();
    let donation = Donation {
        id: donation_id,
        campaign_id: req.campaign_id,
        amount: req.amount,
        currency: req.currency,
        donation_type,
        user_id: Some(user.id),
        donor_name: None,
        donor_phone: None,
        donor_email: None,
        collected_by: None,
        method: req.method,
        want_80g: req.want_80g,
        pan: req.pan,
        legal_name: req.legal_name,
        address: req.address,
        status: DonationStatus::Pending,
        payment_provider: "razorpay".to_string(),
        payment_ref: None,
        refund_ref: None,
        refund_note: None,
        receipt_id: None,
        deposit_confirmed: false,
        deposit_confirmed_by: None,
        deposit_confirmed_at: None,
        created_at: now,
        updated_at: now,
    };
    let attempt = PaymentAttempt {
        id: Uuid::new_v4().to_string(),
        donation_id: Some(donation.id.clone()),
        pledge_id: None,
        attempt_no: 1,
        status: AttemptStatus::Initiated,
        provider_order_id: Some(order.id.clone()),
        provider_payload: serde_json::to_string(&order)?,
        created_at: now,
    };

    let mut tx = state.pool.begin().await?;
    db::insert_donation(&mut *tx, &donation).await?;
    db::insert_attempt(&mut *tx, &attempt).await?;
    tx.commit().await?;

    info!("Created donation {} (order {})", donation.id, order.id);
    Ok((donation, order))
}

// ─────────────────────────────────────────────────────────
// Verification
// ─────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum VerifyOutcome {
    Verified { donation: Donation },
    /// The donation was already in a terminal state; no side effects were
    /// re-applied.
    AlreadyFinal { status: DonationStatus },
}

/// Verify a payment proof and, on success, atomically confirm the donation
/// and credit its campaign. Replays on a terminal donation are no-ops.
pub async fn verify_donation(
    state: &AppState,
    principal: &Principal,
    donation_id: &str,
    proof: VerifyRequest,
) -> Result<VerifyOutcome> {
    let donation = db::get_donation(&state.pool, donation_id)
        .await?
        .ok_or(AppError::NotFound("donation"))?;

    authorize_verify(principal, &donation)?;

    if donation.status.is_terminal() {
        // Verification can arrive redundantly from both the client and the
        // provider webhook; report the state instead of re-applying effects.
        return Ok(VerifyOutcome::AlreadyFinal {
            status: donation.status,
        });
    }
    if donation.status == DonationStatus::PendingDeposit {
        return Err(AppError::InvalidState(
            "cash donation awaits deposit confirmation".to_string(),
        ));
    }

    let valid = state
        .gateway
        .verify_signature(
            &proof.razorpay_order_id,
            &proof.razorpay_payment_id,
            &proof.razorpay_signature,
        )
        .await?;

    if !valid {
        db::mark_failed(&state.pool, &donation.id).await?;
        warn!("Payment verification failed for donation {}", donation.id);
        return Err(AppError::InvalidRequest(
            "payment verification failed".to_string(),
        ));
    }

    let won = apply_success(state, &donation, &proof.razorpay_payment_id).await?;
    let updated = db::get_donation(&state.pool, &donation.id)
        .await?
        .ok_or(AppError::NotFound("donation"))?;
    if won {
        Ok(VerifyOutcome::Verified { donation: updated })
    } else {
        Ok(VerifyOutcome::AlreadyFinal {
            status: updated.status,
        })
    }
}

fn authorize_verify(principal: &Principal, donation: &Donation) -> Result<()> {
    match donation.payer() {
        Some(Payer::RegisteredUser { user_id }) => {
            if principal.user_id == user_id {
                Ok(())
            } else {
                Err(AppError::Forbidden(
                    "only the donation's payer may verify it".to_string(),
                ))
            }
        }
        // Walk-in collections have no account behind them; only an admin may
        // drive their verification.
        _ => principal.require_admin(),
    }
}

/// CAS the donation to `success` and apply the aggregate increment in one
/// transaction. Returns `false` when a concurrent confirmation already won.
async fn apply_success(state: &AppState, donation: &Donation, payment_ref: &str) -> Result<bool> {
    let mut tx = state.pool.begin().await?;
    let won = db::mark_success(&mut *tx, &donation.id, payment_ref).await?;
    if won {
        if let Some(campaign_id) = &donation.campaign_id {
            db::adjust_campaign_totals(&mut *tx, campaign_id, donation.amount, 1).await?;
        }
    }
    tx.commit().await?;

    if won {
        info!("Donation {} confirmed (payment {payment_ref})", donation.id);
        receipts::issue_detached(
            state.pool.clone(),
            state.storage_dir(),
            donation.id.clone(),
        );
    }
    Ok(won)
}

// ─────────────────────────────────────────────────────────
// Provider webhook
// ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WebhookOutcome {
    Processed,
    AlreadyProcessed,
    Ignored,
}

/// Provider-driven confirmation. Delivery is at-least-once: unknown orders
/// and replays are acknowledged as no-ops, never errors, so the provider
/// stops retrying.
pub async fn handle_webhook(state: &AppState, payload: Value) -> Result<WebhookOutcome> {
    if payload.get("event").and_then(Value::as_str) != Some("payment.captured") {
        return Ok(WebhookOutcome::Ignored);
    }

    let entity = &payload["payload"]["payment"]["entity"];
    let Some(order_id) = entity.get("order_id").and_then(Value::as_str) else {
        return Ok(WebhookOutcome::Ignored);
    };
    let Some(payment_id) = entity.get("id").and_then(Value::as_str) else {
        return Ok(WebhookOutcome::Ignored);
    };

    let Some(attempt) = db::find_attempt_by_order_id(&state.pool, order_id).await? else {
        info!("Webhook for unknown order {order_id} ignored");
        return Ok(WebhookOutcome::Ignored);
    };
    let Some(donation_id) = attempt.donation_id else {
        return Ok(WebhookOutcome::Ignored);
    };
    let Some(donation) = db::get_donation(&state.pool, &donation_id).await? else {
        return Ok(WebhookOutcome::Ignored);
    };

    if donation.status != DonationStatus::Pending {
        return Ok(WebhookOutcome::AlreadyProcessed);
    }

    let won = apply_success(state, &donation, payment_id).await?;
    Ok(if won {
        WebhookOutcome::Processed
    } else {
        WebhookOutcome::AlreadyProcessed
    })
}

// ─────────────────────────────────────────────────────────
// Refunds
// ─────────────────────────────────────────────────────────

/// Refund a successful donation and reverse its aggregate contribution.
/// `donor_count` intentionally stays put: a refunded donor remains counted.
pub async fn refund_donation(
    state: &AppState,
    principal: &Principal,
    donation_id: &str,
    req: RefundRequest,
) -> Result<Donation> {
    principal.require_admin()?;

    let donation = db::get_donation(&state.pool, donation_id)
        .await?
        .ok_or(AppError::NotFound("donation"))?;
    if donation.status != DonationStatus::Success {
        return Err(AppError::InvalidState(format!(
            "only successful donations can be refunded (status: {})",
            donation.status.as_str()
        )));
    }
    let payment_ref = donation.payment_ref.clone().ok_or_else(|| {
        AppError::InvalidState("donation has no captured payment to refund".to_string())
    })?;

    let refund_amount = req.amount.unwrap_or(donation.amount);
    if refund_amount <= 0.0 || refund_amount > donation.amount {
        return Err(AppError::InvalidRequest(
            "refund amount must be positive and at most the donation amount".to_string(),
        ));
    }

    // Gateway first: a failed or timed-out refund leaves the donation
    // unchanged and the operation retryable.
    let refund = state.gateway.refund(&payment_ref, req.amount).await?;

    let mut tx = state.pool.begin().await?;
    let won = db::mark_refunded(&mut *tx, &donation.id, &refund.id, req.note.as_deref()).await?;
    if !won {
        tx.rollback().await?;
        return Err(AppError::InvalidState(
            "donation is no longer refundable".to_string(),
        ));
    }
    if let Some(campaign_id) = &donation.campaign_id {
        db::adjust_campaign_totals(&mut *tx, campaign_id, -refund_amount, 0).await?;
    }
    tx.commit().await?;

    info!(
        "Refunded {refund_amount} on donation {} (refund {})",
        donation.id, refund.id
    );
    db::get_donation(&state.pool, &donation.id)
        .await?
        .ok_or(AppError::NotFound("donation"))
}

// ─────────────────────────────────────────────────────────
// Unit tests
// ─────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::{CaptureRecord, RefundRecord};
    use crate::models::PaymentMethod;
    use crate::testutil;
    use serde_json::json;

    fn verify_proof(order_id: &str) -> VerifyRequest {
        VerifyRequest {
            razorpay_order_id: order_id.to_string(),
            razorpay_payment_id: "pay_test_1".to_string(),
            razorpay_signature: "sig".to_string(),
        }
    }

    fn donation_request(campaign_id: Option<String>, amount: f64) -> CreateDonationRequest {
        CreateDonationRequest {
            campaign_id,
            amount,
            currency: "INR".to_string(),
            method: Some(PaymentMethod::Upi),
            donation_type: None,
            want_80g: false,
            pan: None,
            legal_name: None,
            address: None,
        }
    }

    fn captured_event(order_id: &str, payment_id: &str) -> Value {
        json!({
            "event": "payment.captured",
            "payload": { "payment": { "entity": {
                "id": payment_id,
                "order_id": order_id,
            }}}
        })
    }

    #[tokio::test]
    async fn create_verify_refund_round_trip() {
        let state = testutil::test_state().await;
        let user = testutil::seed_user(&state.pool, "donor").await;
        let admin = testutil::seed_user(&state.pool, "admin").await;
        let campaign = testutil::seed_campaign(&state.pool, 85_000.0, 3).await;
        let principal = testutil::principal(&user);

        let (donation, order) = create_donation(
            &state,
            &principal,
            donation_request(Some(campaign.id.clone()), 5_000.0),
        )
        .await
        .unwrap();
        assert_eq!(donation.status, DonationStatus::Pending);
        assert!(order.id.starts_with("order_mock_"));

        let attempt = db::find_attempt_by_order_id(&state.pool, &order.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(attempt.donation_id.as_deref(), Some(donation.id.as_str()));

        let outcome = verify_donation(&state, &principal, &donation.id, verify_proof(&order.id))
            .await
            .unwrap();
        let confirmed = match outcome {
            VerifyOutcome::Verified { donation } => donation,
            other => panic!("expected Verified, got {other:?}"),
        };
        assert_eq!(confirmed.status, DonationStatus::Success);
        assert_eq!(confirmed.payment_ref.as_deref(), Some("pay_test_1"));

        let credited = db::get_campaign(&state.pool, &campaign.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(credited.current_amount, 90_000.0);
        assert_eq!(credited.donor_count, 4);

        let receipt = testutil::wait_for_receipt(&state.pool, &donation.id).await;
        assert!(receipt.receipt_number.starts_with("WFY"));
        assert_eq!(receipt.fy, crate::receipts::financial_year(donation.created_at));

        // Full refund reverses the amount; donor_count stays at 4.
        let refunded = refund_donation(
            &state,
            &testutil::principal(&admin),
            &donation.id,
            RefundRequest {
                amount: None,
                note: Some("donor request".to_string()),
            },
        )
        .await
        .unwrap();
        assert_eq!(refunded.status, DonationStatus::Refunded);
        assert!(refunded.refund_ref.is_some());

        let reversed = db::get_campaign(&state.pool, &campaign.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(reversed.current_amount, 85_000.0);
        assert_eq!(reversed.donor_count, 4);

        // A second refund attempt must fail: the donation is not `success`.
        let err = refund_donation(
            &state,
            &testutil::principal(&admin),
            &donation.id,
            RefundRequest {
                amount: None,
                note: None,
            },
        )
        .await
        .unwrap_err();
        assert!(matches!(err, AppError::InvalidState(_)));
    }

    #[tokio::test]
    async fn verify_replay_is_a_no_op() {
        let state = testutil::test_state().await;
        let user = testutil::seed_user(&state.pool, "donor").await;
        let campaign = testutil::seed_campaign(&state.pool, 0.0, 0).await;
        let principal = testutil::principal(&user);

        let (donation, order) = create_donation(
            &state,
            &principal,
            donation_request(Some(campaign.id.clone()), 1_000.0),
        )
        .await
        .unwrap();

        verify_donation(&state, &principal, &donation.id, verify_proof(&order.id))
            .await
            .unwrap();
        let replay = verify_donation(&state, &principal, &donation.id, verify_proof(&order.id))
            .await
            .unwrap();
        assert!(matches!(
            replay,
            VerifyOutcome::AlreadyFinal {
                status: DonationStatus::Success
            }
        ));

        let campaign = db::get_campaign(&state.pool, &campaign.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(campaign.current_amount, 1_000.0);
        assert_eq!(campaign.donor_count, 1);
    }

    #[tokio::test]
    async fn concurrent_verifications_credit_once() {
        let state = testutil::test_state().await;
        let user = testutil::seed_user(&state.pool, "donor").await;
        let campaign = testutil::seed_campaign(&state.pool, 0.0, 0).await;
        let principal = testutil::principal(&user);

        let (donation, order) = create_donation(
            &state,
            &principal,
            donation_request(Some(campaign.id.clone()), 2_500.0),
        )
        .await
        .unwrap();

        let mut handles = Vec::new();
        for _ in 0..8 {
            let state = state.clone();
            let principal = principal.clone();
            let donation_id = donation.id.clone();
            let proof = verify_proof(&order.id);
            handles.push(tokio::spawn(async move {
                verify_donation(&state, &principal, &donation_id, proof).await
            }));
        }

        let mut verified = 0;
        for handle in handles {
            match handle.await.unwrap().unwrap() {
                VerifyOutcome::Verified { .. } => verified += 1,
                VerifyOutcome::AlreadyFinal { status } => {
                    assert_eq!(status, DonationStatus::Success)
                }
            }
        }
        assert_eq!(verified, 1, "exactly one success transition must occur");

        let campaign = db::get_campaign(&state.pool, &campaign.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(campaign.current_amount, 2_500.0);
        assert_eq!(campaign.donor_count, 1);
    }

    #[tokio::test]
    async fn verify_requires_the_payer() {
        let state = testutil::test_state().await;
        let user = testutil::seed_user(&state.pool, "donor").await;
        let stranger = testutil::seed_user(&state.pool, "donor").await;
        let (donation, order) =
            create_donation(&state, &testutil::principal(&user), donation_request(None, 100.0))
                .await
                .unwrap();

        let err = verify_donation(
            &state,
            &testutil::principal(&stranger),
            &donation.id,
            verify_proof(&order.id),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, AppError::Forbidden(_)));
    }

    #[tokio::test]
    async fn verify_walk_in_requires_admin() {
        let state = testutil::test_state().await;
        let admin = testutil::seed_user(&state.pool, "admin").await;
        let volunteer = testutil::seed_user(&state.pool, "volunteer").await;
        let campaign = testutil::seed_campaign(&state.pool, 0.0, 0).await;
        let donation =
            testutil::seed_walk_in_pending(&state.pool, &campaign.id, &volunteer.id, 300.0).await;

        let err = verify_donation(
            &state,
            &testutil::principal(&volunteer),
            &donation.id,
            verify_proof("order_x"),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, AppError::Forbidden(_)));

        let outcome = verify_donation(
            &state,
            &testutil::principal(&admin),
            &donation.id,
            verify_proof("order_x"),
        )
        .await
        .unwrap();
        assert!(matches!(outcome, VerifyOutcome::Verified { .. }));
    }

    #[tokio::test]
    async fn verify_rejects_cash_awaiting_deposit() {
        let state = testutil::test_state().await;
        let admin = testutil::seed_user(&state.pool, "admin").await;
        let volunteer = testutil::seed_user(&state.pool, "volunteer").await;
        let campaign = testutil::seed_campaign(&state.pool, 0.0, 0).await;
        let donation =
            testutil::seed_cash_donation(&state.pool, &campaign.id, &volunteer.id, 500.0).await;

        let err = verify_donation(
            &state,
            &testutil::principal(&admin),
            &donation.id,
            verify_proof("order_x"),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, AppError::InvalidState(_)));
    }

    #[tokio::test]
    async fn create_validates_80g_pair() {
        let state = testutil::test_state().await;
        let user = testutil::seed_user(&state.pool, "donor").await;
        let principal = testutil::principal(&user);

        let mut req = donation_request(None, 500.0);
        req.want_80g = true;
        req.pan = None;
        req.legal_name = Some("Asha Rao".to_string());
        let err = create_donation(&state, &principal, req).await.unwrap_err();
        assert!(matches!(err, AppError::InvalidRequest(_)));

        let mut req = donation_request(None, 500.0);
        req.want_80g = true;
        req.pan = Some("ABCDE1234F".to_string());
        req.legal_name = Some("Asha Rao".to_string());
        assert!(create_donation(&state, &principal, req).await.is_ok());
    }

    #[tokio::test]
    async fn create_rejects_unknown_campaign_and_bad_amount() {
        let state = testutil::test_state().await;
        let user = testutil::seed_user(&state.pool, "donor").await;
        let principal = testutil::principal(&user);

        let err = create_donation(
            &state,
            &principal,
            donation_request(Some("missing".to_string()), 100.0),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, AppError::NotFound("campaign")));

        let err = create_donation(&state, &principal, donation_request(None, 0.0))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::InvalidRequest(_)));
    }

    #[tokio::test]
    async fn webhook_round_trip_and_replay() {
        let state = testutil::test_state().await;
        let user = testutil::seed_user(&state.pool, "donor").await;
        let campaign = testutil::seed_campaign(&state.pool, 0.0, 0).await;

        let (donation, order) = create_donation(
            &state,
            &testutil::principal(&user),
            donation_request(Some(campaign.id.clone()), 750.0),
        )
        .await
        .unwrap();

        let outcome = handle_webhook(&state, captured_event(&order.id, "pay_wh_1"))
            .await
            .unwrap();
        assert_eq!(outcome, WebhookOutcome::Processed);

        let confirmed = db::get_donation(&state.pool, &donation.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(confirmed.status, DonationStatus::Success);
        assert_eq!(confirmed.payment_ref.as_deref(), Some("pay_wh_1"));

        let credited = db::get_campaign(&state.pool, &campaign.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(credited.current_amount, 750.0);

        // At-least-once delivery: the replay changes nothing.
        let replay = handle_webhook(&state, captured_event(&order.id, "pay_wh_1"))
            .await
            .unwrap();
        assert_eq!(replay, WebhookOutcome::AlreadyProcessed);
        let campaign = db::get_campaign(&state.pool, &campaign.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(campaign.current_amount, 750.0);
        assert_eq!(campaign.donor_count, 1);
    }

    #[tokio::test]
    async fn webhook_ignores_unknown_orders_and_other_events() {
        let state = testutil::test_state().await;
        let campaign = testutil::seed_campaign(&state.pool, 400.0, 2).await;

        let outcome = handle_webhook(&state, captured_event("order_unknown", "pay_1"))
            .await
            .unwrap();
        assert_eq!(outcome, WebhookOutcome::Ignored);

        let outcome = handle_webhook(&state, json!({ "event": "payment.failed" }))
            .await
            .unwrap();
        assert_eq!(outcome, WebhookOutcome::Ignored);

        let untouched = db::get_campaign(&state.pool, &campaign.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(untouched.current_amount, 400.0);
        assert_eq!(untouched.donor_count, 2);
    }

    struct FailingGateway;

    #[async_trait::async_trait]
    impl PaymentGateway for FailingGateway {
        async fn create_order(
            &self,
            _amount: f64,
            _currency: &str,
            _donation_id: &str,
            _payer_email: &str,
        ) -> Result<PaymentOrder> {
            Err(AppError::PaymentGateway("provider unavailable".to_string()))
        }

        async fn verify_signature(
            &self,
            _order_id: &str,
            _payment_id: &str,
            _signature: &str,
        ) -> Result<bool> {
            Ok(false)
        }

        async fn capture(
            &self,
            _payment_id: &str,
            _amount: f64,
            _currency: &str,
        ) -> Result<CaptureRecord> {
            Err(AppError::PaymentGateway("provider unavailable".to_string()))
        }

        async fn refund(&self, _payment_id: &str, _amount: Option<f64>) -> Result<RefundRecord> {
            Err(AppError::PaymentGateway("provider unavailable".to_string()))
        }
    }

    #[tokio::test]
    async fn gateway_failure_leaves_no_orphan_donation() {
        let state = testutil::state_with_gateway(Arc::new(FailingGateway)).await;
        let user = testutil::seed_user(&state.pool, "donor").await;

        let err = create_donation(
            &state,
            &testutil::principal(&user),
            donation_request(None, 100.0),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, AppError::PaymentGateway(_)));

        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM donations")
            .fetch_one(&state.pool)
            .await
            .unwrap();
        assert_eq!(count, 0);
    }

    #[tokio::test]
    async fn refund_gateway_failure_leaves_donation_success() {
        let state = testutil::state_with_gateway(Arc::new(FailingGateway)).await;
        let user = testutil::seed_user(&state.pool, "donor").await;
        let admin = testutil::seed_user(&state.pool, "admin").await;
        let campaign = testutil::seed_campaign(&state.pool, 900.0, 1).await;
        let donation =
            testutil::seed_success_donation(&state.pool, Some(&campaign.id), &user.id, 900.0).await;

        let err = refund_donation(
            &state,
            &testutil::principal(&admin),
            &donation.id,
            RefundRequest {
                amount: None,
                note: None,
            },
        )
        .await
        .unwrap_err();
        assert!(matches!(err, AppError::PaymentGateway(_)));

        let unchanged = db::get_donation(&state.pool, &donation.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(unchanged.status, DonationStatus::Success);
        let campaign = db::get_campaign(&state.pool, &campaign.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(campaign.current_amount, 900.0);
    }

    #[tokio::test]
    async fn refund_requires_admin_and_bounds() {
        let state = testutil::test_state().await;
        let user = testutil::seed_user(&state.pool, "donor").await;
        let admin = testutil::seed_user(&state.pool, "admin").await;
        let donation = testutil::seed_success_donation(&state.pool, None, &user.id, 400.0).await;

        let err = refund_donation(
            &state,
            &testutil::principal(&user),
            &donation.id,
            RefundRequest {
                amount: None,
                note: None,
            },
        )
        .await
        .unwrap_err();
        assert!(matches!(err, AppError::Forbidden(_)));

        let err = refund_donation(
            &state,
            &testutil::principal(&admin),
            &donation.id,
            RefundRequest {
                amount: Some(500.0),
                note: None,
            },
        )
        .await
        .unwrap_err();
        assert!(matches!(err, AppError::InvalidRequest(_)));
    }
}
