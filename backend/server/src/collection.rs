//! Volunteer collection — cash and online in-person donations, the
//! deposit-confirmation step, and read-time volunteer statistics.
//!
//! Cash enters the ledger in `pending_deposit`: the money exists physically
//! but is not yet in the Foundation's account, so campaign aggregates are
//! only credited once an admin confirms the bank deposit.

use chrono::Utc;
use serde::Serialize;
use tracing::info;
use uuid::Uuid;

use crate::auth::{Principal, Role};
use crate::db;
use crate::errors::{AppError, Result};
use crate::gateway::PaymentOrder;
use crate::ledger::AppState;
use crate::models::{
    AttemptStatus, CollectRequest, CollectionMode, Donation, DonationStatus, DonationType,
    PaymentAttempt, PaymentMethod, VolunteerStats, validate_80g,
};
use crate::receipts;

#[derive(Debug, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum CollectOutcome {
    /// Online mode: the payer still has to complete the checkout.
    PaymentRequired {
        donation: Donation,
        order: PaymentOrder,
    },
    /// Cash mode: collected, awaiting bank deposit confirmation.
    PendingDeposit { donation: Donation },
}

/// Record a donation collected in person by a volunteer from a walk-in donor.
pub async fn collect_donation(
    state: &AppState,
    volunteer: &Principal,
    req: CollectRequest,
) -> Result<CollectOutcome> {
    volunteer.require_role(Role::Volunteer)?;
    if req.amount <= 0.0 {
        return Err(AppError::InvalidRequest(
            "donation amount must be positive".to_string(),
        ));
    }
    validate_80g(req.want_80g, req.pan.as_deref(), req.legal_name.as_deref())?;

    let campaign = db::get_campaign(&state.pool, &req.campaign_id)
        .await?
        .ok_or(AppError::NotFound("campaign"))?;
    let volunteer_user = db::get_user(&state.pool, &volunteer.user_id)
        .await?
        .ok_or(AppError::NotFound("user"))?;

    let now = Utc::now();
    let donation = Donation {
        id: Uuid::new_v4().to_string(),
        campaign_id: Some(req.campaign_id.clone()),
        amount: req.amount,
        currency: "INR".to_string(),
        donation_type: DonationType::OnBehalf,
        user_id: None,
        donor_name: Some(req.donor_name.clone()),
        donor_phone: Some(req.donor_phone.clone()),
        donor_email: req.donor_email.clone(),
        collected_by: Some(volunteer.user_id.clone()),
        method: None,
        want_80g: req.want_80g,
        pan: req.pan.clone(),
        legal_name: req.legal_name.clone(),
        address: req.address.clone(),
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

    match req.mode {
        CollectionMode::Online => {
            // Same failure unit as a regular donation: no order, no record.
            let order = state
                .gateway
                .create_order(req.amount, &donation.currency, &donation.id, &volunteer_user.email)
                .await?;
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

            info!(
                "Volunteer {} recorded online collection {} (order {})",
                volunteer.user_id, donation.id, order.id
            );
            Ok(CollectOutcome::PaymentRequired { donation, order })
        }
        CollectionMode::Cash => {
            let mut donation = donation;
            donation.method = Some(PaymentMethod::Cash);
            donation.status = DonationStatus::PendingDeposit;
            db::insert_donation(&state.pool, &donation).await?;

            info!(
                "Volunteer {} collected cash donation {} of {} from {}",
                volunteer.user_id, donation.id, donation.amount, req.donor_name
            );

            // Best-effort notifications, detached so they can neither block
            // nor fail the collection itself.
            let notifier = state.notifier.clone();
            let donor_contact = req
                .donor_email
                .clone()
                .unwrap_or_else(|| req.donor_phone.clone());
            let donor_name = req.donor_name.clone();
            let volunteer_email = volunteer_user.email.clone();
            let volunteer_name = volunteer_user.full_name.clone();
            let admin_email = state.config.admin_alert_email.clone();
            let campaign_title = campaign.title.clone();
            let amount = req.amount;
            tokio::spawn(async move {
                notifier
                    .send_donation_confirmation(
                        &donor_contact,
                        amount,
                        &campaign_title,
                        Some(&volunteer_name),
                    )
                    .await;
                notifier
                    .send_cash_collection_alert(&volunteer_email, amount, &donor_name)
                    .await;
                notifier
                    .send_admin_cash_alert(&admin_email, &volunteer_name, amount, &donor_name)
                    .await;
            });

            Ok(CollectOutcome::PendingDeposit { donation })
        }
    }
}

/// Admin confirmation that volunteer-collected cash reached the bank.
/// Transitions `pending_deposit -> success` and applies the same aggregate
/// increment and receipt issuance as an online verification.
pub async fn confirm_cash_deposit(
    state: &AppState,
    admin: &Principal,
    donation_id: &str,
    volunteer_id: &str,
) -> Result<Donation> {
    admin.require_admin()?;

    let donation = db::get_donation(&state.pool, donation_id)
        .await?
        .ok_or(AppError::NotFound("donation"))?;
    if donation.method != Some(PaymentMethod::Cash) {
        return Err(AppError::InvalidState(
            "deposit confirmation applies only to cash donations".to_string(),
        ));
    }
    match donation.status {
        DonationStatus::PendingDeposit
            if donation.collected_by.as_deref() == Some(volunteer_id) => {}
        // Replayed confirmation: report the already-confirmed donation.
        DonationStatus::Success if donation.deposit_confirmed => return Ok(donation),
        _ => return Err(AppError::NotFound("pending cash collection")),
    }

    let mut tx = state.pool.begin().await?;
    let won = db::confirm_deposit(&mut *tx, donation_id, volunteer_id, &admin.user_id).await?;
    if won {
        if let Some(campaign_id) = &donation.campaign_id {
            db::adjust_campaign_totals(&mut *tx, campaign_id, donation.amount, 1).await?;
        }
    }
    tx.commit().await?;

    if won {
        info!(
            "Cash deposit confirmed for donation {donation_id} by admin {}",
            admin.user_id
        );
        receipts::issue_detached(
            state.pool.clone(),
            state.storage_dir(),
            donation_id.to_string(),
        );
    }

    // Whether this call won or a concurrent one did, the final state is the
    // same confirmed donation.
    db::get_donation(&state.pool, donation_id)
        .await?
        .ok_or(AppError::NotFound("donation"))
}

/// A volunteer's collection totals, derived fresh from the ledger on every
/// call. Volunteers see their own numbers; admins can see anyone's.
pub async fn volunteer_stats(
    state: &AppState,
    requester: &Principal,
    volunteer_id: &str,
) -> Result<VolunteerStats> {
    if requester.user_id != volunteer_id {
        requester.require_admin()?;
    }
    db::volunteer_stats(&state.pool, volunteer_id).await
}

// ─────────────────────────────────────────────────────────
// Unit tests
// ─────────────────────────────────────────────────────────
