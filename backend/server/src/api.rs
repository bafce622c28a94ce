//! Axum REST API handlers.
//!
//! Handlers stay thin: extract the principal and payload, call into the
//! ledger/collection/pledge modules, shape the response. All error mapping
//! lives on [`AppError`].

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::header;
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use uuid::Uuid;

use crate::auth::Principal;
use crate::collection::{self, CollectOutcome};
use crate::db;
use crate::errors::{AppError, Result};
use crate::ledger::{self, AppState, VerifyOutcome};
use crate::models::{
    Campaign, CampaignStatus, CollectRequest, ConfirmDepositRequest, CreateCampaignRequest,
    CreateDonationRequest, CreatePledgeRequest, DonationType, DonationWithReceipt,
    GeneralDonationRequest, Payer, Pledge, RefundRequest, VerifyRequest, VolunteerStats,
};
use crate::pledges;

pub type SharedState = Arc<AppState>;

// ─────────────────────────────────────────────────────────
// Response shapes
// ─────────────────────────────────────────────────────────

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
}

#[derive(Deserialize)]
pub struct CampaignQuery {
    pub status: Option<String>,
}

#[derive(Deserialize)]
pub struct PledgeActionQuery {
    pub action: String,
}

// ─────────────────────────────────────────────────────────
// Health
// ─────────────────────────────────────────────────────────

/// `GET /health`
pub async fn health() -> impl IntoResponse {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

// ─────────────────────────────────────────────────────────
// Campaigns
// ─────────────────────────────────────────────────────────

/// `POST /campaigns` (admin)
pub async fn create_campaign(
    State(state): State<SharedState>,
    principal: Principal,
    Json(req): Json<CreateCampaignRequest>,
) -> Result<Json<Campaign>> {
    principal.require_admin()?;
    if req.goal_amount <= 0.0 {
        return Err(AppError::InvalidRequest(
            "goal amount must be positive".to_string(),
        ));
    }

    let campaign = Campaign {
        id: Uuid::new_v4().to_string(),
        title: req.title,
        description: req.description,
        goal_amount: req.goal_amount,
        currency: req.currency,
        current_amount: 0.0,
        donor_count: 0,
        status: CampaignStatus::Active,
        allow_recurring: req.allow_recurring,
        created_by: principal.user_id.clone(),
        created_at: Utc::now(),
    };
    db::insert_campaign(&state.pool, &campaign).await?;
    Ok(Json(campaign))
}

/// `GET /campaigns?status=active|completed|paused|all`
pub async fn list_campaigns(
    State(state): State<SharedState>,
    Query(params): Query<CampaignQuery>,
) -> Result<Json<Vec<Campaign>>> {
    let filter = match params.status.as_deref() {
        None | Some("active") => Some(CampaignStatus::Active),
        Some("completed") => Some(CampaignStatus::Completed),
        Some("paused") => Some(CampaignStatus::Paused),
        Some("all") => None,
        Some(other) => {
            return Err(AppError::InvalidRequest(format!(
                "unknown status filter: {other}"
            )))
        }
    };
    let campaigns = db::list_campaigns(&state.pool, filter).await?;
    Ok(Json(campaigns))
}

/// `GET /campaigns/:id`
pub async fn get_campaign(
    State(state): State<SharedState>,
    Path(campaign_id): Path<String>,
) -> Result<Json<Campaign>> {
    let campaign = db::get_campaign(&state.pool, &campaign_id)
        .await?
        .ok_or(AppError::NotFound("campaign"))?;
    Ok(Json(campaign))
}

// ─────────────────────────────────────────────────────────
// Donations
// ─────────────────────────────────────────────────────────

/// `POST /donations`
pub async fn create_donation(
    State(state): State<SharedState>,
    principal: Principal,
    Json(req): Json<CreateDonationRequest>,
) -> Result<Json<Value>> {
    let (donation, order) = ledger::create_donation(&state, &principal, req).await?;
    let razorpay_key = order.key_id.clone();
    Ok(Json(json!({
        "donation_id": donation.id,
        "order": order,
        "razorpay_key": razorpay_key,
    })))
}

/// `POST /donations/general` — undesignated donation, no campaign required.
pub async fn create_general_donation(
    State(state): State<SharedState>,
    principal: Principal,
    Json(req): Json<GeneralDonationRequest>,
) -> Result<Json<Value>> {
    let req = CreateDonationRequest {
        campaign_id: None,
        amount: req.amount,
        currency: req.currency,
        method: None,
        donation_type: Some(DonationType::General),
        want_80g: req.want_80g,
        pan: req.pan,
        legal_name: req.legal_name,
        address: req.address,
    };
    let (donation, order) = ledger::create_donation(&state, &principal, req).await?;
    let razorpay_key = order.key_id.clone();
    Ok(Json(json!({
        "donation_id": donation.id,
        "order": order,
        "razorpay_key": razorpay_key,
    })))
}

/// `GET /donations/my`
pub async fn my_donations(
    State(state): State<SharedState>,
    principal: Principal,
) -> Result<Json<Vec<DonationWithReceipt>>> {
    let donations = db::list_donations_for_user(&state.pool, &principal.user_id).await?;

    let mut result = Vec::with_capacity(donations.len());
    for donation in donations {
        let receipt = match &donation.receipt_id {
            Some(receipt_id) => db::get_receipt(&state.pool, receipt_id).await?,
            None => None,
        };
        let campaign_title = match &donation.campaign_id {
            Some(campaign_id) => db::get_campaign(&state.pool, campaign_id)
                .await?
                .map(|c| c.title),
            None => None,
        };
        result.push(DonationWithReceipt {
            donation,
            receipt,
            campaign_title,
        });
    }
    Ok(Json(result))
}

/// `POST /donations/:id/verify`
pub async fn verify_donation(
    State(state): State<SharedState>,
    principal: Principal,
    Path(donation_id): Path<String>,
    Json(proof): Json<VerifyRequest>,
) -> Result<Json<Value>> {
    let outcome = ledger::verify_donation(&state, &principal, &donation_id, proof).await?;
    let body = match outcome {
        VerifyOutcome::Verified { donation } => json!({
            "status": "success",
            "message": "Payment verified and receipt scheduled",
            "donation": donation,
        }),
        VerifyOutcome::AlreadyFinal { status } => json!({
            "status": status,
            "message": "already processed",
        }),
    };
    Ok(Json(body))
}

/// `GET /donations/:id/receipt` — the stored receipt document.
pub async fn download_receipt(
    State(state): State<SharedState>,
    principal: Principal,
    Path(donation_id): Path<String>,
) -> Result<Response> {
    let donation = db::get_donation(&state.pool, &donation_id)
        .await?
        .ok_or(AppError::NotFound("donation"))?;
    match donation.payer() {
        Some(Payer::RegisteredUser { user_id }) if user_id == principal.user_id => {}
        _ => principal.require_admin()?,
    }

    let receipt_id = donation
        .receipt_id
        .as_deref()
        .ok_or(AppError::NotFound("receipt"))?;
    let receipt = db::get_receipt(&state.pool, receipt_id)
        .await?
        .ok_or(AppError::NotFound("receipt"))?;
    let bytes = tokio::fs::read(state.storage_dir().join(&receipt.pdf_path))
        .await
        .map_err(|_| AppError::NotFound("receipt file"))?;

    Ok((
        [(header::CONTENT_TYPE, "text/html; charset=utf-8")],
        bytes,
    )
        .into_response())
}

/// `POST /admin/donations/:id/refund` (admin)
pub async fn refund_donation(
    State(state): State<SharedState>,
    principal: Principal,
    Path(donation_id): Path<String>,
    Json(req): Json<RefundRequest>,
) -> Result<Json<Value>> {
    let donation = ledger::refund_donation(&state, &principal, &donation_id, req).await?;
    Ok(Json(json!({ "status": "success", "donation": donation })))
}

// ─────────────────────────────────────────────────────────
// Webhooks
// ─────────────────────────────────────────────────────────

/// `POST /webhooks/razorpay`
///
/// Always answers 200 for business no-ops (unknown order, replay) so the
/// provider stops redelivering; only infrastructure failures error out.
pub async fn razorpay_webhook(
    State(state): State<SharedState>,
    Json(payload): Json<Value>,
) -> Result<Json<Value>> {
    let outcome = ledger::handle_webhook(&state, payload).await?;
    Ok(Json(json!({ "status": outcome })))
}

// ─────────────────────────────────────────────────────────
// Volunteer collections
// ─────────────────────────────────────────────────────────

/// `POST /volunteer/collect`
pub async fn collect_donation(
    State(state): State<SharedState>,
    principal: Principal,
    Json(req): Json<CollectRequest>,
) -> Result<Json<Value>> {
    let outcome = collection::collect_donation(&state, &principal, req).await?;
    let body = match outcome {
        CollectOutcome::PaymentRequired { donation, order } => {
            let razorpay_key = order.key_id.clone();
            json!({
                "status": "payment_required",
                "donation_id": donation.id,
                "order": order,
                "razorpay_key": razorpay_key,
            })
        }
        CollectOutcome::PendingDeposit { donation } => json!({
            "status": "pending_deposit",
            "donation": donation,
        }),
    };
    Ok(Json(body))
}

/// `POST /admin/collections/:id/confirm-deposit` (admin)
pub async fn confirm_cash_deposit(
    State(state): State<SharedState>,
    principal: Principal,
    Path(donation_id): Path<String>,
    Json(req): Json<ConfirmDepositRequest>,
) -> Result<Json<Value>> {
    let donation =
        collection::confirm_cash_deposit(&state, &principal, &donation_id, &req.volunteer_id)
            .await?;
    Ok(Json(json!({ "status": "success", "donation": donation })))
}

/// `GET /volunteers/:id/stats`
pub async fn volunteer_stats(
    State(state): State<SharedState>,
    principal: Principal,
    Path(volunteer_id): Path<String>,
) -> Result<Json<VolunteerStats>> {
    let stats = collection::volunteer_stats(&state, &principal, &volunteer_id).await?;
    Ok(Json(stats))
}

// ─────────────────────────────────────────────────────────
// Pledges
// ─────────────────────────────────────────────────────────

/// `POST /pledges`
pub async fn create_pledge(
    State(state): State<SharedState>,
    principal: Principal,
    Json(req): Json<CreatePledgeRequest>,
) -> Result<Json<Pledge>> {
    let pledge = pledges::create_pledge(&state, &principal, req).await?;
    Ok(Json(pledge))
}

/// `GET /pledges/my`
pub async fn my_pledges(
    State(state): State<SharedState>,
    principal: Principal,
) -> Result<Json<Vec<Pledge>>> {
    let pledges = pledges::list_my_pledges(&state, &principal).await?;
    Ok(Json(pledges))
}

/// `GET /pledges/:id`
pub async fn get_pledge(
    State(state): State<SharedState>,
    principal: Principal,
    Path(pledge_id): Path<String>,
) -> Result<Json<Pledge>> {
    let pledge = pledges::get_pledge(&state, &principal, &pledge_id).await?;
    Ok(Json(pledge))
}

/// `PATCH /pledges/:id?action=pause|cancel|activate`
pub async fn update_pledge(
    State(state): State<SharedState>,
    principal: Principal,
    Path(pledge_id): Path<String>,
    Query(params): Query<PledgeActionQuery>,
) -> Result<Json<Pledge>> {
    let pledge = pledges::update_pledge(&state, &principal, &pledge_id, &params.action).await?;
    Ok(Json(pledge))
}
