//! Recurring pledge manager.
//!
//! Schedule-only: a pledge records the intent and the next charge date, but
//! charge execution (which would materialize a donation through the ledger)
//! is a separate concern. Pledges never touch campaign aggregates.

use chrono::{Duration, Utc};
use tracing::info;
use uuid::Uuid;

use crate::auth::Principal;
use crate::db;
use crate::errors::{AppError, Result};
use crate::ledger::AppState;
use crate::models::{CreatePledgeRequest, Pledge, PledgeStatus};

pub async fn create_pledge(
    state: &AppState,
    principal: &Principal,
    req: CreatePledgeRequest,
) -> Result<Pledge> {
    if req.amount <= 0.0 {
        return Err(AppError::InvalidRequest(
            "pledge amount must be positive".to_string(),
        ));
    }
    let campaign = db::get_campaign(&state.pool, &req.campaign_id)
        .await?
        .ok_or(AppError::NotFound("campaign"))?;
    if !campaign.allow_recurring {
        return Err(AppError::InvalidRequest(
            "this campaign does not support recurring donations".to_string(),
        ));
    }

    let pledge = Pledge {
        id: Uuid::new_v4().to_string(),
        campaign_id: req.campaign_id,
        amount: req.amount,
        frequency: "monthly".to_string(),
        user_id: principal.user_id.clone(),
        status: PledgeStatus::Active,
        next_charge_at: Some(Utc::now() + Duration::days(30)),
        created_at: Utc::now(),
    };
    db::insert_pledge(&state.pool, &pledge).await?;

    info!("Created pledge {} on campaign {}", pledge.id, pledge.campaign_id);
    Ok(pledge)
}

pub async fn get_pledge(state: &AppState, principal: &Principal, id: &str) -> Result<Pledge> {
    let pledge = db::get_pledge(&state.pool, id)
        .await?
        .ok_or(AppError::NotFound("pledge"))?;
    if pledge.user_id != principal.user_id {
        principal.require_admin()?;
    }
    Ok(pledge)
}

pub async fn list_my_pledges(state: &AppState, principal: &Principal) -> Result<Vec<Pledge>> {
    db::list_pledges_for_user(&state.pool, &principal.user_id).await
}

/// Apply a `pause` / `cancel` / `activate` action. Owner only.
pub async fn update_pledge(
    state: &AppState,
    principal: &Principal,
    id: &str,
    action: &str,
) -> Result<Pledge> {
    let pledge = db::get_pledge(&state.pool, id)
        .await?
        .ok_or(AppError::NotFound("pledge"))?;
    if pledge.user_id != principal.user_id {
        return Err(AppError::Forbidden(
            "only the pledge owner may change it".to_string(),
        ));
    }

    let status = match action {
        "pause" => PledgeStatus::Paused,
        "cancel" => PledgeStatus::Cancelled,
        "activate" => PledgeStatus::Active,
        other => {
            return Err(AppError::InvalidRequest(format!(
                "unsupported action: {other}"
            )))
        }
    };
    db::set_pledge_status(&state.pool, id, status).await?;

    Ok(Pledge { status, ..pledge })
}

// ─────────────────────────────────────────────────────────
// Unit tests
// ─────────────────────────────────────────────────────────
