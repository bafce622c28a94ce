//! Persisted entities and request/response shapes for the donation backend.
//!
//! Donation status is an explicit finite state machine; the only legal
//! transitions are the ones [`DonationStatus::can_transition`] admits, and
//! every write path guards its transition with a conditional update against
//! the expected pre-state.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::errors::{AppError, Result};

// ─────────────────────────────────────────────────────────
// Status enums
// ─────────────────────────────────────────────────────────

/// Donation lifecycle states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(type_name = "TEXT", rename_all = "snake_case")]
pub enum DonationStatus {
    /// Awaiting online payment confirmation.
    Pending,
    /// Cash physically collected by a volunteer, not yet in the bank.
    PendingDeposit,
    Success,
    Failed,
    Refunded,
}

impl DonationStatus {
    /// The transition table. Anything not listed here is rejected with
    /// `InvalidState` by the callers.
    pub fn can_transition(self, to: DonationStatus) -> bool {
        matches!(
            (self, to),
            (DonationStatus::Pending, DonationStatus::Success)
                | (DonationStatus::Pending, DonationStatus::Failed)
                | (DonationStatus::PendingDeposit, DonationStatus::Success)
                | (DonationStatus::Success, DonationStatus::Refunded)
        )
    }

    /// States in which payment verification is a no-op: re-verifying reports
    /// the current state instead of re-applying side effects.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            DonationStatus::Success | DonationStatus::Failed | DonationStatus::Refunded
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            DonationStatus::Pending => "pending",
            DonationStatus::PendingDeposit => "pending_deposit",
            DonationStatus::Success => "success",
            DonationStatus::Failed => "failed",
            DonationStatus::Refunded => "refunded",
        }
    }
}

/// Donation classification tags carried through to receipts and reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "TEXT")]
pub enum DonationType {
    #[serde(rename = "CAMPAIGN")]
    #[sqlx(rename = "CAMPAIGN")]
    Campaign,
    #[serde(rename = "GENERAL")]
    #[sqlx(rename = "GENERAL")]
    General,
    #[serde(rename = "EVENT_FEE")]
    #[sqlx(rename = "EVENT_FEE")]
    EventFee,
    /// Collected by a volunteer, receipted under the donor's identity.
    #[serde(rename = "ON_BEHALF")]
    #[sqlx(rename = "ON_BEHALF")]
    OnBehalf,
    #[serde(rename = "VOLUNTEER_OWN")]
    #[sqlx(rename = "VOLUNTEER_OWN")]
    VolunteerOwn,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(type_name = "TEXT", rename_all = "snake_case")]
pub enum PaymentMethod {
    Upi,
    Card,
    Netbanking,
    Cash,
}

impl PaymentMethod {
    pub fn as_str(self) -> &'static str {
        match self {
            PaymentMethod::Upi => "upi",
            PaymentMethod::Card => "card",
            PaymentMethod::Netbanking => "netbanking",
            PaymentMethod::Cash => "cash",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(type_name = "TEXT", rename_all = "snake_case")]
pub enum AttemptStatus {
    Initiated,
    Success,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(type_name = "TEXT", rename_all = "snake_case")]
pub enum CampaignStatus {
    Active,
    Completed,
    Paused,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(type_name = "TEXT", rename_all = "snake_case")]
pub enum PledgeStatus {
    Active,
    Paused,
    Cancelled,
}

// ─────────────────────────────────────────────────────────
// Entities
// ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct User {
    pub id: String,
    pub email: String,
    pub full_name: String,
    pub phone: Option<String>,
    /// Comma-separated role list, e.g. `admin,volunteer`.
    pub roles: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Campaign {
    pub id: String,
    pub title: String,
    pub description: String,
    pub goal_amount: f64,
    pub currency: String,
    /// Running sum of confirmed donations minus refunds. Maintained
    /// exclusively by the ledger through single-statement increments.
    pub current_amount: f64,
    /// Count of successful donations, not distinct donors. Refunds do not
    /// decrement it.
    pub donor_count: i64,
    pub status: CampaignStatus,
    pub allow_recurring: bool,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Donation {
    pub id: String,
    /// `None` means a general/undesignated donation.
    pub campaign_id: Option<String>,
    pub amount: f64,
    pub currency: String,
    pub donation_type: DonationType,
    pub user_id: Option<String>,
    pub donor_name: Option<String>,
    pub donor_phone: Option<String>,
    pub donor_email: Option<String>,
    /// Volunteer who collected this donation, for the collection path.
    pub collected_by: Option<String>,
    pub method: Option<PaymentMethod>,
    pub want_80g: bool,
    pub pan: Option<String>,
    pub legal_name: Option<String>,
    pub address: Option<String>,
    pub status: DonationStatus,
    pub payment_provider: String,
    pub payment_ref: Option<String>,
    pub refund_ref: Option<String>,
    pub refund_note: Option<String>,
    pub receipt_id: Option<String>,
    pub deposit_confirmed: bool,
    pub deposit_confirmed_by: Option<String>,
    pub deposit_confirmed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Who pays for (and is receipted for) a donation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Payer {
    RegisteredUser {
        user_id: String,
    },
    /// Free-form donor captured by a volunteer; no account required.
    WalkInDonor {
        name: String,
        phone: String,
        email: Option<String>,
    },
}

impl Donation {
    pub fn payer(&self) -> Option<Payer> {
        if let Some(user_id) = &self.user_id {
            Some(Payer::RegisteredUser {
                user_id: user_id.clone(),
            })
        } else {
            self.donor_name.as_ref().map(|name| Payer::WalkInDonor {
                name: name.clone(),
                phone: self.donor_phone.clone().unwrap_or_default(),
                email: self.donor_email.clone(),
            })
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct PaymentAttempt {
    pub id: String,
    pub donation_id: Option<String>,
    pub pledge_id: Option<String>,
    pub attempt_no: i64,
    pub status: AttemptStatus,
    /// Order identifier extracted from the payload for webhook correlation.
    pub provider_order_id: Option<String>,
    /// Opaque provider order object, stored as JSON text.
    pub provider_payload: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct DonationReceipt {
    pub id: String,
    pub donation_id: String,
    pub receipt_number: String,
    /// Financial-year label, e.g. `2024-25`.
    pub fy: String,
    pub pdf_path: String,
    pub section_80g: bool,
    /// 80G acknowledgment number, attached later out of band.
    pub ack_no: Option<String>,
    pub issued_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Pledge {
    pub id: String,
    pub campaign_id: String,
    pub amount: f64,
    pub frequency: String,
    pub user_id: String,
    pub status: PledgeStatus,
    pub next_charge_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// Read-time aggregate of a volunteer's collections. Recomputed on every
/// query, never cached.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct VolunteerStats {
    pub total_collected: f64,
    pub cash_collected: f64,
    pub online_collected: f64,
    pub pending_deposit_amount: f64,
    pub collected_count: i64,
    pub pending_deposit_count: i64,
}

// ─────────────────────────────────────────────────────────
// Request shapes
// ─────────────────────────────────────────────────────────

fn default_currency() -> String {
    "INR".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateDonationRequest {
    pub campaign_id: Option<String>,
    pub amount: f64,
    #[serde(default = "default_currency")]
    pub currency: String,
    pub method: Option<PaymentMethod>,
    pub donation_type: Option<DonationType>,
    #[serde(default)]
    pub want_80g: bool,
    pub pan: Option<String>,
    pub legal_name: Option<String>,
    pub address: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct VerifyRequest {
    pub razorpay_order_id: String,
    pub razorpay_payment_id: String,
    pub razorpay_signature: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RefundRequest {
    /// `None` refunds the full original amount.
    pub amount: Option<f64>,
    pub note: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CollectionMode {
    Cash,
    Online,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CollectRequest {
    pub campaign_id: String,
    pub donor_name: String,
    pub donor_phone: String,
    pub donor_email: Option<String>,
    pub amount: f64,
    pub mode: CollectionMode,
    #[serde(default)]
    pub want_80g: bool,
    pub pan: Option<String>,
    pub legal_name: Option<String>,
    pub address: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ConfirmDepositRequest {
    pub volunteer_id: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreatePledgeRequest {
    pub campaign_id: String,
    pub amount: f64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateCampaignRequest {
    pub title: String,
    pub description: String,
    pub goal_amount: f64,
    #[serde(default = "default_currency")]
    pub currency: String,
    #[serde(default)]
    pub allow_recurring: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GeneralDonationRequest {
    pub amount: f64,
    #[serde(default = "default_currency")]
    pub currency: String,
    #[serde(default)]
    pub want_80g: bool,
    pub pan: Option<String>,
    pub legal_name: Option<String>,
    pub address: Option<String>,
}

/// A donation joined with its receipt and campaign title for listings.
#[derive(Debug, Clone, Serialize)]
pub struct DonationWithReceipt {
    #[serde(flatten)]
    pub donation: Donation,
    pub receipt: Option<DonationReceipt>,
    pub campaign_title: Option<String>,
}

/// 80G receipts require PAN and legal name together.
pub fn validate_80g(want_80g: bool, pan: Option<&str>, legal_name: Option<&str>) -> Result<()> {
    if want_80g {
        let pan_ok = pan.is_some_and(|p| !p.trim().is_empty());
        let name_ok = legal_name.is_some_and(|n| !n.trim().is_empty());
        if !pan_ok || !name_ok {
            return Err(AppError::InvalidRequest(
                "PAN and legal name are required for an 80G receipt".to_string(),
            ));
        }
    }
    Ok(())
}

// ─────────────────────────────────────────────────────────
// Unit tests
// ─────────────────────────────────────────────────────────
