//! Shared fixtures for DB-backed tests: an in-memory database with the real
//! migrations applied, a mock-gateway application state, and entity seeds.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::auth::{Principal, Role};
use crate::config::Config;
use crate::db;
use crate::gateway::{MockGateway, PaymentGateway};
use crate::ledger::AppState;
use crate::models::{
    AttemptStatus, Campaign, CampaignStatus, Donation, DonationReceipt, DonationStatus,
    DonationType, PaymentAttempt, PaymentMethod, User,
};
use crate::notify::Notifier;

/// One connection, so every query in a test sees the same in-memory database.
pub async fn test_pool() -> SqlitePool {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .expect("in-memory pool");
    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .expect("migrations");
    pool
}

pub fn temp_storage_dir() -> PathBuf {
    std::env::temp_dir().join(format!("wfy-test-{}", Uuid::new_v4()))
}

pub async fn test_state() -> Arc<AppState> {
    state_with_gateway(Arc::new(MockGateway)).await
}

pub async fn state_with_gateway(gateway: Arc<dyn PaymentGateway>) -> Arc<AppState> {
    let pool = test_pool().await;
    let storage = temp_storage_dir();
    Arc::new(AppState {
        pool,
        gateway,
        config: Config {
            database_url: "sqlite::memory:".to_string(),
            api_port: 0,
            use_mock_payment: true,
            razorpay_key_id: String::new(),
            razorpay_key_secret: String::new(),
            gateway_timeout_secs: 5,
            storage_dir: storage.to_string_lossy().into_owned(),
            admin_alert_email: "admin@example.org".to_string(),
        },
        notifier: Notifier::new(),
    })
}

pub fn principal(user: &User) -> Principal {
    Principal {
        user_id: user.id.clone(),
        roles: user.roles.split(',').filter_map(Role::parse).collect(),
    }
}

// ─────────────────────────────────────────────────────────
// Seeds
// ─────────────────────────────────────────────────────────

pub async fn seed_user(pool: &SqlitePool, roles: &str) -> User {
    let id = Uuid::new_v4().to_string();
    let user = User {
        id: id.clone(),
        email: format!("{id}@example.org"),
        full_name: "Test User".to_string(),
        phone: Some("+911112223334".to_string()),
        roles: roles.to_string(),
        created_at: Utc::now(),
    };
    db::insert_user(pool, &user).await.expect("seed user");
    user
}

pub async fn seed_campaign(pool: &SqlitePool, current_amount: f64, donor_count: i64) -> Campaign {
    seed_campaign_with(pool, current_amount, donor_count, false).await
}

pub async fn seed_recurring_campaign(pool: &SqlitePool) -> Campaign {
    seed_campaign_with(pool, 0.0, 0, true).await
}

async fn seed_campaign_with(
    pool: &SqlitePool,
    current_amount: f64,
    donor_count: i64,
    allow_recurring: bool,
) -> Campaign {
    let campaign = Campaign {
        id: Uuid::new_v4().to_string(),
        title: "Flood Relief".to_string(),
        description: "Emergency relief fund".to_string(),
        goal_amount: 1_000_000.0,
        currency: "INR".to_string(),
        current_amount,
        donor_count,
        status: CampaignStatus::Active,
        allow_recurring,
        created_by: "seed-admin".to_string(),
        created_at: Utc::now(),
    };
    db::insert_campaign(pool, &campaign)
        .await
        .expect("seed campaign");
    campaign
}

/// A bare donation skeleton tests mutate before persisting or rendering.
pub fn donation_fixture() -> Donation {
    let now = Utc::now();
    Donation {
        id: Uuid::new_v4().to_string(),
        campaign_id: None,
        amount: 100.0,
        currency: "INR".to_string(),
        donation_type: DonationType::General,
        user_id: None,
        donor_name: None,
        donor_phone: None,
        donor_email: None,
        collected_by: None,
        method: None,
        want_80g: false,
        pan: None,
        legal_name: None,
        address: None,
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
    }
}

pub async fn seed_pending_donation(
    pool: &SqlitePool,
    campaign_id: Option<&str>,
    amount: f64,
) -> Donation {
    let mut donation = donation_fixture();
    donation.campaign_id = campaign_id.map(str::to_string);
    donation.amount = amount;
    db::insert_donation(pool, &donation)
        .await
        .expect("seed donation");
    donation
}

pub async fn seed_success_donation(
    pool: &SqlitePool,
    campaign_id: Option<&str>,
    user_id: &str,
    amount: f64,
) -> Donation {
    let mut donation = donation_fixture();
    donation.campaign_id = campaign_id.map(str::to_string);
    donation.amount = amount;
    donation.user_id = Some(user_id.to_string());
    donation.donation_type = if campaign_id.is_some() {
        DonationType::Campaign
    } else {
        DonationType::General
    };
    donation.status = DonationStatus::Success;
    donation.payment_ref = Some(format!("pay_seed_{}", &donation.id[..8]));
    db::insert_donation(pool, &donation)
        .await
        .expect("seed donation");
    donation
}

/// Walk-in cash collection awaiting deposit confirmation.
pub async fn seed_cash_donation(
    pool: &SqlitePool,
    campaign_id: &str,
    volunteer_id: &str,
    amount: f64,
) -> Donation {
    let mut donation = walk_in_base(campaign_id, volunteer_id, amount);
    donation.method = Some(PaymentMethod::Cash);
    donation.status = DonationStatus::PendingDeposit;
    db::insert_donation(pool, &donation)
        .await
        .expect("seed donation");
    donation
}

pub async fn seed_confirmed_cash_donation(
    pool: &SqlitePool,
    campaign_id: &str,
    volunteer_id: &str,
    amount: f64,
) -> Donation {
    let mut donation = walk_in_base(campaign_id, volunteer_id, amount);
    donation.method = Some(PaymentMethod::Cash);
    donation.status = DonationStatus::Success;
    donation.payment_ref = Some("cash".to_string());
    donation.deposit_confirmed = true;
    donation.deposit_confirmed_by = Some("seed-admin".to_string());
    donation.deposit_confirmed_at = Some(Utc::now());
    db::insert_donation(pool, &donation)
        .await
        .expect("seed donation");
    donation
}

pub async fn seed_collected_online_success(
    pool: &SqlitePool,
    campaign_id: &str,
    volunteer_id: &str,
    amount: f64,
) -> Donation {
    let mut donation = walk_in_base(campaign_id, volunteer_id, amount);
    donation.status = DonationStatus::Success;
    donation.payment_ref = Some(format!("pay_seed_{}", &donation.id[..8]));
    db::insert_donation(pool, &donation)
        .await
        .expect("seed donation");
    donation
}

pub async fn seed_walk_in_pending(
    pool: &SqlitePool,
    campaign_id: &str,
    volunteer_id: &str,
    amount: f64,
) -> Donation {
    let donation = walk_in_base(campaign_id, volunteer_id, amount);
    db::insert_donation(pool, &donation)
        .await
        .expect("seed donation");
    donation
}

fn walk_in_base(campaign_id: &str, volunteer_id: &str, amount: f64) -> Donation {
    let mut donation = donation_fixture();
    donation.campaign_id = Some(campaign_id.to_string());
    donation.amount = amount;
    donation.donation_type = DonationType::OnBehalf;
    donation.donor_name = Some("Asha Rao".to_string());
    donation.donor_phone = Some("+911234567890".to_string());
    donation.collected_by = Some(volunteer_id.to_string());
    donation
}

pub async fn seed_attempt(pool: &SqlitePool, donation_id: &str, order_id: &str) -> PaymentAttempt {
    let attempt = PaymentAttempt {
        id: Uuid::new_v4().to_string(),
        donation_id: Some(donation_id.to_string()),
        pledge_id: None,
        attempt_no: 1,
        status: AttemptStatus::Initiated,
        provider_order_id: Some(order_id.to_string()),
        provider_payload: format!(r#"{{"id":"{order_id}"}}"#),
        created_at: Utc::now(),
    };
    db::insert_attempt(pool, &attempt).await.expect("seed attempt");
    attempt
}

/// Poll for the detached receipt task to land. Issuance is fire-and-forget,
/// so tests wait rather than assume ordering.
pub async fn wait_for_receipt(pool: &SqlitePool, donation_id: &str) -> DonationReceipt {
    for _ in 0..500 {
        if let Some(receipt) = db::get_receipt_for_donation(pool, donation_id)
            .await
            .expect("receipt query")
        {
            return receipt;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("receipt for donation {donation_id} was not issued in time");
}
