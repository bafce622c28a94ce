//! Database layer — migrations, queries, and the atomic update primitives.
//!
//! Every cross-request mutation is a single conditional statement: donation
//! status changes are compare-and-set on the expected pre-state (the
//! rows-affected count decides the winner under concurrency), campaign
//! aggregates move through one relative `UPDATE`, and receipt numbers come
//! from an `UPDATE ... RETURNING` on a single-row counter.

use chrono::Utc;
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::{Executor, Sqlite, SqlitePool};
use tracing::info;

use crate::errors::Result;
use crate::models::{
    Campaign, CampaignStatus, Donation, DonationReceipt, DonationStatus, PaymentAttempt,
    PaymentMethod, Pledge, PledgeStatus, User, VolunteerStats,
};

/// Establish a SQLite connection pool and run pending migrations.
pub async fn init_pool(database_url: &str) -> Result<SqlitePool> {
    // Make sure the file is created if it doesn't exist yet.
    let url = if database_url.starts_with("sqlite:") {
        database_url.to_string()
    } else {
        format!("sqlite:{database_url}")
    };

    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect(&url)
        .await?;

    sqlx::migrate!("./migrations").run(&pool).await?;
    info!("Database migrations applied successfully");
    Ok(pool)
}

const DONATION_COLUMNS: &str = "id, campaign_id, amount, currency, donation_type, user_id, \
     donor_name, donor_phone, donor_email, collected_by, method, want_80g, pan, legal_name, \
     address, status, payment_provider, payment_ref, refund_ref, refund_note, receipt_id, \
     deposit_confirmed, deposit_confirmed_by, deposit_confirmed_at, created_at, updated_at";

// ─────────────────────────────────────────────────────────
// Users
// ─────────────────────────────────────────────────────────

pub async fn insert_user(pool: &SqlitePool, user: &User) -> Result<()> {
    sqlx::query(
        "INSERT INTO users (id, email, full_name, phone, roles, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
    )
    .bind(&user.id)
    .bind(&user.email)
    .bind(&user.full_name)
    .bind(&user.phone)
    .bind(&user.roles)
    .bind(user.created_at)
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn get_user(pool: &SqlitePool, id: &str) -> Result<Option<User>> {
    let row = sqlx::query_as::<_, User>(
        "SELECT id, email, full_name, phone, roles, created_at FROM users WHERE id = ?1",
    )
    .bind(id)
    .fetch_optional(pool)
    .await?;
    Ok(row)
}

// ─────────────────────────────────────────────────────────
// Campaigns
// ─────────────────────────────────────────────────────────

const CAMPAIGN_COLUMNS: &str = "id, title, description, goal_amount, currency, current_amount, \
     donor_count, status, allow_recurring, created_by, created_at";

pub async fn insert_campaign(pool: &SqlitePool, campaign: &Campaign) -> Result<()> {
    sqlx::query(
        "INSERT INTO campaigns
             (id, title, description, goal_amount, currency, current_amount, donor_count,
              status, allow_recurring, created_by, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
    )
    .bind(&campaign.id)
    .bind(&campaign.title)
    .bind(&campaign.description)
    .bind(campaign.goal_amount)
    .bind(&campaign.currency)
    .bind(campaign.current_amount)
    .bind(campaign.donor_count)
    .bind(campaign.status)
    .bind(campaign.allow_recurring)
    .bind(&campaign.created_by)
    .bind(campaign.created_at)
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn get_campaign(pool: &SqlitePool, id: &str) -> Result<Option<Campaign>> {
    let sql = format!("SELECT {CAMPAIGN_COLUMNS} FROM campaigns WHERE id = ?1");
    let row = sqlx::query_as::<_, Campaign>(&sql)
        .bind(id)
        .fetch_optional(pool)
        .await?;
    Ok(row)
}

pub async fn list_campaigns(
    pool: &SqlitePool,
    status: Option<CampaignStatus>,
) -> Result<Vec<Campaign>> {
    let rows = match status {
        Some(status) => {
            let sql = format!(
                "SELECT {CAMPAIGN_COLUMNS} FROM campaigns WHERE status = ?1 ORDER BY created_at DESC"
            );
            sqlx::query_as::<_, Campaign>(&sql)
                .bind(status)
                .fetch_all(pool)
                .await?
        }
        None => {
            let sql = format!("SELECT {CAMPAIGN_COLUMNS} FROM campaigns ORDER BY created_at DESC");
            sqlx::query_as::<_, Campaign>(&sql).fetch_all(pool).await?
        }
    };
    Ok(rows)
}

/// Apply a relative change to a campaign's running totals in one statement.
/// Callers never read-modify-write these fields.
pub async fn adjust_campaign_totals<'e, E>(
    executor: E,
    campaign_id: &str,
    amount_delta: f64,
    donor_delta: i64,
) -> Result<()>
where
    E: Executor<'e, Database = Sqlite>,
{
    sqlx::query(
        "UPDATE campaigns
         SET    current_amount = current_amount + ?1,
                donor_count    = donor_count + ?2
         WHERE  id = ?3",
    )
    .bind(amount_delta)
    .bind(donor_delta)
    .bind(campaign_id)
    .execute(executor)
    .await?;
    Ok(())
}

// ─────────────────────────────────────────────────────────
// Donations
// ─────────────────────────────────────────────────────────

pub async fn insert_donation<'e, E>(executor: E, donation: &Donation) -> Result<()>
where
    E: Executor<'e, Database = Sqlite>,
{
    sqlx::query(
        "INSERT INTO donations
             (id, campaign_id, amount, currency, donation_type, user_id, donor_name,
              donor_phone, donor_email, collected_by, method, want_80g, pan, legal_name,
              address, status, payment_provider, payment_ref, refund_ref, refund_note,
              receipt_id, deposit_confirmed, deposit_confirmed_by, deposit_confirmed_at,
              created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16,
                 ?17, ?18, ?19, ?20, ?21, ?22, ?23, ?24, ?25, ?26)",
    )
    .bind(&donation.id)
    .bind(&donation.campaign_id)
    .bind(donation.amount)
    .bind(&donation.currency)
    .bind(donation.donation_type)
    .bind(&donation.user_id)
    .bind(&donation.donor_name)
    .bind(&donation.donor_phone)
    .bind(&donation.donor_email)
    .bind(&donation.collected_by)
    .bind(donation.method)
    .bind(donation.want_80g)
    .bind(&donation.pan)
    .bind(&donation.legal_name)
    .bind(&donation.address)
    .bind(donation.status)
    .bind(&donation.payment_provider)
    .bind(&donation.payment_ref)
    .bind(&donation.refund_ref)
    .bind(&donation.refund_note)
    .bind(&donation.receipt_id)
    .bind(donation.deposit_confirmed)
    .bind(&donation.deposit_confirmed_by)
    .bind(donation.deposit_confirmed_at)
    .bind(donation.created_at)
    .bind(donation.updated_at)
    .execute(executor)
    .await?;
    Ok(())
}

pub async fn get_donation(pool: &SqlitePool, id: &str) -> Result<Option<Donation>> {
    let sql = format!("SELECT {DONATION_COLUMNS} FROM donations WHERE id = ?1");
    let row = sqlx::query_as::<_, Donation>(&sql)
        .bind(id)
        .fetch_optional(pool)
        .await?;
    Ok(row)
}

pub async fn list_donations_for_user(pool: &SqlitePool, user_id: &str) -> Result<Vec<Donation>> {
    let sql = format!(
        "SELECT {DONATION_COLUMNS} FROM donations WHERE user_id = ?1 ORDER BY created_at DESC"
    );
    let rows = sqlx::query_as::<_, Donation>(&sql)
        .bind(user_id)
        .fetch_all(pool)
        .await?;
    Ok(rows)
}

/// CAS `pending -> success`, recording the provider payment reference.
/// Returns `false` when another confirmation already won.
pub async fn mark_success<'e, E>(executor: E, donation_id: &str, payment_ref: &str) -> Result<bool>
where
    E: Executor<'e, Database = Sqlite>,
{
    let result = sqlx::query(
        "UPDATE donations
         SET    status = ?1, payment_ref = ?2, updated_at = ?3
         WHERE  id = ?4 AND status = ?5",
    )
    .bind(DonationStatus::Success)
    .bind(payment_ref)
    .bind(Utc::now())
    .bind(donation_id)
    .bind(DonationStatus::Pending)
    .execute(executor)
    .await?;
    Ok(result.rows_affected() > 0)
}

/// CAS `pending -> failed`.
pub async fn mark_failed<'e, E>(executor: E, donation_id: &str) -> Result<bool>
where
    E: Executor<'e, Database = Sqlite>,
{
    let result = sqlx::query(
        "UPDATE donations
         SET    status = ?1, updated_at = ?2
         WHERE  id = ?3 AND status = ?4",
    )
    .bind(DonationStatus::Failed)
    .bind(Utc::now())
    .bind(donation_id)
    .bind(DonationStatus::Pending)
    .execute(executor)
    .await?;
    Ok(result.rows_affected() > 0)
}

/// CAS `success -> refunded`, recording the refund reference and note.
pub async fn mark_refunded<'e, E>(
    executor: E,
    donation_id: &str,
    refund_ref: &str,
    refund_note: Option<&str>,
) -> Result<bool>
where
    E: Executor<'e, Database = Sqlite>,
{
    let result = sqlx::query(
        "UPDATE donations
         SET    status = ?1, refund_ref = ?2, refund_note = ?3, updated_at = ?4
         WHERE  id = ?5 AND status = ?6",
    )
    .bind(DonationStatus::Refunded)
    .bind(refund_ref)
    .bind(refund_note)
    .bind(Utc::now())
    .bind(donation_id)
    .bind(DonationStatus::Success)
    .execute(executor)
    .await?;
    Ok(result.rows_affected() > 0)
}

/// CAS `pending_deposit -> success` for a cash donation collected by the
/// named volunteer, stamping the confirming admin.
pub async fn confirm_deposit<'e, E>(
    executor: E,
    donation_id: &str,
    volunteer_id: &str,
    admin_id: &str,
) -> Result<bool>
where
    E: Executor<'e, Database = Sqlite>,
{
    let now = Utc::now();
    let result = sqlx::query(
        "UPDATE donations
         SET    status = ?1, deposit_confirmed = 1, deposit_confirmed_by = ?2,
                deposit_confirmed_at = ?3, updated_at = ?3
         WHERE  id = ?4 AND status = ?5 AND method = ?6 AND collected_by = ?7",
    )
    .bind(DonationStatus::Success)
    .bind(admin_id)
    .bind(now)
    .bind(donation_id)
    .bind(DonationStatus::PendingDeposit)
    .bind(PaymentMethod::Cash)
    .bind(volunteer_id)
    .execute(executor)
    .await?;
    Ok(result.rows_affected() > 0)
}

pub async fn set_receipt_id(pool: &SqlitePool, donation_id: &str, receipt_id: &str) -> Result<()> {
    sqlx::query("UPDATE donations SET receipt_id = ?1, updated_at = ?2 WHERE id = ?3")
        .bind(receipt_id)
        .bind(Utc::now())
        .bind(donation_id)
        .execute(pool)
        .await?;
    Ok(())
}

// ─────────────────────────────────────────────────────────
// Payment attempts
// ─────────────────────────────────────────────────────────

const ATTEMPT_COLUMNS: &str = "id, donation_id, pledge_id, attempt_no, status, \
     provider_order_id, provider_payload, created_at";

pub async fn insert_attempt<'e, E>(executor: E, attempt: &PaymentAttempt) -> Result<()>
where
    E: Executor<'e, Database = Sqlite>,
{
    sqlx::query(
        "INSERT INTO payment_attempts
             (id, donation_id, pledge_id, attempt_no, status, provider_order_id,
              provider_payload, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
    )
    .bind(&attempt.id)
    .bind(&attempt.donation_id)
    .bind(&attempt.pledge_id)
    .bind(attempt.attempt_no)
    .bind(attempt.status)
    .bind(&attempt.provider_order_id)
    .bind(&attempt.provider_payload)
    .bind(attempt.created_at)
    .execute(executor)
    .await?;
    Ok(())
}

/// Look up the attempt holding a given provider order id — the webhook's
/// correlation path.
pub async fn find_attempt_by_order_id(
    pool: &SqlitePool,
    order_id: &str,
) -> Result<Option<PaymentAttempt>> {
    let sql = format!(
        "SELECT {ATTEMPT_COLUMNS} FROM payment_attempts WHERE provider_order_id = ?1
         ORDER BY created_at DESC LIMIT 1"
    );
    let row = sqlx::query_as::<_, PaymentAttempt>(&sql)
        .bind(order_id)
        .fetch_optional(pool)
        .await?;
    Ok(row)
}

// ─────────────────────────────────────────────────────────
// Receipts
// ─────────────────────────────────────────────────────────

/// Allocate the next receipt sequence value. Atomic across all donations;
/// numbers may have gaps under failure but are never reused.
pub async fn next_receipt_number(pool: &SqlitePool) -> Result<i64> {
    let value: i64 =
        sqlx::query_scalar("UPDATE receipt_counter SET value = value + 1 WHERE id = 1 RETURNING value")
            .fetch_one(pool)
            .await?;
    Ok(value)
}

pub async fn insert_receipt(pool: &SqlitePool, receipt: &DonationReceipt) -> Result<()> {
    sqlx::query(
        "INSERT INTO donation_receipts
             (id, donation_id, receipt_number, fy, pdf_path, section_80g, ack_no, issued_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
    )
    .bind(&receipt.id)
    .bind(&receipt.donation_id)
    .bind(&receipt.receipt_number)
    .bind(&receipt.fy)
    .bind(&receipt.pdf_path)
    .bind(receipt.section_80g)
    .bind(&receipt.ack_no)
    .bind(receipt.issued_at)
    .execute(pool)
    .await?;
    Ok(())
}

const RECEIPT_COLUMNS: &str =
    "id, donation_id, receipt_number, fy, pdf_path, section_80g, ack_no, issued_at";

pub async fn get_receipt(pool: &SqlitePool, id: &str) -> Result<Option<DonationReceipt>> {
    let sql = format!("SELECT {RECEIPT_COLUMNS} FROM donation_receipts WHERE id = ?1");
    let row = sqlx::query_as::<_, DonationReceipt>(&sql)
        .bind(id)
        .fetch_optional(pool)
        .await?;
    Ok(row)
}

pub async fn get_receipt_for_donation(
    pool: &SqlitePool,
    donation_id: &str,
) -> Result<Option<DonationReceipt>> {
    let sql = format!("SELECT {RECEIPT_COLUMNS} FROM donation_receipts WHERE donation_id = ?1");
    let row = sqlx::query_as::<_, DonationReceipt>(&sql)
        .bind(donation_id)
        .fetch_optional(pool)
        .await?;
    Ok(row)
}

// ─────────────────────────────────────────────────────────
// Pledges
// ─────────────────────────────────────────────────────────

const PLEDGE_COLUMNS: &str =
    "id, campaign_id, amount, frequency, user_id, status, next_charge_at, created_at";

pub async fn insert_pledge(pool: &SqlitePool, pledge: &Pledge) -> Result<()> {
    sqlx::query(
        "INSERT INTO pledges
             (id, campaign_id, amount, frequency, user_id, status, next_charge_at, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
    )
    .bind(&pledge.id)
    .bind(&pledge.campaign_id)
    .bind(pledge.amount)
    .bind(&pledge.frequency)
    .bind(&pledge.user_id)
    .bind(pledge.status)
    .bind(pledge.next_charge_at)
    .bind(pledge.created_at)
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn get_pledge(pool: &SqlitePool, id: &str) -> Result<Option<Pledge>> {
    let sql = format!("SELECT {PLEDGE_COLUMNS} FROM pledges WHERE id = ?1");
    let row = sqlx::query_as::<_, Pledge>(&sql)
        .bind(id)
        .fetch_optional(pool)
        .await?;
    Ok(row)
}

pub async fn list_pledges_for_user(pool: &SqlitePool, user_id: &str) -> Result<Vec<Pledge>> {
    let sql = format!(
        "SELECT {PLEDGE_COLUMNS} FROM pledges WHERE user_id = ?1 ORDER BY created_at DESC"
    );
    let rows = sqlx::query_as::<_, Pledge>(&sql)
        .bind(user_id)
        .fetch_all(pool)
        .await?;
    Ok(rows)
}

pub async fn set_pledge_status(pool: &SqlitePool, id: &str, status: PledgeStatus) -> Result<()> {
    sqlx::query("UPDATE pledges SET status = ?1 WHERE id = ?2")
        .bind(status)
        .bind(id)
        .execute(pool)
        .await?;
    Ok(())
}

// ─────────────────────────────────────────────────────────
// Volunteer statistics
// ─────────────────────────────────────────────────────────

/// Derived at read time from the volunteer's donations; intentionally not a
/// stored aggregate, so it can never drift from the ledger.
pub async fn volunteer_stats(pool: &SqlitePool, volunteer_id: &str) -> Result<VolunteerStats> {
    let stats = sqlx::query_as::<_, VolunteerStats>(
        "SELECT
             COALESCE(SUM(CASE WHEN status = 'success' THEN amount END), 0.0)
                 AS total_collected,
             COALESCE(SUM(CASE WHEN status = 'success' AND method = 'cash' THEN amount END), 0.0)
                 AS cash_collected,
             COALESCE(SUM(CASE WHEN status = 'success' AND COALESCE(method, '') <> 'cash'
                               THEN amount END), 0.0)
                 AS online_collected,
             COALESCE(SUM(CASE WHEN status = 'pending_deposit' THEN amount END), 0.0)
                 AS pending_deposit_amount,
             COUNT(CASE WHEN status = 'success' THEN 1 END)
                 AS collected_count,
             COUNT(CASE WHEN status = 'pending_deposit' THEN 1 END)
                 AS pending_deposit_count
         FROM donations
         WHERE collected_by = ?1",
    )
    .bind(volunteer_id)
    .fetch_one(pool)
    .await?;
    Ok(stats)
}

// ─────────────────────────────────────────────────────────
// Unit tests
// ─────────────────────────────────────────────────────────
