//! Receipt issuer — numbering, financial-year derivation, rendering, and
//! the fire-and-forget issuance task.
//!
//! Issuance runs detached from the payment confirmation that triggered it:
//! a failure here is logged and retried out of band, never surfaced to the
//! verify/webhook caller. Receipt numbers come from a global atomic counter
//! and may be non-contiguous under failure, but are never duplicated.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Datelike, Utc};
use sqlx::SqlitePool;
use tracing::{error, info};
use uuid::Uuid;

use crate::db;
use crate::errors::{AppError, Result};
use crate::models::{Donation, DonationReceipt, Payer};

/// Financial years run April through March: April 2024 onwards is `2024-25`,
/// March 2024 is still `2023-24`.
pub fn financial_year(date: DateTime<Utc>) -> String {
    let year = date.year();
    if date.month() >= 4 {
        format!("{}-{:02}", year, (year + 1) % 100)
    } else {
        format!("{}-{:02}", year - 1, year % 100)
    }
}

pub fn format_receipt_number(year: i32, seq: i64) -> String {
    format!("WFY{year}{seq:05}")
}

// ─────────────────────────────────────────────────────────
// Rendering
// ─────────────────────────────────────────────────────────

pub struct ReceiptContext<'a> {
    pub donation: &'a Donation,
    /// Registered full name or the walk-in donor name.
    pub payer_name: &'a str,
    pub payer_email: Option<&'a str>,
    pub campaign_title: &'a str,
    pub receipt_number: &'a str,
    pub fy: &'a str,
    pub section_80g: bool,
    pub ack_no: Option<&'a str>,
}

/// Render the receipt document. Pure function of its inputs; the bytes are
/// what gets stored, so everything tax-relevant must appear here.
pub fn render(ctx: &ReceiptContext) -> Vec<u8> {
    let donation = ctx.donation;
    let display_name = donation.legal_name.as_deref().unwrap_or(ctx.payer_name);
    let method = donation
        .method
        .map(|m| m.as_str().to_ascii_uppercase())
        .unwrap_or_else(|| "ONLINE".to_string());
    let date = donation.created_at.format("%B %d, %Y");

    let mut rows = String::new();
    rows.push_str(&info_row("Name", display_name));
    if let Some(email) = ctx.payer_email {
        rows.push_str(&info_row("Email", email));
    }
    if let Some(pan) = donation.pan.as_deref() {
        rows.push_str(&info_row("PAN", pan));
    }
    if let Some(address) = donation.address.as_deref() {
        rows.push_str(&info_row("Address", address));
    }

    let mut details = String::new();
    details.push_str(&info_row("Campaign", ctx.campaign_title));
    details.push_str(&info_row("Date", &date.to_string()));
    if let Some(payment_ref) = donation.payment_ref.as_deref() {
        details.push_str(&info_row("Transaction ID", payment_ref));
    }
    details.push_str(&info_row("Payment Method", &method));
    details.push_str(&info_row("Financial Year", ctx.fy));

    let note_80g = if ctx.section_80g {
        let ack = match ctx.ack_no {
            Some(ack_no) => format!("Acknowledgment No: {ack_no}"),
            None => "Acknowledgment number will be updated separately.".to_string(),
        };
        format!(
            r#"<div class="note-box"><strong>Section 80G Benefit:</strong> This donation is eligible for tax deduction under Section 80G of the Income Tax Act, 1961. {ack}</div>"#
        )
    } else {
        String::new()
    };

    let html = format!(
        r#"<!DOCTYPE html>
<html>
<head>
<meta charset="utf-8">
<style>
  body {{ font-family: 'Helvetica', 'Arial', sans-serif; color: #333; line-height: 1.6; }}
  .header {{ text-align: center; border-bottom: 3px solid #2563eb; padding-bottom: 20px; }}
  .logo {{ font-size: 28px; font-weight: bold; color: #2563eb; }}
  .amount-box {{ border: 2px solid #2563eb; border-radius: 8px; padding: 20px; text-align: center; margin: 20px 0; }}
  .amount-value {{ font-size: 32px; font-weight: bold; color: #2563eb; }}
  .info-row {{ display: flex; padding: 8px 0; border-bottom: 1px solid #f3f4f6; }}
  .info-label {{ width: 40%; font-weight: 600; color: #666; }}
  .note-box {{ background: #fffbeb; border-left: 4px solid #f59e0b; padding: 15px; margin: 20px 0; font-size: 13px; }}
  .footer {{ margin-top: 50px; text-align: center; font-size: 12px; color: #999; }}
</style>
</head>
<body>
  <div class="header">
    <div class="logo">WeForYou Foundation</div>
    <div>Donation Receipt</div>
    <div>Receipt No: {receipt_number}</div>
  </div>
  <div class="amount-box">
    <div>Donation Amount</div>
    <div class="amount-value">&#8377;{amount:.2}</div>
  </div>
  <div class="section">
    <div class="section-title">Donor Information</div>
    {rows}
  </div>
  <div class="section">
    <div class="section-title">Donation Details</div>
    {details}
  </div>
  {note_80g}
  <div class="footer">
    <p><strong>WeForYou Foundation</strong></p>
    <p>Registered Charity | CIN: U85100DL2020NPL123456</p>
    <p>This is a computer-generated receipt and does not require a signature.</p>
  </div>
</body>
</html>
"#,
        receipt_number = ctx.receipt_number,
        amount = donation.amount,
    );
    html.into_bytes()
}

fn info_row(label: &str, value: &str) -> String {
    format!(
        r#"<div class="info-row"><div class="info-label">{label}:</div><div>{value}</div></div>"#
    )
}

// ─────────────────────────────────────────────────────────
// Issuance
// ─────────────────────────────────────────────────────────

/// Issue the receipt for a confirmed donation. Safe to retry: if the
/// donation already carries a receipt, or a receipt row already exists, it
/// only repairs the back-link.
pub async fn issue(pool: &SqlitePool, storage_dir: &Path, donation_id: &str) -> Result<()> {
    let donation = db::get_donation(pool, donation_id)
        .await?
        .ok_or(AppError::NotFound("donation"))?;
    if donation.receipt_id.is_some() {
        return Ok(());
    }
    if let Some(existing) = db::get_receipt_for_donation(pool, donation_id).await? {
        // A previous run crashed between insert and back-link.
        db::set_receipt_id(pool, donation_id, &existing.id).await?;
        return Ok(());
    }

    let (payer_name, payer_email) = match donation.payer() {
        Some(Payer::RegisteredUser { user_id }) => {
            let user = db::get_user(pool, &user_id)
                .await?
                .ok_or(AppError::NotFound("user"))?;
            (user.full_name, Some(user.email))
        }
        Some(Payer::WalkInDonor { name, email, .. }) => (name, email),
        None => ("Anonymous Donor".to_string(), None),
    };

    let campaign_title = match &donation.campaign_id {
        Some(campaign_id) => db::get_campaign(pool, campaign_id)
            .await?
            .map(|c| c.title)
            .unwrap_or_else(|| "General Donation".to_string()),
        None => "General Donation".to_string(),
    };

    let seq = db::next_receipt_number(pool).await?;
    let receipt_number = format_receipt_number(Utc::now().year(), seq);
    let fy = financial_year(donation.created_at);

    let document = render(&ReceiptContext {
        donation: &donation,
        payer_name: &payer_name,
        payer_email: payer_email.as_deref(),
        campaign_title: &campaign_title,
        receipt_number: &receipt_number,
        fy: &fy,
        section_80g: donation.want_80g,
        ack_no: None,
    });

    let file_name = format!("{receipt_number}-{fy}.html");
    let dir = storage_dir.join("receipts").join(&fy);
    tokio::fs::create_dir_all(&dir).await?;
    tokio::fs::write(dir.join(&file_name), &document).await?;

    let receipt = DonationReceipt {
        id: Uuid::new_v4().to_string(),
        donation_id: donation.id.clone(),
        receipt_number,
        fy: fy.clone(),
        pdf_path: format!("receipts/{fy}/{file_name}"),
        section_80g: donation.want_80g,
        ack_no: None,
        issued_at: Utc::now(),
    };
    db::insert_receipt(pool, &receipt).await?;
    db::set_receipt_id(pool, &donation.id, &receipt.id).await?;

    info!(
        "Issued receipt {} for donation {}",
        receipt.receipt_number, donation.id
    );
    Ok(())
}

/// Fire-and-forget issuance after a success transition. Failures are logged
/// and left for an out-of-band retry; the confirmation they followed stands.
pub fn issue_detached(pool: SqlitePool, storage_dir: PathBuf, donation_id: String) {
    tokio::spawn(async move {
        if let Err(e) = issue(&pool, &storage_dir, &donation_id).await {
            error!("Receipt issuance failed for donation {donation_id}: {e}");
        }
    });
}

// ─────────────────────────────────────────────────────────
// Unit tests
// ─────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil;
    use chrono::TimeZone;

    #[test]
    fn financial_year_boundary() {
        let march_31 = Utc.with_ymd_and_hms(2024, 3, 31, 23, 59, 59).unwrap();
        assert_eq!(financial_year(march_31), "2023-24");

        let april_1 = Utc.with_ymd_and_hms(2024, 4, 1, 0, 0, 0).unwrap();
        assert_eq!(financial_year(april_1), "2024-25");

        let december = Utc.with_ymd_and_hms(2025, 12, 15, 12, 0, 0).unwrap();
        assert_eq!(financial_year(december), "2025-26");
    }

    #[test]
    fn financial_year_century_rollover() {
        let jan_2100 = Utc.with_ymd_and_hms(2100, 1, 1, 0, 0, 0).unwrap();
        assert_eq!(financial_year(jan_2100), "2099-00");
    }

    #[test]
    fn receipt_number_format() {
        assert_eq!(format_receipt_number(2024, 1), "WFY202400001");
        assert_eq!(format_receipt_number(2024, 123_456), "WFY2024123456");
    }

    #[test]
    fn render_includes_tax_fields() {
        let mut donation = testutil::donation_fixture();
        donation.amount = 5_000.0;
        donation.pan = Some("ABCDE1234F".to_string());
        donation.legal_name = Some("Asha R. Rao".to_string());
        donation.payment_ref = Some("pay_123".to_string());

        let bytes = render(&ReceiptContext {
            donation: &donation,
            payer_name: "Asha",
            payer_email: Some("asha@example.org"),
            campaign_title: "Flood Relief",
            receipt_number: "WFY202400042",
            fy: "2024-25",
            section_80g: true,
            ack_no: None,
        });
        let html = String::from_utf8(bytes).unwrap();

        assert!(html.contains("WFY202400042"));
        assert!(html.contains("5000.00"));
        // Legal name wins over the registered name.
        assert!(html.contains("Asha R. Rao"));
        assert!(html.contains("ABCDE1234F"));
        assert!(html.contains("Flood Relief"));
        assert!(html.contains("2024-25"));
        assert!(html.contains("pay_123"));
        assert!(html.contains("Section 80G Benefit"));
        assert!(html.contains("Acknowledgment number will be updated separately."));
    }

    #[test]
    fn render_omits_absent_fields() {
        let donation = testutil::donation_fixture();
        let bytes = render(&ReceiptContext {
            donation: &donation,
            payer_name: "Ravi",
            payer_email: None,
            campaign_title: "General Donation",
            receipt_number: "WFY202400001",
            fy: "2024-25",
            section_80g: false,
            ack_no: None,
        });
        let html = String::from_utf8(bytes).unwrap();

        assert!(!html.contains("PAN"));
        assert!(!html.contains("Address"));
        assert!(!html.contains("Section 80G"));
        // No legal name: the registered name is used.
        assert!(html.contains("Ravi"));
    }

    #[test]
    fn render_includes_ack_number_when_attached() {
        let donation = testutil::donation_fixture();
        let bytes = render(&ReceiptContext {
            donation: &donation,
            payer_name: "Ravi",
            payer_email: None,
            campaign_title: "General Donation",
            receipt_number: "WFY202400001",
            fy: "2024-25",
            section_80g: true,
            ack_no: Some("ACK-778899"),
        });
        let html = String::from_utf8(bytes).unwrap();
        assert!(html.contains("Acknowledgment No: ACK-778899"));
    }

    #[tokio::test]
    async fn issue_persists_receipt_and_backlink() {
        let pool = testutil::test_pool().await;
        let storage = testutil::temp_storage_dir();
        let user = testutil::seed_user(&pool, "donor").await;
        let campaign = testutil::seed_campaign(&pool, 0.0, 0).await;
        let donation =
            testutil::seed_success_donation(&pool, Some(&campaign.id), &user.id, 500.0).await;

        issue(&pool, &storage, &donation.id).await.unwrap();

        let receipt = db::get_receipt_for_donation(&pool, &donation.id)
            .await
            .unwrap()
            .unwrap();
        assert!(receipt.receipt_number.starts_with("WFY"));
        assert_eq!(receipt.fy, financial_year(donation.created_at));

        let reloaded = db::get_donation(&pool, &donation.id).await.unwrap().unwrap();
        assert_eq!(reloaded.receipt_id.as_deref(), Some(receipt.id.as_str()));

        let written = std::fs::read(storage.join(&receipt.pdf_path)).unwrap();
        assert!(!written.is_empty());
    }

    #[tokio::test]
    async fn issue_is_idempotent() {
        let pool = testutil::test_pool().await;
        let storage = testutil::temp_storage_dir();
        let user = testutil::seed_user(&pool, "donor").await;
        let donation = testutil::seed_success_donation(&pool, None, &user.id, 250.0).await;

        issue(&pool, &storage, &donation.id).await.unwrap();
        let first = db::get_receipt_for_donation(&pool, &donation.id)
            .await
            .unwrap()
            .unwrap();

        issue(&pool, &storage, &donation.id).await.unwrap();
        let second = db::get_receipt_for_donation(&pool, &donation.id)
            .await
            .unwrap()
            .unwrap();

        assert_eq!(first.id, second.id);
        assert_eq!(first.receipt_number, second.receipt_number);
    }
}
