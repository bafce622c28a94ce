//! Best-effort notification side channel.
//!
//! Mock mode only for now: messages are logged, not delivered. Callers
//! dispatch these from a detached task, so a delivery failure can never
//! block or fail the operation that triggered it.

use tracing::info;

#[derive(Debug, Clone)]
pub struct Notifier {
    mock_mode: bool,
}

impl Notifier {
    pub fn new() -> Self {
        // TODO: read provider credentials from Config once Twilio/SendGrid
        // accounts exist, and flip mock_mode off when they are present.
        Notifier { mock_mode: true }
    }

    pub async fn send_sms(&self, phone: &str, message: &str) {
        if self.mock_mode {
            info!("[MOCK SMS] To: {phone} | Message: {message}");
        }
    }

    pub async fn send_email(&self, email: &str, subject: &str, message: &str) {
        if self.mock_mode {
            info!("[MOCK EMAIL] To: {email} | Subject: {subject} | Message: {message}");
        }
    }

    /// Route by contact shape: digits go to SMS, anything with an `@` to email.
    pub async fn send_donation_confirmation(
        &self,
        contact: &str,
        amount: f64,
        campaign_title: &str,
        volunteer_name: Option<&str>,
    ) {
        let message = match volunteer_name {
            Some(volunteer) => format!(
                "Thank you for your donation of \u{20b9}{amount} to {campaign_title}! \
                 Collected by volunteer {volunteer}. Your receipt will be generated shortly. \
                 - WeForYou Foundation"
            ),
            None => format!(
                "Thank you for your donation of \u{20b9}{amount}! Your payment is confirmed. \
                 Receipt is being generated. - WeForYou Foundation"
            ),
        };
        if looks_like_phone(contact) {
            self.send_sms(contact, &message).await;
        } else if contact.contains('@') {
            self.send_email(contact, "Donation Confirmation", &message).await;
        }
    }

    /// Remind the collecting volunteer that the cash is their responsibility
    /// until it reaches the Foundation's account.
    pub async fn send_cash_collection_alert(
        &self,
        volunteer_email: &str,
        amount: f64,
        donor_name: &str,
    ) {
        let message = format!(
            "You have collected \u{20b9}{amount} in CASH from {donor_name}. \
             You are responsible for depositing this amount to the Foundation's bank account \
             within 48 hours. After deposit, please update the system with deposit confirmation."
        );
        self.send_email(
            volunteer_email,
            "Cash Collection Responsibility - Action Required",
            &message,
        )
        .await;
    }

    pub async fn send_admin_cash_alert(
        &self,
        admin_email: &str,
        volunteer_name: &str,
        amount: f64,
        donor_name: &str,
    ) {
        let subject = format!("New Cash Collection by {volunteer_name}");
        let message = format!(
            "New cash collection recorded. Volunteer: {volunteer_name} | Donor: {donor_name} | \
             Amount: \u{20b9}{amount} | Status: Pending Deposit Confirmation. \
             Please monitor and confirm deposit when received."
        );
        self.send_email(admin_email, &subject, &message).await;
    }
}

impl Default for Notifier {
    fn default() -> Self {
        Self::new()
    }
}

fn looks_like_phone(contact: &str) -> bool {
    let trimmed = contact.trim();
    let digits = trimmed.strip_prefix('+').unwrap_or(trimmed);
    !digits.is_empty()
        && digits
            .chars()
            .all(|c| c.is_ascii_digit() || c == '-' || c == ' ')
}
