//! Application configuration loaded from environment variables.

use crate::errors::{AppError, Result};

#[derive(Debug, Clone)]
pub struct Config {
    /// Path to the SQLite database file
    pub database_url: String,
    /// Port for the REST API server
    pub api_port: u16,
    /// When true, payment calls go to the deterministic in-process stand-in
    pub use_mock_payment: bool,
    /// Razorpay API key id (ignored in mock mode)
    pub razorpay_key_id: String,
    /// Razorpay API key secret (ignored in mock mode)
    pub razorpay_key_secret: String,
    /// Upper bound on any single payment gateway call, in seconds
    pub gateway_timeout_secs: u64,
    /// Directory receipts are written under
    pub storage_dir: String,
    /// Recipient for new-cash-collection alerts
    pub admin_alert_email: String,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Ok(Config {
            database_url: env_var("DATABASE_URL")
                .unwrap_or_else(|_| "sqlite:./wfy.db".to_string()),
            api_port: env_var("API_PORT")
                .unwrap_or_else(|_| "8000".to_string())
                .parse()
                .map_err(|_| AppError::Config("Invalid API_PORT".to_string()))?,
            use_mock_payment: env_var("USE_MOCK_PAYMENT")
                .unwrap_or_else(|_| "true".to_string())
                .to_lowercase()
                == "true",
            razorpay_key_id: env_var("RAZORPAY_KEY_ID").unwrap_or_default(),
            razorpay_key_secret: env_var("RAZORPAY_KEY_SECRET").unwrap_or_default(),
            gateway_timeout_secs: env_var("GATEWAY_TIMEOUT_SECS")
                .unwrap_or_else(|_| "10".to_string())
                .parse()
                .map_err(|_| AppError::Config("Invalid GATEWAY_TIMEOUT_SECS".to_string()))?,
            storage_dir: env_var("STORAGE_DIR").unwrap_or_else(|_| "./storage".to_string()),
            admin_alert_email: env_var("ADMIN_ALERT_EMAIL")
                .unwrap_or_else(|_| "donations@weforyou.org".to_string()),
        })
    }
}

fn env_var(key: &str) -> Result<String> {
    std::env::var(key).map_err(|_| AppError::Config(format!("Missing env var: {key}")))
}
