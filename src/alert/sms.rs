// src/alert/sms.rs
//
// Twilio SMS notifier. One message per session; the caller latches the
// attempt before the result is known, so a failed send is logged and
// permanently consumes the session's SMS slot (documented behavior, not
// retried here).

use crate::config::Secrets;
use anyhow::{anyhow, Result};
use chrono::{DateTime, Local};
use std::time::Duration;
use tracing::{error, info, warn};

const TWILIO_API_BASE: &str = "https://api.twilio.com/2010-04-01";

pub struct SmsClient {
    http_client: reqwest::Client,
    account_sid: String,
    auth_token: String,
    from_number: String,
    to_number: String,
}

impl SmsClient {
    pub fn new(secrets: &Secrets) -> Result<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;

        Ok(Self {
            http_client,
            account_sid: secrets.twilio_account_sid.clone(),
            auth_token: secrets.twilio_auth_token.clone(),
            from_number: secrets.twilio_from_number.clone(),
            to_number: secrets.to_phone_number.clone(),
        })
    }

    /// Send the fire alert SMS. Blocks the polling loop for the duration
    /// of the network call; acceptable because it fires at most once per
    /// session.
    pub async fn send_fire_alert(&self, first_fire_time: DateTime<Local>) -> Result<()> {
        let time_str = first_fire_time.format("%Y-%m-%d %H:%M:%S").to_string();
        let body = format!(
            "🔥 ALERT: Fire detected at {} in the yard. Please check immediately.",
            time_str
        );

        let url = format!(
            "{}/Accounts/{}/Messages.json",
            TWILIO_API_BASE, self.account_sid
        );

        let params = [
            ("Body", body.as_str()),
            ("From", self.from_number.as_str()),
            ("To", self.to_number.as_str()),
        ];

        match self
            .http_client
            .post(&url)
            .basic_auth(&self.account_sid, Some(&self.auth_token))
            .form(&params)
            .send()
            .await
        {
            Ok(resp) => {
                if resp.status().is_success() {
                    let sid = resp
                        .json::<serde_json::Value>()
                        .await
                        .ok()
                        .and_then(|v| v.get("sid").and_then(|s| s.as_str().map(String::from)))
                        .unwrap_or_else(|| "unknown".to_string());
                    info!("📩 SMS sent successfully at {}: SID={}", time_str, sid);
                    Ok(())
                } else {
                    let status = resp.status();
                    let body = resp.text().await.unwrap_or_default();
                    warn!("Twilio error {}: {}", status, body);
                    Err(anyhow!("Twilio returned HTTP {}", status))
                }
            }
            Err(e) => {
                error!("Failed to reach Twilio: {}", e);
                Err(anyhow!("Connection error: {}", e))
            }
        }
    }
}
