use crate::types::Config;
use anyhow::{Context, Result};
use std::fs;

impl Config {
    pub fn load(path: &str) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path))?;
        let config: Config = serde_yaml::from_str(&contents)?;
        Ok(config)
    }
}

/// Credentials and endpoints that never belong in config.yaml.
/// Loaded from the environment (a .env file is honored if present).
#[derive(Debug, Clone)]
pub struct Secrets {
    pub stream_url: String,
    pub twilio_account_sid: String,
    pub twilio_auth_token: String,
    pub twilio_from_number: String,
    pub to_phone_number: String,
}

impl Secrets {
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            stream_url: env_var("STREAM_URL")?,
            twilio_account_sid: env_var("TWILIO_ACCOUNT_SID")?,
            twilio_auth_token: env_var("TWILIO_AUTH_TOKEN")?,
            twilio_from_number: env_var("TWILIO_FROM_NUMBER")?,
            to_phone_number: env_var("TO_PHONE_NUMBER")?,
        })
    }
}

fn env_var(name: &str) -> Result<String> {
    std::env::var(name).with_context(|| format!("{} not set in environment", name))
}
