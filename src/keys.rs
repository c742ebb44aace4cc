//! Evaluation API key issuance.

use std::sync::LazyLock;
use std::time::Duration;

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::info;

use crate::config::ClientConfig;
use crate::error::{ClientError, Result};
use crate::transport::{HttpTransport, Transport};

static EMAIL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,7}$").unwrap()
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum KeyStatus {
    /// A new key was issued.
    Success,
    /// This email already had a key; it has been expired and replaced.
    ExpireOldKey,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiKeyGrant {
    pub api_key: String,
    pub status: KeyStatus,
}

impl ApiKeyGrant {
    pub fn replaced_old_key(&self) -> bool {
        self.status == KeyStatus::ExpireOldKey
    }
}

pub fn validate_email(email: &str) -> Result<()> {
    if EMAIL_RE.is_match(email.trim()) {
        Ok(())
    } else {
        Err(ClientError::InvalidEmail(email.to_string()))
    }
}

/// Requests a rate-limited evaluation key over HTTP. No API key is needed.
pub fn get_free_api_key(config: &ClientConfig, email: &str) -> Result<ApiKeyGrant> {
    let transport = HttpTransport::new(Duration::from_secs(config.timeout_secs));
    request_free_api_key(&transport, config, email)
}

pub fn request_free_api_key(
    transport: &dyn Transport,
    config: &ClientConfig,
    email: &str,
) -> Result<ApiKeyGrant> {
    validate_email(email)?;
    let endpoint = config.endpoint()?;
    let body = transport.request_api_key(&endpoint, email.trim())?;
    let grant = parse_grant(body)?;
    info!(status = ?grant.status, "evaluation key issued");
    Ok(grant)
}

fn parse_grant(body: Value) -> Result<ApiKeyGrant> {
    let grant: ApiKeyGrant = serde_json::from_value(body.clone()).map_err(|e| {
        ClientError::ResponseFormat(format!("unexpected key issuance response ({e}): {body}"))
    })?;
    if grant.api_key.trim().is_empty() {
        return Err(ClientError::ResponseFormat("key issuance returned an empty key".into()));
    }
    Ok(grant)
}
