//! iPaymu payment provider client.
//!
//! Implements the v2 "check transaction" call used to confirm a callback
//! before anything is enrolled.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use secrecy::ExposeSecret;
use serde::{Deserialize, Serialize};
use service_core::utils::signature::{body_digest, sign_parts};

use crate::config::IpaymuConfig;
use crate::error::CallbackError;
use crate::models::{PaidStatus, TransactionStatus};
use crate::ports::TransactionVerifier;

pub const CHECK_TRANSACTION_PATH: &str = "/api/v2/transaction";

/// iPaymu client for interacting with the iPaymu API.
#[derive(Clone)]
pub struct IpaymuClient {
    client: Client,
    config: IpaymuConfig,
}

/// Request body for a transaction status check.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckTransactionRequest {
    pub transaction_id: String,
}

/// Response envelope from iPaymu.
///
/// Every field is optional: a payload missing `Status` or `Data.PaidStatus`
/// must be reported as unverifiable rather than fail deserialization.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct CheckTransactionResponse {
    pub status: Option<serde_json::Value>,
    pub success: Option<bool>,
    pub message: Option<String>,
    pub data: Option<TransactionData>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct TransactionData {
    pub transaction_id: Option<serde_json::Value>,
    pub status_desc: Option<String>,
    pub paid_status: Option<String>,
}

impl CheckTransactionResponse {
    /// Interpret the payload. Pure: the outcome depends only on the fields.
    pub fn into_status(self) -> Result<TransactionStatus, CallbackError> {
        let status_code = match self.status {
            Some(serde_json::Value::Null) | None => {
                return Err(CallbackError::VerificationUnavailable(
                    "response has no Status field".to_string(),
                ));
            }
            Some(serde_json::Value::String(s)) => s,
            Some(other) => other.to_string(),
        };

        let paid_status = self
            .data
            .and_then(|data| data.paid_status)
            .ok_or_else(|| {
                CallbackError::VerificationUnavailable(
                    "response has no Data.PaidStatus field".to_string(),
                )
            })?;

        Ok(TransactionStatus {
            succeeded: self.success != Some(false),
            status_code,
            paid_status: PaidStatus::from(paid_status.as_str()),
        })
    }
}

impl IpaymuClient {
    /// Create a new iPaymu client with a bounded request timeout.
    pub fn new(config: IpaymuConfig) -> anyhow::Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self { client, config })
    }

    /// Check if iPaymu is configured (credentials are set).
    pub fn is_configured(&self) -> bool {
        !self.config.va.is_empty() && !self.config.api_key.expose_secret().is_empty()
    }

    /// Signature header value for a POST with the given JSON body.
    ///
    /// `HMAC-SHA256("POST:" + va + ":" + sha256_hex(body) + ":" + api_key, api_key)`
    pub fn sign(&self, body: &str) -> anyhow::Result<String> {
        let api_key = self.config.api_key.expose_secret();
        let digest = body_digest(body);
        sign_parts(api_key, &["POST", &self.config.va, &digest, api_key])
    }

    /// Fetch the provider's view of a transaction.
    pub async fn check_transaction(
        &self,
        transaction_id: &str,
    ) -> Result<CheckTransactionResponse, CallbackError> {
        if !self.is_configured() {
            return Err(CallbackError::VerificationUnavailable(
                "iPaymu credentials not configured".to_string(),
            ));
        }

        let request = CheckTransactionRequest {
            transaction_id: transaction_id.to_string(),
        };
        let body = serde_json::to_string(&request)
            .map_err(|e| CallbackError::VerificationUnavailable(e.to_string()))?;
        let signature = self
            .sign(&body)
            .map_err(|e| CallbackError::VerificationUnavailable(e.to_string()))?;
        let timestamp = chrono::Utc::now().format("%Y%m%d%H%M%S").to_string();

        let url = format!("{}{}", self.config.api_base_url, CHECK_TRANSACTION_PATH);

        let response = self
            .client
            .post(&url)
            .header("Content-Type", "application/json")
            .header("va", &self.config.va)
            .header("signature", signature)
            .header("timestamp", timestamp)
            .body(body)
            .send()
            .await
            .map_err(|e| {
                let reason = if e.is_timeout() {
                    "request timed out".to_string()
                } else {
                    e.to_string()
                };
                tracing::error!(transaction_id = %transaction_id, error = %reason, "iPaymu request failed");
                CallbackError::VerificationUnavailable(reason)
            })?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| CallbackError::VerificationUnavailable(e.to_string()))?;

        tracing::debug!(status = %status, body = %body, "iPaymu check_transaction response");

        if !status.is_success() {
            tracing::error!(
                transaction_id = %transaction_id,
                status = %status,
                "iPaymu check_transaction failed"
            );
            return Err(CallbackError::VerificationUnavailable(format!(
                "iPaymu returned HTTP {}",
                status
            )));
        }

        serde_json::from_str(&body).map_err(|e| {
            tracing::error!(error = %e, "Undecodable iPaymu response");
            CallbackError::VerificationUnavailable(format!("invalid response body: {}", e))
        })
    }
}

#[async_trait]
impl TransactionVerifier for IpaymuClient {
    async fn verify(&self, transaction_id: &str) -> Result<TransactionStatus, CallbackError> {
        let status = self.check_transaction(transaction_id).await?.into_status()?;

        tracing::info!(
            transaction_id = %transaction_id,
            status = %status.status_code,
            paid_status = %status.paid_status.as_str(),
            "iPaymu transaction checked"
        );

        Ok(status)
    }
}
