//! Callback error taxonomy.
//!
//! Every variant aborts the current callback. Nothing is retried or
//! compensated here; the HTTP mapping lives in the `AppError` conversion.

use service_core::error::AppError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CallbackError {
    #[error("Malformed merchant order id: {0}")]
    MalformedReference(String),

    #[error("Missing {0} parameter")]
    MissingParameter(&'static str),

    #[error("Transaction verification unavailable: {0}")]
    VerificationUnavailable(String),

    #[error("Payment not confirmed: paid status is '{0}'")]
    PaymentNotConfirmed(String),

    #[error("{0} not found")]
    NotFound(String),

    #[error("iPaymu enrolment is disabled")]
    FeatureDisabled,

    #[error("Storage error: {0}")]
    Storage(#[from] anyhow::Error),
}

impl CallbackError {
    /// Short label used for the callback outcome metric.
    pub fn kind(&self) -> &'static str {
        match self {
            CallbackError::MalformedReference(_) => "malformed_reference",
            CallbackError::MissingParameter(_) => "missing_parameter",
            CallbackError::VerificationUnavailable(_) => "verification_unavailable",
            CallbackError::PaymentNotConfirmed(_) => "payment_not_confirmed",
            CallbackError::NotFound(_) => "not_found",
            CallbackError::FeatureDisabled => "disabled",
            CallbackError::Storage(_) => "storage",
        }
    }
}

impl From<mongodb::error::Error> for CallbackError {
    fn from(err: mongodb::error::Error) -> Self {
        CallbackError::Storage(anyhow::Error::new(err))
    }
}

impl From<CallbackError> for AppError {
    fn from(err: CallbackError) -> Self {
        match err {
            CallbackError::MalformedReference(_)
            | CallbackError::MissingParameter(_)
            | CallbackError::PaymentNotConfirmed(_) => {
                AppError::BadRequest(anyhow::anyhow!(err.to_string()))
            }
            CallbackError::NotFound(_) => AppError::NotFound(anyhow::anyhow!(err.to_string())),
            CallbackError::VerificationUnavailable(msg) => AppError::BadGateway(msg),
            CallbackError::FeatureDisabled => AppError::ServiceUnavailable(err.to_string()),
            CallbackError::Storage(inner) => AppError::DatabaseError(inner),
        }
    }
}
