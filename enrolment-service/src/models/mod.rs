pub mod order_reference;

pub use order_reference::OrderReference;

use serde::{Deserialize, Serialize};

use crate::error::CallbackError;

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct User {
    #[serde(rename = "_id")]
    pub id: i64,
    pub username: String,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
}

impl User {
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
            .trim()
            .to_string()
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Course {
    #[serde(rename = "_id")]
    pub id: i64,
    pub short_name: String,
    pub full_name: String,
}

/// A course's configured enrolment method.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct EnrolInstance {
    #[serde(rename = "_id")]
    pub id: i64,
    pub course_id: i64,
    /// Enrolment plugin name, e.g. "ipaymu".
    pub enrol: String,
    /// 0 = enabled, anything else = disabled.
    pub status: i32,
    pub role_id: i64,
    /// Fixed enrolment duration in seconds; 0 means no expiry.
    #[serde(default)]
    pub enrol_period: i64,
    #[serde(default)]
    pub cost: Option<f64>,
    #[serde(default)]
    pub currency: Option<String>,
}

impl EnrolInstance {
    pub const STATUS_ENABLED: i32 = 0;
}

/// Start/end of an enrolment in unix seconds. `(0, 0)` is unbounded.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
pub struct EnrolmentWindow {
    pub start: i64,
    pub end: i64,
}

impl EnrolmentWindow {
    pub const UNBOUNDED: EnrolmentWindow = EnrolmentWindow { start: 0, end: 0 };

    /// A period too large for the clock saturates to the far future.
    pub fn for_period(enrol_period: i64, now: i64) -> Self {
        if enrol_period > 0 {
            EnrolmentWindow {
                start: now,
                end: now.saturating_add(enrol_period),
            }
        } else {
            Self::UNBOUNDED
        }
    }

    pub fn is_unbounded(&self) -> bool {
        *self == Self::UNBOUNDED
    }
}

/// Lookup key for payment records written at checkout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentKey {
    pub user_id: i64,
    pub course_id: i64,
    pub instance_id: i64,
    pub reference: String,
}

/// A payment row created at checkout and settled by the callback.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct PaymentRecord {
    #[serde(rename = "_id")]
    pub id: i64,
    pub user_id: i64,
    pub course_id: i64,
    pub instance_id: i64,
    pub reference: String,
    #[serde(default)]
    pub amount: Option<f64>,
    #[serde(default)]
    pub currency: Option<String>,
    pub payment_status: String,
    #[serde(default)]
    pub pending_reason: Option<String>,
    /// Creation time in milliseconds.
    pub timestamp: i64,
    /// Last update in milliseconds.
    #[serde(default)]
    pub time_updated: Option<i64>,
}

impl PaymentRecord {
    pub const STATUS_SUCCESS: &'static str = "Success";

    pub fn matches(&self, key: &PaymentKey) -> bool {
        self.user_id == key.user_id
            && self.course_id == key.course_id
            && self.instance_id == key.instance_id
            && self.reference == key.reference
    }
}

/// Audit trail entry for a processed callback.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct AuditEvent {
    pub course_id: i64,
    pub related_user_id: i64,
    pub details: String,
    pub merchant_order_id: String,
    pub reference: String,
    pub time_created: i64,
}

/// Settlement state reported by iPaymu for a transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PaidStatus {
    Paid,
    Unpaid,
    Other(String),
}

impl PaidStatus {
    pub fn as_str(&self) -> &str {
        match self {
            PaidStatus::Paid => "paid",
            PaidStatus::Unpaid => "unpaid",
            PaidStatus::Other(s) => s,
        }
    }
}

impl From<&str> for PaidStatus {
    fn from(value: &str) -> Self {
        match value {
            "paid" => PaidStatus::Paid,
            "unpaid" => PaidStatus::Unpaid,
            other => PaidStatus::Other(other.to_string()),
        }
    }
}

/// Outcome of a "check transaction" call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionStatus {
    /// Whether the provider reported the call itself as successful.
    pub succeeded: bool,
    /// Raw `Status` value from the provider payload.
    pub status_code: String,
    pub paid_status: PaidStatus,
}

impl TransactionStatus {
    /// Gate for enrolment: the call must have succeeded and the money settled.
    pub fn assert_paid(&self) -> Result<(), CallbackError> {
        if !self.succeeded {
            return Err(CallbackError::VerificationUnavailable(format!(
                "provider reported failure (Status {})",
                self.status_code
            )));
        }

        match self.paid_status {
            PaidStatus::Paid => Ok(()),
            _ => Err(CallbackError::PaymentNotConfirmed(
                self.paid_status.as_str().to_string(),
            )),
        }
    }
}
