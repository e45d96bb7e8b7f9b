//! Collaborator seams of the callback flow.
//!
//! The host learning platform (users, courses, enrolments), the payment
//! ledger, the audit trail, the payment provider and the mail transport are
//! all reached through these traits so the flow never touches globals.

use async_trait::async_trait;

use crate::error::CallbackError;
use crate::models::{
    AuditEvent, Course, EnrolInstance, EnrolmentWindow, PaymentKey, PaymentRecord,
    TransactionStatus, User,
};

/// Host enrolment subsystem.
#[async_trait]
pub trait EnrolmentHost: Send + Sync {
    async fn find_user(&self, user_id: i64) -> Result<Option<User>, CallbackError>;

    async fn find_course(&self, course_id: i64) -> Result<Option<Course>, CallbackError>;

    /// Only enabled instances of the given enrolment method are returned.
    async fn find_enrol_instance(
        &self,
        instance_id: i64,
        method: &str,
    ) -> Result<Option<EnrolInstance>, CallbackError>;

    /// Grant `role_id` on the instance's course. Re-enrolling refreshes the
    /// existing enrolment.
    async fn enrol_user(
        &self,
        instance: &EnrolInstance,
        user_id: i64,
        role_id: i64,
        window: EnrolmentWindow,
    ) -> Result<(), CallbackError>;

    /// Highest-authority user able to manage the course, if any.
    async fn course_teacher(&self, course_id: i64) -> Result<Option<User>, CallbackError>;

    /// Site administrators, main admin first.
    async fn site_admins(&self) -> Result<Vec<User>, CallbackError>;
}

/// Payment records written at checkout.
#[async_trait]
pub trait PaymentLedger: Send + Sync {
    /// Most recent record (by creation timestamp) for the key.
    async fn latest_record(&self, key: &PaymentKey)
        -> Result<Option<PaymentRecord>, CallbackError>;

    async fn update_record(&self, record: &PaymentRecord) -> Result<(), CallbackError>;
}

#[async_trait]
pub trait AuditSink: Send + Sync {
    async fn record(&self, event: AuditEvent) -> Result<(), CallbackError>;
}

/// Authoritative transaction lookup at the payment provider.
#[async_trait]
pub trait TransactionVerifier: Send + Sync {
    async fn verify(&self, transaction_id: &str) -> Result<TransactionStatus, CallbackError>;
}
