//! Enrolment state transition for a verified payment.
//!
//! Order of effects: resolve, enrol, settle the payment record, audit.
//! Nothing wraps the enrol + settle pair; if settling fails the user stays
//! enrolled and the record stays pending, and the error log carries the
//! full key for reconciliation.

use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::error::CallbackError;
use crate::models::{
    AuditEvent, Course, EnrolInstance, EnrolmentWindow, OrderReference, PaymentKey,
    PaymentRecord, User,
};
use crate::ports::{AuditSink, EnrolmentHost, PaymentLedger};

/// Note stored on the payment record and the audit event.
pub const CALLBACK_LOG_NOTE: &str = "Callback received from iPaymu, student enrolled";

/// Everything a finished enrolment produced, handed on to notifications.
#[derive(Debug, Clone)]
pub struct Finalized {
    pub order: OrderReference,
    pub transaction_id: String,
    pub user: User,
    pub course: Course,
    pub instance: EnrolInstance,
    pub window: EnrolmentWindow,
    pub record: PaymentRecord,
}

#[derive(Clone)]
pub struct EnrolmentFinalizer {
    host: Arc<dyn EnrolmentHost>,
    ledger: Arc<dyn PaymentLedger>,
    audit: Arc<dyn AuditSink>,
    method: String,
}

impl EnrolmentFinalizer {
    pub fn new(
        host: Arc<dyn EnrolmentHost>,
        ledger: Arc<dyn PaymentLedger>,
        audit: Arc<dyn AuditSink>,
        method: impl Into<String>,
    ) -> Self {
        Self {
            host,
            ledger,
            audit,
            method: method.into(),
        }
    }

    pub async fn finalize(
        &self,
        order: &OrderReference,
        transaction_id: &str,
        session_ref: &str,
    ) -> Result<Finalized, CallbackError> {
        self.finalize_at(order, transaction_id, session_ref, Utc::now())
            .await
    }

    #[tracing::instrument(
        skip(self, order, now),
        fields(
            order = %order,
            user_id = order.user_id,
            course_id = order.course_id,
            instance_id = order.instance_id,
        )
    )]
    pub async fn finalize_at(
        &self,
        order: &OrderReference,
        transaction_id: &str,
        session_ref: &str,
        now: DateTime<Utc>,
    ) -> Result<Finalized, CallbackError> {
        let user = self
            .host
            .find_user(order.user_id)
            .await?
            .ok_or_else(|| CallbackError::NotFound(format!("User {}", order.user_id)))?;

        let course = self
            .host
            .find_course(order.course_id)
            .await?
            .ok_or_else(|| CallbackError::NotFound(format!("Course {}", order.course_id)))?;

        let instance = self
            .host
            .find_enrol_instance(order.instance_id, &self.method)
            .await?
            .ok_or_else(|| {
                CallbackError::NotFound(format!(
                    "Enabled {} enrolment instance {}",
                    self.method, order.instance_id
                ))
            })?;

        let window = EnrolmentWindow::for_period(instance.enrol_period, now.timestamp());

        self.host
            .enrol_user(&instance, user.id, instance.role_id, window)
            .await?;

        tracing::info!(
            role_id = instance.role_id,
            time_start = window.start,
            time_end = window.end,
            "User enrolled"
        );

        let key = PaymentKey {
            user_id: order.user_id,
            course_id: order.course_id,
            instance_id: order.instance_id,
            reference: session_ref.to_string(),
        };

        let mut record = match self.ledger.latest_record(&key).await? {
            Some(record) => record,
            None => {
                tracing::error!(
                    transaction_id = %transaction_id,
                    reference = %session_ref,
                    "Enrolment granted but no payment record matches; reconcile manually"
                );
                return Err(CallbackError::NotFound(format!(
                    "Payment record for order {} reference '{}'",
                    order, session_ref
                )));
            }
        };

        record.payment_status = PaymentRecord::STATUS_SUCCESS.to_string();
        record.pending_reason = Some(CALLBACK_LOG_NOTE.to_string());
        record.time_updated = Some(now.timestamp_millis());

        self.ledger.update_record(&record).await?;

        tracing::info!(
            record_id = record.id,
            transaction_id = %transaction_id,
            "Payment record marked successful"
        );

        self.audit
            .record(AuditEvent {
                course_id: course.id,
                related_user_id: user.id,
                details: CALLBACK_LOG_NOTE.to_string(),
                merchant_order_id: order.to_string(),
                reference: session_ref.to_string(),
                time_created: now.timestamp(),
            })
            .await?;

        Ok(Finalized {
            order: order.clone(),
            transaction_id: transaction_id.to_string(),
            user,
            course,
            instance,
            window,
            record,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::memory::InMemoryLms;
    use chrono::TimeZone;

    async fn seeded(enrol_period: i64) -> InMemoryLms {
        let lms = InMemoryLms::new();
        lms.add_user(User {
            id: 7,
            username: "budi".into(),
            first_name: "Budi".into(),
            last_name: "Santoso".into(),
            email: "budi@example.com".into(),
        })
        .await;
        lms.add_course(Course {
            id: 3,
            short_name: "RUST101".into(),
            full_name: "Practical Rust".into(),
        })
        .await;
        lms.add_instance(EnrolInstance {
            id: 2,
            course_id: 3,
            enrol: "ipaymu".into(),
            status: EnrolInstance::STATUS_ENABLED,
            role_id: 5,
            enrol_period,
            cost: Some(150_000.0),
            currency: Some("IDR".into()),
        })
        .await;
        lms.add_payment_record(PaymentRecord {
            id: 11,
            user_id: 7,
            course_id: 3,
            instance_id: 2,
            reference: "SID-1".into(),
            amount: Some(150_000.0),
            currency: Some("IDR".into()),
            payment_status: "Pending".into(),
            pending_reason: None,
            timestamp: 1_000,
            time_updated: None,
        })
        .await;
        lms
    }

    fn finalizer(lms: &InMemoryLms) -> EnrolmentFinalizer {
        let lms = Arc::new(lms.clone());
        EnrolmentFinalizer::new(lms.clone(), lms.clone(), lms, "ipaymu")
    }

    fn now() -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000, 0).unwrap()
    }

    #[tokio::test]
    async fn enrols_and_settles_record() {
        let lms = seeded(0).await;
        let order = OrderReference::new("abc", 7, 3, 2);

        let finalized = finalizer(&lms)
            .finalize_at(&order, "T100", "SID-1", now())
            .await
            .unwrap();

        assert!(finalized.window.is_unbounded());

        let enrolment = lms.enrolment(2, 7).await.unwrap();
        assert_eq!(enrolment.role_id, 5);
        assert_eq!(enrolment.course_id, 3);

        let record = lms.payment_record(11).await.unwrap();
        assert_eq!(record.payment_status, "Success");
        assert_eq!(record.pending_reason.as_deref(), Some(CALLBACK_LOG_NOTE));
        assert_eq!(record.time_updated, Some(1_700_000_000_000));

        let events = lms.audit_events().await;
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].merchant_order_id, "abc-7-3-2");
        assert_eq!(events[0].reference, "SID-1");
        assert_eq!(events[0].related_user_id, 7);
        assert_eq!(events[0].course_id, 3);
    }

    #[tokio::test]
    async fn fixed_period_sets_window_from_now() {
        let lms = seeded(30 * 86_400).await;
        let order = OrderReference::new("abc", 7, 3, 2);

        finalizer(&lms)
            .finalize_at(&order, "T100", "SID-1", now())
            .await
            .unwrap();

        let window = lms.enrolment(2, 7).await.unwrap().window;
        assert_eq!(window.start, 1_700_000_000);
        assert_eq!(window.end, 1_700_000_000 + 30 * 86_400);
    }

    #[tokio::test]
    async fn missing_lookups_are_not_found_and_do_not_enrol() {
        let lms = seeded(0).await;

        for order in [
            OrderReference::new("abc", 8, 3, 2),
            OrderReference::new("abc", 7, 4, 2),
            OrderReference::new("abc", 7, 3, 9),
        ] {
            let err = finalizer(&lms)
                .finalize_at(&order, "T100", "SID-1", now())
                .await
                .unwrap_err();
            assert!(matches!(err, CallbackError::NotFound(_)), "{order}");
        }

        assert_eq!(lms.enrol_calls().await, 0);
    }

    #[tokio::test]
    async fn unknown_reference_enrols_but_fails_on_record() {
        let lms = seeded(0).await;
        let order = OrderReference::new("abc", 7, 3, 2);

        let err = finalizer(&lms)
            .finalize_at(&order, "T100", "OTHER", now())
            .await
            .unwrap_err();

        assert!(matches!(err, CallbackError::NotFound(_)));
        assert!(lms.enrolment(2, 7).await.is_some());
        assert_eq!(lms.record_updates().await, 0);
        assert!(lms.audit_events().await.is_empty());
    }

    #[tokio::test]
    async fn repeated_finalize_keeps_enrolment_but_updates_again() {
        let lms = seeded(0).await;
        let order = OrderReference::new("abc", 7, 3, 2);
        let finalizer = finalizer(&lms);

        finalizer
            .finalize_at(&order, "T100", "SID-1", now())
            .await
            .unwrap();
        let first = lms.enrolment(2, 7).await.unwrap();

        finalizer
            .finalize_at(&order, "T100", "SID-1", now())
            .await
            .unwrap();
        let second = lms.enrolment(2, 7).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(lms.enrol_calls().await, 2);
        assert_eq!(lms.record_updates().await, 2);
        assert_eq!(lms.audit_events().await.len(), 2);
    }
}
