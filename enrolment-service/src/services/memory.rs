//! In-memory host adapter.
//!
//! Implements the same ports as the MongoDB repository over plain maps so
//! the callback flow can run without a database (tests, local demos).

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::error::CallbackError;
use crate::models::{
    AuditEvent, Course, EnrolInstance, EnrolmentWindow, PaymentKey, PaymentRecord, User,
};
use crate::ports::{AuditSink, EnrolmentHost, PaymentLedger};

/// A granted enrolment as seen by the host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Enrolment {
    pub course_id: i64,
    pub role_id: i64,
    pub window: EnrolmentWindow,
}

#[derive(Default)]
struct State {
    users: HashMap<i64, User>,
    courses: HashMap<i64, Course>,
    instances: HashMap<i64, EnrolInstance>,
    enrolments: HashMap<(i64, i64), Enrolment>,
    enrol_calls: usize,
    /// course id -> (authority, user id)
    teachers: HashMap<i64, Vec<(i32, i64)>>,
    admins: Vec<i64>,
    payments: Vec<PaymentRecord>,
    record_updates: usize,
    audit: Vec<AuditEvent>,
}

#[derive(Default, Clone)]
pub struct InMemoryLms {
    state: Arc<RwLock<State>>,
}

impl InMemoryLms {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn add_user(&self, user: User) {
        self.state.write().await.users.insert(user.id, user);
    }

    pub async fn add_course(&self, course: Course) {
        self.state.write().await.courses.insert(course.id, course);
    }

    pub async fn add_instance(&self, instance: EnrolInstance) {
        self.state
            .write()
            .await
            .instances
            .insert(instance.id, instance);
    }

    pub async fn add_teacher(&self, course_id: i64, user_id: i64, authority: i32) {
        self.state
            .write()
            .await
            .teachers
            .entry(course_id)
            .or_default()
            .push((authority, user_id));
    }

    /// Admins are ranked in insertion order; the first one is the main admin.
    pub async fn add_admin(&self, user_id: i64) {
        self.state.write().await.admins.push(user_id);
    }

    pub async fn add_payment_record(&self, record: PaymentRecord) {
        self.state.write().await.payments.push(record);
    }

    pub async fn enrolment(&self, instance_id: i64, user_id: i64) -> Option<Enrolment> {
        self.state
            .read()
            .await
            .enrolments
            .get(&(instance_id, user_id))
            .cloned()
    }

    /// Number of `enrol_user` invocations, including refreshes.
    pub async fn enrol_calls(&self) -> usize {
        self.state.read().await.enrol_calls
    }

    pub async fn payment_record(&self, id: i64) -> Option<PaymentRecord> {
        self.state
            .read()
            .await
            .payments
            .iter()
            .find(|r| r.id == id)
            .cloned()
    }

    pub async fn record_updates(&self) -> usize {
        self.state.read().await.record_updates
    }

    pub async fn audit_events(&self) -> Vec<AuditEvent> {
        self.state.read().await.audit.clone()
    }
}

#[async_trait]
impl EnrolmentHost for InMemoryLms {
    async fn find_user(&self, user_id: i64) -> Result<Option<User>, CallbackError> {
        Ok(self.state.read().await.users.get(&user_id).cloned())
    }

    async fn find_course(&self, course_id: i64) -> Result<Option<Course>, CallbackError> {
        Ok(self.state.read().await.courses.get(&course_id).cloned())
    }

    async fn find_enrol_instance(
        &self,
        instance_id: i64,
        method: &str,
    ) -> Result<Option<EnrolInstance>, CallbackError> {
        Ok(self
            .state
            .read()
            .await
            .instances
            .get(&instance_id)
            .filter(|i| i.enrol == method && i.status == EnrolInstance::STATUS_ENABLED)
            .cloned())
    }

    async fn enrol_user(
        &self,
        instance: &EnrolInstance,
        user_id: i64,
        role_id: i64,
        window: EnrolmentWindow,
    ) -> Result<(), CallbackError> {
        let mut state = self.state.write().await;
        state.enrol_calls += 1;
        state.enrolments.insert(
            (instance.id, user_id),
            Enrolment {
                course_id: instance.course_id,
                role_id,
                window,
            },
        );
        Ok(())
    }

    async fn course_teacher(&self, course_id: i64) -> Result<Option<User>, CallbackError> {
        let state = self.state.read().await;
        let teacher = state
            .teachers
            .get(&course_id)
            .and_then(|ts| ts.iter().min())
            .and_then(|(_, user_id)| state.users.get(user_id))
            .cloned();
        Ok(teacher)
    }

    async fn site_admins(&self) -> Result<Vec<User>, CallbackError> {
        let state = self.state.read().await;
        Ok(state
            .admins
            .iter()
            .filter_map(|id| state.users.get(id))
            .cloned()
            .collect())
    }
}

#[async_trait]
impl PaymentLedger for InMemoryLms {
    async fn latest_record(
        &self,
        key: &PaymentKey,
    ) -> Result<Option<PaymentRecord>, CallbackError> {
        Ok(self
            .state
            .read()
            .await
            .payments
            .iter()
            .filter(|r| r.matches(key))
            .max_by_key(|r| r.timestamp)
            .cloned())
    }

    async fn update_record(&self, record: &PaymentRecord) -> Result<(), CallbackError> {
        let mut state = self.state.write().await;
        let stored = state
            .payments
            .iter_mut()
            .find(|r| r.id == record.id)
            .ok_or_else(|| CallbackError::NotFound(format!("Payment record {}", record.id)))?;
        *stored = record.clone();
        state.record_updates += 1;
        Ok(())
    }
}

#[async_trait]
impl AuditSink for InMemoryLms {
    async fn record(&self, event: AuditEvent) -> Result<(), CallbackError> {
        self.state.write().await.audit.push(event);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(id: i64, reference: &str, timestamp: i64) -> PaymentRecord {
        PaymentRecord {
            id,
            user_id: 7,
            course_id: 3,
            instance_id: 2,
            reference: reference.to_string(),
            amount: Some(150_000.0),
            currency: Some("IDR".to_string()),
            payment_status: "Pending".to_string(),
            pending_reason: None,
            timestamp,
            time_updated: None,
        }
    }

    #[tokio::test]
    async fn latest_record_picks_newest_matching_row() {
        let lms = InMemoryLms::new();
        lms.add_payment_record(record(1, "sid-1", 1_000)).await;
        lms.add_payment_record(record(2, "sid-1", 3_000)).await;
        lms.add_payment_record(record(3, "sid-2", 9_000)).await;

        let key = PaymentKey {
            user_id: 7,
            course_id: 3,
            instance_id: 2,
            reference: "sid-1".to_string(),
        };

        let latest = lms.latest_record(&key).await.unwrap().unwrap();
        assert_eq!(latest.id, 2);
    }

    #[tokio::test]
    async fn disabled_instances_are_invisible() {
        let lms = InMemoryLms::new();
        lms.add_instance(EnrolInstance {
            id: 2,
            course_id: 3,
            enrol: "ipaymu".to_string(),
            status: 1,
            role_id: 5,
            enrol_period: 0,
            cost: None,
            currency: None,
        })
        .await;

        assert!(lms.find_enrol_instance(2, "ipaymu").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn updating_unknown_record_is_not_found() {
        let lms = InMemoryLms::new();
        let err = lms.update_record(&record(42, "sid", 0)).await.unwrap_err();
        assert!(matches!(err, CallbackError::NotFound(_)));
    }
}
