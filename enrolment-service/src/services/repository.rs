use async_trait::async_trait;
use futures::TryStreamExt;
use mongodb::options::{FindOneOptions, FindOptions, IndexOptions, UpdateOptions};
use mongodb::{bson::doc, Collection, Database, IndexModel};
use serde::Deserialize;

use crate::error::CallbackError;
use crate::models::{
    AuditEvent, Course, EnrolInstance, EnrolmentWindow, PaymentKey, PaymentRecord, User,
};
use crate::ports::{AuditSink, EnrolmentHost, PaymentLedger};

/// Teacher role assignment on a course; documents also carry `course_id`
/// and an `authority` rank (lower wins).
#[derive(Debug, Deserialize, Clone)]
struct CourseTeacher {
    user_id: i64,
}

/// Site admin entry keyed by user id, ordered by `rank`.
#[derive(Debug, Deserialize, Clone)]
struct SiteAdmin {
    #[serde(rename = "_id")]
    user_id: i64,
}

/// MongoDB-backed host adapter: learning platform tables, payment records
/// and the callback audit log.
#[derive(Clone)]
pub struct EnrolmentRepository {
    users: Collection<User>,
    courses: Collection<Course>,
    enrol_instances: Collection<EnrolInstance>,
    user_enrolments: Collection<mongodb::bson::Document>,
    course_teachers: Collection<CourseTeacher>,
    site_admins: Collection<SiteAdmin>,
    payments: Collection<PaymentRecord>,
    audit_log: Collection<AuditEvent>,
}

impl EnrolmentRepository {
    pub fn new(db: &Database) -> Self {
        Self {
            users: db.collection("users"),
            courses: db.collection("courses"),
            enrol_instances: db.collection("enrol"),
            user_enrolments: db.collection("user_enrolments"),
            course_teachers: db.collection("course_teachers"),
            site_admins: db.collection("site_admins"),
            payments: db.collection("enrol_ipaymu"),
            audit_log: db.collection("enrol_ipaymu_log"),
        }
    }

    /// Initialize indexes backing the callback lookups.
    pub async fn init_indexes(&self) -> anyhow::Result<()> {
        // Latest-record lookup: key tuple then creation time descending
        let payment_key_index = IndexModel::builder()
            .keys(doc! {
                "user_id": 1,
                "course_id": 1,
                "instance_id": 1,
                "reference": 1,
                "timestamp": -1
            })
            .options(
                IndexOptions::builder()
                    .name("payment_key_timestamp_idx".to_string())
                    .build(),
            )
            .build();

        self.payments
            .create_indexes([payment_key_index], None)
            .await?;

        let enrolment_index = IndexModel::builder()
            .keys(doc! { "enrol_id": 1, "user_id": 1 })
            .options(
                IndexOptions::builder()
                    .name("user_enrolment_idx".to_string())
                    .unique(true)
                    .build(),
            )
            .build();

        self.user_enrolments
            .create_indexes([enrolment_index], None)
            .await?;

        let teacher_index = IndexModel::builder()
            .keys(doc! { "course_id": 1, "authority": 1, "user_id": 1 })
            .options(
                IndexOptions::builder()
                    .name("course_teacher_idx".to_string())
                    .build(),
            )
            .build();

        self.course_teachers
            .create_indexes([teacher_index], None)
            .await?;

        tracing::info!("Enrolment service indexes initialized");
        Ok(())
    }
}

#[async_trait]
impl EnrolmentHost for EnrolmentRepository {
    async fn find_user(&self, user_id: i64) -> Result<Option<User>, CallbackError> {
        Ok(self.users.find_one(doc! { "_id": user_id }, None).await?)
    }

    async fn find_course(&self, course_id: i64) -> Result<Option<Course>, CallbackError> {
        Ok(self.courses.find_one(doc! { "_id": course_id }, None).await?)
    }

    async fn find_enrol_instance(
        &self,
        instance_id: i64,
        method: &str,
    ) -> Result<Option<EnrolInstance>, CallbackError> {
        let filter = doc! {
            "_id": instance_id,
            "enrol": method,
            "status": EnrolInstance::STATUS_ENABLED
        };
        Ok(self.enrol_instances.find_one(filter, None).await?)
    }

    async fn enrol_user(
        &self,
        instance: &EnrolInstance,
        user_id: i64,
        role_id: i64,
        window: EnrolmentWindow,
    ) -> Result<(), CallbackError> {
        let filter = doc! { "enrol_id": instance.id, "user_id": user_id };
        let update = doc! {
            "$set": {
                "course_id": instance.course_id,
                "role_id": role_id,
                "status": 0,
                "time_start": window.start,
                "time_end": window.end,
                "time_modified": chrono::Utc::now().timestamp()
            }
        };
        let options = UpdateOptions::builder().upsert(true).build();

        self.user_enrolments
            .update_one(filter, update, options)
            .await?;

        Ok(())
    }

    async fn course_teacher(&self, course_id: i64) -> Result<Option<User>, CallbackError> {
        let options = FindOneOptions::builder()
            .sort(doc! { "authority": 1, "user_id": 1 })
            .build();

        let Some(teacher) = self
            .course_teachers
            .find_one(doc! { "course_id": course_id }, options)
            .await?
        else {
            return Ok(None);
        };

        self.find_user(teacher.user_id).await
    }

    async fn site_admins(&self) -> Result<Vec<User>, CallbackError> {
        let options = FindOptions::builder().sort(doc! { "rank": 1 }).build();
        let admins: Vec<SiteAdmin> = self
            .site_admins
            .find(None, options)
            .await?
            .try_collect()
            .await?;

        let ids: Vec<i64> = admins.iter().map(|a| a.user_id).collect();
        let mut users: Vec<User> = self
            .users
            .find(doc! { "_id": { "$in": ids.clone() } }, None)
            .await?
            .try_collect()
            .await?;

        // Keep the admin ranking; $in does not preserve order.
        users.sort_by_key(|u| ids.iter().position(|id| *id == u.id));

        Ok(users)
    }
}

#[async_trait]
impl PaymentLedger for EnrolmentRepository {
    async fn latest_record(
        &self,
        key: &PaymentKey,
    ) -> Result<Option<PaymentRecord>, CallbackError> {
        let filter = doc! {
            "user_id": key.user_id,
            "course_id": key.course_id,
            "instance_id": key.instance_id,
            "reference": &key.reference
        };
        let options = FindOneOptions::builder()
            .sort(doc! { "timestamp": -1 })
            .build();

        Ok(self.payments.find_one(filter, options).await?)
    }

    async fn update_record(&self, record: &PaymentRecord) -> Result<(), CallbackError> {
        let update = doc! {
            "$set": {
                "payment_status": &record.payment_status,
                "pending_reason": record.pending_reason.as_deref(),
                "time_updated": record.time_updated
            }
        };

        let result = self
            .payments
            .update_one(doc! { "_id": record.id }, update, None)
            .await?;

        if result.matched_count == 0 {
            return Err(CallbackError::NotFound(format!(
                "Payment record {}",
                record.id
            )));
        }

        Ok(())
    }
}

#[async_trait]
impl AuditSink for EnrolmentRepository {
    async fn record(&self, event: AuditEvent) -> Result<(), CallbackError> {
        self.audit_log.insert_one(event, None).await?;
        Ok(())
    }
}
