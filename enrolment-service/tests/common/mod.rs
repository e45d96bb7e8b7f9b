#![allow(dead_code)]

use std::sync::Arc;

use enrolment_service::config::{
    DatabaseConfig, EnrolConfig, EnrolmentConfig, IpaymuConfig, MailConfig, SmtpConfig,
    ENROL_METHOD,
};
use enrolment_service::models::{Course, EnrolInstance, PaymentRecord, User};
use enrolment_service::services::{InMemoryLms, IpaymuClient, RecordingMailer};
use enrolment_service::{Application, Ports};
use secrecy::Secret;
use serde_json::{json, Value};
use wiremock::matchers::{header_exists, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

pub const STUDENT_ID: i64 = 7;
pub const COURSE_ID: i64 = 3;
pub const INSTANCE_ID: i64 = 2;
pub const RECORD_ID: i64 = 11;
pub const ORDER_ID: &str = "abc-7-3-2";
pub const SESSION_ID: &str = "SID-1";

pub struct TestApp {
    pub address: String,
    pub port: u16,
    pub lms: InMemoryLms,
    pub mailer: Arc<RecordingMailer>,
    pub ipaymu: MockServer,
    pub client: reqwest::Client,
}

pub fn test_config(ipaymu_base_url: &str) -> EnrolmentConfig {
    EnrolmentConfig {
        common: service_core::config::Config {
            port: 0,
            log_level: "debug".to_string(),
            otlp_endpoint: None,
        },
        database: DatabaseConfig {
            url: Secret::new("mongodb://localhost:27017".to_string()),
            db_name: "enrolment_test".to_string(),
        },
        ipaymu: IpaymuConfig {
            va: "1179000899".to_string(),
            api_key: Secret::new("test-api-key".to_string()),
            api_base_url: ipaymu_base_url.to_string(),
            timeout_secs: 2,
        },
        enrol: EnrolConfig {
            enabled: true,
            method: ENROL_METHOD.to_string(),
        },
        mail: MailConfig {
            mail_students: true,
            mail_teachers: true,
            mail_admins: false,
            student_email: None,
            teacher_email: None,
            admin_email: None,
            support_name: "Support".to_string(),
            support_email: "support@example.com".to_string(),
        },
        smtp: SmtpConfig {
            host: "localhost".to_string(),
            port: 2525,
            user: String::new(),
            password: Secret::new(String::new()),
            from_email: "noreply@example.com".to_string(),
            from_name: "Course Enrolment".to_string(),
            enabled: false,
        },
        service_name: "enrolment-service-test".to_string(),
    }
}

fn user(id: i64, username: &str, first: &str) -> User {
    User {
        id,
        username: username.to_string(),
        first_name: first.to_string(),
        last_name: "Test".to_string(),
        email: format!("{}@example.com", username),
    }
}

/// Student 7, course 3, enabled instance 2 and a pending record for SID-1.
pub async fn seeded_lms() -> InMemoryLms {
    let lms = InMemoryLms::new();
    lms.add_user(user(STUDENT_ID, "budi", "Budi")).await;
    lms.add_user(user(20, "sari", "Sari")).await;
    lms.add_teacher(COURSE_ID, 20, 1).await;
    lms.add_course(Course {
        id: COURSE_ID,
        short_name: "RUST101".to_string(),
        full_name: "Practical Rust".to_string(),
    })
    .await;
    lms.add_instance(EnrolInstance {
        id: INSTANCE_ID,
        course_id: COURSE_ID,
        enrol: ENROL_METHOD.to_string(),
        status: EnrolInstance::STATUS_ENABLED,
        role_id: 5,
        enrol_period: 0,
        cost: Some(150_000.0),
        currency: Some("IDR".to_string()),
    })
    .await;
    lms.add_payment_record(PaymentRecord {
        id: RECORD_ID,
        user_id: STUDENT_ID,
        course_id: COURSE_ID,
        instance_id: INSTANCE_ID,
        reference: SESSION_ID.to_string(),
        amount: Some(150_000.0),
        currency: Some("IDR".to_string()),
        payment_status: "Pending".to_string(),
        pending_reason: None,
        timestamp: 1_000,
        time_updated: None,
    })
    .await;
    lms
}

pub fn paid_status(paid: &str) -> Value {
    json!({
        "Status": 200,
        "Success": true,
        "Message": "success",
        "Data": { "TransactionId": 100, "StatusDesc": "Berhasil", "PaidStatus": paid }
    })
}

impl TestApp {
    pub async fn spawn() -> Self {
        Self::spawn_with(seeded_lms().await, |_| {}).await
    }

    pub async fn spawn_with(lms: InMemoryLms, tweak: impl FnOnce(&mut EnrolmentConfig)) -> Self {
        let ipaymu = MockServer::start().await;
        let mut config = test_config(&ipaymu.uri());
        tweak(&mut config);

        let mailer = Arc::new(RecordingMailer::new());
        let lms_port = Arc::new(lms.clone());
        let ports = Ports {
            host: lms_port.clone(),
            ledger: lms_port.clone(),
            audit: lms_port,
            verifier: Arc::new(
                IpaymuClient::new(config.ipaymu.clone()).expect("Failed to build iPaymu client"),
            ),
            mailer: mailer.clone(),
        };

        let app = Application::build_with_ports(config, ports)
            .await
            .expect("Failed to build test application");
        let port = app.port();
        let address = format!("http://127.0.0.1:{}", port);

        tokio::spawn(async move {
            app.run_until_stopped().await.ok();
        });

        let client = reqwest::Client::new();
        for _ in 0..50 {
            if client.get(format!("{}/health", address)).send().await.is_ok() {
                break;
            }
            tokio::time::sleep(tokio::time::Duration::from_millis(50)).await;
        }

        TestApp {
            address,
            port,
            lms,
            mailer,
            ipaymu,
            client,
        }
    }

    /// Answer the transaction check with the given payload.
    pub async fn mock_check_transaction(&self, response: Value) {
        Mock::given(method("POST"))
            .and(path("/api/v2/transaction"))
            .and(header_exists("signature"))
            .and(header_exists("va"))
            .and(header_exists("timestamp"))
            .respond_with(ResponseTemplate::new(200).set_body_json(response))
            .mount(&self.ipaymu)
            .await;
    }

    pub async fn provider_calls(&self) -> usize {
        self.ipaymu
            .received_requests()
            .await
            .map(|r| r.len())
            .unwrap_or(0)
    }

    pub async fn post_json(&self, body: Value) -> reqwest::Response {
        self.client
            .post(format!("{}/callback", self.address))
            .json(&body)
            .send()
            .await
            .expect("Failed to execute request")
    }

    pub async fn post_form(&self, form: &[(&str, &str)]) -> reqwest::Response {
        self.client
            .post(format!("{}/callback", self.address))
            .form(form)
            .send()
            .await
            .expect("Failed to execute request")
    }

    pub async fn get_query(&self, query: &str) -> reqwest::Response {
        self.client
            .get(format!("{}/callback?{}", self.address, query))
            .send()
            .await
            .expect("Failed to execute request")
    }
}
