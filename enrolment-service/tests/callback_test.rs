mod common;

use common::{
    paid_status, seeded_lms, TestApp, COURSE_ID, INSTANCE_ID, ORDER_ID, RECORD_ID, SESSION_ID,
    STUDENT_ID,
};
use reqwest::StatusCode;
use serde_json::json;

#[tokio::test]
async fn paid_callback_enrols_student_and_settles_record() {
    let app = TestApp::spawn().await;
    app.mock_check_transaction(paid_status("paid")).await;

    let response = app
        .post_json(json!({ "merchantOrderId": ORDER_ID, "sid": SESSION_ID, "trx_id": "T100" }))
        .await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.text().await.unwrap(), "Success");

    let enrolment = app.lms.enrolment(INSTANCE_ID, STUDENT_ID).await.unwrap();
    assert_eq!(enrolment.course_id, COURSE_ID);
    assert_eq!(enrolment.role_id, 5);

    let record = app.lms.payment_record(RECORD_ID).await.unwrap();
    assert_eq!(record.payment_status, "Success");
    assert!(record.time_updated.is_some());

    let audit = app.lms.audit_events().await;
    assert_eq!(audit.len(), 1);
    assert_eq!(audit[0].merchant_order_id, ORDER_ID);

    let sent = app.mailer.sent().await;
    let recipients: Vec<&str> = sent.iter().map(|m| m.to.as_str()).collect();
    assert_eq!(recipients, ["budi@example.com", "sari@example.com"]);
    assert!(sent.iter().all(|m| m.subject == "New enrolment in RUST101"));

    let requests = app.ipaymu.received_requests().await.unwrap();
    assert_eq!(requests.len(), 1);
    let body: serde_json::Value = serde_json::from_slice(&requests[0].body).unwrap();
    assert_eq!(body, json!({ "transactionId": "T100" }));
}

#[tokio::test]
async fn pending_payment_is_rejected_without_side_effects() {
    let app = TestApp::spawn().await;
    app.mock_check_transaction(paid_status("pending")).await;

    let response = app
        .post_json(json!({ "merchantOrderId": ORDER_ID, "sid": SESSION_ID, "trx_id": "T100" }))
        .await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body: serde_json::Value = response.json().await.unwrap();
    assert!(body["error"].as_str().unwrap().contains("pending"));

    assert!(app.lms.enrolment(INSTANCE_ID, STUDENT_ID).await.is_none());
    assert_eq!(app.lms.record_updates().await, 0);
    assert!(app.mailer.sent().await.is_empty());
}

#[tokio::test]
async fn missing_payment_record_still_enrols_but_fails() {
    let app = TestApp::spawn().await;
    app.mock_check_transaction(paid_status("paid")).await;

    let response = app
        .post_json(json!({ "merchantOrderId": ORDER_ID, "sid": "UNKNOWN", "trx_id": "T100" }))
        .await;

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert!(app.lms.enrolment(INSTANCE_ID, STUDENT_ID).await.is_some());
    assert_eq!(app.lms.record_updates().await, 0);
    assert!(app.mailer.sent().await.is_empty());
}

#[tokio::test]
async fn missing_order_id_fails_before_provider_call() {
    let app = TestApp::spawn().await;
    app.mock_check_transaction(paid_status("paid")).await;

    let response = app
        .post_json(json!({ "sid": SESSION_ID, "trx_id": "T100" }))
        .await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body: serde_json::Value = response.json().await.unwrap();
    assert!(body["error"].as_str().unwrap().contains("merchantOrderId"));
    assert_eq!(app.provider_calls().await, 0);
}

#[tokio::test]
async fn disabled_plugin_answers_503_before_parsing() {
    let app = TestApp::spawn_with(seeded_lms().await, |config| {
        config.enrol.enabled = false;
    })
    .await;
    app.mock_check_transaction(paid_status("paid")).await;

    let response = app.get_query("garbage").await;

    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(app.provider_calls().await, 0);
    assert_eq!(app.lms.enrol_calls().await, 0);
}

#[tokio::test]
async fn form_body_is_accepted() {
    let app = TestApp::spawn().await;
    app.mock_check_transaction(paid_status("paid")).await;

    let response = app
        .post_form(&[
            ("merchantOrderId", ORDER_ID),
            ("sid", SESSION_ID),
            ("trx_id", "T100"),
            ("status", "berhasil"),
        ])
        .await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        app.lms.payment_record(RECORD_ID).await.unwrap().payment_status,
        "Success"
    );
}

#[tokio::test]
async fn query_string_callback_is_accepted() {
    let app = TestApp::spawn().await;
    app.mock_check_transaction(paid_status("paid")).await;

    let response = app
        .get_query(&format!(
            "merchantOrderId={}&sid={}&trx_id=T100",
            ORDER_ID, SESSION_ID
        ))
        .await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.text().await.unwrap(), "Success");
}

#[tokio::test]
async fn malformed_order_id_is_rejected_before_provider_call() {
    let app = TestApp::spawn().await;
    app.mock_check_transaction(paid_status("paid")).await;

    let response = app
        .post_json(json!({ "merchantOrderId": "abc-7-3", "sid": SESSION_ID, "trx_id": "T100" }))
        .await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(app.provider_calls().await, 0);
}

#[tokio::test]
async fn missing_trx_id_is_rejected() {
    let app = TestApp::spawn().await;

    let response = app
        .post_json(json!({ "merchantOrderId": ORDER_ID, "sid": SESSION_ID }))
        .await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(app.provider_calls().await, 0);
}

#[tokio::test]
async fn provider_error_maps_to_bad_gateway() {
    let app = TestApp::spawn().await;
    wiremock::Mock::given(wiremock::matchers::method("POST"))
        .respond_with(wiremock::ResponseTemplate::new(500))
        .mount(&app.ipaymu)
        .await;

    let response = app
        .post_json(json!({ "merchantOrderId": ORDER_ID, "sid": SESSION_ID, "trx_id": "T100" }))
        .await;

    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    assert_eq!(app.lms.enrol_calls().await, 0);
}

#[tokio::test]
async fn replayed_callback_keeps_single_enrolment() {
    let app = TestApp::spawn().await;
    app.mock_check_transaction(paid_status("paid")).await;
    let payload = json!({ "merchantOrderId": ORDER_ID, "sid": SESSION_ID, "trx_id": "T100" });

    assert_eq!(app.post_json(payload.clone()).await.status(), StatusCode::OK);
    let first = app.lms.enrolment(INSTANCE_ID, STUDENT_ID).await.unwrap();

    assert_eq!(app.post_json(payload).await.status(), StatusCode::OK);
    let second = app.lms.enrolment(INSTANCE_ID, STUDENT_ID).await.unwrap();

    assert_eq!(first, second);
    assert_eq!(app.lms.record_updates().await, 2);
    assert_eq!(app.mailer.sent().await.len(), 4);
}

#[tokio::test]
async fn provider_timeout_maps_to_bad_gateway() {
    let app = TestApp::spawn().await;
    wiremock::Mock::given(wiremock::matchers::method("POST"))
        .respond_with(
            wiremock::ResponseTemplate::new(200)
                .set_body_json(paid_status("paid"))
                .set_delay(std::time::Duration::from_secs(4)),
        )
        .mount(&app.ipaymu)
        .await;

    let response = app
        .post_json(json!({ "merchantOrderId": ORDER_ID, "sid": SESSION_ID, "trx_id": "T100" }))
        .await;

    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    assert_eq!(app.lms.enrol_calls().await, 0);
    assert_eq!(app.lms.record_updates().await, 0);
}
