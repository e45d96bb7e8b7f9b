//! iPaymu payment notification endpoint.
//!
//! The caller is never trusted: the transaction id it sends is re-checked
//! against the iPaymu API before anything is written.

use axum::{
    body::Bytes,
    extract::{RawQuery, State},
};
use service_core::error::AppError;

use crate::dtos::CallbackRequest;
use crate::error::CallbackError;
use crate::models::OrderReference;
use crate::services::record_callback;
use crate::startup::AppState;

/// Body returned to iPaymu once the enrolment is settled.
pub const SUCCESS_BODY: &str = "Success";

pub async fn ipaymu_callback(
    State(state): State<AppState>,
    RawQuery(query): RawQuery,
    body: Bytes,
) -> Result<&'static str, AppError> {
    match handle(&state, query.as_deref(), &body).await {
        Ok(()) => {
            record_callback("success");
            Ok(SUCCESS_BODY)
        }
        Err(e) => {
            record_callback(e.kind());
            tracing::warn!(outcome = e.kind(), error = %e, "Callback rejected");
            Err(e.into())
        }
    }
}

async fn handle(state: &AppState, query: Option<&str>, body: &[u8]) -> Result<(), CallbackError> {
    if !state.config.enrol.enabled {
        return Err(CallbackError::FeatureDisabled);
    }

    let request = CallbackRequest::from_parts(query, body)?;
    tracing::info!(
        merchant_order_id = %request.merchant_order_id,
        trx_id = %request.trx_id,
        sid = %request.sid,
        "Callback received"
    );

    let order = OrderReference::parse(&request.merchant_order_id)?;

    let status = state.verifier.verify(&request.trx_id).await?;
    status.assert_paid()?;

    let finalized = state
        .finalizer
        .finalize(&order, &request.trx_id, &request.sid)
        .await?;

    state.notifier.dispatch(&finalized).await?;

    tracing::info!(
        order = %order,
        trx_id = %request.trx_id,
        "Callback processed"
    );

    Ok(())
}
