//! # Answer Handler
//!
//! `POST /answer` runs one query through the pipeline and returns the validated
//! answer with its citations. With `?debug=true` the response also carries the
//! sub-queries, retrieval statistics and the state trace.

use super::{wrap_response, ApiResponse, AppError, AppState, DebugParams};
use crate::{
    auth::middleware::AuthenticatedUser,
    types::{AnswerRequest, AnswerResponse},
};
use axum::{
    extract::{Query, State},
    Json,
};
use serde_json::json;
use tracing::{info, info_span, Instrument};
use uuid::Uuid;

pub async fn answer_handler(
    State(app_state): State<AppState>,
    AuthenticatedUser(subject): AuthenticatedUser,
    debug_params: Query<DebugParams>,
    Json(payload): Json<AnswerRequest>,
) -> Result<Json<ApiResponse<AnswerResponse>>, AppError> {
    let request_id = Uuid::new_v4();
    let span = info_span!("answer_request", %request_id);
    span.in_scope(|| {
        info!(
            caller = subject.as_deref().unwrap_or("anonymous"),
            "Received answer request."
        )
    });

    let outcome = app_state
        .pipeline
        .answer(&payload.query)
        .instrument(span)
        .await?;

    let debug_info = Some(json!({
        "request_id": request_id.to_string(),
        "sub_queries": outcome.sub_queries,
        "context_chunks": outcome.context_chunks,
        "context_stats": outcome.context_stats,
        "segments": outcome.answer.segments,
        "trace": outcome.trace,
    }));
    let citations = outcome.answer.citations();

    Ok(wrap_response(
        AnswerResponse {
            answer: outcome.answer.text,
            citations,
        },
        debug_params,
        debug_info,
    ))
}
