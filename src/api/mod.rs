use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use uuid::Uuid;

use crate::assignment::AssignmentAllocator;
use crate::error::{AdmissionsError, Result};
use crate::intake::LeadIntake;
use crate::leads::{Lead, LeadApplication, LeadStatus, LeadUpdate};

#[derive(Clone)]
pub struct ApiState {
    pub allocator: Arc<AssignmentAllocator>,
    pub intake: Arc<LeadIntake>,
}

#[derive(Serialize)]
struct RosterResponse {
    roster: Vec<String>,
    programs: Vec<String>,
}

#[derive(Serialize)]
struct AssignmentStateResponse {
    cursors: BTreeMap<String, usize>,
    workload_aware: bool,
    rebalance_threshold: u64,
}

#[derive(Deserialize)]
struct NextAssigneeRequest {
    program: String,
}

#[derive(Serialize)]
struct NextAssigneeResponse {
    program: String,
    member: String,
    position: usize,
    next_cursor: usize,
    rebalanced: bool,
    persisted: bool,
}

#[derive(Serialize)]
struct SubmitLeadResponse {
    success: bool,
    lead_id: Option<String>,
    assigned_to: Option<String>,
    error: Option<String>,
}

#[derive(Deserialize)]
struct ListLeadsQuery {
    status: Option<String>,
}

#[derive(Serialize)]
struct LeadsResponse {
    count: usize,
    leads: Vec<Lead>,
}

#[derive(Deserialize)]
struct ManualLeadRequest {
    #[serde(flatten)]
    application: LeadApplication,
    #[serde(default)]
    status: Option<LeadStatus>,
}

#[derive(Serialize)]
struct ErrorResponse {
    success: bool,
    error: String,
}

pub fn router(state: ApiState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/api/roster", get(roster_handler))
        .route("/api/assignment", get(assignment_state_handler))
        .route("/api/assignment/next", post(next_assignee_handler))
        .route("/api/assignment/reset", post(reset_handler))
        .route("/api/assignment/stats", get(stats_handler))
        .route("/api/leads", get(list_leads_handler).post(submit_lead_handler))
        .route("/api/leads/manual", post(add_lead_handler))
        .route("/api/leads/:id", get(get_lead_handler).patch(update_lead_handler))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Serve the API until `shutdown` is cancelled.
pub async fn run_api(addr: SocketAddr, state: ApiState, shutdown: CancellationToken) -> Result<()> {
    let app = router(state);

    let listener = tokio::net::TcpListener::bind(addr).await.map_err(|e| {
        tracing::error!(addr = %addr, error = %e, "Failed to bind API server");
        e
    })?;
    tracing::info!(addr = %addr, "Starting API server");

    axum::serve(listener, app)
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await?;

    tracing::info!("API server stopped");
    Ok(())
}

fn status_for(error: &AdmissionsError) -> StatusCode {
    match error {
        AdmissionsError::InvalidProgram { .. } | AdmissionsError::InvalidApplication(_) => {
            StatusCode::BAD_REQUEST
        }
        AdmissionsError::DuplicateApplication { .. } => StatusCode::CONFLICT,
        AdmissionsError::LeadNotFound(_) => StatusCode::NOT_FOUND,
        AdmissionsError::SubmissionTimeout(_) => StatusCode::GATEWAY_TIMEOUT,
        AdmissionsError::LeadStore(_)
        | AdmissionsError::WorkloadLookupFailed(_)
        | AdmissionsError::Http(_) => StatusCode::BAD_GATEWAY,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn error_response(error: AdmissionsError) -> Response {
    (
        status_for(&error),
        Json(ErrorResponse {
            success: false,
            error: error.to_string(),
        }),
    )
        .into_response()
}

async fn roster_handler(State(state): State<ApiState>) -> impl IntoResponse {
    Json(RosterResponse {
        roster: state.allocator.current_roster().to_vec(),
        programs: state.allocator.current_programs().to_vec(),
    })
}

async fn assignment_state_handler(State(state): State<ApiState>) -> impl IntoResponse {
    let cursors = state
        .allocator
        .state()
        .await
        .iter()
        .map(|(program, cursor)| (program.to_string(), cursor))
        .collect();
    let config = state.allocator.config();

    Json(AssignmentStateResponse {
        cursors,
        workload_aware: config.workload_aware,
        rebalance_threshold: config.rebalance_threshold,
    })
}

async fn next_assignee_handler(
    State(state): State<ApiState>,
    Json(payload): Json<NextAssigneeRequest>,
) -> Response {
    match state.allocator.allocate(&payload.program).await {
        Ok(allocation) => Json(NextAssigneeResponse {
            program: allocation.program,
            member: allocation.member,
            position: allocation.position,
            next_cursor: allocation.next_cursor,
            rebalanced: allocation.rebalanced,
            persisted: allocation.persisted,
        })
        .into_response(),
        Err(e) => error_response(e),
    }
}

async fn reset_handler(State(state): State<ApiState>) -> impl IntoResponse {
    state.allocator.reset().await;
    Json(serde_json::json!({ "success": true }))
}

async fn stats_handler(State(state): State<ApiState>) -> Response {
    match state.allocator.assignment_stats().await {
        Ok(stats) => Json(stats).into_response(),
        Err(e) => error_response(e),
    }
}

async fn submit_lead_handler(
    State(state): State<ApiState>,
    Json(application): Json<LeadApplication>,
) -> Response {
    match state.intake.submit(application).await {
        Ok(lead) => (
            StatusCode::OK,
            Json(SubmitLeadResponse {
                success: true,
                lead_id: Some(lead.id.to_string()),
                assigned_to: lead.assign_to,
                error: None,
            }),
        )
            .into_response(),
        Err(e) => {
            let status = status_for(&e);
            (
                status,
                Json(SubmitLeadResponse {
                    success: false,
                    lead_id: None,
                    assigned_to: None,
                    error: Some(e.to_string()),
                }),
            )
                .into_response()
        }
    }
}

async fn list_leads_handler(
    State(state): State<ApiState>,
    Query(query): Query<ListLeadsQuery>,
) -> Response {
    let status = match query.status.as_deref().map(str::parse::<LeadStatus>).transpose() {
        Ok(status) => status,
        Err(e) => return error_response(e),
    };
    match state.intake.list_leads(status).await {
        Ok(leads) => Json(LeadsResponse {
            count: leads.len(),
            leads,
        })
        .into_response(),
        Err(e) => error_response(e),
    }
}

async fn add_lead_handler(
    State(state): State<ApiState>,
    Json(payload): Json<ManualLeadRequest>,
) -> Response {
    match state.intake.add_lead(payload.application, payload.status).await {
        Ok(lead) => (StatusCode::CREATED, Json(lead)).into_response(),
        Err(e) => error_response(e),
    }
}

async fn get_lead_handler(State(state): State<ApiState>, Path(id): Path<Uuid>) -> Response {
    match state.intake.get_lead(id).await {
        Ok(lead) => Json(lead).into_response(),
        Err(e) => error_response(e),
    }
}

async fn update_lead_handler(
    State(state): State<ApiState>,
    Path(id): Path<Uuid>,
    Json(update): Json<LeadUpdate>,
) -> Response {
    match state.intake.update_lead(id, update).await {
        Ok(lead) => Json(lead).into_response(),
        Err(e) => error_response(e),
    }
}
