use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;

use super::domain::{Category, NewTicket, TicketId, TicketUpdate, UserId, ValidationError};
use super::report::Cadence;
use super::repository::{NotificationSink, ProfileDirectory, RepositoryError, TicketRepository};
use super::service::{HelpdeskService, TicketServiceError};

/// Header carrying the authenticated user id, set by the upstream auth layer.
pub const ACTOR_HEADER: &str = "x-user-id";

#[derive(Debug, Default, Deserialize)]
pub(crate) struct ListParams {
    #[serde(default)]
    include_closed: bool,
    #[serde(default)]
    category: Option<String>,
}

impl ListParams {
    fn category(&self) -> Result<Option<Category>, ValidationError> {
        self.category.as_deref().map(str::parse).transpose()
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct RatingRequest {
    pub(crate) rating: i64,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ReportRequest {
    pub(crate) timespan: String,
    #[serde(default)]
    pub(crate) periods: Option<usize>,
    #[serde(default)]
    pub(crate) format: ReportFormat,
}

/// CSV download, or JSON rows carrying every computed column.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub(crate) enum ReportFormat {
    #[default]
    Csv,
    Json,
}

/// Router builder exposing ticket, statistics and report endpoints.
pub fn ticket_router<R, D, N>(service: Arc<HelpdeskService<R, D, N>>) -> Router
where
    R: TicketRepository + 'static,
    D: ProfileDirectory + 'static,
    N: NotificationSink + 'static,
{
    Router::new()
        .route(
            "/api/v1/tickets",
            post(create_handler::<R, D, N>).get(list_handler::<R, D, N>),
        )
        .route(
            "/api/v1/tickets/:ticket_id",
            get(detail_handler::<R, D, N>)
                .patch(update_handler::<R, D, N>)
                .delete(delete_handler::<R, D, N>),
        )
        .route(
            "/api/v1/tickets/:ticket_id/rating",
            post(rating_handler::<R, D, N>),
        )
        .route("/api/v1/statistics", get(statistics_handler::<R, D, N>))
        .route("/api/v1/reports", post(report_handler::<R, D, N>))
        .with_state(service)
}

pub(crate) async fn create_handler<R, D, N>(
    State(service): State<Arc<HelpdeskService<R, D, N>>>,
    headers: HeaderMap,
    Json(submission): Json<NewTicket>,
) -> Response
where
    R: TicketRepository + 'static,
    D: ProfileDirectory + 'static,
    N: NotificationSink + 'static,
{
    let actor = match actor_from(&headers) {
        Ok(actor) => actor,
        Err(response) => return response,
    };

    match service.create(actor, submission) {
        Ok(ticket) => (StatusCode::CREATED, Json(ticket)).into_response(),
        Err(err) => error_response(err),
    }
}

pub(crate) async fn list_handler<R, D, N>(
    State(service): State<Arc<HelpdeskService<R, D, N>>>,
    headers: HeaderMap,
    Query(params): Query<ListParams>,
) -> Response
where
    R: TicketRepository + 'static,
    D: ProfileDirectory + 'static,
    N: NotificationSink + 'static,
{
    let actor = match actor_from(&headers) {
        Ok(actor) => actor,
        Err(response) => return response,
    };

    let category = match params.category() {
        Ok(category) => category,
        Err(err) => return error_response(err.into()),
    };

    match service.list(actor, params.include_closed, category) {
        Ok(tickets) => {
            let payload = json!({ "tickets": tickets, "total": tickets.len() });
            (StatusCode::OK, Json(payload)).into_response()
        }
        Err(err) => error_response(err),
    }
}

pub(crate) async fn detail_handler<R, D, N>(
    State(service): State<Arc<HelpdeskService<R, D, N>>>,
    headers: HeaderMap,
    Path(ticket_id): Path<u64>,
) -> Response
where
    R: TicketRepository + 'static,
    D: ProfileDirectory + 'static,
    N: NotificationSink + 'static,
{
    let actor = match actor_from(&headers) {
        Ok(actor) => actor,
        Err(response) => return response,
    };

    match service.get(actor, TicketId(ticket_id)) {
        Ok(ticket) => (StatusCode::OK, Json(ticket)).into_response(),
        Err(err) => error_response(err),
    }
}

pub(crate) async fn update_handler<R, D, N>(
    State(service): State<Arc<HelpdeskService<R, D, N>>>,
    headers: HeaderMap,
    Path(ticket_id): Path<u64>,
    Json(patch): Json<TicketUpdate>,
) -> Response
where
    R: TicketRepository + 'static,
    D: ProfileDirectory + 'static,
    N: NotificationSink + 'static,
{
    let actor = match actor_from(&headers) {
        Ok(actor) => actor,
        Err(response) => return response,
    };

    match service.update(actor, TicketId(ticket_id), patch) {
        Ok(ticket) => (StatusCode::OK, Json(ticket)).into_response(),
        Err(err) => error_response(err),
    }
}

pub(crate) async fn delete_handler<R, D, N>(
    State(service): State<Arc<HelpdeskService<R, D, N>>>,
    headers: HeaderMap,
    Path(ticket_id): Path<u64>,
) -> Response
where
    R: TicketRepository + 'static,
    D: ProfileDirectory + 'static,
    N: NotificationSink + 'static,
{
    let actor = match actor_from(&headers) {
        Ok(actor) => actor,
        Err(response) => return response,
    };

    match service.delete(actor, TicketId(ticket_id)) {
        Ok(()) => (StatusCode::OK, Json(json!({ "status": "deleted" }))).into_response(),
        Err(err) => error_response(err),
    }
}

pub(crate) async fn rating_handler<R, D, N>(
    State(service): State<Arc<HelpdeskService<R, D, N>>>,
    headers: HeaderMap,
    Path(ticket_id): Path<u64>,
    Json(request): Json<RatingRequest>,
) -> Response
where
    R: TicketRepository + 'static,
    D: ProfileDirectory + 'static,
    N: NotificationSink + 'static,
{
    let actor = match actor_from(&headers) {
        Ok(actor) => actor,
        Err(response) => return response,
    };

    match service.rate(actor, TicketId(ticket_id), request.rating) {
        Ok(ticket) => (StatusCode::OK, Json(ticket)).into_response(),
        Err(err) => error_response(err),
    }
}

pub(crate) async fn statistics_handler<R, D, N>(
    State(service): State<Arc<HelpdeskService<R, D, N>>>,
    headers: HeaderMap,
) -> Response
where
    R: TicketRepository + 'static,
    D: ProfileDirectory + 'static,
    N: NotificationSink + 'static,
{
    if let Err(response) = signed_in(service.as_ref(), &headers) {
        return response;
    }

    match service.statistics() {
        Ok(dashboard) => (StatusCode::OK, Json(dashboard)).into_response(),
        Err(err) => error_response(err),
    }
}

pub(crate) async fn report_handler<R, D, N>(
    State(service): State<Arc<HelpdeskService<R, D, N>>>,
    headers: HeaderMap,
    Json(request): Json<ReportRequest>,
) -> Response
where
    R: TicketRepository + 'static,
    D: ProfileDirectory + 'static,
    N: NotificationSink + 'static,
{
    if let Err(response) = signed_in(service.as_ref(), &headers) {
        return response;
    }

    let cadence = match request.timespan.parse::<Cadence>() {
        Ok(cadence) => cadence,
        Err(err) => return error_response(err.into()),
    };

    match request.format {
        ReportFormat::Csv => match service.report_csv(cadence, request.periods) {
            Ok(csv) => csv_attachment(cadence, csv),
            Err(err) => error_response(err),
        },
        ReportFormat::Json => match service.report(cadence, request.periods) {
            Ok(rows) => {
                let payload = json!({ "timespan": cadence, "rows": rows });
                (StatusCode::OK, Json(payload)).into_response()
            }
            Err(err) => error_response(err),
        },
    }
}

fn csv_attachment(cadence: Cadence, csv: String) -> Response {
    let disposition = format!("attachment; filename=\"{}_report.csv\"", cadence.label());
    (
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, "text/csv".to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        csv,
    )
        .into_response()
}

/// Rejects requests without a known signed-in user.
fn signed_in<R, D, N>(
    service: &HelpdeskService<R, D, N>,
    headers: &HeaderMap,
) -> Result<UserId, Response>
where
    R: TicketRepository + 'static,
    D: ProfileDirectory + 'static,
    N: NotificationSink + 'static,
{
    let actor = actor_from(headers)?;
    service
        .authenticate(actor)
        .map(|profile| profile.user)
        .map_err(error_response)
}

fn actor_from(headers: &HeaderMap) -> Result<UserId, Response> {
    headers
        .get(ACTOR_HEADER)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.trim().parse::<u64>().ok())
        .map(UserId)
        .ok_or_else(|| {
            let payload = json!({
                "error": format!("missing or invalid {ACTOR_HEADER} header"),
            });
            (StatusCode::UNAUTHORIZED, Json(payload)).into_response()
        })
}

pub(crate) fn error_status(err: &TicketServiceError) -> StatusCode {
    match err {
        TicketServiceError::Validation(_) | TicketServiceError::Lifecycle(_) => {
            StatusCode::UNPROCESSABLE_ENTITY
        }
        TicketServiceError::Authorization(_) => StatusCode::FORBIDDEN,
        TicketServiceError::TicketNotFound(_) | TicketServiceError::ProfileNotFound(_) => {
            StatusCode::NOT_FOUND
        }
        TicketServiceError::Repository(RepositoryError::Conflict) => StatusCode::CONFLICT,
        TicketServiceError::Repository(_) | TicketServiceError::Report(_) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

fn error_response(err: TicketServiceError) -> Response {
    let status = error_status(&err);
    let payload = json!({
        "error": err.to_string(),
    });
    (status, Json(payload)).into_response()
}
