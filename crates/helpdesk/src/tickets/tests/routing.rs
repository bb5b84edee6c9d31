use std::sync::Arc;

use axum::{
    body::Body,
    http::{header, Method, Request, StatusCode},
    Router,
};
use chrono::Duration;
use serde_json::json;
use tower::ServiceExt;

use super::common::*;
use crate::tickets::domain::{Status, TicketId, UserId};
use crate::tickets::router::{ticket_router, ACTOR_HEADER};
use crate::tickets::report::REPORT_HEADERS;

fn router() -> (Router, Arc<MemoryStore>, Arc<FixedClock>) {
    let (service, store, _, clock) = build_service();
    (ticket_router(Arc::new(service)), store, clock)
}

fn json_request(
    method: Method,
    uri: &str,
    actor: Option<UserId>,
    body: serde_json::Value,
) -> Request<Body> {
    let mut builder = Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json");
    if let Some(actor) = actor {
        builder = builder.header(ACTOR_HEADER, actor.0.to_string());
    }
    builder.body(Body::from(body.to_string())).expect("request")
}

fn empty_request(method: Method, uri: &str, actor: Option<UserId>) -> Request<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(actor) = actor {
        builder = builder.header(ACTOR_HEADER, actor.0.to_string());
    }
    builder.body(Body::empty()).expect("request")
}

fn new_ticket_body() -> serde_json::Value {
    json!({
        "title": "VPN drops every hour",
        "description": "Connection resets on the office network",
        "category": "technical"
    })
}

#[tokio::test]
async fn create_returns_created_ticket_with_assignee() {
    let (app, store, _) = router();

    let response = app
        .oneshot(json_request(
            Method::POST,
            "/api/v1/tickets",
            Some(REPORTER),
            new_ticket_body(),
        ))
        .await
        .expect("router call");

    assert_eq!(response.status(), StatusCode::CREATED);
    let payload = read_json_body(response).await;
    assert_eq!(payload["status"], "open");
    assert_eq!(payload["category"], "technical");
    assert_eq!(payload["assignee"], TECH_AGENT_A.0);
    assert_eq!(payload["reporter"], REPORTER.0);

    let id = payload["id"].as_u64().expect("numeric id");
    assert!(store.stored(TicketId(id)).is_some());
}

#[tokio::test]
async fn missing_actor_header_is_unauthorized() {
    let (app, _, _) = router();

    let response = app
        .oneshot(json_request(
            Method::POST,
            "/api/v1/tickets",
            None,
            new_ticket_body(),
        ))
        .await
        .expect("router call");

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let payload = read_json_body(response).await;
    assert!(payload["error"]
        .as_str()
        .expect("error message")
        .contains(ACTOR_HEADER));
}

#[tokio::test]
async fn lifecycle_over_http_maps_errors_to_statuses() {
    let (app, _, clock) = router();

    let created = app
        .clone()
        .oneshot(json_request(
            Method::POST,
            "/api/v1/tickets",
            Some(REPORTER),
            new_ticket_body(),
        ))
        .await
        .expect("router call");
    let created = read_json_body(created).await;
    let id = created["id"].as_u64().expect("numeric id");
    let uri = format!("/api/v1/tickets/{id}");

    let forbidden = app
        .clone()
        .oneshot(json_request(
            Method::PATCH,
            &uri,
            Some(REPORTER),
            json!({ "status": "closed" }),
        ))
        .await
        .expect("router call");
    assert_eq!(forbidden.status(), StatusCode::FORBIDDEN);

    let early_rating = app
        .clone()
        .oneshot(json_request(
            Method::POST,
            &format!("{uri}/rating"),
            Some(REPORTER),
            json!({ "rating": 4 }),
        ))
        .await
        .expect("router call");
    assert_eq!(early_rating.status(), StatusCode::UNPROCESSABLE_ENTITY);

    clock.advance(Duration::hours(3));
    let closed = app
        .clone()
        .oneshot(json_request(
            Method::PATCH,
            &uri,
            Some(TECH_AGENT_A),
            json!({ "status": "closed" }),
        ))
        .await
        .expect("router call");
    assert_eq!(closed.status(), StatusCode::OK);
    let closed = read_json_body(closed).await;
    assert_eq!(closed["status"], Status::Closed.label());
    assert!(closed["time_closed"].is_string());
    assert!(closed["time_in_development"].is_null());

    let reopen = app
        .clone()
        .oneshot(json_request(
            Method::PATCH,
            &uri,
            Some(TECH_AGENT_A),
            json!({ "status": "in development" }),
        ))
        .await
        .expect("router call");
    assert_eq!(reopen.status(), StatusCode::UNPROCESSABLE_ENTITY);

    let bad_rating = app
        .clone()
        .oneshot(json_request(
            Method::POST,
            &format!("{uri}/rating"),
            Some(REPORTER),
            json!({ "rating": 7 }),
        ))
        .await
        .expect("router call");
    assert_eq!(bad_rating.status(), StatusCode::UNPROCESSABLE_ENTITY);

    let rated = app
        .oneshot(json_request(
            Method::POST,
            &format!("{uri}/rating"),
            Some(REPORTER),
            json!({ "rating": 5 }),
        ))
        .await
        .expect("router call");
    assert_eq!(rated.status(), StatusCode::OK);
    assert_eq!(read_json_body(rated).await["rating"], 5);
}

#[tokio::test]
async fn unknown_ticket_is_not_found() {
    let (app, _, _) = router();

    let response = app
        .oneshot(empty_request(
            Method::GET,
            "/api/v1/tickets/4242",
            Some(REPORTER),
        ))
        .await
        .expect("router call");

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn list_returns_reporter_tickets() {
    let (app, store, _) = router();
    store.seed(seeded_ticket(500, Some(TECH_AGENT_B), Status::Closed));

    for _ in 0..2 {
        app.clone()
            .oneshot(json_request(
                Method::POST,
                "/api/v1/tickets",
                Some(REPORTER),
                new_ticket_body(),
            ))
            .await
            .expect("router call");
    }

    let response = app
        .clone()
        .oneshot(empty_request(
            Method::GET,
            "/api/v1/tickets",
            Some(REPORTER),
        ))
        .await
        .expect("router call");
    assert_eq!(response.status(), StatusCode::OK);
    let payload = read_json_body(response).await;
    assert_eq!(payload["total"], 2);

    let response = app
        .oneshot(empty_request(
            Method::GET,
            "/api/v1/tickets?include_closed=true",
            Some(OTHER_REPORTER),
        ))
        .await
        .expect("router call");
    let payload = read_json_body(response).await;
    assert_eq!(payload["total"], 1);
    assert_eq!(payload["tickets"][0]["id"], 500);
}

#[tokio::test]
async fn list_narrows_to_requested_category() {
    let (app, _, _) = router();

    for category in ["technical", "business"] {
        let mut body = new_ticket_body();
        body["category"] = json!(category);
        app.clone()
            .oneshot(json_request(
                Method::POST,
                "/api/v1/tickets",
                Some(REPORTER),
                body,
            ))
            .await
            .expect("router call");
    }

    let response = app
        .clone()
        .oneshot(empty_request(
            Method::GET,
            "/api/v1/tickets?category=business",
            Some(REPORTER),
        ))
        .await
        .expect("router call");
    assert_eq!(response.status(), StatusCode::OK);
    let payload = read_json_body(response).await;
    assert_eq!(payload["total"], 1);
    assert_eq!(payload["tickets"][0]["category"], "business");

    let rejected = app
        .oneshot(empty_request(
            Method::GET,
            "/api/v1/tickets?category=legal",
            Some(REPORTER),
        ))
        .await
        .expect("router call");
    assert_eq!(rejected.status(), StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn delete_requires_reporter() {
    let (app, _, _) = router();
    let created = app
        .clone()
        .oneshot(json_request(
            Method::POST,
            "/api/v1/tickets",
            Some(REPORTER),
            new_ticket_body(),
        ))
        .await
        .expect("router call");
    let id = read_json_body(created).await["id"]
        .as_u64()
        .expect("numeric id");
    let uri = format!("/api/v1/tickets/{id}");

    let denied = app
        .clone()
        .oneshot(empty_request(Method::DELETE, &uri, Some(OTHER_REPORTER)))
        .await
        .expect("router call");
    assert_eq!(denied.status(), StatusCode::FORBIDDEN);

    let deleted = app
        .oneshot(empty_request(Method::DELETE, &uri, Some(REPORTER)))
        .await
        .expect("router call");
    assert_eq!(deleted.status(), StatusCode::OK);
    assert_eq!(read_json_body(deleted).await["status"], "deleted");
}

#[tokio::test]
async fn statistics_expose_aggregations() {
    let (app, store, _) = router();
    store.seed(seeded_ticket(600, Some(TECH_AGENT_A), Status::Closed));
    store.seed(seeded_ticket(601, Some(TECH_AGENT_B), Status::Open));

    let response = app
        .oneshot(empty_request(
            Method::GET,
            "/api/v1/statistics",
            Some(TECH_AGENT_A),
        ))
        .await
        .expect("router call");

    assert_eq!(response.status(), StatusCode::OK);
    let payload = read_json_body(response).await;
    assert_eq!(payload["total_tickets"], 2);
    assert_eq!(payload["resolution_time"]["count"], 1);
    assert_eq!(payload["aggregations"][0]["kind"], "status_breakdown");
    assert!(payload["aggregations"]
        .as_array()
        .expect("aggregation list")
        .iter()
        .any(|entry| entry["kind"] == "per_ticket_series"));
}

#[tokio::test]
async fn report_downloads_as_csv_attachment() {
    let (app, _, _) = router();

    let response = app
        .oneshot(json_request(
            Method::POST,
            "/api/v1/reports",
            Some(REPORTER),
            json!({ "timespan": "weekly", "periods": 4 }),
        ))
        .await
        .expect("router call");

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response
            .headers()
            .get(header::CONTENT_TYPE)
            .expect("content type"),
        "text/csv"
    );
    assert_eq!(
        response
            .headers()
            .get(header::CONTENT_DISPOSITION)
            .expect("disposition"),
        "attachment; filename=\"weekly_report.csv\""
    );

    let body = read_text_body(response).await;
    let mut lines = body.lines();
    assert_eq!(lines.next(), Some(REPORT_HEADERS.join(",").as_str()));
    assert_eq!(lines.count(), 4);
}

#[tokio::test]
async fn unknown_timespan_is_rejected() {
    let (app, _, _) = router();

    let response = app
        .oneshot(json_request(
            Method::POST,
            "/api/v1/reports",
            Some(REPORTER),
            json!({ "timespan": "hourly" }),
        ))
        .await
        .expect("router call");

    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    let payload = read_json_body(response).await;
    assert!(payload["error"]
        .as_str()
        .expect("error message")
        .contains("hourly"));
}

#[tokio::test]
async fn statistics_and_reports_require_a_signed_in_user() {
    let (app, _, _) = router();

    let anonymous = app
        .clone()
        .oneshot(empty_request(Method::GET, "/api/v1/statistics", None))
        .await
        .expect("router call");
    assert_eq!(anonymous.status(), StatusCode::UNAUTHORIZED);

    let stranger = app
        .clone()
        .oneshot(empty_request(
            Method::GET,
            "/api/v1/statistics",
            Some(UserId(404)),
        ))
        .await
        .expect("router call");
    assert_eq!(stranger.status(), StatusCode::NOT_FOUND);

    let report = app
        .oneshot(json_request(
            Method::POST,
            "/api/v1/reports",
            None,
            json!({ "timespan": "daily" }),
        ))
        .await
        .expect("router call");
    assert_eq!(report.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn json_report_carries_every_period_column() {
    let (app, store, _) = router();
    let mut resolved = seeded_ticket(700, Some(TECH_AGENT_B), Status::Closed);
    resolved.time_created = start() - Duration::hours(6);
    resolved.time_closed = Some(start() - Duration::hours(2));
    store.seed(resolved);

    let response = app
        .oneshot(json_request(
            Method::POST,
            "/api/v1/reports",
            Some(REPORTER),
            json!({ "timespan": "daily", "periods": 2, "format": "json" }),
        ))
        .await
        .expect("router call");

    assert_eq!(response.status(), StatusCode::OK);
    let payload = read_json_body(response).await;
    assert_eq!(payload["timespan"], "daily");
    let rows = payload["rows"].as_array().expect("row list");
    assert_eq!(rows.len(), 2);

    let latest = &rows[0];
    assert_eq!(latest["period"], 1);
    assert_eq!(latest["total_tickets"], 1);
    assert_eq!(latest["closed"], 1);
    assert_eq!(latest["open"], 0);
    assert_eq!(latest["most_common_category"], "technical");
    assert_eq!(latest["most_resolved_agent"], "agent_bo");
    assert_eq!(latest["fastest_resolving_agent"], "agent_bo");
    assert_eq!(latest["avg_resolution"], "0d:4h:0m:0s");

    let earlier = &rows[1];
    assert_eq!(earlier["total_tickets"], 0);
    assert!(earlier["most_common_category"].is_null());
    assert!(earlier["fastest_resolving_agent"].is_null());
}
