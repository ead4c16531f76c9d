use std::sync::Arc;

use axum::http::StatusCode;
use serde_json::json;
use tower::ServiceExt;

use super::common::*;
use crate::workflows::dossier::domain::ProductCategory;
use crate::workflows::dossier::router::dossier_router;

fn json_request(uri: &str, body: serde_json::Value) -> axum::http::Request<axum::body::Body> {
    axum::http::Request::post(uri)
        .header(axum::http::header::CONTENT_TYPE, "application/json")
        .body(axum::body::Body::from(
            serde_json::to_vec(&body).expect("body serializes"),
        ))
        .expect("request builds")
}

fn register_body() -> serde_json::Value {
    json!({
        "client_id": "cli-1",
        "product": {
            "id": "prd-ticpe",
            "name": "Fuel tax recovery",
            "category": "fiscal_refund",
        },
        "priority": "high",
        "estimated_amount": 12000.0,
    })
}

#[tokio::test]
async fn register_route_creates_a_dossier() {
    let (orchestrator, _, _) = build_orchestrator(Arc::new(ThreeStepTemplates));
    let router = dossier_router(orchestrator);

    let response = router
        .oneshot(json_request("/api/v1/dossiers", register_body()))
        .await
        .expect("route executes");

    assert_eq!(response.status(), StatusCode::CREATED);
    let payload = read_json_body(response).await;
    assert_eq!(payload["status"], "eligible");
    assert!(payload["id"].as_str().is_some_and(|id| id.starts_with("dos-")));
}

#[tokio::test]
async fn snapshot_route_returns_not_found_for_unknown_ids() {
    let (orchestrator, _, _) = build_orchestrator(Arc::new(ThreeStepTemplates));
    let router = dossier_router(orchestrator);

    let response = router
        .oneshot(
            axum::http::Request::get("/api/v1/dossiers/dos-999999")
                .body(axum::body::Body::empty())
                .expect("request builds"),
        )
        .await
        .expect("route executes");

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let payload = read_json_body(response).await;
    assert!(payload["error"].as_str().is_some());
}

#[tokio::test]
async fn assign_route_rejects_non_admin_actors() {
    let (orchestrator, _, _) = build_orchestrator(Arc::new(ThreeStepTemplates));
    let created = orchestrator
        .register_eligible(new_dossier(ProductCategory::FiscalRefund), at(0))
        .expect("registers");
    let router = dossier_router(orchestrator);

    let response = router
        .oneshot(json_request(
            &format!("/api/v1/dossiers/{}/assign-expert", created.id),
            json!({
                "expert_id": "exp-1",
                "actor": { "id": "cli-1", "kind": "client" },
                "expected_updated_at": created.updated_at,
            }),
        ))
        .await
        .expect("route executes");

    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn step_route_maps_conflicts_to_409() {
    let (orchestrator, _, _) = build_orchestrator(Arc::new(ThreeStepTemplates));
    let created = orchestrator
        .register_eligible(new_dossier(ProductCategory::FiscalRefund), at(0))
        .expect("registers");
    let assigned = orchestrator
        .assign_expert(&created.id, "exp-1", &admin(), created.updated_at, at(1))
        .expect("assigns");
    let router = dossier_router(orchestrator);

    // Second step is not the current one: out-of-order is a conflict.
    let response = router
        .oneshot(json_request(
            &format!(
                "/api/v1/dossiers/{}/steps/{}",
                assigned.id, assigned.steps[1].id
            ),
            json!({
                "status": "in_progress",
                "actor": { "id": "exp-1", "kind": "expert" },
                "expected_updated_at": assigned.updated_at,
            }),
        ))
        .await
        .expect("route executes");

    assert_eq!(response.status(), StatusCode::CONFLICT);
}

#[tokio::test]
async fn overdue_report_route_returns_an_empty_list_when_nothing_is_late() {
    let (orchestrator, _, _) = build_orchestrator(Arc::new(ThreeStepTemplates));
    let router = dossier_router(orchestrator);

    let response = router
        .oneshot(
            axum::http::Request::get("/api/v1/reports/overdue-steps")
                .body(axum::body::Body::empty())
                .expect("request builds"),
        )
        .await
        .expect("route executes");

    assert_eq!(response.status(), StatusCode::OK);
    let payload = read_json_body(response).await;
    assert_eq!(payload.as_array().map(Vec::len), Some(0));
}

#[tokio::test]
async fn full_http_round_trip_through_assignment() {
    let (orchestrator, _, _) = build_orchestrator(Arc::new(ThreeStepTemplates));
    let router = dossier_router(orchestrator);

    let created = router
        .clone()
        .oneshot(json_request("/api/v1/dossiers", register_body()))
        .await
        .expect("register executes");
    let created = read_json_body(created).await;
    let id = created["id"].as_str().expect("id present").to_string();

    let assigned = router
        .clone()
        .oneshot(json_request(
            &format!("/api/v1/dossiers/{id}/assign-expert"),
            json!({
                "expert_id": "exp-1",
                "actor": { "id": "adm-1", "kind": "admin" },
                "expected_updated_at": created["updated_at"],
            }),
        ))
        .await
        .expect("assign executes");
    assert_eq!(assigned.status(), StatusCode::OK);
    let assigned = read_json_body(assigned).await;
    assert_eq!(assigned["status"], "expert_assigned");
    assert_eq!(assigned["steps"].as_array().map(Vec::len), Some(3));

    let snapshot = router
        .oneshot(
            axum::http::Request::get(format!("/api/v1/dossiers/{id}"))
                .body(axum::body::Body::empty())
                .expect("request builds"),
        )
        .await
        .expect("snapshot executes");
    assert_eq!(snapshot.status(), StatusCode::OK);
    let snapshot = read_json_body(snapshot).await;
    assert_eq!(snapshot["expert_id"], "exp-1");
    assert_eq!(snapshot["current_step_index"], 0);
}
