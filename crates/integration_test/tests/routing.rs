//! Requests dispatched through the router.

use http::{Method, StatusCode};
use resq::{Manager, QueryKey, key::Args};
use resq_integration_test::{CommentService, args, payloads, recording_client};
use serde_json::json;
use tracing_test::traced_test;

#[tokio::test]
async fn literal_route_beats_parameter() {
    let manager = Manager::new();
    let service = CommentService::new();
    let router = service.router();

    let state = router
        .dispatch(&manager, &Method::GET, "/comment/last", Args::new())
        .await;

    assert_eq!(state.query(), Some(&QueryKey::from("/comment/last?")));
    assert_eq!(service.calls.last_comment(), 1);
    assert_eq!(service.calls.get_comment(), 0);
}

#[tokio::test]
async fn captured_parameters_reach_the_handler() {
    let manager = Manager::new();
    let service = CommentService::new();
    service.insert("routed");

    let state = service
        .router()
        .dispatch(&manager, &Method::GET, "/comment/1", Args::new())
        .await;

    assert_eq!(state.payload(), &json!({ "id": 1, "text": "routed" }));
    assert!(manager.has(&QueryKey::from("/comment/1?")));
}

#[tokio::test]
async fn routing_failures_are_error_states() {
    let manager = Manager::new();
    let router = CommentService::new().router();

    let missing = router
        .dispatch(&manager, &Method::GET, "/user/1", Args::new())
        .await;
    let wrong_method = router
        .dispatch(&manager, &Method::PUT, "/comment/1", Args::new())
        .await;

    assert_eq!(missing.status(), StatusCode::NOT_FOUND);
    assert_eq!(wrong_method.status(), StatusCode::METHOD_NOT_ALLOWED);
}

#[tokio::test]
#[traced_test]
async fn full_request_cycle() {
    let manager = Manager::new();
    let service = CommentService::new();
    let router = service.router();

    let last = router
        .dispatch(&manager, &Method::GET, "/comment/last", Args::new())
        .await;

    let (client, received) = recording_client();
    manager.subscribe(&client, last.query().unwrap());

    let posted = router
        .dispatch(
            &manager,
            &Method::POST,
            "/comment",
            args(json!({ "text": "over the wire" })),
        )
        .await;
    tracing::info!(status = %posted.status(), "posted comment");

    let deleted = router
        .dispatch(&manager, &Method::DELETE, "/comment/1", Args::new())
        .await;

    assert_eq!(posted.status(), StatusCode::CREATED);
    assert_eq!(deleted.status(), StatusCode::OK);
    assert_eq!(
        payloads(&received),
        vec![
            Some(json!(null)),
            Some(json!({ "id": 1, "text": "over the wire" })),
            Some(json!(null)),
        ]
    );
    assert!(logs_contain("posted comment"));
}
