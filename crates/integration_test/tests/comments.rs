//! End-to-end behaviour of the comment service on top of the manager.

use http::StatusCode;
use resq::{Manager, Path, QueryKey, key::Args};
use resq_integration_test::{
    CommentService, args, payloads, recording_client,
};
use serde_json::json;

#[tokio::test]
async fn missing_comment_is_not_cached() {
    let manager = Manager::new();
    let service = CommentService::new();

    let state =
        manager.execute(&service.get_comment(), args(json!({ "id": 1 }))).await;

    assert_eq!(state.status(), StatusCode::NOT_FOUND);
    assert!(!manager.has(&QueryKey::from("/comment/1?")));

    // an uncached error is recomputed on every request
    manager.execute(&service.get_comment(), args(json!({ "id": 1 }))).await;
    assert_eq!(service.calls.get_comment(), 2);
}

#[tokio::test]
async fn post_refreshes_last_comment_subscribers() {
    let manager = Manager::new();
    let service = CommentService::new();

    let last = manager.execute(&service.last_comment(), Args::new()).await;
    let query = last.query().cloned().unwrap();
    assert_eq!(query, QueryKey::from("/comment/last?"));
    assert_eq!(last.payload(), &json!(null));

    let (client, received) = recording_client();
    assert!(manager.subscribe(&client, &query));

    let posted = manager
        .execute(&service.post_comment(), args(json!({ "text": "hi" })))
        .await;

    assert_eq!(posted.status(), StatusCode::CREATED);
    let posted_query = QueryKey::from("/comment?text=%22hi%22");
    assert_eq!(posted.query(), Some(&posted_query));
    assert!(!manager.has(&posted_query));

    assert_eq!(service.calls.last_comment(), 2);
    assert_eq!(
        payloads(&received),
        vec![Some(json!(null)), Some(json!({ "id": 1, "text": "hi" }))]
    );
    assert_eq!(
        manager.read(&query).unwrap().payload(),
        &json!({ "id": 1, "text": "hi" })
    );
}

#[tokio::test]
async fn rejected_post_invalidates_nothing() {
    let manager = Manager::new();
    let service = CommentService::new();

    manager.execute(&service.last_comment(), Args::new()).await;

    let state = manager
        .execute(&service.post_comment(), args(json!({ "text": "" })))
        .await;

    assert_eq!(state.status(), StatusCode::BAD_REQUEST);
    assert_eq!(service.calls.last_comment(), 1);
}

#[tokio::test]
async fn numeric_and_textual_ids_share_a_query() {
    let manager = Manager::new();
    let service = CommentService::new();
    service.insert("hello");

    let by_number =
        manager.execute(&service.get_comment(), args(json!({ "id": 1 }))).await;
    let by_text = manager
        .execute(&service.get_comment(), args(json!({ "id": "1" })))
        .await;

    assert_eq!(by_number, by_text);
    assert_eq!(by_number.payload(), &json!({ "id": 1, "text": "hello" }));
    assert_eq!(service.calls.get_comment(), 1);
}

#[tokio::test]
async fn extra_arguments_make_distinct_queries() {
    let manager = Manager::new();
    let service = CommentService::new();
    service.insert("hello");

    let plain =
        manager.execute(&service.get_comment(), args(json!({ "id": 1 }))).await;
    let verbose = manager
        .execute(
            &service.get_comment(),
            args(json!({ "id": 1, "verbose": true })),
        )
        .await;

    assert_eq!(plain.query(), Some(&QueryKey::from("/comment/1?")));
    assert_eq!(
        verbose.query(),
        Some(&QueryKey::from("/comment/1?verbose=true"))
    );
    assert_eq!(service.calls.get_comment(), 2);

    // both queries live under the same path
    assert_eq!(manager.dependents_of(&Path::from("/comment/1")).len(), 2);
}

#[tokio::test]
async fn delete_retires_the_comment_query() {
    let manager = Manager::new();
    let service = CommentService::new();
    service.insert("doomed");

    let state =
        manager.execute(&service.get_comment(), args(json!({ "id": 1 }))).await;
    let query = state.query().cloned().unwrap();

    let (client, received) = recording_client();
    manager.subscribe(&client, &query);

    let deleted = manager
        .execute(&service.delete_comment(), args(json!({ "id": 1 })))
        .await;

    assert_eq!(deleted.status(), StatusCode::OK);
    assert_eq!(
        payloads(&received),
        vec![Some(json!({ "id": 1, "text": "doomed" })), None]
    );
    assert!(!manager.has(&query));
    assert!(manager.subscriptions_of(&client).is_empty());
    assert!(!manager.subscribe(&client, &query));
}

#[tokio::test]
async fn list_follows_posts_and_deletes() {
    let manager = Manager::new();
    let service = CommentService::new();

    let list = manager.execute(&service.list_comments(), Args::new()).await;
    let query = list.query().cloned().unwrap();
    assert_eq!(list.payload(), &json!([]));

    manager
        .execute(&service.post_comment(), args(json!({ "text": "a" })))
        .await;
    manager
        .execute(&service.post_comment(), args(json!({ "text": "b" })))
        .await;
    manager
        .execute(&service.delete_comment(), args(json!({ "id": 1 })))
        .await;

    assert_eq!(manager.read(&query).unwrap().payload(), &json!(["b"]));
    assert_eq!(service.calls.list_comments(), 4);
}

#[tokio::test]
async fn failed_delete_leaves_cache_alone() {
    let manager = Manager::new();
    let service = CommentService::new();

    manager.execute(&service.last_comment(), Args::new()).await;

    let state = manager
        .execute(&service.delete_comment(), args(json!({ "id": 9 })))
        .await;

    assert_eq!(state.status(), StatusCode::NOT_FOUND);
    assert_eq!(service.calls.delete_comment(), 1);
    assert_eq!(service.calls.last_comment(), 1);
}
