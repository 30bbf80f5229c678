mod common;

use axum::http::{Method, StatusCode};
use common::{id_of, names, TestApp};
use serde_json::json;
use uuid::Uuid;

#[tokio::test]
async fn role_crud_round() {
    let app = TestApp::spawn().await;
    let admin = app.admin_token().await;
    let read = app.permission_id("users:read").await;

    let reply = app
        .send(
            Method::POST,
            "/api/roles",
            Some(&admin),
            Some(json!({
                "role_name": "auditor",
                "role_desc": "Reads accounts",
                "permissionIds": [read, read],
            })),
        )
        .await;
    assert_eq!(reply.status, StatusCode::CREATED, "{}", reply.body);
    assert_eq!(reply.body["message"], "Role created successfully");
    assert_eq!(names(&reply.body["data"]["permissions"]), vec!["users:read"]);
    let auditor = id_of(&reply.body["data"]);

    let reply = app.get(&format!("/api/roles/{}", auditor), &admin).await;
    assert_eq!(reply.status, StatusCode::OK);
    assert_eq!(reply.body["message"], "Role retrieved successfully");
    assert_eq!(reply.body["data"]["description"], "Reads accounts");

    // Renaming alone keeps the grants
    let reply = app
        .send(
            Method::PUT,
            &format!("/api/roles/{}", auditor),
            Some(&admin),
            Some(json!({ "name": "reviewer" })),
        )
        .await;
    assert_eq!(reply.status, StatusCode::OK);
    assert_eq!(reply.body["data"]["name"], "reviewer");
    assert_eq!(names(&reply.body["data"]["permissions"]), vec!["users:read"]);

    // An empty list clears them
    let reply = app
        .send(
            Method::PUT,
            &format!("/api/roles/{}", auditor),
            Some(&admin),
            Some(json!({ "permissionIds": [] })),
        )
        .await;
    assert_eq!(reply.status, StatusCode::OK);
    assert!(names(&reply.body["data"]["permissions"]).is_empty());

    let reply = app
        .send(Method::DELETE, &format!("/api/roles/{}", auditor), Some(&admin), None)
        .await;
    assert_eq!(reply.status, StatusCode::OK);
    assert_eq!(reply.body["message"], "Role deleted successfully");

    let reply = app.get(&format!("/api/roles/{}", auditor), &admin).await;
    assert_eq!(reply.status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn deleting_a_role_only_removes_assignments() {
    let app = TestApp::spawn().await;
    let admin = app.admin_token().await;
    let temp = app.role_with(&admin, "temp", &["users:read"]).await;
    let user_role = app.role_id("user").await;
    let alice = app.register("alice", "secret123", &[temp, user_role]).await;

    let reply = app
        .send(Method::DELETE, &format!("/api/roles/{}", temp), Some(&admin), None)
        .await;
    assert_eq!(reply.status, StatusCode::OK);

    let reply = app.get(&format!("/api/users/{}", alice), &admin).await;
    assert_eq!(reply.status, StatusCode::OK);
    assert_eq!(names(&reply.body["data"]["roles"]), vec!["user"]);

    // The permission itself survives
    app.permission_id("users:read").await;
}

#[tokio::test]
async fn unknown_permission_ids_reject_the_whole_request() {
    let app = TestApp::spawn().await;
    let admin = app.admin_token().await;
    let read = app.permission_id("users:read").await;

    let reply = app
        .send(
            Method::POST,
            "/api/roles",
            Some(&admin),
            Some(json!({ "role_name": "broken", "permissionIds": [read, Uuid::new_v4()] })),
        )
        .await;
    assert_eq!(reply.status, StatusCode::BAD_REQUEST);

    // Nothing was written
    let reply = app.get("/api/roles", &admin).await;
    assert!(!names(&reply.body["data"]).contains(&"broken".to_string()));
}

#[tokio::test]
async fn duplicate_role_name_is_rejected() {
    let app = TestApp::spawn().await;
    let admin = app.admin_token().await;

    let reply = app
        .send(
            Method::POST,
            "/api/roles",
            Some(&admin),
            Some(json!({ "role_name": "user" })),
        )
        .await;

    assert_eq!(reply.status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn replacing_user_roles() {
    let app = TestApp::spawn().await;
    let admin = app.admin_token().await;
    let editor = app.role_with(&admin, "editor", &["roles:update"]).await;
    let alice = app.register("alice", "secret123", &[]).await;

    let reply = app
        .send(
            Method::PUT,
            &format!("/api/users/{}", alice),
            Some(&admin),
            Some(json!({ "roleIds": [editor] })),
        )
        .await;
    assert_eq!(reply.status, StatusCode::OK, "{}", reply.body);
    assert_eq!(names(&reply.body["data"]["roles"]), vec!["editor"]);

    // Omitting role ids leaves the set alone
    let reply = app
        .send(
            Method::PUT,
            &format!("/api/users/{}", alice),
            Some(&admin),
            Some(json!({ "mobile": "555-0100" })),
        )
        .await;
    assert_eq!(names(&reply.body["data"]["roles"]), vec!["editor"]);
}
