//! Black-box tests over the full HTTP surface: real router, real middleware,
//! in-memory storage.

use std::sync::Arc;

use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode, header};
use chrono::Utc;
use http_body_util::BodyExt;
use serde_json::{Value, json};
use tower::ServiceExt;

use brokerdesk_api::app::services::{AppServices, build_with_store};
use brokerdesk_api::app::build_app;
use brokerdesk_auth::{Permission, TokenConfig, TokenIssuer};
use brokerdesk_core::{Clock, FixedClock, UserId};
use brokerdesk_infra::{InMemoryStore, NewUser, RoleStore, UserStore};

struct Harness {
    app: Router,
    store: Arc<InMemoryStore>,
    services: Arc<AppServices>,
}

fn harness() -> Harness {
    let config = TokenConfig::new(
        "black-box-api-test-secret-0123456789ab",
        "brokerdesk",
        "brokerdesk-clients",
        chrono::Duration::minutes(30),
        chrono::Duration::days(7),
    )
    .unwrap();
    let issuer = Arc::new(TokenIssuer::new(config));
    let clock: Arc<dyn Clock> = Arc::new(FixedClock::new(Utc::now()));
    let store = Arc::new(InMemoryStore::new());
    let services = Arc::new(build_with_store(store.clone(), issuer, clock));
    let app = build_app(services.clone());
    Harness {
        app,
        store,
        services,
    }
}

async fn seed_user(h: &Harness, username: &str, password: &str, codes: &[&str]) -> UserId {
    let hash = h.services.verifier.hash(password).unwrap();
    let user = h
        .store
        .insert_user(
            NewUser {
                username: username.to_string(),
                email: format!("{username}@example.com"),
                full_name: username.to_string(),
                password_hash: hash,
            },
            Utc::now(),
        )
        .await
        .unwrap();
    if !codes.is_empty() {
        let role = h
            .store
            .create_role(
                &format!("{username}-role"),
                codes.iter().map(|c| Permission::new(c.to_string())).collect(),
            )
            .await
            .unwrap();
        h.store.assign_role(user.id, role.id, Utc::now()).await.unwrap();
    }
    user.id
}

async fn send(app: &Router, req: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(req).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, body)
}

fn post_json(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn authed(mut req: Request<Body>, token: &str) -> Request<Body> {
    req.headers_mut().insert(
        header::AUTHORIZATION,
        format!("Bearer {token}").parse().unwrap(),
    );
    req
}

async fn login(h: &Harness, username: &str, password: &str) -> Value {
    let (status, body) = send(
        &h.app,
        post_json("/auth/login", json!({ "username": username, "password": password })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    body
}

#[tokio::test]
async fn health_is_public() {
    let h = harness();
    let req = Request::builder().uri("/health").body(Body::empty()).unwrap();
    let (status, _) = send(&h.app, req).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn login_then_me_returns_the_profile_shape() {
    let h = harness();
    seed_user(&h, "alice", "alices-long-password", &["clients.read"]).await;

    let tokens = login(&h, "alice", "alices-long-password").await;
    assert!(tokens["access_token"].is_string());
    assert!(tokens["refresh_token"].is_string());
    assert!(tokens["expires_at"].is_string());

    let req = authed(
        Request::builder().uri("/auth/me").body(Body::empty()).unwrap(),
        tokens["access_token"].as_str().unwrap(),
    );
    let (status, body) = send(&h.app, req).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["username"], "alice");
    assert_eq!(body["email"], "alice@example.com");
    assert_eq!(body["roles"], json!(["alice-role"]));
    assert_eq!(body["permissions"], json!(["clients.read"]));
    assert_eq!(body["scopes"], json!([]));
}

#[tokio::test]
async fn bad_credentials_share_one_observable_response() {
    let h = harness();
    seed_user(&h, "carol", "carols-long-password", &[]).await;

    let (s1, b1) = send(
        &h.app,
        post_json("/auth/login", json!({ "username": "carol", "password": "wrong" })),
    )
    .await;
    let (s2, b2) = send(
        &h.app,
        post_json("/auth/login", json!({ "username": "nobody", "password": "wrong" })),
    )
    .await;

    assert_eq!(s1, StatusCode::UNAUTHORIZED);
    assert_eq!(s2, StatusCode::UNAUTHORIZED);
    assert_eq!(b1, b2);
}

#[tokio::test]
async fn refresh_rotates_and_replay_is_rejected() {
    let h = harness();
    seed_user(&h, "alice", "alices-long-password", &["clients.read"]).await;
    let first = login(&h, "alice", "alices-long-password").await;
    let r1 = first["refresh_token"].as_str().unwrap();

    let (status, second) = send(
        &h.app,
        post_json("/auth/refresh", json!({ "refresh_token": r1 })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_ne!(second["refresh_token"], first["refresh_token"]);

    // Replaying the first refresh token trips reuse detection.
    let (status, body) = send(
        &h.app,
        post_json("/auth/refresh", json!({ "refresh_token": r1 })),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "unauthorized");

    // The family is gone: the second pair's refresh token is dead too.
    let (status, _) = send(
        &h.app,
        post_json(
            "/auth/refresh",
            json!({ "refresh_token": second["refresh_token"].as_str().unwrap() }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn protected_routes_require_a_valid_bearer_token() {
    let h = harness();

    let req = Request::builder().uri("/auth/me").body(Body::empty()).unwrap();
    let (status, _) = send(&h.app, req).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let req = authed(
        Request::builder().uri("/auth/me").body(Body::empty()).unwrap(),
        "not-a-jwt",
    );
    let (status, _) = send(&h.app, req).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn admin_routes_enforce_permission_codes() {
    let h = harness();
    seed_user(&h, "admin", "admins-long-password", &["users.read", "users.write"]).await;
    seed_user(&h, "pleb", "plebs-long-password", &[]).await;

    let admin_tokens = login(&h, "admin", "admins-long-password").await;
    let pleb_tokens = login(&h, "pleb", "plebs-long-password").await;

    // Without users.read, listing is forbidden.
    let req = authed(
        Request::builder().uri("/admin/users").body(Body::empty()).unwrap(),
        pleb_tokens["access_token"].as_str().unwrap(),
    );
    let (status, body) = send(&h.app, req).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"], "forbidden");

    // With it, the listing includes both seeded users.
    let req = authed(
        Request::builder().uri("/admin/users").body(Body::empty()).unwrap(),
        admin_tokens["access_token"].as_str().unwrap(),
    );
    let (status, body) = send(&h.app, req).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn role_creation_rejects_strings_that_are_not_permission_codes() {
    let h = harness();
    seed_user(&h, "admin", "admins-long-password", &["roles.write"]).await;
    let tokens = login(&h, "admin", "admins-long-password").await;

    let req = authed(
        post_json(
            "/admin/roles",
            json!({ "name": "broken", "permissions": ["NotACode"] }),
        ),
        tokens["access_token"].as_str().unwrap(),
    );
    let (status, body) = send(&h.app, req).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "validation_error");
}

#[tokio::test]
async fn user_update_is_compare_and_swapped_on_version() {
    let h = harness();
    seed_user(&h, "admin", "admins-long-password", &["users.write"]).await;
    let target = seed_user(&h, "target", "targets-long-password", &[]).await;
    let tokens = login(&h, "admin", "admins-long-password").await;
    let access = tokens["access_token"].as_str().unwrap();

    // Fresh version: accepted.
    let req = authed(
        Request::builder()
            .method("PUT")
            .uri(format!("/admin/users/{target}"))
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(
                json!({ "email": "new@example.com", "expected_version": 1 }).to_string(),
            ))
            .unwrap(),
        access,
    );
    let (status, body) = send(&h.app, req).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["email"], "new@example.com");
    assert_eq!(body["version"], 2);

    // Stale version: 409.
    let req = authed(
        Request::builder()
            .method("PUT")
            .uri(format!("/admin/users/{target}"))
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(
                json!({ "email": "stale@example.com", "expected_version": 1 }).to_string(),
            ))
            .unwrap(),
        access,
    );
    let (status, body) = send(&h.app, req).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], "conflict");
}

#[tokio::test]
async fn deactivated_user_gets_an_explicit_disabled_response() {
    let h = harness();
    seed_user(&h, "admin", "admins-long-password", &["users.write"]).await;
    let target = seed_user(&h, "mallory", "mallorys-long-password", &[]).await;
    let tokens = login(&h, "admin", "admins-long-password").await;

    let req = authed(
        Request::builder()
            .method("POST")
            .uri(format!("/admin/users/{target}/deactivate"))
            .body(Body::empty())
            .unwrap(),
        tokens["access_token"].as_str().unwrap(),
    );
    let (status, _) = send(&h.app, req).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    // Valid credentials now disclose the disabled state.
    let (status, body) = send(
        &h.app,
        post_json(
            "/auth/login",
            json!({ "username": "mallory", "password": "mallorys-long-password" }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "account_disabled");
}

#[tokio::test]
async fn role_and_override_administration_shapes_the_next_login() {
    let h = harness();
    seed_user(
        &h,
        "admin",
        "admins-long-password",
        &["users.read", "users.write", "roles.read", "roles.write"],
    )
    .await;
    let bob = seed_user(&h, "bob", "bobs-long-password", &[]).await;
    let tokens = login(&h, "admin", "admins-long-password").await;
    let access = tokens["access_token"].as_str().unwrap();

    // Create a role, assign it to bob, then deny one of its grants.
    let req = authed(
        post_json(
            "/admin/roles",
            json!({ "name": "viewer", "permissions": ["clients.read", "accounts.read"] }),
        ),
        access,
    );
    let (status, _) = send(&h.app, req).await;
    assert_eq!(status, StatusCode::CREATED);

    // Duplicate role names conflict.
    let req = authed(
        post_json("/admin/roles", json!({ "name": "viewer", "permissions": [] })),
        access,
    );
    let (status, _) = send(&h.app, req).await;
    assert_eq!(status, StatusCode::CONFLICT);

    let req = authed(
        post_json(&format!("/admin/users/{bob}/roles"), json!({ "role": "viewer" })),
        access,
    );
    let (status, _) = send(&h.app, req).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    // Assigning a role that does not exist is a 404.
    let req = authed(
        post_json(&format!("/admin/users/{bob}/roles"), json!({ "role": "ghost" })),
        access,
    );
    let (status, _) = send(&h.app, req).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let req = authed(
        Request::builder()
            .method("PUT")
            .uri(format!("/admin/users/{bob}/overrides"))
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(
                json!({ "permission": "accounts.read", "allow": false }).to_string(),
            ))
            .unwrap(),
        access,
    );
    let (status, _) = send(&h.app, req).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    // Bob's next login carries the merged set: role grants minus the deny.
    let bob_tokens = login(&h, "bob", "bobs-long-password").await;
    let req = authed(
        Request::builder().uri("/auth/me").body(Body::empty()).unwrap(),
        bob_tokens["access_token"].as_str().unwrap(),
    );
    let (status, body) = send(&h.app, req).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["permissions"], json!(["clients.read"]));
}
