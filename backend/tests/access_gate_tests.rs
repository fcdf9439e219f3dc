mod common;

use axum::{
    Router,
    body::Body,
    extract::Request,
    http::StatusCode,
    middleware,
    routing::get,
};
use case_portal::{
    access::{self, CallerIdentity, Role, RoutePolicy},
    routes::{CASE_EDITORS, CASE_SUPERVISORS, USER_ADMINS},
};
use common::{MemoryRepo, app, error_code, request, send};
use serde_json::json;
use tower::util::ServiceExt;
use uuid::Uuid;

// --- Route table scenarios ---

#[tokio::test]
async fn writer_may_file_a_case() {
    let repo = MemoryRepo::default();
    let writer = repo.seed_user("writer@station.test", Role::Writer);
    let app = app(repo.clone());

    let response = send(
        &app,
        request(
            "POST",
            "/cases",
            Some(writer.id),
            Some(json!({ "case_number": "FIR-1", "title": "Theft" })),
        ),
    )
    .await;

    assert_eq!(response.status(), StatusCode::CREATED);
    assert_eq!(repo.case_count(), 1);
}

#[tokio::test]
async fn writer_may_not_delete_a_case() {
    let repo = MemoryRepo::default();
    let writer = repo.seed_user("writer@station.test", Role::Writer);
    let case = repo.seed_case("FIR-2", writer.id);
    let app = app(repo.clone());

    let response = send(
        &app,
        request("DELETE", &format!("/cases/{}", case.id), Some(writer.id), None),
    )
    .await;

    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    assert_eq!(error_code(response).await, "forbidden");
    // The handler never ran.
    assert_eq!(repo.case_count(), 1);
}

#[tokio::test]
async fn sp_may_delete_a_case() {
    let repo = MemoryRepo::default();
    let sp = repo.seed_user("sp@district.test", Role::Sp);
    let case = repo.seed_case("FIR-3", sp.id);
    let app = app(repo.clone());

    let response = send(
        &app,
        request("DELETE", &format!("/cases/{}", case.id), Some(sp.id), None),
    )
    .await;

    assert_eq!(response.status(), StatusCode::NO_CONTENT);
    assert_eq!(repo.case_count(), 0);
}

#[tokio::test]
async fn anonymous_request_is_unauthenticated_on_every_protected_table() {
    let repo = MemoryRepo::default();
    let app = app(repo);
    let some_id = Uuid::new_v4();

    for (method, uri) in [
        ("GET", "/auth/me".to_string()),
        ("GET", "/cases".to_string()),
        ("POST", "/cases".to_string()),
        ("DELETE", format!("/cases/{some_id}")),
        ("GET", "/users".to_string()),
        ("PUT", format!("/users/{some_id}/role")),
    ] {
        let response = send(&app, request(method, &uri, None, None)).await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED, "{method} {uri}");
        assert_eq!(error_code(response).await, "unauthenticated");
    }
}

#[tokio::test]
async fn user_administration_is_sp_only() {
    let repo = MemoryRepo::default();
    let sp = repo.seed_user("sp@district.test", Role::Sp);
    let sho = repo.seed_user("sho@station.test", Role::Sho);
    let app = app(repo);

    let response = send(&app, request("GET", "/users", Some(sp.id), None)).await;
    assert_eq!(response.status(), StatusCode::OK);

    let response = send(&app, request("GET", "/users", Some(sho.id), None)).await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn every_role_may_read_cases() {
    let repo = MemoryRepo::default();
    let users: Vec<_> = Role::ALL
        .iter()
        .map(|role| repo.seed_user(&format!("{role}@test"), *role))
        .collect();
    let app = app(repo);

    for user in users {
        let response = send(&app, request("GET", "/cases", Some(user.id), None)).await;
        assert_eq!(response.status(), StatusCode::OK, "{}", user.role);
    }
}

#[tokio::test]
async fn route_policies_match_the_tables() {
    let repo = MemoryRepo::default();
    let users: Vec<_> = Role::ALL
        .iter()
        .map(|role| repo.seed_user(&format!("{role}@test"), *role))
        .collect();
    let app = app(repo);
    let missing = Uuid::new_v4();

    // Past the gate these all hit a missing record, so admission shows up as 404.
    let cases = [
        ("DELETE", format!("/cases/{missing}"), CASE_SUPERVISORS),
        ("PATCH", format!("/cases/{missing}/status"), CASE_SUPERVISORS),
        ("PUT", format!("/cases/{missing}"), CASE_EDITORS),
        ("GET", format!("/users/{missing}"), USER_ADMINS),
    ];

    for (method, uri, allowed) in cases {
        for user in &users {
            let body = match method {
                "PATCH" => Some(json!({ "status": "Closed" })),
                "PUT" => Some(json!({ "title": "x" })),
                _ => None,
            };
            let response = send(&app, request(method, &uri, Some(user.id), body)).await;
            let expected = if allowed.contains(&user.role) {
                StatusCode::NOT_FOUND
            } else {
                StatusCode::FORBIDDEN
            };
            assert_eq!(response.status(), expected, "{} {method} {uri}", user.role);
        }
    }
}

#[tokio::test]
async fn unknown_path_is_not_found_rather_than_unauthenticated() {
    let app = app(MemoryRepo::default());
    let response = send(&app, request("GET", "/nowhere", None, None)).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

// --- Gate as a standalone layer ---

async fn inject_identity(mut request: Request, next: middleware::Next) -> axum::response::Response {
    let role = request
        .headers()
        .get("x-test-role")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<Role>().ok());
    if let Some(role) = role {
        request.extensions_mut().insert(CallerIdentity {
            id: Uuid::new_v4(),
            role,
        });
    }
    next.run(request).await
}

fn gated(first: RoutePolicy, second: RoutePolicy) -> Router {
    Router::new()
        .route("/", get(|| async { "through" }))
        .route_layer(middleware::from_fn_with_state(second, access::gate))
        .route_layer(middleware::from_fn_with_state(first, access::gate))
        .layer(middleware::from_fn(inject_identity))
}

async fn status_for(router: &Router, role: Option<Role>) -> StatusCode {
    let mut builder = axum::http::Request::builder().uri("/");
    if let Some(role) = role {
        builder = builder.header("x-test-role", role.as_str());
    }
    router
        .clone()
        .oneshot(builder.body(Body::empty()).unwrap())
        .await
        .unwrap()
        .status()
}

#[tokio::test]
async fn chained_gates_do_not_depend_on_order() {
    let a = RoutePolicy::only(&[Role::Writer, Role::Sho]);
    let b = RoutePolicy::only(&[Role::Sho]);
    let ab = gated(a.clone(), b.clone());
    let ba = gated(b, a);

    for role in Role::ALL {
        assert_eq!(status_for(&ab, Some(role)).await, status_for(&ba, Some(role)).await);
    }
    assert_eq!(status_for(&ab, Some(Role::Sho)).await, StatusCode::OK);
    assert_eq!(status_for(&ab, Some(Role::Writer)).await, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn gate_without_identity_reports_unauthenticated() {
    let router = gated(RoutePolicy::only(&[Role::Sp]), RoutePolicy::any_authenticated());
    assert_eq!(status_for(&router, None).await, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn open_policy_admits_any_identity() {
    let router = gated(RoutePolicy::any_authenticated(), RoutePolicy::any_authenticated());
    for role in Role::ALL {
        assert_eq!(status_for(&router, Some(role)).await, StatusCode::OK);
    }
}
