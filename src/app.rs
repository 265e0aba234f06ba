use std::net::SocketAddr;

use axum::{routing::get, Router};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::state::AppState;
use crate::{auth, users};

pub fn build_app(state: AppState) -> Router {
    Router::new()
        .nest(
            "/api/v1",
            Router::new()
                .merge(auth::router())
                .merge(users::router())
                .route("/health", get(|| async { "ok" })),
        )
        .with_state(state)
        .layer(CorsLayer::permissive())
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(|req: &axum::http::Request<_>| {
                    let method = req.method().clone();
                    // path only: reset links carry the raw token in the URI
                    let path = if req.uri().path().contains("/resetPassword/") {
                        "/api/v1/resetPassword/:token".to_string()
                    } else {
                        req.uri().path().to_string()
                    };
                    tracing::info_span!(
                        "http_request",
                        %method,
                        path = %path,
                        status = tracing::field::Empty
                    )
                })
                .on_response(
                    |res: &axum::http::Response<_>,
                     _latency: std::time::Duration,
                     span: &tracing::Span| {
                        let status = res.status();
                        span.record("status", tracing::field::display(status));
                        if status.is_server_error() {
                            tracing::error!(%status, "response");
                        } else {
                            tracing::info!(%status, "response");
                        }
                    },
                ),
        )
}

pub async fn serve(app: Router) -> anyhow::Result<()> {
    let addr: SocketAddr = format!(
        "{}:{}",
        std::env::var("APP_HOST").unwrap_or_else(|_| "0.0.0.0".into()),
        std::env::var("APP_PORT").unwrap_or_else(|_| "8080".into())
    )
    .parse()?;

    tracing::info!("listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::Clock;
    use crate::users::repo_types::{NewUser, Role};
    use axum::{
        body::{to_bytes, Body},
        http::{header, Request, StatusCode},
        response::Response,
    };
    use serde_json::{json, Value};
    use time::Duration;
    use tower::ServiceExt;

    fn json_request(method: &str, uri: &str, body: Value) -> Request<Body> {
        Request::builder()
            .method(method)
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn authed(method: &str, uri: &str, token: &str, body: Option<Value>) -> Request<Body> {
        let builder = Request::builder()
            .method(method)
            .uri(uri)
            .header(header::AUTHORIZATION, format!("Bearer {token}"));
        match body {
            Some(b) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(b.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        }
    }

    async fn read_json(res: Response) -> Value {
        let bytes = to_bytes(res.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn signup_body(email: &str) -> Value {
        json!({
            "name": "Ada Lovelace",
            "email": email,
            "password": "pa55word!",
            "passwordConfirm": "pa55word!"
        })
    }

    #[tokio::test]
    async fn health_is_public() {
        let app = build_app(AppState::fake().state);
        let res = app
            .oneshot(Request::get("/api/v1/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn signup_login_and_me() {
        let app = build_app(AppState::fake().state);

        let res = app
            .clone()
            .oneshot(json_request("POST", "/api/v1/signup/user", signup_body("a@b.com")))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::CREATED);
        let cookie = res.headers()[header::SET_COOKIE].to_str().unwrap().to_string();
        assert!(cookie.starts_with("jwt="));
        assert!(cookie.contains("HttpOnly"));
        let body = read_json(res).await;
        assert_eq!(body["status"], "success");
        assert_eq!(body["data"]["user"]["email"], "a@b.com");
        assert_eq!(body["data"]["user"]["role"], "customer");
        assert!(body["data"]["user"].get("passwordHash").is_none());
        assert!(body["data"]["user"].get("password").is_none());

        let res = app
            .clone()
            .oneshot(json_request(
                "POST",
                "/api/v1/login",
                json!({"email": "a@b.com", "password": "pa55word!"}),
            ))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        let token = read_json(res).await["token"].as_str().unwrap().to_string();

        let res = app
            .clone()
            .oneshot(authed("GET", "/api/v1/me", &token, None))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        assert_eq!(read_json(res).await["data"]["user"]["name"], "Ada Lovelace");

        let res = app
            .oneshot(json_request(
                "POST",
                "/api/v1/login",
                json!({"email": "a@b.com", "password": "wrong-password"}),
            ))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(read_json(res).await["code"], "invalid_credentials");
    }

    #[tokio::test]
    async fn login_without_fields_is_bad_request() {
        let app = build_app(AppState::fake().state);
        let res = app
            .oneshot(json_request("POST", "/api/v1/login", json!({"email": "a@b.com"})))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn malformed_bodies_get_the_error_envelope() {
        let app = build_app(AppState::fake().state);

        let res = app
            .clone()
            .oneshot(json_request("POST", "/api/v1/login", json!({"email": 5})))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
        let body = read_json(res).await;
        assert_eq!(body["status"], "fail");
        assert_eq!(body["code"], "validation_error");

        let res = app
            .clone()
            .oneshot(
                Request::post("/api/v1/signup/user")
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from("{\"name\": "))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
        assert_eq!(read_json(res).await["code"], "validation_error");

        let res = app
            .oneshot(
                Request::post("/api/v1/forgotPassword")
                    .header(header::CONTENT_TYPE, "text/plain")
                    .body(Body::from("a@b.com"))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
        assert_eq!(read_json(res).await["code"], "validation_error");
    }

    #[tokio::test]
    async fn protected_routes_need_a_token() {
        let app = build_app(AppState::fake().state);
        let res = app
            .clone()
            .oneshot(Request::get("/api/v1/me").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(read_json(res).await["code"], "unauthenticated");

        let res = app
            .oneshot(authed("GET", "/api/v1/me", "garbage", None))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(read_json(res).await["code"], "invalid_session");
    }

    #[tokio::test]
    async fn session_cookie_authenticates() {
        let app = build_app(AppState::fake().state);
        let res = app
            .clone()
            .oneshot(json_request("POST", "/api/v1/signup/user", signup_body("a@b.com")))
            .await
            .unwrap();
        let token = read_json(res).await["token"].as_str().unwrap().to_string();

        let res = app
            .oneshot(
                Request::get("/api/v1/me")
                    .header(header::COOKIE, format!("jwt={token}"))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn logout_overwrites_cookie_and_session_turns_anonymous() {
        let app = build_app(AppState::fake().state);
        let res = app
            .clone()
            .oneshot(Request::get("/api/v1/logout").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        let cookie = res.headers()[header::SET_COOKIE].to_str().unwrap().to_string();
        assert!(cookie.starts_with("jwt=loggedout"));

        let res = app
            .oneshot(
                Request::get("/api/v1/session")
                    .header(header::COOKIE, "jwt=loggedout")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        let body = read_json(res).await;
        assert_eq!(body["data"]["loggedIn"], false);
        assert!(body["data"]["user"].is_null());
    }

    #[tokio::test]
    async fn session_is_anonymous_for_stale_or_orphaned_tokens() {
        let fake = AppState::fake();
        let app = build_app(fake.state.clone());
        let res = app
            .clone()
            .oneshot(json_request("POST", "/api/v1/signup/user", signup_body("a@b.com")))
            .await
            .unwrap();
        let body = read_json(res).await;
        let token = body["token"].as_str().unwrap().to_string();
        let user_id: uuid::Uuid = body["data"]["user"]["id"].as_str().unwrap().parse().unwrap();

        let res = app
            .clone()
            .oneshot(authed("GET", "/api/v1/session", &token, None))
            .await
            .unwrap();
        assert_eq!(read_json(res).await["data"]["loggedIn"], true);

        fake.clock.advance(Duration::seconds(5));
        fake.state
            .users
            .set_password(user_id, "$argon2id$rotated", fake.clock.now())
            .await
            .unwrap();
        let orphan = fake.state.jwt.issue(uuid::Uuid::new_v4()).unwrap();

        for stale in [token, orphan] {
            let res = app
                .clone()
                .oneshot(authed("GET", "/api/v1/session", &stale, None))
                .await
                .unwrap();
            assert_eq!(res.status(), StatusCode::OK);
            let body = read_json(res).await;
            assert_eq!(body["data"]["loggedIn"], false);
            assert!(body["data"]["user"].is_null());
        }
    }

    #[tokio::test]
    async fn forgot_and_reset_over_http() {
        let fake = AppState::fake();
        let app = build_app(fake.state.clone());
        app.clone()
            .oneshot(json_request("POST", "/api/v1/signup/user", signup_body("a@b.com")))
            .await
            .unwrap();

        let res = app
            .clone()
            .oneshot(json_request(
                "POST",
                "/api/v1/forgotPassword",
                json!({"email": "nobody@b.com"}),
            ))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::NOT_FOUND);

        let res = app
            .clone()
            .oneshot(json_request(
                "POST",
                "/api/v1/forgotPassword",
                json!({"email": "a@b.com"}),
            ))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK);

        let body = fake.mailer.last().unwrap().body;
        let link = body
            .split_whitespace()
            .find(|w| w.contains("/resetPassword/"))
            .unwrap();
        let path = link.trim_start_matches("http://test.local");
        let reset = json!({"password": "n3w-password", "passwordConfirm": "n3w-password"});

        let res = app
            .clone()
            .oneshot(json_request("PATCH", path, reset.clone()))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        assert!(read_json(res).await["token"].is_string());

        let res = app
            .oneshot(json_request("PATCH", path, reset))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
        assert_eq!(read_json(res).await["code"], "invalid_or_expired_token");
    }

    #[tokio::test]
    async fn update_me_ignores_role_and_rejects_passwords() {
        let app = build_app(AppState::fake().state);
        let res = app
            .clone()
            .oneshot(json_request("POST", "/api/v1/signup/user", signup_body("a@b.com")))
            .await
            .unwrap();
        let token = read_json(res).await["token"].as_str().unwrap().to_string();

        let res = app
            .clone()
            .oneshot(authed(
                "PATCH",
                "/api/v1/updateMe",
                &token,
                Some(json!({"name": "Ada King", "role": "admin"})),
            ))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        let body = read_json(res).await;
        assert_eq!(body["data"]["user"]["name"], "Ada King");
        assert_eq!(body["data"]["user"]["role"], "customer");

        let res = app
            .oneshot(authed(
                "PATCH",
                "/api/v1/updateMe",
                &token,
                Some(json!({"password": "n3w-password"})),
            ))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn update_me_treats_blank_phone_as_absent() {
        let app = build_app(AppState::fake().state);
        let mut signup = signup_body("a@b.com");
        signup["phone"] = json!("555-0100");
        let res = app
            .clone()
            .oneshot(json_request("POST", "/api/v1/signup/user", signup))
            .await
            .unwrap();
        let token = read_json(res).await["token"].as_str().unwrap().to_string();

        let res = app
            .oneshot(authed(
                "PATCH",
                "/api/v1/updateMe",
                &token,
                Some(json!({"phone": "   "})),
            ))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        assert_eq!(read_json(res).await["data"]["user"]["phone"], "555-0100");
    }

    #[tokio::test]
    async fn wrong_current_password_is_unauthorized() {
        let app = build_app(AppState::fake().state);
        let res = app
            .clone()
            .oneshot(json_request("POST", "/api/v1/signup/user", signup_body("a@b.com")))
            .await
            .unwrap();
        let token = read_json(res).await["token"].as_str().unwrap().to_string();

        let res = app
            .oneshot(authed(
                "PATCH",
                "/api/v1/updateMyPassword",
                &token,
                Some(json!({
                    "passwordCurrent": "nope-nope",
                    "password": "n3w-password",
                    "passwordConfirm": "n3w-password"
                })),
            ))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(read_json(res).await["code"], "wrong_current_password");
    }

    #[tokio::test]
    async fn user_listing_is_admin_only() {
        let fake = AppState::fake();
        let admin = fake
            .state
            .users
            .create(NewUser {
                name: "Root".into(),
                email: "root@b.com".into(),
                phone: None,
                role: Role::Admin,
                password_hash: fake.state.hasher.hash("adm1n-pass").unwrap(),
            })
            .await
            .unwrap();
        let admin_token = fake.state.jwt.issue(admin.id).unwrap();
        let app = build_app(fake.state.clone());

        let res = app
            .clone()
            .oneshot(json_request("POST", "/api/v1/signup/user", signup_body("a@b.com")))
            .await
            .unwrap();
        let customer_token = read_json(res).await["token"].as_str().unwrap().to_string();

        let res = app
            .clone()
            .oneshot(authed("GET", "/api/v1/users", &customer_token, None))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::FORBIDDEN);

        let res = app
            .oneshot(authed("GET", "/api/v1/users?limit=10", &admin_token, None))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        assert_eq!(read_json(res).await["results"], 2);
    }
}
