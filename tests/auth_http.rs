//! Drives the auth API over HTTP against in-memory stores.

use anyhow::{Context, Result};
use reqwest::{header::RETRY_AFTER, Client, StatusCode};
use secrecy::SecretString;
use serde_json::{json, Value};
use sqlx::postgres::PgPoolOptions;
use std::{sync::Arc, time::Duration};
use storefront::{
    api::{self, AuthState},
    auth::{AuthConfig, Authenticator, JwtIssuer, MemoryRateLimitStore, Registrar},
    store::MemoryUserStore,
    APP_USER_AGENT,
};
use tokio::net::TcpListener;

const OPERATOR_TOKEN: &str = "operator-test-token";

struct TestServer {
    base: String,
    client: Client,
}

impl TestServer {
    async fn start(operator_token: Option<&str>) -> Result<Self> {
        let config = AuthConfig::new()
            .with_rate_limit(5, Duration::from_secs(900))
            .with_store_timeout(Duration::from_secs(5));
        let users = Arc::new(MemoryUserStore::new());
        let rate_limits = Arc::new(MemoryRateLimitStore::new(config.policy().window()));
        let tokens = Arc::new(JwtIssuer::new(
            &SecretString::from("integration-secret"),
            Duration::from_secs(3600),
        ));

        let state = Arc::new(AuthState::new(
            Authenticator::new(users.clone(), rate_limits, tokens, config),
            Registrar::new(users, config.store_timeout()),
            operator_token.map(SecretString::from),
        ));

        // Only /health touches the pool; nothing here connects.
        let pool = PgPoolOptions::new().connect_lazy("postgres://storefront@127.0.0.1:1/storefront")?;

        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        let app = api::router(state, pool);
        tokio::spawn(async move { axum::serve(listener, app.into_make_service()).await });

        Ok(Self {
            base: format!("http://{addr}"),
            client: Client::builder().user_agent(APP_USER_AGENT).build()?,
        })
    }

    async fn post(&self, path: &str, body: &Value) -> Result<(StatusCode, Value)> {
        let response = self
            .client
            .post(format!("{}{path}", self.base))
            .json(body)
            .send()
            .await?;
        let status = response.status();
        let body = response.json::<Value>().await.unwrap_or(Value::Null);
        Ok((status, body))
    }

    async fn login(&self, email: &str, password: &str) -> Result<reqwest::Response> {
        Ok(self
            .client
            .post(format!("{}/api/v1/auth/login", self.base))
            .json(&json!({ "email": email, "password": password }))
            .send()
            .await?)
    }

    async fn reset(&self, email: &str, bearer: Option<&str>) -> Result<StatusCode> {
        let mut request = self
            .client
            .post(format!("{}/api/v1/auth/reset-rate-limit", self.base))
            .json(&json!({ "email": email }));
        if let Some(token) = bearer {
            request = request.bearer_auth(token);
        }
        Ok(request.send().await?.status())
    }

    async fn register_buyer(&self, email: &str, password: &str) -> Result<(StatusCode, Value)> {
        self.post(
            "/api/v1/auth/register",
            &json!({
                "email": email,
                "first_name": "Ann",
                "password": password,
            }),
        )
        .await
    }
}

#[tokio::test]
async fn register_login_lockout_and_reset() -> Result<()> {
    let server = TestServer::start(Some(OPERATOR_TOKEN)).await?;

    let (status, user) = server.register_buyer("a@test.com", "Pass123!").await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(user["email"], "a@test.com");
    assert_eq!(user["last_name"], Value::Null);
    assert_eq!(user["role"], "buyer");
    assert!(user.get("hashed_password").is_none());

    let response = server.login("a@test.com", "Pass123!").await?;
    assert_eq!(response.status(), StatusCode::OK);
    let body: Value = response.json().await?;
    assert_eq!(body["token_type"], "bearer");
    assert_eq!(body["expires_in"], 3600);
    assert_eq!(body["user"]["first_name"], "Ann");
    assert!(body["access_token"].as_str().is_some_and(|t| !t.is_empty()));

    for _ in 0..4 {
        let response = server.login("a@test.com", "wrong-password").await?;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        let body: Value = response.json().await?;
        assert_eq!(body["detail"], "Incorrect email or password");
    }

    // The fifth failure reaches the threshold.
    let response = server.login("a@test.com", "wrong-password").await?;
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);

    let response = server.login("a@test.com", "Pass123!").await?;
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    let retry_after = response
        .headers()
        .get(RETRY_AFTER)
        .context("missing Retry-After")?
        .to_str()?
        .parse::<u64>()?;
    assert!((1..=900).contains(&retry_after));

    assert_eq!(
        server.reset("a@test.com", None).await?,
        StatusCode::UNAUTHORIZED
    );
    assert_eq!(
        server.reset("a@test.com", Some("not-the-token")).await?,
        StatusCode::UNAUTHORIZED
    );
    assert_eq!(
        server.reset("A@Test.com", Some(OPERATOR_TOKEN)).await?,
        StatusCode::NO_CONTENT
    );

    let response = server.login("a@test.com", "Pass123!").await?;
    assert_eq!(response.status(), StatusCode::OK);
    Ok(())
}

#[tokio::test]
async fn unknown_email_and_wrong_password_look_the_same() -> Result<()> {
    let server = TestServer::start(None).await?;
    server.register_buyer("known@test.com", "Pass123!").await?;

    let unknown = server.login("nobody@test.com", "Pass123!").await?;
    let wrong = server.login("known@test.com", "Wrong123!").await?;

    assert_eq!(unknown.status(), wrong.status());
    assert_eq!(unknown.json::<Value>().await?, wrong.json::<Value>().await?);
    Ok(())
}

#[tokio::test]
async fn me_resolves_bearer_token() -> Result<()> {
    let server = TestServer::start(None).await?;
    server.register_buyer("me@test.com", "Pass123!").await?;

    let body: Value = server.login("me@test.com", "Pass123!").await?.json().await?;
    let token = body["access_token"].as_str().context("missing token")?;

    let response = server
        .client
        .get(format!("{}/api/v1/auth/me", server.base))
        .bearer_auth(token)
        .send()
        .await?;
    assert_eq!(response.status(), StatusCode::OK);
    let me: Value = response.json().await?;
    assert_eq!(me["email"], "me@test.com");

    let response = server
        .client
        .get(format!("{}/api/v1/auth/me", server.base))
        .bearer_auth("garbage")
        .send()
        .await?;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let response = server
        .client
        .get(format!("{}/api/v1/auth/me", server.base))
        .send()
        .await?;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    Ok(())
}

#[tokio::test]
async fn registration_errors() -> Result<()> {
    let server = TestServer::start(None).await?;

    let (status, _) = server.register_buyer("dup@test.com", "Pass123!").await?;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = server.register_buyer("DUP@test.com", "Other123!").await?;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, body) = server
        .post(
            "/api/v1/auth/register",
            &json!({
                "email": "not-an-email",
                "first_name": "",
                "password": "short",
                "role": "admin",
            }),
        )
        .await?;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    let fields: Vec<&str> = body["errors"]
        .as_array()
        .context("missing errors")?
        .iter()
        .filter_map(|err| err["field"].as_str())
        .collect();
    for field in ["email", "first_name", "password", "role"] {
        assert!(fields.contains(&field), "missing {field} in {fields:?}");
    }
    Ok(())
}

#[tokio::test]
async fn seller_with_last_name_round_trips() -> Result<()> {
    let server = TestServer::start(None).await?;

    let (status, user) = server
        .post(
            "/api/v1/auth/register",
            &json!({
                "email": "shop@test.com",
                "username": "shop_owner",
                "first_name": "Sam",
                "last_name": "Stone",
                "password": "Pass123!",
                "role": "Seller",
            }),
        )
        .await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(user["role"], "seller");

    let body: Value = server.login("shop@test.com", "Pass123!").await?.json().await?;
    assert_eq!(body["user"]["last_name"], "Stone");
    assert_eq!(body["user"]["username"], "shop_owner");
    Ok(())
}

#[tokio::test]
async fn malformed_login_is_bad_request() -> Result<()> {
    let server = TestServer::start(None).await?;

    let response = server.login("not-an-email", "Pass123!").await?;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = server
        .client
        .post(format!("{}/api/v1/auth/login", server.base))
        .body("not json")
        .send()
        .await?;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    Ok(())
}

#[tokio::test]
async fn reset_is_disabled_without_operator_token() -> Result<()> {
    let server = TestServer::start(None).await?;
    assert_eq!(
        server.reset("a@test.com", Some("anything")).await?,
        StatusCode::NOT_FOUND
    );
    Ok(())
}

#[tokio::test]
async fn openapi_document_is_served() -> Result<()> {
    let server = TestServer::start(None).await?;
    let response = server
        .client
        .get(format!("{}/api-docs/openapi.json", server.base))
        .send()
        .await?;
    assert_eq!(response.status(), StatusCode::OK);
    let doc: Value = response.json().await?;
    assert!(doc["paths"]["/api/v1/auth/login"].is_object());
    Ok(())
}
