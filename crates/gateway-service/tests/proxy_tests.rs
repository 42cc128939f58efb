//! Forwarding integration tests.
//!
//! Authorized requests go through a real gateway to a wiremock upstream;
//! these tests check what the upstream sees and what the client gets back.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::indexing_slicing)]

use axum::http::HeaderValue;
use gateway_service::models::{RequestContext, ResponseContext};
use gateway_service::proxy::ProxyHooks;
use gateway_service::repositories::mock::MockTokenStore;
use gateway_service::repositories::TokenRecord;
use gateway_test_utils::{test_config_vars, TestGatewayServer, TestTokenBuilder};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use wiremock::matchers::{any, body_string, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// A token and a store that accepts it.
fn authorized(subject: &str) -> (String, Arc<MockTokenStore>) {
    let token = TestTokenBuilder::new().for_subject(subject).build();
    let store = Arc::new(MockTokenStore::with_records(vec![TokenRecord::new(
        subject,
        token.clone(),
    )]));
    (token, store)
}

fn no_redirect_client() -> reqwest::Client {
    reqwest::Client::builder()
        .redirect(reqwest::redirect::Policy::none())
        .build()
        .unwrap()
}

async fn message_of(response: reqwest::Response) -> String {
    let body: Value = response.json().await.unwrap();
    body["message"].as_str().unwrap().to_string()
}

#[tokio::test]
async fn test_method_path_query_and_body_forwarded_verbatim() -> Result<(), anyhow::Error> {
    let upstream = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/orders/7/items"))
        .and(query_param("page", "2"))
        .and(query_param("sort", "desc"))
        .and(header("content-type", "application/json"))
        .and(header("x-client-trace", "abc"))
        .and(body_string(r#"{"sku":"A-1","qty":3}"#))
        .respond_with(
            ResponseTemplate::new(201)
                .set_body_raw(r#"{"id":99}"#, "application/json")
                .insert_header("x-upstream-version", "v9"),
        )
        .expect(1)
        .mount(&upstream)
        .await;

    let (token, store) = authorized("u1");
    let server = TestGatewayServer::spawn(&upstream.uri(), store).await?;

    let response = reqwest::Client::new()
        .post(format!("{}/orders/7/items?page=2&sort=desc", server.url()))
        .bearer_auth(&token)
        .header("content-type", "application/json")
        .header("x-client-trace", "abc")
        .body(r#"{"sku":"A-1","qty":3}"#)
        .send()
        .await?;

    assert_eq!(response.status(), 201);
    assert_eq!(response.headers()["content-type"], "application/json");
    assert_eq!(response.headers()["x-upstream-version"], "v9");
    assert_eq!(response.text().await?, r#"{"id":99}"#);
    Ok(())
}

#[tokio::test]
async fn test_every_method_is_forwarded() -> Result<(), anyhow::Error> {
    let upstream = MockServer::start().await;
    for verb in ["PUT", "PATCH", "DELETE"] {
        Mock::given(method(verb))
            .and(path("/resource"))
            .respond_with(ResponseTemplate::new(200).set_body_string(verb))
            .expect(1)
            .mount(&upstream)
            .await;
    }

    let (token, store) = authorized("u1");
    let server = TestGatewayServer::spawn(&upstream.uri(), store).await?;
    let client = reqwest::Client::new();

    for verb in [
        reqwest::Method::PUT,
        reqwest::Method::PATCH,
        reqwest::Method::DELETE,
    ] {
        let response = client
            .request(verb.clone(), format!("{}/resource", server.url()))
            .bearer_auth(&token)
            .send()
            .await?;
        assert_eq!(response.status(), 200);
        assert_eq!(response.text().await?, verb.as_str());
    }
    Ok(())
}

#[tokio::test]
async fn test_authorization_is_forwarded_and_host_rewritten() -> Result<(), anyhow::Error> {
    let upstream = MockServer::start().await;
    Mock::given(any())
        .respond_with(ResponseTemplate::new(200))
        .mount(&upstream)
        .await;

    let (token, store) = authorized("u1");
    let server = TestGatewayServer::spawn(&upstream.uri(), store).await?;

    reqwest::Client::new()
        .get(format!("{}/orders", server.url()))
        .bearer_auth(&token)
        .send()
        .await?;

    let received = upstream.received_requests().await.unwrap();
    assert_eq!(received.len(), 1);
    let forwarded = &received[0];
    assert_eq!(
        forwarded.headers["authorization"],
        format!("Bearer {token}").as_str()
    );
    assert_eq!(
        forwarded.headers["host"],
        upstream.address().to_string().as_str()
    );
    Ok(())
}

#[tokio::test]
async fn test_upstream_error_status_relayed_unchanged() -> Result<(), anyhow::Error> {
    let upstream = MockServer::start().await;
    Mock::given(any())
        .respond_with(ResponseTemplate::new(500).set_body_string("upstream broke"))
        .mount(&upstream)
        .await;

    let (token, store) = authorized("u1");
    let server = TestGatewayServer::spawn(&upstream.uri(), store).await?;

    let response = reqwest::Client::new()
        .get(format!("{}/orders", server.url()))
        .bearer_auth(&token)
        .send()
        .await?;

    assert_eq!(response.status(), 500);
    assert_eq!(response.text().await?, "upstream broke");
    Ok(())
}

#[tokio::test]
async fn test_redirect_relayed_not_followed() -> Result<(), anyhow::Error> {
    let upstream = MockServer::start().await;
    Mock::given(path("/old"))
        .respond_with(ResponseTemplate::new(302).insert_header("location", "/new"))
        .expect(1)
        .mount(&upstream)
        .await;
    Mock::given(path("/new"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&upstream)
        .await;

    let (token, store) = authorized("u1");
    let server = TestGatewayServer::spawn(&upstream.uri(), store).await?;

    let response = no_redirect_client()
        .get(format!("{}/old", server.url()))
        .bearer_auth(&token)
        .send()
        .await?;

    assert_eq!(response.status(), 302);
    assert_eq!(response.headers()["location"], "/new");
    Ok(())
}

#[tokio::test]
async fn test_unreachable_upstream_is_bad_gateway() -> Result<(), anyhow::Error> {
    // Reserve a port, then free it so nothing is listening
    let listener = std::net::TcpListener::bind("127.0.0.1:0")?;
    let dead_url = format!("http://{}", listener.local_addr()?);
    drop(listener);

    let (token, store) = authorized("u1");
    let server = TestGatewayServer::spawn(&dead_url, store).await?;

    let response = reqwest::Client::new()
        .get(format!("{}/orders", server.url()))
        .bearer_auth(&token)
        .send()
        .await?;

    assert_eq!(response.status(), 502);
    assert_eq!(message_of(response).await, "Bad Gateway");
    Ok(())
}

#[tokio::test]
async fn test_slow_upstream_is_gateway_timeout() -> Result<(), anyhow::Error> {
    let upstream = MockServer::start().await;
    Mock::given(any())
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(3)))
        .mount(&upstream)
        .await;

    let (token, store) = authorized("u1");
    let mut vars = test_config_vars(&upstream.uri());
    vars.insert("UPSTREAM_TIMEOUT_MS".to_string(), "200".to_string());
    let server = TestGatewayServer::spawn_with(vars, store, ProxyHooks::new()).await?;

    let response = reqwest::Client::new()
        .get(format!("{}/slow", server.url()))
        .bearer_auth(&token)
        .send()
        .await?;

    assert_eq!(response.status(), 504);
    assert_eq!(message_of(response).await, "Gateway Timeout");
    Ok(())
}

#[tokio::test]
async fn test_spent_request_budget_is_gateway_timeout() -> Result<(), anyhow::Error> {
    let upstream = MockServer::start().await;
    Mock::given(any())
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(3)))
        .mount(&upstream)
        .await;

    let (token, store) = authorized("u1");
    let mut vars = test_config_vars(&upstream.uri());
    vars.insert("STORE_TIMEOUT_MS".to_string(), "50".to_string());
    vars.insert("UPSTREAM_TIMEOUT_MS".to_string(), "900".to_string());
    vars.insert("REQUEST_TIMEOUT_SECONDS".to_string(), "1".to_string());

    // Slow hook eats most of the budget before the upstream wait starts
    let hooks = ProxyHooks::new().with_pre_send(Arc::new(|_: &mut RequestContext| {
        std::thread::sleep(Duration::from_millis(600));
    }));
    let server = TestGatewayServer::spawn_with(vars, store, hooks).await?;

    let response = reqwest::Client::new()
        .get(format!("{}/slow", server.url()))
        .bearer_auth(&token)
        .send()
        .await?;

    assert_eq!(response.status(), 504);
    assert_eq!(message_of(response).await, "Gateway Timeout");
    Ok(())
}

#[tokio::test]
async fn test_upstream_timeout_beyond_request_budget_is_rejected() {
    let mut vars = test_config_vars("http://127.0.0.1:9");
    vars.insert("UPSTREAM_TIMEOUT_MS".to_string(), "5000".to_string());
    vars.insert("REQUEST_TIMEOUT_SECONDS".to_string(), "1".to_string());

    let result =
        TestGatewayServer::spawn_with(vars, Arc::new(MockTokenStore::empty()), ProxyHooks::new())
            .await;

    assert!(result.is_err());
}

#[tokio::test]
async fn test_oversized_body_is_rejected_before_forwarding() -> Result<(), anyhow::Error> {
    let upstream = MockServer::start().await;
    Mock::given(any())
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&upstream)
        .await;

    let (token, store) = authorized("u1");
    let mut vars: HashMap<String, String> = test_config_vars(&upstream.uri());
    vars.insert("MAX_REQUEST_BODY_BYTES".to_string(), "16".to_string());
    let server = TestGatewayServer::spawn_with(vars, store, ProxyHooks::new()).await?;

    let response = reqwest::Client::new()
        .post(format!("{}/upload", server.url()))
        .bearer_auth(&token)
        .body(vec![b'x'; 64])
        .send()
        .await?;

    assert_eq!(response.status(), 413);
    assert_eq!(message_of(response).await, "Request body too large");
    Ok(())
}

#[tokio::test]
async fn test_body_at_limit_is_forwarded() -> Result<(), anyhow::Error> {
    let upstream = MockServer::start().await;
    Mock::given(body_string("0123456789abcdef"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&upstream)
        .await;

    let (token, store) = authorized("u1");
    let mut vars = test_config_vars(&upstream.uri());
    vars.insert("MAX_REQUEST_BODY_BYTES".to_string(), "16".to_string());
    let server = TestGatewayServer::spawn_with(vars, store, ProxyHooks::new()).await?;

    let response = reqwest::Client::new()
        .post(format!("{}/upload", server.url()))
        .bearer_auth(&token)
        .body("0123456789abcdef")
        .send()
        .await?;

    assert_eq!(response.status(), 200);
    Ok(())
}

#[tokio::test]
async fn test_hooks_run_around_forwarding() -> Result<(), anyhow::Error> {
    let upstream = MockServer::start().await;
    Mock::given(header("x-gateway-subject", "u1"))
        .respond_with(ResponseTemplate::new(200).set_body_string("ok"))
        .expect(1)
        .mount(&upstream)
        .await;

    let hooks = ProxyHooks::new()
        .with_pre_send(Arc::new(|ctx: &mut RequestContext| {
            if let Some(identity) = &ctx.identity {
                if let Ok(value) = HeaderValue::from_str(&identity.subject_id) {
                    ctx.headers.insert("x-gateway-subject", value);
                }
            }
        }))
        .with_post_receive(Arc::new(|ctx: &mut ResponseContext| {
            ctx.headers
                .insert("x-served-by", HeaderValue::from_static("auth-gateway"));
        }));

    let (token, store) = authorized("u1");
    let server =
        TestGatewayServer::spawn_with(test_config_vars(&upstream.uri()), store, hooks).await?;

    let response = reqwest::Client::new()
        .get(format!("{}/orders", server.url()))
        .bearer_auth(&token)
        .send()
        .await?;

    assert_eq!(response.status(), 200);
    assert_eq!(response.headers()["x-served-by"], "auth-gateway");
    assert_eq!(response.text().await?, "ok");
    Ok(())
}

#[tokio::test]
async fn test_upstream_base_path_is_prefixed() -> Result<(), anyhow::Error> {
    let upstream = MockServer::start().await;
    Mock::given(path("/api/v2/orders"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&upstream)
        .await;

    let (token, store) = authorized("u1");
    let server = TestGatewayServer::spawn(&format!("{}/api/v2/", upstream.uri()), store).await?;

    let response = reqwest::Client::new()
        .get(format!("{}/orders", server.url()))
        .bearer_auth(&token)
        .send()
        .await?;

    assert_eq!(response.status(), 200);
    Ok(())
}

#[tokio::test]
async fn test_connection_header_cannot_strip_subject_header() -> Result<(), anyhow::Error> {
    let upstream = MockServer::start().await;
    Mock::given(header("x-authenticated-user", "u1"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&upstream)
        .await;

    let (token, store) = authorized("u1");
    let mut vars = test_config_vars(&upstream.uri());
    vars.insert(
        "UPSTREAM_SUBJECT_HEADER".to_string(),
        "x-authenticated-user".to_string(),
    );
    let server = TestGatewayServer::spawn_with(vars, store, ProxyHooks::new()).await?;

    let response = reqwest::Client::new()
        .get(format!("{}/orders", server.url()))
        .bearer_auth(&token)
        .header("connection", "x-authenticated-user")
        .header("x-authenticated-user", "admin")
        .send()
        .await?;

    assert_eq!(response.status(), 200);
    let received = upstream.received_requests().await.unwrap();
    assert_eq!(received.len(), 1);
    assert_eq!(received[0].headers["x-authenticated-user"], "u1");
    Ok(())
}
