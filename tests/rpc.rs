//! RPC surface over HTTP/1.1 and h2c.

use reqwest::StatusCode;
use serde_json::{json, Value};

mod common;

use common::{loaded_store, start_service, test_config};

#[tokio::test]
async fn resolves_typed_flags() {
    let service = start_service(test_config(), loaded_store()).await;
    let client = reqwest::Client::new();

    let res = client
        .post(service.method_url("ResolveBoolean"))
        .json(&json!({"flagKey": "new-welcome-banner", "context": {"email": "a@b.c"}}))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body, json!({"value": true, "reason": "STATIC", "variant": "on"}));

    let body: Value = client
        .post(service.method_url("ResolveString"))
        .json(&json!({"flagKey": "header-color"}))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["value"], "#FF0000");

    let body: Value = client
        .post(service.method_url("ResolveInt"))
        .json(&json!({"flagKey": "retries"}))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["value"], "10");

    service.stop().await.unwrap();
}

#[tokio::test]
async fn evaluation_errors_carry_code_and_prefixed_message() {
    let service = start_service(test_config(), loaded_store()).await;
    let client = reqwest::Client::new();

    let cases = [
        ("ResolveBoolean", "missing", StatusCode::NOT_FOUND, "not_found", "FLAG_NOT_FOUND"),
        ("ResolveString", "new-welcome-banner", StatusCode::BAD_REQUEST, "invalid_argument", "TYPE_MISMATCH"),
        ("ResolveBoolean", "legacy-checkout", StatusCode::SERVICE_UNAVAILABLE, "unavailable", "DISABLED"),
    ];

    for (method, flag, status, code, domain) in cases {
        let res = client
            .post(service.method_url(method))
            .json(&json!({ "flagKey": flag }))
            .send()
            .await
            .unwrap();
        assert_eq!(res.status(), status, "{flag}");

        let body: Value = res.json().await.unwrap();
        assert_eq!(body["code"], code);
        assert_eq!(body["message"], format!("FlagdError:, {domain}"));
    }

    service.stop().await.unwrap();
}

#[tokio::test]
async fn malformed_request_is_invalid_argument() {
    let service = start_service(test_config(), loaded_store()).await;

    let res = reqwest::Client::new()
        .post(service.method_url("ResolveBoolean"))
        .header("content-type", "application/json")
        .body("{\"flagKey\":")
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["code"], "invalid_argument");

    service.stop().await.unwrap();
}

#[tokio::test]
async fn resolve_all_lists_enabled_flags() {
    let service = start_service(test_config(), loaded_store()).await;

    let body: Value = reqwest::Client::new()
        .post(service.method_url("ResolveAll"))
        .json(&json!({}))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();

    let flags = body["flags"].as_object().unwrap();
    assert_eq!(flags.len(), 3);
    assert_eq!(flags["new-welcome-banner"]["boolValue"], true);
    assert_eq!(flags["header-color"]["stringValue"], "#FF0000");
    assert_eq!(flags["retries"]["doubleValue"], 10.0);

    service.stop().await.unwrap();
}

#[tokio::test]
async fn serves_h2c_with_prior_knowledge() {
    let service = start_service(test_config(), loaded_store()).await;
    let client = reqwest::Client::builder()
        .http2_prior_knowledge()
        .build()
        .unwrap();

    let res = client
        .post(service.method_url("ResolveBoolean"))
        .json(&json!({"flagKey": "new-welcome-banner"}))
        .send()
        .await
        .unwrap();
    assert_eq!(res.version(), reqwest::Version::HTTP_2);
    assert_eq!(res.status(), StatusCode::OK);

    service.stop().await.unwrap();
}

#[tokio::test]
async fn cors_preflight_allows_any_origin_by_default() {
    let service = start_service(test_config(), loaded_store()).await;

    let res = reqwest::Client::new()
        .request(reqwest::Method::OPTIONS, service.method_url("ResolveBoolean"))
        .header("origin", "https://app.example")
        .header("access-control-request-method", "POST")
        .header("access-control-request-headers", "content-type,connect-protocol-version")
        .send()
        .await
        .unwrap();

    assert!(res.status().is_success());
    assert_eq!(res.headers()["access-control-allow-origin"], "*");

    service.stop().await.unwrap();
}

#[tokio::test]
async fn management_port_serves_probes_and_metrics() {
    let service = start_service(test_config(), loaded_store()).await;
    let client = reqwest::Client::new();

    client
        .post(service.method_url("ResolveBoolean"))
        .json(&json!({"flagKey": "new-welcome-banner"}))
        .send()
        .await
        .unwrap();

    let health = client
        .get(format!("{}/healthz", service.management_url))
        .send()
        .await
        .unwrap();
    assert_eq!(health.status(), StatusCode::OK);

    let ready = client
        .get(format!("{}/readyz", service.management_url))
        .send()
        .await
        .unwrap();
    assert_eq!(ready.status(), StatusCode::OK);

    let missing = client
        .get(format!("{}/nope", service.management_url))
        .send()
        .await
        .unwrap();
    assert_eq!(missing.status(), StatusCode::NOT_FOUND);

    let metrics = client
        .get(format!("{}/metrics", service.management_url))
        .send()
        .await
        .unwrap()
        .text()
        .await
        .unwrap();
    assert!(metrics.contains("http_request_duration_seconds"), "{metrics}");
    assert!(metrics.contains("impressions"), "{metrics}");
    assert!(metrics.contains("new-welcome-banner"), "{metrics}");

    service.stop().await.unwrap();
}
