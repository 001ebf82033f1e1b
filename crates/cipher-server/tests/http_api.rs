//! End-to-end HTTP tests against the literal request/response fixtures,
//! driven through the full router (auth middleware, JSON (de)serialization,
//! status codes) via `tower::ServiceExt::oneshot` rather than a bound
//! socket.

use axum::body::Body;
use axum::http::{Request, StatusCode};
use http_body_util::BodyExt;
use tower::ServiceExt;

use cipher_server::{build_router, build_state, AppConfig};

fn player_cache_key(url: &str) -> String {
    cipher_core::player_cache::cache_key(&cipher_core::player_cache::normalize_player_url(url).unwrap(), false)
}

fn test_config(cache_dir: std::path::PathBuf, api_token: Option<&str>) -> AppConfig {
    let mut config = AppConfig::from_env();
    config.cache_dir = cache_dir;
    config.api_token = api_token.map(str::to_string);
    config
}

async fn body_json(response: axum::response::Response) -> serde_json::Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn decrypt_signature_matches_seed_scenario() {
    let dir = tempfile::tempdir().unwrap();
    let player_url = "https://www.youtube.com/s/player/abcd1234/player.js";
    std::fs::write(
        dir.path().join(format!("{}.js", player_cache_key(player_url))),
        "var player = {};",
    )
    .unwrap();

    let config = test_config(dir.path().to_path_buf(), None);
    let state = build_state(&config).await;
    let app = build_router(state, None);

    let body = serde_json::json!({
        "encrypted_signature": "ABCDE",
        "n_param": "xyz",
        "player_url": player_url,
    });

    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/decrypt_signature")
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["decrypted_signature"], "EDCBA");
    assert_eq!(json["decrypted_n_sig"], "xyz!");
}

#[tokio::test]
async fn get_sts_reports_cache_hit_on_repeat() {
    let dir = tempfile::tempdir().unwrap();
    let player_url = "https://www.youtube.com/s/player/abcd1234/player.js";
    std::fs::write(
        dir.path().join(format!("{}.js", player_cache_key(player_url))),
        "player.signatureTimestamp:19834",
    )
    .unwrap();

    let config = test_config(dir.path().to_path_buf(), None);
    let state = build_state(&config).await;
    let app = build_router(state, None);

    let body = serde_json::json!({ "player_url": player_url }).to_string();

    let first = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/get_sts")
                .header("content-type", "application/json")
                .body(Body::from(body.clone()))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(first.status(), StatusCode::OK);
    assert_eq!(first.headers().get("X-Cache-Hit").unwrap(), "false");
    let first_json = body_json(first).await;
    assert_eq!(first_json["sts"], "19834");

    let second = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/get_sts")
                .header("content-type", "application/json")
                .body(Body::from(body))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(second.status(), StatusCode::OK);
    assert_eq!(second.headers().get("X-Cache-Hit").unwrap(), "true");
}

#[tokio::test]
async fn resolve_url_matches_seed_scenario() {
    let dir = tempfile::tempdir().unwrap();
    let player_url = "https://www.youtube.com/s/player/abcd1234/player.js";
    std::fs::write(
        dir.path().join(format!("{}.js", player_cache_key(player_url))),
        "var player = {};",
    )
    .unwrap();

    let config = test_config(dir.path().to_path_buf(), None);
    let state = build_state(&config).await;
    let app = build_router(state, None);

    let body = serde_json::json!({
        "stream_url": "https://r.example/vi?s=OLD&n=N0&other=1",
        "player_url": player_url,
        "encrypted_signature": "OLD",
        "signature_key": "sig",
        "n_param": null,
    })
    .to_string();

    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/resolve_url")
                .header("content-type", "application/json")
                .body(Body::from(body))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    let resolved = url::Url::parse(json["resolved_url"].as_str().unwrap()).unwrap();
    let pairs: std::collections::HashMap<String, String> =
        resolved.query_pairs().map(|(k, v)| (k.into_owned(), v.into_owned())).collect();
    assert_eq!(pairs.get("sig"), Some(&"DLO".to_string()));
    assert_eq!(pairs.get("n"), Some(&"N0!".to_string()));
    assert_eq!(pairs.get("other"), Some(&"1".to_string()));
    assert!(!pairs.contains_key("s"));
}

#[tokio::test]
async fn missing_api_token_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let config = test_config(dir.path().to_path_buf(), Some("secret"));
    let state = build_state(&config).await;
    let app = build_router(state, None);

    let body = serde_json::json!({ "player_url": "https://www.youtube.com/s/player/abcd1234/player.js" }).to_string();

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/get_sts")
                .header("content-type", "application/json")
                .body(Body::from(body.clone()))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let json = body_json(response).await;
    assert_eq!(json["error"], "Missing API token");

    let wrong = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/get_sts")
                .header("content-type", "application/json")
                .header("Authorization", "wrong")
                .body(Body::from(body))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(wrong.status(), StatusCode::UNAUTHORIZED);
    let json = body_json(wrong).await;
    assert_eq!(json["error"], "Invalid API token");
}

#[tokio::test]
async fn public_routes_bypass_auth() {
    let dir = tempfile::tempdir().unwrap();
    let config = test_config(dir.path().to_path_buf(), Some("secret"));
    let state = build_state(&config).await;
    let app = build_router(state, None);

    let response = app
        .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn get_sts_on_a_player_file_without_a_timestamp_is_not_found() {
    let dir = tempfile::tempdir().unwrap();
    let player_url = "https://www.youtube.com/s/player/abcd1234/player.js";
    std::fs::write(
        dir.path().join(format!("{}.js", player_cache_key(player_url))),
        "var player = {};",
    )
    .unwrap();

    let config = test_config(dir.path().to_path_buf(), None);
    let state = build_state(&config).await;
    let app = build_router(state, None);

    let body = serde_json::json!({ "player_url": player_url }).to_string();

    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/get_sts")
                .header("content-type", "application/json")
                .body(Body::from(body))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let json = body_json(response).await;
    assert!(json["error"].as_str().unwrap().to_lowercase().contains("sts"));
}

#[tokio::test]
async fn resolve_url_missing_n_param_and_absent_from_query_is_a_validation_error() {
    let dir = tempfile::tempdir().unwrap();
    let player_url = "https://www.youtube.com/s/player/abcd1234/player.js";
    std::fs::write(
        dir.path().join(format!("{}.js", player_cache_key(player_url))),
        "var player = {};",
    )
    .unwrap();

    let config = test_config(dir.path().to_path_buf(), None);
    let state = build_state(&config).await;
    let app = build_router(state, None);

    let body = serde_json::json!({
        "stream_url": "https://r.example/vi?other=1",
        "player_url": player_url,
        "encrypted_signature": "",
        "n_param": null,
    })
    .to_string();

    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/resolve_url")
                .header("content-type", "application/json")
                .body(Body::from(body))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn missing_player_url_is_a_validation_error() {
    let dir = tempfile::tempdir().unwrap();
    let config = test_config(dir.path().to_path_buf(), None);
    let state = build_state(&config).await;
    let app = build_router(state, None);

    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/get_sts")
                .header("content-type", "application/json")
                .body(Body::from("{}"))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}
