//! Loop prevention at the proxy edge.

mod common;

use serde_json::{json, Value};

use common::*;

fn assert_loop_envelope(envelope: &Value) {
    assert_eq!(envelope["success"], false);
    assert_eq!(envelope["error_type"], "loop_detected");
    assert_eq!(envelope["error_title"], "Loop Detected");
    assert_eq!(
        envelope["error_message"],
        "Request could create an infinite loop to this proxy server"
    );
}

#[tokio::test]
async fn signature_user_agent_is_refused_for_every_target() {
    let upstream = start_upstream().await;
    let proxy = start_proxy().await;

    for path in ["/json", "/health"] {
        let response = client()
            .post(proxy.url("/proxy/request"))
            .header("user-agent", "rb-slingshot/0.1.0 (https://requestbite.com/slingshot)")
            .json(&json!({"method": "GET", "url": upstream.url(path)}))
            .send()
            .await
            .unwrap();

        assert_eq!(response.status(), 508);
        let envelope: Value = response.json().await.unwrap();
        assert_loop_envelope(&envelope);
    }

    assert_eq!(upstream.hits(), 0);
}

#[tokio::test]
async fn blocked_hostname_is_refused_except_for_health() {
    let upstream = start_upstream().await;
    let proxy = start_proxy_with(|config| {
        config.loop_guard.blocked_hostnames.push("127.0.0.1".to_string());
    })
    .await;

    let blocked = forward(
        &proxy,
        json!({"method": "GET", "url": upstream.url("/status/200")}),
    )
    .await;
    assert_eq!(blocked.status(), 508);
    assert_loop_envelope(&blocked.json().await.unwrap());
    assert_eq!(upstream.hits(), 0);

    let health = forward_json(&proxy, json!({"method": "GET", "url": upstream.url("/health")})).await;
    assert_eq!(health["success"], true);
    assert_eq!(health["response_data"], "upstream healthy");
    assert_eq!(upstream.hits(), 1);
}

#[tokio::test]
async fn streaming_requests_are_gated_too() {
    let upstream = start_upstream().await;
    let proxy = start_proxy_with(|config| {
        config.loop_guard.blocked_hostnames.push("127.0.0.1".to_string());
    })
    .await;

    let response = forward(
        &proxy,
        json!({"method": "GET", "url": upstream.url("/sse"), "streaming": true}),
    )
    .await;
    assert_eq!(response.status(), 508);
    assert!(response.headers().get("x-slingshot-streaming").is_none());
    assert_loop_envelope(&response.json().await.unwrap());
}

#[tokio::test]
async fn blocklist_file_entries_match_case_insensitively() {
    let upstream = start_upstream().await;
    let port = upstream.addr.unwrap().port();

    let path = std::env::temp_dir().join(format!("slingshot-blocklist-{}.txt", uuid::Uuid::new_v4()));
    std::fs::write(&path, "# extra hosts\n\nlocalhost: local machine\n").unwrap();

    let blocklist = path.clone();
    let proxy = start_proxy_with(move |config| {
        config.loop_guard.blocklist_file = Some(blocklist);
    })
    .await;

    let response = forward(
        &proxy,
        json!({"method": "GET", "url": format!("http://LOCALHOST:{}/json", port)}),
    )
    .await;
    assert_eq!(response.status(), 508);
    assert_loop_envelope(&response.json().await.unwrap());

    std::fs::remove_file(&path).ok();
}

#[tokio::test]
async fn form_requests_are_gated_by_user_agent() {
    let upstream = start_upstream().await;
    let proxy = start_proxy().await;

    let response = client()
        .post(proxy.url("/proxy/form"))
        .query(&[("url", upstream.url("/echo"))])
        .header("user-agent", "RB-SLINGSHOT/9")
        .form(&[("a", "1")])
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 508);
    assert_eq!(upstream.hits(), 0);
}

#[tokio::test]
async fn signature_is_found_in_non_ascii_user_agents() {
    let upstream = start_upstream().await;
    let proxy = start_proxy().await;

    let user_agent = reqwest::header::HeaderValue::from_bytes(b"rb-slingshot/0.1.0 \xe9").unwrap();
    let response = client()
        .post(proxy.url("/proxy/request"))
        .header("user-agent", user_agent)
        .json(&json!({"method": "GET", "url": upstream.url("/json")}))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), 508);
    assert_loop_envelope(&response.json().await.unwrap());
    assert_eq!(upstream.hits(), 0);
}
